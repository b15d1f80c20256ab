use crate::commands::ANCHOR_ATTRIBUTE;
use crate::core::{Attrs, Editor, Gravity};
use crate::decorators::DecoratorRegistry;
use crate::events::{EditorEvent, Key, Priority, SelectionSource};
use crate::ops::Transaction;
use crate::range::{
    apply_attrs_in_block, attrs_after_point, attrs_before_point, block_children,
    is_point_in_block,
};

/// The consistency rules in their fixed execution order. Rules run tier by
/// tier; the type-over restore must observe the document before the
/// post-insert rule reads the caret's neighborhood.
pub const FIXER_PIPELINE: &[(Priority, FixerRule)] = &[
    (Priority::High, FixerRule::TypeOverRestore),
    (Priority::Normal, FixerRule::PostInsert),
    (Priority::Normal, FixerRule::ClickBoundary),
    (Priority::Low, FixerRule::DeleteAfterAnchor),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixerRule {
    TypeOverRestore,
    PostInsert,
    ClickBoundary,
    DeleteAfterAnchor,
}

/// Event-driven heuristics keeping the selection's typing attributes sane
/// around anchored runs. All document mutations go through enqueued
/// transactions, so the rules never create additional undo steps.
#[derive(Default)]
pub struct SelectionFixers {
    /// Set when a delete key is observed, consumed by the next content
    /// notification. Distinguishes explicit deletion from replace-by-typing.
    pending_delete_key: Option<Key>,
}

impl SelectionFixers {
    /// Defensive reset at the start of every top-level user action.
    pub fn begin_action(&mut self) {
        self.pending_delete_key = None;
    }

    pub fn handle(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        event: &EditorEvent,
    ) {
        if let EditorEvent::KeyPressed { key } = event {
            if matches!(key, Key::Backspace | Key::Delete) {
                self.pending_delete_key = Some(*key);
            }
            return;
        }

        for (_, rule) in FIXER_PIPELINE {
            match rule {
                FixerRule::TypeOverRestore => self.restore_type_over(editor, decorators, event),
                FixerRule::PostInsert => self.fix_post_insert(editor, decorators, event),
                FixerRule::ClickBoundary => self.fix_click_boundary(editor, decorators, event),
                FixerRule::DeleteAfterAnchor => {
                    self.fix_delete_after_anchor(editor, decorators, event)
                }
            }
        }
    }

    fn anchor_keys<'a>(&self, decorators: &'a DecoratorRegistry) -> Vec<&'a str> {
        let mut keys = vec![ANCHOR_ATTRIBUTE];
        keys.extend(decorators.manual_ids());
        keys
    }

    fn clear_typing_attrs(&self, editor: &mut Editor, decorators: &DecoratorRegistry) {
        let keys = self.anchor_keys(decorators);
        editor.remove_selection_attrs(keys);
    }

    /// Typing over a selection fully contained in one anchored run keeps the
    /// run: the captured attributes are re-applied to the inserted content.
    /// Explicit deletion must not preserve anything.
    fn restore_type_over(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        event: &EditorEvent,
    ) {
        let EditorEvent::ContentReplaced {
            block,
            range,
            replaced_attrs,
        } = event
        else {
            return;
        };

        if self.pending_delete_key.take().is_some() {
            return;
        }
        let Some(replaced) = replaced_attrs else {
            return;
        };
        if !replaced.contains_key(ANCHOR_ATTRIBUTE) {
            return;
        }

        let restored: Attrs = self
            .anchor_keys(decorators)
            .into_iter()
            .filter_map(|key| replaced.get(key).map(|v| (key.to_string(), v.clone())))
            .collect();
        if restored.is_empty() {
            return;
        }

        let selection = editor.selection().clone();
        let Some(children) = block_children(editor.doc(), block) else {
            return;
        };
        let old_len = children.len();
        let new_children = apply_attrs_in_block(children, range.start, range.end, &|attrs| {
            for (key, value) in &restored {
                attrs.insert(key.clone(), value.clone());
            }
        });

        // The rebuild leaves the text untouched, so the selection maps onto
        // the same global offsets.
        let mut selection_after = selection.clone();
        for point in [&mut selection_after.anchor, &mut selection_after.focus] {
            if is_point_in_block(point, block) {
                let global = crate::range::point_global_offset(
                    children,
                    point.path.last().copied().unwrap_or(0),
                    point.offset,
                );
                *point = crate::range::point_for_global_offset(block, &new_children, global);
            }
        }

        let mut ops = Vec::with_capacity(old_len + new_children.len());
        for child_ix in (0..old_len).rev() {
            let mut path = block.clone();
            path.push(child_ix);
            ops.push(crate::ops::Op::RemoveNode { path });
        }
        for (child_ix, node) in new_children.into_iter().enumerate() {
            let mut path = block.clone();
            path.push(child_ix);
            ops.push(crate::ops::Op::InsertNode { path, node });
        }

        tracing::debug!(?range, "restoring anchor attributes over typed content");
        editor.enqueue(
            Transaction::new(ops)
                .selection_after(selection_after)
                .source("fixer:type-over"),
        );
    }

    /// After a content insertion that lands the caret at the tail of an
    /// anchored run, further typing must not silently extend the run.
    fn fix_post_insert(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        event: &EditorEvent,
    ) {
        let EditorEvent::ContentInserted { block, .. } = event else {
            return;
        };

        let selection = editor.selection().clone();
        if !selection.is_collapsed() || !is_point_in_block(&selection.focus, block) {
            return;
        }

        let doc = editor.doc();
        let Some(before) = attrs_before_point(doc, &selection.focus) else {
            return;
        };
        if !before.contains_key(ANCHOR_ATTRIBUTE) {
            return;
        }
        // Still inside an anchor boundary region: leave state untouched.
        if attrs_after_point(doc, &selection.focus)
            .is_some_and(|attrs| attrs.contains_key(ANCHOR_ATTRIBUTE))
        {
            return;
        }

        tracing::debug!("clearing anchor typing attributes after insertion");
        self.clear_typing_attrs(editor, decorators);
    }

    /// A pointer click landing exactly on a run boundary clears the anchor
    /// typing attributes, so the user can type un-anchored text right next
    /// to an anchor.
    fn fix_click_boundary(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        event: &EditorEvent,
    ) {
        let EditorEvent::SelectionChanged {
            source: SelectionSource::Pointer,
            collapsed: true,
        } = event
        else {
            return;
        };

        let selection = editor.selection().clone();
        let doc = editor.doc();
        let before = attrs_before_point(doc, &selection.focus)
            .and_then(|attrs| attrs.get(ANCHOR_ATTRIBUTE));
        let after = attrs_after_point(doc, &selection.focus)
            .and_then(|attrs| attrs.get(ANCHOR_ATTRIBUTE));

        let at_boundary = match (before, after) {
            (Some(b), Some(a)) => b != a,
            (Some(_), None) | (None, Some(_)) => true,
            (None, None) => false,
        };
        if !at_boundary {
            return;
        }

        tracing::debug!("clearing anchor typing attributes at clicked run boundary");
        self.clear_typing_attrs(editor, decorators);
    }

    /// A Backspace deletion that lands the caret right after an anchored run
    /// (without having deleted run content) clears the anchor typing
    /// attributes — unless caret gravity marks the caret as logically still
    /// inside the run.
    fn fix_delete_after_anchor(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        event: &EditorEvent,
    ) {
        let EditorEvent::ContentDeleted {
            backward,
            deleted_attrs,
        } = event
        else {
            return;
        };
        self.pending_delete_key = None;

        if !backward {
            return;
        }
        if deleted_attrs.contains_key(ANCHOR_ATTRIBUTE) {
            return;
        }
        if editor.caret_gravity() == Gravity::Left {
            return;
        }

        let selection = editor.selection().clone();
        if !selection.is_collapsed() {
            return;
        }
        let doc = editor.doc();
        let Some(before) = attrs_before_point(doc, &selection.focus) else {
            return;
        };
        if !before.contains_key(ANCHOR_ATTRIBUTE) {
            return;
        }
        if attrs_after_point(doc, &selection.focus)
            .is_some_and(|attrs| attrs.contains_key(ANCHOR_ATTRIBUTE))
        {
            return;
        }

        let mut stripped = editor.selection_attrs().clone();
        stripped.remove(ANCHOR_ATTRIBUTE);
        for id in decorators.manual_ids() {
            stripped.remove(id);
        }
        tracing::debug!("deferring anchor typing-attribute clear after backspace");
        editor.enqueue(
            Transaction::default()
                .selection_attrs_after(stripped)
                .source("fixer:delete-after-anchor"),
        );
    }
}
