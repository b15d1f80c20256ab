use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::core::{node_at, Attrs, Document, Editor, Node, Point, Selection};
use crate::decorators::DecoratorRegistry;
use crate::ops::{Op, Path, Transaction};
use crate::range::{
    apply_attrs_in_block, block_children, find_attribute_range, is_point_in_block,
    ordered_selection_points, point_for_global_offset, point_global_offset,
    replace_inline_range, selected_eligible_block, valid_attribute_targets, AttributeTarget,
};

/// The model attribute carried by every node of an anchored run.
pub const ANCHOR_ATTRIBUTE: &str = "anchorId";

/// Decorator toggles passed to [`AnchorCommand::execute`], keyed by
/// decorator id.
pub type DecoratorToggles = BTreeMap<String, bool>;

fn partition_toggles(toggles: &DecoratorToggles) -> (Vec<&str>, Vec<&str>) {
    let mut truthy = Vec::new();
    let mut falsy = Vec::new();
    for (id, on) in toggles {
        if *on {
            truthy.push(id.as_str());
        } else {
            falsy.push(id.as_str());
        }
    }
    (truthy, falsy)
}

/// Ops replacing a block's inline children wholesale: remove in reverse,
/// reinsert the rebuilt list.
fn rebuild_block_ops(block: &Path, old_len: usize, new_children: &[Node]) -> Vec<Op> {
    let mut ops = Vec::with_capacity(old_len + new_children.len());
    for child_ix in (0..old_len).rev() {
        let mut path = block.clone();
        path.push(child_ix);
        ops.push(Op::RemoveNode { path });
    }
    for (child_ix, node) in new_children.iter().cloned().enumerate() {
        let mut path = block.clone();
        path.push(child_ix);
        ops.push(Op::InsertNode { path, node });
    }
    ops
}

/// Scans the covered text slices of a non-collapsed selection; returns the
/// attribute value when every slice carries the same one.
fn uniform_text_attr(doc: &Document, selection: &Selection, key: &str) -> Option<Value> {
    let (start, end) = ordered_selection_points(selection);
    let start_ix = start.path.first().copied().unwrap_or(0);
    let end_ix = end.path.first().copied().unwrap_or(0);

    let mut found: Option<Option<Value>> = None;
    for ix in start_ix..=end_ix {
        let Some(Node::Element(el)) = doc.children.get(ix) else {
            continue;
        };
        let total = crate::range::total_inline_text_len(&el.children);
        let local_start = if ix == start_ix {
            point_global_offset(&el.children, *start.path.last().unwrap_or(&0), start.offset)
        } else {
            0
        };
        let local_end = if ix == end_ix {
            point_global_offset(&el.children, *end.path.last().unwrap_or(&0), end.offset)
        } else {
            total
        };

        let mut cursor = 0usize;
        for node in &el.children {
            let Node::Text(t) = node else { continue };
            let node_start = cursor;
            let node_end = cursor + t.text.len();
            cursor = node_end;

            if local_end <= node_start || local_start >= node_end {
                continue;
            }
            let value = t.attrs.get(key).cloned();
            match &mut found {
                None => found = Some(value),
                Some(existing) => {
                    if *existing != value {
                        return None;
                    }
                }
            }
        }
    }

    found.flatten()
}

fn attrs_at_selection_start(doc: &Document, selection: &Selection) -> Attrs {
    let (start, _) = ordered_selection_points(selection);
    let Some((&child_ix, block_path)) = start.path.split_last() else {
        return Attrs::default();
    };
    let Some(children) = block_children(doc, block_path) else {
        return Attrs::default();
    };
    match children.get(child_ix) {
        Some(Node::Text(t)) if start.offset < t.text.len() => t.attrs.clone(),
        Some(Node::Text(t)) => match children.get(child_ix + 1) {
            Some(Node::Text(next)) => next.attrs.clone(),
            _ => t.attrs.clone(),
        },
        _ => Attrs::default(),
    }
}

fn caret_is_in_text(doc: &Document, point: &Point) -> bool {
    matches!(node_at(doc, &point.path), Some(Node::Text(_)))
}

/// Applies or updates the anchor attribute (and the manual-decorator
/// attributes riding along with it) over the selection.
///
/// `value` / `is_enabled` are recomputed on every refresh; `execute`
/// performs no validation of its own — callers gate on `is_enabled`.
#[derive(Debug, Default)]
pub struct AnchorCommand {
    pub value: Option<String>,
    pub is_enabled: bool,
}

impl AnchorCommand {
    pub fn refresh(&mut self, editor: &Editor, decorators: &mut DecoratorRegistry) {
        let doc = editor.doc();
        let registry = editor.registry();
        let selection = editor.selection();

        if let Some(path) = selected_eligible_block(doc, registry, selection, ANCHOR_ATTRIBUTE) {
            let attrs = match node_at(doc, &path) {
                Some(Node::Void(v)) => Some(&v.attrs),
                Some(Node::Element(el)) => Some(&el.attrs),
                _ => None,
            };
            self.value = attrs
                .and_then(|a| a.get(ANCHOR_ATTRIBUTE))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            self.is_enabled = true;
            for decorator in decorators.manual_mut() {
                decorator.value = attrs
                    .and_then(|a| a.get(&decorator.id))
                    .and_then(|v| v.as_bool());
            }
            return;
        }

        if selection.is_collapsed() {
            self.value = editor
                .selection_attrs()
                .get(ANCHOR_ATTRIBUTE)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            self.is_enabled = registry.is_text_attribute_allowed(ANCHOR_ATTRIBUTE)
                && caret_is_in_text(doc, &selection.focus);
            for decorator in decorators.manual_mut() {
                decorator.value = editor
                    .selection_attrs()
                    .get(&decorator.id)
                    .and_then(|v| v.as_bool());
            }
            return;
        }

        self.value = uniform_text_attr(doc, selection, ANCHOR_ATTRIBUTE)
            .and_then(|v| v.as_str().map(str::to_string));
        self.is_enabled =
            !valid_attribute_targets(doc, registry, selection, ANCHOR_ATTRIBUTE).is_empty();
        for decorator in decorators.manual_mut() {
            decorator.value =
                uniform_text_attr(doc, selection, &decorator.id).and_then(|v| v.as_bool());
        }
    }

    pub fn execute(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        value: &str,
        toggles: &DecoratorToggles,
    ) {
        tracing::debug!(value, ?toggles, "anchor.execute");
        let (truthy, falsy) = partition_toggles(toggles);
        let set_attrs = |attrs: &mut Attrs| {
            attrs.insert(ANCHOR_ATTRIBUTE.to_string(), json!(value));
            for id in &truthy {
                attrs.insert((*id).to_string(), json!(true));
            }
            for id in &falsy {
                attrs.remove(*id);
            }
        };

        let selection = editor.selection().clone();

        if let Some(path) = selected_eligible_block(
            editor.doc(),
            editor.registry(),
            &selection,
            ANCHOR_ATTRIBUTE,
        ) {
            let mut set = Attrs::default();
            set.insert(ANCHOR_ATTRIBUTE.to_string(), json!(value));
            for id in &truthy {
                set.insert((*id).to_string(), json!(true));
            }
            let patch = crate::core::AttrPatch {
                set,
                remove: falsy.iter().map(|id| (*id).to_string()).collect(),
            };
            let tx = Transaction::new(vec![Op::SetNodeAttrs { path, patch }])
                .source("command:anchor.set");
            let _ = editor.apply(tx);
            return;
        }

        if selection.is_collapsed() {
            self.execute_collapsed(editor, decorators, value, &set_attrs);
            return;
        }

        let targets = valid_attribute_targets(
            editor.doc(),
            editor.registry(),
            &selection,
            ANCHOR_ATTRIBUTE,
        );
        let tx = retarget_attrs_tx(editor.doc(), &selection, &targets, &set_attrs, &truthy, &falsy)
            .source("command:anchor.set");
        let _ = editor.apply(tx);
    }

    fn execute_collapsed(
        &mut self,
        editor: &mut Editor,
        decorators: &DecoratorRegistry,
        value: &str,
        set_attrs: &dyn Fn(&mut Attrs),
    ) {
        let focus = editor.selection().focus.clone();
        let mut stripped = editor.selection_attrs().clone();
        stripped.remove(ANCHOR_ATTRIBUTE);
        for id in decorators.manual_ids() {
            stripped.remove(id);
        }

        let current = editor.selection_attrs().get(ANCHOR_ATTRIBUTE).cloned();

        if let Some(current) = current {
            // Inside an existing run: recompute it and update it wholesale,
            // then park the caret right after it.
            let run = find_attribute_range(editor.doc(), &focus, ANCHOR_ATTRIBUTE, &current);
            let Some(children) = block_children(editor.doc(), &run.block) else {
                return;
            };
            let old_len = children.len();
            let new_children =
                apply_attrs_in_block(children, run.range.start, run.range.end, set_attrs);
            let after = point_for_global_offset(&run.block, &new_children, run.range.end);

            let tx = Transaction::new(rebuild_block_ops(&run.block, old_len, &new_children))
                .selection_after(Selection::collapsed(after))
                .selection_attrs_after(stripped)
                .source("command:anchor.set");
            let _ = editor.apply(tx);
            return;
        }

        if value.is_empty() {
            // Nothing to insert; still make sure further typing does not
            // inherit anchor attributes.
            editor.remove_selection_attrs(
                std::iter::once(ANCHOR_ATTRIBUTE).chain(decorators.manual_ids()),
            );
            return;
        }

        let Some((&child_ix, block_path)) = focus.path.split_last() else {
            return;
        };
        let block_path = block_path.to_vec();
        let Some(children) = block_children(editor.doc(), &block_path) else {
            return;
        };
        let old_len = children.len();
        let caret_global = point_global_offset(children, child_ix, focus.offset);

        // The carrier text node: content equals the anchor value, attributes
        // are the typing attributes plus the anchor and "on" decorators.
        let mut attrs = editor.selection_attrs().clone();
        set_attrs(&mut attrs);
        let new_children = replace_inline_range(
            children,
            caret_global,
            caret_global,
            Some(Node::text_with(value, attrs)),
        );
        let after = point_for_global_offset(&block_path, &new_children, caret_global + value.len());

        let tx = Transaction::new(rebuild_block_ops(&block_path, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .selection_attrs_after(stripped)
            .source("command:anchor.set");
        let _ = editor.apply(tx);
    }
}

/// Removes the anchor attribute and every manual-decorator attribute over
/// the selection.
#[derive(Debug, Default)]
pub struct UnanchorCommand {
    pub is_enabled: bool,
}

impl UnanchorCommand {
    pub fn refresh(&mut self, editor: &Editor) {
        let doc = editor.doc();
        let selection = editor.selection();

        if let Some(path) =
            selected_eligible_block(doc, editor.registry(), selection, ANCHOR_ATTRIBUTE)
        {
            self.is_enabled = match node_at(doc, &path) {
                Some(Node::Void(v)) => v.attrs.contains_key(ANCHOR_ATTRIBUTE),
                Some(Node::Element(el)) => el.attrs.contains_key(ANCHOR_ATTRIBUTE),
                _ => false,
            };
            return;
        }

        if selection.is_collapsed() {
            self.is_enabled = editor.selection_attrs().contains_key(ANCHOR_ATTRIBUTE);
            return;
        }

        self.is_enabled = attrs_at_selection_start(doc, selection).contains_key(ANCHOR_ATTRIBUTE);
    }

    pub fn execute(&mut self, editor: &mut Editor, decorators: &DecoratorRegistry) {
        tracing::debug!("anchor.unset");
        let clear_attrs = |attrs: &mut Attrs| {
            attrs.remove(ANCHOR_ATTRIBUTE);
            for id in decorators.manual_ids() {
                attrs.remove(id);
            }
        };
        let removed_keys: Vec<String> = std::iter::once(ANCHOR_ATTRIBUTE.to_string())
            .chain(decorators.manual_ids().map(str::to_string))
            .collect();

        let selection = editor.selection().clone();

        if let Some(path) = selected_eligible_block(
            editor.doc(),
            editor.registry(),
            &selection,
            ANCHOR_ATTRIBUTE,
        ) {
            let patch = crate::core::AttrPatch {
                set: Attrs::default(),
                remove: removed_keys,
            };
            let tx = Transaction::new(vec![Op::SetNodeAttrs { path, patch }])
                .source("command:anchor.unset");
            let _ = editor.apply(tx);
            return;
        }

        if selection.is_collapsed() {
            let Some(current) = editor.selection_attrs().get(ANCHOR_ATTRIBUTE).cloned() else {
                return;
            };
            let focus = selection.focus.clone();
            let run = find_attribute_range(editor.doc(), &focus, ANCHOR_ATTRIBUTE, &current);
            let Some(children) = block_children(editor.doc(), &run.block) else {
                return;
            };
            let old_len = children.len();
            let caret_global =
                point_global_offset(children, *focus.path.last().unwrap_or(&0), focus.offset);
            let new_children =
                apply_attrs_in_block(children, run.range.start, run.range.end, &clear_attrs);
            let after = point_for_global_offset(&run.block, &new_children, caret_global);

            let mut stripped = editor.selection_attrs().clone();
            for key in &removed_keys {
                stripped.remove(key);
            }

            let tx = Transaction::new(rebuild_block_ops(&run.block, old_len, &new_children))
                .selection_after(Selection::collapsed(after))
                .selection_attrs_after(stripped)
                .source("command:anchor.unset");
            let _ = editor.apply(tx);
            return;
        }

        let targets = valid_attribute_targets(
            editor.doc(),
            editor.registry(),
            &selection,
            ANCHOR_ATTRIBUTE,
        );
        let falsy: Vec<&str> = removed_keys.iter().map(String::as_str).collect();
        let tx = retarget_attrs_tx(editor.doc(), &selection, &targets, &clear_attrs, &[], &falsy)
            .source("command:anchor.unset");
        let _ = editor.apply(tx);
    }
}

/// Builds one transaction applying `apply` over every target, keeping the
/// selection anchored to the same inline offsets through the rebuilds.
fn retarget_attrs_tx(
    doc: &Document,
    selection: &Selection,
    targets: &[AttributeTarget],
    apply: &dyn Fn(&mut Attrs),
    set_true: &[&str],
    remove: &[&str],
) -> Transaction {
    let mut ops: Vec<Op> = Vec::new();
    let mut new_anchor = selection.anchor.clone();
    let mut new_focus = selection.focus.clone();

    for target in targets {
        match target {
            AttributeTarget::Inline(inline) => {
                let Some(children) = block_children(doc, &inline.block) else {
                    continue;
                };
                let new_children = apply_attrs_in_block(
                    children,
                    inline.range.start,
                    inline.range.end,
                    apply,
                );
                ops.extend(rebuild_block_ops(&inline.block, children.len(), &new_children));

                if is_point_in_block(&new_anchor, &inline.block) {
                    let global = point_global_offset(
                        children,
                        new_anchor.path.last().copied().unwrap_or(0),
                        new_anchor.offset,
                    );
                    new_anchor = point_for_global_offset(&inline.block, &new_children, global);
                }
                if is_point_in_block(&new_focus, &inline.block) {
                    let global = point_global_offset(
                        children,
                        new_focus.path.last().copied().unwrap_or(0),
                        new_focus.offset,
                    );
                    new_focus = point_for_global_offset(&inline.block, &new_children, global);
                }
            }
            AttributeTarget::Block(path) => {
                let mut set = Attrs::default();
                let mut probe = Attrs::default();
                apply(&mut probe);
                if let Some(anchor) = probe.get(ANCHOR_ATTRIBUTE) {
                    set.insert(ANCHOR_ATTRIBUTE.to_string(), anchor.clone());
                }
                for id in set_true {
                    set.insert((*id).to_string(), json!(true));
                }
                ops.push(Op::SetNodeAttrs {
                    path: path.clone(),
                    patch: crate::core::AttrPatch {
                        set,
                        remove: remove.iter().map(|id| (*id).to_string()).collect(),
                    },
                });
            }
        }
    }

    Transaction::new(ops).selection_after(Selection {
        anchor: new_anchor,
        focus: new_focus,
    })
}
