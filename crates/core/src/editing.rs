use crate::commands::{AnchorCommand, DecoratorToggles, UnanchorCommand, ANCHOR_ATTRIBUTE};
use crate::config::AnchorConfig;
use crate::core::{Attrs, Document, Editor, Gravity, Node, Point, Selection};
use crate::decorators::DecoratorRegistry;
use crate::events::{EditorEvent, Key, SelectionSource};
use crate::fixers::SelectionFixers;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{EditorPlugin, PluginRegistry};
use crate::range::{
    block_children, find_attribute_range, ordered_selection_points, point_for_global_offset,
    point_global_offset, replace_inline_range, total_inline_text_len,
};

/// Registers the anchor attribute and the decorator model attributes with
/// the schema, and grants the anchor attribute on image blocks.
struct AnchorPlugin {
    text_attributes: Vec<String>,
}

impl EditorPlugin for AnchorPlugin {
    fn id(&self) -> &'static str {
        "anchor"
    }

    fn text_attributes(&self) -> Vec<String> {
        self.text_attributes.clone()
    }

    fn block_attributes(&self) -> Vec<(String, String)> {
        vec![("image".to_string(), ANCHOR_ATTRIBUTE.to_string())]
    }
}

/// The assembled anchor feature: editor, decorator registry, commands and
/// consistency fixers, plus the minimal editing surface the fixers hook.
///
/// Every public editing method is one top-level user action: one change
/// block, one notification round, commands refreshed at the end.
pub struct AnchorEditing {
    editor: Editor,
    decorators: DecoratorRegistry,
    pub anchor: AnchorCommand,
    pub unanchor: UnanchorCommand,
    fixers: SelectionFixers,
    config: AnchorConfig,
    ui_events: Vec<EditorEvent>,
}

impl AnchorEditing {
    pub fn new(config: AnchorConfig) -> Self {
        Self::with_document(
            Document {
                children: vec![Node::paragraph("")],
            },
            config,
        )
    }

    pub fn with_document(doc: Document, config: AnchorConfig) -> Self {
        let decorators = DecoratorRegistry::from_config(&config);

        let mut registry = PluginRegistry::core();
        let mut text_attributes = vec![ANCHOR_ATTRIBUTE.to_string()];
        text_attributes.extend(decorators.manual_ids().map(str::to_string));
        registry
            .register_plugin(Box::new(AnchorPlugin { text_attributes }))
            .expect("anchor plugin must register");

        let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        let editor = Editor::new(doc, selection, registry);

        let mut editing = Self {
            editor,
            decorators,
            anchor: AnchorCommand::default(),
            unanchor: UnanchorCommand::default(),
            fixers: SelectionFixers::default(),
            config,
            ui_events: Vec::new(),
        };
        editing.refresh_commands();
        editing
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn doc(&self) -> &Document {
        self.editor.doc()
    }

    pub fn selection_attrs(&self) -> &Attrs {
        self.editor.selection_attrs()
    }

    pub fn decorators(&self) -> &DecoratorRegistry {
        &self.decorators
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn take_ui_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.ui_events)
    }

    pub fn set_caret_gravity(&mut self, gravity: Gravity) {
        self.editor.set_caret_gravity(gravity);
    }

    pub fn select(&mut self, selection: Selection) {
        self.fixers.begin_action();
        self.editor.set_selection(selection);
        self.pump();
    }

    /// A pointer click collapsing the selection at `point`.
    pub fn click(&mut self, point: Point) {
        self.fixers.begin_action();
        self.editor
            .set_selection_with(Selection::collapsed(point), SelectionSource::Pointer);
        self.pump();
    }

    /// Selects a whole top-level block element (e.g. an image) by spanning
    /// from the end of the preceding text block to the start of the
    /// following one.
    pub fn select_block_element(&mut self, ix: usize) {
        let doc = self.editor.doc();
        let before = ix
            .checked_sub(1)
            .and_then(|prev| text_block_edge(doc, prev, Edge::End));
        let after = text_block_edge(doc, ix + 1, Edge::Start);
        let (Some(anchor), Some(focus)) = (before, after) else {
            return;
        };

        self.fixers.begin_action();
        self.editor.set_selection(Selection { anchor, focus });
        self.pump();
    }

    /// Types `text` at the selection, replacing selected content. Typed
    /// content carries the current typing attributes.
    pub fn insert_text(&mut self, text: &str) {
        self.fixers.begin_action();

        let selection = self.editor.selection().clone();
        if selection.is_collapsed() {
            self.splice_at_caret(&selection.focus, text);
        } else {
            self.replace_selection(&selection, text);
        }
        self.pump();
    }

    /// Inserts external content (paste or programmatic insertion) at a
    /// collapsed caret, carrying `attrs`.
    pub fn insert_content(&mut self, text: &str, attrs: Attrs) {
        self.fixers.begin_action();

        let focus = self.editor.selection().focus.clone();
        let Some((&child_ix, block_path)) = focus.path.split_last() else {
            return;
        };
        let block = block_path.to_vec();
        let Some(children) = block_children(self.editor.doc(), &block) else {
            return;
        };
        let old_len = children.len();
        let caret = point_global_offset(children, child_ix, focus.offset);
        let new_children = replace_inline_range(
            children,
            caret,
            caret,
            Some(Node::text_with(text, attrs)),
        );
        let after = point_for_global_offset(&block, &new_children, caret + text.len());

        let tx = Transaction::new(rebuild_ops(&block, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .source("insert-content");
        let _ = self.editor.apply(tx);

        self.editor.emit(EditorEvent::ContentInserted {
            block,
            range: caret..caret + text.len(),
        });
        self.pump();
    }

    pub fn backspace(&mut self) {
        self.delete(Key::Backspace);
    }

    pub fn delete_forward(&mut self) {
        self.delete(Key::Delete);
    }

    fn delete(&mut self, key: Key) {
        self.fixers.begin_action();
        self.editor.emit(EditorEvent::KeyPressed { key });
        let backward = key == Key::Backspace;

        let selection = self.editor.selection().clone();
        if !selection.is_collapsed() {
            self.delete_selection(&selection, backward);
            self.pump();
            return;
        }

        let focus = selection.focus;
        let Some((&child_ix, block_path)) = focus.path.split_last() else {
            self.pump();
            return;
        };
        let block = block_path.to_vec();
        let Some(children) = block_children(self.editor.doc(), &block) else {
            self.pump();
            return;
        };
        let old_len = children.len();
        let caret = point_global_offset(children, child_ix, focus.offset);

        let Some((range, deleted_attrs)) = (if backward {
            deletion_range_before(children, caret)
        } else {
            deletion_range_after(children, caret)
        }) else {
            // Block boundary; merging blocks is the host engine's concern.
            self.pump();
            return;
        };

        let new_children = replace_inline_range(children, range.start, range.end, None);
        let after = point_for_global_offset(&block, &new_children, range.start);

        let tx = Transaction::new(rebuild_ops(&block, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .source("delete");
        let _ = self.editor.apply(tx);

        self.editor.emit(EditorEvent::ContentDeleted {
            backward,
            deleted_attrs,
        });
        self.pump();
    }

    /// Inserts an image void block after the caret's block, with a trailing
    /// paragraph holding the caret.
    pub fn insert_image(&mut self, src: &str, alt: Option<String>) {
        self.fixers.begin_action();

        let focus = self.editor.selection().focus.clone();
        let block_ix = focus.path.first().copied().unwrap_or(0);
        let image_path = vec![block_ix + 1];
        let paragraph_path = vec![block_ix + 2];
        let caret_path = vec![block_ix + 2, 0];

        let tx = Transaction::new(vec![
            Op::InsertNode {
                path: image_path,
                node: Node::image(src, alt),
            },
            Op::InsertNode {
                path: paragraph_path,
                node: Node::paragraph(""),
            },
        ])
        .selection_after(Selection::collapsed(Point::new(caret_path, 0)))
        .source("command:image.insert");
        let _ = self.editor.apply(tx);
        self.pump();
    }

    /// Applies the anchor command. The `is_enabled` gate lives here: the
    /// command itself performs no validation.
    pub fn apply_anchor(&mut self, value: &str, toggles: &DecoratorToggles) {
        if !self.anchor.is_enabled {
            return;
        }
        self.fixers.begin_action();
        self.anchor
            .execute(&mut self.editor, &self.decorators, value, toggles);
        self.pump();
    }

    pub fn remove_anchor(&mut self) {
        if !self.unanchor.is_enabled {
            return;
        }
        self.fixers.begin_action();
        self.unanchor.execute(&mut self.editor, &self.decorators);
        self.pump();
    }

    pub fn undo(&mut self) -> bool {
        self.fixers.begin_action();
        let undone = self.editor.undo();
        self.pump();
        undone
    }

    pub fn redo(&mut self) -> bool {
        self.fixers.begin_action();
        let redone = self.editor.redo();
        self.pump();
        redone
    }

    fn splice_at_caret(&mut self, focus: &Point, text: &str) {
        let Some((&child_ix, block_path)) = focus.path.split_last() else {
            return;
        };
        let block = block_path.to_vec();
        let Some(children) = block_children(self.editor.doc(), &block) else {
            return;
        };
        let old_len = children.len();
        let caret = point_global_offset(children, child_ix, focus.offset);
        let attrs = self.editor.selection_attrs().clone();
        let new_children =
            replace_inline_range(children, caret, caret, Some(Node::text_with(text, attrs)));
        let after = point_for_global_offset(&block, &new_children, caret + text.len());

        let tx = Transaction::new(rebuild_ops(&block, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .source("input");
        let _ = self.editor.apply(tx);
    }

    fn replace_selection(&mut self, selection: &Selection, text: &str) {
        let (start, end) = ordered_selection_points(selection);
        if start.path.first() != end.path.first() {
            tracing::debug!("cross-block replacement is owned by the host engine");
            return;
        }
        let Some((_, block_path)) = start.path.split_last() else {
            return;
        };
        let block = block_path.to_vec();
        let Some(children) = block_children(self.editor.doc(), &block) else {
            return;
        };
        let old_len = children.len();
        let start_global =
            point_global_offset(children, *start.path.last().unwrap_or(&0), start.offset);
        let end_global = point_global_offset(children, *end.path.last().unwrap_or(&0), end.offset);

        // Capture the replaced attributes while the run is still intact, but
        // only when the whole selection sits inside one anchored run.
        let replaced_attrs = captured_run_attrs(
            self.editor.doc(),
            &start,
            children,
            start_global,
            end_global,
        );

        let replacement = (!text.is_empty())
            .then(|| Node::text_with(text, self.editor.selection_attrs().clone()));
        let new_children = replace_inline_range(children, start_global, end_global, replacement);
        let after = point_for_global_offset(&block, &new_children, start_global + text.len());

        let tx = Transaction::new(rebuild_ops(&block, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .source("input");
        let _ = self.editor.apply(tx);

        self.editor.emit(EditorEvent::ContentReplaced {
            block,
            range: start_global..start_global + text.len(),
            replaced_attrs,
        });
    }

    fn delete_selection(&mut self, selection: &Selection, backward: bool) {
        let (start, end) = ordered_selection_points(selection);
        if start.path.first() != end.path.first() {
            tracing::debug!("cross-block deletion is owned by the host engine");
            return;
        }
        let Some((_, block_path)) = start.path.split_last() else {
            return;
        };
        let block = block_path.to_vec();
        let Some(children) = block_children(self.editor.doc(), &block) else {
            return;
        };
        let old_len = children.len();
        let start_global =
            point_global_offset(children, *start.path.last().unwrap_or(&0), start.offset);
        let end_global = point_global_offset(children, *end.path.last().unwrap_or(&0), end.offset);

        let deleted_attrs = attrs_of_slice(children, start_global).unwrap_or_default();
        let new_children = replace_inline_range(children, start_global, end_global, None);
        let after = point_for_global_offset(&block, &new_children, start_global);

        let tx = Transaction::new(rebuild_ops(&block, old_len, &new_children))
            .selection_after(Selection::collapsed(after))
            .source("delete");
        let _ = self.editor.apply(tx);

        self.editor.emit(EditorEvent::ContentDeleted {
            backward,
            deleted_attrs,
        });
    }

    /// Drains notifications through the fixer pipeline, applies enqueued
    /// fixups, and refreshes command state. Bounded so a misbehaving fixup
    /// cannot loop forever.
    fn pump(&mut self) {
        for _ in 0..8 {
            let events = self.editor.take_events();
            if events.is_empty() && !self.editor.has_enqueued() {
                break;
            }
            for event in &events {
                self.fixers
                    .handle(&mut self.editor, &self.decorators, event);
            }
            self.ui_events.extend(events);
            for tx in self.editor.take_enqueued() {
                let _ = self.editor.apply_followup(tx);
            }
        }
        self.refresh_commands();
    }

    fn refresh_commands(&mut self) {
        self.anchor.refresh(&self.editor, &mut self.decorators);
        self.unanchor.refresh(&self.editor);
    }
}

fn rebuild_ops(block: &Path, old_len: usize, new_children: &[Node]) -> Vec<Op> {
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

enum Edge {
    Start,
    End,
}

fn text_block_edge(doc: &Document, ix: usize, edge: Edge) -> Option<Point> {
    let Node::Element(el) = doc.children.get(ix)? else {
        return None;
    };
    let global = match edge {
        Edge::Start => 0,
        Edge::End => total_inline_text_len(&el.children),
    };
    Some(point_for_global_offset(&[ix], &el.children, global))
}

/// Attributes of the text slice at `global`, if any.
fn attrs_of_slice(children: &[Node], global: usize) -> Option<Attrs> {
    let mut cursor = 0usize;
    for node in children {
        let Node::Text(t) = node else { continue };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;
        if global >= node_start && global < node_end {
            return Some(t.attrs.clone());
        }
    }
    None
}

/// The replaced range's attributes, captured iff the whole range sits
/// inside one anchored run.
fn captured_run_attrs(
    doc: &Document,
    start: &Point,
    children: &[Node],
    start_global: usize,
    end_global: usize,
) -> Option<Attrs> {
    let attrs = attrs_of_slice(children, start_global)?;
    let value = attrs.get(ANCHOR_ATTRIBUTE)?.clone();
    let run = find_attribute_range(doc, start, ANCHOR_ATTRIBUTE, &value);
    (run.range.start <= start_global && end_global <= run.range.end).then_some(attrs)
}

/// One char-wide deletion range ending at `caret`, with the attributes of
/// the deleted content.
fn deletion_range_before(
    children: &[Node],
    caret: usize,
) -> Option<(std::ops::Range<usize>, Attrs)> {
    let mut cursor = 0usize;
    for node in children {
        let Node::Text(t) = node else { continue };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;
        if caret > node_start && caret <= node_end {
            let rel = caret - node_start;
            let prev = t.text[..rel].char_indices().next_back()?.0;
            return Some((node_start + prev..caret, t.attrs.clone()));
        }
    }
    None
}

/// One char-wide deletion range starting at `caret`.
fn deletion_range_after(
    children: &[Node],
    caret: usize,
) -> Option<(std::ops::Range<usize>, Attrs)> {
    let mut cursor = 0usize;
    for node in children {
        let Node::Text(t) = node else { continue };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;
        if caret >= node_start && caret < node_end {
            let rel = caret - node_start;
            let ch = t.text[rel..].chars().next()?;
            return Some((caret..caret + ch.len_utf8(), t.attrs.clone()));
        }
    }
    None
}
