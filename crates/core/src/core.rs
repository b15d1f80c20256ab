use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EditorEvent, SelectionSource};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::PluginRegistry;

pub type Attrs = BTreeMap<String, Value>;
pub type ElementKind = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Element(ElementNode {
            kind: "paragraph".to_string(),
            attrs: Attrs::default(),
            children: vec![Node::text(text)],
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            attrs: Attrs::default(),
        })
    }

    pub fn text_with(text: impl Into<String>, attrs: Attrs) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            attrs,
        })
    }

    pub fn image(src: impl Into<String>, alt: Option<String>) -> Self {
        let mut attrs = Attrs::default();
        attrs.insert("src".to_string(), Value::String(src.into()));
        if let Some(alt) = alt {
            attrs.insert("alt".to_string(), Value::String(alt));
        }
        Node::Void(VoidNode {
            kind: "image".to_string(),
            attrs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Caret gravity at a run boundary. `Left` marks the caret as logically
/// still inside the preceding run (a host two-step-caret feature sets it);
/// `Right` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
    pub selection_attrs_before: Attrs,
    pub selection_attrs_after: Attrs,
}

#[derive(Debug, Default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    selection_attrs: Attrs,
    caret_gravity: Gravity,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    events: Vec<EditorEvent>,
    enqueued: Vec<Transaction>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        let config = EditorConfig::default().with_defaults();
        let mut editor = Self {
            doc,
            selection,
            selection_attrs: Attrs::default(),
            caret_gravity: Gravity::Right,
            registry,
            config,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            events: Vec::new(),
            enqueued: Vec::new(),
        };
        editor.normalize_in_place();
        editor.selection_attrs = typing_attrs_at(&editor.doc, &editor.selection.focus);
        editor.events.clear();
        editor
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_attrs(&self) -> &Attrs {
        &self.selection_attrs
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn caret_gravity(&self) -> Gravity {
        self.caret_gravity
    }

    pub fn set_caret_gravity(&mut self, gravity: Gravity) {
        self.caret_gravity = gravity;
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.set_selection_with(selection, SelectionSource::Api);
    }

    pub fn set_selection_with(&mut self, selection: Selection, source: SelectionSource) {
        self.selection = self.registry.normalize_selection(&self.doc, &selection);
        self.caret_gravity = Gravity::Right;
        let base = if self.selection.is_collapsed() {
            self.selection.focus.clone()
        } else {
            crate::range::ordered_selection_points(&self.selection).0
        };
        self.selection_attrs = typing_attrs_at(&self.doc, &base);
        self.events.push(EditorEvent::SelectionChanged {
            source,
            collapsed: self.selection.is_collapsed(),
        });
    }

    /// Mutates the typing-attribute set without touching the document.
    pub fn remove_selection_attrs<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.selection_attrs.remove(key);
        }
    }

    pub fn set_selection_attr(&mut self, key: impl Into<String>, value: Value) {
        self.selection_attrs.insert(key.into(), value);
    }

    pub(crate) fn emit(&mut self, event: EditorEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Defers a transaction until the current notification round completes.
    /// Deferred transactions fold into the triggering action's undo record,
    /// so fixups never create additional undo steps.
    pub fn enqueue(&mut self, tx: Transaction) {
        self.enqueued.push(tx);
    }

    pub fn has_enqueued(&self) -> bool {
        !self.enqueued.is_empty()
    }

    pub fn take_enqueued(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.enqueued)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
            selection_attrs_before,
            selection_attrs_after,
        } = record;

        let mut redo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                redo_ops.push(inv);
            } else {
                // If we can't apply inverse ops, stop mutating further.
                break;
            }
        }
        redo_ops.reverse();

        self.selection = selection_before.clone();
        self.selection_attrs = selection_attrs_before.clone();
        self.normalize_in_place();

        self.redo_stack.push(UndoRecord {
            inverse_ops: redo_ops,
            selection_before,
            selection_after,
            selection_attrs_before,
            selection_attrs_after,
        });
        self.events.push(EditorEvent::DocumentChanged {
            source: Some("undo".to_string()),
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
            selection_attrs_before,
            selection_attrs_after,
        } = record;

        let mut undo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                undo_ops.push(inv);
            } else {
                break;
            }
        }
        undo_ops.reverse();

        self.selection = selection_after.clone();
        self.selection_attrs = selection_attrs_after.clone();
        self.normalize_in_place();

        self.undo_stack.push(UndoRecord {
            inverse_ops: undo_ops,
            selection_before,
            selection_after,
            selection_attrs_before,
            selection_attrs_after,
        });
        self.events.push(EditorEvent::DocumentChanged {
            source: Some("redo".to_string()),
        });
        true
    }

    /// Applies one change block: ops, normalization, selection mapping, one
    /// undo record. Observers see the tree only after everything settled.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let selection_before = self.selection.clone();
        let attrs_before = self.selection_attrs.clone();

        let inverse_ops = self.apply_tx_inner(&tx)?;

        let selection_after = self.selection.clone();
        let attrs_after = self.selection_attrs.clone();

        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before: selection_before.clone(),
            selection_after: selection_after.clone(),
            selection_attrs_before: attrs_before,
            selection_attrs_after: attrs_after,
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }

        self.emit_change_events(&tx, &selection_before, &selection_after);
        Ok(())
    }

    /// Applies a deferred fixup transaction, folding its inverse ops into
    /// the most recent undo record.
    pub fn apply_followup(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let selection_before = self.selection.clone();

        let mut inverse_ops = self.apply_tx_inner(&tx)?;

        let selection_after = self.selection.clone();
        if let Some(record) = self.undo_stack.last_mut() {
            // Followup inverses must run before the main inverses on undo.
            inverse_ops.extend(std::mem::take(&mut record.inverse_ops));
            record.inverse_ops = inverse_ops;
            record.selection_after = selection_after.clone();
            record.selection_attrs_after = self.selection_attrs.clone();
        }

        self.emit_change_events(&tx, &selection_before, &selection_after);
        Ok(())
    }

    fn apply_tx_inner(&mut self, tx: &Transaction) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops.iter().cloned() {
            let inv = self.apply_op(op)?;
            inverse_ops.push(inv);
        }

        if let Some(sel) = &tx.selection_after {
            self.selection = sel.clone();
        }

        let mut inverse_normalize = self.normalize_with_inverse_ops()?;
        inverse_ops.append(&mut inverse_normalize);
        inverse_ops.reverse();

        self.normalize_selection_in_place();

        if let Some(attrs) = &tx.selection_attrs_after {
            self.selection_attrs = attrs.clone();
        } else if !tx.ops.is_empty() {
            self.selection_attrs = typing_attrs_at(&self.doc, &self.selection.focus);
        }

        Ok(inverse_ops)
    }

    fn emit_change_events(
        &mut self,
        tx: &Transaction,
        selection_before: &Selection,
        selection_after: &Selection,
    ) {
        if !tx.ops.is_empty() {
            self.events.push(EditorEvent::DocumentChanged {
                source: tx.meta.source.clone(),
            });
        }
        if selection_before != selection_after {
            self.events.push(EditorEvent::SelectionChanged {
                source: SelectionSource::Mutation,
                collapsed: selection_after.is_collapsed(),
            });
        }
    }

    fn normalize_in_place(&mut self) {
        let _ = self.normalize_with_inverse_ops();
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .registry
            .normalize_selection(&self.doc, &self.selection);
    }

    fn normalize_with_inverse_ops(&mut self) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc);
            if ops.is_empty() {
                return Ok(inverse_ops);
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.push(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, ApplyError> {
        apply_op_to(&mut self.doc, &mut self.selection, op)
    }
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeAttrs { path, patch } => {
            let node = node_mut(doc, &path)?;
            let old = match node {
                Node::Element(el) => patch_apply(&mut el.attrs, &patch),
                Node::Void(v) => patch_apply(&mut v.attrs, &patch),
                Node::Text(_) => {
                    return Err(ApplyError::InvalidPath(
                        "Use SetTextAttrs for text nodes".into(),
                    ));
                }
            };
            Ok(Op::SetNodeAttrs { path, patch: old })
        }
        Op::SetTextAttrs { path, attrs } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.attrs, attrs);
            Ok(Op::SetTextAttrs { path, attrs: old })
        }
    }
}

#[derive(Debug)]
pub enum ApplyError {
    InvalidPath(String),
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug)]
pub struct PathError(pub String);

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

/// Typing attributes for a caret: the attributes of the text node at the
/// caret, preferring the node before the caret at node boundaries so a
/// caret sitting right after a run inherits that run.
pub fn typing_attrs_at(doc: &Document, point: &Point) -> Attrs {
    let Some(Node::Text(text)) = node_at(doc, &point.path) else {
        return Attrs::default();
    };

    if point.offset > 0 || text.text.is_empty() {
        return text.attrs.clone();
    }

    let Some((&child_ix, parent_path)) = point.path.split_last() else {
        return text.attrs.clone();
    };
    let siblings = match parent_path {
        [] => &doc.children,
        _ => match node_at(doc, parent_path) {
            Some(Node::Element(el)) => &el.children,
            _ => return text.attrs.clone(),
        },
    };

    match child_ix.checked_sub(1).and_then(|ix| siblings.get(ix)) {
        Some(Node::Text(prev)) => prev.attrs.clone(),
        _ => text.attrs.clone(),
    }
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    if path.is_empty() {
        return;
    }
    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match node_at(doc_after_remove, &left_path) {
                Some(Node::Text(left_text))
                    if left_text.attrs == removed_text.attrs
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

pub fn node_at<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    if path.is_empty() {
        return None;
    }

    let mut node = doc.children.get(path[0])?;
    for &ix in path.iter().skip(1) {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) => return None,
        };
    }
    Some(node)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    if path.is_empty() {
        return Err(PathError("Empty path".into()));
    }

    let mut current: *mut Node = std::ptr::null_mut();
    let mut children: *mut Vec<Node> = &mut doc.children;

    for (depth, &ix) in path.iter().enumerate() {
        // SAFETY: We only keep raw pointers within this loop iteration.
        let vec = unsafe { &mut *children };
        if ix >= vec.len() {
            return Err(PathError(format!(
                "Path out of bounds at depth {depth}: {ix} >= {}",
                vec.len()
            )));
        }
        current = &mut vec[ix];
        if depth + 1 < path.len() {
            children = match unsafe { &mut *current } {
                Node::Element(el) => &mut el.children,
                Node::Void(_) | Node::Text(_) => {
                    return Err(PathError(format!("Non-container node at depth {depth}")));
                }
            };
        }
    }

    // SAFETY: current points to a node in the document tree.
    unsafe { current.as_mut() }.ok_or_else(|| PathError("Failed to resolve path".into()))
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError("Empty insert path".into()));
    }

    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    let children = if parent_path.is_empty() {
        &mut doc.children
    } else {
        match node_mut(doc, parent_path)? {
            Node::Element(el) => &mut el.children,
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError("Insert parent is not a container".into()));
            }
        }
    };

    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    if path.is_empty() {
        return Err(PathError("Empty remove path".into()));
    }

    let (parent_path, index) = path.split_at(path.len() - 1);
    let index = index[0];

    let children = if parent_path.is_empty() {
        &mut doc.children
    } else {
        match node_mut(doc, parent_path)? {
            Node::Element(el) => &mut el.children,
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError("Remove parent is not a container".into()));
            }
        }
    };

    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttrPatch {
    #[serde(default)]
    pub set: Attrs,
    #[serde(default)]
    pub remove: Vec<String>,
}

fn patch_apply(attrs: &mut Attrs, patch: &AttrPatch) -> AttrPatch {
    let mut old_set: Attrs = Attrs::new();
    let mut old_remove: Vec<String> = Vec::new();

    for (k, v) in &patch.set {
        if let Some(prev) = attrs.insert(k.clone(), v.clone()) {
            old_set.insert(k.clone(), prev);
        } else {
            old_remove.push(k.clone());
        }
    }

    for key in &patch.remove {
        if let Some(prev) = attrs.remove(key) {
            old_set.insert(key.clone(), prev);
        }
    }

    AttrPatch {
        set: old_set,
        remove: old_remove,
    }
}
