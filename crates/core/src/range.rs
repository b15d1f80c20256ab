use std::ops::Range;

use serde_json::Value;

use crate::core::{clamp_to_char_boundary, node_at, Attrs, Document, Node, Point, Selection};
use crate::ops::Path;
use crate::plugin::{ChildConstraint, PluginRegistry};

/// A contiguous inline range inside one block, in global inline offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineRange {
    pub block: Path,
    pub range: Range<usize>,
}

impl InlineRange {
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// One target of an attribute application: an inline sub-range, or a whole
/// block-level element that accepts the attribute itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeTarget {
    Inline(InlineRange),
    Block(Path),
}

pub(crate) fn block_children<'a>(doc: &'a Document, block_path: &[usize]) -> Option<&'a [Node]> {
    if block_path.is_empty() {
        return None;
    }
    match node_at(doc, block_path)? {
        Node::Element(el) => Some(&el.children),
        _ => None,
    }
}

pub fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();

    if start.path == end.path {
        if end.offset < start.offset {
            std::mem::swap(&mut start, &mut end);
        }
        return (start, end);
    }
    if end.path < start.path {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

pub(crate) fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

pub fn total_inline_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Void(_) | Node::Element(_) => 0,
        })
        .sum()
}

/// Global inline offset of a `(child index, offset-in-child)` position.
pub fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else { continue };
        if ix < child_ix {
            global += t.text.len();
            continue;
        }
        if ix == child_ix {
            global += offset.min(t.text.len());
        }
        break;
    }
    global
}

/// Maps a global inline offset back to a point, preferring the start of the
/// following text node when the offset falls on a node boundary.
pub fn point_for_global_offset(block_path: &[usize], children: &[Node], global: usize) -> Point {
    let mut remaining = global;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else { continue };

        if remaining < t.text.len() {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
        }
        if remaining == t.text.len() {
            if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                let mut path = block_path.to_vec();
                path.push(child_ix + 1);
                return Point::new(path, 0);
            }
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
        remaining = remaining.saturating_sub(t.text.len());
    }

    // Fallback to end of last text node.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
    }

    let mut path = block_path.to_vec();
    path.push(0);
    Point::new(path, 0)
}

/// Rebuilds a block's inline children with `apply` run over the attribute
/// maps of every text slice inside `[start_global, end_global)`, splitting
/// partially covered nodes.
pub fn apply_attrs_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(&mut Attrs),
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };

        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = (start_global.saturating_sub(node_start)).min(t.text.len());
        let sel_end = (end_global.saturating_sub(node_start)).min(t.text.len());

        let sel_start = clamp_to_char_boundary(&t.text, sel_start);
        let sel_end = clamp_to_char_boundary(&t.text, sel_end);

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            apply(&mut next.attrs);
            out.push(Node::Text(next));
            continue;
        }

        let prefix = t.text.get(..sel_start).unwrap_or("").to_string();
        let middle = t.text.get(sel_start..sel_end).unwrap_or("").to_string();
        let suffix = t.text.get(sel_end..).unwrap_or("").to_string();

        if !prefix.is_empty() {
            out.push(Node::text_with(prefix, t.attrs.clone()));
        }
        if !middle.is_empty() {
            let mut attrs = t.attrs.clone();
            apply(&mut attrs);
            out.push(Node::text_with(middle, attrs));
        }
        if !suffix.is_empty() {
            out.push(Node::text_with(suffix, t.attrs.clone()));
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }

    out
}

/// Rebuilds a block's inline children with `[start_global, end_global)`
/// removed and `replacement` (if any) spliced in at the start of the gap.
/// With an empty range this is a plain insertion.
pub(crate) fn replace_inline_range(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    replacement: Option<Node>,
) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;
    let mut inserted = false;

    for child in children {
        let Node::Text(t) = child else {
            out.push(child.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if node_end < start_global || node_start > end_global {
            out.push(child.clone());
            continue;
        }

        let rel_start =
            clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start).min(t.text.len()));
        let rel_end =
            clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start).min(t.text.len()));

        let prefix = t.text.get(..rel_start).unwrap_or("");
        let suffix = t.text.get(rel_end..).unwrap_or("");

        if !prefix.is_empty() {
            out.push(Node::text_with(prefix, t.attrs.clone()));
        }
        if !inserted {
            if let Some(node) = &replacement {
                out.push(node.clone());
            }
            inserted = true;
        }
        if !suffix.is_empty() {
            out.push(Node::text_with(suffix, t.attrs.clone()));
        }
    }

    if !inserted {
        if let Some(node) = replacement {
            out.push(node);
        }
    }
    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

fn attr_matches(attrs: &Attrs, key: &str, value: &Value) -> bool {
    attrs.get(key) == Some(value)
}

/// Returns the maximal contiguous run around `point` whose nodes all carry
/// `value` for `attribute_key`. The caller must guarantee a match exists in
/// the caret's immediate neighborhood; a missing match is a contract
/// violation and yields the collapsed point range.
pub fn find_attribute_range(
    doc: &Document,
    point: &Point,
    attribute_key: &str,
    value: &Value,
) -> InlineRange {
    let empty = |point: &Point, children: Option<&[Node]>| {
        let block = point.path.split_last().map(|(_, p)| p.to_vec()).unwrap_or_default();
        let caret = children
            .map(|children| {
                point_global_offset(children, *point.path.last().unwrap_or(&0), point.offset)
            })
            .unwrap_or(0);
        InlineRange {
            block,
            range: caret..caret,
        }
    };

    let Some((&child_ix, block_path)) = point.path.split_last() else {
        return empty(point, None);
    };
    let Some(children) = block_children(doc, block_path) else {
        return empty(point, None);
    };

    let caret = point_global_offset(children, child_ix, point.offset);

    // Coalesce matching neighbors into runs; different values and missing
    // attributes are both boundaries.
    let mut runs: Vec<Range<usize>> = Vec::new();
    let mut cursor = 0usize;
    let mut current: Option<usize> = None;
    for node in children {
        let len = match node {
            Node::Text(t) => t.text.len(),
            Node::Void(_) | Node::Element(_) => 0,
        };
        let matches = match node {
            Node::Text(t) => attr_matches(&t.attrs, attribute_key, value),
            _ => false,
        };

        match (current, matches) {
            (None, true) => current = Some(cursor),
            (Some(start), false) => {
                runs.push(start..cursor);
                current = None;
            }
            _ => {}
        }
        cursor += len;
    }
    if let Some(start) = current {
        runs.push(start..cursor);
    }

    for run in runs {
        if caret >= run.start && caret <= run.end {
            return InlineRange {
                block: block_path.to_vec(),
                range: run,
            };
        }
    }

    debug_assert!(
        false,
        "find_attribute_range called with no matching run at the position"
    );
    empty(point, Some(children))
}

/// Attributes of the inline content immediately before the caret, if any.
pub fn attrs_before_point<'a>(doc: &'a Document, point: &Point) -> Option<&'a Attrs> {
    let (&child_ix, block_path) = point.path.split_last()?;
    let children = block_children(doc, block_path)?;
    let Node::Text(t) = children.get(child_ix)? else {
        return None;
    };

    if point.offset > 0 {
        return Some(&t.attrs);
    }
    match child_ix.checked_sub(1).and_then(|ix| children.get(ix))? {
        Node::Text(prev) => Some(&prev.attrs),
        _ => None,
    }
}

/// Attributes of the inline content immediately after the caret, if any.
pub fn attrs_after_point<'a>(doc: &'a Document, point: &Point) -> Option<&'a Attrs> {
    let (&child_ix, block_path) = point.path.split_last()?;
    let children = block_children(doc, block_path)?;
    let Node::Text(t) = children.get(child_ix)? else {
        return None;
    };

    if point.offset < t.text.len() {
        return Some(&t.attrs);
    }
    match children.get(child_ix + 1)? {
        Node::Text(next) => Some(&next.attrs),
        _ => None,
    }
}

fn top_level_index(point: &Point) -> usize {
    point.path.first().copied().unwrap_or(0)
}

/// The sole selected attribute-eligible block element, if the selection
/// spans exactly one void block and no text content.
pub fn selected_eligible_block(
    doc: &Document,
    registry: &PluginRegistry,
    selection: &Selection,
    attribute: &str,
) -> Option<Path> {
    if selection.is_collapsed() {
        return None;
    }

    let (start, end) = ordered_selection_points(selection);
    let start_ix = top_level_index(&start);
    let end_ix = top_level_index(&end);
    if start_ix == end_ix {
        return None;
    }

    // No text may be covered on the edge blocks.
    let start_children = block_children(doc, &start.path[..start.path.len() - 1])?;
    let start_global = point_global_offset(
        start_children,
        *start.path.last().unwrap_or(&0),
        start.offset,
    );
    if start_global != total_inline_text_len(start_children) {
        return None;
    }
    let end_children = block_children(doc, &end.path[..end.path.len() - 1])?;
    if point_global_offset(end_children, *end.path.last().unwrap_or(&0), end.offset) != 0 {
        return None;
    }

    let mut found: Option<Path> = None;
    for ix in (start_ix + 1)..end_ix {
        match doc.children.get(ix)? {
            Node::Void(_) => {
                if found.is_some() {
                    return None;
                }
                found = Some(vec![ix]);
            }
            Node::Element(el) => {
                if total_inline_text_len(&el.children) > 0 {
                    return None;
                }
            }
            Node::Text(_) => return None,
        }
    }

    let path = found?;
    let node = node_at(doc, &path)?;
    registry
        .is_attribute_eligible_block(node, attribute)
        .then_some(path)
}

/// Schema-valid targets for applying `attribute` over the selection: the
/// per-block inline sub-ranges where the attribute is allowed on text, plus
/// whole-element targets for covered eligible void blocks. Inline ranges
/// contained within a block target are excluded so a block and its
/// descendants are never double-attributed.
pub fn valid_attribute_targets(
    doc: &Document,
    registry: &PluginRegistry,
    selection: &Selection,
    attribute: &str,
) -> Vec<AttributeTarget> {
    if selection.is_collapsed() {
        return Vec::new();
    }

    let (start, end) = ordered_selection_points(selection);
    let start_ix = top_level_index(&start);
    let end_ix = top_level_index(&end);
    let text_allowed = registry.is_text_attribute_allowed(attribute);

    let mut targets: Vec<AttributeTarget> = Vec::new();

    for ix in start_ix..=end_ix {
        let Some(node) = doc.children.get(ix) else {
            continue;
        };
        let block_path = vec![ix];

        match node {
            Node::Void(_) => {
                // Edge blocks hold the selection's endpoints, so only the
                // strict interior counts as covered.
                let covered = ix > start_ix && ix < end_ix;
                if covered && registry.is_attribute_eligible_block(node, attribute) {
                    targets.push(AttributeTarget::Block(block_path));
                }
            }
            Node::Element(el) => {
                if !text_allowed {
                    continue;
                }
                if matches!(
                    registry.node_specs().get(&el.kind).map(|s| &s.children),
                    Some(ChildConstraint::InlineOnly) | None
                ) {
                    let total = total_inline_text_len(&el.children);
                    let local_start = if ix == start_ix {
                        point_global_offset(
                            &el.children,
                            *start.path.last().unwrap_or(&0),
                            start.offset,
                        )
                    } else {
                        0
                    };
                    let local_end = if ix == end_ix {
                        point_global_offset(
                            &el.children,
                            *end.path.last().unwrap_or(&0),
                            end.offset,
                        )
                    } else {
                        total
                    };
                    if local_start < local_end {
                        targets.push(AttributeTarget::Inline(InlineRange {
                            block: block_path,
                            range: local_start..local_end,
                        }));
                    }
                }
            }
            Node::Text(_) => {}
        }
    }

    let block_paths: Vec<Path> = targets
        .iter()
        .filter_map(|t| match t {
            AttributeTarget::Block(path) => Some(path.clone()),
            AttributeTarget::Inline(_) => None,
        })
        .collect();
    targets.retain(|t| match t {
        AttributeTarget::Inline(inline) => !block_paths
            .iter()
            .any(|block| inline.block.starts_with(block)),
        AttributeTarget::Block(_) => true,
    });

    targets
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::Attrs;

    fn anchor_attrs(value: &str) -> Attrs {
        let mut attrs = Attrs::default();
        attrs.insert("anchorId".to_string(), json!(value));
        attrs
    }

    fn doc_with_runs() -> Document {
        Document {
            children: vec![Node::Element(crate::core::ElementNode {
                kind: "paragraph".to_string(),
                attrs: Attrs::default(),
                children: vec![
                    Node::text("pre "),
                    Node::text_with("alpha", anchor_attrs("A")),
                    Node::text_with("beta", anchor_attrs("B")),
                    Node::text(" post"),
                ],
            })],
        }
    }

    #[test]
    fn finds_run_from_inside() {
        let doc = doc_with_runs();
        let range = find_attribute_range(&doc, &Point::new(vec![0, 1], 2), "anchorId", &json!("A"));
        assert_eq!(range.block, vec![0]);
        assert_eq!(range.range, 4..9);
    }

    #[test]
    fn caller_value_resolves_boundary_between_runs() {
        let doc = doc_with_runs();
        // Offset 9 is the boundary between the "A" and "B" runs.
        let at_boundary = Point::new(vec![0, 2], 0);
        let a = find_attribute_range(&doc, &at_boundary, "anchorId", &json!("A"));
        assert_eq!(a.range, 4..9);
        let b = find_attribute_range(&doc, &at_boundary, "anchorId", &json!("B"));
        assert_eq!(b.range, 9..13);
    }

    #[test]
    fn adjacent_runs_with_different_values_stay_distinct() {
        let doc = doc_with_runs();
        let a = find_attribute_range(&doc, &Point::new(vec![0, 1], 1), "anchorId", &json!("A"));
        let b = find_attribute_range(&doc, &Point::new(vec![0, 2], 1), "anchorId", &json!("B"));
        assert_eq!(a.range.end, b.range.start);
        assert_ne!(a.range, b.range);
    }

    #[test]
    fn neighborhood_attrs_at_boundaries() {
        let doc = doc_with_runs();
        // Caret at the start of the "B" run: before is the "A" run.
        let point = Point::new(vec![0, 2], 0);
        assert_eq!(
            attrs_before_point(&doc, &point).and_then(|a| a.get("anchorId")),
            Some(&json!("A"))
        );
        assert_eq!(
            attrs_after_point(&doc, &point).and_then(|a| a.get("anchorId")),
            Some(&json!("B"))
        );

        // Caret at the very start of the block has nothing before it.
        let start = Point::new(vec![0, 0], 0);
        assert!(attrs_before_point(&doc, &start).is_none());
    }

    #[test]
    fn global_offset_round_trip_prefers_next_node_start() {
        let doc = doc_with_runs();
        let Node::Element(el) = &doc.children[0] else {
            unreachable!()
        };
        let point = point_for_global_offset(&[0], &el.children, 4);
        assert_eq!(point, Point::new(vec![0, 1], 0));
        assert_eq!(point_global_offset(&el.children, 1, 0), 4);
    }
}
