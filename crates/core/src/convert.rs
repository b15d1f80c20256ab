use std::collections::BTreeMap;
use std::ops::Range;

use crate::commands::ANCHOR_ATTRIBUTE;
use crate::decorators::{AutomaticDecorators, DecoratorRegistry};
use crate::core::Node;

/// Pure downcast mapping for one anchor value: the `href` plus the union of
/// every matching automatic-decorator payload. Recomputed per render, never
/// persisted into the model.
pub fn rendered_attributes(
    value: &str,
    automatic: &AutomaticDecorators,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("href".to_string(), value.to_string());
    for (name, attr_value) in automatic.attributes_for(value) {
        out.insert(name, attr_value);
    }
    out
}

/// A contiguous anchored run with its presentation attributes, ready for a
/// downstream view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSpan {
    /// Global inline offsets within the block.
    pub range: Range<usize>,
    pub value: String,
    pub attributes: BTreeMap<String, String>,
}

/// Groups a block's inline children into anchor spans. Adjacent nodes join
/// one span only while the anchor value and the manual-decorator flags all
/// match.
pub fn anchor_spans(children: &[Node], decorators: &DecoratorRegistry) -> Vec<AnchorSpan> {
    #[derive(PartialEq)]
    struct SpanKey {
        value: String,
        manual: Vec<String>,
    }

    let key_of = |node: &Node| -> Option<SpanKey> {
        let Node::Text(t) = node else { return None };
        let value = t.attrs.get(ANCHOR_ATTRIBUTE)?.as_str()?.to_string();
        let manual = decorators
            .manual()
            .iter()
            .filter(|d| t.attrs.get(&d.id).and_then(|v| v.as_bool()) == Some(true))
            .map(|d| d.id.clone())
            .collect();
        Some(SpanKey { value, manual })
    };

    let mut spans: Vec<AnchorSpan> = Vec::new();
    let mut cursor = 0usize;
    let mut current: Option<(usize, SpanKey)> = None;

    let mut flush = |current: &mut Option<(usize, SpanKey)>, end: usize, spans: &mut Vec<AnchorSpan>| {
        let Some((start, key)) = current.take() else {
            return;
        };
        let mut attributes = rendered_attributes(&key.value, decorators.automatic());
        for id in &key.manual {
            if let Some(manual) = decorators.manual().iter().find(|d| &d.id == id) {
                for (name, value) in &manual.attributes {
                    attributes.insert(name.clone(), value.clone());
                }
            }
        }
        spans.push(AnchorSpan {
            range: start..end,
            value: key.value,
            attributes,
        });
    };

    for node in children {
        let len = match node {
            Node::Text(t) => t.text.len(),
            Node::Void(_) | Node::Element(_) => 0,
        };

        match (key_of(node), &mut current) {
            (Some(key), Some((_, existing))) if *existing == key => {}
            (Some(key), _) => {
                flush(&mut current, cursor, &mut spans);
                current = Some((cursor, key));
            }
            (None, _) => flush(&mut current, cursor, &mut spans),
        }

        cursor += len;
    }
    flush(&mut current, cursor, &mut spans);

    spans.retain(|span| !span.range.is_empty());
    spans
}
