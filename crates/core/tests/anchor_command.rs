use std::collections::BTreeMap;

use serde_json::json;
use tether_core::{
    AnchorConfig, AnchorEditing, Attrs, Document, ElementNode, Node, Point, Selection,
    ANCHOR_ATTRIBUTE,
};

fn paragraph(children: Vec<Node>) -> Node {
    Node::Element(ElementNode {
        kind: "paragraph".to_string(),
        attrs: Attrs::default(),
        children,
    })
}

fn anchor_attrs(value: &str) -> Attrs {
    let mut attrs = Attrs::default();
    attrs.insert(ANCHOR_ATTRIBUTE.to_string(), json!(value));
    attrs
}

fn text_runs(editing: &AnchorEditing, block: usize) -> Vec<(String, Option<String>)> {
    let Some(Node::Element(el)) = editing.doc().children.get(block) else {
        panic!("expected paragraph at {block}");
    };
    el.children
        .iter()
        .map(|node| match node {
            Node::Text(t) => (
                t.text.clone(),
                t.attrs
                    .get(ANCHOR_ATTRIBUTE)
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            ),
            _ => panic!("expected text node"),
        })
        .collect()
}

#[test]
fn collapsed_caret_in_empty_document_inserts_value_as_anchored_run() {
    let mut editing = AnchorEditing::new(AnchorConfig::default());
    assert!(editing.anchor.is_enabled);

    editing.apply_anchor("https://example.com", &BTreeMap::new());

    assert_eq!(
        text_runs(&editing, 0),
        vec![(
            "https://example.com".to_string(),
            Some("https://example.com".to_string())
        )]
    );

    let selection = editing.editor().selection().clone();
    assert!(selection.is_collapsed());
    assert_eq!(selection.focus, Point::new(vec![0, 0], 19));

    // Further typing must not inherit the anchor.
    assert!(!editing.selection_attrs().contains_key(ANCHOR_ATTRIBUTE));
    editing.insert_text("!");
    assert_eq!(
        text_runs(&editing, 0).last().map(|(text, anchor)| (text.as_str() == "!", anchor.is_none())),
        Some((true, true))
    );
}

#[test]
fn caret_inside_run_updates_the_whole_contiguous_run() {
    let doc = Document {
        children: vec![paragraph(vec![Node::text_with("hello", anchor_attrs("A"))])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.click(Point::new(vec![0, 0], 2));
    assert_eq!(editing.anchor.value.as_deref(), Some("A"));

    editing.apply_anchor("B", &BTreeMap::new());

    assert_eq!(
        text_runs(&editing, 0),
        vec![("hello".to_string(), Some("B".to_string()))]
    );
    assert_eq!(editing.editor().selection().focus, Point::new(vec![0, 0], 5));
    assert!(!editing.selection_attrs().contains_key(ANCHOR_ATTRIBUTE));
}

#[test]
fn non_collapsed_selection_anchors_styled_and_plain_sub_ranges() {
    let mut bold = Attrs::default();
    bold.insert("bold".to_string(), json!(true));
    let doc = Document {
        children: vec![paragraph(vec![
            Node::text_with("bold", bold),
            Node::text("plain"),
        ])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 1], 5),
    });
    editing.apply_anchor("X", &BTreeMap::new());

    let Some(Node::Element(el)) = editing.doc().children.first() else {
        panic!("expected paragraph");
    };
    assert_eq!(el.children.len(), 2);
    let Node::Text(first) = &el.children[0] else {
        panic!("expected text");
    };
    let Node::Text(second) = &el.children[1] else {
        panic!("expected text");
    };
    assert_eq!(first.attrs.get("bold"), Some(&json!(true)));
    assert_eq!(first.attrs.get(ANCHOR_ATTRIBUTE), Some(&json!("X")));
    assert!(second.attrs.get("bold").is_none());
    assert_eq!(second.attrs.get(ANCHOR_ATTRIBUTE), Some(&json!("X")));
}

#[test]
fn executing_twice_with_identical_arguments_is_idempotent() {
    let doc = Document {
        children: vec![paragraph(vec![Node::text("some words here")])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 5),
        focus: Point::new(vec![0, 0], 10),
    });
    editing.apply_anchor("https://a", &BTreeMap::new());
    let once = editing.doc().clone();

    editing.apply_anchor("https://a", &BTreeMap::new());
    assert_eq!(editing.doc(), &once);
}

#[test]
fn empty_value_on_plain_collapsed_caret_inserts_nothing() {
    let doc = Document {
        children: vec![paragraph(vec![Node::text("abc")])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());
    editing.select(Selection::collapsed(Point::new(vec![0, 0], 1)));

    editing.apply_anchor("", &BTreeMap::new());

    assert_eq!(text_runs(&editing, 0), vec![("abc".to_string(), None)]);
    assert!(!editing.selection_attrs().contains_key(ANCHOR_ATTRIBUTE));
}

#[test]
fn manual_decorator_toggles_ride_along_with_the_anchor() {
    let config = AnchorConfig::from_json_str(
        r#"{ "decorators": { "isDownloadable": {
            "mode": "manual", "attributes": { "download": "file" } } } }"#,
    )
    .unwrap();
    let doc = Document {
        children: vec![paragraph(vec![Node::text("grab this file")])],
    };
    let mut editing = AnchorEditing::with_document(doc, config);

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 5),
        focus: Point::new(vec![0, 0], 9),
    });

    let on = BTreeMap::from([("isDownloadable".to_string(), true)]);
    editing.apply_anchor("https://files", &on);

    let Some(Node::Element(el)) = editing.doc().children.first() else {
        panic!("expected paragraph");
    };
    let Node::Text(middle) = &el.children[1] else {
        panic!("expected split run");
    };
    assert_eq!(middle.text, "this");
    assert_eq!(middle.attrs.get("isDownloadable"), Some(&json!(true)));
    assert_eq!(middle.attrs.get(ANCHOR_ATTRIBUTE), Some(&json!("https://files")));

    // Toggling the decorator off leaves the anchor untouched and removes
    // the decorator attribute entirely.
    let off = BTreeMap::from([("isDownloadable".to_string(), false)]);
    editing.apply_anchor("https://files", &off);

    let Some(Node::Element(el)) = editing.doc().children.first() else {
        panic!("expected paragraph");
    };
    let Node::Text(middle) = &el.children[1] else {
        panic!("expected split run");
    };
    assert_eq!(middle.attrs.get(ANCHOR_ATTRIBUTE), Some(&json!("https://files")));
    assert!(middle.attrs.get("isDownloadable").is_none());
}

#[test]
fn command_value_reflects_uniform_selection_only() {
    let doc = Document {
        children: vec![paragraph(vec![
            Node::text_with("one", anchor_attrs("A")),
            Node::text_with("two", anchor_attrs("B")),
        ])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 1], 3),
    });
    assert_eq!(editing.anchor.value, None);

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 3),
    });
    assert_eq!(editing.anchor.value.as_deref(), Some("A"));
}
