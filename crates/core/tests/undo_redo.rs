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

#[test]
fn applying_an_anchor_is_a_single_undo_step() {
    let doc = Document {
        children: vec![paragraph(vec![Node::text("plain words")])],
    };
    let original = doc.clone();
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 5),
    });
    editing.apply_anchor("https://w", &BTreeMap::new());
    assert_ne!(editing.doc(), &original);

    assert!(editing.undo());
    assert_eq!(editing.doc(), &original);
    assert!(!editing.undo());
}

#[test]
fn redo_restores_the_anchor_application() {
    let doc = Document {
        children: vec![paragraph(vec![Node::text("plain words")])],
    };
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 5),
    });
    editing.apply_anchor("https://w", &BTreeMap::new());
    let applied = editing.doc().clone();

    assert!(editing.undo());
    assert!(editing.redo());
    assert_eq!(editing.doc(), &applied);
}

#[test]
fn type_over_restore_folds_into_the_typing_undo_step() {
    let doc = Document {
        children: vec![paragraph(vec![
            Node::text("go "),
            Node::text_with("link", anchor_attrs("https://a")),
            Node::text(" after"),
        ])],
    };
    let original = doc.clone();
    let mut editing = AnchorEditing::with_document(doc, AnchorConfig::default());

    editing.select(Selection {
        anchor: Point::new(vec![0, 1], 0),
        focus: Point::new(vec![0, 1], 4),
    });
    editing.insert_text("new");

    // The consistency fixup rides in the same change block: one undo takes
    // the document all the way back.
    assert!(editing.undo());
    assert_eq!(editing.doc(), &original);
}
