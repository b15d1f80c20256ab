use std::collections::BTreeMap;

use serde_json::json;
use tether_core::{AnchorConfig, AnchorEditing, Document, Node, ANCHOR_ATTRIBUTE};

fn doc_with_image() -> Document {
    Document {
        children: vec![
            Node::paragraph("before"),
            Node::image("https://example.com/a.png", Some("A".to_string())),
            Node::paragraph("after"),
        ],
    }
}

#[test]
fn selected_image_takes_the_anchor_attribute_directly() {
    let mut editing = AnchorEditing::with_document(doc_with_image(), AnchorConfig::default());

    editing.select_block_element(1);
    assert!(editing.anchor.is_enabled);
    assert_eq!(editing.anchor.value, None);

    editing.apply_anchor("https://target", &BTreeMap::new());

    let Some(Node::Void(image)) = editing.doc().children.get(1) else {
        panic!("expected image block");
    };
    assert_eq!(
        image.attrs.get(ANCHOR_ATTRIBUTE),
        Some(&json!("https://target"))
    );

    // No inline text node picked up the attribute.
    for node in &editing.doc().children {
        let Node::Element(el) = node else { continue };
        for child in &el.children {
            let Node::Text(t) = child else { continue };
            assert!(!t.attrs.contains_key(ANCHOR_ATTRIBUTE));
        }
    }
}

#[test]
fn command_value_reads_the_selected_image_attribute() {
    let mut editing = AnchorEditing::with_document(doc_with_image(), AnchorConfig::default());

    editing.select_block_element(1);
    editing.apply_anchor("https://target", &BTreeMap::new());

    editing.select_block_element(1);
    assert_eq!(editing.anchor.value.as_deref(), Some("https://target"));
    assert!(editing.unanchor.is_enabled);
}

#[test]
fn unanchor_clears_the_image_attribute() {
    let mut editing = AnchorEditing::with_document(doc_with_image(), AnchorConfig::default());

    editing.select_block_element(1);
    editing.apply_anchor("https://target", &BTreeMap::new());
    editing.select_block_element(1);
    editing.remove_anchor();

    let Some(Node::Void(image)) = editing.doc().children.get(1) else {
        panic!("expected image block");
    };
    assert!(!image.attrs.contains_key(ANCHOR_ATTRIBUTE));
    assert_eq!(
        image.attrs.get("src"),
        Some(&json!("https://example.com/a.png"))
    );
}

#[test]
fn inserting_an_image_keeps_editing_flow_usable() {
    let mut editing = AnchorEditing::new(AnchorConfig::default());
    editing.insert_text("intro");
    editing.insert_image("https://example.com/pic.png", None);

    assert_eq!(editing.doc().children.len(), 3);
    assert!(matches!(
        editing.doc().children.get(1),
        Some(Node::Void(v)) if v.kind == "image"
    ));

    // Caret sits in the trailing paragraph.
    assert_eq!(editing.editor().selection().focus.path, vec![2, 0]);

    editing.select_block_element(1);
    assert!(editing.anchor.is_enabled);
}
