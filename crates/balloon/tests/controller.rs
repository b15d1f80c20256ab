use serde_json::json;
use tether_balloon::{BalloonController, BalloonState, BalloonTarget, Keystroke, Rect};
use tether_core::{
    AnchorConfig, AnchorEditing, Attrs, Document, ElementNode, Key, Node, Point, Selection,
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

fn editing_with_run() -> AnchorEditing {
    let doc = Document {
        children: vec![
            paragraph(vec![
                Node::text("go "),
                Node::text_with("link", anchor_attrs("https://a")),
                Node::text(" after"),
            ]),
            paragraph(vec![Node::text("elsewhere")]),
        ],
    };
    AnchorEditing::with_document(doc, AnchorConfig::default())
}

fn setup() -> (AnchorEditing, BalloonController) {
    let editing = editing_with_run();
    let balloon = BalloonController::new(&editing);
    (editing, balloon)
}

#[test]
fn clicking_inside_a_run_opens_the_actions_view() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);

    assert_eq!(balloon.state(), BalloonState::Actions);
    assert_eq!(balloon.actions.href(), Some("https://a"));
    assert!(matches!(balloon.target(), Some(BalloonTarget::Run(_))));
}

#[test]
fn invocation_without_a_run_goes_straight_to_the_form_with_a_marker() {
    let (mut editing, mut balloon) = setup();

    editing.select(Selection {
        anchor: Point::new(vec![1, 0], 0),
        focus: Point::new(vec![1, 0], 9),
    });
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Hidden);

    balloon.show_ui(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Form);

    let marker = balloon.visual_marker().expect("marker for would-be target");
    assert_eq!(marker.block, vec![1]);
    assert_eq!(marker.range, 0..9);
}

#[test]
fn submitting_a_fresh_anchor_closes_the_balloon_entirely() {
    let (mut editing, mut balloon) = setup();

    editing.select(Selection {
        anchor: Point::new(vec![1, 0], 0),
        focus: Point::new(vec![1, 0], 9),
    });
    balloon.handle_events(&mut editing);
    balloon.show_ui(&mut editing);

    balloon.form.value = "example.com".to_string();
    balloon.submit(&mut editing);

    // Bare domains gain the default protocol only when configured; none is
    // configured here, so the raw value goes through.
    assert_eq!(editing.anchor.value.as_deref(), Some("example.com"));
    assert_eq!(balloon.state(), BalloonState::Hidden);
    assert!(balloon.visual_marker().is_none());
}

#[test]
fn default_protocol_is_applied_on_submit() {
    let config = AnchorConfig::from_json_str(r#"{ "defaultProtocol": "https://" }"#).unwrap();
    let doc = Document {
        children: vec![paragraph(vec![Node::text("words")])],
    };
    let mut editing = AnchorEditing::with_document(doc, config);
    let mut balloon = BalloonController::new(&editing);

    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 5),
    });
    balloon.handle_events(&mut editing);
    balloon.show_ui(&mut editing);

    balloon.form.value = "example.com".to_string();
    balloon.submit(&mut editing);

    assert_eq!(editing.anchor.value.as_deref(), Some("https://example.com"));
}

#[test]
fn editing_an_existing_anchor_falls_back_to_actions_on_submit() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Actions);

    // Re-invoking the UI while actions are visible opens the form.
    balloon.show_ui(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Form);
    assert_eq!(balloon.form.value, "https://a");

    balloon.form.value = "https://b".to_string();
    balloon.submit(&mut editing);

    assert_eq!(balloon.state(), BalloonState::Actions);
    assert_eq!(balloon.actions.href(), Some("https://b"));
}

#[test]
fn escape_closes_the_focused_view() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);
    balloon.show_ui(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Form);

    // Escape in the form falls back to actions (pre-existing anchor).
    assert!(balloon.handle_key(&mut editing, Keystroke::plain(Key::Escape)));
    assert_eq!(balloon.state(), BalloonState::Actions);

    // Escape in the actions view hides everything.
    assert!(balloon.handle_key(&mut editing, Keystroke::plain(Key::Escape)));
    assert_eq!(balloon.state(), BalloonState::Hidden);
}

#[test]
fn selection_leaving_the_run_hides_the_balloon() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Actions);

    editing.click(Point::new(vec![1, 0], 3));
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Hidden);
}

#[test]
fn parent_block_change_hides_an_unanchored_form() {
    let (mut editing, mut balloon) = setup();

    editing.select(Selection::collapsed(Point::new(vec![1, 0], 3)));
    balloon.handle_events(&mut editing);
    balloon.show_ui(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Form);

    editing.select(Selection::collapsed(Point::new(vec![0, 0], 1)));
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Hidden);
}

#[test]
fn unanchor_from_the_actions_view_removes_the_run_and_hides() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Actions);

    // Tab to "edit", tab to "unanchor", activate.
    balloon.handle_key(&mut editing, Keystroke::plain(Key::Tab));
    balloon.handle_key(&mut editing, Keystroke::plain(Key::Tab));
    assert!(balloon.handle_key(&mut editing, Keystroke::plain(Key::Enter)));

    assert_eq!(balloon.state(), BalloonState::Hidden);
    let Some(Node::Element(el)) = editing.doc().children.first() else {
        panic!("expected paragraph");
    };
    assert!(el.children.iter().all(|n| match n {
        Node::Text(t) => !t.attrs.contains_key(ANCHOR_ATTRIBUTE),
        _ => true,
    }));
}

#[test]
fn cancel_restores_decorator_switches_from_the_model() {
    let config = AnchorConfig::from_json_str(
        r#"{ "decorators": { "isDownloadable": {
            "mode": "manual", "attributes": { "download": "file" } } } }"#,
    )
    .unwrap();
    let doc = Document {
        children: vec![paragraph(vec![
            Node::text_with("file", anchor_attrs("https://f")),
        ])],
    };
    let mut editing = AnchorEditing::with_document(doc, config);
    let mut balloon = BalloonController::new(&editing);

    editing.click(Point::new(vec![0, 0], 2));
    balloon.handle_events(&mut editing);
    balloon.show_ui(&mut editing);
    assert_eq!(balloon.state(), BalloonState::Form);

    balloon.form.set_switch("isDownloadable", true);
    balloon.cancel(&mut editing);

    // The model never carried the decorator, so the switch resets to off.
    assert_eq!(balloon.state(), BalloonState::Actions);
    balloon.show_ui(&mut editing);
    assert!(!balloon.form.switches()[0].on);
}

#[test]
fn update_position_clamps_to_the_viewport() {
    let (mut editing, mut balloon) = setup();

    editing.click(Point::new(vec![0, 1], 2));
    balloon.handle_events(&mut editing);

    balloon.update_position(
        Rect::new(100.0, 300.0, 4.0, 18.0),
        Rect::new(0.0, 0.0, 800.0, 600.0),
    );
    let position = balloon.position().expect("position for visible balloon");
    assert!(position.y < 300.0);

    balloon.close();
    assert!(balloon.position().is_none());
}
