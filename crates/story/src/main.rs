use anyhow::Result;
use tether_balloon::{BalloonController, BalloonState, Keystroke};
use tether_core::{
    anchor_spans, AnchorConfig, AnchorEditing, Key, Node, Point, Selection, TetherValue,
};

const CONFIG: &str = r#"{
    "defaultProtocol": "https://",
    "addTargetToExternalAnchors": true,
    "decorators": {
        "isDownloadable": {
            "mode": "manual",
            "label": "Downloadable",
            "attributes": { "download": "file" }
        }
    }
}"#;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AnchorConfig::from_json_str(CONFIG)?;
    let mut editing = AnchorEditing::new(config);
    let mut balloon = BalloonController::new(&editing);

    // Type a sentence, then anchor the word "manual" through the balloon
    // form, exactly the way a host UI would drive it.
    editing.insert_text("read the manual today");
    editing.select(Selection {
        anchor: Point::new(vec![0, 0], 9),
        focus: Point::new(vec![0, 0], 15),
    });
    balloon.handle_events(&mut editing);

    balloon.show_ui(&mut editing);
    tracing::info!(state = ?balloon.state(), "balloon after invocation");
    assert_eq!(balloon.state(), BalloonState::Form);

    balloon.form.value = "example.com/manual".to_string();
    balloon.form.set_switch("isDownloadable", true);
    balloon.submit(&mut editing);
    balloon.handle_events(&mut editing);

    tracing::info!(value = ?editing.anchor.value, "anchor command state after submit");

    // Click inside the new anchor: the actions view opens.
    editing.click(Point::new(vec![0, 1], 3));
    balloon.handle_events(&mut editing);
    tracing::info!(state = ?balloon.state(), href = ?balloon.actions.href(), "balloon after click");

    // Escape closes it again.
    balloon.handle_key(&mut editing, Keystroke::plain(Key::Escape));
    assert_eq!(balloon.state(), BalloonState::Hidden);

    // Rendered presentation attributes are derived per value, never stored.
    if let Some(Node::Element(paragraph)) = editing.doc().children.first() {
        for span in anchor_spans(&paragraph.children, editing.decorators()) {
            tracing::info!(range = ?span.range, value = %span.value, attributes = ?span.attributes, "anchor span");
        }
    }

    let value = TetherValue::from_document(editing.doc().clone());
    println!("{}", value.to_json_pretty()?);
    Ok(())
}
