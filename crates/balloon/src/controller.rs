use serde_json::Value;
use tether_core::{
    attrs_before_point, find_attribute_range, node_at, ordered_selection_points,
    point_global_offset, selected_eligible_block, AnchorEditing, EditorEvent, InlineRange, Node,
    Path, SelectionSource, ANCHOR_ATTRIBUTE,
};

use crate::actions::{ActionsKeyResult, ActionsView};
use crate::form::{FormKeyResult, FormView};
use crate::keystrokes::Keystroke;
use crate::panel::{BalloonState, PanelStack, ViewId};
use crate::position::{overlay_position, OverlayPosition, Rect};

/// What the balloon is currently attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalloonTarget {
    /// An anchored run under the selection.
    Run(InlineRange),
    /// A selected attribute-eligible block element.
    Element(Path),
    /// An unanchored caret; `block` is the insertion parent watched for the
    /// hide-on-parent-change rule.
    Caret { block: Path },
}

/// The balloon state machine: decides between nothing, the actions view and
/// the edit form from selection and document updates, and keeps the shared
/// panel consistent. It reads command state but never mutates the document
/// itself — submissions go through the commands.
pub struct BalloonController {
    panel: PanelStack,
    pub actions: ActionsView,
    pub form: FormView,
    tracked: Option<BalloonTarget>,
    visual_marker: Option<InlineRange>,
}

impl BalloonController {
    pub fn new(editing: &AnchorEditing) -> Self {
        Self {
            panel: PanelStack::default(),
            actions: ActionsView::new(),
            form: FormView::new(editing.decorators().manual()),
            tracked: None,
            visual_marker: None,
        }
    }

    pub fn state(&self) -> BalloonState {
        self.panel.state()
    }

    pub fn target(&self) -> Option<&BalloonTarget> {
        self.tracked.as_ref()
    }

    /// The synthetic highlight range shown while the form edits a would-be
    /// anchor with no run behind it.
    pub fn visual_marker(&self) -> Option<&InlineRange> {
        self.visual_marker.as_ref()
    }

    pub fn position(&self) -> Option<OverlayPosition> {
        self.panel.position()
    }

    /// Host geometry callback: recomputes the clamped overlay anchor for the
    /// current target.
    pub fn update_position(&mut self, target: Rect, viewport: Rect) {
        if self.state() == BalloonState::Hidden {
            self.panel.set_position(None);
            return;
        }
        self.panel.set_position(overlay_position(target, viewport));
    }

    /// Toolbar or keystroke invocation.
    pub fn show_ui(&mut self, editing: &mut AnchorEditing) {
        match self.state() {
            BalloonState::Form => {}
            BalloonState::Actions => self.open_form(editing),
            BalloonState::Hidden => {
                if let Some(target) = current_anchor_target(editing) {
                    self.show_actions(editing, target);
                } else if editing.anchor.is_enabled {
                    self.open_form_with_marker(editing);
                }
            }
        }
    }

    /// Feeds the editor's notification stream through the state machine.
    pub fn handle_events(&mut self, editing: &mut AnchorEditing) {
        for event in editing.take_ui_events() {
            self.on_event(editing, &event);
        }
    }

    fn on_event(&mut self, editing: &mut AnchorEditing, event: &EditorEvent) {
        match event {
            EditorEvent::SelectionChanged { source, .. } => {
                if self.state() == BalloonState::Hidden {
                    // Selection landing inside an anchored run opens the
                    // actions view; selection churn from mutations does not.
                    if matches!(source, SelectionSource::Pointer | SelectionSource::Api) {
                        if let Some(target) = current_anchor_target(editing) {
                            self.show_actions(editing, target);
                        }
                    }
                } else {
                    self.update(editing);
                }
            }
            EditorEvent::DocumentChanged { .. } => {
                if self.state() != BalloonState::Hidden {
                    self.update(editing);
                }
            }
            _ => {}
        }
    }

    /// The most-recent-state-wins update rule: a stale target hides the
    /// balloon, a live one keeps it attached in place.
    fn update(&mut self, editing: &AnchorEditing) {
        match self.tracked.clone() {
            Some(BalloonTarget::Run(_)) | Some(BalloonTarget::Element(_)) => {
                match current_anchor_target(editing) {
                    Some(target) => {
                        self.tracked = Some(target);
                        if self.state() == BalloonState::Actions {
                            if let Some(value) = editing.anchor.value.clone() {
                                self.actions.set_href(Some(value));
                            }
                        }
                    }
                    None => self.hide_all(),
                }
            }
            Some(BalloonTarget::Caret { block }) => {
                let current = insertion_parent(editing);
                if current.as_ref() != Some(&block) {
                    self.hide_all();
                }
            }
            None => {}
        }
    }

    /// Form submission: normalize the raw value, run the anchor command with
    /// the decorator toggles, then fall back per the panel stack.
    pub fn submit(&mut self, editing: &mut AnchorEditing) {
        let value = crate::protocol::normalize_anchor_value(
            &self.form.value,
            editing.config().default_protocol.as_deref(),
        );
        let toggles = self.form.toggles();
        tracing::debug!(%value, "balloon form submit");
        editing.apply_anchor(&value, &toggles);
        let submitted = (!value.is_empty()).then_some(value);
        self.close_form(editing, submitted);
    }

    /// Cancelled edits restore the decorator switches from the model before
    /// the form goes away.
    pub fn cancel(&mut self, editing: &mut AnchorEditing) {
        self.form.reset_from(editing.decorators().manual());
        self.close_form(editing, None);
    }

    pub fn close(&mut self) {
        self.hide_all();
    }

    /// A pointer press outside the panel closes everything.
    pub fn click_outside(&mut self, editing: &AnchorEditing) {
        self.form.reset_from(editing.decorators().manual());
        self.hide_all();
    }

    pub fn handle_key(&mut self, editing: &mut AnchorEditing, keystroke: Keystroke) -> bool {
        match self.state() {
            BalloonState::Hidden => false,
            BalloonState::Form => match self.form.handle_key(keystroke) {
                FormKeyResult::Unhandled => false,
                FormKeyResult::Handled => true,
                FormKeyResult::Submit => {
                    self.submit(editing);
                    true
                }
                FormKeyResult::Cancel => {
                    self.cancel(editing);
                    true
                }
            },
            BalloonState::Actions => match self.actions.handle_key(keystroke) {
                ActionsKeyResult::Unhandled => false,
                ActionsKeyResult::Handled | ActionsKeyResult::Preview => true,
                ActionsKeyResult::Edit => {
                    self.open_form(editing);
                    true
                }
                ActionsKeyResult::Unanchor => {
                    editing.remove_anchor();
                    self.hide_all();
                    true
                }
                ActionsKeyResult::Close => {
                    self.hide_all();
                    true
                }
            },
        }
    }

    /// Pointer activation of an actions-view button.
    pub fn activate_action(&mut self, editing: &mut AnchorEditing, id: &str) {
        if self.state() != BalloonState::Actions {
            return;
        }
        match self.actions.activate(id) {
            ActionsKeyResult::Edit => self.open_form(editing),
            ActionsKeyResult::Unanchor => {
                editing.remove_anchor();
                self.hide_all();
            }
            _ => {}
        }
    }

    fn show_actions(&mut self, editing: &AnchorEditing, target: BalloonTarget) {
        let href = editing.anchor.value.clone().or_else(|| match &target {
            BalloonTarget::Run(run) => run_value(editing.doc(), run),
            BalloonTarget::Element(path) => match node_at(editing.doc(), path) {
                Some(Node::Void(v)) => v
                    .attrs
                    .get(ANCHOR_ATTRIBUTE)
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                _ => None,
            },
            BalloonTarget::Caret { .. } => None,
        });
        self.actions.set_href(href);
        self.actions.focus_first();
        self.tracked = Some(target);
        self.panel.push(ViewId::Actions);
    }

    fn open_form(&mut self, editing: &AnchorEditing) {
        self.form.value = editing
            .anchor
            .value
            .clone()
            .or_else(|| self.actions.href().map(str::to_string))
            .unwrap_or_default();
        self.form.reset_from(editing.decorators().manual());
        self.form.focus_first();
        self.panel.push(ViewId::Form);
    }

    fn open_form_with_marker(&mut self, editing: &AnchorEditing) {
        self.visual_marker = Some(selection_marker_range(editing));
        self.tracked = insertion_parent(editing).map(|block| BalloonTarget::Caret { block });
        self.form.value = String::new();
        self.form.reset_from(editing.decorators().manual());
        self.form.focus_first();
        self.panel.push(ViewId::Form);
    }

    fn close_form(&mut self, editing: &AnchorEditing, submitted: Option<String>) {
        self.panel.remove(ViewId::Form);
        self.visual_marker = None;

        if self.state() == BalloonState::Actions {
            // Editing a pre-existing anchor falls back to the actions view.
            let href = submitted.or_else(|| editing.anchor.value.clone());
            self.actions.set_href(href);
        } else {
            self.tracked = None;
        }
    }

    fn hide_all(&mut self) {
        self.panel.clear();
        self.tracked = None;
        self.visual_marker = None;
    }
}

/// The anchored target under the selection, if any: a selected eligible
/// block element wins over a text run.
fn current_anchor_target(editing: &AnchorEditing) -> Option<BalloonTarget> {
    let doc = editing.doc();
    let selection = editing.editor().selection();

    if let Some(path) =
        selected_eligible_block(doc, editing.editor().registry(), selection, ANCHOR_ATTRIBUTE)
    {
        let anchored = matches!(
            node_at(doc, &path),
            Some(Node::Void(v)) if v.attrs.contains_key(ANCHOR_ATTRIBUTE)
        );
        return anchored.then_some(BalloonTarget::Element(path));
    }

    // A caret parked right at the tail of a run still counts as being at
    // that run, even after the boundary fixups stripped its typing
    // attributes.
    let value = match editing.anchor.value.clone() {
        Some(value) => value,
        None if selection.is_collapsed() => attrs_before_point(doc, &selection.focus)
            .and_then(|attrs| attrs.get(ANCHOR_ATTRIBUTE))
            .and_then(|v| v.as_str())
            .map(str::to_string)?,
        None => return None,
    };
    let (start, _) = ordered_selection_points(selection);
    let run = find_attribute_range(doc, &start, ANCHOR_ATTRIBUTE, &Value::String(value));
    (!run.is_empty()).then_some(BalloonTarget::Run(run))
}

/// Anchor value of the run's first covered text node.
fn run_value(doc: &tether_core::Document, run: &InlineRange) -> Option<String> {
    let Node::Element(el) = node_at(doc, &run.block)? else {
        return None;
    };
    let mut cursor = 0usize;
    for node in &el.children {
        let Node::Text(t) = node else { continue };
        let start = cursor;
        let end = cursor + t.text.len();
        cursor = end;
        if run.range.start >= start && run.range.start < end {
            return t
                .attrs
                .get(ANCHOR_ATTRIBUTE)
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }
    }
    None
}

fn insertion_parent(editing: &AnchorEditing) -> Option<Path> {
    editing
        .editor()
        .selection()
        .focus
        .path
        .split_last()
        .map(|(_, parent)| parent.to_vec())
}

/// The would-be target range highlighted while the form edits an anchor
/// that does not exist yet.
fn selection_marker_range(editing: &AnchorEditing) -> InlineRange {
    let selection = editing.editor().selection();
    let (start, end) = ordered_selection_points(selection);
    let block = start
        .path
        .split_last()
        .map(|(_, parent)| parent.to_vec())
        .unwrap_or_default();

    let children = match node_at(editing.doc(), &block) {
        Some(Node::Element(el)) => el.children.as_slice(),
        _ => &[],
    };
    let start_global = point_global_offset(children, *start.path.last().unwrap_or(&0), start.offset);
    let end_global = if end.path.first() == start.path.first() {
        point_global_offset(children, *end.path.last().unwrap_or(&0), end.offset)
    } else {
        tether_core::total_inline_text_len(children)
    };

    InlineRange {
        block,
        range: start_global..end_global,
    }
}
