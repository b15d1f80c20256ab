use tether_core::Key;

use crate::focus::FocusCycler;
use crate::keystrokes::{Keystroke, KeystrokeHandler};

pub const ACTIONS_PREVIEW: &str = "preview";
pub const ACTIONS_EDIT: &str = "edit";
pub const ACTIONS_UNANCHOR: &str = "unanchor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionsBinding {
    FocusNext,
    FocusPrevious,
    Activate,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionsKeyResult {
    Unhandled,
    Handled,
    Edit,
    Unanchor,
    Preview,
    Close,
}

/// Headless actions view: an anchor preview plus edit/unanchor buttons,
/// with focus cycling and keystroke handling as composed collaborators.
pub struct ActionsView {
    href: Option<String>,
    focus: FocusCycler,
    keystrokes: KeystrokeHandler<ActionsBinding>,
}

impl Default for ActionsView {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionsView {
    pub fn new() -> Self {
        let focus = FocusCycler::new(vec![
            ACTIONS_PREVIEW.to_string(),
            ACTIONS_EDIT.to_string(),
            ACTIONS_UNANCHOR.to_string(),
        ]);
        let keystrokes = KeystrokeHandler::default()
            .bind(Keystroke::plain(Key::Tab), ActionsBinding::FocusNext)
            .bind(Keystroke::shifted(Key::Tab), ActionsBinding::FocusPrevious)
            .bind(Keystroke::plain(Key::Enter), ActionsBinding::Activate)
            .bind(Keystroke::plain(Key::Escape), ActionsBinding::Close);
        Self {
            href: None,
            focus,
            keystrokes,
        }
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    pub fn set_href(&mut self, href: Option<String>) {
        self.href = href;
    }

    pub fn focused(&self) -> &str {
        self.focus.current()
    }

    pub fn focus_first(&mut self) {
        self.focus.focus_first();
    }

    /// Button activation by id, for pointer-driven hosts.
    pub fn activate(&self, id: &str) -> ActionsKeyResult {
        match id {
            ACTIONS_EDIT => ActionsKeyResult::Edit,
            ACTIONS_UNANCHOR => ActionsKeyResult::Unanchor,
            ACTIONS_PREVIEW => ActionsKeyResult::Preview,
            _ => ActionsKeyResult::Unhandled,
        }
    }

    pub fn handle_key(&mut self, keystroke: Keystroke) -> ActionsKeyResult {
        match self.keystrokes.resolve(keystroke) {
            Some(ActionsBinding::FocusNext) => {
                self.focus.focus_next();
                ActionsKeyResult::Handled
            }
            Some(ActionsBinding::FocusPrevious) => {
                self.focus.focus_previous();
                ActionsKeyResult::Handled
            }
            Some(ActionsBinding::Activate) => self.activate(&self.focused().to_string()),
            Some(ActionsBinding::Close) => ActionsKeyResult::Close,
            None => ActionsKeyResult::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_cycles_through_buttons_and_enter_activates() {
        let mut view = ActionsView::new();
        assert_eq!(view.focused(), ACTIONS_PREVIEW);

        assert_eq!(
            view.handle_key(Keystroke::plain(Key::Tab)),
            ActionsKeyResult::Handled
        );
        assert_eq!(view.focused(), ACTIONS_EDIT);
        assert_eq!(
            view.handle_key(Keystroke::plain(Key::Enter)),
            ActionsKeyResult::Edit
        );

        assert_eq!(
            view.handle_key(Keystroke::shifted(Key::Tab)),
            ActionsKeyResult::Handled
        );
        assert_eq!(view.focused(), ACTIONS_PREVIEW);
    }

    #[test]
    fn escape_requests_close() {
        let mut view = ActionsView::new();
        assert_eq!(
            view.handle_key(Keystroke::plain(Key::Escape)),
            ActionsKeyResult::Close
        );
    }
}
