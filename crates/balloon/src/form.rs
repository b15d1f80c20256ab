use tether_core::{DecoratorToggles, Key, ManualDecorator};

use crate::focus::FocusCycler;
use crate::keystrokes::{Keystroke, KeystrokeHandler};

pub const FORM_INPUT: &str = "value-input";
pub const FORM_SAVE: &str = "save";
pub const FORM_CANCEL: &str = "cancel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormBinding {
    FocusNext,
    FocusPrevious,
    Activate,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKeyResult {
    Unhandled,
    Handled,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratorSwitch {
    pub id: String,
    pub label: String,
    pub on: bool,
}

/// Headless edit form: the value input, one switch per manual decorator,
/// save and cancel.
pub struct FormView {
    pub value: String,
    switches: Vec<DecoratorSwitch>,
    focus: FocusCycler,
    keystrokes: KeystrokeHandler<FormBinding>,
}

impl FormView {
    pub fn new(decorators: &[ManualDecorator]) -> Self {
        let switches: Vec<DecoratorSwitch> = decorators
            .iter()
            .map(|d| DecoratorSwitch {
                id: d.id.clone(),
                label: d.label.clone(),
                on: d.value.unwrap_or(d.default_value),
            })
            .collect();

        let mut focusables = vec![FORM_INPUT.to_string()];
        focusables.extend(switches.iter().map(|s| s.id.clone()));
        focusables.push(FORM_SAVE.to_string());
        focusables.push(FORM_CANCEL.to_string());

        let keystrokes = KeystrokeHandler::default()
            .bind(Keystroke::plain(Key::Tab), FormBinding::FocusNext)
            .bind(Keystroke::shifted(Key::Tab), FormBinding::FocusPrevious)
            .bind(Keystroke::plain(Key::Enter), FormBinding::Activate)
            .bind(Keystroke::plain(Key::Escape), FormBinding::Cancel);

        Self {
            value: String::new(),
            switches,
            focus: FocusCycler::new(focusables),
            keystrokes,
        }
    }

    pub fn switches(&self) -> &[DecoratorSwitch] {
        &self.switches
    }

    pub fn set_switch(&mut self, id: &str, on: bool) {
        if let Some(switch) = self.switches.iter_mut().find(|s| s.id == id) {
            switch.on = on;
        }
    }

    pub fn toggles(&self) -> DecoratorToggles {
        self.switches
            .iter()
            .map(|s| (s.id.clone(), s.on))
            .collect()
    }

    /// Restores the switches from the model's current decorator state, so an
    /// abandoned edit leaves no uncommitted UI state behind.
    pub fn reset_from(&mut self, decorators: &[ManualDecorator]) {
        for switch in &mut self.switches {
            if let Some(decorator) = decorators.iter().find(|d| d.id == switch.id) {
                switch.on = decorator.value.unwrap_or(decorator.default_value);
            }
        }
    }

    pub fn focused(&self) -> &str {
        self.focus.current()
    }

    pub fn focus_first(&mut self) {
        self.focus.focus_first();
    }

    pub fn handle_key(&mut self, keystroke: Keystroke) -> FormKeyResult {
        match self.keystrokes.resolve(keystroke) {
            Some(FormBinding::FocusNext) => {
                self.focus.focus_next();
                FormKeyResult::Handled
            }
            Some(FormBinding::FocusPrevious) => {
                self.focus.focus_previous();
                FormKeyResult::Handled
            }
            Some(FormBinding::Activate) => {
                let focused = self.focused().to_string();
                if focused == FORM_CANCEL {
                    return FormKeyResult::Cancel;
                }
                if let Some(switch) = self.switches.iter_mut().find(|s| s.id == focused) {
                    switch.on = !switch.on;
                    return FormKeyResult::Handled;
                }
                FormKeyResult::Submit
            }
            Some(FormBinding::Cancel) => FormKeyResult::Cancel,
            None => FormKeyResult::Unhandled,
        }
    }
}
