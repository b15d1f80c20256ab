use tether_core::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub key: Key,
    pub shift: bool,
}

impl Keystroke {
    pub fn plain(key: Key) -> Self {
        Self { key, shift: false }
    }

    pub fn shifted(key: Key) -> Self {
        Self { key, shift: true }
    }
}

/// Maps keystrokes to view actions through an explicit binding table.
#[derive(Debug, Clone)]
pub struct KeystrokeHandler<A: Copy> {
    bindings: Vec<(Keystroke, A)>,
}

impl<A: Copy> Default for KeystrokeHandler<A> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }
}

impl<A: Copy> KeystrokeHandler<A> {
    pub fn bind(mut self, keystroke: Keystroke, action: A) -> Self {
        self.bindings.push((keystroke, action));
        self
    }

    pub fn resolve(&self, keystroke: Keystroke) -> Option<A> {
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == keystroke)
            .map(|(_, action)| *action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Action {
        Next,
        Previous,
    }

    #[test]
    fn resolves_bound_keystrokes_only() {
        let handler = KeystrokeHandler::default()
            .bind(Keystroke::plain(Key::Tab), Action::Next)
            .bind(Keystroke::shifted(Key::Tab), Action::Previous);

        assert_eq!(handler.resolve(Keystroke::plain(Key::Tab)), Some(Action::Next));
        assert_eq!(
            handler.resolve(Keystroke::shifted(Key::Tab)),
            Some(Action::Previous)
        );
        assert_eq!(handler.resolve(Keystroke::plain(Key::Enter)), None);
    }
}
