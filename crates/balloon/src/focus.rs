/// Cycles focus through an ordered list of focusable ids. Held by the
/// balloon views as a collaborator, not inherited behavior.
#[derive(Debug, Clone)]
pub struct FocusCycler {
    focusables: Vec<String>,
    current: usize,
}

impl FocusCycler {
    pub fn new(focusables: Vec<String>) -> Self {
        Self {
            focusables,
            current: 0,
        }
    }

    pub fn focusables(&self) -> &[String] {
        &self.focusables
    }

    pub fn current(&self) -> &str {
        self.focusables
            .get(self.current)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn focus_first(&mut self) {
        self.current = 0;
    }

    pub fn focus(&mut self, id: &str) -> bool {
        match self.focusables.iter().position(|f| f == id) {
            Some(ix) => {
                self.current = ix;
                true
            }
            None => false,
        }
    }

    pub fn focus_next(&mut self) {
        if self.focusables.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.focusables.len();
    }

    pub fn focus_previous(&mut self) {
        if self.focusables.is_empty() {
            return;
        }
        self.current = self
            .current
            .checked_sub(1)
            .unwrap_or(self.focusables.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycler() -> FocusCycler {
        FocusCycler::new(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    }

    #[test]
    fn cycles_forward_with_wraparound() {
        let mut cycler = cycler();
        assert_eq!(cycler.current(), "a");
        cycler.focus_next();
        cycler.focus_next();
        assert_eq!(cycler.current(), "c");
        cycler.focus_next();
        assert_eq!(cycler.current(), "a");
    }

    #[test]
    fn cycles_backward_with_wraparound() {
        let mut cycler = cycler();
        cycler.focus_previous();
        assert_eq!(cycler.current(), "c");
        cycler.focus_previous();
        assert_eq!(cycler.current(), "b");
    }

    #[test]
    fn focuses_by_id() {
        let mut cycler = cycler();
        assert!(cycler.focus("b"));
        assert_eq!(cycler.current(), "b");
        assert!(!cycler.focus("missing"));
    }
}
