//! Key bindings

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::model::RunPhase;

/// What a key press asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    PageUp,
    PageDown,
    NextPanel,
    Toggle,
    Copy,
    Quit,
    Interrupt,
}

impl Action {
    /// Actions that move around the dashboard
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Action::Up
                | Action::Down
                | Action::PageUp
                | Action::PageDown
                | Action::NextPanel
                | Action::Toggle
        )
    }
}

pub fn action(key: &KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Interrupt),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(Action::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::Down),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Tab => Some(Action::NextPanel),
        KeyCode::Enter | KeyCode::Char(' ') => Some(Action::Toggle),
        KeyCode::Char('c') => Some(Action::Copy),
        KeyCode::Char('q') => Some(Action::Quit),
        _ => None,
    }
}

pub fn help(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Running | RunPhase::Cleanup => {
            "[Tab] Panel  [↑↓] Navigate  [Enter] Expand  [c] Copy  [Ctrl+C] Cancel"
        }
        RunPhase::Complete | RunPhase::Exploring => {
            "[Tab] Panel  [↑↓] Navigate  [Enter] Expand  [c] Copy  [q] Quit"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_actions() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);

        assert_eq!(action(&key(KeyCode::Char('j'))), Some(Action::Down));
        assert_eq!(action(&key(KeyCode::Up)), Some(Action::Up));
        assert_eq!(action(&key(KeyCode::Char(' '))), Some(Action::Toggle));
        assert_eq!(action(&key(KeyCode::Char('c'))), Some(Action::Copy));
        assert_eq!(action(&key(KeyCode::Char('x'))), None);
        assert_eq!(
            action(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Interrupt)
        );
        assert!(Action::PageDown.is_navigation());
        assert!(!Action::Copy.is_navigation());
    }
}
