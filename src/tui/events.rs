use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyAction {
    Quit,
    Cancel,
    Save,
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    Top,
    Bottom,
}

pub(crate) fn key_action(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c')).then_some(KeyAction::Quit);
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') => Some(KeyAction::Cancel),
        KeyCode::Char('s') => Some(KeyAction::Save),
        KeyCode::Up | KeyCode::Char('k') => Some(KeyAction::LineUp),
        KeyCode::Down | KeyCode::Char('j') => Some(KeyAction::LineDown),
        KeyCode::PageUp => Some(KeyAction::PageUp),
        KeyCode::PageDown => Some(KeyAction::PageDown),
        KeyCode::Home | KeyCode::Char('g') => Some(KeyAction::Top),
        KeyCode::End | KeyCode::Char('G') => Some(KeyAction::Bottom),
        _ => None,
    }
}
