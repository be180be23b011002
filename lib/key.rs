//! Keyboard key model and the ASCII-control-byte → `Ctrl+Letter` synthesis
//! rule used by the input router (§4.10).

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held alongside a key press.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        /// Control key.
        const CTRL = 0b0001;
        /// Alt/Option key.
        const ALT = 0b0010;
        /// Shift key.
        const SHIFT = 0b0100;
        /// Super/Cmd/Windows key.
        const SUPER = 0b1000;
    }
}

/// A single logical key, independent of modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// A printable character, already modifier-resolved by the backend.
    Char(char),
    Tab,
    Enter,
    Escape,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    /// Function keys F1..F24.
    F(u8),
}

/// A key press paired with the modifiers held at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyWithModifiers {
    /// The logical key.
    pub key: Key,
    /// Modifiers held down.
    pub modifiers: Modifiers,
}

impl KeyWithModifiers {
    /// Builds a key press with no modifiers.
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::empty(),
        }
    }

    /// Builds a key press with the given modifiers.
    pub fn with(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    /// Synthesizes a `Ctrl+Letter` key press from an ASCII control byte
    /// (`0x01..=0x1f`) carried in a text event, per §4.10 rule 3.
    ///
    /// Returns `None` for `Tab` (`0x09`) and `Enter` (`0x0d`), which must
    /// never be reinterpreted as `Ctrl+I` / `Ctrl+M`, and for bytes outside
    /// the control range.
    pub fn synthesize_ctrl_letter(byte: u8) -> Option<Self> {
        if !(0x01..=0x1f).contains(&byte) || byte == 0x09 || byte == 0x0d {
            return None;
        }
        let letter = (b'a' + (byte - 1)) as char;
        Some(Self::with(Key::Char(letter), Modifiers::CTRL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_ctrl_letter_basic() {
        // Ctrl+P is 0x10
        let k = KeyWithModifiers::synthesize_ctrl_letter(0x10).unwrap();
        assert_eq!(k.key, Key::Char('p'));
        assert_eq!(k.modifiers, Modifiers::CTRL);
    }

    #[test]
    fn test_synthesize_excludes_tab_and_enter() {
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x09).is_none());
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x0d).is_none());
    }

    #[test]
    fn test_synthesize_out_of_range() {
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x00).is_none());
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x20).is_none());
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x41).is_none());
    }

    #[test]
    fn test_synthesize_ctrl_a() {
        let k = KeyWithModifiers::synthesize_ctrl_letter(0x01).unwrap();
        assert_eq!(k.key, Key::Char('a'));
    }
}
