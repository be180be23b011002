//! The event-batch decoder (C2): parses the inbound ZREV v1 binary batch
//! into an ordered sequence of typed events, and the `release()` ownership
//! wrapper the backend hands batches through.

use crate::error::{EngineError, EngineResult};
use crate::key::{Key, Modifiers};

/// Four-byte magic stamped at offset 0 of every event batch.
pub const MAGIC: [u8; 4] = *b"ZREV";
/// Format version stamped at offset 4.
pub const VERSION: u32 = 1;
/// Fixed batch header size in bytes.
pub const HEADER_SIZE: u32 = 24;
/// Fixed size of one event record in bytes.
pub const RECORD_SIZE: u32 = 24;

mod kind_tag {
    pub const KEY: u8 = 0;
    pub const TEXT: u8 = 1;
    pub const MOUSE: u8 = 2;
    pub const RESIZE: u8 = 3;
    pub const FOCUS: u8 = 4;
    pub const PASTE: u8 = 5;
    pub const USER: u8 = 6;
    pub const ENGINE: u8 = 7;
}

/// Mouse button/action kind, matching the `kind` sub-field named in §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Down,
    Up,
    Press,
    Release,
    Scroll,
}

impl MouseKind {
    fn from_u8(v: u8) -> EngineResult<Self> {
        Ok(match v {
            1 => MouseKind::Down,
            2 => MouseKind::Up,
            3 => MouseKind::Press,
            4 => MouseKind::Release,
            5 => MouseKind::Scroll,
            other => {
                return Err(EngineError::batch_malformed(format!(
                    "unknown mouse event kind {other}"
                )))
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            MouseKind::Down => 1,
            MouseKind::Up => 2,
            MouseKind::Press => 3,
            MouseKind::Release => 4,
            MouseKind::Scroll => 5,
        }
    }
}

/// One decoded, typed event. `time_ms` is the backend-reported timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Key {
        time_ms: u32,
        key: Key,
        modifiers: Modifiers,
        is_repeat: bool,
    },
    Text {
        time_ms: u32,
        codepoint: char,
    },
    Mouse {
        time_ms: u32,
        x: i32,
        y: i32,
        kind: MouseKind,
        buttons: u8,
        wheel_x: i16,
        wheel_y: i16,
    },
    Resize {
        time_ms: u32,
        cols: u16,
        rows: u16,
    },
    Focus {
        time_ms: u32,
        gained: bool,
    },
    Paste {
        time_ms: u32,
        text: String,
    },
    User {
        time_ms: u32,
        tag: i32,
        payload: Vec<u8>,
    },
    /// An engine-internal signal, e.g. the backend reporting dropped
    /// batches (§5 "Backpressure").
    Engine {
        time_ms: u32,
        dropped_batches: u32,
    },
}

impl Event {
    /// The timestamp every event kind carries.
    pub fn time_ms(&self) -> u32 {
        match self {
            Event::Key { time_ms, .. }
            | Event::Text { time_ms, .. }
            | Event::Mouse { time_ms, .. }
            | Event::Resize { time_ms, .. }
            | Event::Focus { time_ms, .. }
            | Event::Paste { time_ms, .. }
            | Event::User { time_ms, .. }
            | Event::Engine { time_ms, .. } => *time_ms,
        }
    }
}

fn key_from_code(code: u32) -> EngineResult<Key> {
    Ok(match code {
        0 => Key::Tab,
        1 => Key::Enter,
        2 => Key::Escape,
        3 => Key::Backspace,
        4 => Key::Delete,
        5 => Key::Up,
        6 => Key::Down,
        7 => Key::Left,
        8 => Key::Right,
        9 => Key::Home,
        10 => Key::End,
        11 => Key::PageUp,
        12 => Key::PageDown,
        13 => Key::Space,
        100..=123 => Key::F((code - 100) as u8 + 1),
        other if other >= 0x1_0000 => {
            char::from_u32(other - 0x1_0000).map(Key::Char).ok_or_else(|| {
                EngineError::batch_malformed(format!("invalid char key code {other}"))
            })?
        }
        other => {
            return Err(EngineError::batch_malformed(format!(
                "unknown key code {other}"
            )))
        }
    })
}

fn key_to_code(key: Key) -> u32 {
    match key {
        Key::Tab => 0,
        Key::Enter => 1,
        Key::Escape => 2,
        Key::Backspace => 3,
        Key::Delete => 4,
        Key::Up => 5,
        Key::Down => 6,
        Key::Left => 7,
        Key::Right => 8,
        Key::Home => 9,
        Key::End => 10,
        Key::PageUp => 11,
        Key::PageDown => 12,
        Key::Space => 13,
        Key::F(n) => 100 + (n as u32 - 1),
        Key::Char(c) => 0x1_0000 + c as u32,
    }
}

fn read_u32(bytes: &[u8], off: usize) -> EngineResult<u32> {
    bytes
        .get(off..off + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or_else(|| EngineError::batch_malformed("event batch truncated"))
}

fn read_i32(bytes: &[u8], off: usize) -> EngineResult<i32> {
    read_u32(bytes, off).map(|v| v as i32)
}

/// Parses a complete ZREV v1 batch into an ordered vector of events.
///
/// Malformed batches (bad magic/version, truncated header, inconsistent
/// counts, out-of-range record fields) are reported fatally via
/// `BatchMalformed` and never partially consumed: on error no events have
/// been "used" by the caller.
pub fn decode(bytes: &[u8]) -> EngineResult<Vec<Event>> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(EngineError::batch_malformed("batch shorter than header"));
    }
    if bytes[0..4] != MAGIC {
        return Err(EngineError::batch_malformed("bad magic"));
    }
    let version = read_u32(bytes, 4)?;
    if version != VERSION {
        return Err(EngineError::batch_malformed(format!(
            "unsupported version {version}"
        )));
    }
    let total_size = read_u32(bytes, 8)? as usize;
    let event_count = read_u32(bytes, 12)?;
    let events_offset = read_u32(bytes, 16)? as usize;
    let events_bytes = read_u32(bytes, 20)?;

    if total_size > bytes.len() {
        return Err(EngineError::batch_malformed("total size exceeds buffer"));
    }
    if events_bytes != event_count * RECORD_SIZE {
        return Err(EngineError::batch_malformed(
            "events_bytes inconsistent with event_count",
        ));
    }
    let events_end = events_offset
        .checked_add(events_bytes as usize)
        .ok_or_else(|| EngineError::batch_malformed("events span overflows"))?;
    if events_end > total_size {
        return Err(EngineError::batch_malformed("events span exceeds total size"));
    }

    let mut events = Vec::with_capacity(event_count as usize);
    for i in 0..event_count as usize {
        let rec = events_offset + i * RECORD_SIZE as usize;
        let record = bytes
            .get(rec..rec + RECORD_SIZE as usize)
            .ok_or_else(|| EngineError::batch_malformed("event record truncated"))?;

        let kind = record[0];
        let flags = u16::from_le_bytes(record[2..4].try_into().unwrap());
        let time_ms = u32::from_le_bytes(record[4..8].try_into().unwrap());
        let a = read_i32(record, 8)?;
        let b = read_i32(record, 12)?;
        let c = read_i32(record, 16)?;

        let event = match kind {
            kind_tag::KEY => Event::Key {
                time_ms,
                key: key_from_code(a as u32)?,
                modifiers: Modifiers::from_bits_truncate(flags as u8),
                is_repeat: b != 0,
            },
            kind_tag::TEXT => Event::Text {
                time_ms,
                codepoint: char::from_u32(a as u32).ok_or_else(|| {
                    EngineError::batch_malformed(format!("invalid codepoint {a}"))
                })?,
            },
            kind_tag::MOUSE => Event::Mouse {
                time_ms,
                x: a,
                y: b,
                kind: MouseKind::from_u8((flags & 0x07) as u8)?,
                buttons: ((flags >> 3) & 0x1f) as u8,
                wheel_x: (c & 0xFFFF) as i16,
                wheel_y: (c >> 16) as i16,
            },
            kind_tag::RESIZE => Event::Resize {
                time_ms,
                cols: a as u16,
                rows: b as u16,
            },
            kind_tag::FOCUS => Event::Focus {
                time_ms,
                gained: flags & 0x1 != 0,
            },
            kind_tag::PASTE => {
                let offset = a as usize;
                let length = b as usize;
                let text_bytes = bytes
                    .get(offset..offset + length)
                    .ok_or_else(|| EngineError::batch_malformed("paste payload out of range"))?;
                Event::Paste {
                    time_ms,
                    text: String::from_utf8(text_bytes.to_vec())
                        .map_err(|_| EngineError::batch_malformed("paste payload not utf8"))?,
                }
            }
            kind_tag::USER => {
                let offset = b as usize;
                let length = c as usize;
                let payload = bytes
                    .get(offset..offset + length)
                    .ok_or_else(|| EngineError::batch_malformed("user payload out of range"))?
                    .to_vec();
                Event::User {
                    time_ms,
                    tag: a,
                    payload,
                }
            }
            kind_tag::ENGINE => Event::Engine {
                time_ms,
                dropped_batches: a as u32,
            },
            other => {
                return Err(EngineError::batch_malformed(format!(
                    "unknown event kind {other}"
                )))
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Encodes events back into a ZREV v1 batch; used by tests and by embedders
/// building synthetic batches (e.g. a headless test harness).
pub struct EventBatchBuilder {
    records: Vec<u8>,
    trailing: Vec<u8>,
}

impl Default for EventBatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBatchBuilder {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            trailing: Vec::new(),
        }
    }

    fn push_record(&mut self, kind: u8, flags: u16, time_ms: u32, a: i32, b: i32, c: i32) {
        self.records.push(kind);
        self.records.push(0);
        self.records.extend_from_slice(&flags.to_le_bytes());
        self.records.extend_from_slice(&time_ms.to_le_bytes());
        self.records.extend_from_slice(&a.to_le_bytes());
        self.records.extend_from_slice(&b.to_le_bytes());
        self.records.extend_from_slice(&c.to_le_bytes());
        self.records.extend_from_slice(&0u32.to_le_bytes());
    }

    pub fn key(mut self, time_ms: u32, key: Key, modifiers: Modifiers, is_repeat: bool) -> Self {
        self.push_record(
            kind_tag::KEY,
            modifiers.bits() as u16,
            time_ms,
            key_to_code(key) as i32,
            is_repeat as i32,
            0,
        );
        self
    }

    pub fn text(mut self, time_ms: u32, codepoint: char) -> Self {
        self.push_record(kind_tag::TEXT, 0, time_ms, codepoint as i32, 0, 0);
        self
    }

    pub fn mouse(
        mut self,
        time_ms: u32,
        x: i32,
        y: i32,
        kind: MouseKind,
        buttons: u8,
        wheel_x: i16,
        wheel_y: i16,
    ) -> Self {
        let flags = kind.to_u8() as u16 | ((buttons as u16 & 0x1f) << 3);
        let c = ((wheel_y as u16 as u32) << 16) | (wheel_x as u16 as u32);
        self.push_record(kind_tag::MOUSE, flags, time_ms, x, y, c as i32);
        self
    }

    pub fn resize(mut self, time_ms: u32, cols: u16, rows: u16) -> Self {
        self.push_record(kind_tag::RESIZE, 0, time_ms, cols as i32, rows as i32, 0);
        self
    }

    pub fn focus(mut self, time_ms: u32, gained: bool) -> Self {
        self.push_record(kind_tag::FOCUS, gained as u16, time_ms, 0, 0, 0);
        self
    }

    pub fn paste(mut self, time_ms: u32, text: &str) -> Self {
        let offset = self.trailing.len() as i32;
        self.trailing.extend_from_slice(text.as_bytes());
        self.push_record(
            kind_tag::PASTE,
            0,
            time_ms,
            offset,
            text.len() as i32,
            0,
        );
        self
    }

    pub fn engine_dropped_batches(mut self, time_ms: u32, dropped: u32) -> Self {
        self.push_record(kind_tag::ENGINE, 0, time_ms, dropped as i32, 0, 0);
        self
    }

    /// Serializes the batch. The events region is followed by any trailing
    /// variable-length payload (paste/user bytes), referenced by absolute
    /// offsets baked into those records above.
    pub fn build(self) -> Vec<u8> {
        let events_offset = HEADER_SIZE;
        let events_bytes = self.records.len() as u32;
        let event_count = events_bytes / RECORD_SIZE;
        let trailing_offset = events_offset + events_bytes;
        let total_size = trailing_offset + self.trailing.len() as u32;

        let mut out = Vec::with_capacity(total_size as usize);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&total_size.to_le_bytes());
        out.extend_from_slice(&event_count.to_le_bytes());
        out.extend_from_slice(&events_offset.to_le_bytes());
        out.extend_from_slice(&events_bytes.to_le_bytes());

        // Trailing record payload offsets in push_record are relative to the
        // start of the trailing region; rebase them to absolute offsets now
        // that we know where that region starts in the final buffer.
        let mut records = self.records;
        for i in 0..event_count as usize {
            let rec_start = i * RECORD_SIZE as usize;
            let kind = records[rec_start];
            if kind == kind_tag::PASTE {
                let rel_offset = i32::from_le_bytes(
                    records[rec_start + 8..rec_start + 12].try_into().unwrap(),
                );
                let abs = rel_offset + trailing_offset as i32;
                records[rec_start + 8..rec_start + 12].copy_from_slice(&abs.to_le_bytes());
            }
        }

        out.extend_from_slice(&records);
        out.extend_from_slice(&self.trailing);
        out
    }
}

/// Wraps a batch's raw bytes together with the backend's ownership
/// contract: `release()` must be called exactly once, whether decoding
/// succeeded or not.
pub struct BatchHandle {
    bytes: Vec<u8>,
    release_fn: Option<Box<dyn FnOnce()>>,
}

impl BatchHandle {
    /// Wraps `bytes` with a `release` callback the backend supplied.
    pub fn new(bytes: Vec<u8>, release_fn: impl FnOnce() + 'static) -> Self {
        Self {
            bytes,
            release_fn: Some(Box::new(release_fn)),
        }
    }

    /// Decodes the wrapped bytes without affecting the release obligation.
    pub fn decode(&self) -> EngineResult<Vec<Event>> {
        decode(&self.bytes)
    }

    /// Returns ownership of the batch to the backend. Calling this more
    /// than once is a programming error (debug-asserted); the engine's
    /// event-polling loop (C9) must call it exactly once per batch, whether
    /// decoding succeeded or failed.
    pub fn release(&mut self) {
        if let Some(f) = self.release_fn.take() {
            f();
        } else {
            debug_assert!(false, "batch released more than once");
        }
    }
}

impl Drop for BatchHandle {
    fn drop(&mut self) {
        debug_assert!(
            self.release_fn.is_none(),
            "event batch dropped without release()"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_roundtrip_key_event() {
        let bytes = EventBatchBuilder::new()
            .key(10, Key::Char('a'), Modifiers::CTRL, false)
            .build();
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Key {
                time_ms,
                key,
                modifiers,
                is_repeat,
            } => {
                assert_eq!(*time_ms, 10);
                assert_eq!(*key, Key::Char('a'));
                assert_eq!(*modifiers, Modifiers::CTRL);
                assert!(!is_repeat);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_mouse_scroll() {
        let bytes = EventBatchBuilder::new()
            .mouse(5, 6, 0, MouseKind::Scroll, 0, 0, -3)
            .build();
        let events = decode(&bytes).unwrap();
        match &events[0] {
            Event::Mouse {
                x, y, kind, wheel_y, ..
            } => {
                assert_eq!(*x, 6);
                assert_eq!(*y, 0);
                assert_eq!(*kind, MouseKind::Scroll);
                assert_eq!(*wheel_y, -3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_paste_event() {
        let bytes = EventBatchBuilder::new().paste(1, "hello world").build();
        let events = decode(&bytes).unwrap();
        match &events[0] {
            Event::Paste { text, .. } => assert_eq!(text, "hello world"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_events_processed_in_encoded_order() {
        let bytes = EventBatchBuilder::new()
            .resize(1, 80, 24)
            .focus(2, true)
            .engine_dropped_batches(3, 2)
            .build();
        let events = decode(&bytes).unwrap();
        assert!(matches!(events[0], Event::Resize { .. }));
        assert!(matches!(events[1], Event::Focus { .. }));
        assert!(matches!(events[2], Event::Engine { .. }));
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bytes = EventBatchBuilder::new().focus(0, true).build();
        bytes[0] = b'X';
        assert!(matches!(
            decode(&bytes),
            Err(EngineError::BatchMalformed { .. })
        ));
    }

    #[test]
    fn test_truncated_batch_is_fatal() {
        let bytes = EventBatchBuilder::new().focus(0, true).build();
        let truncated = &bytes[..bytes.len() - 5];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn test_release_called_exactly_once() {
        let released = Rc::new(Cell::new(0u32));
        let released_clone = released.clone();
        let mut handle = BatchHandle::new(
            EventBatchBuilder::new().focus(0, true).build(),
            move || released_clone.set(released_clone.get() + 1),
        );
        let _ = handle.decode();
        handle.release();
        assert_eq!(released.get(), 1);
    }
}
