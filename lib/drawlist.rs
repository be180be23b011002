//! The drawlist encoder (C1): an append-only binary writer for the ZRDL v5
//! frame IR consumed by the terminal backend (§6.1). All offsets are
//! 4-byte aligned; every reserved field is zero-filled; builder methods
//! each append exactly one fixed-size command record.

use std::collections::HashMap;

use crate::style::StyleRecord;

/// Four-byte magic stamped at offset 0 of every drawlist.
pub const MAGIC: [u8; 4] = *b"ZRDL";
/// Format version stamped at offset 4.
pub const VERSION: u32 = 5;
/// Fixed header size in bytes.
pub const HEADER_SIZE: u32 = 64;

/// Command opcodes. Values are stable across versions; gaps are reserved
/// for future ops.
pub mod opcode {
    pub const CLEAR: u16 = 0;
    pub const FILL_RECT: u16 = 1;
    pub const DRAW_TEXT: u16 = 2;
    pub const PUSH_CLIP: u16 = 3;
    pub const POP_CLIP: u16 = 4;
    pub const DRAW_TEXT_RUN: u16 = 5;
    pub const SET_CURSOR: u16 = 6;
    pub const DRAW_CANVAS: u16 = 7;
    pub const DRAW_IMAGE: u16 = 8;
    pub const BLIT_RECT: u16 = 14;
}

/// Fixed record sizes, in bytes, including the 8-byte opcode header.
pub mod record_size {
    pub const CLEAR: u32 = 8;
    pub const FILL_RECT: u32 = 52;
    pub const DRAW_TEXT: u32 = 60;
    pub const PUSH_CLIP: u32 = 24;
    pub const POP_CLIP: u32 = 8;
    pub const DRAW_TEXT_RUN: u32 = 24;
    pub const SET_CURSOR: u32 = 20;
    pub const DRAW_CANVAS: u32 = 32;
    pub const DRAW_IMAGE: u32 = 40;
    pub const BLIT_RECT: u32 = 28;
}

/// Terminal cursor glyph shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Block,
    Bar,
    Underline,
}

impl CursorShape {
    fn to_u16(self) -> u16 {
        match self {
            CursorShape::Block => 0,
            CursorShape::Bar => 1,
            CursorShape::Underline => 2,
        }
    }
}

/// Sub-cell canvas blitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blitter {
    #[default]
    Halfblock,
    Sextant,
    Braille,
}

impl Blitter {
    fn to_u32(self) -> u32 {
        match self {
            Blitter::Halfblock => 0,
            Blitter::Sextant => 1,
            Blitter::Braille => 2,
        }
    }
}

/// Pixel image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Rgba8,
    Png,
}

/// Terminal image transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageProtocol {
    #[default]
    Unicode,
    Kitty,
    Iterm2,
    Sixel,
}

/// How an image is fit into its allotted rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFit {
    #[default]
    Contain,
    Cover,
    Fill,
    None,
}

fn pack_image_modes(format: ImageFormat, protocol: ImageProtocol, fit: ImageFit) -> u32 {
    let f = match format {
        ImageFormat::Rgba8 => 0u8,
        ImageFormat::Png => 1,
    };
    let p = match protocol {
        ImageProtocol::Unicode => 0u8,
        ImageProtocol::Kitty => 1,
        ImageProtocol::Iterm2 => 2,
        ImageProtocol::Sixel => 3,
    };
    let t = match fit {
        ImageFit::Contain => 0u8,
        ImageFit::Cover => 1,
        ImageFit::Fill => 2,
        ImageFit::None => 3,
    };
    (f as u32) | ((p as u32) << 8) | ((t as u32) << 16)
}

/// Default cap on total interned-string bytes before `intern_string`
/// degrades callers to truncated behavior is not applicable — strings are
/// never capped (only blobs can overflow per §4.1); this constant exists
/// only as a building block for tests that want a tiny blob cap.
pub const DEFAULT_MAX_BLOB_BYTES: usize = 8 * 1024 * 1024;

/// Append-only binary writer for one drawlist frame.
pub struct DrawlistBuilder {
    commands: Vec<u8>,
    cmd_count: u32,

    string_index: HashMap<String, u32>,
    strings_bytes: Vec<u8>,
    strings_spans: Vec<(u32, u32)>,

    blobs_bytes: Vec<u8>,
    blob_spans: Vec<(u32, u32)>,
    max_blob_bytes: usize,

    pending_link: Option<(u32, u32)>,
}

impl Default for DrawlistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawlistBuilder {
    /// Builds an empty builder with the default blob capacity.
    pub fn new() -> Self {
        Self::with_blob_cap(DEFAULT_MAX_BLOB_BYTES)
    }

    /// Builds an empty builder with an explicit blob byte cap (tests use a
    /// small cap to exercise the `BuilderOverflow` degrade path cheaply).
    pub fn with_blob_cap(max_blob_bytes: usize) -> Self {
        Self {
            commands: Vec::new(),
            cmd_count: 0,
            string_index: HashMap::new(),
            strings_bytes: Vec::new(),
            strings_spans: Vec::new(),
            blobs_bytes: Vec::new(),
            blob_spans: Vec::new(),
            max_blob_bytes,
            pending_link: None,
        }
    }

    fn push_header(&mut self, opcode: u16, size: u32) {
        self.commands.extend_from_slice(&opcode.to_le_bytes());
        self.commands.extend_from_slice(&0u16.to_le_bytes());
        self.commands.extend_from_slice(&size.to_le_bytes());
        self.cmd_count += 1;
    }

    fn push_i32(&mut self, v: i32) {
        self.commands.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u32(&mut self, v: u32) {
        self.commands.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u16(&mut self, v: u16) {
        self.commands.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u8(&mut self, v: u8) {
        self.commands.push(v);
    }

    fn push_style(&mut self, style: StyleRecord) {
        self.commands.extend_from_slice(&style.to_bytes());
    }

    /// Interns `text`, returning an index into the strings span table.
    /// Equal strings share an index.
    pub fn intern_string(&mut self, text: &str) -> u32 {
        if let Some(&idx) = self.string_index.get(text) {
            return idx;
        }
        let offset = self.strings_bytes.len() as u32;
        self.strings_bytes.extend_from_slice(text.as_bytes());
        let length = text.len() as u32;
        let idx = self.strings_spans.len() as u32;
        self.strings_spans.push((offset, length));
        self.string_index.insert(text.to_string(), idx);
        idx
    }

    /// Appends raw bytes to the blob table, returning `None` (a
    /// `BuilderOverflow` signal) instead of an error when the cap would be
    /// exceeded, per §4.1/§7.
    fn add_blob(&mut self, bytes: &[u8]) -> Option<u32> {
        if self.blobs_bytes.len() + bytes.len() > self.max_blob_bytes {
            return None;
        }
        let offset = self.blobs_bytes.len() as u32;
        self.blobs_bytes.extend_from_slice(bytes);
        let length = bytes.len() as u32;
        let idx = self.blob_spans.len() as u32;
        self.blob_spans.push((offset, length));
        Some(idx)
    }

    /// Packs `segments` (text + style pairs) into one blob holding many
    /// styled runs, for the `draw_text_run` fast path. Returns `None` on
    /// overflow; callers must then degrade to one `draw_text` per segment.
    pub fn add_text_run_blob(&mut self, segments: &[(String, StyleRecord)]) -> Option<u32> {
        let mut bytes = Vec::with_capacity(4 + segments.len() * 32);
        bytes.extend_from_slice(&(segments.len() as u32).to_le_bytes());
        for (text, style) in segments {
            let string_ref = self.intern_string(text);
            bytes.extend_from_slice(&string_ref.to_le_bytes());
            bytes.extend_from_slice(&style.to_bytes());
        }
        self.add_blob(&bytes)
    }

    /// Appends a raw image/canvas pixel blob, returning `None` on overflow.
    pub fn add_pixel_blob(&mut self, bytes: &[u8]) -> Option<u32> {
        self.add_blob(bytes)
    }

    /// Clears the whole frame (`CLEAR`).
    pub fn clear(&mut self) {
        self.push_header(opcode::CLEAR, record_size::CLEAR);
    }

    /// Clears a `cols x rows` region to `style`; implemented as a `FILL_RECT`
    /// covering the region since the wire format has no dedicated opcode.
    pub fn clear_to(&mut self, cols: u16, rows: u16, style: Option<StyleRecord>) {
        self.fill_rect(0, 0, cols, rows, style);
    }

    /// Fills a rect with a solid style.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u16, h: u16, style: Option<StyleRecord>) {
        self.push_header(opcode::FILL_RECT, record_size::FILL_RECT);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u16(w);
        self.push_u16(h);
        self.push_u32(0); // reserved, keeps the style record 4-byte aligned
        self.push_style(style.unwrap_or_default());
    }

    /// Applies the pending link (if any, via [`Self::set_link`]) onto a
    /// style record that did not already specify one.
    fn resolve_link(&self, mut style: StyleRecord) -> StyleRecord {
        if style.link_uri_ref == u32::MAX && style.link_id_ref == u32::MAX {
            if let Some((uri_ref, id_ref)) = self.pending_link {
                style.link_uri_ref = uri_ref;
                style.link_id_ref = id_ref;
            }
        }
        style
    }

    /// Draws a single interned string at `(x, y)`.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, style: Option<StyleRecord>) {
        let string_ref = self.intern_string(text);
        let style = self.resolve_link(style.unwrap_or_default());
        self.push_header(opcode::DRAW_TEXT, record_size::DRAW_TEXT);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u32(string_ref);
        self.push_style(style);
        self.push_u32(0);
        self.push_u32(0);
        self.push_u32(0);
    }

    /// Draws a previously-recorded text-run blob at `(x, y)`.
    pub fn draw_text_run(&mut self, x: i32, y: i32, blob_id: u32) {
        self.push_header(opcode::DRAW_TEXT_RUN, record_size::DRAW_TEXT_RUN);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u32(blob_id);
        self.push_u32(0);
    }

    /// Pushes a clip rect; nested clips intersect in the backend.
    pub fn push_clip(&mut self, x: i32, y: i32, w: u16, h: u16) {
        self.push_header(opcode::PUSH_CLIP, record_size::PUSH_CLIP);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u16(w);
        self.push_u16(h);
        self.push_u32(0);
    }

    /// Pops the innermost clip rect.
    pub fn pop_clip(&mut self) {
        self.push_header(opcode::POP_CLIP, record_size::POP_CLIP);
    }

    /// Moves/shows the cursor.
    pub fn set_cursor(&mut self, x: i32, y: i32, shape: CursorShape, visible: bool, blink: bool) {
        self.push_header(opcode::SET_CURSOR, record_size::SET_CURSOR);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u16(shape.to_u16());
        self.push_u8(visible as u8);
        self.push_u8(blink as u8);
    }

    /// Hides the cursor.
    pub fn hide_cursor(&mut self) {
        self.set_cursor(0, 0, CursorShape::default(), false, false);
    }

    /// Sets (or clears, passing `u32::MAX` for both) the link carried by
    /// subsequent `draw_text`/`draw_text_run` calls that don't specify
    /// their own link refs.
    pub fn set_link(&mut self, uri_ref: u32, id_ref: u32) {
        self.pending_link = if uri_ref == u32::MAX && id_ref == u32::MAX {
            None
        } else {
            Some((uri_ref, id_ref))
        };
    }

    /// Draws a blob-backed sub-cell canvas.
    pub fn draw_canvas(
        &mut self,
        x: i32,
        y: i32,
        w: u16,
        h: u16,
        blob_id: u32,
        blitter: Blitter,
        px_w: Option<u16>,
        px_h: Option<u16>,
    ) {
        self.push_header(opcode::DRAW_CANVAS, record_size::DRAW_CANVAS);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u16(w);
        self.push_u16(h);
        self.push_u32(blob_id);
        self.push_u32(blitter.to_u32());
        self.push_u16(px_w.unwrap_or(0));
        self.push_u16(px_h.unwrap_or(0));
    }

    /// Draws a blob-backed bitmap image.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image(
        &mut self,
        x: i32,
        y: i32,
        w: u16,
        h: u16,
        blob_id: u32,
        format: ImageFormat,
        protocol: ImageProtocol,
        z_layer: i32,
        fit: ImageFit,
        image_id: u32,
        px_w: Option<u16>,
        px_h: Option<u16>,
    ) {
        self.push_header(opcode::DRAW_IMAGE, record_size::DRAW_IMAGE);
        self.push_i32(x);
        self.push_i32(y);
        self.push_u16(w);
        self.push_u16(h);
        self.push_u32(blob_id);
        self.push_u32(pack_image_modes(format, protocol, fit));
        self.push_i32(z_layer);
        self.push_u32(image_id);
        self.push_u16(px_w.unwrap_or(0));
        self.push_u16(px_h.unwrap_or(0));
    }

    /// Copies a region from the previous frame (the scroll/blit
    /// optimization).
    pub fn blit_rect(&mut self, src_x: i32, src_y: i32, w: u16, h: u16, dst_x: i32, dst_y: i32) {
        self.push_header(opcode::BLIT_RECT, record_size::BLIT_RECT);
        self.push_i32(src_x);
        self.push_i32(src_y);
        self.push_u16(w);
        self.push_u16(h);
        self.push_i32(dst_x);
        self.push_i32(dst_y);
    }

    /// Number of commands recorded so far.
    pub fn command_count(&self) -> u32 {
        self.cmd_count
    }

    /// Serializes the complete drawlist into `dst`, overwriting it.
    pub fn build_into(&self, dst: &mut Vec<u8>) {
        dst.clear();

        let cmd_offset = HEADER_SIZE;
        let cmd_bytes = self.commands.len() as u32;

        let strings_span_offset = cmd_offset + cmd_bytes;
        let strings_span_bytes = (self.strings_spans.len() as u32) * 8;
        let strings_bytes_offset = strings_span_offset + strings_span_bytes;
        let strings_bytes_length = self.strings_bytes.len() as u32;
        let strings_bytes_padded = strings_bytes_length.div_ceil(4) * 4;

        let blobs_span_offset = strings_bytes_offset + strings_bytes_padded;
        let blobs_span_bytes = (self.blob_spans.len() as u32) * 8;
        let blobs_bytes_offset = blobs_span_offset + blobs_span_bytes;
        let blobs_bytes_length = self.blobs_bytes.len() as u32;
        let blobs_bytes_padded = blobs_bytes_length.div_ceil(4) * 4;

        let total_size = blobs_bytes_offset + blobs_bytes_padded;

        dst.extend_from_slice(&MAGIC);
        dst.extend_from_slice(&VERSION.to_le_bytes());
        dst.extend_from_slice(&HEADER_SIZE.to_le_bytes());
        dst.extend_from_slice(&total_size.to_le_bytes());
        dst.extend_from_slice(&cmd_offset.to_le_bytes());
        dst.extend_from_slice(&cmd_bytes.to_le_bytes());
        dst.extend_from_slice(&self.cmd_count.to_le_bytes());
        dst.extend_from_slice(&strings_span_offset.to_le_bytes());
        dst.extend_from_slice(&(self.strings_spans.len() as u32).to_le_bytes());
        dst.extend_from_slice(&strings_bytes_offset.to_le_bytes());
        dst.extend_from_slice(&strings_bytes_length.to_le_bytes());
        dst.extend_from_slice(&blobs_span_offset.to_le_bytes());
        dst.extend_from_slice(&(self.blob_spans.len() as u32).to_le_bytes());
        dst.extend_from_slice(&blobs_bytes_offset.to_le_bytes());
        dst.extend_from_slice(&blobs_bytes_length.to_le_bytes());
        dst.extend_from_slice(&0u32.to_le_bytes()); // reserved

        debug_assert_eq!(dst.len() as u32, HEADER_SIZE);
        dst.extend_from_slice(&self.commands);

        for (offset, length) in &self.strings_spans {
            dst.extend_from_slice(&offset.to_le_bytes());
            dst.extend_from_slice(&length.to_le_bytes());
        }
        dst.extend_from_slice(&self.strings_bytes);
        dst.resize(dst.len() + (strings_bytes_padded - strings_bytes_length) as usize, 0);

        for (offset, length) in &self.blob_spans {
            dst.extend_from_slice(&offset.to_le_bytes());
            dst.extend_from_slice(&length.to_le_bytes());
        }
        dst.extend_from_slice(&self.blobs_bytes);
        dst.resize(dst.len() + (blobs_bytes_padded - blobs_bytes_length) as usize, 0);
    }

    /// Serializes the complete drawlist into a freshly allocated buffer.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.build_into(&mut out);
        out
    }

    /// Clears all recorded state, ready for the next frame.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.cmd_count = 0;
        self.string_index.clear();
        self.strings_bytes.clear();
        self.strings_spans.clear();
        self.blobs_bytes.clear();
        self.blob_spans.clear();
        self.pending_link = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(bytes: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
    }

    #[test]
    fn test_header_fields_byte_identical() {
        let mut b = DrawlistBuilder::new();
        b.clear();
        b.fill_rect(0, 0, 10, 5, None);
        let bytes = b.build();

        assert_eq!(&bytes[0..4], b"ZRDL");
        assert_eq!(read_u32(&bytes, 4), VERSION);
        assert_eq!(read_u32(&bytes, 8), HEADER_SIZE);
        assert_eq!(read_u32(&bytes, 16), HEADER_SIZE); // cmd_offset
        assert_eq!(
            read_u32(&bytes, 20),
            record_size::CLEAR + record_size::FILL_RECT
        );
        assert_eq!(read_u32(&bytes, 24), 2); // cmd_count
        assert_eq!(read_u32(&bytes, 60), 0); // reserved
    }

    #[test]
    fn test_clear_record_size() {
        let mut b = DrawlistBuilder::new();
        b.clear();
        let bytes = b.build();
        let cmd_bytes = read_u32(&bytes, 20);
        assert_eq!(cmd_bytes, record_size::CLEAR);
        let opcode = u16::from_le_bytes(bytes[64..66].try_into().unwrap());
        assert_eq!(opcode, opcode::CLEAR);
    }

    #[test]
    fn test_string_interning_dedups_equal_strings() {
        let mut b = DrawlistBuilder::new();
        let a = b.intern_string("hello");
        let c = b.intern_string("hello");
        let d = b.intern_string("world");
        assert_eq!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_blob_overflow_returns_none() {
        let mut b = DrawlistBuilder::with_blob_cap(8);
        let ok = b.add_pixel_blob(&[0u8; 4]);
        assert!(ok.is_some());
        let overflow = b.add_pixel_blob(&[0u8; 16]);
        assert!(overflow.is_none());
    }

    #[test]
    fn test_text_run_blob_overflow_degrades() {
        let mut b = DrawlistBuilder::with_blob_cap(4); // smaller than one segment's header
        let segments = vec![("abc".to_string(), StyleRecord::default())];
        assert!(b.add_text_run_blob(&segments).is_none());
        // Caller degrades: one draw_text per segment still works.
        for (text, style) in &segments {
            b.draw_text(0, 0, text, Some(*style));
        }
        assert_eq!(b.command_count(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut b = DrawlistBuilder::new();
        b.clear();
        b.intern_string("x");
        b.reset();
        assert_eq!(b.command_count(), 0);
        assert_eq!(b.build(), DrawlistBuilder::new().build());
    }

    #[test]
    fn test_build_into_matches_build() {
        let mut b = DrawlistBuilder::new();
        b.draw_text(1, 2, "hi", None);
        let mut dst = vec![1, 2, 3]; // pre-existing garbage, must be cleared
        b.build_into(&mut dst);
        assert_eq!(dst, b.build());
    }

    #[test]
    fn test_set_link_applies_to_following_text() {
        let mut b = DrawlistBuilder::new();
        b.set_link(5, 6);
        b.draw_text(0, 0, "link text", None);
        let bytes = b.build();
        // DRAW_TEXT record starts right after CLEAR-less cmd stream at cmd_offset.
        let rec_start = HEADER_SIZE as usize;
        let style_start = rec_start + 8 + 4 + 4 + 4; // header + x + y + string_ref
        let link_uri_ref = read_u32(&bytes, style_start + 20);
        let link_id_ref = read_u32(&bytes, style_start + 24);
        assert_eq!(link_uri_ref, 5);
        assert_eq!(link_id_ref, 6);
    }
}
