//! Scrollbar rendering (part of C8): a pure function of track length,
//! thumb position and viewport ratio (§4.8 "Scrollbar rendering").

use crate::style::{Color, StyleRecord};

/// A scrollbar gutter to draw: a single-column (or row) track with a thumb
/// segment, plus the inner clip the content should be shrunk to make room
/// for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollbarPlan {
    /// Offset along the track where the thumb begins, in cells.
    pub thumb_start: u16,
    /// Thumb length, in cells. Always at least 1 when a scrollbar is drawn.
    pub thumb_len: u16,
    /// Total track length, in cells.
    pub track_len: u16,
}

/// Whether a scrollbar should be drawn at all: the content exceeds the
/// viewport, matching the teacher's `needs_scrollbar = content > viewport`
/// check before any `Auto`/`Scroll` mode dispatch.
pub fn needs_scrollbar(content_extent: u32, viewport_extent: u16) -> bool {
    content_extent > viewport_extent as u32
}

/// Computes a scrollbar's thumb geometry for a `track_len`-cell track,
/// `content_extent`-cell content, scrolled to `scroll_offset`.
///
/// `thumb_len = ceil(track_len * track_len / content_extent)`, clamped to at
/// least 1 cell and never larger than the track; `thumb_start` derives from
/// the scroll ratio clamped so the thumb never runs past the track's end.
pub fn plan(track_len: u16, content_extent: u32, scroll_offset: u32) -> Option<ScrollbarPlan> {
    if !needs_scrollbar(content_extent, track_len) || track_len == 0 {
        return None;
    }
    let track = track_len as u32;
    let thumb_len = ((track * track) + content_extent - 1) / content_extent;
    let thumb_len = (thumb_len.max(1).min(track)) as u16;

    let max_scroll = content_extent.saturating_sub(track_len as u32).max(1);
    let scroll_ratio = (scroll_offset.min(max_scroll)) as f32 / max_scroll as f32;
    let max_thumb_start = track_len.saturating_sub(thumb_len);
    let thumb_start = (scroll_ratio * max_thumb_start as f32).round() as u16;

    Some(ScrollbarPlan {
        thumb_start: thumb_start.min(max_thumb_start),
        thumb_len,
        track_len,
    })
}

/// Track glyph drawn for cells outside the thumb.
pub const TRACK_GLYPH: char = '│';
/// Thumb glyph drawn for cells inside the thumb span.
pub const THUMB_GLYPH: char = '█';
/// Foreground color for the track glyph.
pub const TRACK_COLOR: Color = Color::BrightBlack;

/// The per-cell style records for a vertical scrollbar gutter column,
/// `track_len` entries long, thumb cells distinguished from track cells.
pub fn vertical_glyphs(plan: &ScrollbarPlan) -> Vec<(char, StyleRecord)> {
    (0..plan.track_len)
        .map(|row| {
            if row >= plan.thumb_start && row < plan.thumb_start + plan.thumb_len {
                (THUMB_GLYPH, StyleRecord::default())
            } else {
                let mut rec = StyleRecord::default();
                rec.fg = TRACK_COLOR.encode();
                (TRACK_GLYPH, rec)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_scrollbar_when_content_fits() {
        assert!(plan(10, 10, 0).is_none());
        assert!(plan(10, 5, 0).is_none());
    }

    #[test]
    fn test_thumb_covers_whole_track_ratio() {
        // 10-cell track, 20-cell content: thumb should be half the track.
        let p = plan(10, 20, 0).unwrap();
        assert_eq!(p.thumb_len, 5);
        assert_eq!(p.thumb_start, 0);
    }

    #[test]
    fn test_thumb_reaches_end_at_max_scroll() {
        let p = plan(10, 20, 10).unwrap();
        assert_eq!(p.thumb_start + p.thumb_len, 10);
    }

    #[test]
    fn test_thumb_len_never_zero() {
        let p = plan(5, 1000, 0).unwrap();
        assert!(p.thumb_len >= 1);
    }

    #[test]
    fn test_vertical_glyphs_len_matches_track() {
        let p = plan(10, 20, 0).unwrap();
        assert_eq!(vertical_glyphs(&p).len(), 10);
    }
}
