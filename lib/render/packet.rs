//! Render packets (part of C8): a cached, origin-relative log of drawlist
//! builder calls that can be replayed with a translated origin instead of
//! re-rendering (§4.8).

use crate::drawlist::DrawlistBuilder;
use crate::style::StyleRecord;

/// One recorded builder call, in node-local coordinates (relative to the
/// node's own top-left corner at the time of recording).
#[derive(Debug, Clone, PartialEq)]
pub enum PacketOp {
    FillRect {
        x: i32,
        y: i32,
        w: u16,
        h: u16,
        style: StyleRecord,
    },
    DrawText {
        x: i32,
        y: i32,
        text: String,
        style: StyleRecord,
    },
    PushClip {
        x: i32,
        y: i32,
        w: u16,
        h: u16,
    },
    PopClip,
    BlitRect {
        src_x: i32,
        src_y: i32,
        w: u16,
        h: u16,
        dst_x: i32,
        dst_y: i32,
    },
}

/// A cached render packet for one non-structural instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPacket {
    /// Content hash this packet was recorded under (§4.8's `hash(...)`).
    pub key: u64,
    ops: Vec<PacketOp>,
}

/// Recorder handed to per-kind renderers instead of the real
/// [`DrawlistBuilder`] so their calls can be captured for replay. Any op a
/// renderer performs that is *not* representable as a translated replay
/// (cursor placement, links, non-blob canvas/image, stateful clips
/// affecting state outside the node) marks the packet invalid; it is
/// dropped instead of cached on record, per §4.8.
#[derive(Debug, Default)]
pub struct PacketRecorder {
    ops: Vec<PacketOp>,
    invalid: bool,
}

impl PacketRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, w: u16, h: u16, style: StyleRecord) {
        self.ops.push(PacketOp::FillRect { x, y, w, h, style });
    }

    pub fn draw_text(&mut self, x: i32, y: i32, text: impl Into<String>, style: StyleRecord) {
        self.ops.push(PacketOp::DrawText {
            x,
            y,
            text: text.into(),
            style,
        });
    }

    pub fn push_clip(&mut self, x: i32, y: i32, w: u16, h: u16) {
        self.ops.push(PacketOp::PushClip { x, y, w, h });
    }

    pub fn pop_clip(&mut self) {
        self.ops.push(PacketOp::PopClip);
    }

    pub fn blit_rect(&mut self, src_x: i32, src_y: i32, w: u16, h: u16, dst_x: i32, dst_y: i32) {
        self.ops.push(PacketOp::BlitRect {
            src_x,
            src_y,
            w,
            h,
            dst_x,
            dst_y,
        });
    }

    /// Marks this recording as unrepresentable for caching (cursor/link/
    /// non-blob image emitted directly instead).
    pub fn mark_uncacheable(&mut self) {
        self.invalid = true;
    }

    /// True once [`Self::mark_uncacheable`] has been called. Callers use
    /// this to fall back to a one-shot, uncached replay via [`replay_ops`]
    /// instead of [`Self::finish`].
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// The ops recorded so far, for the uncacheable one-shot replay path.
    pub fn ops(&self) -> &[PacketOp] {
        &self.ops
    }

    /// Finishes the recording, producing a packet keyed by `key` unless the
    /// recording was marked uncacheable, in which case `None` is returned
    /// and the caller must have already emitted the ops directly.
    pub fn finish(self, key: u64) -> Option<RenderPacket> {
        if self.invalid {
            None
        } else {
            Some(RenderPacket { key, ops: self.ops })
        }
    }
}

/// Replays a standalone op list with a translated origin, without going
/// through a cached [`RenderPacket`] — the uncacheable one-shot path.
pub fn replay_ops(ops: &[PacketOp], origin_x: i32, origin_y: i32, builder: &mut DrawlistBuilder) {
    RenderPacket { key: 0, ops: ops.to_vec() }.replay(origin_x, origin_y, builder);
}

impl RenderPacket {
    /// Replays the recorded ops into `builder`, translating every
    /// coordinate by `(origin_x, origin_y)`. Produces byte-identical
    /// drawlist ops to the originating render when the origin is unchanged
    /// (§8 invariant 5, "packet stability").
    pub fn replay(&self, origin_x: i32, origin_y: i32, builder: &mut DrawlistBuilder) {
        for op in &self.ops {
            match op {
                PacketOp::FillRect { x, y, w, h, style } => {
                    builder.fill_rect(origin_x + x, origin_y + y, *w, *h, Some(*style));
                }
                PacketOp::DrawText { x, y, text, style } => {
                    builder.draw_text(origin_x + x, origin_y + y, text, Some(*style));
                }
                PacketOp::PushClip { x, y, w, h } => {
                    builder.push_clip(origin_x + x, origin_y + y, *w, *h);
                }
                PacketOp::PopClip => builder.pop_clip(),
                PacketOp::BlitRect {
                    src_x,
                    src_y,
                    w,
                    h,
                    dst_x,
                    dst_y,
                } => {
                    builder.blit_rect(
                        origin_x + src_x,
                        origin_y + src_y,
                        *w,
                        *h,
                        origin_x + dst_x,
                        origin_y + dst_y,
                    );
                }
            }
        }
    }

    /// Number of ops in the packet, for diagnostics/tests.
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_translates_origin() {
        let mut rec = PacketRecorder::new();
        rec.fill_rect(1, 1, 2, 2, StyleRecord::default());
        let packet = rec.finish(42).unwrap();

        let mut builder_a = DrawlistBuilder::new();
        packet.replay(0, 0, &mut builder_a);
        let mut builder_b = DrawlistBuilder::new();
        packet.replay(5, 5, &mut builder_b);

        // Same op count; different coordinates baked into the bytes.
        assert_ne!(builder_a.build(), builder_b.build());
        assert_eq!(builder_a.command_count(), builder_b.command_count());
    }

    #[test]
    fn test_uncacheable_recording_yields_no_packet() {
        let mut rec = PacketRecorder::new();
        rec.draw_text(0, 0, "cursor line", StyleRecord::default());
        rec.mark_uncacheable();
        assert!(rec.finish(1).is_none());
    }

    #[test]
    fn test_replay_same_origin_is_byte_identical() {
        let mut rec = PacketRecorder::new();
        rec.draw_text(2, 3, "hi", StyleRecord::default());
        rec.push_clip(0, 0, 10, 10);
        rec.pop_clip();
        let packet = rec.finish(7).unwrap();

        let mut builder_a = DrawlistBuilder::new();
        packet.replay(10, 10, &mut builder_a);
        let mut builder_b = DrawlistBuilder::new();
        packet.replay(10, 10, &mut builder_b);
        assert_eq!(builder_a.build(), builder_b.build());
    }
}
