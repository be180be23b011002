//! Transition tracks driving the "animate this rect/opacity" part of §4.9.

use crate::bounds::Rect;

/// Easing curves applied to transition progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    /// Applies the curve to a linear progress value in `[0.0, 1.0]`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

/// A single instance's in-flight position/size/opacity transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionTrack {
    pub from_rect: Rect,
    pub to_rect: Rect,
    pub from_opacity: f32,
    pub to_opacity: f32,
    pub start_ms: u64,
    pub duration_ms: u32,
    pub easing: Easing,
    pub animate_position: bool,
    pub animate_size: bool,
    pub animate_opacity: bool,
}

impl TransitionTrack {
    /// Starts a new track. Returns `None` for a zero-duration transition,
    /// which per §4.9 is never tracked — the target values apply instantly.
    pub fn start(
        from_rect: Rect,
        to_rect: Rect,
        from_opacity: f32,
        to_opacity: f32,
        start_ms: u64,
        duration_ms: u32,
        easing: Easing,
        animate_position: bool,
        animate_size: bool,
        animate_opacity: bool,
    ) -> Option<Self> {
        if duration_ms == 0 {
            return None;
        }
        Some(Self {
            from_rect,
            to_rect,
            from_opacity,
            to_opacity,
            start_ms,
            duration_ms,
            easing,
            animate_position,
            animate_size,
            animate_opacity,
        })
    }

    /// Progress in `[0.0, 1.0]` at `now_ms`, pre-easing.
    fn linear_progress(&self, now_ms: u64) -> f32 {
        if now_ms <= self.start_ms {
            return 0.0;
        }
        let elapsed = (now_ms - self.start_ms) as f32;
        (elapsed / self.duration_ms as f32).min(1.0)
    }

    /// True once `now_ms` has passed the track's full duration.
    pub fn is_settled(&self, now_ms: u64) -> bool {
        self.linear_progress(now_ms) >= 1.0
    }

    /// The interpolated rect at `now_ms`; only the animated axes move, the
    /// others snap straight to `to_rect`.
    pub fn current_rect(&self, now_ms: u64) -> Rect {
        let t = self.easing.apply(self.linear_progress(now_ms));
        let lerp_i32 = |a: i32, b: i32| a + ((b - a) as f32 * t).round() as i32;
        let lerp_u16 = |a: u16, b: u16| (a as f32 + (b as f32 - a as f32) * t).round() as u16;

        let (x, y) = if self.animate_position {
            (
                lerp_i32(self.from_rect.x, self.to_rect.x),
                lerp_i32(self.from_rect.y, self.to_rect.y),
            )
        } else {
            (self.to_rect.x, self.to_rect.y)
        };
        let (w, h) = if self.animate_size {
            (
                lerp_u16(self.from_rect.w, self.to_rect.w),
                lerp_u16(self.from_rect.h, self.to_rect.h),
            )
        } else {
            (self.to_rect.w, self.to_rect.h)
        };
        Rect::new(x, y, w, h)
    }

    /// The interpolated opacity at `now_ms`.
    pub fn current_opacity(&self, now_ms: u64) -> f32 {
        if !self.animate_opacity {
            return self.to_opacity;
        }
        let t = self.easing.apply(self.linear_progress(now_ms));
        self.from_opacity + (self.to_opacity - self.from_opacity) * t
    }

    /// Retargets a running track to a new destination, using the track's
    /// current animated value as the new origin (§4.9 retargeting rule).
    pub fn retarget(
        &self,
        now_ms: u64,
        to_rect: Rect,
        to_opacity: f32,
        duration_ms: u32,
        easing: Easing,
    ) -> Option<Self> {
        Self::start(
            self.current_rect(now_ms),
            to_rect,
            self.current_opacity(now_ms),
            to_opacity,
            now_ms,
            duration_ms,
            easing,
            self.animate_position,
            self.animate_size,
            self.animate_opacity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TransitionTrack {
        TransitionTrack::start(
            Rect::new(0, 0, 10, 10),
            Rect::new(10, 10, 10, 10),
            0.0,
            1.0,
            1000,
            1000,
            Easing::Linear,
            true,
            false,
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_duration_not_tracked() {
        assert!(TransitionTrack::start(
            Rect::zero(),
            Rect::zero(),
            0.0,
            1.0,
            0,
            0,
            Easing::Linear,
            true,
            true,
            true
        )
        .is_none());
    }

    #[test]
    fn test_progress_halfway() {
        let t = track();
        let r = t.current_rect(1500);
        assert_eq!(r, Rect::new(5, 5, 10, 10));
        assert!((t.current_opacity(1500) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_settles_at_full_duration() {
        let t = track();
        assert!(!t.is_settled(1999));
        assert!(t.is_settled(2000));
        assert_eq!(t.current_rect(2000), Rect::new(10, 10, 10, 10));
    }

    #[test]
    fn test_before_start_clamped_to_from() {
        let t = track();
        assert_eq!(t.current_rect(500), Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_retarget_uses_current_value_as_origin() {
        let t = track();
        let retargeted = t
            .retarget(1500, Rect::new(20, 20, 10, 10), 1.0, 1000, Easing::Linear)
            .unwrap();
        assert_eq!(retargeted.from_rect, Rect::new(5, 5, 10, 10));
        assert_eq!(retargeted.start_ms, 1500);
    }
}
