//! Engine-wide configuration: environment inputs honored by the scheduler
//! (§6.3) plus the width and damage-abandon policies the layout/damage
//! modules consult.

/// Emoji/ambiguous-width measurement policy (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidthPolicy {
    /// CJK ideographs, full-width forms and emoji-presentation sequences
    /// (including VS16 and keycap) measure as 2 cells. Default.
    #[default]
    Wide,
    /// All such sequences measure as 1 cell.
    Narrow,
}

/// Bundles the environment inputs the frame scheduler and layout/damage
/// pipeline honor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximum time, in milliseconds, the scheduler waits for a frame ack
    /// before treating the channel as stalled.
    pub frame_timeout_ms: u32,
    /// Integer FPS cap throttling frame submission (§4.9). Default 60.
    pub fps_cap: u32,
    /// Whether the backend renders into an alternate screen buffer.
    pub alternate_buffer: bool,
    /// Whether the backend is allowed to patch the live console in place
    /// (as opposed to a full clear-and-redraw) when not using incremental
    /// damage.
    pub patch_console: bool,
    /// Text-width measurement policy for ambiguous-width glyphs.
    pub width_policy: WidthPolicy,
    /// Fraction of viewport cells (0.0-1.0) above which accumulated damage
    /// rects abandon incremental rendering in favor of a full redraw (§4.7).
    /// Default 0.45.
    pub damage_abandon_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 1000,
            fps_cap: 60,
            alternate_buffer: true,
            patch_console: false,
            width_policy: WidthPolicy::Wide,
            damage_abandon_threshold: 0.45,
        }
    }
}

impl EngineConfig {
    /// A configuration tuned for deterministic tests: no FPS throttling
    /// surprises, default width policy, default abandon threshold.
    pub fn debug() -> Self {
        Self {
            frame_timeout_ms: 5000,
            fps_cap: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_spec_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.fps_cap, 60);
        assert!((cfg.damage_abandon_threshold - 0.45).abs() < f32::EPSILON);
        assert_eq!(cfg.width_policy, WidthPolicy::Wide);
    }

    #[test]
    fn test_debug_disables_fps_cap() {
        let cfg = EngineConfig::debug();
        assert_eq!(cfg.fps_cap, 0);
    }
}
