//! # drawterm-core
//!
//! A deterministic commit → layout → damage → render pipeline for
//! declarative terminal UIs. An embedder supplies a pure function from an
//! opaque state snapshot to a [`VNode`] tree; this crate turns successive
//! trees into a stream of binary **drawlist** frames (§6.1's `ZRDL`
//! format) for a backend to blit, and routes inbound **event batches**
//! (§6.2's `ZREV` format) back into focus changes and opaque state-update
//! requests.
//!
//! ## What this crate is not
//!
//! Terminal PTY I/O, ANSI emission, process/signal plumbing beyond the
//! `run()` convenience wrapper, and glyph rendering fidelity are a
//! backend's job, not this crate's. `drawterm-core` never touches stdout.
//!
//! ## Pipeline
//!
//! ```text
//!     external events ─► event::decode ─► scheduler (router step)
//!                                              │
//!                        view(state) ◄─────────┘
//!                                              │
//!                                              ▼
//!                         vnode ─► commit ─► damage ─► layout ─► render
//!                                                                   │
//!                                                                   ▼
//!                                                      drawlist bytes ─► backend
//! ```
//!
//! [`Scheduler`](scheduler::Scheduler) is the coordinator: it owns the
//! committed runtime tree, the previous layout/render-packet caches, and
//! the `DIRTY_VIEW`/`DIRTY_LAYOUT`/`DIRTY_RENDER` bits that decide each
//! submission's frame plan. [`App`](app::App) wraps it with the
//! concurrency model from §5 — the two suspending backend operations,
//! `request_frame`/`poll_events` — for embedders that want the full
//! `create_app`/`start`/`run` surface rather than driving the scheduler
//! by hand.
//!
//! ## Quick start
//!
//! ```rust
//! use drawterm_core::{Scheduler, EngineConfig, Rect, LoggingErrorSink};
//! use drawterm_core::vnode::{column, text};
//!
//! let mut scheduler = Scheduler::new(EngineConfig::default(), Rect::new(0, 0, 80, 24));
//! let mut sink = LoggingErrorSink;
//! let frame = scheduler
//!     .tick(0, &mut || column(vec![text("hello"), text("world")]), &mut sink)
//!     .expect("first tick always produces a frame");
//! assert!(!frame.bytes.is_empty());
//! ```

//--------------------------------------------------------------------------------------------------
// Modules: Data model (C3) and wire formats (C1, C2)
//--------------------------------------------------------------------------------------------------

/// The virtual-node model (C3): the immutable value tree a view function
/// returns each frame.
pub mod vnode;

/// Append-only binary drawlist writer (C1), the `ZRDL` frame format (§6.1)
/// a backend consumes.
pub mod drawlist;

/// Inbound event-batch decoder (C2), the `ZREV` format (§6.2).
pub mod event;

//--------------------------------------------------------------------------------------------------
// Modules: Runtime tree, layout, damage, render (C4-C8)
//--------------------------------------------------------------------------------------------------

/// The persistent runtime-instance tree: identity, per-kind local state,
/// and the render-packet cache slot committed instances own across
/// frames.
pub mod instance;

/// Runtime-tree commit/diff (C6): folds a freshly built vnode tree into
/// the persistent instance tree.
pub mod commit;

/// The layout engine and its measure/layout caches (C4).
pub mod layout;

/// Hit-testing (C5): locates the topmost focusable instance under a point.
pub mod hittest;

/// Grapheme-cluster display-width measurement (C5), including the
/// CJK/emoji/VS16/keycap width policy.
pub mod text;

/// Damage tracking (C7): decides whether a frame can render incrementally
/// and which instances/rects changed.
pub mod damage;

/// The render pipeline and render-packet cache (C8): walks a layout tree
/// and emits drawlist ops, replaying cached packets under translation
/// where possible.
pub mod render;

//--------------------------------------------------------------------------------------------------
// Modules: Scheduling, animation, input routing (C9, C10)
//--------------------------------------------------------------------------------------------------

/// Position/size/opacity transition tracks the scheduler drives each tick.
pub mod animation;

/// The frame scheduler (C9): coordinates commit → layout → damage →
/// render, coalesces submissions, and enforces backpressure.
pub mod scheduler;

/// The input router (C10): maps decoded events to focus changes, local
/// widget state, and opaque user callbacks, in §4.10's fixed precedence.
pub mod router;

//--------------------------------------------------------------------------------------------------
// Modules: App surface & concurrency (§5, §6.3)
//--------------------------------------------------------------------------------------------------

/// The `create_app`/`start`/`run` surface and the two-operation backend
/// contract from §5. Requires the `async` feature (enabled by default).
#[cfg(feature = "async")]
pub mod app;

//--------------------------------------------------------------------------------------------------
// Modules: Ambient stack
//--------------------------------------------------------------------------------------------------

/// Styling: colors, spacing, borders and the other visual style fields
/// vnodes and themes carry.
pub mod style;

/// Axis-aligned integer rectangles shared by layout, hit-testing and
/// damage.
pub mod bounds;

/// Keyboard key model and the ASCII-control-byte synthesis rule the
/// router uses (§4.10 rule 3).
pub mod key;

/// The closed set of engine error kinds (§7) and the user-code-error sink
/// callbacks report to.
pub mod error;

/// Environment inputs honored by the scheduler and layout/damage pipeline
/// (frame timeout, FPS cap, width policy, damage-abandon threshold).
pub mod config;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use bounds::Rect;
pub use commit::commit;
pub use config::{EngineConfig, WidthPolicy};
pub use damage::Damage;
pub use drawlist::DrawlistBuilder;
pub use error::{EngineError, EngineResult, LoggingErrorSink, UserCodeErrorSink};
pub use event::{BatchHandle, Event, EventBatchBuilder};
pub use instance::{InstanceId, RuntimeInstance, SequentialIdAllocator};
pub use key::{Key, KeyWithModifiers, Modifiers};
pub use scheduler::{DirtyFlags, FrameOutput, Scheduler};
pub use style::{BorderStyle, Color, Dimension, Direction, Overflow, Style, StyleBuilder};
pub use vnode::{VNode, VNodeKind, VNodeRef};

#[cfg(feature = "async")]
pub use app::{App, Backend, UserEventSender};
