//! The widget renderer / frame scheduler (C9): the coordinator that owns
//! the committed runtime tree, the previous layout tree, the render-packet
//! caches (held per-instance on [`RuntimeInstance`] itself), animation
//! tracks, and the `DIRTY_VIEW` / `DIRTY_LAYOUT` / `DIRTY_RENDER` bits that
//! decide each submission's frame plan (§4.9).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use bitflags::bitflags;

use crate::animation::{Easing, TransitionTrack};
use crate::bounds::Rect;
use crate::commit;
use crate::config::EngineConfig;
use crate::damage::{self, Damage, DamageConditions};
use crate::drawlist::DrawlistBuilder;
use crate::error::{EngineError, UserCodeErrorSink};
use crate::event::Event;
use crate::instance::{InstanceId, RuntimeInstance, SequentialIdAllocator};
use crate::key::{Key, KeyWithModifiers, Modifiers};
use crate::layout::{self, cache::LayoutCaches, Axis, LayoutNode};
use crate::render::{self, RenderContext};
use crate::router::{self, AppKeyBindings, RouteOutcome};
use crate::vnode::{column, text, VNode, VNodeKind, VNodeRef};

bitflags! {
    /// What the next submitted frame must redo, accumulated between
    /// submissions and cleared once a frame is produced (§4.9).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        const VIEW   = 0b001;
        const LAYOUT = 0b010;
        const RENDER = 0b100;
    }
}

/// One submitted frame's encoded bytes plus bookkeeping an app loop or
/// test can use without re-deriving it.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub bytes: Vec<u8>,
    pub full_redraw: bool,
    /// True if the user's view function actually ran this frame (false on
    /// a layout-only or render-only frame, and false while crashed).
    pub view_invoked: bool,
    /// True if an active transition (or dirt the FPS cap deferred) means
    /// the caller should keep ticking without waiting on new input.
    pub wants_followup: bool,
}

/// The coordinator described by §4.9. Single-threaded, synchronous: every
/// method here must complete without suspension, matching the
/// "commit/layout/render/routing are synchronous" rule of §5.
pub struct Scheduler {
    cfg: EngineConfig,
    id_alloc: SequentialIdAllocator,
    root: Option<RuntimeInstance>,
    /// The last fully-rendered tree/layout pair, the `prev` side of damage
    /// computation. Distinct from `root`, which damage mutates in place as
    /// `next` while computing this frame's dirty set.
    prev_snapshot: Option<(RuntimeInstance, LayoutNode)>,
    layout_caches: LayoutCaches,
    dirty: DirtyFlags,
    in_flight: bool,
    last_submit_ms: Option<u64>,
    viewport: Rect,
    last_rendered_viewport: Rect,
    theme: u64,
    last_rendered_theme: u64,
    focused: Option<InstanceId>,
    prev_focused: Option<InstanceId>,
    pressed: Option<InstanceId>,
    focus_ring: Vec<InstanceId>,
    app_keys: AppKeyBindings,
    /// Set when the view function panicked; cleared by [`Self::retry`].
    crashed: Option<String>,
    /// Set by [`Self::note_dropped_batches`]; consumed (and cleared) by the
    /// next frame as a forced full redraw, since state may have diverged
    /// from what the router saw (§5 "Backpressure", open question (i)).
    pending_full_redraw: bool,
}

impl Scheduler {
    pub fn new(cfg: EngineConfig, viewport: Rect) -> Self {
        Self {
            cfg,
            id_alloc: SequentialIdAllocator::default(),
            root: None,
            prev_snapshot: None,
            layout_caches: LayoutCaches::new(),
            dirty: DirtyFlags::VIEW,
            in_flight: false,
            last_submit_ms: None,
            viewport,
            last_rendered_viewport: Rect::zero(),
            theme: 0,
            last_rendered_theme: 0,
            focused: None,
            prev_focused: None,
            pressed: None,
            focus_ring: Vec::new(),
            app_keys: AppKeyBindings::new(),
            crashed: None,
            pending_full_redraw: false,
        }
    }

    pub fn app_keys_mut(&mut self) -> &mut AppKeyBindings {
        &mut self.app_keys
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.is_some()
    }

    pub fn crash_message(&self) -> Option<&str> {
        self.crashed.as_deref()
    }

    /// "Press R to retry": clears the crash latch and forces a fresh view
    /// invocation on the next tick (§4.9).
    pub fn retry(&mut self) {
        self.crashed = None;
        self.dirty.insert(DirtyFlags::VIEW);
    }

    /// `stop()`/`dispose()` (§5 "Cancellation / timeouts"): runs unmount
    /// callbacks on the whole runtime tree (if any was ever committed) and
    /// drops it, so a second call is a no-op. Idempotent by construction:
    /// `root` is already `None` after the first call.
    pub fn shutdown(&mut self, sink: &mut dyn UserCodeErrorSink) {
        if let Some(root) = self.root.take() {
            crate::commit::unmount_subtree(root, sink);
        }
        self.prev_snapshot = None;
        self.in_flight = false;
        self.dirty = DirtyFlags::empty();
    }

    pub fn focused(&self) -> Option<InstanceId> {
        self.focused
    }

    pub fn root(&self) -> Option<&RuntimeInstance> {
        self.root.as_ref()
    }

    /// Marks the state underlying the view as changed; the next tick will
    /// re-run the view function (an opaque state-update request fired).
    pub fn mark_view_dirty(&mut self) {
        self.dirty.insert(DirtyFlags::VIEW);
    }

    /// A resize: always forces a re-layout; promotes to a full view rerun
    /// only if some committed widget reads the viewport directly (§4.9
    /// "viewport-aware" rule — approximated here as "the tree contains a
    /// virtual list", the one built-in kind whose visible window depends on
    /// the viewport rather than on intrinsic content).
    pub fn resize(&mut self, viewport: Rect) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.dirty.insert(DirtyFlags::LAYOUT);
        if self.is_viewport_aware() {
            self.dirty.insert(DirtyFlags::VIEW);
        }
    }

    /// Backend reported dropped event batches: the router may have seen a
    /// stale tree, so the next frame forces a full redraw rather than
    /// trusting incremental damage (§5, §8 open question (i)).
    pub fn note_dropped_batches(&mut self, _count: u32) {
        self.pending_full_redraw = true;
        self.dirty.insert(DirtyFlags::RENDER);
    }

    pub fn set_theme(&mut self, theme: u64) {
        if theme != self.theme {
            self.theme = theme;
            self.dirty.insert(DirtyFlags::RENDER);
        }
    }

    /// Backend acknowledgment of the previously submitted frame; lifts the
    /// in-flight backpressure so `tick` can submit the next one (§4.9
    /// coalescing).
    pub fn ack(&mut self) {
        self.in_flight = false;
    }

    fn is_viewport_aware(&self) -> bool {
        self.root
            .as_ref()
            .map(|r| subtree_contains(r, |k| matches!(k, VNodeKind::VirtualList(_))))
            .unwrap_or(false)
    }

    /// Routes one decoded event against the last-rendered tree, updating
    /// focus/scroll state and the dirty bits the outcome implies. `Tab` /
    /// `Shift+Tab` is the router's final fallback (§4.10 rule 6): if
    /// nothing upstream claimed the key, the scheduler cycles its own focus
    /// ring, since the ring itself is bookkeeping the router never owns.
    pub fn handle_event(&mut self, event: &Event, sink: &mut dyn UserCodeErrorSink) {
        if let Event::Resize { cols, rows, .. } = event {
            self.resize(Rect::new(0, 0, *cols, *rows));
            return;
        }
        if let Event::Engine { dropped_batches, .. } = event {
            if *dropped_batches > 0 {
                self.note_dropped_batches(*dropped_batches);
            }
            return;
        }

        let (Some(root), Some(layout)) = (self.root.as_mut(), self.prev_snapshot.as_ref().map(|(_, l)| l)) else {
            return;
        };

        if let Event::Key { key: Key::Tab, modifiers, .. } = event {
            let outcome = router::route(event, root, layout, self.focused, &self.app_keys, sink);
            if matches!(outcome, RouteOutcome::Unhandled) {
                self.focus_ring = router::focus_ring(root);
                let forward = !modifiers.contains(Modifiers::SHIFT);
                let to = router::cycle_focus(&self.focus_ring, self.focused, forward);
                if to != self.focused {
                    self.focused = to;
                    self.dirty.insert(DirtyFlags::RENDER);
                }
                return;
            }
            self.apply_outcome(outcome);
            return;
        }

        let outcome = router::route(event, root, layout, self.focused, &self.app_keys, sink);
        self.apply_outcome(outcome);
    }

    fn apply_outcome(&mut self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::CallbackFired => self.dirty.insert(DirtyFlags::VIEW),
            RouteOutcome::ScrollChanged => self.dirty.insert(DirtyFlags::RENDER),
            RouteOutcome::FocusChanged { to, .. } => {
                self.focused = to;
                self.dirty.insert(DirtyFlags::RENDER);
            }
            RouteOutcome::Consumed | RouteOutcome::Unhandled => {}
        }
    }

    /// Starts (or retargets, if one is already running) a position/size/
    /// opacity transition on `id`, animating from its last-rendered rect.
    /// No committed vnode prop currently opts a widget into this
    /// automatically (see `DESIGN.md`); a host drives it explicitly, e.g.
    /// in response to its own state transition.
    #[allow(clippy::too_many_arguments)]
    pub fn animate(
        &mut self,
        id: InstanceId,
        now_ms: u64,
        to_rect: Rect,
        to_opacity: f32,
        duration_ms: u32,
        easing: Easing,
        animate_position: bool,
        animate_size: bool,
        animate_opacity: bool,
    ) {
        let last_rect = self
            .prev_snapshot
            .as_ref()
            .and_then(|(root, layout)| find_rect(root, layout, id));
        let Some(root) = self.root.as_mut() else { return };
        let Some(instance) = find_mut(root, id) else { return };

        let track = match &instance.local_state.transition {
            Some(existing) => existing.retarget(now_ms, to_rect, to_opacity, duration_ms, easing),
            None => {
                let from_rect = last_rect.unwrap_or(to_rect);
                let from_opacity = 1.0;
                TransitionTrack::start(
                    from_rect,
                    to_rect,
                    from_opacity,
                    to_opacity,
                    now_ms,
                    duration_ms,
                    easing,
                    animate_position,
                    animate_size,
                    animate_opacity,
                )
            }
        };
        instance.local_state.transition = track;
        instance.invalidate_packet();
        self.dirty.insert(DirtyFlags::RENDER);
    }

    fn has_active_transition(&self) -> bool {
        self.root.as_ref().map(subtree_has_transition).unwrap_or(false)
    }

    /// Advances the scheduler by one potential frame submission. Returns
    /// `None` when nothing warrants one: backpressure (a prior frame is
    /// still in-flight), nothing dirty and no running transition, or the
    /// FPS cap not yet elapsed. `view_fn` runs at most once.
    pub fn tick(
        &mut self,
        now_ms: u64,
        view_fn: &mut dyn FnMut() -> VNode,
        sink: &mut dyn UserCodeErrorSink,
    ) -> Option<FrameOutput> {
        if self.in_flight {
            return None;
        }
        let first_frame = self.root.is_none();
        if self.dirty.is_empty() && !self.has_active_transition() && !first_frame {
            return None;
        }
        if let Some(last) = self.last_submit_ms {
            if self.cfg.fps_cap > 0 {
                let min_interval_ms = 1000 / self.cfg.fps_cap as u64;
                if now_ms.saturating_sub(last) < min_interval_ms {
                    return None;
                }
            }
        }

        let output = self.run_frame(now_ms, view_fn, sink);
        self.last_submit_ms = Some(now_ms);
        self.in_flight = true;
        Some(output)
    }

    fn run_frame(
        &mut self,
        now_ms: u64,
        view_fn: &mut dyn FnMut() -> VNode,
        sink: &mut dyn UserCodeErrorSink,
    ) -> FrameOutput {
        let first_frame = self.root.is_none();
        let run_view = first_frame || self.dirty.contains(DirtyFlags::VIEW) || self.crashed.is_some();
        let mut view_invoked = false;

        if run_view {
            let vnode = match self.crashed.clone() {
                Some(message) => crash_screen(&message),
                None => match catch_unwind(AssertUnwindSafe(&mut *view_fn)) {
                    Ok(v) => {
                        view_invoked = true;
                        v
                    }
                    Err(payload) => {
                        let err = EngineError::from_panic_payload(payload);
                        let message = err.to_string();
                        sink.report(err);
                        self.crashed = Some(message.clone());
                        crash_screen(&message)
                    }
                },
            };
            let next: VNodeRef = Rc::new(vnode);
            let prev_root = self.root.take();
            self.root = Some(commit::commit(prev_root, &next, &mut self.id_alloc, sink));
        }

        let cfg = self.cfg.clone();
        let viewport = self.viewport;
        let root = self.root.as_mut().expect("view ran on first frame or a root is already committed");

        let root_vnode = Rc::clone(&root.vnode);
        let layout_tree = self
            .layout_caches
            .layout(root.id, &root_vnode, 0, 0, viewport.w, viewport.h, Axis::Vertical, || {
                layout::layout(&root_vnode, 0, 0, viewport.w, viewport.h, Axis::Vertical, &cfg)
            })
            .unwrap_or_else(|err| {
                sink.report(err);
                LayoutNode::leaf(Rect::zero())
            });
        let mut layout_tree = layout_tree;
        let transitions_active = apply_transitions(root, &mut layout_tree, now_ms);

        let conditions = DamageConditions {
            forced_relayout: self.pending_full_redraw,
            has_position_or_exit_transition: transitions_active,
            viewport_changed: viewport != self.last_rendered_viewport,
            theme_changed: self.theme != self.last_rendered_theme,
            has_overlay: router::has_overlay(root),
        };
        self.pending_full_redraw = false;
        let prev_pair = self.prev_snapshot.as_ref().map(|(r, l)| (r, l));
        let damage = damage::compute_damage(
            prev_pair,
            root,
            &layout_tree,
            viewport,
            self.prev_focused,
            self.focused,
            conditions,
            &cfg,
        );

        let render_ctx = RenderContext {
            viewport,
            focused_id: self.focused,
            pressed_id: self.pressed,
            tick_ms: now_ms,
            cfg: &cfg,
        };
        let mut builder = DrawlistBuilder::new();
        let full_redraw = matches!(damage, Damage::Full);
        match &damage {
            Damage::Full => render::render(root, &layout_tree, &render_ctx, &mut builder),
            Damage::Partial { changed, removed, .. } => {
                render::render_partial(root, &layout_tree, changed, &render_ctx, &mut builder);
                self.layout_caches.evict_removed(removed);
            }
        }
        let bytes = builder.build();

        clear_dirty_recursive(root);
        self.prev_snapshot = Some((root.clone(), layout_tree.clone()));
        self.last_rendered_viewport = viewport;
        self.last_rendered_theme = self.theme;
        self.prev_focused = self.focused;
        self.dirty = DirtyFlags::empty();

        let wants_followup = self.has_active_transition();
        if wants_followup {
            self.dirty.insert(DirtyFlags::RENDER);
        }

        FrameOutput {
            bytes,
            full_redraw,
            view_invoked,
            wants_followup,
        }
    }
}

/// Built-in error screen shown while `crashed` is set (§4.9 "View throws").
fn crash_screen(message: &str) -> VNode {
    column(vec![
        text(format!("Message: {message}")),
        text("Press R to retry / Q to quit"),
    ])
}

fn subtree_contains(instance: &RuntimeInstance, pred: impl Fn(&VNodeKind) -> bool + Copy) -> bool {
    pred(&instance.vnode.kind) || instance.children.iter().any(|c| subtree_contains(c, pred))
}

fn subtree_has_transition(instance: &RuntimeInstance) -> bool {
    instance.local_state.transition.is_some() || instance.children.iter().any(subtree_has_transition)
}

/// Overwrites each instance's layout rect with its running transition's
/// interpolated rect at `now_ms`, clearing tracks that have settled.
/// Returns whether any track is still active after this pass.
fn apply_transitions(instance: &mut RuntimeInstance, layout: &mut LayoutNode, now_ms: u64) -> bool {
    let mut active = false;
    if let Some(track) = instance.local_state.transition {
        if track.is_settled(now_ms) {
            instance.local_state.transition = None;
            instance.invalidate_packet();
        } else {
            layout.rect = track.current_rect(now_ms);
            active = true;
        }
    }
    for (child, child_layout) in instance.children.iter_mut().zip(layout.children.iter_mut()) {
        if apply_transitions(child, child_layout, now_ms) {
            active = true;
        }
    }
    active
}

/// Recursively clears both dirty bits, the post-render baseline for the
/// next commit's diff (§3 "dirty bits cleared each frame after propagation").
fn clear_dirty_recursive(instance: &mut RuntimeInstance) {
    instance.clear_dirty_shallow();
    for child in &mut instance.children {
        clear_dirty_recursive(child);
    }
}

fn find_mut(instance: &mut RuntimeInstance, id: InstanceId) -> Option<&mut RuntimeInstance> {
    if instance.id == id {
        return Some(instance);
    }
    instance.children.iter_mut().find_map(|c| find_mut(c, id))
}

fn find_rect(instance: &RuntimeInstance, layout: &LayoutNode, id: InstanceId) -> Option<Rect> {
    if instance.id == id {
        return Some(layout.rect);
    }
    instance
        .children
        .iter()
        .zip(&layout.children)
        .find_map(|(c, cl)| find_rect(c, cl, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingErrorSink;
    use crate::vnode::{button, row, text};

    fn cfg() -> EngineConfig {
        EngineConfig::debug()
    }

    #[test]
    fn test_first_frame_runs_view_and_produces_bytes() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        let out = sched.tick(0, &mut || text("hello"), &mut sink).unwrap();
        assert!(out.view_invoked);
        assert!(out.full_redraw);
        assert!(!out.bytes.is_empty());
    }

    #[test]
    fn test_in_flight_backpressure_coalesces() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || text("a"), &mut sink).unwrap();
        sched.mark_view_dirty();
        assert!(sched.tick(1, &mut || text("b"), &mut sink).is_none());
        sched.ack();
        let out = sched.tick(2, &mut || text("b"), &mut sink).unwrap();
        assert!(out.view_invoked);
    }

    #[test]
    fn test_fps_cap_defers_rapid_retick() {
        let mut cfg = cfg();
        cfg.fps_cap = 10;
        let mut sched = Scheduler::new(cfg, Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || text("a"), &mut sink).unwrap();
        sched.ack();
        sched.mark_view_dirty();
        assert!(sched.tick(5, &mut || text("b"), &mut sink).is_none());
        sched.ack();
        let out = sched.tick(120, &mut || text("b"), &mut sink).unwrap();
        assert!(out.view_invoked);
    }

    #[test]
    fn test_focus_change_only_dirties_render_not_view() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || row(vec![button("a"), button("b")]), &mut sink).unwrap();
        sched.ack();

        sched.handle_event(
            &Event::Key {
                time_ms: 1,
                key: Key::Tab,
                modifiers: Modifiers::empty(),
                is_repeat: false,
            },
            &mut sink,
        );
        assert_eq!(sched.focused(), Some(0));
        let out = sched
            .tick(1, &mut || panic!("view must not rerun on focus-only change"), &mut sink)
            .unwrap();
        assert!(!out.view_invoked);
        sched.ack();
    }

    #[test]
    fn test_view_panic_shows_crash_screen_and_retry_recovers() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        let out = sched.tick(0, &mut || panic!("boundary boom"), &mut sink).unwrap();
        assert!(!out.view_invoked);
        assert!(sched.is_crashed());
        assert!(sched.crash_message().unwrap().contains("boundary boom"));
        sched.ack();

        sched.retry();
        let out2 = sched.tick(1, &mut || text("recovered"), &mut sink).unwrap();
        assert!(out2.view_invoked);
        assert!(!sched.is_crashed());
    }

    #[test]
    fn test_resize_without_virtual_list_does_not_promote_to_view() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || text("hi"), &mut sink).unwrap();
        sched.ack();

        sched.resize(Rect::new(0, 0, 40, 12));
        let out = sched
            .tick(1, &mut || panic!("view must not rerun on a plain resize"), &mut sink)
            .unwrap();
        assert!(!out.view_invoked);
    }

    #[test]
    fn test_dropped_batches_forces_full_redraw_once() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || text("hi"), &mut sink).unwrap();
        sched.ack();

        sched.handle_event(
            &Event::Engine {
                time_ms: 1,
                dropped_batches: 2,
            },
            &mut sink,
        );
        let out = sched.tick(1, &mut || text("hi"), &mut sink).unwrap();
        assert!(out.full_redraw);
        sched.ack();

        sched.mark_view_dirty();
        let out2 = sched.tick(2, &mut || text("hi"), &mut sink).unwrap();
        assert!(!out2.full_redraw);
    }

    #[test]
    fn test_resize_event_updates_viewport_via_handle_event() {
        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        sched.tick(0, &mut || text("hi"), &mut sink).unwrap();
        sched.ack();

        sched.handle_event(
            &Event::Resize {
                time_ms: 1,
                cols: 40,
                rows: 12,
            },
            &mut sink,
        );
        let out = sched
            .tick(1, &mut || panic!("view must not rerun on a plain resize"), &mut sink)
            .unwrap();
        assert!(!out.view_invoked);
    }

    #[test]
    fn test_shutdown_runs_unmount_and_is_idempotent() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut sched = Scheduler::new(cfg(), Rect::new(0, 0, 80, 24));
        let mut sink = LoggingErrorSink;
        let ran = Rc::new(Cell::new(0u32));
        let ran_clone = ran.clone();
        sched
            .tick(0, &mut move || text("a").on_unmount(move || ran_clone.set(ran_clone.get() + 1)), &mut sink)
            .unwrap();
        sched.ack();

        sched.shutdown(&mut sink);
        assert_eq!(ran.get(), 1);
        assert!(sched.root().is_none());

        sched.shutdown(&mut sink);
        assert_eq!(ran.get(), 1);
    }
}
