//! The input router (C10): maps decoded events to focus changes, local
//! widget state (scroll/tree navigation) and user callbacks, in the fixed
//! precedence order of §4.10.
//!
//! The router never runs the view function itself — it only invokes the
//! opaque closures a [`crate::vnode::VNode`] was built with (`on_click`,
//! `on_key`, `on_char`, overlay `on_escape`/shortcuts) and mutates
//! [`crate::instance::LocalState`] for scroll/navigation that the core owns
//! outright. The scheduler (`scheduler.rs`) decides what a [`RouteOutcome`]
//! means for this frame's dirty bits.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{EngineError, UserCodeErrorSink};
use crate::event::{Event, MouseKind};
use crate::instance::{InstanceId, RuntimeInstance};
use crate::key::{Key, KeyWithModifiers};
use crate::layout::LayoutNode;
use crate::style::Overflow;
use crate::vnode::VNodeKind;

/// How many rows one `PageUp`/`PageDown` moves a virtual list's scroll
/// offset, absent a more precise viewport-derived figure.
const PAGE_STEP: u32 = 10;

/// App-level keybinding table (`app.keys({...})`, §6.3).
#[derive(Default)]
pub struct AppKeyBindings {
    bindings: HashMap<KeyWithModifiers, Rc<dyn Fn()>>,
}

impl AppKeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `chord`.
    pub fn bind(&mut self, chord: KeyWithModifiers, handler: impl Fn() + 'static) {
        self.bindings.insert(chord, Rc::new(handler));
    }

    fn get(&self, chord: &KeyWithModifiers) -> Option<Rc<dyn Fn()>> {
        self.bindings.get(chord).cloned()
    }
}

/// What happened while routing one event. The scheduler maps this to
/// dirty bits: a fired callback is an opaque state-update request and
/// promotes to `DIRTY_VIEW`; a focus/scroll change is `DIRTY_RENDER` only
/// (§4.10 rule 6); `Consumed` swallows the event with no redraw implied
/// beyond what the caller already scheduled; `Unhandled` means no target
/// matched at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Unhandled,
    CallbackFired,
    FocusChanged {
        from: Option<InstanceId>,
        to: Option<InstanceId>,
    },
    ScrollChanged,
    Consumed,
}

/// Finds the highest-`z_index` `Layer` marked `is_overlay` anywhere in the
/// tree — the topmost active overlay per §4.10 rule 1. Overlays nested
/// under other overlays are not modeled; the search is a flat max over the
/// whole tree, which matches a single layered overlay host per app.
pub fn topmost_overlay(instance: &RuntimeInstance) -> Option<&RuntimeInstance> {
    let mut best: Option<&RuntimeInstance> = None;
    find_overlays(instance, &mut best);
    best
}

fn find_overlays<'a>(instance: &'a RuntimeInstance, best: &mut Option<&'a RuntimeInstance>) {
    if let VNodeKind::Layer(p) = &instance.vnode.kind {
        if p.is_overlay {
            let better = match best {
                Some(b) => match &b.vnode.kind {
                    VNodeKind::Layer(bp) => p.z_index > bp.z_index,
                    _ => true,
                },
                None => true,
            };
            if better {
                *best = Some(instance);
            }
        }
    }
    for child in &instance.children {
        find_overlays(child, best);
    }
}

/// True while any overlay layer is present in the tree (§4.7's
/// `has_overlay` damage condition, §4.10 rule 1).
pub fn has_overlay(instance: &RuntimeInstance) -> bool {
    topmost_overlay(instance).is_some()
}

fn call0(f: &Rc<dyn Fn()>, sink: &mut dyn UserCodeErrorSink) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f())) {
        sink.report(EngineError::from_panic_payload(payload));
    }
}

fn fire_on_click(instance: &RuntimeInstance, sink: &mut dyn UserCodeErrorSink) -> RouteOutcome {
    match instance.vnode.events.on_click.clone() {
        Some(f) => {
            call0(&f, sink);
            RouteOutcome::CallbackFired
        }
        None => RouteOutcome::Unhandled,
    }
}

fn fire_on_key(instance: &RuntimeInstance, key: KeyWithModifiers, sink: &mut dyn UserCodeErrorSink) -> RouteOutcome {
    match instance.vnode.events.on_key.clone() {
        Some(f) => {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(key))) {
                sink.report(EngineError::from_panic_payload(payload));
            }
            RouteOutcome::CallbackFired
        }
        None => RouteOutcome::Unhandled,
    }
}

fn fire_on_char(instance: &RuntimeInstance, ch: char, sink: &mut dyn UserCodeErrorSink) -> RouteOutcome {
    match instance.vnode.events.on_char.clone() {
        Some(f) => {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(ch))) {
                sink.report(EngineError::from_panic_payload(payload));
            }
            RouteOutcome::CallbackFired
        }
        None => RouteOutcome::Unhandled,
    }
}

/// Adjusts a virtual list's scroll offset by `delta` rows, clamped to
/// `[0, item_count - 1]`.
fn scroll_virtual_list(instance: &mut RuntimeInstance, delta: i64) -> RouteOutcome {
    let item_count = match &instance.vnode.kind {
        VNodeKind::VirtualList(p) => p.item_count,
        _ => return RouteOutcome::Unhandled,
    };
    let max = item_count.saturating_sub(1) as i64;
    let current = instance.local_state.scroll_y as i64;
    let next = (current + delta).clamp(0, max.max(0));
    if next as u32 == instance.local_state.scroll_y {
        return RouteOutcome::Unhandled;
    }
    instance.local_state.scroll_y = next as u32;
    RouteOutcome::ScrollChanged
}

fn set_virtual_list_scroll(instance: &mut RuntimeInstance, value: u32) -> RouteOutcome {
    if instance.local_state.scroll_y == value {
        return RouteOutcome::Unhandled;
    }
    instance.local_state.scroll_y = value;
    RouteOutcome::ScrollChanged
}

/// Dispatches a key press to the currently focused instance, per §4.10
/// rule 4's per-kind table. Kinds that own no built-in navigation
/// (input/slider/tree/select/…) simply forward to `on_key`/`on_char`,
/// leaving value mutation to the view function, since their editable
/// state lives in vnode props the app owns.
fn dispatch_focused_key(instance: &mut RuntimeInstance, key: KeyWithModifiers, sink: &mut dyn UserCodeErrorSink) -> RouteOutcome {
    match &instance.vnode.kind {
        VNodeKind::VirtualList(p) => {
            let item_count = p.item_count;
            match key.key {
                Key::Up => scroll_virtual_list(instance, -1),
                Key::Down => scroll_virtual_list(instance, 1),
                Key::PageUp => scroll_virtual_list(instance, -(PAGE_STEP as i64)),
                Key::PageDown => scroll_virtual_list(instance, PAGE_STEP as i64),
                Key::Home => set_virtual_list_scroll(instance, 0),
                Key::End => set_virtual_list_scroll(instance, item_count.saturating_sub(1)),
                Key::Enter | Key::Space => fire_on_click(instance, sink),
                _ => fire_on_key(instance, key, sink),
            }
        }
        VNodeKind::Tree(_) | VNodeKind::Button(_) => match key.key {
            Key::Enter | Key::Space => fire_on_click(instance, sink),
            _ => fire_on_key(instance, key, sink),
        },
        _ => fire_on_key(instance, key, sink),
    }
}

fn find_mut(instance: &mut RuntimeInstance, id: InstanceId) -> Option<&mut RuntimeInstance> {
    if instance.id == id {
        return Some(instance);
    }
    instance.children.iter_mut().find_map(|c| find_mut(c, id))
}

/// Collects focusable, non-disabled instance ids in document (pre-)order,
/// the focus ring Tab/Shift+Tab cycles over (§4.10 rule 6).
pub fn focus_ring(instance: &RuntimeInstance) -> Vec<InstanceId> {
    let mut out = Vec::new();
    collect_focus_ring(instance, &mut out);
    out
}

fn collect_focus_ring(instance: &RuntimeInstance, out: &mut Vec<InstanceId>) {
    if instance.vnode.focusable && !instance.vnode.disabled {
        out.push(instance.id);
    }
    for child in &instance.children {
        collect_focus_ring(child, out);
    }
}

/// Innermost scroll container (a structural node with `Overflow::Scroll`
/// or `Overflow::Auto`) whose rect contains `(x, y)`.
fn find_scroll_container_at<'a>(
    instance: &'a mut RuntimeInstance,
    layout: &LayoutNode,
    x: i32,
    y: i32,
) -> Option<&'a mut RuntimeInstance> {
    if !layout.rect.contains_point(x, y) {
        return None;
    }
    for (child, child_layout) in instance.children.iter_mut().zip(&layout.children) {
        if let Some(found) = find_scroll_container_at(child, child_layout, x, y) {
            return Some(found);
        }
    }
    let scrollable = instance
        .vnode
        .style
        .as_ref()
        .and_then(|s| s.overflow)
        .map(|o| matches!(o, Overflow::Scroll | Overflow::Auto))
        .unwrap_or(false);
    if scrollable {
        Some(instance)
    } else {
        None
    }
}

/// Routes one decoded event against the committed runtime tree, in the
/// fixed precedence order of §4.10. `focused` is the currently focused
/// instance id (if any); `app_keys` is the app-level keybinding table.
#[allow(clippy::too_many_arguments)]
pub fn route(
    event: &Event,
    root: &mut RuntimeInstance,
    layout: &LayoutNode,
    focused: Option<InstanceId>,
    app_keys: &AppKeyBindings,
    sink: &mut dyn UserCodeErrorSink,
) -> RouteOutcome {
    match event {
        Event::Key { key, modifiers, .. } => {
            let chord = KeyWithModifiers::with(*key, *modifiers);

            // Rule 1: topmost overlay intercepts keyboard events; Esc closes.
            if let Some(overlay) = topmost_overlay(root) {
                let overlay_id = overlay.id;
                if matches!(key, Key::Escape) {
                    let on_escape = if let VNodeKind::Layer(p) = &overlay.vnode.kind {
                        p.on_escape.clone()
                    } else {
                        None
                    };
                    return match on_escape {
                        Some(f) => {
                            call0(&f, sink);
                            RouteOutcome::CallbackFired
                        }
                        None => RouteOutcome::Consumed,
                    };
                }
                // Rule 2: overlay's own shortcut table.
                let shortcuts = if let VNodeKind::Layer(p) = &overlay.vnode.kind {
                    p.shortcuts.clone()
                } else {
                    Vec::new()
                };
                if let Some(binding) = shortcuts.iter().find(|b| b.chord == chord) {
                    call0(&binding.handler, sink);
                    return RouteOutcome::CallbackFired;
                }
                // An overlay is active: only the escape/shortcut paths above
                // and focused-widget routing below (e.g. an input inside the
                // overlay) may still handle this key; app bindings are
                // skipped for the duration of rule 3.
                let _ = overlay_id;
            } else {
                // Rule 3: app-level keybinding table.
                if let Some(f) = app_keys.get(&chord) {
                    call0(&f, sink);
                    return RouteOutcome::CallbackFired;
                }
            }

            // Rule 4: focused-widget keyboard routing.
            if let Some(id) = focused {
                if let Some(instance) = find_mut(root, id) {
                    return dispatch_focused_key(instance, chord, sink);
                }
            }
            RouteOutcome::Unhandled
        }

        Event::Text { codepoint, .. } => {
            let byte = *codepoint as u32;
            if (0x01..=0x1f).contains(&byte) {
                if let Some(chord) = KeyWithModifiers::synthesize_ctrl_letter(byte as u8) {
                    if let Some(f) = app_keys.get(&chord) {
                        call0(&f, sink);
                        return RouteOutcome::CallbackFired;
                    }
                }
            }
            if let Some(id) = focused {
                if let Some(instance) = find_mut(root, id) {
                    return fire_on_char(instance, *codepoint, sink);
                }
            }
            RouteOutcome::Unhandled
        }

        Event::Mouse {
            x,
            y,
            kind,
            wheel_y,
            ..
        } => {
            match kind {
                MouseKind::Scroll => {
                    if let Some(container) = find_scroll_container_at(root, layout, *x, *y) {
                        let delta = *wheel_y as i64;
                        let max = container.local_state.content_height as i64;
                        let current = container.local_state.scroll_y as i64;
                        let next = (current + delta).clamp(0, max.max(0));
                        if next as u32 != container.local_state.scroll_y {
                            container.local_state.scroll_y = next as u32;
                            return RouteOutcome::ScrollChanged;
                        }
                    }
                    RouteOutcome::Unhandled
                }
                MouseKind::Down => {
                    let hit = crate::hittest::hit_test(root, layout, *x, *y);
                    match hit {
                        Some(id) => {
                            let from = focused;
                            if let Some(instance) = find_mut(root, id) {
                                let outcome = fire_on_click(instance, sink);
                                if matches!(outcome, RouteOutcome::CallbackFired) || from != Some(id) {
                                    return RouteOutcome::FocusChanged { from, to: Some(id) };
                                }
                                RouteOutcome::Unhandled
                            } else {
                                RouteOutcome::Unhandled
                            }
                        }
                        None => RouteOutcome::Unhandled,
                    }
                }
                _ => RouteOutcome::Unhandled,
            }
        }

        _ => RouteOutcome::Unhandled,
    }
}

/// Cycles the focus ring forward (`Tab`) or backward (`Shift+Tab`),
/// wrapping around, skipping disabled widgets by construction (the ring
/// only ever contains enabled focusable ids). Returns `None` if the ring
/// is empty.
pub fn cycle_focus(ring: &[InstanceId], current: Option<InstanceId>, forward: bool) -> Option<InstanceId> {
    if ring.is_empty() {
        return None;
    }
    let Some(current) = current else {
        return Some(if forward { ring[0] } else { ring[ring.len() - 1] });
    };
    let pos = ring.iter().position(|&id| id == current);
    match pos {
        None => Some(ring[0]),
        Some(pos) => {
            let len = ring.len() as i64;
            let next = if forward {
                (pos as i64 + 1).rem_euclid(len)
            } else {
                (pos as i64 - 1).rem_euclid(len)
            };
            Some(ring[next as usize])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingErrorSink;
    use crate::event::EventBatchBuilder;
    use crate::instance::SequentialIdAllocator;
    use crate::key::Modifiers;
    use crate::layout::LayoutMeta;
    use crate::vnode::{button, column, overlay_layer};
    use std::cell::Cell;
    use std::rc::Rc;

    fn leaf(rect: crate::bounds::Rect) -> LayoutNode {
        LayoutNode {
            rect,
            meta: LayoutMeta::default(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_tab_cycles_forward_and_wraps() {
        let ring = vec![1, 2, 3];
        assert_eq!(cycle_focus(&ring, None, true), Some(1));
        assert_eq!(cycle_focus(&ring, Some(1), true), Some(2));
        assert_eq!(cycle_focus(&ring, Some(3), true), Some(1));
    }

    #[test]
    fn test_shift_tab_cycles_backward_and_wraps() {
        let ring = vec![1, 2, 3];
        assert_eq!(cycle_focus(&ring, Some(1), false), Some(3));
    }

    #[test]
    fn test_focus_ring_skips_disabled_and_non_focusable() {
        use crate::vnode::text;
        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(column(vec![
            button("a"),
            button("b").disabled(true),
            text("c"),
        ]));
        let root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let ring = focus_ring(&root);
        assert_eq!(ring, vec![1]);
    }

    #[test]
    fn test_app_binding_fires_on_ctrl_p() {
        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(button("a"));
        let mut root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 10, 1));

        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let mut keys = AppKeyBindings::new();
        keys.bind(
            KeyWithModifiers::with(Key::Char('p'), Modifiers::CTRL),
            move || fired_clone.set(true),
        );

        let event = Event::Key {
            time_ms: 0,
            key: Key::Char('p'),
            modifiers: Modifiers::CTRL,
            is_repeat: false,
        };
        let outcome = route(&event, &mut root, &layout, None, &keys, &mut LoggingErrorSink);
        assert_eq!(outcome, RouteOutcome::CallbackFired);
        assert!(fired.get());
    }

    #[test]
    fn test_ctrl_letter_synthesized_from_text_event_only_when_not_tab_or_enter() {
        let builder_events = EventBatchBuilder::new()
            .text(0, '\u{09}')
            .text(0, '\u{10}')
            .build();
        let events = crate::event::decode(&builder_events).unwrap();
        assert!(KeyWithModifiers::synthesize_ctrl_letter(0x09).is_none());
        assert!(matches!(events[0], Event::Text { codepoint, .. } if codepoint == '\u{09}'));
    }

    #[test]
    fn test_overlay_intercepts_escape() {
        let mut alloc = SequentialIdAllocator::default();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let vnode = Rc::new(overlay_layer(0, button("close")).on_escape(move || fired_clone.set(true)));
        let mut root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 10, 1));
        let keys = AppKeyBindings::new();

        let event = Event::Key {
            time_ms: 0,
            key: Key::Escape,
            modifiers: Modifiers::empty(),
            is_repeat: false,
        };
        let outcome = route(&event, &mut root, &layout, None, &keys, &mut LoggingErrorSink);
        assert_eq!(outcome, RouteOutcome::CallbackFired);
        assert!(fired.get());
    }

    #[test]
    fn test_overlay_blocks_app_binding_for_plain_key() {
        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(overlay_layer(0, button("x")));
        let mut root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 10, 1));

        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let mut keys = AppKeyBindings::new();
        keys.bind(KeyWithModifiers::plain(Key::Char('q')), move || fired_clone.set(true));

        let event = Event::Key {
            time_ms: 0,
            key: Key::Char('q'),
            modifiers: Modifiers::empty(),
            is_repeat: false,
        };
        route(&event, &mut root, &layout, None, &keys, &mut LoggingErrorSink);
        assert!(!fired.get());
    }

    #[test]
    fn test_virtual_list_arrow_scrolls_without_callback() {
        use crate::vnode::VNode;
        use crate::vnode::VNodeKind;
        use crate::vnode::VirtualListProps;

        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(
            VNode::new(VNodeKind::VirtualList(VirtualListProps {
                item_count: 100,
                item_height: 1,
                scroll_offset: 0,
            }))
            .focusable(true),
        );
        let mut root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 10, 10));
        let keys = AppKeyBindings::new();

        let event = Event::Key {
            time_ms: 0,
            key: Key::Down,
            modifiers: Modifiers::empty(),
            is_repeat: false,
        };
        let outcome = route(&event, &mut root, &layout, Some(0), &keys, &mut LoggingErrorSink);
        assert_eq!(outcome, RouteOutcome::ScrollChanged);
        assert_eq!(root.local_state.scroll_y, 1);
    }

    #[test]
    fn test_mouse_click_fires_on_click_and_moves_focus() {
        let mut alloc = SequentialIdAllocator::default();
        let clicked = Rc::new(Cell::new(false));
        let clicked_clone = clicked.clone();
        let vnode = Rc::new(button("go").on_click(move || clicked_clone.set(true)));
        let mut root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 10, 1));
        let keys = AppKeyBindings::new();

        let event = Event::Mouse {
            time_ms: 0,
            x: 2,
            y: 0,
            kind: MouseKind::Down,
            buttons: 1,
            wheel_x: 0,
            wheel_y: 0,
        };
        let outcome = route(&event, &mut root, &layout, None, &keys, &mut LoggingErrorSink);
        assert_eq!(
            outcome,
            RouteOutcome::FocusChanged {
                from: None,
                to: Some(0)
            }
        );
        assert!(clicked.get());
    }

    #[test]
    fn test_hit_test_half_open_rect_excludes_far_edge() {
        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(button("go"));
        let root = crate::commit::commit(None, &vnode, &mut alloc, &mut LoggingErrorSink);
        let layout = leaf(crate::bounds::Rect::new(0, 0, 5, 1));
        assert_eq!(crate::hittest::hit_test(&root, &layout, 5, 0), None);
        assert_eq!(crate::hittest::hit_test(&root, &layout, 4, 0), Some(0));
    }
}
