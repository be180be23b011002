//! Runtime-tree commit / diff (C6): folds a freshly built vnode tree into
//! the persistent [`RuntimeInstance`] tree, reusing subtrees whose vnode is
//! unchanged and mounting/unmounting where the shape diverges (§4.6).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{EngineError, UserCodeErrorSink};
use crate::instance::{IdAllocator, RuntimeInstance};
use crate::vnode::{VNode, VNodeKind, VNodeRef};

/// Commits `next` against the previously committed `prev` (if any),
/// returning the updated runtime tree. `allocator` mints ids for newly
/// mounted instances; `sink` receives errors raised by `on_unmount`/cleanup
/// callbacks caught during unmount.
pub fn commit(
    prev: Option<RuntimeInstance>,
    next: &VNodeRef,
    allocator: &mut dyn IdAllocator,
    sink: &mut dyn UserCodeErrorSink,
) -> RuntimeInstance {
    let mut instance = match prev {
        None => mount_tree(next, allocator, sink),
        Some(prev) => reconcile(prev, next, allocator, sink),
    };
    propagate_dirty_tree(&mut instance);
    instance
}

/// Builds a fresh instance for `vnode` and all its children, each marked
/// dirty (first mount is always visually new).
fn mount_tree(vnode: &VNodeRef, allocator: &mut dyn IdAllocator, sink: &mut dyn UserCodeErrorSink) -> RuntimeInstance {
    let mut instance = RuntimeInstance::mount(allocator.next_id(), Rc::clone(vnode));
    let children = effective_children(&mut instance, sink);
    instance.children = children.iter().map(|c| mount_tree(c, allocator, sink)).collect();
    instance
}

/// Resolves the vnodes `instance` should reconcile its children against,
/// returning `instance.vnode.children` afterward. For every kind but
/// `ErrorBoundary` this is a no-op. An `ErrorBoundary` instead calls its
/// `build` closure under `catch_unwind`; a panic (or a latch left by a
/// prior panic) routes to `fallback` instead, producing a single synthetic
/// child that replaces `instance.vnode`'s (always empty) `children` field
/// so that layout, render and hit-testing — which all read children off
/// the committed instance tree — see the same shape this diff used (§4.6,
/// §8 S3).
fn effective_children(instance: &mut RuntimeInstance, sink: &mut dyn UserCodeErrorSink) -> Vec<VNodeRef> {
    let VNodeKind::ErrorBoundary(props) = &instance.vnode.kind else {
        return instance.vnode.children.clone();
    };
    let props = props.clone();

    if instance.local_state.retry_requested.get() {
        instance.local_state.retry_requested.set(false);
        instance.local_state.last_error = None;
        instance.local_state.retry_count += 1;
    }

    let child = if instance.local_state.last_error.is_none() {
        match catch_unwind(AssertUnwindSafe(|| (props.build)())) {
            Ok(child) => Some(child),
            Err(payload) => {
                let error = EngineError::from_panic_payload(payload);
                instance.local_state.last_error = Some(error.to_string());
                sink.report(error);
                None
            }
        }
    } else {
        None
    };

    let child = match child {
        Some(child) => child,
        None => {
            let message = instance.local_state.last_error.clone().unwrap_or_default();
            let retry_flag = Rc::clone(&instance.local_state.retry_requested);
            let retry: Rc<dyn Fn()> = Rc::new(move || retry_flag.set(true));
            match catch_unwind(AssertUnwindSafe(|| (props.fallback)(&message, retry))) {
                Ok(child) => child,
                Err(payload) => {
                    sink.report(EngineError::from_panic_payload(payload));
                    crate::vnode::text(message)
                }
            }
        }
    };

    let mut synthetic: VNode = (*instance.vnode).clone();
    synthetic.children = vec![Rc::new(child)];
    instance.vnode = Rc::new(synthetic);
    instance.vnode.children.clone()
}

/// Runs `prev`'s `on_unmount` cleanup hook (and its descendants', depth
/// first) and drops any per-instance state tied to its identity. Panics
/// from user callbacks are caught and reported through `sink` rather than
/// aborting the commit (§4.6 unmount semantics).
pub(crate) fn unmount_subtree(instance: RuntimeInstance, sink: &mut dyn UserCodeErrorSink) {
    for child in instance.children {
        unmount_subtree(child, sink);
    }
    if let Some(hook) = instance.vnode.events.on_unmount.clone() {
        let result = catch_unwind(AssertUnwindSafe(|| hook()));
        if let Err(payload) = result {
            sink.report(EngineError::from_panic_payload(payload));
        }
    }
}

/// True when two vnodes of the same kind carry identical visual/routing
/// props: the fields that drive layout, rendering, or input routing.
/// Callback identity is deliberately excluded (only presence matters, and
/// that is already covered by `kind` equality via `EventCallbacks::eq`).
fn visual_props_equal(a: &VNodeRef, b: &VNodeRef) -> bool {
    a.kind == b.kind
        && a.style == b.style
        && a.focus_style == b.focus_style
        && a.hover_style == b.hover_style
        && a.focusable == b.focusable
        && a.disabled == b.disabled
        && a.events == b.events
}

/// Same (kind, key) identity: the commit's unit of reuse (§4.6 step 4).
fn same_identity(prev: &VNodeRef, next: &VNodeRef) -> bool {
    std::mem::discriminant(&prev.kind) == std::mem::discriminant(&next.kind) && prev.key == next.key
}

fn reconcile(
    mut instance: RuntimeInstance,
    next: &VNodeRef,
    allocator: &mut dyn IdAllocator,
    sink: &mut dyn UserCodeErrorSink,
) -> RuntimeInstance {
    if Rc::ptr_eq(&instance.vnode, next) {
        instance.self_dirty = false;
        return instance;
    }

    if !same_identity(&instance.vnode, next) {
        let id = instance.id;
        unmount_subtree(instance, sink);
        let mut fresh = mount_tree(next, allocator, sink);
        fresh.id = id;
        return fresh;
    }

    instance.self_dirty = !visual_props_equal(&instance.vnode, next);
    instance.vnode = Rc::clone(next);
    if instance.self_dirty {
        instance.invalidate_packet();
    }

    let next_children = effective_children(&mut instance, sink);
    let mut prev_children: Vec<Option<RuntimeInstance>> = instance.children.drain(..).map(Some).collect();
    let mut reconciled = Vec::with_capacity(next_children.len());
    for (i, next_child) in next_children.iter().enumerate() {
        let prev_child = prev_children.get_mut(i).and_then(Option::take);
        reconciled.push(match prev_child {
            Some(child) => reconcile(child, next_child, allocator, sink),
            None => mount_tree(next_child, allocator, sink),
        });
    }
    for leftover in prev_children.into_iter().flatten() {
        unmount_subtree(leftover, sink);
    }
    instance.children = reconciled;
    instance
}

/// Recomputes `dirty` bottom-up for the whole subtree after a commit. Also
/// used by damage tracking (C7) after it forces extra instances dirty.
pub(crate) fn propagate_dirty_tree(instance: &mut RuntimeInstance) {
    for child in &mut instance.children {
        propagate_dirty_tree(child);
    }
    instance.propagate_dirty();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingErrorSink;
    use crate::instance::SequentialIdAllocator;
    use crate::vnode::{row, text, VNode};
    use std::cell::Cell;

    fn commit_pair(prev: Option<RuntimeInstance>, next: VNode) -> RuntimeInstance {
        let next: VNodeRef = Rc::new(next);
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        commit(prev, &next, &mut alloc, &mut sink)
    }

    #[test]
    fn test_first_commit_mounts_fresh_tree() {
        let root = commit_pair(None, row(vec![text("a"), text("b")]));
        assert!(root.dirty);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.id, 0);
        assert_eq!(root.children[0].id, 1);
        assert_eq!(root.children[1].id, 2);
    }

    #[test]
    fn test_reference_identity_short_circuits() {
        let shared: VNodeRef = Rc::new(text("same"));
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        let first = commit(None, &shared, &mut alloc, &mut sink);
        let mut second = commit(Some(first), &shared, &mut alloc, &mut sink);
        second.clear_dirty_shallow();
        let third = commit(Some(second), &shared, &mut alloc, &mut sink);
        assert!(!third.self_dirty);
        assert!(!third.dirty);
    }

    #[test]
    fn test_kind_change_remounts_and_preserves_id() {
        let root = commit_pair(None, text("hi"));
        let id = root.id;
        let root2 = commit_pair(Some(root), row(vec![]));
        assert_eq!(root2.id, id);
        assert!(root2.self_dirty);
    }

    #[test]
    fn test_text_content_change_marks_self_dirty_not_remount() {
        let root = commit_pair(None, text("hi"));
        let id = root.id;
        let root2 = commit_pair(Some(root), text("bye"));
        assert_eq!(root2.id, id);
        assert!(root2.self_dirty);
    }

    #[test]
    fn test_extra_child_mounted_missing_child_unmounted() {
        let root = commit_pair(None, row(vec![text("a"), text("b")]));
        let root2 = commit_pair(Some(root), row(vec![text("a")]));
        assert_eq!(root2.children.len(), 1);
    }

    #[test]
    fn test_unmount_runs_cleanup_hook_once() {
        let ran = Rc::new(Cell::new(0));
        let ran_clone = Rc::clone(&ran);
        let child = text("a").on_unmount(move || ran_clone.set(ran_clone.get() + 1));
        let root = commit_pair(None, row(vec![child]));
        let root2 = commit_pair(Some(root), row(vec![]));
        assert_eq!(root2.children.len(), 0);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_unmount_panic_is_caught_and_reported() {
        struct CountingSink(u32);
        impl UserCodeErrorSink for CountingSink {
            fn report(&mut self, _error: EngineError) {
                self.0 += 1;
            }
        }
        let child = text("a").on_unmount(|| panic!("boom"));
        let next: VNodeRef = Rc::new(row(vec![child]));
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        let root = commit(None, &next, &mut alloc, &mut sink);

        let empty: VNodeRef = Rc::new(row(vec![]));
        let mut counting = CountingSink(0);
        let root2 = commit(Some(root), &empty, &mut alloc, &mut counting);
        assert_eq!(root2.children.len(), 0);
        assert_eq!(counting.0, 1);
    }

    #[test]
    fn test_error_boundary_builds_child_when_build_succeeds() {
        let root = commit_pair(
            None,
            crate::vnode::error_boundary("b1", || text("ok"), |msg, _retry| text(msg)),
        );
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.vnode.children.len(), 1);
        match &root.children[0].vnode.kind {
            crate::vnode::VNodeKind::Text(p) => assert_eq!(p.content, "ok"),
            other => panic!("expected text child, got {other:?}"),
        }
    }

    #[test]
    fn test_error_boundary_catches_panic_and_renders_fallback() {
        let root = commit_pair(
            None,
            crate::vnode::error_boundary("b1", || panic!("boundary boom"), |msg, _retry| text(msg)),
        );
        assert_eq!(root.children.len(), 1);
        match &root.children[0].vnode.kind {
            crate::vnode::VNodeKind::Text(p) => assert!(p.content.contains("boundary boom")),
            other => panic!("expected fallback text child, got {other:?}"),
        }
        assert!(root.local_state.last_error.is_some());
    }

    #[test]
    fn test_error_boundary_stays_on_fallback_until_retried() {
        let build_count = Rc::new(Cell::new(0));
        let counted = Rc::clone(&build_count);
        let vnode = crate::vnode::error_boundary(
            "b1",
            move || {
                counted.set(counted.get() + 1);
                panic!("boundary boom");
            },
            |msg, _retry| text(msg),
        );
        let next: VNodeRef = Rc::new(vnode.clone());
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        let root = commit(None, &next, &mut alloc, &mut sink);
        let root2 = commit(Some(root), &next, &mut alloc, &mut sink);
        assert_eq!(build_count.get(), 1);
        assert!(root2.local_state.last_error.is_some());
    }

    #[test]
    fn test_error_boundary_retry_clears_latch_and_rebuilds() {
        let healthy = Rc::new(Cell::new(false));
        let healthy_clone = Rc::clone(&healthy);
        let retry_cell: Rc<Cell<Option<Rc<dyn Fn()>>>> = Rc::new(Cell::new(None));
        let retry_capture = Rc::clone(&retry_cell);
        let vnode = crate::vnode::error_boundary(
            "b1",
            move || {
                if healthy_clone.get() {
                    text("recovered")
                } else {
                    panic!("boundary boom")
                }
            },
            move |msg, retry| {
                retry_capture.set(Some(retry));
                text(msg)
            },
        );
        let next: VNodeRef = Rc::new(vnode);
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        let root = commit(None, &next, &mut alloc, &mut sink);
        assert!(root.local_state.last_error.is_some());

        let retry = retry_cell.take().expect("fallback captured a retry closure");
        healthy.set(true);
        retry();

        let root2 = commit(Some(root), &next, &mut alloc, &mut sink);
        assert!(root2.local_state.last_error.is_none());
        match &root2.children[0].vnode.kind {
            crate::vnode::VNodeKind::Text(p) => assert_eq!(p.content, "recovered"),
            other => panic!("expected recovered text child, got {other:?}"),
        }
    }

    #[test]
    fn test_dirty_propagates_to_root_when_leaf_changes() {
        let root = commit_pair(None, row(vec![row(vec![text("a")])]));
        let mut root = root;
        root.children[0].children[0].clear_dirty_shallow();
        root.children[0].clear_dirty_shallow();
        root.clear_dirty_shallow();
        let next: VNodeRef = Rc::new(row(vec![row(vec![text("b")])]));
        let mut alloc = SequentialIdAllocator::default();
        let mut sink = LoggingErrorSink;
        let committed = commit(Some(root), &next, &mut alloc, &mut sink);
        assert!(committed.dirty);
        assert!(!committed.self_dirty);
        assert!(committed.children[0].dirty);
        assert!(committed.children[0].children[0].self_dirty);
    }
}
