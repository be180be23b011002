//! The persistent runtime-instance tree (half of C6): the mutable mirror of
//! the virtual-node tree that lives across frames and owns identity and
//! per-kind local state.

use std::cell::Cell;
use std::rc::Rc;

use crate::animation::TransitionTrack;
use crate::render::packet::RenderPacket;
use crate::vnode::VNodeRef;

/// A runtime instance's stable identity. Never reused within a live tree.
pub type InstanceId = u32;

/// Allocates fresh instance ids on mount. Injected into `commit` so tests
/// can use a fixed, deterministic seed (§4.6).
pub trait IdAllocator {
    fn next_id(&mut self) -> InstanceId;
}

/// A monotonically increasing allocator, the default production and test
/// implementation.
#[derive(Debug, Clone, Default)]
pub struct SequentialIdAllocator {
    next: InstanceId,
}

impl SequentialIdAllocator {
    /// Builds an allocator that hands out ids starting at `start`.
    pub fn starting_at(start: InstanceId) -> Self {
        Self { next: start }
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn next_id(&mut self) -> InstanceId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Per-kind local state that survives across frames for kinds that need it
/// (virtual lists, trees, scroll containers, error boundaries, transitions).
/// Most instances carry `None`.
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    /// Scroll offset and measured content extent for `box`/structural kinds
    /// with `Overflow::Scroll | Auto`.
    pub scroll_y: u32,
    pub content_height: u32,
    /// Error-boundary retry counter; incremented each time the user calls
    /// `retry()` (§8 S3). Isolated per boundary instance.
    pub retry_count: u32,
    /// The last error caught by this boundary, if any, cleared on retry.
    pub last_error: Option<String>,
    /// Set by the fallback's `retry()` closure; consumed at the start of the
    /// next commit for this boundary, which clears `last_error` and retries
    /// `build()`. Shared via `Rc` so the closure outlives the commit that
    /// created it.
    pub retry_requested: Rc<Cell<bool>>,
    /// Active position/size/opacity transition, if any (§4.9).
    pub transition: Option<TransitionTrack>,
    /// Expanded/focused node id for `tree` kind.
    pub tree_focused_id: Option<String>,
}

/// The persistent, mutable mirror of a [`crate::vnode::VNode`] subtree.
#[derive(Debug, Clone)]
pub struct RuntimeInstance {
    pub id: InstanceId,
    pub vnode: VNodeRef,
    pub children: Vec<RuntimeInstance>,
    /// Set when this instance's own visual/routing-relevant props changed
    /// this commit; cleared at the start of the next commit.
    pub self_dirty: bool,
    /// OR of `self_dirty` and every child's `dirty`, propagated bottom-up
    /// each commit (§3 invariant).
    pub dirty: bool,
    pub render_packet: Option<RenderPacket>,
    pub local_state: LocalState,
}

impl RuntimeInstance {
    /// Creates a fresh instance for `vnode`, marked dirty (first mount is
    /// always visually new).
    pub fn mount(id: InstanceId, vnode: VNodeRef) -> Self {
        Self {
            id,
            vnode,
            children: Vec::new(),
            self_dirty: true,
            dirty: true,
            render_packet: None,
            local_state: LocalState::default(),
        }
    }

    /// Recomputes `dirty` as `self_dirty OR any(child.dirty)`.
    pub fn propagate_dirty(&mut self) {
        self.dirty = self.self_dirty || self.children.iter().any(|c| c.dirty);
    }

    /// Clears both dirty bits for this instance only (not recursive); used
    /// after a frame has been fully rendered.
    pub fn clear_dirty_shallow(&mut self) {
        self.self_dirty = false;
        self.dirty = false;
    }

    /// Invalidates the cached render packet, e.g. because `self_dirty` was
    /// set this commit.
    pub fn invalidate_packet(&mut self) {
        self.render_packet = None;
    }

    /// Counts this instance and its descendants.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(RuntimeInstance::subtree_size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::text;
    use std::rc::Rc;

    #[test]
    fn test_sequential_allocator_increments() {
        let mut alloc = SequentialIdAllocator::default();
        assert_eq!(alloc.next_id(), 0);
        assert_eq!(alloc.next_id(), 1);
        assert_eq!(alloc.next_id(), 2);
    }

    #[test]
    fn test_allocator_starting_at() {
        let mut alloc = SequentialIdAllocator::starting_at(10);
        assert_eq!(alloc.next_id(), 10);
    }

    #[test]
    fn test_mount_marks_dirty() {
        let inst = RuntimeInstance::mount(0, Rc::new(text("a")));
        assert!(inst.self_dirty);
        assert!(inst.dirty);
    }

    #[test]
    fn test_propagate_dirty_from_children() {
        let mut parent = RuntimeInstance::mount(0, Rc::new(text("p")));
        parent.self_dirty = false;
        let mut child = RuntimeInstance::mount(1, Rc::new(text("c")));
        child.self_dirty = false;
        child.dirty = true;
        parent.children.push(child);
        parent.propagate_dirty();
        assert!(parent.dirty);
    }

    #[test]
    fn test_clear_dirty_shallow_does_not_recurse() {
        let mut parent = RuntimeInstance::mount(0, Rc::new(text("p")));
        let child = RuntimeInstance::mount(1, Rc::new(text("c")));
        parent.children.push(child);
        parent.clear_dirty_shallow();
        assert!(!parent.dirty);
        assert!(parent.children[0].dirty);
    }

    #[test]
    fn test_subtree_size_counts_descendants() {
        let mut parent = RuntimeInstance::mount(0, Rc::new(text("p")));
        parent.children.push(RuntimeInstance::mount(1, Rc::new(text("c1"))));
        parent.children.push(RuntimeInstance::mount(2, Rc::new(text("c2"))));
        assert_eq!(parent.subtree_size(), 3);
    }
}
