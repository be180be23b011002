//! Measure/layout cache (part of C4): memoizes `measure`/`layout` results
//! keyed on `(vnode_ref, x, y, max_w, max_h, axis)` (§4.4). Bounded by
//! runtime-instance membership rather than one global table — each runtime
//! instance owns its own cache slot via [`LayoutCaches`], keyed on
//! [`InstanceId`], so a removed instance's cache entries disappear with it
//! (§3's cache-bounding rule) once the scheduler evicts the id.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::EngineResult;
use crate::instance::InstanceId;
use crate::vnode::VNodeRef;

use super::{Axis, LayoutNode, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    vnode_ptr: usize,
    x: i32,
    y: i32,
    max_w: u16,
    max_h: u16,
    axis: Axis,
}

impl CacheKey {
    fn new(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, axis: Axis) -> Self {
        Self {
            vnode_ptr: Rc::as_ptr(vnode) as usize,
            x,
            y,
            max_w,
            max_h,
            axis,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot<T> {
    key: Option<CacheKey>,
    result: Option<EngineResult<T>>,
}

impl<T: Clone> Slot<T> {
    fn get_or_compute(
        &mut self,
        key: CacheKey,
        compute: impl FnOnce() -> EngineResult<T>,
    ) -> EngineResult<T> {
        if self.key == Some(key) {
            if let Some(cached) = &self.result {
                return cached.clone();
            }
        }
        let result = compute();
        self.key = Some(key);
        self.result = Some(result.clone());
        result
    }
}

/// Per-instance measure and layout memoization, indexed by [`InstanceId`].
#[derive(Debug, Default)]
pub struct LayoutCaches {
    measure: HashMap<InstanceId, Slot<Size>>,
    layout: HashMap<InstanceId, Slot<LayoutNode>>,
}

impl LayoutCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up (or computes and stores) the measure result for `instance`
    /// under the given constraints.
    pub fn measure(
        &mut self,
        instance: InstanceId,
        vnode: &VNodeRef,
        x: i32,
        y: i32,
        max_w: u16,
        max_h: u16,
        axis: Axis,
        compute: impl FnOnce() -> EngineResult<Size>,
    ) -> EngineResult<Size> {
        let key = CacheKey::new(vnode, x, y, max_w, max_h, axis);
        self.measure.entry(instance).or_default().get_or_compute(key, compute)
    }

    /// Looks up (or computes and stores) the layout tree for `instance`
    /// under the given constraints.
    pub fn layout(
        &mut self,
        instance: InstanceId,
        vnode: &VNodeRef,
        x: i32,
        y: i32,
        max_w: u16,
        max_h: u16,
        axis: Axis,
        compute: impl FnOnce() -> EngineResult<LayoutNode>,
    ) -> EngineResult<LayoutNode> {
        let key = CacheKey::new(vnode, x, y, max_w, max_h, axis);
        self.layout.entry(instance).or_default().get_or_compute(key, compute)
    }

    /// Drops every cache slot for `instance`, e.g. because `self_dirty` was
    /// set this commit and the cached entry can no longer be trusted.
    pub fn invalidate(&mut self, instance: InstanceId) {
        self.measure.remove(&instance);
        self.layout.remove(&instance);
    }

    /// Frees the cache slots of instances removed from the runtime tree.
    pub fn evict_removed(&mut self, removed: &[InstanceId]) {
        for id in removed {
            self.invalidate(*id);
        }
    }

    /// Number of live measure-cache entries, for tests/diagnostics.
    pub fn measure_len(&self) -> usize {
        self.measure.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::text;
    use std::cell::Cell;

    #[test]
    fn test_cache_hit_skips_recompute() {
        let mut caches = LayoutCaches::new();
        let vnode: VNodeRef = Rc::new(text("hi"));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(Size::new(2, 1))
        };
        caches.measure(0, &vnode, 0, 0, 10, 10, Axis::Horizontal, compute).unwrap();
        caches.measure(0, &vnode, 0, 0, 10, 10, Axis::Horizontal, || {
            calls.set(calls.get() + 1);
            Ok(Size::new(2, 1))
        }).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_changed_constraints_miss() {
        let mut caches = LayoutCaches::new();
        let vnode: VNodeRef = Rc::new(text("hi"));
        caches.measure(0, &vnode, 0, 0, 10, 10, Axis::Horizontal, || Ok(Size::new(2, 1))).unwrap();
        let calls = Cell::new(0);
        caches.measure(0, &vnode, 0, 0, 20, 10, Axis::Horizontal, || {
            calls.set(calls.get() + 1);
            Ok(Size::new(2, 1))
        }).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_evict_removed_clears_slot() {
        let mut caches = LayoutCaches::new();
        let vnode: VNodeRef = Rc::new(text("hi"));
        caches.measure(0, &vnode, 0, 0, 10, 10, Axis::Horizontal, || Ok(Size::new(2, 1))).unwrap();
        assert_eq!(caches.measure_len(), 1);
        caches.evict_removed(&[0]);
        assert_eq!(caches.measure_len(), 0);
    }
}
