//! Damage tracking (C7): decides whether a frame can be rendered
//! incrementally and, if so, which instances and screen rects changed
//! (§4.7).

use std::collections::{HashMap, HashSet};

use crate::bounds::Rect;
use crate::commit::propagate_dirty_tree;
use crate::config::EngineConfig;
use crate::instance::{InstanceId, RuntimeInstance};
use crate::layout::LayoutNode;
use crate::vnode::VNodeKind;

/// The outcome of a damage computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Damage {
    /// Incremental rendering is disabled this frame; redraw everything.
    Full,
    /// Incremental rendering is possible: the listed rects cover every
    /// changed or removed instance.
    Partial {
        rects: Vec<Rect>,
        changed: Vec<InstanceId>,
        removed: Vec<InstanceId>,
    },
}

/// Conditions outside the dirty-bit walk that force a full redraw
/// regardless of what changed (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageConditions {
    pub forced_relayout: bool,
    pub has_position_or_exit_transition: bool,
    pub viewport_changed: bool,
    pub theme_changed: bool,
    pub has_overlay: bool,
}

/// Computes damage for the transition from `prev` to `next`. `next` is
/// mutated in place to apply the layout-driven and transient dirty sets
/// before the identity diff runs, matching commit's own dirty propagation.
pub fn compute_damage(
    prev: Option<(&RuntimeInstance, &LayoutNode)>,
    next: &mut RuntimeInstance,
    next_layout: &LayoutNode,
    viewport: Rect,
    focus_before: Option<InstanceId>,
    focus_after: Option<InstanceId>,
    conditions: DamageConditions,
    cfg: &EngineConfig,
) -> Damage {
    let Some((prev_root, prev_layout)) = prev else {
        return Damage::Full;
    };
    if conditions.forced_relayout
        || conditions.has_position_or_exit_transition
        || conditions.viewport_changed
        || conditions.theme_changed
        || conditions.has_overlay
    {
        return Damage::Full;
    }

    let mut prev_rects = HashMap::new();
    collect_rects(prev_root, prev_layout, &mut prev_rects);
    let mut prev_ids = HashSet::new();
    collect_ids(prev_root, &mut prev_ids);

    mark_layout_driven_dirty(next, next_layout, &prev_rects);
    mark_transient_dirty(next, focus_before, focus_after);
    propagate_dirty_tree(next);

    let mut next_ids = HashSet::new();
    collect_ids(next, &mut next_ids);
    let removed: Vec<InstanceId> = prev_ids.difference(&next_ids).copied().collect();

    let mut changed_pairs = Vec::new();
    collect_damage_granular(next, next_layout, false, &mut changed_pairs);

    let mut rects = Vec::new();
    let mut changed_ids = Vec::with_capacity(changed_pairs.len());
    for (id, rect) in changed_pairs {
        changed_ids.push(id);
        let covering = match prev_rects.get(&id) {
            Some(prev_rect) => rect.union(prev_rect),
            None => rect,
        };
        rects.push(covering.clip_to(&viewport));
    }
    for id in &removed {
        if let Some(prev_rect) = prev_rects.get(id) {
            rects.push(prev_rect.clip_to(&viewport));
        }
    }

    let merged: Vec<Rect> = merge_overlapping_or_touching(rects)
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();
    let total_area: u64 = merged.iter().map(Rect::area).sum();
    let viewport_area = viewport.area().max(1);
    if total_area as f64 > viewport_area as f64 * cfg.damage_abandon_threshold as f64 {
        return Damage::Full;
    }

    Damage::Partial {
        rects: merged,
        changed: changed_ids,
        removed,
    }
}

fn collect_rects(instance: &RuntimeInstance, layout: &LayoutNode, out: &mut HashMap<InstanceId, Rect>) {
    out.insert(instance.id, layout.rect);
    for (child, child_layout) in instance.children.iter().zip(&layout.children) {
        collect_rects(child, child_layout, out);
    }
}

fn collect_ids(instance: &RuntimeInstance, out: &mut HashSet<InstanceId>) {
    out.insert(instance.id);
    for child in &instance.children {
        collect_ids(child, out);
    }
}

/// Marks any instance whose rect differs from its previous frame's rect as
/// `self_dirty`, before the identity diff walk (§4.7 "layout-driven dirty set").
fn mark_layout_driven_dirty(instance: &mut RuntimeInstance, layout: &LayoutNode, prev_rects: &HashMap<InstanceId, Rect>) {
    if let Some(prev_rect) = prev_rects.get(&instance.id) {
        if *prev_rect != layout.rect {
            instance.self_dirty = true;
        }
    }
    for (child, child_layout) in instance.children.iter_mut().zip(&layout.children) {
        mark_layout_driven_dirty(child, child_layout, prev_rects);
    }
}

/// Marks focus-transition endpoints and every spinner as dirty on every
/// frame (§4.7 "transient dirty set").
fn mark_transient_dirty(instance: &mut RuntimeInstance, focus_before: Option<InstanceId>, focus_after: Option<InstanceId>) {
    if Some(instance.id) == focus_before || Some(instance.id) == focus_after {
        instance.self_dirty = true;
    }
    if matches!(instance.vnode.kind, VNodeKind::Spinner(_)) {
        instance.self_dirty = true;
    }
    for child in &mut instance.children {
        mark_transient_dirty(child, focus_before, focus_after);
    }
}

/// Walks the tree, descending only into subtrees whose `dirty` bit is set.
/// Structural containers never contribute their own rect (their change
/// propagates to children); damage is collected at leaf/widget granularity.
/// Once a node's `self_dirty` is set, `force` carries through to every
/// descendant so the whole subtree counts as damaged.
fn collect_damage_granular(instance: &RuntimeInstance, layout: &LayoutNode, force: bool, out: &mut Vec<(InstanceId, Rect)>) {
    if !instance.dirty && !force {
        return;
    }
    let subtree_forced = force || instance.self_dirty;
    if !instance.vnode.kind.is_structural() {
        out.push((instance.id, layout.rect));
        return;
    }
    for (child, child_layout) in instance.children.iter().zip(&layout.children) {
        collect_damage_granular(child, child_layout, subtree_forced, out);
    }
}

/// Iteratively merges any two rects that overlap or touch until no more
/// merges apply (§4.7).
fn merge_overlapping_or_touching(mut rects: Vec<Rect>) -> Vec<Rect> {
    loop {
        let mut merged_any = false;
        'outer: for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if rects[i].intersects(&rects[j]) || rects[i].touches(&rects[j]) {
                    let union = rects[i].union(&rects[j]);
                    rects.remove(j);
                    rects[i] = union;
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            return rects;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::SequentialIdAllocator;
    use crate::layout::LayoutMeta;
    use crate::vnode::{row, spinner, text};
    use std::rc::Rc;

    fn leaf(rect: Rect) -> LayoutNode {
        LayoutNode {
            rect,
            meta: LayoutMeta::default(),
            children: Vec::new(),
        }
    }

    fn mount_simple() -> (RuntimeInstance, LayoutNode) {
        let mut alloc = SequentialIdAllocator::default();
        let root_vnode = Rc::new(row(vec![text("a"), text("b")]));
        let mut root = RuntimeInstance::mount(alloc.next_id(), root_vnode.clone());
        root.children.push(RuntimeInstance::mount(alloc.next_id(), root_vnode.children[0].clone()));
        root.children.push(RuntimeInstance::mount(alloc.next_id(), root_vnode.children[1].clone()));
        let layout = LayoutNode {
            rect: Rect::new(0, 0, 10, 1),
            meta: LayoutMeta::default(),
            children: vec![leaf(Rect::new(0, 0, 5, 1)), leaf(Rect::new(5, 0, 5, 1))],
        };
        (root, layout)
    }

    #[test]
    fn test_no_prior_frame_forces_full() {
        let (mut root, layout) = mount_simple();
        let damage = compute_damage(
            None,
            &mut root,
            &layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        assert_eq!(damage, Damage::Full);
    }

    #[test]
    fn test_overlay_present_forces_full() {
        let (prev, prev_layout) = mount_simple();
        let (mut next, next_layout) = mount_simple();
        let conditions = DamageConditions {
            has_overlay: true,
            ..Default::default()
        };
        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            conditions,
            &EngineConfig::default(),
        );
        assert_eq!(damage, Damage::Full);
    }

    #[test]
    fn test_unchanged_tree_yields_no_damage() {
        let (prev, prev_layout) = mount_simple();
        let (mut next, next_layout) = mount_simple();
        next.self_dirty = false;
        next.dirty = false;
        next.children[0].self_dirty = false;
        next.children[0].dirty = false;
        next.children[1].self_dirty = false;
        next.children[1].dirty = false;

        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        match damage {
            Damage::Partial { rects, changed, removed } => {
                assert!(rects.is_empty());
                assert!(changed.is_empty());
                assert!(removed.is_empty());
            }
            Damage::Full => panic!("expected partial damage"),
        }
    }

    #[test]
    fn test_spinner_is_always_transiently_dirty() {
        let mut alloc = SequentialIdAllocator::default();
        let prev_vnode = Rc::new(spinner());
        let prev = RuntimeInstance::mount(alloc.next_id(), prev_vnode);
        let prev_layout = leaf(Rect::new(0, 0, 1, 1));

        let mut alloc2 = SequentialIdAllocator::default();
        let next_vnode = Rc::new(spinner());
        let mut next = RuntimeInstance::mount(alloc2.next_id(), next_vnode);
        next.self_dirty = false;
        next.dirty = false;
        let next_layout = leaf(Rect::new(0, 0, 1, 1));

        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        match damage {
            Damage::Partial { changed, .. } => assert_eq!(changed, vec![0]),
            Damage::Full => panic!("expected partial damage"),
        }
    }

    #[test]
    fn test_large_damage_area_abandons_to_full() {
        let (prev, prev_layout) = mount_simple();
        let (mut next, next_layout) = mount_simple();
        // self_dirty left set from mount(): whole subtree counts as damaged,
        // which at 10x1 cells in an 8x1 viewport exceeds the 45% threshold.
        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 8, 1),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        assert_eq!(damage, Damage::Full);
    }

    #[test]
    fn test_removed_instance_contributes_its_old_rect() {
        let (prev, prev_layout) = mount_simple();
        let mut alloc = SequentialIdAllocator::default();
        let vnode = Rc::new(text("a"));
        let mut next = RuntimeInstance::mount(alloc.next_id(), vnode);
        next.self_dirty = false;
        next.dirty = false;
        let next_layout = leaf(Rect::new(0, 0, 5, 1));

        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        match damage {
            Damage::Partial { removed, .. } => {
                assert!(removed.contains(&1));
                assert!(removed.contains(&2));
            }
            Damage::Full => panic!("expected partial damage"),
        }
    }

    #[test]
    fn test_removed_instance_off_viewport_yields_no_empty_rects() {
        let mut alloc = SequentialIdAllocator::default();
        let root_vnode = Rc::new(row(vec![text("a"), text("b")]));
        let mut prev = RuntimeInstance::mount(alloc.next_id(), root_vnode.clone());
        prev.children.push(RuntimeInstance::mount(alloc.next_id(), root_vnode.children[0].clone()));
        prev.children.push(RuntimeInstance::mount(alloc.next_id(), root_vnode.children[1].clone()));
        let prev_layout = LayoutNode {
            rect: Rect::new(0, 0, 10, 1),
            meta: LayoutMeta::default(),
            // Second child's rect sits entirely outside the viewport below
            // (a scrolled-off / virtualized row).
            children: vec![leaf(Rect::new(0, 0, 5, 1)), leaf(Rect::new(0, 100, 5, 1))],
        };

        let vnode = Rc::new(text("a"));
        let mut next = RuntimeInstance::mount(alloc.next_id(), vnode);
        next.self_dirty = false;
        next.dirty = false;
        let next_layout = leaf(Rect::new(0, 0, 5, 1));

        let damage = compute_damage(
            Some((&prev, &prev_layout)),
            &mut next,
            &next_layout,
            Rect::new(0, 0, 80, 24),
            None,
            None,
            DamageConditions::default(),
            &EngineConfig::default(),
        );
        match damage {
            Damage::Partial { rects, .. } => {
                assert!(rects.iter().all(|r| !r.is_empty()), "empty rect leaked into damage: {rects:?}");
            }
            Damage::Full => panic!("expected partial damage"),
        }
    }
}
