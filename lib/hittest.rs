//! Hit-testing (the other half of C5): maps a point to the topmost
//! focusable runtime instance whose rect contains it (§4.5).

use crate::instance::{InstanceId, RuntimeInstance};
use crate::layout::LayoutNode;
use crate::vnode::VNodeKind;

/// Returns the topmost focusable, non-disabled instance whose rect
/// contains `(x, y)`, or `None`. Rects are half-open on the right and
/// bottom (§4.5, §8 invariant 7): a point on the right/bottom edge is
/// outside the rect, handled by [`crate::bounds::Rect::contains_point`].
///
/// `instance` and `layout` must be the parallel runtime-instance and
/// layout trees produced for the same frame (same shape by construction,
/// since layout is computed from the committed runtime tree's vnodes).
pub fn hit_test(instance: &RuntimeInstance, layout: &LayoutNode, x: i32, y: i32) -> Option<InstanceId> {
    walk(instance, layout, x, y)
}

fn child_paint_order(instance: &RuntimeInstance) -> Vec<usize> {
    let mut order: Vec<usize> = (0..instance.children.len()).collect();
    if matches!(instance.vnode.kind, VNodeKind::Layers(_)) {
        // Layered overlays paint in z_index order; the hit test must probe
        // the same order in reverse (highest z_index first) to find the
        // visually topmost node.
        order.sort_by_key(|&i| match &instance.children[i].vnode.kind {
            VNodeKind::Layer(p) => p.z_index,
            _ => 0,
        });
    }
    order
}

fn walk(instance: &RuntimeInstance, node: &LayoutNode, x: i32, y: i32) -> Option<InstanceId> {
    for &i in child_paint_order(instance).iter().rev() {
        if let (Some(child_inst), Some(child_node)) = (instance.children.get(i), node.children.get(i)) {
            if let Some(id) = walk(child_inst, child_node, x, y) {
                return Some(id);
            }
        }
    }
    if node.rect.contains_point(x, y) && instance.vnode.focusable && !instance.vnode.disabled {
        return Some(instance.id);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Rect;
    use crate::instance::RuntimeInstance;
    use crate::layout::LayoutMeta;
    use crate::vnode::{button, row};
    use std::rc::Rc;

    fn leaf_layout(rect: Rect) -> LayoutNode {
        LayoutNode {
            rect,
            meta: LayoutMeta::default(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_half_open_edges_miss() {
        let btn = RuntimeInstance::mount(1, Rc::new(button("ok")));
        let layout = leaf_layout(Rect::new(0, 0, 4, 3));
        assert_eq!(hit_test(&btn, &layout, 3, 2), Some(1));
        assert_eq!(hit_test(&btn, &layout, 4, 0), None);
        assert_eq!(hit_test(&btn, &layout, 0, 3), None);
    }

    #[test]
    fn test_disabled_widget_not_hit_testable() {
        let mut btn_vnode = button("ok");
        btn_vnode.disabled = true;
        let btn = RuntimeInstance::mount(1, Rc::new(btn_vnode));
        let layout = leaf_layout(Rect::new(0, 0, 4, 3));
        assert_eq!(hit_test(&btn, &layout, 1, 1), None);
    }

    #[test]
    fn test_topmost_child_wins_over_parent() {
        let mut root = RuntimeInstance::mount(0, Rc::new(row(vec![button("a")])));
        root.children.push(RuntimeInstance::mount(1, Rc::new(button("a"))));
        let layout = LayoutNode {
            rect: Rect::new(0, 0, 10, 3),
            meta: LayoutMeta::default(),
            children: vec![leaf_layout(Rect::new(0, 0, 10, 3))],
        };
        assert_eq!(hit_test(&root, &layout, 1, 1), Some(1));
    }

    #[test]
    fn test_non_focusable_container_does_not_match() {
        let root = RuntimeInstance::mount(0, Rc::new(row(vec![])));
        let layout = leaf_layout(Rect::new(0, 0, 10, 3));
        assert_eq!(hit_test(&root, &layout, 1, 1), None);
    }
}
