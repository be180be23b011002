//! The layout engine (C4): pure measure/layout over a [`VNode`] tree, with
//! a companion memoizing cache (`cache.rs`) keyed on vnode identity plus
//! the constraints passed in. Flex containers live in `flex.rs`, grid
//! containers in `grid.rs`; this module dispatches by [`VNodeKind`] and
//! handles the leaf/box/overlay cases directly.

pub mod cache;
pub mod flex;
pub mod grid;

use crate::bounds::Rect;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::style::{BorderEdges, Dimension, Style};
use crate::text::measure_str;
use crate::vnode::{Orientation, VNodeKind, VNodeRef};

/// The main axis a container lays its children along. Threaded through
/// `measure`/`layout` calls per §4.4's `layout(vnode, x, y, max_w, max_h,
/// axis)` contract so a child can be measured width-for-height or
/// height-for-width depending on its parent's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Natural (unconstrained) size of a subtree, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub w: u16,
    pub h: u16,
}

impl Size {
    pub fn new(w: u16, h: u16) -> Self {
        Self { w, h }
    }
}

/// Per-node metadata attached to a [`LayoutNode`] beyond its rect: overflow
/// metrics for scroll containers (§3 "Layout tree").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutMeta {
    /// Total content extent along the scroll axis, used to compute the
    /// scrollbar thumb size/position and clamp scroll offsets.
    pub content_height: u32,
    pub content_width: u32,
    /// Whether this node clips its children (border/padding box with
    /// `Overflow::Hidden | Scroll | Auto`).
    pub clips_children: bool,
}

/// One node of the layout tree: a frame-local rect plus metadata, mirroring
/// the shape of the vnode (and therefore runtime instance) tree it was
/// computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub rect: Rect,
    pub meta: LayoutMeta,
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    pub fn leaf(rect: Rect) -> Self {
        Self {
            rect,
            meta: LayoutMeta::default(),
            children: Vec::new(),
        }
    }
}

/// Resolves a `width`/`height`-like [`Dimension`] against the space the
/// parent offered, the child's own natural size, and explicit min/max caps.
/// Mirrors the resolution order the renderer always applies: explicit
/// fixed/percent/content/auto, then clamp to `[min, max]` and to `max_avail`.
pub fn resolve_dimension(
    dim: Option<Dimension>,
    intrinsic: u16,
    max_avail: u16,
    parent_content: u16,
    min: Option<u16>,
    max: Option<u16>,
) -> u16 {
    let resolved = match dim {
        Some(Dimension::Fixed(v)) => v,
        Some(Dimension::Percentage(pct)) => ((parent_content as f32) * pct).round() as u16,
        Some(Dimension::Content) | None => intrinsic,
        Some(Dimension::Auto) => max_avail,
    };
    let mut out = resolved.min(max_avail);
    if let Some(lo) = min {
        out = out.max(lo);
    }
    if let Some(hi) = max {
        out = out.min(hi);
    }
    out
}

/// Cells consumed by a box's border on each edge (top, right, bottom, left),
/// 0 if disabled or the edge is not rendered (§4.4 "box border subtracts one
/// cell per present side").
fn border_inset(style: &Style) -> (u16, u16, u16, u16) {
    match &style.border {
        Some(b) if b.enabled => (
            b.edges.contains(BorderEdges::TOP) as u16,
            b.edges.contains(BorderEdges::RIGHT) as u16,
            b.edges.contains(BorderEdges::BOTTOM) as u16,
            b.edges.contains(BorderEdges::LEFT) as u16,
        ),
        _ => (0, 0, 0, 0),
    }
}

fn padding_inset(style: &Style) -> (u16, u16, u16, u16) {
    match style.padding {
        Some(p) => (p.top, p.right, p.bottom, p.left),
        None => (0, 0, 0, 0),
    }
}

/// Natural size of a leaf kind with no style applied, used as the `Content`
/// dimension fallback and as the basis for fixed-size clamping.
fn intrinsic_leaf_size(kind: &VNodeKind, max_w: u16, policy: crate::config::WidthPolicy) -> Size {
    match kind {
        VNodeKind::Text(p) => {
            let w = measure_str(&p.content, policy).min(max_w as u32) as u16;
            let lines = p.content.lines().count().max(1) as u16;
            Size::new(w, lines)
        }
        VNodeKind::Button(p) => Size::new((measure_str(&p.label, policy) as u16).saturating_add(2), 1),
        VNodeKind::Input(p) => {
            let content_w = measure_str(
                if p.value.is_empty() {
                    p.placeholder.as_deref().unwrap_or("")
                } else {
                    &p.value
                },
                policy,
            ) as u16;
            Size::new(content_w.saturating_add(2).max(10), 1)
        }
        VNodeKind::Checkbox(p) => Size::new((measure_str(&p.label, policy) as u16).saturating_add(4), 1),
        VNodeKind::Slider(_) => Size::new(20, 1),
        VNodeKind::Select(p) => {
            let w = p
                .options
                .iter()
                .map(|o| measure_str(&o.label, policy) as u16)
                .max()
                .unwrap_or(0);
            Size::new(w.saturating_add(4), 1)
        }
        VNodeKind::Icon(_) => Size::new(1, 1),
        VNodeKind::Spinner(_) => Size::new(1, 1),
        VNodeKind::Progress(_) => Size::new(20, 1),
        VNodeKind::Image(p) => Size::new(
            p.px_w.map(|w| ((w / 2).max(1)).min(u16::MAX as u32) as u16).unwrap_or(20),
            p.px_h.map(|h| ((h / 4).max(1)).min(u16::MAX as u32) as u16).unwrap_or(10),
        ),
        VNodeKind::Canvas(p) => Size::new(
            p.px_w.map(|w| ((w / 2).max(1)).min(u16::MAX as u32) as u16).unwrap_or(20),
            p.px_h.map(|h| ((h / 4).max(1)).min(u16::MAX as u32) as u16).unwrap_or(10),
        ),
        VNodeKind::BarChart(p) => {
            // §8 S5: empty data still yields a non-negative size.
            match p.orientation {
                Orientation::Vertical => Size::new((p.data.len() as u16).saturating_mul(3), 10),
                Orientation::Horizontal => Size::new(20, p.data.len() as u16),
            }
        }
        VNodeKind::Table(p) => {
            let w: u16 = p.columns.iter().map(|c| c.width).sum();
            Size::new(w, (p.rows.len() as u16).saturating_add(1))
        }
        VNodeKind::Tree(p) => {
            let w = p
                .nodes
                .iter()
                .map(|n| (measure_str(&n.label, policy) as u16).saturating_add(n.depth * 2))
                .max()
                .unwrap_or(0);
            Size::new(w, p.nodes.len() as u16)
        }
        VNodeKind::CodeEditor(p) => {
            let lines: Vec<&str> = p.content.lines().collect();
            let w = lines.iter().map(|l| measure_str(l, policy) as u16).max().unwrap_or(0);
            Size::new(w, lines.len().max(1) as u16)
        }
        VNodeKind::Spacer(p) => Size::new(p.size, p.size),
        _ => Size::new(0, 0),
    }
}

fn apply_style_dims(style: Option<&Style>, intrinsic: Size, max_w: u16, max_h: u16) -> Size {
    let Some(style) = style else {
        return Size::new(intrinsic.w.min(max_w), intrinsic.h.min(max_h));
    };
    let w = resolve_dimension(style.width, intrinsic.w, max_w, max_w, style.min_width, style.max_width);
    let h = resolve_dimension(style.height, intrinsic.h, max_h, max_h, style.min_height, style.max_height);
    Size::new(w, h)
}

/// Measures `vnode`'s natural size within `max_w x max_h`, pure in its
/// arguments (§4.4 contract).
pub fn measure(vnode: &VNodeRef, max_w: u16, max_h: u16, axis: Axis, cfg: &EngineConfig) -> EngineResult<Size> {
    vnode.validate()?;
    match &vnode.kind {
        VNodeKind::Row(p) => flex::measure(vnode, crate::style::Direction::Horizontal, p.gap, p.wrap, max_w, max_h, cfg),
        VNodeKind::Column(p) => flex::measure(vnode, crate::style::Direction::Vertical, p.gap, p.wrap, max_w, max_h, cfg),
        VNodeKind::BoxNode(_) => measure_box(vnode, max_w, max_h, cfg),
        VNodeKind::Grid(_) => grid::measure(vnode, max_w, max_h, cfg),
        VNodeKind::Layers(_) | VNodeKind::Layer(_) | VNodeKind::FocusZone(_) | VNodeKind::ErrorBoundary(_) => {
            measure_passthrough(vnode, max_w, max_h, axis, cfg)
        }
        VNodeKind::VirtualList(p) => Ok(Size::new(max_w, (p.item_count as u16).saturating_mul(p.item_height).min(max_h))),
        other => {
            let intrinsic = intrinsic_leaf_size(other, max_w, cfg.width_policy);
            Ok(apply_style_dims(vnode.style.as_ref(), intrinsic, max_w, max_h))
        }
    }
}

fn measure_passthrough(vnode: &VNodeRef, max_w: u16, max_h: u16, axis: Axis, cfg: &EngineConfig) -> EngineResult<Size> {
    let Some(child) = vnode.children.first() else {
        return Ok(Size::new(0, 0));
    };
    measure(child, max_w, max_h, axis, cfg)
}

fn measure_box(vnode: &VNodeRef, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<Size> {
    let style = vnode.style.clone().unwrap_or_default();
    let (bt, br, bb, bl) = border_inset(&style);
    let (pt, pr, pb, pl) = padding_inset(&style);
    let inset_w = (bl + br + pl + pr).min(max_w);
    let inset_h = (bt + bb + pt + pb).min(max_h);
    let inner_w = max_w.saturating_sub(inset_w);
    let inner_h = max_h.saturating_sub(inset_h);

    let content = if let Some(child) = vnode.children.first() {
        measure(child, inner_w, inner_h, Axis::Vertical, cfg)?
    } else {
        Size::new(0, 0)
    };

    let natural = Size::new(content.w.saturating_add(inset_w), content.h.saturating_add(inset_h));
    Ok(apply_style_dims(vnode.style.as_ref(), natural, max_w, max_h))
}

/// Lays out `vnode` at `(x, y)` within `max_w x max_h`, producing a layout
/// tree shaped like the vnode tree (§4.4 contract, §3 "Layout tree").
pub fn layout(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, axis: Axis, cfg: &EngineConfig) -> EngineResult<LayoutNode> {
    vnode.validate()?;
    match &vnode.kind {
        VNodeKind::Row(p) => flex::layout(vnode, crate::style::Direction::Horizontal, p.gap, p.wrap, x, y, max_w, max_h, cfg),
        VNodeKind::Column(p) => flex::layout(vnode, crate::style::Direction::Vertical, p.gap, p.wrap, x, y, max_w, max_h, cfg),
        VNodeKind::BoxNode(_) => layout_box(vnode, x, y, max_w, max_h, cfg),
        VNodeKind::Grid(_) => grid::layout(vnode, x, y, max_w, max_h, cfg),
        VNodeKind::Layers(_) => layout_layers(vnode, x, y, max_w, max_h, cfg),
        VNodeKind::Layer(_) | VNodeKind::FocusZone(_) | VNodeKind::ErrorBoundary(_) => {
            layout_passthrough(vnode, x, y, max_w, max_h, axis, cfg)
        }
        VNodeKind::VirtualList(p) => {
            let h = (p.item_count as u16).saturating_mul(p.item_height).min(max_h);
            let mut node = LayoutNode::leaf(Rect::new(x, y, max_w, h));
            node.meta.content_height = p.item_count * p.item_height as u32;
            node.meta.clips_children = true;
            Ok(node)
        }
        other => {
            let size = apply_style_dims(vnode.style.as_ref(), intrinsic_leaf_size(other, max_w, cfg.width_policy), max_w, max_h);
            Ok(LayoutNode::leaf(Rect::new(x, y, size.w, size.h)))
        }
    }
}

fn layout_passthrough(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, axis: Axis, cfg: &EngineConfig) -> EngineResult<LayoutNode> {
    let Some(child) = vnode.children.first() else {
        return Ok(LayoutNode::leaf(Rect::new(x, y, 0, 0)));
    };
    let child_node = layout(child, x, y, max_w, max_h, axis, cfg)?;
    let rect = child_node.rect;
    Ok(LayoutNode {
        rect,
        meta: LayoutMeta::default(),
        children: vec![child_node],
    })
}

/// Layers/overlays: every child occupies the full allotted rect; z-ordering
/// is resolved by the renderer walking children in source order (later
/// `layer` children paint over earlier ones unless `z_index` says
/// otherwise), not by the layout pass.
fn layout_layers(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<LayoutNode> {
    let mut children = Vec::with_capacity(vnode.children.len());
    for child in &vnode.children {
        children.push(layout(child, x, y, max_w, max_h, Axis::Vertical, cfg)?);
    }
    Ok(LayoutNode {
        rect: Rect::new(x, y, max_w, max_h),
        meta: LayoutMeta::default(),
        children,
    })
}

fn layout_box(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<LayoutNode> {
    let style = vnode.style.clone().unwrap_or_default();
    let outer = apply_style_dims(vnode.style.as_ref(), measure_box(vnode, max_w, max_h, cfg)?, max_w, max_h);
    let (bt, br, bb, bl) = border_inset(&style);
    let (pt, pr, pb, pl) = padding_inset(&style);
    let inset_w = bl + br + pl + pr;
    let inset_h = bt + bb + pt + pb;
    let inner_x = x + bl as i32 + pl as i32;
    let inner_y = y + bt as i32 + pt as i32;
    let inner_w = outer.w.saturating_sub(inset_w);
    let inner_h = outer.h.saturating_sub(inset_h);

    let mut children = Vec::new();
    if let Some(child) = vnode.children.first() {
        children.push(layout(child, inner_x, inner_y, inner_w, inner_h, Axis::Vertical, cfg)?);
    }

    let clips = matches!(
        style.overflow,
        Some(crate::style::Overflow::Hidden) | Some(crate::style::Overflow::Scroll) | Some(crate::style::Overflow::Auto)
    );
    let content_height = children.first().map(|c| c.rect.h as u32).unwrap_or(0);
    let content_width = children.first().map(|c| c.rect.w as u32).unwrap_or(0);

    Ok(LayoutNode {
        rect: Rect::new(x, y, outer.w, outer.h),
        meta: LayoutMeta {
            content_height,
            content_width,
            clips_children: clips,
        },
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{bar_chart, text, Orientation};
    use std::rc::Rc;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_text_measure_clamped_to_max_width() {
        let vnode: VNodeRef = Rc::new(text("hello world"));
        let size = measure(&vnode, 5, 10, Axis::Horizontal, &cfg()).unwrap();
        assert_eq!(size.w, 5);
    }

    #[test]
    fn test_barchart_empty_data_nonnegative_size() {
        let vnode: VNodeRef = Rc::new(bar_chart(vec![], Orientation::Vertical));
        let size = measure(&vnode, 80, 24, Axis::Horizontal, &cfg()).unwrap();
        assert_eq!(size.w, 0);
        assert!(size.h > 0);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let vnode: VNodeRef = Rc::new(text("hi"));
        let a = layout(&vnode, 1, 2, 80, 24, Axis::Horizontal, &cfg()).unwrap();
        let b = layout(&vnode, 1, 2, 80, 24, Axis::Horizontal, &cfg()).unwrap();
        assert_eq!(a, b);
    }
}
