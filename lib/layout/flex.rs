//! Flex row/column layout (part of C4), implementing §4.4's deterministic
//! wrap, justify, align and flex-remainder rules.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::style::{AlignItems, AlignSelf, Direction, JustifyContent, Style, WrapMode};
use crate::vnode::VNodeRef;

use super::{apply_style_dims, Axis, LayoutMeta, LayoutNode, Size};
use crate::bounds::Rect;

struct ChildPlan {
    size: Size,
    flex: Option<f32>,
    align_self: Option<AlignSelf>,
}

fn main_of(size: Size, direction: Direction) -> u16 {
    match direction {
        Direction::Horizontal => size.w,
        Direction::Vertical => size.h,
    }
}

fn cross_of(size: Size, direction: Direction) -> u16 {
    match direction {
        Direction::Horizontal => size.h,
        Direction::Vertical => size.w,
    }
}

fn make_size(main: u16, cross: u16, direction: Direction) -> Size {
    match direction {
        Direction::Horizontal => Size::new(main, cross),
        Direction::Vertical => Size::new(cross, main),
    }
}

fn effective_wrap(style: Option<&Style>, props_wrap: bool) -> WrapMode {
    style
        .and_then(|s| s.wrap)
        .unwrap_or(if props_wrap { WrapMode::Wrap } else { WrapMode::NoWrap })
}

/// Measures each child against the container's own content box (not a
/// shrinking per-line remainder), per §4.4's percent-resolution rule.
fn measure_children(
    vnode: &VNodeRef,
    direction: Direction,
    container_w: u16,
    container_h: u16,
    cfg: &EngineConfig,
) -> EngineResult<Vec<ChildPlan>> {
    let axis = match direction {
        Direction::Horizontal => Axis::Horizontal,
        Direction::Vertical => Axis::Vertical,
    };
    let mut out = Vec::with_capacity(vnode.children.len());
    for child in &vnode.children {
        let size = super::measure(child, container_w, container_h, axis, cfg)?;
        let flex = child.style.as_ref().and_then(|s| s.flex);
        let align_self = child.style.as_ref().and_then(|s| s.align_self);
        out.push(ChildPlan { size, flex, align_self });
    }
    Ok(out)
}

struct Line {
    items: Vec<usize>,
    main: u16,
    cross: u16,
}

/// Groups children into wrapped lines by cumulative main-axis size, without
/// yet applying flex-remainder distribution or justify/align offsets.
fn build_lines(plans: &[ChildPlan], direction: Direction, gap: u16, wrap: WrapMode, main_limit: u16) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_main: u32 = 0;

    for (i, plan) in plans.iter().enumerate() {
        let item_main = main_of(plan.size, direction) as u32;
        let gap_before = if current.is_empty() { 0 } else { gap as u32 };
        let would_be = current_main + gap_before + item_main;
        if wrap != WrapMode::NoWrap && !current.is_empty() && would_be > main_limit as u32 {
            lines.push(finish_line(&current, plans, direction, gap));
            current = Vec::new();
            current_main = 0;
        }
        let gap_before = if current.is_empty() { 0 } else { gap as u32 };
        current_main += gap_before + item_main;
        current.push(i);
    }
    if !current.is_empty() || plans.is_empty() {
        lines.push(finish_line(&current, plans, direction, gap));
    }
    if wrap == WrapMode::WrapReverse {
        lines.reverse();
    }
    lines
}

fn finish_line(indices: &[usize], plans: &[ChildPlan], direction: Direction, gap: u16) -> Line {
    let main: u32 = indices
        .iter()
        .map(|&i| main_of(plans[i].size, direction) as u32)
        .sum::<u32>()
        + gap as u32 * indices.len().saturating_sub(1) as u32;
    let cross = indices.iter().map(|&i| cross_of(plans[i].size, direction)).max().unwrap_or(0);
    Line {
        items: indices.to_vec(),
        main: main.min(u16::MAX as u32) as u16,
        cross,
    }
}

/// Distributes `available` main-axis units among `weights` in source order,
/// one extra unit per item from the front until the integer-division
/// remainder is exhausted (§4.4 "flex remainder").
fn distribute_flex(available: u16, weights: &[f32]) -> Vec<u16> {
    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u16> = weights
        .iter()
        .map(|w| ((available as f32) * w / total).floor() as u16)
        .collect();
    let used: u32 = shares.iter().map(|&s| s as u32).sum();
    let mut remainder = (available as u32).saturating_sub(used);
    for share in shares.iter_mut() {
        if remainder == 0 {
            break;
        }
        *share += 1;
        remainder -= 1;
    }
    shares
}

/// Leading offset and extra per-gap spacing for a justify mode, given
/// leftover main-axis space after packing a line's items.
fn justify_offsets(justify: JustifyContent, leftover: i32, item_count: usize) -> (i32, i32) {
    let leftover = leftover.max(0);
    if item_count == 0 {
        return (0, 0);
    }
    match justify {
        JustifyContent::Start => (0, 0),
        JustifyContent::Center => (leftover / 2, 0),
        JustifyContent::End => (leftover, 0),
        JustifyContent::SpaceBetween => {
            if item_count > 1 {
                (0, leftover / (item_count as i32 - 1))
            } else {
                (0, 0)
            }
        }
        JustifyContent::SpaceAround => {
            let extra = leftover / item_count as i32;
            (extra / 2, extra)
        }
        JustifyContent::SpaceEvenly => {
            let extra = leftover / (item_count as i32 + 1);
            (extra, extra)
        }
    }
}

fn natural_size(vnode: &VNodeRef, direction: Direction, gap: u16, wrap: WrapMode, container_w: u16, container_h: u16, cfg: &EngineConfig) -> EngineResult<Size> {
    let plans = measure_children(vnode, direction, container_w, container_h, cfg)?;
    let main_limit = match direction {
        Direction::Horizontal => container_w,
        Direction::Vertical => container_h,
    };
    let lines = build_lines(&plans, direction, gap, wrap, main_limit);
    if wrap == WrapMode::NoWrap {
        let main = lines.first().map(|l| l.main).unwrap_or(0);
        let cross = lines.first().map(|l| l.cross).unwrap_or(0);
        return Ok(make_size(main, cross, direction));
    }
    let main = lines.iter().map(|l| l.main).max().unwrap_or(0);
    let cross_total: u32 = lines.iter().map(|l| l.cross as u32).sum::<u32>() + gap as u32 * lines.len().saturating_sub(1) as u32;
    Ok(make_size(main, cross_total.min(u16::MAX as u32) as u16, direction))
}

pub fn measure(vnode: &VNodeRef, direction: Direction, gap: u16, wrap: bool, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<Size> {
    let wrap_mode = effective_wrap(vnode.style.as_ref(), wrap);
    let natural = natural_size(vnode, direction, gap, wrap_mode, max_w, max_h, cfg)?;
    Ok(apply_style_dims(vnode.style.as_ref(), natural, max_w, max_h))
}

pub fn layout(
    vnode: &VNodeRef,
    direction: Direction,
    gap: u16,
    wrap: bool,
    x: i32,
    y: i32,
    max_w: u16,
    max_h: u16,
    cfg: &EngineConfig,
) -> EngineResult<LayoutNode> {
    let wrap_mode = effective_wrap(vnode.style.as_ref(), wrap);
    let outer = measure(vnode, direction, gap, wrap, max_w, max_h, cfg)?;
    let (content_w, content_h) = (outer.w, outer.h);
    let plans = measure_children(vnode, direction, content_w, content_h, cfg)?;
    let main_limit = match direction {
        Direction::Horizontal => content_w,
        Direction::Vertical => content_h,
    };
    let mut lines = build_lines(&plans, direction, gap, wrap_mode, main_limit);

    let justify = vnode.style.as_ref().and_then(|s| s.justify_content).unwrap_or_default();
    let container_align = vnode.style.as_ref().and_then(|s| s.align_items).unwrap_or_default();

    // Apply flex-remainder distribution per line, in place.
    let mut final_mains: Vec<u16> = plans.iter().map(|p| main_of(p.size, direction)).collect();
    for line in &mut lines {
        let weighted: Vec<(usize, f32)> = line
            .items
            .iter()
            .filter_map(|&i| plans[i].flex.map(|w| (i, w)))
            .collect();
        if weighted.is_empty() {
            continue;
        }
        let fixed_main: u32 = line
            .items
            .iter()
            .filter(|&&i| plans[i].flex.is_none())
            .map(|&i| final_mains[i] as u32)
            .sum();
        let gaps: u32 = gap as u32 * line.items.len().saturating_sub(1) as u32;
        let available = (main_limit as u32).saturating_sub(fixed_main + gaps).min(u16::MAX as u32) as u16;
        let weights: Vec<f32> = weighted.iter().map(|&(_, w)| w).collect();
        let shares = distribute_flex(available, &weights);
        for ((i, _), share) in weighted.iter().zip(shares) {
            final_mains[*i] = share;
        }
        line.main = main_limit;
    }

    let mut children = vec![LayoutNode::leaf(Rect::new(0, 0, 0, 0)); plans.len()];
    let mut cross_cursor: i32 = 0;
    for line in &lines {
        let has_flex = line.items.iter().any(|&i| plans[i].flex.is_some());
        let leftover = if has_flex { 0 } else { main_limit as i32 - line.main as i32 };
        let (lead, extra_gap) = justify_offsets(justify, leftover, line.items.len());
        let mut main_cursor = lead;
        for (pos, &i) in line.items.iter().enumerate() {
            let item_main = final_mains[i];
            let align = plans[i].align_self.filter(|a| *a != AlignSelf::Auto).map(align_self_to_items).unwrap_or(container_align);
            let item_cross = if align == AlignItems::Stretch { line.cross } else { cross_of(plans[i].size, direction) };
            let cross_offset = match align {
                AlignItems::Start | AlignItems::Stretch => 0,
                AlignItems::Center => (line.cross as i32 - item_cross as i32) / 2,
                AlignItems::End => line.cross as i32 - item_cross as i32,
            };
            let size = make_size(item_main, item_cross, direction);
            let (rx, ry) = match direction {
                Direction::Horizontal => (x + main_cursor, y + cross_cursor + cross_offset),
                Direction::Vertical => (x + cross_cursor + cross_offset, y + main_cursor),
            };
            let child_node = super::layout(
                &vnode.children[i],
                rx,
                ry,
                size.w,
                size.h,
                match direction {
                    Direction::Horizontal => Axis::Horizontal,
                    Direction::Vertical => Axis::Vertical,
                },
                cfg,
            )?;
            children[i] = child_node;
            main_cursor += item_main as i32 + gap as i32;
            if pos + 1 < line.items.len() {
                main_cursor += extra_gap;
            }
        }
        cross_cursor += line.cross as i32 + gap as i32;
    }

    Ok(LayoutNode {
        rect: Rect::new(x, y, content_w, content_h),
        meta: LayoutMeta::default(),
        children,
    })
}

fn align_self_to_items(a: AlignSelf) -> AlignItems {
    match a {
        AlignSelf::Auto | AlignSelf::Start => AlignItems::Start,
        AlignSelf::Center => AlignItems::Center,
        AlignSelf::End => AlignItems::End,
        AlignSelf::Stretch => AlignItems::Stretch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{row, spacer, text};
    use crate::style::Style;
    use std::rc::Rc;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_flex_remainder_distributed_from_front() {
        // Two equal-weight flex items splitting an odd remainder: the
        // first item in source order gets the extra unit.
        let shares = distribute_flex(5, &[1.0, 1.0]);
        assert_eq!(shares, vec![3, 2]);
    }

    #[test]
    fn test_row_packs_children_left_to_right() {
        let vnode: VNodeRef = Rc::new(row(vec![spacer(3), spacer(4)]));
        let node = layout(&vnode, Direction::Horizontal, 1, false, 0, 0, 80, 24, &cfg()).unwrap();
        assert_eq!(node.children[0].rect.x, 0);
        assert_eq!(node.children[1].rect.x, 4);
    }

    #[test]
    fn test_justify_center_offsets_single_line() {
        let mut n = row(vec![spacer(10)]);
        n.style = Some(Style::default());
        n.style.as_mut().unwrap().justify_content = Some(JustifyContent::Center);
        n.style.as_mut().unwrap().width = Some(crate::style::Dimension::Fixed(40));
        let vnode: VNodeRef = Rc::new(n);
        let node = layout(&vnode, Direction::Horizontal, 0, false, 0, 0, 80, 24, &cfg()).unwrap();
        assert_eq!(node.children[0].rect.x, 15);
    }

    #[test]
    fn test_text_children_wrap_when_overflowing() {
        let vnode: VNodeRef = Rc::new(row(vec![spacer(10), spacer(10), spacer(10)]).child(spacer(0)).clone());
        let _ = vnode;
        let wrapping: VNodeRef = {
            let mut n = crate::vnode::row(vec![spacer(10), spacer(10), spacer(10)]);
            n.kind = match n.kind {
                crate::vnode::VNodeKind::Row(mut p) => {
                    p.wrap = true;
                    crate::vnode::VNodeKind::Row(p)
                }
                other => other,
            };
            Rc::new(n)
        };
        let node = layout(&wrapping, Direction::Horizontal, 0, true, 0, 0, 15, 24, &cfg()).unwrap();
        // 15-wide container, three 10-wide items: first line holds one
        // item, remaining items wrap onto further lines.
        assert_ne!(node.children[0].rect.y, node.children[1].rect.y);
    }
}
