//! Grid container layout (part of C4), implementing §4.4's track-sizing
//! rules: fixed/auto/`fr` tracks, explicit row count capping placement,
//! and front-loaded remainder distribution for `fr` tracks.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::vnode::{GridProps, GridTrack, VNodeKind, VNodeRef};

use super::{apply_style_dims, Axis, LayoutMeta, LayoutNode, Size};
use crate::bounds::Rect;

fn grid_props(vnode: &VNodeRef) -> &GridProps {
    match &vnode.kind {
        VNodeKind::Grid(p) => p,
        _ => unreachable!("grid::layout called on non-grid vnode"),
    }
}

/// Distributes `remainder` among `fr` track weights in track order, one
/// extra unit per track from the front until the remainder is exhausted —
/// the same rule §4.4 specifies for flex remainder distribution.
fn distribute_remainder(remainder: u16, weights: &[f32]) -> Vec<u16> {
    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u16> = weights
        .iter()
        .map(|w| ((remainder as f32) * w / total).floor() as u16)
        .collect();
    let used: u32 = shares.iter().map(|&s| s as u32).sum();
    let mut left = (remainder as u32).saturating_sub(used);
    for share in shares.iter_mut() {
        if left == 0 {
            break;
        }
        *share += 1;
        left -= 1;
    }
    shares
}

/// Resolves one axis's track sizes. `tracks` empty is treated as a single
/// `1fr` track spanning the whole content box. `auto_size(i)` supplies the
/// natural size for an `Auto` track at index `i`.
fn resolve_tracks(tracks: &[GridTrack], total: u16, gap: u16, auto_size: impl Fn(usize) -> u16) -> Vec<u16> {
    let owned;
    let effective: &[GridTrack] = if tracks.is_empty() {
        owned = [GridTrack::Fraction(1.0)];
        &owned
    } else {
        tracks
    };
    let n = effective.len();
    let gaps_total = gap as u32 * (n as u32).saturating_sub(1);
    let content = (total as u32).saturating_sub(gaps_total).min(u16::MAX as u32) as u16;

    let mut sizes = vec![0u16; n];
    let mut used: u32 = 0;
    let mut fr_indices = Vec::new();
    let mut fr_weights = Vec::new();
    for (i, track) in effective.iter().enumerate() {
        match track {
            GridTrack::Fixed(v) => {
                sizes[i] = (*v).min(content);
                used += sizes[i] as u32;
            }
            GridTrack::Auto => {
                sizes[i] = auto_size(i);
                used += sizes[i] as u32;
            }
            GridTrack::Fraction(w) => {
                fr_indices.push(i);
                fr_weights.push(*w);
            }
        }
    }
    if !fr_indices.is_empty() {
        let remainder = (content as u32).saturating_sub(used).min(u16::MAX as u32) as u16;
        let shares = distribute_remainder(remainder, &fr_weights);
        for (idx, share) in fr_indices.into_iter().zip(shares) {
            sizes[idx] = share;
        }
    }
    sizes
}

fn offsets_from_sizes(sizes: &[u16], gap: u16) -> Vec<i32> {
    let mut out = Vec::with_capacity(sizes.len());
    let mut cursor: i32 = 0;
    for &s in sizes {
        out.push(cursor);
        cursor += s as i32 + gap as i32;
    }
    out
}

/// Row-major placement of `children` into a `num_cols`-wide grid, capped to
/// `num_cols * num_rows` cells; extras beyond the cap are dropped per
/// §4.4. The VNode model has no hole representation, so a sparse,
/// pre-compacted child list (holes already skipped) is the producer's
/// responsibility.
fn placed_children(vnode: &VNodeRef, num_cols: usize, num_rows: usize) -> &[VNodeRef] {
    let cap = num_cols.saturating_mul(num_rows);
    &vnode.children[..vnode.children.len().min(cap)]
}

fn num_cols_rows(props: &GridProps, child_count: usize) -> (usize, usize) {
    let num_cols = props.columns.len().max(1);
    let num_rows = if !props.rows.is_empty() {
        props.rows.len()
    } else {
        child_count.div_ceil(num_cols).max(1)
    };
    (num_cols, num_rows)
}

fn compute(vnode: &VNodeRef, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<(Vec<u16>, Vec<u16>, Vec<i32>, Vec<i32>)> {
    let props = grid_props(vnode);
    let (num_cols, num_rows) = num_cols_rows(props, vnode.children.len());
    let placed = placed_children(vnode, num_cols, num_rows);

    // First pass: measure every child at the full content box to derive
    // natural sizes for `Auto` tracks.
    let mut natural = Vec::with_capacity(placed.len());
    for child in placed {
        natural.push(super::measure(child, max_w, max_h, Axis::Vertical, cfg)?);
    }

    let col_auto = |col: usize| -> u16 {
        (0..placed.len())
            .filter(|&i| i % num_cols == col)
            .map(|i| natural[i].w)
            .max()
            .unwrap_or(0)
    };
    let row_auto = |row: usize| -> u16 {
        (0..placed.len())
            .filter(|&i| i / num_cols == row)
            .map(|i| natural[i].h)
            .max()
            .unwrap_or(0)
    };

    let col_widths = resolve_tracks(&props.columns, max_w, props.col_gap, col_auto);
    let row_heights = resolve_tracks(&props.rows, max_h, props.row_gap, row_auto);
    let col_offsets = offsets_from_sizes(&col_widths, props.col_gap);
    let row_offsets = offsets_from_sizes(&row_heights, props.row_gap);
    Ok((col_widths, row_heights, col_offsets, row_offsets))
}

pub fn measure(vnode: &VNodeRef, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<Size> {
    let (col_widths, row_heights, _, _) = compute(vnode, max_w, max_h, cfg)?;
    let gap_w = grid_props(vnode).col_gap as u32 * col_widths.len().saturating_sub(1) as u32;
    let gap_h = grid_props(vnode).row_gap as u32 * row_heights.len().saturating_sub(1) as u32;
    let w = (col_widths.iter().map(|&v| v as u32).sum::<u32>() + gap_w).min(u16::MAX as u32) as u16;
    let h = (row_heights.iter().map(|&v| v as u32).sum::<u32>() + gap_h).min(u16::MAX as u32) as u16;
    Ok(apply_style_dims(vnode.style.as_ref(), Size::new(w, h), max_w, max_h))
}

pub fn layout(vnode: &VNodeRef, x: i32, y: i32, max_w: u16, max_h: u16, cfg: &EngineConfig) -> EngineResult<LayoutNode> {
    let props = grid_props(vnode);
    let (num_cols, num_rows) = num_cols_rows(props, vnode.children.len());
    let placed = placed_children(vnode, num_cols, num_rows);
    let (col_widths, row_heights, col_offsets, row_offsets) = compute(vnode, max_w, max_h, cfg)?;

    let mut children = Vec::with_capacity(placed.len());
    for (i, child) in placed.iter().enumerate() {
        let col = i % num_cols;
        let row = i / num_cols;
        let cx = x + col_offsets[col];
        let cy = y + row_offsets[row];
        children.push(super::layout(child, cx, cy, col_widths[col], row_heights[row], Axis::Vertical, cfg)?);
    }

    let size = measure(vnode, max_w, max_h, cfg)?;
    Ok(LayoutNode {
        rect: Rect::new(x, y, size.w, size.h),
        meta: LayoutMeta::default(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{grid, spacer};
    use std::rc::Rc;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_fr_distribution_matches_spec_example() {
        // §8 S6: columns "1fr 2fr 3fr" in a 24-cell container -> 4, 8, 12.
        let vnode: VNodeRef = Rc::new(grid(
            vec![GridTrack::Fraction(1.0), GridTrack::Fraction(2.0), GridTrack::Fraction(3.0)],
            vec![spacer(0), spacer(0), spacer(0)],
        ));
        let node = layout(&vnode, 0, 0, 24, 10, &cfg()).unwrap();
        let widths: Vec<u16> = node.children.iter().map(|c| c.rect.w).collect();
        assert_eq!(widths, vec![4, 8, 12]);
    }

    #[test]
    fn test_explicit_row_count_caps_placement() {
        let mut n = grid(vec![GridTrack::Fixed(5)], vec![spacer(1), spacer(1), spacer(1), spacer(1)]);
        n.kind = match n.kind {
            VNodeKind::Grid(mut p) => {
                p.rows = vec![GridTrack::Fixed(1)];
                VNodeKind::Grid(p)
            }
            other => other,
        };
        let vnode: VNodeRef = Rc::new(n);
        let node = layout(&vnode, 0, 0, 40, 40, &cfg()).unwrap();
        // 1 column x 1 row = 1 cell; the other three children are dropped.
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn test_fixed_and_fr_tracks_combine() {
        let vnode: VNodeRef = Rc::new(grid(
            vec![GridTrack::Fixed(10), GridTrack::Fraction(1.0)],
            vec![spacer(0), spacer(0)],
        ));
        let node = layout(&vnode, 0, 0, 30, 10, &cfg()).unwrap();
        assert_eq!(node.children[0].rect.w, 10);
        assert_eq!(node.children[1].rect.w, 20);
        assert_eq!(node.children[1].rect.x, 10);
    }
}
