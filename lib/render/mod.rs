//! The render pipeline (C8): walks a committed runtime tree against its
//! layout tree, emitting drawlist ops into a [`DrawlistBuilder`] for
//! non-structural instances via a cached [`packet::RenderPacket`], and
//! directly for structural containers and their chrome (§4.8).

pub mod packet;
pub mod scrollbar;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::bounds::Rect;
use crate::config::EngineConfig;
use crate::drawlist::{Blitter, DrawlistBuilder, ImageFormat, ImageProtocol};
use crate::instance::{InstanceId, RuntimeInstance};
use crate::layout::LayoutNode;
use crate::style::{
    BorderEdges, Color, Spacing, Style, StyleRecord, TextAlign, TextAttrs, TextWrap, WidthPolicy,
};
use crate::text::{cluster_width, measure_str};
use crate::vnode::{Orientation, VNodeKind};

use packet::{replay_ops, PacketRecorder};

/// Per-frame inputs held constant across the whole walk (§4.8 render
/// contract: `viewport, theme, focus_state, pressed_id, tick`).
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub viewport: Rect,
    pub focused_id: Option<InstanceId>,
    pub pressed_id: Option<InstanceId>,
    pub tick_ms: u64,
    pub cfg: &'a EngineConfig,
}

/// Renders `root`'s full subtree into `builder`, clipped to `ctx.viewport`.
/// `root`/`layout` must be the parallel runtime-instance/layout trees
/// produced for the same frame.
pub fn render(root: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    render_node(root, layout, ctx, builder);
}

/// Renders only the subtrees named by `ids`, each clipped to `ctx.viewport`
/// (the partial-redraw path driven by a [`crate::damage::Damage::Partial`]
/// result). Instances outside the named set are left untouched.
pub fn render_partial(
    root: &mut RuntimeInstance,
    layout: &LayoutNode,
    ids: &[InstanceId],
    ctx: &RenderContext,
    builder: &mut DrawlistBuilder,
) {
    render_partial_node(root, layout, ids, ctx, builder);
}

fn render_partial_node(
    instance: &mut RuntimeInstance,
    layout: &LayoutNode,
    ids: &[InstanceId],
    ctx: &RenderContext,
    builder: &mut DrawlistBuilder,
) {
    if ids.contains(&instance.id) {
        render_node(instance, layout, ctx, builder);
        return;
    }
    for (child, child_layout) in instance.children.iter_mut().zip(&layout.children) {
        render_partial_node(child, child_layout, ids, ctx, builder);
    }
}

fn render_node(instance: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    if !layout.rect.intersects(&ctx.viewport) {
        return;
    }
    match &instance.vnode.kind {
        VNodeKind::Row(_)
        | VNodeKind::Column(_)
        | VNodeKind::Grid(_)
        | VNodeKind::Layer(_)
        | VNodeKind::VirtualList(_)
        | VNodeKind::FocusZone(_)
        | VNodeKind::ErrorBoundary(_) => render_children(instance, layout, ctx, builder),
        VNodeKind::Layers(_) => render_layers(instance, layout, ctx, builder),
        VNodeKind::BoxNode(_) => render_box(instance, layout, ctx, builder),
        _ => render_leaf(instance, layout, ctx, builder),
    }
}

fn render_children(instance: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    for (child, child_layout) in instance.children.iter_mut().zip(&layout.children) {
        render_node(child, child_layout, ctx, builder);
    }
}

/// Layered overlays paint lowest `z_index` first so later/higher layers
/// cover earlier ones, the mirror image of [`crate::hittest`]'s reverse walk.
fn render_layers(instance: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    let mut order: Vec<usize> = (0..instance.children.len()).collect();
    order.sort_by_key(|&i| match &instance.children[i].vnode.kind {
        VNodeKind::Layer(p) => p.z_index,
        _ => 0,
    });
    for i in order {
        if let (Some(child), Some(child_layout)) = (instance.children.get_mut(i), layout.children.get(i)) {
            render_node(child, child_layout, ctx, builder);
        }
    }
}

/// The style a node renders with this frame: its own style, overlaid with
/// `focus_style` (falling back to [`Style::default_focus`]) when focused and
/// focusable (§4.8 "focus indicators... ring color from theme when not
/// overridden").
fn effective_style(instance: &RuntimeInstance, focused: bool) -> Style {
    let base = instance.vnode.style.clone();
    if focused && instance.vnode.focusable {
        let overlay = instance.vnode.focus_style.clone().or_else(|| Some(Style::default_focus()));
        Style::merge(base, overlay).unwrap_or_default()
    } else {
        base.unwrap_or_default()
    }
}

fn focus_ring_color(style: &Style) -> Color {
    style.border.as_ref().map(|b| b.color).unwrap_or(Color::Yellow)
}

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

fn render_box(instance: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    let rect = layout.rect;
    let focused = Some(instance.id) == ctx.focused_id;
    let style = effective_style(instance, focused);
    let props = match &instance.vnode.kind {
        VNodeKind::BoxNode(p) => p.clone(),
        _ => unreachable!("render_box only dispatched for BoxNode"),
    };

    if props.shadow {
        draw_shadow(rect, builder);
    }
    if let Some(bg) = style.background {
        let mut rec = StyleRecord::default();
        rec.bg = bg.encode();
        builder.fill_rect(rect.x, rect.y, rect.w, rect.h, Some(rec));
    }
    if let Some(border) = &style.border {
        if border.enabled {
            draw_border(rect, border, props.title.as_deref(), ctx.cfg, builder);
        }
    }

    let (bt, br, bb, bl) = border_inset(&style);
    let pad = style.padding.unwrap_or(Spacing { top: 0, right: 0, bottom: 0, left: 0 });
    let inner_x = rect.x + bl as i32 + pad.left as i32;
    let inner_y = rect.y + bt as i32 + pad.top as i32;
    let inner_w = rect.w.saturating_sub(bl + br + pad.left + pad.right);
    let inner_h = rect.h.saturating_sub(bt + bb + pad.top + pad.bottom);

    if layout.meta.clips_children {
        builder.push_clip(inner_x, inner_y, inner_w, inner_h);
    }
    render_children(instance, layout, ctx, builder);
    if layout.meta.clips_children {
        builder.pop_clip();
    }

    if matches!(style.overflow, Some(crate::style::Overflow::Auto) | Some(crate::style::Overflow::Scroll)) {
        draw_vertical_scrollbar(rect, inner_x, inner_y, inner_h, instance, builder);
    }
}

fn draw_vertical_scrollbar(
    outer: Rect,
    inner_x: i32,
    inner_y: i32,
    inner_h: u16,
    instance: &RuntimeInstance,
    builder: &mut DrawlistBuilder,
) {
    let Some(plan) = scrollbar::plan(inner_h, instance.local_state.content_height, instance.local_state.scroll_y) else {
        return;
    };
    let col = outer.x + outer.w as i32 - 1;
    for (row, (glyph, style)) in scrollbar::vertical_glyphs(&plan).into_iter().enumerate() {
        builder.draw_text(col, inner_y + row as i32, &glyph.to_string(), Some(style));
    }
}

fn draw_shadow(rect: Rect, builder: &mut DrawlistBuilder) {
    let mut rec = StyleRecord::default();
    rec.bg = Color::Black.encode();
    if rect.w > 0 {
        builder.fill_rect(rect.x + 1, rect.y + rect.h as i32, rect.w, 1, Some(rec));
    }
    if rect.h > 0 {
        builder.fill_rect(rect.x + rect.w as i32, rect.y + 1, 1, rect.h, Some(rec));
    }
}

fn draw_border(rect: Rect, border: &crate::style::Border, title: Option<&str>, cfg: &EngineConfig, builder: &mut DrawlistBuilder) {
    let Some(glyphs) = border.style.glyphs() else {
        return;
    };
    if rect.w == 0 || rect.h == 0 {
        return;
    }
    let mut rec = StyleRecord::default();
    rec.fg = border.color.encode();
    let edges = border.edges;

    if edges.contains(BorderEdges::TOP) {
        let avail = rect
            .w
            .saturating_sub(edges.contains(BorderEdges::TOP_LEFT) as u16 + edges.contains(BorderEdges::TOP_RIGHT) as u16);
        let mut line = String::new();
        if edges.contains(BorderEdges::TOP_LEFT) {
            line.push(glyphs.top_left);
        }
        match title.map(|t| truncate_middle(t, avail, cfg.width_policy)).filter(|t| !t.is_empty()) {
            Some(t) => {
                let fill = avail.saturating_sub(measure_str(&t, cfg.width_policy) as u16);
                let left = fill / 2;
                let right = fill - left;
                line.push_str(&glyphs.horizontal.to_string().repeat(left as usize));
                line.push_str(&t);
                line.push_str(&glyphs.horizontal.to_string().repeat(right as usize));
            }
            None => line.push_str(&glyphs.horizontal.to_string().repeat(avail as usize)),
        }
        if edges.contains(BorderEdges::TOP_RIGHT) {
            line.push(glyphs.top_right);
        }
        builder.draw_text(rect.x, rect.y, &line, Some(rec));
    }

    if edges.contains(BorderEdges::BOTTOM) && rect.h > 1 {
        let avail = rect
            .w
            .saturating_sub(edges.contains(BorderEdges::BOTTOM_LEFT) as u16 + edges.contains(BorderEdges::BOTTOM_RIGHT) as u16);
        let mut line = String::new();
        if edges.contains(BorderEdges::BOTTOM_LEFT) {
            line.push(glyphs.bottom_left);
        }
        line.push_str(&glyphs.horizontal.to_string().repeat(avail as usize));
        if edges.contains(BorderEdges::BOTTOM_RIGHT) {
            line.push(glyphs.bottom_right);
        }
        builder.draw_text(rect.x, rect.y + rect.h as i32 - 1, &line, Some(rec));
    }

    if edges.contains(BorderEdges::LEFT) {
        for row in 1..rect.h.saturating_sub(1) {
            builder.draw_text(rect.x, rect.y + row as i32, &glyphs.vertical.to_string(), Some(rec));
        }
    }
    if edges.contains(BorderEdges::RIGHT) && rect.w > 1 {
        for row in 1..rect.h.saturating_sub(1) {
            builder.draw_text(rect.x + rect.w as i32 - 1, rect.y + row as i32, &glyphs.vertical.to_string(), Some(rec));
        }
    }
}

/// Truncates `text` to fit `avail` cells with a middle ellipsis when it
/// doesn't (§4.4 "title truncates with middle ellipsis... available top
/// border cells minus corners").
fn truncate_middle(text: &str, avail: u16, policy: WidthPolicy) -> String {
    if avail == 0 {
        return String::new();
    }
    if measure_str(text, policy) <= avail as u32 {
        return text.to_string();
    }
    if avail == 1 {
        return "…".to_string();
    }
    let keep = avail - 1;
    let left = keep / 2;
    let right = keep - left;
    let chars: Vec<char> = text.chars().collect();
    let left_part: String = chars.iter().take(left as usize).collect();
    let right_part: String = chars.iter().rev().take(right as usize).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{left_part}…{right_part}")
}

/// Content key for a non-structural instance's render packet: §4.8's
/// `hash(kind, text, props_visual_fields, theme, base_style, rect_w,
/// rect_h, focus_bits, tick_if_animated)`. Position is deliberately
/// excluded — packets are recorded in node-local coordinates and replayed
/// with a translated origin, so a pure move never invalidates the cache
/// (§8 invariant 6).
fn content_key(instance: &RuntimeInstance, rect: Rect, ctx: &RenderContext) -> u64 {
    let mut hasher = DefaultHasher::new();
    format!("{:?}", instance.vnode.kind).hash(&mut hasher);
    format!("{:?}", instance.vnode.style).hash(&mut hasher);
    format!("{:?}", instance.vnode.focus_style).hash(&mut hasher);
    rect.w.hash(&mut hasher);
    rect.h.hash(&mut hasher);
    (Some(instance.id) == ctx.focused_id).hash(&mut hasher);
    (Some(instance.id) == ctx.pressed_id).hash(&mut hasher);
    if is_animated(instance) {
        ctx.tick_ms.hash(&mut hasher);
    }
    hasher.finish()
}

fn is_animated(instance: &RuntimeInstance) -> bool {
    instance.local_state.transition.is_some() || matches!(instance.vnode.kind, VNodeKind::Spinner(_))
}

/// True for a focused text input: per §9's design note its cursor makes it
/// uncacheable, so it is always freshly recorded and never stored.
fn is_cursor_held(instance: &RuntimeInstance, ctx: &RenderContext) -> bool {
    matches!(instance.vnode.kind, VNodeKind::Input(_)) && Some(instance.id) == ctx.focused_id
}

fn render_leaf(instance: &mut RuntimeInstance, layout: &LayoutNode, ctx: &RenderContext, builder: &mut DrawlistBuilder) {
    let rect = layout.rect;
    if rect.is_empty() {
        return;
    }

    if matches!(instance.vnode.kind, VNodeKind::Image(_) | VNodeKind::Canvas(_)) {
        instance.render_packet = None;
        render_media(instance, rect, builder);
        return;
    }

    if is_cursor_held(instance, ctx) {
        instance.render_packet = None;
        let mut rec = PacketRecorder::new();
        record_leaf(instance, rect, ctx, &mut rec);
        replay_ops(rec.ops(), rect.x, rect.y, builder);
        let focused_input_x = cursor_x_for_input(instance);
        builder.set_cursor(rect.x + focused_input_x, rect.y, crate::drawlist::CursorShape::Bar, true, true);
        return;
    }

    let key = content_key(instance, rect, ctx);
    if let Some(packet) = &instance.render_packet {
        if packet.key == key {
            packet.replay(rect.x, rect.y, builder);
            return;
        }
    }

    let mut rec = PacketRecorder::new();
    record_leaf(instance, rect, ctx, &mut rec);
    if rec.is_invalid() {
        replay_ops(rec.ops(), rect.x, rect.y, builder);
        instance.render_packet = None;
    } else {
        let packet = rec.finish(key).expect("checked not invalid above");
        packet.replay(rect.x, rect.y, builder);
        instance.render_packet = Some(packet);
    }
}

fn cursor_x_for_input(instance: &RuntimeInstance) -> i32 {
    match &instance.vnode.kind {
        VNodeKind::Input(p) => (measure_str(&p.value[..p.value.len().min(p.cursor as usize)], WidthPolicy::Wide) as i32) + 1,
        _ => 0,
    }
}

fn render_media(instance: &RuntimeInstance, rect: Rect, builder: &mut DrawlistBuilder) {
    match &instance.vnode.kind {
        VNodeKind::Image(p) => match p.blob_ref {
            Some(blob_id) => {
                let format = if p.format.eq_ignore_ascii_case("png") {
                    ImageFormat::Png
                } else {
                    ImageFormat::Rgba8
                };
                builder.draw_image(
                    rect.x,
                    rect.y,
                    rect.w,
                    rect.h,
                    blob_id,
                    format,
                    ImageProtocol::Unicode,
                    0,
                    crate::drawlist::ImageFit::Contain,
                    instance.id,
                    p.px_w.map(|w| w.min(u16::MAX as u32) as u16),
                    p.px_h.map(|h| h.min(u16::MAX as u32) as u16),
                );
            }
            None => {
                let mut rec = StyleRecord::default();
                rec.bg = Color::BrightBlack.encode();
                builder.fill_rect(rect.x, rect.y, rect.w, rect.h, Some(rec));
            }
        },
        VNodeKind::Canvas(p) => match p.blob_ref {
            Some(blob_id) => {
                let blitter = match p.blitter.as_str() {
                    "sextant" => Blitter::Sextant,
                    "braille" => Blitter::Braille,
                    _ => Blitter::Halfblock,
                };
                builder.draw_canvas(
                    rect.x,
                    rect.y,
                    rect.w,
                    rect.h,
                    blob_id,
                    blitter,
                    p.px_w.map(|w| w.min(u16::MAX as u32) as u16),
                    p.px_h.map(|h| h.min(u16::MAX as u32) as u16),
                );
            }
            None => {
                let mut rec = StyleRecord::default();
                rec.bg = Color::Black.encode();
                builder.fill_rect(rect.x, rect.y, rect.w, rect.h, Some(rec));
            }
        },
        _ => {}
    }
}

fn record_leaf(instance: &RuntimeInstance, rect: Rect, ctx: &RenderContext, rec: &mut PacketRecorder) {
    let focused = Some(instance.id) == ctx.focused_id;
    let pressed = Some(instance.id) == ctx.pressed_id;
    let style = effective_style(instance, focused);
    let w = rect.w;
    let h = rect.h;

    if let Some(bg) = style.background {
        let mut bg_rec = StyleRecord::default();
        bg_rec.bg = bg.encode();
        rec.fill_rect(0, 0, w, h, bg_rec);
    }

    let mut focus_rec = StyleRecord::default();
    if focused && instance.vnode.focusable {
        focus_rec.attrs = (TextAttrs::BOLD | TextAttrs::UNDERLINE).bits();
        focus_rec.fg = focus_ring_color(&style).encode();
    }

    match &instance.vnode.kind {
        VNodeKind::Text(p) => {
            let ts = p.text_style.clone().unwrap_or_default();
            let base_rec = StyleRecord::from_text_style(&ts, u32::MAX, u32::MAX);
            let wrap = ts.wrap.unwrap_or(TextWrap::None);
            let align = ts.align.unwrap_or(TextAlign::Left);
            draw_wrapped_text(&p.content, w, h, wrap, align, base_rec, rec, ctx.cfg.width_policy);
        }
        VNodeKind::Button(p) => {
            let mut label = format!("[{}]", p.label);
            if pressed {
                focus_rec.attrs |= TextAttrs::INVERSE.bits();
            }
            if w > 0 {
                label = truncate_middle(&label, w, ctx.cfg.width_policy);
            }
            rec.draw_text(0, 0, label, focus_rec);
        }
        VNodeKind::Input(p) => {
            let shown = if p.value.is_empty() {
                p.placeholder.clone().unwrap_or_default()
            } else {
                p.value.clone()
            };
            rec.draw_text(0, 0, shown, focus_rec);
        }
        VNodeKind::Checkbox(p) => {
            let glyph = if p.checked { '☑' } else { '☐' };
            rec.draw_text(0, 0, format!("{glyph} {}", p.label), focus_rec);
        }
        VNodeKind::Slider(p) => {
            let filled = slider_filled_cells(p, w);
            for x in 0..w {
                let glyph = if x < filled { '█' } else { '─' };
                rec.draw_text(x as i32, 0, glyph.to_string(), focus_rec);
            }
        }
        VNodeKind::Select(p) => {
            let label = p.selected.and_then(|i| p.options.get(i)).map(|o| o.label.as_str()).unwrap_or("");
            rec.draw_text(0, 0, format!("{label} ▾"), focus_rec);
        }
        VNodeKind::Icon(p) => {
            let mut icon_rec = focus_rec;
            if let Some(c) = p.color {
                icon_rec.fg = c.encode();
            }
            rec.draw_text(0, 0, p.glyph.to_string(), icon_rec);
        }
        VNodeKind::Spinner(p) => {
            const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let glyph = FRAMES[(p.frame as usize) % FRAMES.len()];
            rec.draw_text(0, 0, glyph.to_string(), focus_rec);
        }
        VNodeKind::Progress(p) => {
            let ratio = if p.max > 0.0 { (p.value / p.max).clamp(0.0, 1.0) } else { 0.0 };
            let filled = (w as f32 * ratio).round() as u16;
            for x in 0..w {
                let glyph = if x < filled { '█' } else { '░' };
                rec.draw_text(x as i32, 0, glyph.to_string(), focus_rec);
            }
        }
        VNodeKind::BarChart(p) => draw_bar_chart(p, w, h, rec),
        VNodeKind::Table(p) => draw_table(p, w, rec),
        VNodeKind::Tree(p) => draw_tree(p, h, rec),
        VNodeKind::CodeEditor(p) => {
            for (row, line) in p.content.lines().take(h as usize).enumerate() {
                rec.draw_text(0, row as i32, line.to_string(), StyleRecord::default());
            }
        }
        VNodeKind::Spacer(_) => {}
        VNodeKind::Row(_)
        | VNodeKind::Column(_)
        | VNodeKind::BoxNode(_)
        | VNodeKind::Grid(_)
        | VNodeKind::Layers(_)
        | VNodeKind::Layer(_)
        | VNodeKind::VirtualList(_)
        | VNodeKind::FocusZone(_)
        | VNodeKind::ErrorBoundary(_)
        | VNodeKind::Image(_)
        | VNodeKind::Canvas(_) => unreachable!("structural/media kinds never reach record_leaf"),
    }
}

fn slider_filled_cells(p: &crate::vnode::SliderProps, w: u16) -> u16 {
    if p.max <= p.min {
        return 0;
    }
    let ratio = ((p.value - p.min) / (p.max - p.min)).clamp(0.0, 1.0);
    (w as f32 * ratio).round() as u16
}

fn draw_wrapped_text(
    content: &str,
    w: u16,
    h: u16,
    wrap: TextWrap,
    align: TextAlign,
    style: StyleRecord,
    rec: &mut PacketRecorder,
    policy: WidthPolicy,
) {
    let lines = wrap_lines(content, w, wrap, policy);
    for (row, line) in lines.into_iter().take(h as usize).enumerate() {
        let line_w = measure_str(&line, policy) as u16;
        let x = match align {
            TextAlign::Left => 0,
            TextAlign::Center => w.saturating_sub(line_w) / 2,
            TextAlign::Right => w.saturating_sub(line_w),
        };
        rec.draw_text(x as i32, row as i32, line, style);
    }
}

fn wrap_lines(content: &str, w: u16, wrap: TextWrap, policy: WidthPolicy) -> Vec<String> {
    let mut out = Vec::new();
    for logical_line in content.split('\n') {
        match wrap {
            TextWrap::None => out.push(logical_line.to_string()),
            TextWrap::Character => out.extend(wrap_by_char(logical_line, w, policy)),
            TextWrap::Word | TextWrap::WordBreak => out.extend(wrap_by_word(logical_line, w, wrap, policy)),
        }
    }
    out
}

fn wrap_by_char(line: &str, w: u16, policy: WidthPolicy) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_w: u32 = 0;
    for ch in line.chars() {
        let cw = cluster_width(&ch.to_string(), policy) as u32;
        if cur_w + cw > w as u32 && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
            cur_w = 0;
        }
        cur.push(ch);
        cur_w += cw;
    }
    out.push(cur);
    out
}

fn break_long_word(word: &str, w: u16, policy: WidthPolicy) -> (Vec<String>, String) {
    let mut chunks = Vec::new();
    let mut rest = word;
    while measure_str(rest, policy) > w as u32 && w > 0 {
        let mut take = 0;
        let mut acc = 0u32;
        for (i, ch) in rest.char_indices() {
            let cw = cluster_width(&ch.to_string(), policy) as u32;
            if acc + cw > w as u32 {
                break;
            }
            acc += cw;
            take = i + ch.len_utf8();
        }
        if take == 0 {
            break;
        }
        chunks.push(rest[..take].to_string());
        rest = &rest[take..];
    }
    (chunks, rest.to_string())
}

fn wrap_by_word(line: &str, w: u16, wrap: TextWrap, policy: WidthPolicy) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_w: u32 = 0;
    for word in line.split(' ') {
        let word_w = measure_str(word, policy);
        let sep_w: u32 = if cur.is_empty() { 0 } else { 1 };
        if cur_w + sep_w + word_w > w as u32 && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
            cur_w = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
            cur_w += 1;
        }
        if wrap == TextWrap::WordBreak && word_w > w as u32 {
            let (chunks, remainder) = break_long_word(word, w, policy);
            out.extend(chunks);
            cur.push_str(&remainder);
            cur_w += measure_str(&remainder, policy);
        } else {
            cur.push_str(word);
            cur_w += word_w;
        }
    }
    if !cur.is_empty() || out.is_empty() {
        out.push(cur);
    }
    out
}

fn draw_bar_chart(p: &crate::vnode::BarChartProps, w: u16, h: u16, rec: &mut PacketRecorder) {
    if p.data.is_empty() || w == 0 || h == 0 {
        return;
    }
    let max = p.data.iter().cloned().fold(f32::MIN, f32::max).max(1.0);
    match p.orientation {
        Orientation::Vertical => {
            let bar_w = (w / p.data.len().max(1) as u16).max(1);
            for (i, &v) in p.data.iter().enumerate() {
                let bar_h = ((v.max(0.0) / max) * h as f32).round() as u16;
                let x = i as u16 * bar_w;
                if x >= w {
                    break;
                }
                for row in 0..bar_h.min(h) {
                    rec.draw_text((x as i32), (h as i32) - 1 - row as i32, "█".repeat(bar_w.min(w - x) as usize), StyleRecord::default());
                }
            }
        }
        Orientation::Horizontal => {
            for (row, &v) in p.data.iter().enumerate().take(h as usize) {
                let bar_w = ((v.max(0.0) / max) * w as f32).round() as u16;
                rec.draw_text(0, row as i32, "█".repeat(bar_w.min(w) as usize), StyleRecord::default());
            }
        }
    }
}

fn draw_table(p: &crate::vnode::TableProps, w: u16, rec: &mut PacketRecorder) {
    let mut header = String::new();
    for col in &p.columns {
        header.push_str(&pad_cell(&col.header, col.width));
        header.push(' ');
    }
    rec.draw_text(0, 0, truncate_middle(header.trim_end(), w, WidthPolicy::Wide), StyleRecord::default());
    for (row_idx, row) in p.rows.iter().enumerate() {
        let mut line = String::new();
        for (cell, col) in row.iter().zip(&p.columns) {
            line.push_str(&pad_cell(cell, col.width));
            line.push(' ');
        }
        let mut row_rec = StyleRecord::default();
        if p.selected_row == Some(row_idx) {
            row_rec.attrs = TextAttrs::INVERSE.bits();
        }
        rec.draw_text(0, row_idx as i32 + 1, truncate_middle(line.trim_end(), w, WidthPolicy::Wide), row_rec);
    }
}

fn pad_cell(text: &str, width: u16) -> String {
    let w = measure_str(text, WidthPolicy::Wide) as u16;
    if w >= width {
        text.to_string()
    } else {
        format!("{text}{}", " ".repeat((width - w) as usize))
    }
}

fn draw_tree(p: &crate::vnode::TreeProps, h: u16, rec: &mut PacketRecorder) {
    for (row, node) in p.nodes.iter().enumerate().take(h as usize) {
        let marker = if !node.has_children {
            "  "
        } else if node.expanded {
            "▾ "
        } else {
            "▸ "
        };
        let indent = " ".repeat((node.depth as usize) * 2);
        let mut row_rec = StyleRecord::default();
        if p.selected_id.as_deref() == Some(node.id.as_str()) {
            row_rec.attrs = TextAttrs::INVERSE.bits();
        }
        rec.draw_text(0, row as i32, format!("{indent}{marker}{}", node.label), row_rec);
    }
}
