//! The virtual-node model (C3): immutable values returned by the view
//! function. `VNode` carries a closed `kind` tag (as the discriminant of
//! [`VNodeKind`]) plus a props record whose shape is tied to that kind, an
//! optional children list and, for text-like kinds, a string payload.
//!
//! VNodes are produced fresh each frame and are cheap to compare by
//! reference: children are stored as `Rc<VNode>` so the commit stage (C6)
//! can use `Rc::ptr_eq` as an equality fast path without walking the tree.

use std::rc::Rc;

use crate::error::{EngineError, EngineResult};
use crate::style::{Color, Style, TextStyle};

/// Reference-counted handle to a VNode, used for children so commit can
/// short-circuit on reference identity.
pub type VNodeRef = Rc<VNode>;

/// Grid track sizing mode (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTrack {
    /// A fixed number of cells.
    Fixed(u16),
    /// Sized to the largest child's natural size.
    Auto,
    /// A weighted share of the remainder, e.g. `2fr`.
    Fraction(f32),
}

/// Bar orientation for [`VNodeKind::BarChart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

/// A selectable option for [`VNodeKind::Select`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    /// Value identifying the option.
    pub value: String,
    /// Rendered label.
    pub label: String,
}

/// A single named column for [`VNodeKind::Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// Column header text.
    pub header: String,
    /// Column width, in cells.
    pub width: u16,
}

/// A node in the tree widget for [`VNodeKind::Tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Unique id within the tree, used for focus/expand state.
    pub id: String,
    /// Rendered label.
    pub label: String,
    /// Nesting depth, for indentation.
    pub depth: u16,
    /// Whether the node is currently expanded.
    pub expanded: bool,
    /// Whether the node has children (even if collapsed).
    pub has_children: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowProps {
    pub gap: u16,
    pub wrap: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnProps {
    pub gap: u16,
    pub wrap: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoxProps {
    pub title: Option<String>,
    pub shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridProps {
    pub columns: Vec<GridTrack>,
    pub rows: Vec<GridTrack>,
    pub col_gap: u16,
    pub row_gap: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayersProps {}

/// A single `Ctrl+X`-style shortcut an overlay advertises while visible
/// (§4.10 precedence rule 2, "shortcut table registered by currently-visible
/// overlays"). Compared structurally by chord only; handler identity never
/// participates in diffing, mirroring [`EventCallbacks`]'s `PartialEq`.
#[derive(Clone)]
pub struct ShortcutBinding {
    pub chord: crate::key::KeyWithModifiers,
    pub handler: Rc<dyn Fn()>,
}

impl std::fmt::Debug for ShortcutBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortcutBinding").field("chord", &self.chord).finish()
    }
}

impl PartialEq for ShortcutBinding {
    fn eq(&self, other: &Self) -> bool {
        self.chord == other.chord
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerProps {
    pub z_index: i32,
    /// True for a modal/dropdown/command-palette layer: while visible it
    /// intercepts keyboard routing ahead of app bindings and forces a full
    /// redraw (§4.10 rule 1, §4.7 `has_overlay`).
    pub is_overlay: bool,
    /// Fired when `Esc` is routed to this overlay (§4.10 rule 1, "Esc closes").
    pub on_escape: Option<Rc<dyn Fn()>>,
    /// Shortcuts this overlay advertises while it is the topmost overlay.
    pub shortcuts: Vec<ShortcutBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpacerProps {
    pub size: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualListProps {
    pub item_count: u32,
    pub item_height: u16,
    pub scroll_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FocusZoneProps {}

/// Catches panics raised while building its subtree (§4.6, §8 S3). `build`
/// is invoked to produce the guarded child each commit; if it panics (or
/// the boundary is currently latched from a prior panic), `fallback` is
/// invoked instead with the caught message and a `retry()` closure that
/// clears the latch on the next commit.
#[derive(Clone)]
pub struct ErrorBoundaryProps {
    /// Identifies this boundary's isolated retry/error state; boundaries
    /// with distinct ids never share retry counters (§4.6 unmount rules).
    pub boundary_id: String,
    pub build: Rc<dyn Fn() -> VNode>,
    pub fallback: Rc<dyn Fn(&str, Rc<dyn Fn()>) -> VNode>,
}

impl std::fmt::Debug for ErrorBoundaryProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorBoundaryProps")
            .field("boundary_id", &self.boundary_id)
            .finish()
    }
}

impl PartialEq for ErrorBoundaryProps {
    fn eq(&self, other: &Self) -> bool {
        self.boundary_id == other.boundary_id
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextProps {
    pub content: String,
    pub text_style: Option<TextStyle>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ButtonProps {
    pub label: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputProps {
    pub value: String,
    pub cursor: u32,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckboxProps {
    pub checked: bool,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliderProps {
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for SliderProps {
    fn default() -> Self {
        Self {
            value: 0.0,
            min: 0.0,
            max: 1.0,
            step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectProps {
    pub options: Vec<SelectOption>,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IconProps {
    pub glyph: char,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpinnerProps {
    /// Animation frame index; the renderer advances this every tick.
    pub frame: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressProps {
    pub value: f32,
    pub max: f32,
}

impl Default for ProgressProps {
    fn default() -> Self {
        Self {
            value: 0.0,
            max: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageProps {
    pub blob_ref: Option<u32>,
    pub format: String,
    pub px_w: Option<u32>,
    pub px_h: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanvasProps {
    pub blob_ref: Option<u32>,
    pub blitter: String,
    pub px_w: Option<u32>,
    pub px_h: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarChartProps {
    pub data: Vec<f32>,
    pub labels: Vec<String>,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableProps {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Vec<String>>,
    pub selected_row: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeProps {
    pub nodes: Vec<TreeNode>,
    pub selected_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeEditorProps {
    pub content: String,
    pub language: Option<String>,
    pub cursor_line: u32,
    pub cursor_col: u32,
}

/// The closed set of widget kinds. Structural kinds carry their children in
/// `VNode::children`; leaf kinds ignore it.
#[derive(Debug, Clone, PartialEq)]
pub enum VNodeKind {
    // Structural
    Row(RowProps),
    Column(ColumnProps),
    BoxNode(BoxProps),
    Grid(GridProps),
    Layers(LayersProps),
    Layer(LayerProps),
    Spacer(SpacerProps),
    VirtualList(VirtualListProps),
    FocusZone(FocusZoneProps),
    ErrorBoundary(ErrorBoundaryProps),
    // Leaf
    Text(TextProps),
    Button(ButtonProps),
    Input(InputProps),
    Checkbox(CheckboxProps),
    Slider(SliderProps),
    Select(SelectProps),
    Icon(IconProps),
    Spinner(SpinnerProps),
    Progress(ProgressProps),
    Image(ImageProps),
    Canvas(CanvasProps),
    BarChart(BarChartProps),
    Table(TableProps),
    Tree(TreeProps),
    CodeEditor(CodeEditorProps),
}

impl VNodeKind {
    /// True for kinds that lay out `children`; false for leaves.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VNodeKind::Row(_)
                | VNodeKind::Column(_)
                | VNodeKind::BoxNode(_)
                | VNodeKind::Grid(_)
                | VNodeKind::Layers(_)
                | VNodeKind::Layer(_)
                | VNodeKind::VirtualList(_)
                | VNodeKind::FocusZone(_)
                | VNodeKind::ErrorBoundary(_)
        )
    }

    /// Short name used in diagnostics and as the default key salt.
    pub fn name(&self) -> &'static str {
        match self {
            VNodeKind::Row(_) => "row",
            VNodeKind::Column(_) => "column",
            VNodeKind::BoxNode(_) => "box",
            VNodeKind::Grid(_) => "grid",
            VNodeKind::Layers(_) => "layers",
            VNodeKind::Layer(_) => "layer",
            VNodeKind::Spacer(_) => "spacer",
            VNodeKind::VirtualList(_) => "virtualList",
            VNodeKind::FocusZone(_) => "focusZone",
            VNodeKind::ErrorBoundary(_) => "errorBoundary",
            VNodeKind::Text(_) => "text",
            VNodeKind::Button(_) => "button",
            VNodeKind::Input(_) => "input",
            VNodeKind::Checkbox(_) => "checkbox",
            VNodeKind::Slider(_) => "slider",
            VNodeKind::Select(_) => "select",
            VNodeKind::Icon(_) => "icon",
            VNodeKind::Spinner(_) => "spinner",
            VNodeKind::Progress(_) => "progress",
            VNodeKind::Image(_) => "image",
            VNodeKind::Canvas(_) => "canvas",
            VNodeKind::BarChart(_) => "barChart",
            VNodeKind::Table(_) => "table",
            VNodeKind::Tree(_) => "tree",
            VNodeKind::CodeEditor(_) => "codeEditor",
        }
    }
}

/// Event callback slots, mirroring the focused-widget routing targets in
/// §4.10. Stored behind `Rc` so VNodes stay cheap to rebuild every frame
/// even though the closures capture application state.
#[derive(Clone, Default)]
pub struct EventCallbacks {
    pub on_click: Option<Rc<dyn Fn()>>,
    pub on_focus: Option<Rc<dyn Fn()>>,
    pub on_blur: Option<Rc<dyn Fn()>>,
    pub on_key: Option<Rc<dyn Fn(crate::key::KeyWithModifiers)>>,
    pub on_char: Option<Rc<dyn Fn(char)>>,
    /// Cleanup hook run once when the owning instance is unmounted (§4.6
    /// unmount semantics: "on_unmount/effect-cleanup callbacks run once").
    pub on_unmount: Option<Rc<dyn Fn()>>,
}

impl std::fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("on_click", &self.on_click.is_some())
            .field("on_focus", &self.on_focus.is_some())
            .field("on_blur", &self.on_blur.is_some())
            .field("on_key", &self.on_key.is_some())
            .field("on_char", &self.on_char.is_some())
            .field("on_unmount", &self.on_unmount.is_some())
            .finish()
    }
}

impl PartialEq for EventCallbacks {
    /// Callback identity does not participate in diffing: only presence
    /// matters (a node gaining/losing a handler is a routing-relevant
    /// change per §4.6 step 5), not which closure instance is installed.
    fn eq(&self, other: &Self) -> bool {
        self.on_click.is_some() == other.on_click.is_some()
            && self.on_focus.is_some() == other.on_focus.is_some()
            && self.on_blur.is_some() == other.on_blur.is_some()
            && self.on_key.is_some() == other.on_key.is_some()
            && self.on_char.is_some() == other.on_char.is_some()
            && self.on_unmount.is_some() == other.on_unmount.is_some()
    }
}

/// An immutable widget description returned by the view function.
#[derive(Debug, Clone, PartialEq)]
pub struct VNode {
    pub kind: VNodeKind,
    /// Children, meaningful only when `kind.is_structural()`.
    pub children: Vec<VNodeRef>,
    /// Explicit identity override for the commit diff (§4.6 step 4).
    pub key: Option<String>,
    pub style: Option<Style>,
    pub focus_style: Option<Style>,
    pub hover_style: Option<Style>,
    pub focusable: bool,
    pub disabled: bool,
    pub events: EventCallbacks,
}

impl VNode {
    /// Builds a bare node of the given kind with no children or styling.
    pub fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            key: None,
            style: None,
            focus_style: None,
            hover_style: None,
            focusable: false,
            disabled: false,
            events: EventCallbacks::default(),
        }
    }

    pub fn with_children(mut self, children: Vec<VNode>) -> Self {
        self.children = children.into_iter().map(Rc::new).collect();
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        self.children.push(Rc::new(child));
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn focus_style(mut self, style: Style) -> Self {
        self.focus_style = Some(style);
        self
    }

    pub fn hover_style(mut self, style: Style) -> Self {
        self.hover_style = Some(style);
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn on_click(mut self, f: impl Fn() + 'static) -> Self {
        self.events.on_click = Some(Rc::new(f));
        self
    }

    pub fn on_focus(mut self, f: impl Fn() + 'static) -> Self {
        self.events.on_focus = Some(Rc::new(f));
        self
    }

    pub fn on_blur(mut self, f: impl Fn() + 'static) -> Self {
        self.events.on_blur = Some(Rc::new(f));
        self
    }

    pub fn on_key(mut self, f: impl Fn(crate::key::KeyWithModifiers) + 'static) -> Self {
        self.events.on_key = Some(Rc::new(f));
        self
    }

    pub fn on_char(mut self, f: impl Fn(char) + 'static) -> Self {
        self.events.on_char = Some(Rc::new(f));
        self
    }

    pub fn on_unmount(mut self, f: impl Fn() + 'static) -> Self {
        self.events.on_unmount = Some(Rc::new(f));
        self
    }

    /// Sets the handler fired when `Esc` is routed to this overlay layer
    /// (§4.10 rule 1). No-op on any other kind.
    pub fn on_escape(mut self, f: impl Fn() + 'static) -> Self {
        if let VNodeKind::Layer(p) = &mut self.kind {
            p.on_escape = Some(Rc::new(f));
        }
        self
    }

    /// Registers a shortcut this overlay layer advertises while visible
    /// (§4.10 rule 2). No-op on any other kind.
    pub fn shortcut(mut self, chord: crate::key::KeyWithModifiers, f: impl Fn() + 'static) -> Self {
        if let VNodeKind::Layer(p) = &mut self.kind {
            p.shortcuts.push(ShortcutBinding {
                chord,
                handler: Rc::new(f),
            });
        }
        self
    }

    /// Validates the props that the type system cannot rule out by
    /// construction (non-finite numbers, inverted ranges): closed enums
    /// like `Justify`/`Align` and non-negative gaps are already enforced by
    /// their Rust types and need no runtime check.
    pub fn validate(&self) -> EngineResult<()> {
        match &self.kind {
            VNodeKind::Slider(p) => {
                if !p.min.is_finite() || !p.max.is_finite() || !p.value.is_finite() {
                    return Err(EngineError::invalid_props("slider value/min/max not finite"));
                }
                if p.min > p.max {
                    return Err(EngineError::invalid_props("slider min exceeds max"));
                }
            }
            VNodeKind::Progress(p) => {
                if !p.value.is_finite() || !p.max.is_finite() {
                    return Err(EngineError::invalid_props("progress value/max not finite"));
                }
            }
            VNodeKind::Grid(p) => {
                for track in p.columns.iter().chain(p.rows.iter()) {
                    if let GridTrack::Fraction(weight) = track {
                        if !weight.is_finite() || *weight <= 0.0 {
                            return Err(EngineError::invalid_props(
                                "grid fr track weight must be finite and positive",
                            ));
                        }
                    }
                }
            }
            VNodeKind::BarChart(p) => {
                if p.data.iter().any(|v| !v.is_finite()) {
                    return Err(EngineError::invalid_props("barChart data contains non-finite value"));
                }
            }
            VNodeKind::Table(p) => {
                for row in &p.rows {
                    if row.len() > p.columns.len() {
                        return Err(EngineError::invalid_props(
                            "table row has more cells than declared columns",
                        ));
                    }
                }
            }
            _ => {}
        }
        if !self.kind.is_structural() && !self.children.is_empty() {
            return Err(EngineError::invalid_props(format!(
                "{} is a leaf kind and cannot carry children",
                self.kind.name()
            )));
        }
        Ok(())
    }
}

// ---- Constructors -------------------------------------------------------

pub fn row(children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Row(RowProps::default())).with_children(children)
}

pub fn column(children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Column(ColumnProps::default())).with_children(children)
}

pub fn box_node(child: VNode) -> VNode {
    VNode::new(VNodeKind::BoxNode(BoxProps::default())).child(child)
}

pub fn grid(columns: Vec<GridTrack>, children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Grid(GridProps {
        columns,
        ..Default::default()
    }))
    .with_children(children)
}

pub fn layers(children: Vec<VNode>) -> VNode {
    VNode::new(VNodeKind::Layers(LayersProps::default())).with_children(children)
}

pub fn layer(z_index: i32, child: VNode) -> VNode {
    VNode::new(VNodeKind::Layer(LayerProps {
        z_index,
        ..Default::default()
    }))
    .child(child)
}

/// A layer marked as a modal/dropdown/command-palette overlay (§4.10 rule 1).
pub fn overlay_layer(z_index: i32, child: VNode) -> VNode {
    VNode::new(VNodeKind::Layer(LayerProps {
        z_index,
        is_overlay: true,
        ..Default::default()
    }))
    .child(child)
}

pub fn spacer(size: u16) -> VNode {
    VNode::new(VNodeKind::Spacer(SpacerProps { size }))
}

/// Guards a lazily-built subtree against panics raised while building it.
/// `build` runs each commit until it panics, at which point `fallback` takes
/// over, receiving the caught message and a `retry()` closure that clears
/// the latch on the following commit (§8 S3).
pub fn error_boundary(
    boundary_id: impl Into<String>,
    build: impl Fn() -> VNode + 'static,
    fallback: impl Fn(&str, Rc<dyn Fn()>) -> VNode + 'static,
) -> VNode {
    VNode::new(VNodeKind::ErrorBoundary(ErrorBoundaryProps {
        boundary_id: boundary_id.into(),
        build: Rc::new(build),
        fallback: Rc::new(fallback),
    }))
}

pub fn text(content: impl Into<String>) -> VNode {
    VNode::new(VNodeKind::Text(TextProps {
        content: content.into(),
        text_style: None,
    }))
}

pub fn button(label: impl Into<String>) -> VNode {
    VNode::new(VNodeKind::Button(ButtonProps {
        label: label.into(),
        disabled: false,
    }))
    .focusable(true)
}

pub fn input(value: impl Into<String>) -> VNode {
    VNode::new(VNodeKind::Input(InputProps {
        value: value.into(),
        cursor: 0,
        placeholder: None,
    }))
    .focusable(true)
}

pub fn checkbox(checked: bool, label: impl Into<String>) -> VNode {
    VNode::new(VNodeKind::Checkbox(CheckboxProps {
        checked,
        label: label.into(),
    }))
    .focusable(true)
}

pub fn spinner() -> VNode {
    VNode::new(VNodeKind::Spinner(SpinnerProps::default()))
}

pub fn progress(value: f32, max: f32) -> VNode {
    VNode::new(VNodeKind::Progress(ProgressProps { value, max }))
}

pub fn bar_chart(data: Vec<f32>, orientation: Orientation) -> VNode {
    VNode::new(VNodeKind::BarChart(BarChartProps {
        data,
        labels: Vec::new(),
        orientation,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_cannot_carry_children() {
        let mut node = text("hi");
        node.children.push(Rc::new(text("nested")));
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_structural_children_survive_validate() {
        let node = row(vec![text("a"), text("b")]);
        assert!(node.validate().is_ok());
        assert_eq!(node.children.len(), 2);
    }

    #[test]
    fn test_slider_min_greater_than_max_is_invalid() {
        let node = VNode::new(VNodeKind::Slider(SliderProps {
            value: 0.5,
            min: 1.0,
            max: 0.0,
            step: 0.1,
        }));
        assert!(matches!(
            node.validate(),
            Err(EngineError::InvalidProps { .. })
        ));
    }

    #[test]
    fn test_grid_non_positive_fr_is_invalid() {
        let node = grid(vec![GridTrack::Fraction(-1.0)], vec![]);
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_barchart_empty_data_is_valid() {
        let node = bar_chart(vec![], Orientation::Vertical);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_event_callbacks_eq_ignores_identity() {
        let a = EventCallbacks {
            on_click: Some(Rc::new(|| {})),
            ..Default::default()
        };
        let b = EventCallbacks {
            on_click: Some(Rc::new(|| {})),
            ..Default::default()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_vnode_ref_pointer_identity() {
        let a = row(vec![text("x")]);
        let shared: VNodeRef = Rc::new(a);
        let clone_a = shared.clone();
        assert!(Rc::ptr_eq(&shared, &clone_a));
    }
}
