//! Property value types and the flat property bag.
//!
//! Every settable property is one of: a concrete value, or a variable
//! handle (`Prop::Var`). The bag itself is a flat struct of `Option` fields
//! — no heterogeneous maps on the hot path. `PropKey` enumerates the keys;
//! the per-key plumbing (membership, equality, copy, clear) is generated
//! from a single field list so the bag and the key set cannot drift apart.

use crate::id::NodeId;
use crate::variable::{ThemeMap, VarId, VarValue, VariableStore};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color, 4 × f32 in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RGB`, `#RGBA`, `#RRGGBB`, or `#RRGGBBAA` (leading `#`
    /// optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let nibble =
            |i: usize| -> Option<u8> { Some(u8::from_str_radix(hex.get(i..i + 1)?, 16).ok()? * 17) };
        let byte = |i: usize| -> Option<u8> { u8::from_str_radix(hex.get(i..i + 2)?, 16).ok() };
        let (r, g, b, a) = match hex.len() {
            3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
            4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
            6 => (byte(0)?, byte(2)?, byte(4)?, 255),
            8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
            _ => return None,
        };
        Some(Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ))
    }

    /// Emit as `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        let r = (self.r * 255.0).round() as u8;
        let g = (self.g * 255.0).round() as u8;
        let b = (self.b * 255.0).round() as u8;
        let a = (self.a * 255.0).round() as u8;
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

// ─── Concrete-or-variable ────────────────────────────────────────────────

/// A property slot: either a concrete value or a variable handle resolved
/// under the node's active theme.
#[derive(Debug, Clone, PartialEq)]
pub enum Prop<T> {
    Value(T),
    Var(VarId),
}

/// Conversion out of a resolved variable value.
pub trait FromVarValue: Sized {
    fn from_var(value: VarValue) -> Self;
}

impl FromVarValue for f64 {
    fn from_var(value: VarValue) -> Self {
        match value {
            VarValue::Number(n) => n,
            _ => 0.0,
        }
    }
}

impl FromVarValue for bool {
    fn from_var(value: VarValue) -> Self {
        matches!(value, VarValue::Boolean(true))
    }
}

impl FromVarValue for String {
    fn from_var(value: VarValue) -> Self {
        match value {
            VarValue::String(s) => s,
            _ => String::new(),
        }
    }
}

impl FromVarValue for Color {
    fn from_var(value: VarValue) -> Self {
        match value {
            VarValue::Color(c) => c,
            _ => Color::BLACK,
        }
    }
}

impl<T: Clone + FromVarValue> Prop<T> {
    /// Substitute the handle (if any) under `theme`.
    pub fn resolve(&self, vars: &VariableStore, theme: &ThemeMap) -> T {
        match self {
            Prop::Value(v) => v.clone(),
            Prop::Var(id) => T::from_var(vars.resolve(*id, theme)),
        }
    }

    /// Return the resolved form as a concrete `Prop::Value`.
    pub fn resolved(&self, vars: &VariableStore, theme: &ThemeMap) -> Prop<T> {
        Prop::Value(self.resolve(vars, theme))
    }
}

impl<T> Prop<T> {
    pub fn var_id(&self) -> Option<VarId> {
        match self {
            Prop::Var(id) => Some(*id),
            Prop::Value(_) => None,
        }
    }

    /// Replace this slot with a concrete value if it references `var`.
    pub fn substitute(&mut self, var: VarId, value: T) {
        if self.var_id() == Some(var) {
            *self = Prop::Value(value);
        }
    }
}

impl<T> From<T> for Prop<T> {
    fn from(v: T) -> Self {
        Prop::Value(v)
    }
}

// ─── Paint ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientKind {
    Linear,
    Radial,
    Angular,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    pub color: Color,
    pub position: f64,
}

/// One control point of a mesh gradient. Bare wire points carry only a
/// position; full points add per-side tangent handles.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPoint {
    pub position: Point,
    pub left_handle: Option<Point>,
    pub right_handle: Option<Point>,
    pub top_handle: Option<Point>,
    pub bottom_handle: Option<Point>,
}

impl MeshPoint {
    pub fn at(position: Point) -> Self {
        Self {
            position,
            left_handle: None,
            right_handle: None,
            top_handle: None,
            bottom_handle: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMode {
    Fill,
    Fit,
    Stretch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Prop<Color>),
    Gradient {
        kind: GradientKind,
        /// Midpoint of the gradient axis.
        center: Point,
        /// `size.height` is the axis length for linear gradients.
        size: Size,
        /// Counter-clockwise degrees, 0° pointing up.
        rotation: f64,
        stops: Vec<GradientStop>,
    },
    Image {
        url: String,
        mode: ImageMode,
    },
    Mesh {
        columns: u32,
        rows: u32,
        points: Vec<MeshPoint>,
        colors: Vec<Color>,
    },
}

/// A fill layer: paint plus layer-level controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub paint: Paint,
    pub opacity: f64,
    pub enabled: bool,
    pub blend_mode: Option<String>,
}

impl Fill {
    pub fn solid(color: Color) -> Self {
        Self {
            paint: Paint::Solid(Prop::Value(color)),
            opacity: 1.0,
            enabled: true,
            blend_mode: None,
        }
    }

    pub fn solid_var(var: VarId) -> Self {
        Self {
            paint: Paint::Solid(Prop::Var(var)),
            opacity: 1.0,
            enabled: true,
            blend_mode: None,
        }
    }
}

// ─── Stroke & Effects ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeAlign {
    Inside,
    Center,
    Outside,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub paint: Paint,
    pub width: Prop<f64>,
    pub align: StrokeAlign,
}

impl Stroke {
    /// How far the stroke extends past the fill outline on each side.
    pub fn outset(&self, width: f64) -> f64 {
        match self.align {
            StrokeAlign::Inside => 0.0,
            StrokeAlign::Center => width / 2.0,
            StrokeAlign::Outside => width,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Blur {
        radius: f64,
        enabled: bool,
    },
    BackgroundBlur {
        radius: f64,
        enabled: bool,
    },
    DropShadow {
        color: Color,
        offset: Vec2,
        blur: f64,
        spread: f64,
        blend_mode: Option<String>,
        enabled: bool,
    },
}

impl Effect {
    pub fn enabled(&self) -> bool {
        match self {
            Effect::Blur { enabled, .. }
            | Effect::BackgroundBlur { enabled, .. }
            | Effect::DropShadow { enabled, .. } => *enabled,
        }
    }

    /// Max distance this effect paints past the node's visual bounds.
    pub fn expansion(&self) -> f64 {
        match self {
            Effect::Blur { radius, .. } => *radius,
            Effect::BackgroundBlur { .. } => 0.0,
            Effect::DropShadow {
                offset,
                blur,
                spread,
                ..
            } => offset.hypot() + blur + spread,
        }
    }
}

// ─── Sizing & Layout ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizingBehavior {
    #[default]
    Fixed,
    FitContent,
    FillContainer,
}

/// A per-axis size: behavior plus the fixed value or fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSpec {
    pub behavior: SizingBehavior,
    pub value: Option<Prop<f64>>,
}

impl SizeSpec {
    pub fn fixed(value: f64) -> Self {
        Self {
            behavior: SizingBehavior::Fixed,
            value: Some(Prop::Value(value)),
        }
    }

    pub fn fit_content(fallback: Option<f64>) -> Self {
        Self {
            behavior: SizingBehavior::FitContent,
            value: fallback.map(Prop::Value),
        }
    }

    pub fn fill_container(fallback: Option<f64>) -> Self {
        Self {
            behavior: SizingBehavior::FillContainer,
            value: fallback.map(Prop::Value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JustifyContent {
    #[default]
    Start,
    Center,
    End,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlignItems {
    #[default]
    Start,
    Center,
    End,
}

/// Padding slots in top, right, bottom, left order.
pub type Padding = [Prop<f64>; 4];

// ─── Text ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextVAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextGrowth {
    /// Both axes grow with content.
    #[default]
    Auto,
    /// Width is fixed, height grows with wrapped lines.
    FixedWidth,
    /// Both axes honored as committed.
    FixedWidthHeight,
}

// ─── The property bag ────────────────────────────────────────────────────

macro_rules! properties {
    ($( $field:ident : $ty:ty => $key:ident / $wire:literal ),+ $(,)?) => {
        /// Enumerates every property key, in declaration order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum PropKey {
            $( $key ),+
        }

        impl PropKey {
            pub const ALL: &'static [PropKey] = &[ $( PropKey::$key ),+ ];

            /// The wire-format field name.
            pub fn wire_name(self) -> &'static str {
                match self {
                    $( PropKey::$key => $wire ),+
                }
            }

            pub fn from_wire(name: &str) -> Option<Self> {
                match name {
                    $( $wire => Some(PropKey::$key), )+
                    _ => None,
                }
            }
        }

        /// Flat bag of optional properties. `None` means unset: reads fall
        /// back to the prototype (for instances) and then to defaults.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Properties {
            $( pub $field : Option<$ty> ),+
        }

        impl Properties {
            pub fn is_set(&self, key: PropKey) -> bool {
                match key {
                    $( PropKey::$key => self.$field.is_some() ),+
                }
            }

            /// Keys currently set, in declaration order.
            pub fn set_keys(&self) -> SmallVec<[PropKey; 8]> {
                let mut keys = SmallVec::new();
                $( if self.$field.is_some() { keys.push(PropKey::$key); } )+
                keys
            }

            /// Whether `self` and `other` hold the same value (or same
            /// unset state) for `key`.
            pub fn key_eq(&self, other: &Properties, key: PropKey) -> bool {
                match key {
                    $( PropKey::$key => self.$field == other.$field ),+
                }
            }

            /// Copy one slot (set or unset) from `src`.
            pub fn copy_key_from(&mut self, src: &Properties, key: PropKey) {
                match key {
                    $( PropKey::$key => self.$field = src.$field.clone() ),+
                }
            }

            pub fn clear_key(&mut self, key: PropKey) {
                match key {
                    $( PropKey::$key => self.$field = None ),+
                }
            }
        }
    };
}

properties! {
    x: Prop<f64> => X / "x",
    y: Prop<f64> => Y / "y",
    width: SizeSpec => Width / "width",
    height: SizeSpec => Height / "height",
    rotation: Prop<f64> => Rotation / "rotation",
    flip_x: Prop<bool> => FlipX / "flipX",
    flip_y: Prop<bool> => FlipY / "flipY",
    fills: Vec<Fill> => Fills / "fills",
    stroke: Stroke => StrokeProp / "stroke",
    effects: Vec<Effect> => Effects / "effects",
    opacity: Prop<f64> => Opacity / "opacity",
    corner_radius: Prop<f64> => CornerRadius / "cornerRadius",
    direction: Direction => DirectionKey / "mode",
    padding: Padding => PaddingKey / "padding",
    child_spacing: Prop<f64> => ChildSpacing / "childSpacing",
    justify_content: JustifyContent => Justify / "justifyContent",
    align_items: AlignItems => Align / "alignItems",
    include_stroke: Prop<bool> => IncludeStroke / "includeStroke",
    content: Prop<String> => Content / "content",
    font_family: Prop<String> => FontFamily / "fontFamily",
    font_weight: Prop<f64> => FontWeight / "fontWeight",
    font_style: Prop<String> => FontStyle / "fontStyle",
    font_size: Prop<f64> => FontSize / "fontSize",
    line_height: Prop<f64> => LineHeight / "lineHeight",
    letter_spacing: Prop<f64> => LetterSpacing / "letterSpacing",
    text_align: TextAlign => TextAlignKey / "textAlign",
    text_align_vertical: TextVAlign => TextVAlignKey / "textAlignVertical",
    text_growth: TextGrowth => TextGrowthKey / "textGrowth",
    name: Prop<String> => Name / "name",
    context: Prop<String> => ContextKey / "context",
    theme: ThemeMap => ThemeKey / "theme",
    metadata: serde_json::Value => Metadata / "metadata",
    enabled: Prop<bool> => Enabled / "enabled",
}

impl Properties {
    /// Apply `delta` (its set keys only), returning the prior slots and the
    /// keys that actually changed. Unchanged keys are not journalled.
    pub fn merge_from(&mut self, delta: &Properties) -> (Properties, SmallVec<[PropKey; 8]>) {
        let mut prior = Properties::default();
        let mut changed = SmallVec::new();
        for key in delta.set_keys() {
            if self.key_eq(delta, key) {
                continue;
            }
            prior.copy_key_from(self, key);
            self.copy_key_from(delta, key);
            changed.push(key);
        }
        (prior, changed)
    }

    /// Restore the listed slots from a prior snapshot.
    pub fn restore_from(&mut self, prior: &Properties, keys: &[PropKey]) {
        for &key in keys {
            self.copy_key_from(prior, key);
        }
    }

    /// Variable handles referenced by the slot at `key`.
    pub fn var_refs(&self, key: PropKey) -> SmallVec<[VarId; 2]> {
        let mut out = SmallVec::new();
        let mut push = |v: Option<VarId>| {
            if let Some(id) = v {
                out.push(id);
            }
        };
        match key {
            PropKey::X => push(self.x.as_ref().and_then(Prop::var_id)),
            PropKey::Y => push(self.y.as_ref().and_then(Prop::var_id)),
            PropKey::Width => {
                push(self.width.as_ref().and_then(|s| s.value.as_ref()).and_then(Prop::var_id))
            }
            PropKey::Height => {
                push(self.height.as_ref().and_then(|s| s.value.as_ref()).and_then(Prop::var_id))
            }
            PropKey::Rotation => push(self.rotation.as_ref().and_then(Prop::var_id)),
            PropKey::FlipX => push(self.flip_x.as_ref().and_then(Prop::var_id)),
            PropKey::FlipY => push(self.flip_y.as_ref().and_then(Prop::var_id)),
            PropKey::Fills => {
                for fill in self.fills.iter().flatten() {
                    if let Paint::Solid(color) = &fill.paint {
                        push(color.var_id());
                    }
                }
            }
            PropKey::StrokeProp => {
                if let Some(stroke) = &self.stroke {
                    if let Paint::Solid(color) = &stroke.paint {
                        push(color.var_id());
                    }
                    push(stroke.width.var_id());
                }
            }
            PropKey::Opacity => push(self.opacity.as_ref().and_then(Prop::var_id)),
            PropKey::CornerRadius => push(self.corner_radius.as_ref().and_then(Prop::var_id)),
            PropKey::PaddingKey => {
                for side in self.padding.iter().flatten() {
                    push(side.var_id());
                }
            }
            PropKey::ChildSpacing => push(self.child_spacing.as_ref().and_then(Prop::var_id)),
            PropKey::IncludeStroke => push(self.include_stroke.as_ref().and_then(Prop::var_id)),
            PropKey::Content => push(self.content.as_ref().and_then(Prop::var_id)),
            PropKey::FontFamily => push(self.font_family.as_ref().and_then(Prop::var_id)),
            PropKey::FontWeight => push(self.font_weight.as_ref().and_then(Prop::var_id)),
            PropKey::FontStyle => push(self.font_style.as_ref().and_then(Prop::var_id)),
            PropKey::FontSize => push(self.font_size.as_ref().and_then(Prop::var_id)),
            PropKey::LineHeight => push(self.line_height.as_ref().and_then(Prop::var_id)),
            PropKey::LetterSpacing => push(self.letter_spacing.as_ref().and_then(Prop::var_id)),
            PropKey::Name => push(self.name.as_ref().and_then(Prop::var_id)),
            PropKey::ContextKey => push(self.context.as_ref().and_then(Prop::var_id)),
            PropKey::Enabled => push(self.enabled.as_ref().and_then(Prop::var_id)),
            _ => {}
        }
        out
    }

    /// Rewrite every slot referencing `var` to the concrete `value`.
    /// Returns the keys that were rewritten.
    pub fn substitute_var(&mut self, var: VarId, value: &VarValue) -> SmallVec<[PropKey; 2]> {
        let mut rewritten = SmallVec::new();
        for &key in PropKey::ALL {
            if !self.var_refs(key).contains(&var) {
                continue;
            }
            match key {
                PropKey::X => sub_f64(&mut self.x, var, value),
                PropKey::Y => sub_f64(&mut self.y, var, value),
                PropKey::Width => {
                    if let Some(spec) = &mut self.width {
                        sub_f64(&mut spec.value, var, value);
                    }
                }
                PropKey::Height => {
                    if let Some(spec) = &mut self.height {
                        sub_f64(&mut spec.value, var, value);
                    }
                }
                PropKey::Rotation => sub_f64(&mut self.rotation, var, value),
                PropKey::FlipX => sub_bool(&mut self.flip_x, var, value),
                PropKey::FlipY => sub_bool(&mut self.flip_y, var, value),
                PropKey::Fills => {
                    for fill in self.fills.iter_mut().flatten() {
                        if let Paint::Solid(color) = &mut fill.paint {
                            color.substitute(var, Color::from_var(value.clone()));
                        }
                    }
                }
                PropKey::StrokeProp => {
                    if let Some(stroke) = &mut self.stroke {
                        if let Paint::Solid(color) = &mut stroke.paint {
                            color.substitute(var, Color::from_var(value.clone()));
                        }
                        stroke.width.substitute(var, f64::from_var(value.clone()));
                    }
                }
                PropKey::Opacity => sub_f64(&mut self.opacity, var, value),
                PropKey::CornerRadius => sub_f64(&mut self.corner_radius, var, value),
                PropKey::PaddingKey => {
                    for side in self.padding.iter_mut().flatten() {
                        side.substitute(var, f64::from_var(value.clone()));
                    }
                }
                PropKey::ChildSpacing => sub_f64(&mut self.child_spacing, var, value),
                PropKey::IncludeStroke => sub_bool(&mut self.include_stroke, var, value),
                PropKey::Content => sub_string(&mut self.content, var, value),
                PropKey::FontFamily => sub_string(&mut self.font_family, var, value),
                PropKey::FontWeight => sub_f64(&mut self.font_weight, var, value),
                PropKey::FontStyle => sub_string(&mut self.font_style, var, value),
                PropKey::FontSize => sub_f64(&mut self.font_size, var, value),
                PropKey::LineHeight => sub_f64(&mut self.line_height, var, value),
                PropKey::LetterSpacing => sub_f64(&mut self.letter_spacing, var, value),
                PropKey::Name => sub_string(&mut self.name, var, value),
                PropKey::ContextKey => sub_string(&mut self.context, var, value),
                PropKey::Enabled => sub_bool(&mut self.enabled, var, value),
                _ => {}
            }
            rewritten.push(key);
        }
        rewritten
    }
}

fn sub_f64(slot: &mut Option<Prop<f64>>, var: VarId, value: &VarValue) {
    if let Some(p) = slot {
        p.substitute(var, f64::from_var(value.clone()));
    }
}

fn sub_bool(slot: &mut Option<Prop<bool>>, var: VarId, value: &VarValue) {
    if let Some(p) = slot {
        p.substitute(var, bool::from_var(value.clone()));
    }
}

fn sub_string(slot: &mut Option<Prop<String>>, var: VarId, value: &VarValue) {
    if let Some(p) = slot {
        p.substitute(var, String::from_var(value.clone()));
    }
}

// ─── Resolved view ───────────────────────────────────────────────────────

/// The concrete view of a node's properties after prototype fallback and
/// variable substitution. Recomputed on invalidation, cached per node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProps {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub sizing_x: SizingBehavior,
    pub sizing_y: SizingBehavior,
    pub rotation: f64,
    pub flip_x: bool,
    pub flip_y: bool,
    pub fills: Vec<Fill>,
    pub stroke: Option<Stroke>,
    pub effects: Vec<Effect>,
    pub opacity: f64,
    pub corner_radius: f64,
    pub direction: Direction,
    pub padding: [f64; 4],
    pub child_spacing: f64,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub include_stroke: bool,
    pub content: String,
    pub font_family: String,
    pub font_weight: f64,
    pub font_style: String,
    pub font_size: f64,
    pub line_height: f64,
    pub letter_spacing: f64,
    pub text_align: TextAlign,
    pub text_align_vertical: TextVAlign,
    pub text_growth: TextGrowth,
    pub name: String,
    pub context: String,
    pub theme: ThemeMap,
    pub metadata: serde_json::Value,
    pub enabled: bool,
}

impl Default for ResolvedProps {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            sizing_x: SizingBehavior::Fixed,
            sizing_y: SizingBehavior::Fixed,
            rotation: 0.0,
            flip_x: false,
            flip_y: false,
            fills: Vec::new(),
            stroke: None,
            effects: Vec::new(),
            opacity: 1.0,
            corner_radius: 0.0,
            direction: Direction::None,
            padding: [0.0; 4],
            child_spacing: 0.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Start,
            include_stroke: false,
            content: String::new(),
            font_family: "Inter".to_string(),
            font_weight: 400.0,
            font_style: "normal".to_string(),
            font_size: 14.0,
            line_height: 0.0,
            letter_spacing: 0.0,
            text_align: TextAlign::Left,
            text_align_vertical: TextVAlign::Top,
            text_growth: TextGrowth::Auto,
            name: String::new(),
            context: String::new(),
            theme: ThemeMap::new(),
            metadata: serde_json::Value::Null,
            enabled: true,
        }
    }
}

/// Resolve a fallback chain of property bags (own first, then prototypes,
/// outermost last) into concrete values under `theme`.
pub fn resolve_chain(chain: &[&Properties], vars: &VariableStore, theme: &ThemeMap) -> ResolvedProps {
    fn first<'a, T>(
        chain: &[&'a Properties],
        pick: impl Fn(&'a Properties) -> Option<&'a T>,
    ) -> Option<&'a T> {
        chain.iter().find_map(|p| pick(p))
    }

    let mut out = ResolvedProps::default();
    if let Some(p) = first(chain, |p| p.x.as_ref()) {
        out.x = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.y.as_ref()) {
        out.y = p.resolve(vars, theme);
    }
    if let Some(spec) = first(chain, |p| p.width.as_ref()) {
        out.sizing_x = spec.behavior;
        if let Some(v) = &spec.value {
            out.width = v.resolve(vars, theme);
        }
    }
    if let Some(spec) = first(chain, |p| p.height.as_ref()) {
        out.sizing_y = spec.behavior;
        if let Some(v) = &spec.value {
            out.height = v.resolve(vars, theme);
        }
    }
    if let Some(p) = first(chain, |p| p.rotation.as_ref()) {
        out.rotation = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.flip_x.as_ref()) {
        out.flip_x = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.flip_y.as_ref()) {
        out.flip_y = p.resolve(vars, theme);
    }
    if let Some(fills) = first(chain, |p| p.fills.as_ref()) {
        out.fills = fills
            .iter()
            .map(|f| {
                let mut f = f.clone();
                if let Paint::Solid(color) = &mut f.paint {
                    *color = color.resolved(vars, theme);
                }
                f
            })
            .collect();
    }
    if let Some(stroke) = first(chain, |p| p.stroke.as_ref()) {
        let mut s = stroke.clone();
        if let Paint::Solid(color) = &mut s.paint {
            *color = color.resolved(vars, theme);
        }
        s.width = s.width.resolved(vars, theme);
        out.stroke = Some(s);
    }
    if let Some(effects) = first(chain, |p| p.effects.as_ref()) {
        out.effects = effects.clone();
    }
    if let Some(p) = first(chain, |p| p.opacity.as_ref()) {
        out.opacity = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.corner_radius.as_ref()) {
        out.corner_radius = p.resolve(vars, theme);
    }
    if let Some(d) = first(chain, |p| p.direction.as_ref()) {
        out.direction = *d;
    }
    if let Some(padding) = first(chain, |p| p.padding.as_ref()) {
        for (slot, side) in out.padding.iter_mut().zip(padding.iter()) {
            *slot = side.resolve(vars, theme);
        }
    }
    if let Some(p) = first(chain, |p| p.child_spacing.as_ref()) {
        out.child_spacing = p.resolve(vars, theme);
    }
    if let Some(j) = first(chain, |p| p.justify_content.as_ref()) {
        out.justify_content = *j;
    }
    if let Some(a) = first(chain, |p| p.align_items.as_ref()) {
        out.align_items = *a;
    }
    if let Some(p) = first(chain, |p| p.include_stroke.as_ref()) {
        out.include_stroke = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.content.as_ref()) {
        out.content = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.font_family.as_ref()) {
        out.font_family = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.font_weight.as_ref()) {
        out.font_weight = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.font_style.as_ref()) {
        out.font_style = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.font_size.as_ref()) {
        out.font_size = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.line_height.as_ref()) {
        out.line_height = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.letter_spacing.as_ref()) {
        out.letter_spacing = p.resolve(vars, theme);
    }
    if let Some(a) = first(chain, |p| p.text_align.as_ref()) {
        out.text_align = *a;
    }
    if let Some(a) = first(chain, |p| p.text_align_vertical.as_ref()) {
        out.text_align_vertical = *a;
    }
    if let Some(g) = first(chain, |p| p.text_growth.as_ref()) {
        out.text_growth = *g;
    }
    if let Some(p) = first(chain, |p| p.name.as_ref()) {
        out.name = p.resolve(vars, theme);
    }
    if let Some(p) = first(chain, |p| p.context.as_ref()) {
        out.context = p.resolve(vars, theme);
    }
    if let Some(t) = first(chain, |p| p.theme.as_ref()) {
        out.theme = t.clone();
    }
    if let Some(m) = first(chain, |p| p.metadata.as_ref()) {
        out.metadata = m.clone();
    }
    if let Some(p) = first(chain, |p| p.enabled.as_ref()) {
        out.enabled = p.resolve(vars, theme);
    }
    out
}

// ─── Connections ─────────────────────────────────────────────────────────

/// A visual connector between two nodes, stored beside the tree (it has no
/// geometry of its own and does not participate in layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: NodeId,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}
