//! Serialization: runtime `Document` → on-wire JSON.
//!
//! Only set property slots are written, so a parse/emit round-trip
//! preserves exactly what the author specified. Instances emit a `ref`
//! with their overridden properties and per-descendant diffs; with
//! `resolve_instances` they are expanded instead, with path-scoped ids for
//! global uniqueness.

use crate::document::Document;
use crate::model::*;
use crate::prototype;
use crate::scene::{NodeKind, Scene};
use crate::variable::{ThemedValue, VariableStore};
use kurbo::Point;
use petgraph::graph::NodeIndex;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    /// Write only explicitly set slots (round-trip form). When false, the
    /// committed geometry is written out too, for consumers that want a
    /// self-contained tree.
    pub omit_defaults: bool,
    /// Expand refs into full subtrees with path-scoped ids.
    pub resolve_instances: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            omit_defaults: true,
            resolve_instances: false,
        }
    }
}

/// Emit the document as a JSON string.
pub fn emit_document(doc: &Document, options: EmitOptions) -> String {
    serde_json::to_string_pretty(&emit_document_value(doc, options))
        .expect("document emission produced invalid JSON")
}

/// Emit the document as a JSON value.
pub fn emit_document_value(doc: &Document, options: EmitOptions) -> Value {
    let mut out = Map::new();
    out.insert("version".into(), Value::String(super::CURRENT_VERSION.into()));

    if !doc.themes.is_empty() {
        let mut themes = Map::new();
        for axis in &doc.themes {
            themes.insert(
                axis.axis.clone(),
                Value::Array(axis.values.iter().cloned().map(Value::String).collect()),
            );
        }
        out.insert("themes".into(), Value::Object(themes));
    }

    if !doc.vars.is_empty() {
        let mut vars = Map::new();
        for (_, var) in doc.vars.iter() {
            vars.insert(
                var.name.clone(),
                json!({
                    "type": var.ty.wire_name(),
                    "value": emit_var_values(&var.values),
                }),
            );
        }
        out.insert("variables".into(), Value::Object(vars));
    }

    let mut children = Vec::new();
    for &child in doc.scene.children(doc.scene.viewport()) {
        children.push(emit_node(&doc.scene, &doc.vars, child, options));
    }
    for connection in &doc.connections {
        let mut obj = Map::new();
        obj.insert("id".into(), Value::String(connection.id.as_str().into()));
        obj.insert("type".into(), Value::String("connection".into()));
        obj.insert("from".into(), Value::String(connection.from.clone()));
        obj.insert("to".into(), Value::String(connection.to.clone()));
        if let Some(label) = &connection.label {
            obj.insert("label".into(), Value::String(label.clone()));
        }
        children.push(Value::Object(obj));
    }
    out.insert("children".into(), Value::Array(children));
    Value::Object(out)
}

fn emit_var_values(values: &[ThemedValue]) -> Value {
    if values.len() == 1 && values[0].theme.is_none() {
        return emit_var_value(&values[0].value);
    }
    Value::Array(
        values
            .iter()
            .map(|tv| {
                let mut obj = Map::new();
                obj.insert("value".into(), emit_var_value(&tv.value));
                if let Some(theme) = &tv.theme {
                    obj.insert(
                        "theme".into(),
                        Value::Object(
                            theme
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                                .collect(),
                        ),
                    );
                }
                Value::Object(obj)
            })
            .collect(),
    )
}

fn emit_var_value(value: &crate::variable::VarValue) -> Value {
    use crate::variable::VarValue;
    match value {
        VarValue::Boolean(b) => Value::Bool(*b),
        VarValue::Number(n) => json!(n),
        VarValue::Color(c) => Value::String(c.to_hex()),
        VarValue::String(s) => Value::String(s.clone()),
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────

/// Emit one subtree as a wire value (clipboard payloads carry these).
pub fn emit_subtree(
    scene: &Scene,
    vars: &VariableStore,
    idx: NodeIndex,
    options: EmitOptions,
) -> Value {
    emit_node(scene, vars, idx, options)
}

fn emit_node(scene: &Scene, vars: &VariableStore, idx: NodeIndex, options: EmitOptions) -> Value {
    let node = scene.node(idx);
    let is_instance_root = node.prototype.is_some() && !scene.is_mirrored_child(idx);

    if is_instance_root && !options.resolve_instances {
        return emit_ref(scene, vars, idx, options);
    }

    let mut obj = Map::new();
    let id = if options.resolve_instances && node.prototype.is_some() {
        scene.path_of(idx)
    } else {
        node.id.as_str().to_string()
    };
    obj.insert("id".into(), Value::String(id));
    obj.insert("type".into(), Value::String(node.kind.type_name().into()));
    match &node.kind {
        NodeKind::Polygon { sides } => {
            obj.insert("sides".into(), json!(sides));
        }
        NodeKind::Path { data } => {
            obj.insert("d".into(), Value::String(data.to_svg()));
        }
        NodeKind::Icon { glyph } => {
            obj.insert("glyph".into(), Value::String(glyph.clone()));
        }
        _ => {}
    }
    if node.reusable {
        obj.insert("reusable".into(), Value::Bool(true));
    }
    emit_props(&mut obj, vars, &node.props);
    if !options.omit_defaults {
        let g = node.geometry;
        obj.entry("x".to_string()).or_insert(json!(g.x));
        obj.entry("y".to_string()).or_insert(json!(g.y));
        obj.entry("width".to_string()).or_insert(json!(g.width));
        obj.entry("height".to_string()).or_insert(json!(g.height));
    }

    let children = scene.children(idx);
    if !children.is_empty() {
        obj.insert(
            "children".into(),
            Value::Array(
                children
                    .iter()
                    .map(|&c| emit_node(scene, vars, c, options))
                    .collect(),
            ),
        );
    }
    Value::Object(obj)
}

/// Emit an instance as a `ref`: target path, root overrides, descendant
/// diffs, and — when the structure diverged — the full child list.
fn emit_ref(scene: &Scene, vars: &VariableStore, idx: NodeIndex, options: EmitOptions) -> Value {
    let node = scene.node(idx);
    let link = node.prototype.as_ref().expect("instance without link");

    let mut obj = Map::new();
    obj.insert("id".into(), Value::String(node.id.as_str().into()));
    obj.insert("type".into(), Value::String("ref".into()));
    obj.insert("ref".into(), Value::String(scene.path_of(link.target)));
    if node.reusable {
        obj.insert("reusable".into(), Value::Bool(true));
    }
    emit_props(&mut obj, vars, &node.props);

    if link.children_overridden {
        let children = scene.children(idx);
        if !children.is_empty() {
            obj.insert(
                "children".into(),
                Value::Array(
                    children
                        .iter()
                        .map(|&c| emit_node(scene, vars, c, options))
                        .collect(),
                ),
            );
        }
    } else {
        let overrides = prototype::serialize_overrides(scene, idx);
        if !overrides.is_empty() {
            let mut descendants = Map::new();
            for over in overrides {
                let path = over
                    .path
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if over.unique_id.is_some() {
                    // A renamed descendant is written structurally.
                    if let Some(target) = prototype::walk_canonical(scene, idx, &over.path) {
                        descendants.insert(path, emit_node(scene, vars, target, options));
                    }
                } else {
                    let mut entry = Map::new();
                    emit_props(&mut entry, vars, &over.props);
                    descendants.insert(path, Value::Object(entry));
                }
            }
            obj.insert("descendants".into(), Value::Object(descendants));
        }
    }
    Value::Object(obj)
}

// ─── Properties ──────────────────────────────────────────────────────────

fn emit_props(obj: &mut Map<String, Value>, vars: &VariableStore, p: &Properties) {
    if let Some(v) = &p.x {
        obj.insert("x".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.y {
        obj.insert("y".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.width {
        obj.insert("width".into(), emit_size(vars, v));
    }
    if let Some(v) = &p.height {
        obj.insert("height".into(), emit_size(vars, v));
    }
    if let Some(v) = &p.rotation {
        // Internal counter-clockwise radians → wire clockwise degrees.
        let value = match v {
            Prop::Value(rad) => json!(round2(-rad.to_degrees())),
            var => emit_num(vars, var),
        };
        obj.insert("rotation".into(), value);
    }
    if let Some(v) = &p.flip_x {
        obj.insert("flipX".into(), emit_bool(vars, v));
    }
    if let Some(v) = &p.flip_y {
        obj.insert("flipY".into(), emit_bool(vars, v));
    }
    if let Some(fills) = &p.fills {
        obj.insert(
            "fills".into(),
            Value::Array(fills.iter().map(|f| emit_fill(vars, f)).collect()),
        );
    }
    if let Some(stroke) = &p.stroke {
        obj.insert("stroke".into(), emit_stroke(vars, stroke));
    }
    if let Some(effects) = &p.effects {
        obj.insert(
            "effects".into(),
            Value::Array(effects.iter().map(emit_effect).collect()),
        );
    }
    if let Some(v) = &p.opacity {
        obj.insert("opacity".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.corner_radius {
        obj.insert("cornerRadius".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.direction {
        obj.insert(
            "mode".into(),
            Value::String(
                match v {
                    Direction::Horizontal => "horizontal",
                    Direction::Vertical => "vertical",
                    Direction::None => "none",
                }
                .into(),
            ),
        );
    }
    if let Some(padding) = &p.padding {
        obj.insert("padding".into(), emit_padding(vars, padding));
    }
    if let Some(v) = &p.child_spacing {
        obj.insert("childSpacing".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.justify_content {
        obj.insert(
            "justifyContent".into(),
            Value::String(
                match v {
                    JustifyContent::Start => "start",
                    JustifyContent::Center => "center",
                    JustifyContent::End => "end",
                    JustifyContent::SpaceBetween => "space_between",
                    JustifyContent::SpaceAround => "space_around",
                }
                .into(),
            ),
        );
    }
    if let Some(v) = &p.align_items {
        obj.insert(
            "alignItems".into(),
            Value::String(
                match v {
                    AlignItems::Start => "start",
                    AlignItems::Center => "center",
                    AlignItems::End => "end",
                }
                .into(),
            ),
        );
    }
    if let Some(v) = &p.include_stroke {
        obj.insert("includeStroke".into(), emit_bool(vars, v));
    }
    if let Some(v) = &p.content {
        obj.insert("content".into(), emit_string(vars, v));
    }
    if let Some(v) = &p.font_family {
        obj.insert("fontFamily".into(), emit_string(vars, v));
    }
    if let Some(v) = &p.font_weight {
        obj.insert("fontWeight".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.font_style {
        obj.insert("fontStyle".into(), emit_string(vars, v));
    }
    if let Some(v) = &p.font_size {
        obj.insert("fontSize".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.line_height {
        obj.insert("lineHeight".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.letter_spacing {
        obj.insert("letterSpacing".into(), emit_num(vars, v));
    }
    if let Some(v) = &p.text_align {
        obj.insert(
            "textAlign".into(),
            Value::String(
                match v {
                    TextAlign::Left => "left",
                    TextAlign::Center => "center",
                    TextAlign::Right => "right",
                }
                .into(),
            ),
        );
    }
    if let Some(v) = &p.text_align_vertical {
        obj.insert(
            "textAlignVertical".into(),
            Value::String(
                match v {
                    TextVAlign::Top => "top",
                    TextVAlign::Middle => "middle",
                    TextVAlign::Bottom => "bottom",
                }
                .into(),
            ),
        );
    }
    if let Some(v) = &p.text_growth {
        obj.insert(
            "textGrowth".into(),
            Value::String(
                match v {
                    TextGrowth::Auto => "auto",
                    TextGrowth::FixedWidth => "fixed-width",
                    TextGrowth::FixedWidthHeight => "fixed-width-height",
                }
                .into(),
            ),
        );
    }
    if let Some(v) = &p.name {
        obj.insert("name".into(), emit_string(vars, v));
    }
    if let Some(v) = &p.context {
        obj.insert("context".into(), emit_string(vars, v));
    }
    if let Some(theme) = &p.theme {
        obj.insert(
            "theme".into(),
            Value::Object(
                theme
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
    }
    if let Some(v) = &p.metadata {
        obj.insert("metadata".into(), v.clone());
    }
    if let Some(v) = &p.enabled {
        obj.insert("enabled".into(), emit_bool(vars, v));
    }
}

fn var_name(vars: &VariableStore, id: crate::variable::VarId) -> Value {
    match vars.try_var(id) {
        Some(var) => Value::String(format!("${}", var.name)),
        None => Value::Null,
    }
}

fn emit_num(vars: &VariableStore, prop: &Prop<f64>) -> Value {
    match prop {
        Prop::Value(n) => json!(n),
        Prop::Var(id) => var_name(vars, *id),
    }
}

fn emit_bool(vars: &VariableStore, prop: &Prop<bool>) -> Value {
    match prop {
        Prop::Value(b) => Value::Bool(*b),
        Prop::Var(id) => var_name(vars, *id),
    }
}

fn emit_string(vars: &VariableStore, prop: &Prop<String>) -> Value {
    match prop {
        Prop::Value(s) => Value::String(s.clone()),
        Prop::Var(id) => var_name(vars, *id),
    }
}

fn emit_color(vars: &VariableStore, prop: &Prop<Color>) -> Value {
    match prop {
        Prop::Value(c) => Value::String(c.to_hex()),
        Prop::Var(id) => var_name(vars, *id),
    }
}

fn emit_size(vars: &VariableStore, spec: &SizeSpec) -> Value {
    match spec.behavior {
        SizingBehavior::Fixed => match &spec.value {
            Some(v) => emit_num(vars, v),
            None => json!(0.0),
        },
        SizingBehavior::FitContent | SizingBehavior::FillContainer => {
            let keyword = if spec.behavior == SizingBehavior::FitContent {
                "fit_content"
            } else {
                "fill_container"
            };
            match &spec.value {
                Some(Prop::Value(fallback)) => Value::String(format!("{keyword}({fallback})")),
                _ => Value::String(keyword.into()),
            }
        }
    }
}

fn emit_padding(vars: &VariableStore, padding: &Padding) -> Value {
    let [t, r, b, l] = padding;
    if t == r && r == b && b == l {
        emit_num(vars, t)
    } else {
        Value::Array([t, r, b, l].map(|side| emit_num(vars, side)).to_vec())
    }
}

fn emit_point(point: Point) -> Value {
    json!({ "x": point.x, "y": point.y })
}

fn emit_fill(vars: &VariableStore, fill: &Fill) -> Value {
    let plain = fill.opacity == 1.0 && fill.enabled && fill.blend_mode.is_none();
    let mut obj = Map::new();
    match &fill.paint {
        Paint::Solid(color) => {
            if plain {
                return emit_color(vars, color);
            }
            obj.insert("type".into(), Value::String("color".into()));
            obj.insert("color".into(), emit_color(vars, color));
        }
        Paint::Gradient {
            kind,
            center,
            size,
            rotation,
            stops,
        } => {
            obj.insert("type".into(), Value::String("gradient".into()));
            obj.insert(
                "gradientType".into(),
                Value::String(
                    match kind {
                        GradientKind::Linear => "linear",
                        GradientKind::Radial => "radial",
                        GradientKind::Angular => "angular",
                    }
                    .into(),
                ),
            );
            obj.insert("center".into(), emit_point(*center));
            obj.insert(
                "size".into(),
                json!({ "width": size.width, "height": size.height }),
            );
            obj.insert("rotation".into(), json!(rotation));
            obj.insert(
                "colors".into(),
                Value::Array(
                    stops
                        .iter()
                        .map(|s| json!({ "color": s.color.to_hex(), "position": s.position }))
                        .collect(),
                ),
            );
        }
        Paint::Image { url, mode } => {
            obj.insert("type".into(), Value::String("image".into()));
            obj.insert("url".into(), Value::String(url.clone()));
            obj.insert(
                "mode".into(),
                Value::String(
                    match mode {
                        ImageMode::Fill => "fill",
                        ImageMode::Fit => "fit",
                        ImageMode::Stretch => "stretch",
                    }
                    .into(),
                ),
            );
        }
        Paint::Mesh {
            columns,
            rows,
            points,
            colors,
        } => {
            obj.insert("type".into(), Value::String("mesh_gradient".into()));
            obj.insert("columns".into(), json!(columns));
            obj.insert("rows".into(), json!(rows));
            obj.insert(
                "points".into(),
                Value::Array(points.iter().map(emit_mesh_point).collect()),
            );
            obj.insert(
                "colors".into(),
                Value::Array(colors.iter().map(|c| Value::String(c.to_hex())).collect()),
            );
        }
    }
    if !fill.enabled {
        obj.insert("enabled".into(), Value::Bool(false));
    }
    if fill.opacity != 1.0 {
        obj.insert("opacity".into(), json!(fill.opacity));
    }
    if let Some(blend) = &fill.blend_mode {
        obj.insert("blendMode".into(), Value::String(blend.clone()));
    }
    Value::Object(obj)
}

fn emit_mesh_point(point: &MeshPoint) -> Value {
    let bare = point.left_handle.is_none()
        && point.right_handle.is_none()
        && point.top_handle.is_none()
        && point.bottom_handle.is_none();
    if bare {
        return json!([point.position.x, point.position.y]);
    }
    let mut obj = Map::new();
    let pair = |p: Point| json!([p.x, p.y]);
    obj.insert("position".into(), pair(point.position));
    if let Some(h) = point.left_handle {
        obj.insert("leftHandle".into(), pair(h));
    }
    if let Some(h) = point.right_handle {
        obj.insert("rightHandle".into(), pair(h));
    }
    if let Some(h) = point.top_handle {
        obj.insert("topHandle".into(), pair(h));
    }
    if let Some(h) = point.bottom_handle {
        obj.insert("bottomHandle".into(), pair(h));
    }
    Value::Object(obj)
}

fn emit_stroke(vars: &VariableStore, stroke: &Stroke) -> Value {
    let mut obj = Map::new();
    if let Paint::Solid(color) = &stroke.paint {
        obj.insert("color".into(), emit_color(vars, color));
    }
    obj.insert("width".into(), emit_num(vars, &stroke.width));
    obj.insert(
        "align".into(),
        Value::String(
            match stroke.align {
                StrokeAlign::Inside => "inside",
                StrokeAlign::Center => "center",
                StrokeAlign::Outside => "outside",
            }
            .into(),
        ),
    );
    Value::Object(obj)
}

fn emit_effect(effect: &Effect) -> Value {
    match effect {
        Effect::Blur { radius, enabled } => {
            let mut obj = Map::new();
            obj.insert("type".into(), Value::String("blur".into()));
            obj.insert("radius".into(), json!(radius));
            if !enabled {
                obj.insert("enabled".into(), Value::Bool(false));
            }
            Value::Object(obj)
        }
        Effect::BackgroundBlur { radius, enabled } => {
            let mut obj = Map::new();
            obj.insert("type".into(), Value::String("background_blur".into()));
            obj.insert("radius".into(), json!(radius));
            if !enabled {
                obj.insert("enabled".into(), Value::Bool(false));
            }
            Value::Object(obj)
        }
        Effect::DropShadow {
            color,
            offset,
            blur,
            spread,
            blend_mode,
            enabled,
        } => {
            let mut obj = Map::new();
            obj.insert("type".into(), Value::String("shadow".into()));
            obj.insert("shadowType".into(), Value::String("outer".into()));
            obj.insert("color".into(), Value::String(color.to_hex()));
            obj.insert("offset".into(), json!({ "x": offset.x, "y": offset.y }));
            obj.insert("blur".into(), json!(blur));
            obj.insert("spread".into(), json!(spread));
            if let Some(blend) = blend_mode {
                obj.insert("blendMode".into(), Value::String(blend.clone()));
            }
            if !enabled {
                obj.insert("enabled".into(), Value::Bool(false));
            }
            Value::Object(obj)
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parse_document;

    #[test]
    fn emits_only_set_slots() {
        let doc = parse_document(
            r##"{ "version": "2.6", "children": [
                { "id": "r", "type": "rectangle", "width": 10, "height": 20 } ] }"##,
        )
        .unwrap();
        let value = emit_document_value(&doc, EmitOptions::default());
        let node = &value["children"][0];
        assert_eq!(node["width"], 10.0);
        assert!(node.get("opacity").is_none());
        assert!(node.get("fills").is_none());
    }

    #[test]
    fn instances_emit_as_refs_with_diffs() {
        let doc = parse_document(
            r##"{ "version": "2.6", "children": [
                { "id": "chip", "type": "frame", "width": 40, "height": 16,
                  "reusable": true,
                  "children": [ { "id": "label", "type": "text", "content": "new" } ] },
                { "id": "chip_2", "type": "ref", "ref": "chip",
                  "opacity": 0.5,
                  "descendants": { "label": { "content": "beta" } } } ] }"##,
        )
        .unwrap();
        let value = emit_document_value(&doc, EmitOptions::default());
        let re = &value["children"][1];
        assert_eq!(re["type"], "ref");
        assert_eq!(re["ref"], "chip");
        assert_eq!(re["opacity"], 0.5);
        assert_eq!(re["descendants"]["label"]["content"], "beta");
    }

    #[test]
    fn resolve_instances_expands_with_path_ids() {
        let doc = parse_document(
            r##"{ "version": "2.6", "children": [
                { "id": "chip", "type": "frame", "width": 40, "height": 16,
                  "children": [ { "id": "label", "type": "text", "content": "new" } ] },
                { "id": "chip_2", "type": "ref", "ref": "chip" } ] }"##,
        )
        .unwrap();
        let value = emit_document_value(
            &doc,
            EmitOptions {
                resolve_instances: true,
                ..Default::default()
            },
        );
        let expanded = &value["children"][1];
        assert_eq!(expanded["type"], "frame");
        assert_eq!(expanded["id"], "chip_2");
        assert_eq!(expanded["children"][0]["id"], "chip_2/label");
    }

    #[test]
    fn rotation_round_trips_through_sign_flip() {
        let doc = parse_document(
            r##"{ "version": "2.6", "children": [
                { "id": "r", "type": "rectangle", "width": 10, "height": 10,
                  "rotation": 45 } ] }"##,
        )
        .unwrap();
        let value = emit_document_value(&doc, EmitOptions::default());
        assert_eq!(value["children"][0]["rotation"], 45.0);
    }
}
