//! Deserialization: on-wire JSON → runtime `Document`.
//!
//! Every property goes through a typed converter (number-or-variable,
//! boolean-or-variable, color-or-variable, string-or-variable). Variable
//! references are `"$name"` strings; a reference of the wrong type is a
//! hard `TypeMismatch`. Unknown optional structure (a fill of an unknown
//! type, a stale descendant override) is downgraded to a warning.

use crate::document::Document;
use crate::error::{Error, ErrorKind, Result};
use crate::id::NodeId;
use crate::model::*;
use crate::prototype;
use crate::scene::{Node, NodeKind};
use crate::variable::{ThemeAxis, ThemeMap, ThemedValue, VarType, VarValue, VariableStore};
use kurbo::{BezPath, Point, Size, Vec2};
use petgraph::graph::NodeIndex;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Parse a wire document (after migration) into a fully reconciled
/// `Document`.
pub fn parse_document(input: &str) -> Result<Document> {
    let mut value: Value = serde_json::from_str(input)
        .map_err(|e| Error::new(ErrorKind::SchemaUnsupported, format!("malformed JSON: {e}")))?;
    super::migrate(&mut value)?;

    let mut doc = Document::new();
    if let Some(themes) = value.get("themes").and_then(Value::as_object) {
        doc.themes = read_themes(themes);
    }
    if let Some(vars) = value.get("variables").and_then(Value::as_object) {
        read_variables(&mut doc.vars, vars)?;
    }
    if let Some(children) = value.get("children").and_then(Value::as_array) {
        let viewport = doc.scene.viewport();
        let mut creating = HashSet::new();
        read_children(&mut doc, viewport, children, &mut creating)?;
    }

    let viewport = doc.scene.viewport();
    doc.subscribe_subtree(viewport);
    let theme = doc.viewport_theme();
    doc.scene.refresh_resolved_all(&doc.vars, &theme, true);
    crate::layout::run_layout(&mut doc.scene, viewport, doc.measurer.as_ref());
    Ok(doc)
}

fn read_themes(themes: &Map<String, Value>) -> Vec<ThemeAxis> {
    themes
        .iter()
        .map(|(axis, values)| ThemeAxis {
            axis: axis.clone(),
            values: values
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn read_variables(store: &mut VariableStore, vars: &Map<String, Value>) -> Result<()> {
    for (name, spec) in vars {
        let (ty, values) = parse_var_spec(spec, name)?;
        let id = store.add(name, ty)?;
        store.set_values(id, values);
    }
    Ok(())
}

/// Parse one wire variable spec (`{ type, value }`) into its type and
/// themed value list. The value is a scalar or an array of
/// `{ value, theme? }` arms.
pub fn parse_var_spec(spec: &Value, name: &str) -> Result<(VarType, Vec<ThemedValue>)> {
    let ty = spec
        .get("type")
        .and_then(Value::as_str)
        .and_then(VarType::from_wire)
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("variable {name}: bad type")))?;
    let values = match spec.get("value") {
        Some(Value::Array(arms)) => {
            let mut out = Vec::new();
            for arm in arms {
                let value = read_var_value(ty, arm.get("value").unwrap_or(&Value::Null), name)?;
                let theme = arm
                    .get("theme")
                    .and_then(Value::as_object)
                    .map(read_theme_map);
                out.push(ThemedValue { value, theme });
            }
            out
        }
        Some(scalar) => vec![ThemedValue::always(read_var_value(ty, scalar, name)?)],
        None => Vec::new(),
    };
    Ok((ty, values))
}

/// Build wire node entries as detached subtrees in `doc` (nothing is
/// attached to the viewport). Used by the clipboard for remote paste.
pub fn parse_fragment(doc: &mut Document, nodes: &[Value]) -> Result<Vec<NodeIndex>> {
    let mut creating = HashSet::new();
    let mut roots = Vec::new();
    for value in nodes {
        if let Some(idx) = read_node(doc, value, &mut creating)? {
            roots.push(idx);
        }
    }
    Ok(roots)
}

fn read_var_value(ty: VarType, value: &Value, name: &str) -> Result<VarValue> {
    let fail = || {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("variable {name}: value does not match {}", ty.wire_name()),
        )
    };
    Ok(match ty {
        VarType::Boolean => VarValue::Boolean(value.as_bool().ok_or_else(fail)?),
        VarType::Number => VarValue::Number(value.as_f64().ok_or_else(fail)?),
        VarType::Color => VarValue::Color(
            value
                .as_str()
                .and_then(Color::from_hex)
                .ok_or_else(fail)?,
        ),
        VarType::String => VarValue::String(value.as_str().ok_or_else(fail)?.to_string()),
    })
}

fn read_theme_map(obj: &Map<String, Value>) -> ThemeMap {
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

// ─── Tree ────────────────────────────────────────────────────────────────

fn read_children(
    doc: &mut Document,
    parent: NodeIndex,
    children: &[Value],
    creating: &mut HashSet<NodeId>,
) -> Result<()> {
    for child in children {
        if let Some(idx) = read_node(doc, child, creating)? {
            doc.scene.attach(idx, parent, None)?;
        }
    }
    Ok(())
}

/// Build one wire entry as a detached subtree. Connections land in
/// `doc.connections` and return `None`.
fn read_node(
    doc: &mut Document,
    value: &Value,
    creating: &mut HashSet<NodeId>,
) -> Result<Option<NodeIndex>> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::new(ErrorKind::InvalidPath, "node is not an object"))?;
    let id = NodeId::intern(
        obj.get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::new(ErrorKind::InvalidPath, "node without id"))?,
    );
    let ty = obj.get("type").and_then(Value::as_str).unwrap_or("frame");

    match ty {
        "connection" => {
            doc.connections.push(Connection {
                id,
                from: obj
                    .get("from")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                to: obj
                    .get("to")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                label: obj.get("label").and_then(Value::as_str).map(str::to_string),
            });
            Ok(None)
        }
        "ref" => read_ref(doc, id, obj, creating).map(Some),
        _ => {
            let kind = kind_from_type(ty, obj)
                .ok_or_else(|| Error::new(ErrorKind::SchemaUnsupported, format!("type {ty}")))?;
            let mut node = Node::new(id, kind);
            node.props = read_props(&doc.vars, obj, id)?;
            node.reusable = obj.get("reusable").and_then(Value::as_bool).unwrap_or(false);
            let idx = doc.scene.insert(node);
            if let Some(children) = obj.get("children").and_then(Value::as_array) {
                read_children(doc, idx, children, creating)?;
            }
            Ok(Some(idx))
        }
    }
}

fn kind_from_type(ty: &str, obj: &Map<String, Value>) -> Option<NodeKind> {
    Some(match ty {
        "frame" => NodeKind::Frame,
        "group" => NodeKind::Group,
        "rectangle" => NodeKind::Rectangle,
        "ellipse" => NodeKind::Ellipse,
        "line" => NodeKind::Line,
        "polygon" => NodeKind::Polygon {
            sides: obj.get("sides").and_then(Value::as_u64).unwrap_or(3) as u32,
        },
        "path" => NodeKind::Path {
            data: obj
                .get("d")
                .and_then(Value::as_str)
                .and_then(|d| BezPath::from_svg(d).ok())
                .unwrap_or_default(),
        },
        "text" => NodeKind::Text,
        "icon" | "icon_font" => NodeKind::Icon {
            glyph: obj
                .get("glyph")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        "note" => NodeKind::Note,
        "prompt" => NodeKind::Prompt,
        "context" => NodeKind::Context,
        _ => return None,
    })
}

// ─── Refs ────────────────────────────────────────────────────────────────

fn read_ref(
    doc: &mut Document,
    id: NodeId,
    obj: &Map<String, Value>,
    creating: &mut HashSet<NodeId>,
) -> Result<NodeIndex> {
    let path = obj
        .get("ref")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::new(ErrorKind::InvalidPath, format!("ref {id} without target")))?;
    let proto = doc.scene.node_by_path(path)?;
    let instance = prototype::instantiate(&mut doc.scene, proto, id, creating)?;

    if obj.get("reusable").and_then(Value::as_bool).unwrap_or(false) {
        doc.scene.node_mut(instance).reusable = true;
    }

    // Inline property overrides on the ref root.
    let props = read_props(&doc.vars, obj, id)?;
    doc.scene.node_mut(instance).props = props;

    // Explicit children replace the mirrored list wholesale.
    if let Some(children) = obj.get("children").and_then(Value::as_array) {
        if let Some(link) = &mut doc.scene.node_mut(instance).prototype {
            link.children_overridden = true;
        }
        for mirrored in doc.scene.children(instance).to_vec() {
            doc.scene.detach(mirrored)?;
            doc.free_detached_subtree(mirrored);
        }
        let filtered = elide_duplicate_first_child(children, id);
        read_children(doc, instance, &filtered, creating)?;
    }

    if let Some(descendants) = obj.get("descendants").and_then(Value::as_object) {
        for (dpath, entry) in descendants {
            apply_descendant_override(doc, instance, dpath, entry, creating)?;
        }
    }
    Ok(instance)
}

/// Legacy documents sometimes carry the instance pattern's first child
/// twice. When the first child's id reappears later in the list, the
/// first occurrence is dropped.
fn elide_duplicate_first_child(children: &[Value], ref_id: NodeId) -> Vec<Value> {
    let first_id = children
        .first()
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str);
    if let Some(first_id) = first_id {
        let repeated = children[1..]
            .iter()
            .any(|c| c.get("id").and_then(Value::as_str) == Some(first_id));
        if repeated {
            log::warn!("ref {ref_id}: eliding duplicated first child {first_id}");
            return children[1..].to_vec();
        }
    }
    children.to_vec()
}

fn apply_descendant_override(
    doc: &mut Document,
    instance: NodeIndex,
    dpath: &str,
    entry: &Value,
    creating: &mut HashSet<NodeId>,
) -> Result<()> {
    let segments: Vec<NodeId> = dpath.split('/').map(NodeId::intern).collect();
    let Some(target) = prototype::walk_canonical(&doc.scene, instance, &segments) else {
        log::warn!(
            "ref {}: descendant override {dpath} does not resolve, skipping",
            doc.scene.node(instance).id
        );
        return Ok(());
    };

    if entry.get("type").is_some() {
        // Structural override: the parsed subtree replaces the clone.
        let parent = doc.scene.parent(target).expect("descendant has a parent");
        let slot = doc.scene.position_of(parent, target).expect("attached");
        doc.scene.detach(target)?;
        doc.free_detached_subtree(target);
        if let Some(replacement) = read_node(doc, entry, creating)? {
            doc.scene.node_mut(replacement).is_unique = true;
            doc.scene.attach(replacement, parent, Some(slot))?;
        }
    } else {
        let obj = entry.as_object().ok_or_else(|| {
            Error::new(ErrorKind::InvalidOverridePath, format!("{dpath}: not an object"))
        })?;
        let id = doc.scene.node(target).id;
        let props = read_props(&doc.vars, obj, id)?;
        for key in props.set_keys() {
            doc.scene
                .node_mut(target)
                .props
                .copy_key_from(&props, key);
        }
    }
    Ok(())
}

// ─── Properties ──────────────────────────────────────────────────────────

/// Read the shared property bag out of a node object. Fields absent from
/// the wire stay unset (instances fall back to their prototype).
fn read_props(vars: &VariableStore, obj: &Map<String, Value>, id: NodeId) -> Result<Properties> {
    let mut p = Properties::default();
    let ctx = id.as_str();

    if let Some(v) = obj.get("x") {
        p.x = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("y") {
        p.y = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("width") {
        p.width = Some(read_size(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("height") {
        p.height = Some(read_size(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("rotation") {
        // Wire: clockwise degrees. Internal: counter-clockwise radians.
        let deg = match num_or_var(vars, v, ctx)? {
            Prop::Value(d) => Prop::Value(-d.to_radians()),
            var => var,
        };
        p.rotation = Some(deg);
    }
    if let Some(v) = obj.get("flipX") {
        p.flip_x = Some(bool_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("flipY") {
        p.flip_y = Some(bool_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("fills") {
        p.fills = Some(read_fills(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("stroke") {
        p.stroke = Some(read_stroke(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("effects").and_then(Value::as_array) {
        p.effects = Some(v.iter().filter_map(|e| read_effect(e, ctx)).collect());
    }
    if let Some(v) = obj.get("opacity") {
        p.opacity = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("cornerRadius") {
        p.corner_radius = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("mode").and_then(Value::as_str) {
        p.direction = Some(match v {
            "horizontal" => Direction::Horizontal,
            "vertical" => Direction::Vertical,
            _ => Direction::None,
        });
    }
    if let Some(v) = obj.get("padding") {
        p.padding = Some(read_padding(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("childSpacing") {
        p.child_spacing = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("justifyContent").and_then(Value::as_str) {
        p.justify_content = Some(match v {
            "center" => JustifyContent::Center,
            "end" => JustifyContent::End,
            "space_between" => JustifyContent::SpaceBetween,
            "space_around" => JustifyContent::SpaceAround,
            _ => JustifyContent::Start,
        });
    }
    if let Some(v) = obj.get("alignItems").and_then(Value::as_str) {
        p.align_items = Some(match v {
            "center" => AlignItems::Center,
            "end" => AlignItems::End,
            _ => AlignItems::Start,
        });
    }
    if let Some(v) = obj.get("includeStroke") {
        p.include_stroke = Some(bool_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("content") {
        p.content = Some(string_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("fontFamily") {
        p.font_family = Some(string_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("fontWeight") {
        p.font_weight = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("fontStyle") {
        p.font_style = Some(string_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("fontSize") {
        p.font_size = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("lineHeight") {
        p.line_height = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("letterSpacing") {
        p.letter_spacing = Some(num_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("textAlign").and_then(Value::as_str) {
        p.text_align = Some(match v {
            "center" => TextAlign::Center,
            "right" => TextAlign::Right,
            _ => TextAlign::Left,
        });
    }
    if let Some(v) = obj.get("textAlignVertical").and_then(Value::as_str) {
        p.text_align_vertical = Some(match v {
            "middle" => TextVAlign::Middle,
            "bottom" => TextVAlign::Bottom,
            _ => TextVAlign::Top,
        });
    }
    if let Some(v) = obj.get("textGrowth").and_then(Value::as_str) {
        p.text_growth = Some(match v {
            "fixed-width" => TextGrowth::FixedWidth,
            "fixed-width-height" => TextGrowth::FixedWidthHeight,
            _ => TextGrowth::Auto,
        });
    }
    if let Some(v) = obj.get("name") {
        p.name = Some(string_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("context") {
        p.context = Some(string_or_var(vars, v, ctx)?);
    }
    if let Some(v) = obj.get("theme").and_then(Value::as_object) {
        p.theme = Some(read_theme_map(v));
    }
    if let Some(v) = obj.get("metadata") {
        p.metadata = Some(v.clone());
    }
    if let Some(v) = obj.get("enabled") {
        p.enabled = Some(bool_or_var(vars, v, ctx)?);
    }
    Ok(p)
}

// ─── Typed converters ────────────────────────────────────────────────────

fn var_ref(value: &Value) -> Option<&str> {
    value.as_str().and_then(|s| s.strip_prefix('$'))
}

fn num_or_var(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Prop<f64>> {
    if let Some(name) = var_ref(value) {
        return Ok(Prop::Var(vars.lookup_typed(name, VarType::Number).map_err(
            |e| Error::new(e.kind, format!("{ctx}: {}", e.context)),
        )?));
    }
    value
        .as_f64()
        .map(Prop::Value)
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("{ctx}: expected number")))
}

fn bool_or_var(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Prop<bool>> {
    if let Some(name) = var_ref(value) {
        return Ok(Prop::Var(vars.lookup_typed(name, VarType::Boolean).map_err(
            |e| Error::new(e.kind, format!("{ctx}: {}", e.context)),
        )?));
    }
    value
        .as_bool()
        .map(Prop::Value)
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("{ctx}: expected boolean")))
}

fn string_or_var(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Prop<String>> {
    if let Some(name) = var_ref(value) {
        return Ok(Prop::Var(vars.lookup_typed(name, VarType::String).map_err(
            |e| Error::new(e.kind, format!("{ctx}: {}", e.context)),
        )?));
    }
    value
        .as_str()
        .map(|s| Prop::Value(s.to_string()))
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("{ctx}: expected string")))
}

fn color_or_var(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Prop<Color>> {
    if let Some(name) = var_ref(value) {
        return Ok(Prop::Var(vars.lookup_typed(name, VarType::Color).map_err(
            |e| Error::new(e.kind, format!("{ctx}: {}", e.context)),
        )?));
    }
    value
        .as_str()
        .and_then(Color::from_hex)
        .map(Prop::Value)
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("{ctx}: expected color")))
}

/// `width` / `height`: a number, a `$variable`, or a sizing string —
/// `fit_content`, `fill_container`, optionally with a `(fallback)`.
fn read_size(vars: &VariableStore, value: &Value, ctx: &str) -> Result<SizeSpec> {
    if let Some(s) = value.as_str() {
        if !s.starts_with('$') {
            let (behavior, rest) = if let Some(rest) = s.strip_prefix("fit_content") {
                (SizingBehavior::FitContent, rest)
            } else if let Some(rest) = s.strip_prefix("fill_container") {
                (SizingBehavior::FillContainer, rest)
            } else {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!("{ctx}: bad sizing string {s:?}"),
                ));
            };
            let fallback = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .and_then(|r| r.trim().parse::<f64>().ok());
            return Ok(SizeSpec {
                behavior,
                value: fallback.map(Prop::Value),
            });
        }
    }
    Ok(SizeSpec {
        behavior: SizingBehavior::Fixed,
        value: Some(num_or_var(vars, value, ctx)?),
    })
}

fn read_padding(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Padding> {
    match value {
        Value::Array(sides) if sides.len() == 4 => Ok([
            num_or_var(vars, &sides[0], ctx)?,
            num_or_var(vars, &sides[1], ctx)?,
            num_or_var(vars, &sides[2], ctx)?,
            num_or_var(vars, &sides[3], ctx)?,
        ]),
        single => {
            let all = num_or_var(vars, single, ctx)?;
            Ok([all.clone(), all.clone(), all.clone(), all])
        }
    }
}

fn read_fills(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Vec<Fill>> {
    let items: Vec<&Value> = match value {
        Value::Array(a) => a.iter().collect(),
        single => vec![single],
    };
    let mut out = Vec::new();
    for item in items {
        if let Some(fill) = read_fill(vars, item, ctx)? {
            out.push(fill);
        }
    }
    Ok(out)
}

fn read_fill(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Option<Fill>> {
    // String shorthand: a solid color (or color variable).
    if value.is_string() {
        return Ok(Some(Fill {
            paint: Paint::Solid(color_or_var(vars, value, ctx)?),
            opacity: 1.0,
            enabled: true,
            blend_mode: None,
        }));
    }
    let Some(obj) = value.as_object() else {
        log::warn!("{ctx}: fill is neither string nor object, skipping");
        return Ok(None);
    };
    let enabled = obj.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    let opacity = obj.get("opacity").and_then(Value::as_f64).unwrap_or(1.0);
    let blend_mode = obj
        .get("blendMode")
        .and_then(Value::as_str)
        .map(str::to_string);

    let paint = match obj.get("type").and_then(Value::as_str) {
        Some("color") => Paint::Solid(color_or_var(
            vars,
            obj.get("color").unwrap_or(&Value::Null),
            ctx,
        )?),
        Some("gradient") => {
            let kind = match obj.get("gradientType").and_then(Value::as_str) {
                Some("radial") => GradientKind::Radial,
                Some("angular") => GradientKind::Angular,
                _ => GradientKind::Linear,
            };
            let center = obj
                .get("center")
                .map(|c| {
                    Point::new(
                        c.get("x").and_then(Value::as_f64).unwrap_or(0.5),
                        c.get("y").and_then(Value::as_f64).unwrap_or(0.5),
                    )
                })
                .unwrap_or(Point::new(0.5, 0.5));
            let size = obj
                .get("size")
                .map(|s| {
                    Size::new(
                        s.get("width").and_then(Value::as_f64).unwrap_or(1.0),
                        s.get("height").and_then(Value::as_f64).unwrap_or(1.0),
                    )
                })
                .unwrap_or(Size::new(1.0, 1.0));
            let rotation = obj.get("rotation").and_then(Value::as_f64).unwrap_or(0.0);
            let stops = obj
                .get("colors")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|stop| {
                            let color = stop
                                .get("color")
                                .and_then(Value::as_str)
                                .and_then(Color::from_hex)?;
                            let position =
                                stop.get("position").and_then(Value::as_f64).unwrap_or(0.0);
                            Some(GradientStop { color, position })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Paint::Gradient {
                kind,
                center,
                size,
                rotation,
                stops,
            }
        }
        Some("image") => Paint::Image {
            url: obj
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            mode: match obj.get("mode").and_then(Value::as_str) {
                Some("fit") => ImageMode::Fit,
                Some("stretch") => ImageMode::Stretch,
                _ => ImageMode::Fill,
            },
        },
        Some("mesh_gradient") => Paint::Mesh {
            columns: obj.get("columns").and_then(Value::as_u64).unwrap_or(2) as u32,
            rows: obj.get("rows").and_then(Value::as_u64).unwrap_or(2) as u32,
            points: obj
                .get("points")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(read_mesh_point).collect())
                .unwrap_or_default(),
            colors: obj
                .get("colors")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .filter_map(Color::from_hex)
                        .collect()
                })
                .unwrap_or_default(),
        },
        other => {
            log::warn!("{ctx}: unknown fill type {other:?}, skipping");
            return Ok(None);
        }
    };
    Ok(Some(Fill {
        paint,
        opacity,
        enabled,
        blend_mode,
    }))
}

/// Mesh points come in two shapes: a bare `[x, y]` pair, or a full object
/// with a `position` and optional per-side handles.
fn read_mesh_point(value: &Value) -> Option<MeshPoint> {
    if let Some(pair) = value.as_array() {
        if pair.len() == 2 {
            return Some(MeshPoint::at(Point::new(
                pair[0].as_f64()?,
                pair[1].as_f64()?,
            )));
        }
        return None;
    }
    let obj = value.as_object()?;
    let read_point = |v: &Value| -> Option<Point> {
        let arr = v.as_array()?;
        Some(Point::new(arr.first()?.as_f64()?, arr.get(1)?.as_f64()?))
    };
    let position = read_point(obj.get("position")?)?;
    Some(MeshPoint {
        position,
        left_handle: obj.get("leftHandle").and_then(read_point),
        right_handle: obj.get("rightHandle").and_then(read_point),
        top_handle: obj.get("topHandle").and_then(read_point),
        bottom_handle: obj.get("bottomHandle").and_then(read_point),
    })
}

fn read_stroke(vars: &VariableStore, value: &Value, ctx: &str) -> Result<Stroke> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::new(ErrorKind::TypeMismatch, format!("{ctx}: stroke object")))?;
    let paint = Paint::Solid(color_or_var(
        vars,
        obj.get("color").unwrap_or(&Value::String("#000000".into())),
        ctx,
    )?);
    let width = match obj.get("width") {
        Some(v) => num_or_var(vars, v, ctx)?,
        None => Prop::Value(1.0),
    };
    let align = match obj.get("align").and_then(Value::as_str) {
        Some("inside") => StrokeAlign::Inside,
        Some("outside") => StrokeAlign::Outside,
        _ => StrokeAlign::Center,
    };
    Ok(Stroke { paint, width, align })
}

fn read_effect(value: &Value, ctx: &str) -> Option<Effect> {
    let obj = value.as_object()?;
    let enabled = obj.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    match obj.get("type").and_then(Value::as_str) {
        Some("blur") => Some(Effect::Blur {
            radius: obj.get("radius").and_then(Value::as_f64).unwrap_or(0.0),
            enabled,
        }),
        Some("background_blur") => Some(Effect::BackgroundBlur {
            radius: obj.get("radius").and_then(Value::as_f64).unwrap_or(0.0),
            enabled,
        }),
        Some("shadow") => Some(Effect::DropShadow {
            color: obj
                .get("color")
                .and_then(Value::as_str)
                .and_then(Color::from_hex)
                .unwrap_or(Color::BLACK),
            offset: obj
                .get("offset")
                .map(|o| {
                    Vec2::new(
                        o.get("x").and_then(Value::as_f64).unwrap_or(0.0),
                        o.get("y").and_then(Value::as_f64).unwrap_or(0.0),
                    )
                })
                .unwrap_or(Vec2::ZERO),
            blur: obj.get("blur").and_then(Value::as_f64).unwrap_or(0.0),
            spread: obj.get("spread").and_then(Value::as_f64).unwrap_or(0.0),
            blend_mode: obj
                .get("blendMode")
                .and_then(Value::as_str)
                .map(str::to_string),
            enabled,
        }),
        other => {
            log::warn!("{ctx}: unknown effect type {other:?}, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let doc = parse_document(
            r##"{
                "version": "2.6",
                "children": [
                    { "id": "hero", "type": "frame", "x": 0, "y": 0,
                      "width": 200, "height": 100, "fills": "#202020",
                      "children": [
                          { "id": "title", "type": "text", "content": "Hello",
                            "fontSize": 20 }
                      ] }
                ]
            }"##,
        )
        .unwrap();
        let hero = doc.scene.node_by_path("hero").unwrap();
        assert_eq!(doc.scene.node(hero).resolved.width, 200.0);
        let title = doc.scene.node_by_path("hero/title").unwrap();
        assert_eq!(doc.scene.node(title).resolved.content, "Hello");
    }

    #[test]
    fn variable_references_resolve_by_type() {
        let doc = parse_document(
            r##"{
                "version": "2.6",
                "themes": { "mode": ["light", "dark"] },
                "variables": {
                    "accent": { "type": "color", "value": [
                        { "value": "#FF0000" },
                        { "value": "#0000FF", "theme": { "mode": "dark" } }
                    ] }
                },
                "children": [
                    { "id": "box", "type": "rectangle", "width": 10, "height": 10,
                      "fills": "$accent" }
                ]
            }"##,
        )
        .unwrap();
        let box_idx = doc.scene.node_by_path("box").unwrap();
        let fills = &doc.scene.node(box_idx).resolved.fills;
        match &fills[0].paint {
            Paint::Solid(Prop::Value(c)) => assert_eq!(c.to_hex(), "#FF0000"),
            other => panic!("expected resolved solid fill, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_variable_reference_fails() {
        let err = parse_document(
            r##"{
                "version": "2.6",
                "variables": { "gap": { "type": "number", "value": 8 } },
                "children": [
                    { "id": "box", "type": "rectangle", "width": 10, "height": 10,
                      "fills": "$gap" }
                ]
            }"##,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn refs_expand_with_overrides() {
        let doc = parse_document(
            r##"{
                "version": "2.6",
                "children": [
                    { "id": "button", "type": "frame", "width": 100, "height": 40,
                      "reusable": true,
                      "children": [
                          { "id": "label", "type": "text", "content": "OK" }
                      ] },
                    { "id": "cancel", "type": "ref", "ref": "button",
                      "width": 120,
                      "descendants": {
                          "label": { "content": "Cancel" }
                      } }
                ]
            }"##,
        )
        .unwrap();
        let inst = doc.scene.node_by_path("cancel").unwrap();
        assert_eq!(doc.scene.node(inst).resolved.width, 120.0);
        // Height falls back to the prototype.
        assert_eq!(doc.scene.node(inst).resolved.height, 40.0);
        let label = doc.scene.node_by_path("cancel/label").unwrap();
        assert_eq!(doc.scene.node(label).resolved.content, "Cancel");
    }

    #[test]
    fn rotation_converts_sign_and_unit() {
        let doc = parse_document(
            r##"{ "version": "2.6", "children": [
                { "id": "r", "type": "rectangle", "width": 10, "height": 10,
                  "rotation": 90 } ] }"##,
        )
        .unwrap();
        let idx = doc.scene.node_by_path("r").unwrap();
        let rot = doc.scene.node(idx).resolved.rotation;
        assert!((rot + std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn sizing_strings_parse_with_fallbacks() {
        let vars = VariableStore::new();
        let spec = read_size(&vars, &Value::String("fit_content(24)".into()), "t").unwrap();
        assert_eq!(spec.behavior, SizingBehavior::FitContent);
        assert_eq!(spec.value, Some(Prop::Value(24.0)));

        let spec = read_size(&vars, &Value::String("fill_container".into()), "t").unwrap();
        assert_eq!(spec.behavior, SizingBehavior::FillContainer);
        assert!(spec.value.is_none());

        assert!(read_size(&vars, &Value::String("bogus".into()), "t").is_err());
    }
}
