//! Schema version migration.
//!
//! A monotonic chain of migrators brings any supported older document to
//! the current version before deserialization. Versions outside the chain
//! fail with `SchemaUnsupported`.

use crate::error::{Error, ErrorKind, Result};
use serde_json::Value;

pub const CURRENT_VERSION: &str = "2.6";

/// (from, to, transform) — applied in order until the version matches
/// `CURRENT_VERSION`.
const MIGRATORS: &[(&str, &str, fn(&mut Value))] = &[
    ("2.4", "2.5", migrate_2_4_to_2_5),
    ("2.5", "2.6", migrate_2_5_to_2_6),
];

/// Rewrite `doc` in place up to the current schema version.
pub fn migrate(doc: &mut Value) -> Result<()> {
    let mut version = doc
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(CURRENT_VERSION)
        .to_string();
    while version != CURRENT_VERSION {
        let Some(&(_, to, step)) = MIGRATORS.iter().find(|(from, _, _)| *from == version) else {
            return Err(Error::new(
                ErrorKind::SchemaUnsupported,
                format!("version {version}"),
            ));
        };
        log::debug!("migrating document {version} -> {to}");
        step(doc);
        version = to.to_string();
    }
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".into(), Value::String(CURRENT_VERSION.into()));
    }
    Ok(())
}

/// Apply `f` to every node object in the tree, depth first.
fn for_each_node(doc: &mut Value, f: &impl Fn(&mut serde_json::Map<String, Value>)) {
    fn walk(value: &mut Value, f: &impl Fn(&mut serde_json::Map<String, Value>)) {
        if let Some(children) = value.get_mut("children").and_then(Value::as_array_mut) {
            for child in children {
                walk(child, f);
            }
        }
        if let Some(descendants) = value.get_mut("descendants").and_then(Value::as_object_mut) {
            for (_, entry) in descendants.iter_mut() {
                walk(entry, f);
            }
        }
        if let Some(obj) = value.as_object_mut() {
            f(obj);
        }
    }
    walk(doc, f);
}

/// 2.4 → 2.5: the drop-shadow effect kind was renamed.
fn migrate_2_4_to_2_5(doc: &mut Value) {
    for_each_node(doc, &|node| {
        let Some(effects) = node.get_mut("effects").and_then(Value::as_array_mut) else {
            return;
        };
        for effect in effects {
            if effect.get("type").and_then(Value::as_str) == Some("drop_shadow") {
                effect["type"] = Value::String("shadow".into());
            }
        }
    });
}

/// 2.5 → 2.6: gradient geometry re-interpretation. `size.width` and
/// `size.height` swap so the axis length lives in `height`; for linear
/// gradients `center` moves from the start point to the midpoint, shifted
/// half the length along the axis (rotation is counter-clockwise degrees,
/// 0° pointing up). Non-linear gradients get the swap only.
fn migrate_2_5_to_2_6(doc: &mut Value) {
    for_each_node(doc, &|node| {
        let Some(fills) = node.get_mut("fills") else {
            return;
        };
        let fills: Vec<&mut Value> = match fills {
            Value::Array(items) => items.iter_mut().collect(),
            other => vec![other],
        };
        for fill in fills {
            if fill.get("type").and_then(Value::as_str) != Some("gradient") {
                continue;
            }
            let gradient_type = fill
                .get("gradientType")
                .and_then(Value::as_str)
                .unwrap_or("linear")
                .to_string();
            let (old_w, old_h) = match fill.get("size") {
                Some(size) => (
                    size.get("width").and_then(Value::as_f64).unwrap_or(0.0),
                    size.get("height").and_then(Value::as_f64).unwrap_or(0.0),
                ),
                None => continue,
            };
            fill["size"] = serde_json::json!({ "width": old_h, "height": old_w });

            if gradient_type == "linear" {
                let rotation = fill.get("rotation").and_then(Value::as_f64).unwrap_or(0.0);
                let theta = rotation.to_radians();
                let (cx, cy) = match fill.get("center") {
                    Some(c) => (
                        c.get("x").and_then(Value::as_f64).unwrap_or(0.0),
                        c.get("y").and_then(Value::as_f64).unwrap_or(0.0),
                    ),
                    None => (0.0, 0.0),
                };
                // Half the axis length along the gradient direction; 0°
                // points up, angles grow counter-clockwise.
                let half = old_w / 2.0;
                let nx = cx - theta.sin() * half;
                let ny = cy - theta.cos() * half;
                fill["center"] = serde_json::json!({ "x": nx, "y": ny });
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_version_passes_untouched() {
        let mut doc = json!({ "version": "2.6", "children": [] });
        migrate(&mut doc).unwrap();
        assert_eq!(doc["version"], "2.6");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut doc = json!({ "version": "1.0", "children": [] });
        let err = migrate(&mut doc).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SchemaUnsupported);
    }

    #[test]
    fn chain_runs_from_2_4() {
        let mut doc = json!({
            "version": "2.4",
            "children": [{
                "id": "r", "type": "rectangle",
                "effects": [{ "type": "drop_shadow", "color": "#000000",
                              "offset": { "x": 0, "y": 2 }, "blur": 4, "spread": 0 }],
                "fills": { "type": "gradient", "gradientType": "linear",
                           "center": { "x": 10.0, "y": 10.0 },
                           "size": { "width": 20.0, "height": 6.0 },
                           "rotation": 0.0,
                           "colors": [] }
            }]
        });
        migrate(&mut doc).unwrap();
        assert_eq!(doc["version"], "2.6");
        let node = &doc["children"][0];
        assert_eq!(node["effects"][0]["type"], "shadow");
        // Swap: height takes the old width (the axis length).
        assert_eq!(node["fills"]["size"]["height"], 20.0);
        assert_eq!(node["fills"]["size"]["width"], 6.0);
        // Linear center shifted half the length along 0° (up).
        assert_eq!(node["fills"]["center"]["x"], 10.0);
        assert_eq!(node["fills"]["center"]["y"], 0.0);
    }
}
