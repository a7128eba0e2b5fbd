//! Clipboard core: subtree copy and paste.
//!
//! A payload carries both addresses of the live subtrees (for same-session
//! paste) and a self-contained wire form (for paste into another
//! document). Local paste duplicates the live subtrees; remote paste
//! imports themes and variables first — renaming on conflict — then
//! rebuilds the nodes through the wire bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vd_core::wire::emitter::{emit_subtree, EmitOptions};
use vd_core::wire::parser::{parse_fragment, parse_var_spec};
use vd_core::{Document, NodeId, NodeIndex, Result, ThemeAxis};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipboardPayload {
    /// The copying session; local paste requires a match.
    pub source: String,
    /// Paths of the copied subtrees in the source document.
    #[serde(rename = "localData")]
    pub local_data: Vec<String>,
    /// Self-contained wire form for cross-document paste.
    #[serde(rename = "remoteData")]
    pub remote_data: RemoteData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteData {
    pub themes: Value,
    pub variables: Value,
    pub nodes: Vec<Value>,
}

/// Capture the selection into a payload.
pub fn copy(doc: &Document, paths: &[String], session: &str) -> Result<ClipboardPayload> {
    let mut nodes = Vec::with_capacity(paths.len());
    for path in paths {
        let idx = doc.scene.node_by_path(path)?;
        nodes.push(emit_subtree(
            &doc.scene,
            &doc.vars,
            idx,
            EmitOptions::default(),
        ));
    }
    let document = vd_core::wire::emit_document_value(doc, EmitOptions::default());
    Ok(ClipboardPayload {
        source: session.to_string(),
        local_data: paths.to_vec(),
        remote_data: RemoteData {
            themes: document.get("themes").cloned().unwrap_or(Value::Null),
            variables: document.get("variables").cloned().unwrap_or(Value::Null),
            nodes,
        },
    })
}

/// Paste a payload under `parent`, returning the new roots.
pub fn paste(
    doc: &mut Document,
    payload: &ClipboardPayload,
    session: &str,
    parent: NodeIndex,
) -> Result<Vec<NodeIndex>> {
    let local = payload.source == session
        && !payload.local_data.is_empty()
        && payload
            .local_data
            .iter()
            .all(|path| doc.scene.node_by_path(path).is_ok());
    if local {
        paste_local(doc, &payload.local_data)
    } else {
        paste_remote(doc, &payload.remote_data, parent)
    }
}

fn paste_local(doc: &mut Document, paths: &[String]) -> Result<Vec<NodeIndex>> {
    let sources: Vec<NodeIndex> = paths
        .iter()
        .map(|p| doc.scene.node_by_path(p))
        .collect::<Result<_>>()?;
    let mut block = doc.begin_update()?;
    let mut pasted = Vec::with_capacity(sources.len());
    for source in sources {
        match block.duplicate(source) {
            Ok(idx) => pasted.push(idx),
            Err(err) => {
                block.rollback();
                return Err(err);
            }
        }
    }
    block.commit(true)?;
    Ok(pasted)
}

fn paste_remote(doc: &mut Document, remote: &RemoteData, parent: NodeIndex) -> Result<Vec<NodeIndex>> {
    let mut nodes = remote.nodes.clone();

    // Themes merge by axis; a conflicting axis is imported under a fresh
    // name and the pasted nodes' overrides follow it.
    let mut themes = doc.themes.clone();
    if let Some(incoming) = remote.themes.as_object() {
        for (axis, values) in incoming {
            let values: Vec<String> = values
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let existing = themes.iter().find(|t| &t.axis == axis).map(|t| t.values.clone());
            match existing {
                None => themes.push(ThemeAxis {
                    axis: axis.clone(),
                    values,
                }),
                Some(current) if current == values => {}
                Some(_) => {
                    let renamed = free_name(axis, |candidate| {
                        themes.iter().all(|t| t.axis != candidate)
                    });
                    log::warn!("paste: theme axis {axis} conflicts, importing as {renamed}");
                    rename_theme_axis(&mut nodes, axis, &renamed);
                    themes.push(ThemeAxis {
                        axis: renamed,
                        values,
                    });
                }
            }
        }
    }

    // Variables with a matching name and type are shared; a name held by
    // a different type is imported under a fresh name.
    let mut imports = Vec::new();
    if let Some(incoming) = remote.variables.as_object() {
        for (name, spec) in incoming {
            let (ty, values) = parse_var_spec(spec, name)?;
            match doc.vars.lookup(name) {
                Some(existing) if doc.vars.var(existing).ty == ty => {}
                None => imports.push((name.clone(), ty, values)),
                Some(_) => {
                    let renamed = free_name(name, |candidate| doc.vars.lookup(candidate).is_none());
                    log::warn!("paste: variable {name} conflicts by type, importing as {renamed}");
                    rename_variable_refs(&mut nodes, name, &renamed);
                    imports.push((renamed, ty, values));
                }
            }
        }
    }

    // First block: bring themes and variables in (no undo entry of its
    // own — the paste is the undoable step).
    if themes != doc.themes || !imports.is_empty() {
        let mut block = doc.begin_update()?;
        let outcome = (|| -> Result<()> {
            if themes != block.document().themes {
                block.set_themes(themes.clone())?;
            }
            for (name, ty, values) in &imports {
                block.add_variable(name, *ty)?;
                block.set_variable(name, values.clone())?;
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => block.commit(false)?,
            Err(err) => {
                block.rollback();
                return Err(err);
            }
        }
    }

    // Build detached subtrees through the bridge, then attach them in one
    // undoable block.
    let roots = parse_fragment(doc, &nodes)?;
    let mut block = doc.begin_update()?;
    let outcome = (|| -> Result<Vec<NodeIndex>> {
        let mut pasted = Vec::with_capacity(roots.len());
        for root in roots {
            let taken: Vec<NodeId> = block
                .document()
                .scene
                .children(parent)
                .iter()
                .map(|&c| block.document().scene.node(c).id)
                .collect();
            let id = block.document().scene.node(root).id.dedup_against(&taken);
            if id != block.document().scene.node(root).id {
                block.set_detached_id(root, id);
            }
            pasted.push(block.add_subtree(root, parent, None)?);
        }
        Ok(pasted)
    })();
    match outcome {
        Ok(pasted) => {
            block.commit(true)?;
            Ok(pasted)
        }
        Err(err) => {
            block.rollback();
            Err(err)
        }
    }
}

fn free_name(base: &str, is_free: impl Fn(&str) -> bool) -> String {
    for n in 2u32.. {
        let candidate = format!("{base}_{n}");
        if is_free(&candidate) {
            return candidate;
        }
    }
    unreachable!("u32 suffix space exhausted");
}

/// Rewrite `"$old"` variable references inside wire values.
fn rename_variable_refs(nodes: &mut [Value], old: &str, new: &str) {
    let target = format!("${old}");
    let replacement = format!("${new}");
    for node in nodes.iter_mut() {
        rewrite_strings(node, &target, &replacement);
    }
}

fn rewrite_strings(value: &mut Value, target: &str, replacement: &str) {
    match value {
        Value::String(s) if s == target => *s = replacement.to_string(),
        Value::Array(items) => {
            for item in items {
                rewrite_strings(item, target, replacement);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_strings(item, target, replacement);
            }
        }
        _ => {}
    }
}

/// Rewrite node-level theme overrides when an axis was imported renamed.
fn rename_theme_axis(nodes: &mut [Value], old: &str, new: &str) {
    fn walk(value: &mut Value, old: &str, new: &str) {
        if let Some(obj) = value.as_object_mut() {
            if let Some(theme) = obj.get_mut("theme").and_then(Value::as_object_mut) {
                if let Some(v) = theme.remove(old) {
                    theme.insert(new.to_string(), v);
                }
            }
            if let Some(children) = obj.get_mut("children").and_then(Value::as_array_mut) {
                for child in children {
                    walk(child, old, new);
                }
            }
            if let Some(descendants) = obj.get_mut("descendants").and_then(Value::as_object_mut) {
                for (_, entry) in descendants.iter_mut() {
                    walk(entry, old, new);
                }
            }
        }
    }
    for node in nodes.iter_mut() {
        walk(node, old, new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vd_core::wire::parse_document;

    fn sample_doc() -> Document {
        parse_document(
            r##"{ "version": "2.6",
                "themes": { "mode": ["light", "dark"] },
                "variables": { "accent": { "type": "color", "value": "#FF0000" } },
                "children": [
                    { "id": "card", "type": "frame", "width": 100, "height": 60,
                      "fills": "$accent",
                      "children": [
                          { "id": "label", "type": "text", "content": "hi" } ] } ] }"##,
        )
        .unwrap()
    }

    #[test]
    fn local_paste_duplicates_subtrees() {
        let mut doc = sample_doc();
        let payload = copy(&doc, &["card".to_string()], "session-1").unwrap();
        let viewport = doc.scene.viewport();
        let pasted = paste(&mut doc, &payload, "session-1", viewport).unwrap();
        assert_eq!(pasted.len(), 1);

        let vp = doc.scene.viewport();
        assert_eq!(doc.scene.children(vp).len(), 2);
        let copy_idx = pasted[0];
        assert_ne!(doc.scene.node(copy_idx).id.as_str(), "card");
        assert_eq!(doc.scene.children(copy_idx).len(), 1);
    }

    #[test]
    fn remote_paste_imports_variables() {
        let doc = sample_doc();
        let payload = copy(&doc, &["card".to_string()], "session-1").unwrap();

        let mut other = Document::new();
        let vp = other.scene.viewport();
        let pasted = paste(&mut other, &payload, "session-2", vp).unwrap();
        assert_eq!(pasted.len(), 1);
        assert!(other.vars.lookup("accent").is_some());
        assert_eq!(other.themes.len(), 1);

        // The pasted fill resolves through the imported variable.
        let fills = &other.scene.node(pasted[0]).resolved.fills;
        match &fills[0].paint {
            vd_core::Paint::Solid(vd_core::Prop::Value(c)) => {
                assert_eq!(c.to_hex(), "#FF0000");
            }
            other => panic!("expected resolved solid, got {other:?}"),
        }
    }

    #[test]
    fn remote_paste_renames_conflicting_variable_types() {
        let doc = sample_doc();
        let payload = copy(&doc, &["card".to_string()], "session-1").unwrap();

        let mut other = parse_document(
            r##"{ "version": "2.6",
                "variables": { "accent": { "type": "number", "value": 4 } },
                "children": [] }"##,
        )
        .unwrap();
        let vp = other.scene.viewport();
        paste(&mut other, &payload, "session-2", vp).unwrap();

        // The number-typed "accent" survives; the color came in renamed.
        assert!(other.vars.lookup_typed("accent", vd_core::VarType::Number).is_ok());
        assert!(other.vars.lookup_typed("accent_2", vd_core::VarType::Color).is_ok());
    }

    #[test]
    fn pasted_root_ids_stay_unique() {
        let mut doc = sample_doc();
        let payload = copy(&doc, &["card".to_string()], "session-1").unwrap();
        // Different session forces the remote path into the same document.
        let vp = doc.scene.viewport();
        let pasted = paste(&mut doc, &payload, "session-2", vp).unwrap();
        assert_eq!(doc.scene.node(pasted[0]).id.as_str(), "card_2");
    }
}
