//! Prototype/instance graph: by-reference instancing with overrides.
//!
//! An instance node carries a non-owning link to its prototype; every
//! unset property falls back to the prototype's bag (see
//! `Scene::props_chain`). Instantiation mirrors the prototype's subtree —
//! each mirrored descendant links to its prototype counterpart, so
//! per-descendant fallback and rebuild work at any depth. Structure must
//! stay identical to the prototype until `children_overridden` flips.

use crate::error::{Error, ErrorKind, Result};
use crate::id::NodeId;
use crate::model::Properties;
use crate::scene::{Node, NodeKind, PrototypeLink, Scene};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

/// Link `node` to `proto` and register the back-reference. Fails with
/// `ReferenceCycle` when the link would make a node its own (transitive)
/// prototype or pull a prototype inside its own instance.
pub fn attach_to_prototype(
    scene: &mut Scene,
    node: NodeIndex,
    proto: NodeIndex,
    children_overridden: bool,
) -> Result<()> {
    if node == proto || scene.is_ancestor_of(node, proto) {
        return Err(Error::new(
            ErrorKind::ReferenceCycle,
            scene.node(node).id.as_str(),
        ));
    }
    let mut cur = proto;
    while let Some(link) = &scene.node(cur).prototype {
        if link.target == node {
            return Err(Error::new(
                ErrorKind::ReferenceCycle,
                scene.node(node).id.as_str(),
            ));
        }
        cur = link.target;
    }

    let mut link = PrototypeLink::new(proto);
    link.children_overridden = children_overridden;
    scene.node_mut(node).prototype = Some(link);
    if !scene.node(proto).instances.contains(&node) {
        scene.node_mut(proto).instances.push(node);
    }
    Ok(())
}

/// Remove the prototype link and back-reference, returning the old link
/// for the journal.
pub fn detach_from_prototype(scene: &mut Scene, node: NodeIndex) -> Option<PrototypeLink> {
    let link = scene.node_mut(node).prototype.take()?;
    if scene.contains(link.target) {
        scene.node_mut(link.target).instances.retain(|i| *i != node);
    }
    Some(link)
}

/// Build a detached instance of `proto` with the given root id. The root
/// gets the prototype link; every descendant is mirrored with a link to
/// its own counterpart. `creating` guards recursive expansion against
/// reference cycles (re-entry on an id already being created fails).
pub fn instantiate(
    scene: &mut Scene,
    proto: NodeIndex,
    id: NodeId,
    creating: &mut HashSet<NodeId>,
) -> Result<NodeIndex> {
    if !creating.insert(scene.node(proto).id) {
        return Err(Error::new(
            ErrorKind::ReferenceCycle,
            scene.node(proto).id.as_str(),
        ));
    }
    let root = mirror_node(scene, proto, Some(id));
    for child in scene.children(proto).to_vec() {
        let copy = mirror_subtree(scene, child)?;
        scene.attach(copy, root, None)?;
    }
    creating.remove(&scene.node(proto).id);
    Ok(root)
}

/// Mirror one prototype subtree into detached nodes, linking each copy to
/// its source.
pub fn mirror_subtree(scene: &mut Scene, src: NodeIndex) -> Result<NodeIndex> {
    let root = mirror_node(scene, src, None);
    for child in scene.children(src).to_vec() {
        let copy = mirror_subtree(scene, child)?;
        scene.attach(copy, root, None)?;
    }
    Ok(root)
}

fn mirror_node(scene: &mut Scene, src: NodeIndex, id: Option<NodeId>) -> NodeIndex {
    let src_node = scene.node(src);
    let mut node = Node::new(id.unwrap_or(src_node.id), src_node.kind.clone());
    let mut link = PrototypeLink::new(src);
    // A source that is itself an instance root makes the copy a boundary:
    // descendant paths continue with a second-level segment past it.
    link.is_instance_boundary = src_node.prototype.is_some();
    node.prototype = Some(link);
    let idx = scene.insert(node);
    scene.node_mut(src).instances.push(idx);
    idx
}

/// One serialized override: the canonical path of a descendant relative to
/// the instance root, its locally-set properties, and its overridden id
/// (when `is_unique`).
#[derive(Debug, Clone)]
pub struct SerializedOverride {
    pub path: Vec<NodeId>,
    pub props: Properties,
    pub unique_id: Option<NodeId>,
}

/// Collect the overrides carried by an instance's mirrored descendants,
/// keyed by canonical (prototype-id) paths. The instance root's own
/// overrides stay on the root and are not included.
pub fn serialize_overrides(scene: &Scene, instance: NodeIndex) -> Vec<SerializedOverride> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_overrides(scene, instance, &mut path, &mut out);
    out
}

fn collect_overrides(
    scene: &Scene,
    node: NodeIndex,
    path: &mut Vec<NodeId>,
    out: &mut Vec<SerializedOverride>,
) {
    for &child in scene.children(node) {
        if !scene.is_mirrored_child(child) {
            continue;
        }
        let child_node = scene.node(child);
        let link = child_node.prototype.as_ref().unwrap();
        path.push(scene.node(link.target).id);
        if !child_node.props.set_keys().is_empty() || child_node.is_unique {
            out.push(SerializedOverride {
                path: path.clone(),
                props: child_node.props.clone(),
                unique_id: child_node.is_unique.then_some(child_node.id),
            });
        }
        collect_overrides(scene, child, path, out);
        path.pop();
    }
}

/// Reapply serialized overrides after a rebuild. Overrides whose target
/// path vanished from the new structure are dropped with a warning — this
/// is the one place stale overrides are tolerated.
pub fn reapply_overrides(
    scene: &mut Scene,
    instance: NodeIndex,
    overrides: Vec<SerializedOverride>,
) {
    for over in overrides {
        let Some(target) = walk_canonical(scene, instance, &over.path) else {
            log::warn!(
                "dropping override at {} of {}: path no longer exists",
                join_path(&over.path),
                scene.node(instance).id,
            );
            continue;
        };
        let node = scene.node_mut(target);
        node.props = over.props;
        if let Some(id) = over.unique_id {
            node.id = id;
            node.is_unique = true;
        }
        node.resolved_dirty = true;
    }
}

/// Resolve a canonical (prototype-id) path below an instance root. Returns
/// `None` when any segment is missing.
pub fn walk_canonical(scene: &Scene, instance: NodeIndex, path: &[NodeId]) -> Option<NodeIndex> {
    let mut cur = instance;
    for &segment in path {
        cur = scene.children(cur).iter().copied().find(|&c| {
            let node = scene.node(c);
            match &node.prototype {
                Some(link) if scene.contains(link.target) => scene.node(link.target).id == segment,
                _ => node.id == segment,
            }
        })?;
    }
    Some(cur)
}

fn join_path(path: &[NodeId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check invariant 5: until `children_overridden`, an instance's child
/// list mirrors its prototype's (same count, same per-position prototype
/// identity and kind).
pub fn verify_instance_structure(scene: &Scene, instance: NodeIndex) -> Result<()> {
    let node = scene.node(instance);
    let Some(link) = &node.prototype else {
        return Ok(());
    };
    if link.children_overridden || !scene.contains(link.target) {
        return Ok(());
    }
    let proto = link.target;
    let own = scene.children(instance);
    let source = scene.children(proto);
    let mismatch = || {
        Error::new(
            ErrorKind::InstanceStructureMismatch,
            scene.path_of(instance),
        )
    };
    if own.len() != source.len() {
        return Err(mismatch());
    }
    for (&child, &proto_child) in own.iter().zip(source) {
        let child_node = scene.node(child);
        let linked = child_node
            .prototype
            .as_ref()
            .map_or(false, |l| l.target == proto_child);
        if !linked || !child_node.kind.same_type(&scene.node(proto_child).kind) {
            return Err(mismatch());
        }
    }
    Ok(())
}

/// Recompute an instance's overridden-key set: exactly the keys whose
/// current value differs from the prototype chain. Keys set to the
/// prototype's own value are cleared (the override evaporates).
pub fn reconcile_overrides(scene: &mut Scene, idx: NodeIndex) {
    let Some(link) = scene.node(idx).prototype.clone() else {
        return;
    };
    if !scene.contains(link.target) {
        return;
    }
    let mut cleared = Vec::new();
    {
        let node = scene.node(idx);
        let proto = scene.node(link.target);
        for key in node.props.set_keys() {
            if node.props.key_eq(&proto.props, key) {
                cleared.push(key);
            }
        }
    }
    let node = scene.node_mut(idx);
    for key in &cleared {
        node.props.clear_key(*key);
    }
    if !cleared.is_empty() {
        node.resolved_dirty = true;
    }
    let overridden = node.props.set_keys();
    if let Some(link) = &mut node.prototype {
        link.overridden = overridden;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Prop, SizeSpec};

    fn scene_with_proto() -> (Scene, NodeIndex) {
        let mut scene = Scene::new();
        let vp = scene.viewport();
        let proto = scene.insert(Node::new(NodeId::intern("button"), NodeKind::Frame));
        let label = scene.insert(Node::new(NodeId::intern("label"), NodeKind::Text));
        let bg = scene.insert(Node::new(NodeId::intern("bg"), NodeKind::Rectangle));
        scene.attach(proto, vp, None).unwrap();
        scene.attach(bg, proto, None).unwrap();
        scene.attach(label, proto, None).unwrap();
        scene.node_mut(proto).props.width = Some(SizeSpec::fixed(100.0));
        (scene, proto)
    }

    #[test]
    fn instantiate_mirrors_children() {
        let (mut scene, proto) = scene_with_proto();
        let vp = scene.viewport();
        let mut creating = HashSet::new();
        let inst =
            instantiate(&mut scene, proto, NodeId::intern("button_1"), &mut creating).unwrap();
        scene.attach(inst, vp, None).unwrap();

        assert_eq!(scene.children(inst).len(), 2);
        let first = scene.children(inst)[0];
        assert_eq!(scene.node(first).id.as_str(), "bg");
        assert!(scene.is_mirrored_child(first));
        assert!(scene.node(proto).instances.contains(&inst));
        verify_instance_structure(&scene, inst).unwrap();
    }

    #[test]
    fn cycle_links_are_rejected() {
        let (mut scene, proto) = scene_with_proto();
        let err = attach_to_prototype(&mut scene, proto, proto, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReferenceCycle);

        // a → b then b → a closes a loop through the link chain
        let vp = scene.viewport();
        let a = scene.insert(Node::new(NodeId::intern("a"), NodeKind::Frame));
        let b = scene.insert(Node::new(NodeId::intern("b"), NodeKind::Frame));
        scene.attach(a, vp, None).unwrap();
        scene.attach(b, vp, None).unwrap();
        attach_to_prototype(&mut scene, a, b, false).unwrap();
        let err = attach_to_prototype(&mut scene, b, a, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReferenceCycle);
    }

    #[test]
    fn structure_mismatch_detected() {
        let (mut scene, proto) = scene_with_proto();
        let vp = scene.viewport();
        let mut creating = HashSet::new();
        let inst =
            instantiate(&mut scene, proto, NodeId::intern("button_1"), &mut creating).unwrap();
        scene.attach(inst, vp, None).unwrap();

        let extra = scene.insert(Node::new(NodeId::intern("extra"), NodeKind::Rectangle));
        scene.attach(extra, inst, None).unwrap();
        let err = verify_instance_structure(&scene, inst).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InstanceStructureMismatch);

        // Flipping children_overridden legitimizes the divergence.
        scene
            .node_mut(inst)
            .prototype
            .as_mut()
            .unwrap()
            .children_overridden = true;
        verify_instance_structure(&scene, inst).unwrap();
    }

    #[test]
    fn overrides_survive_serialize_reapply() {
        let (mut scene, proto) = scene_with_proto();
        let vp = scene.viewport();
        let mut creating = HashSet::new();
        let inst =
            instantiate(&mut scene, proto, NodeId::intern("button_1"), &mut creating).unwrap();
        scene.attach(inst, vp, None).unwrap();

        let label = walk_canonical(&scene, inst, &[NodeId::intern("label")]).unwrap();
        scene.node_mut(label).props.opacity = Some(Prop::Value(0.5));

        let overrides = serialize_overrides(&scene, inst);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].path, vec![NodeId::intern("label")]);

        // Wipe and reapply.
        scene.node_mut(label).props = Properties::default();
        reapply_overrides(&mut scene, inst, overrides);
        let label_node = scene.node(walk_canonical(&scene, inst, &[NodeId::intern("label")]).unwrap());
        assert_eq!(label_node.props.opacity, Some(Prop::Value(0.5)));
    }

    #[test]
    fn reconcile_drops_overrides_equal_to_prototype() {
        let (mut scene, proto) = scene_with_proto();
        let vp = scene.viewport();
        let mut creating = HashSet::new();
        let inst =
            instantiate(&mut scene, proto, NodeId::intern("button_1"), &mut creating).unwrap();
        scene.attach(inst, vp, None).unwrap();

        // Same value as the prototype — not a real override.
        scene.node_mut(inst).props.width = Some(SizeSpec::fixed(100.0));
        // A genuine divergence.
        scene.node_mut(inst).props.opacity = Some(Prop::Value(0.5));

        reconcile_overrides(&mut scene, inst);
        let node = scene.node(inst);
        assert!(node.props.width.is_none());
        let link = node.prototype.as_ref().unwrap();
        assert_eq!(link.overridden.as_slice(), &[crate::model::PropKey::Opacity]);
    }
}
