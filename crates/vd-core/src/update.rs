//! Update blocks: journalled, undoable mutation.
//!
//! Every mutation flows through an `Action`. Applying an action performs
//! the state transition and returns the action that undoes it; the block's
//! journal accumulates those inverses in insertion order. Rollback replays
//! the journal in reverse; commit validates, reconciles derived state
//! (instance rebuilds, override sets, resolved caches, layout), and seals
//! the journal into an undo entry. A failed commit rolls back before
//! returning, so the observable state after any error is exactly the state
//! before the block began.

use crate::document::Document;
use crate::error::{Error, ErrorKind, Result};
use crate::id::NodeId;
use crate::layout;
use crate::model::{Properties, PropKey};
use crate::prototype;
use crate::scene::{Node, NodeKind, PrototypeLink};
use crate::variable::{ThemeAxis, ThemedValue, VarId, VarType, Variable};
use petgraph::graph::NodeIndex;
use smallvec::SmallVec;
use std::collections::HashSet;

// ─── Actions ─────────────────────────────────────────────────────────────

/// A reversible state transition. `apply` performs it and returns its
/// inverse (or `None` when it turned out to be a no-op).
#[derive(Debug, Clone)]
pub(crate) enum Action {
    Attach {
        node: NodeIndex,
        parent: NodeIndex,
        index: usize,
    },
    Detach {
        node: NodeIndex,
    },
    MoveNode {
        node: NodeIndex,
        parent: NodeIndex,
        index: usize,
    },
    Reorder {
        parent: NodeIndex,
        from: usize,
        to: usize,
    },
    SetProps {
        node: NodeIndex,
        values: Box<Properties>,
        keys: SmallVec<[PropKey; 8]>,
    },
    SetId {
        node: NodeIndex,
        id: NodeId,
        unique: bool,
    },
    SetThemes {
        themes: Vec<ThemeAxis>,
    },
    VarRemove {
        id: VarId,
    },
    VarRestore {
        id: VarId,
        var: Box<Variable>,
    },
    VarSetValues {
        id: VarId,
        values: Vec<ThemedValue>,
    },
    VarRename {
        id: VarId,
        name: String,
    },
    SetChildrenOverridden {
        node: NodeIndex,
        value: bool,
    },
    SetReusable {
        node: NodeIndex,
        value: bool,
    },
    SetPrototype {
        node: NodeIndex,
        link: Option<Box<PrototypeLink>>,
    },
    ReplaceChildren {
        parent: NodeIndex,
        children: Vec<NodeIndex>,
    },
}

impl Action {
    pub(crate) fn apply(self, doc: &mut Document) -> Result<Option<Action>> {
        match self {
            Action::Attach { node, parent, index } => {
                doc.scene.attach(node, parent, Some(index))?;
                doc.subscribe_subtree(node);
                doc.invalidate_subtree(node);
                Ok(Some(Action::Detach { node }))
            }
            Action::Detach { node } => {
                doc.unsubscribe_subtree(node);
                let (parent, index) = doc.scene.detach(node)?;
                Ok(Some(Action::Attach { node, parent, index }))
            }
            Action::MoveNode { node, parent, index } => {
                // Pre-check the sibling id so the detach+attach pair cannot
                // fail halfway.
                let id = doc.scene.node(node).id;
                if let Some(existing) = doc.scene.child_by_id(parent, id) {
                    if existing != node {
                        return Err(Error::duplicate_id(format!(
                            "{} under {}",
                            id,
                            doc.scene.node(parent).id
                        )));
                    }
                }
                let (old_parent, old_index) = doc.scene.detach(node)?;
                doc.scene
                    .attach(node, parent, Some(index))
                    .expect("pre-checked attach failed");
                doc.invalidate_subtree(node);
                Ok(Some(Action::MoveNode {
                    node,
                    parent: old_parent,
                    index: old_index,
                }))
            }
            Action::Reorder { parent, from, to } => {
                doc.scene.reorder(parent, from, to)?;
                Ok(Some(Action::Reorder { parent, from: to, to: from }))
            }
            Action::SetProps { node, values, keys } => {
                let (prior, changed) = apply_props(doc, node, &values, &keys);
                if changed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Action::SetProps {
                        node,
                        values: Box::new(prior),
                        keys: changed,
                    }))
                }
            }
            Action::SetId { node, id, unique } => {
                if let Some(parent) = doc.scene.parent(node) {
                    if let Some(existing) = doc.scene.child_by_id(parent, id) {
                        if existing != node {
                            return Err(Error::duplicate_id(format!(
                                "{} under {}",
                                id,
                                doc.scene.node(parent).id
                            )));
                        }
                    }
                }
                let n = doc.scene.node_mut(node);
                let old = Action::SetId {
                    node,
                    id: n.id,
                    unique: n.is_unique,
                };
                n.id = id;
                n.is_unique = unique;
                Ok(Some(old))
            }
            Action::SetThemes { themes } => {
                let old = std::mem::replace(&mut doc.themes, themes);
                // A theme change can re-resolve any variable anywhere.
                let vp = doc.scene.viewport();
                doc.invalidate_subtree(vp);
                Ok(Some(Action::SetThemes { themes: old }))
            }
            Action::VarRemove { id } => {
                let var = doc.vars.remove(id);
                Ok(Some(Action::VarRestore {
                    id,
                    var: Box::new(var),
                }))
            }
            Action::VarRestore { id, var } => {
                doc.vars.restore(id, *var);
                Ok(Some(Action::VarRemove { id }))
            }
            Action::VarSetValues { id, values } => {
                let old = doc.vars.set_values(id, values);
                for (node, _) in doc.vars.listeners(id).to_vec() {
                    doc.scene.mark_resolved_dirty(node);
                }
                Ok(Some(Action::VarSetValues { id, values: old }))
            }
            Action::VarRename { id, name } => {
                let old = doc.vars.var(id).name.clone();
                doc.vars.rename(&old, &name)?;
                Ok(Some(Action::VarRename { id, name: old }))
            }
            Action::SetChildrenOverridden { node, value } => {
                let link = doc
                    .scene
                    .node_mut(node)
                    .prototype
                    .as_mut()
                    .ok_or_else(|| Error::not_found("prototype link"))?;
                let old = link.children_overridden;
                link.children_overridden = value;
                Ok(Some(Action::SetChildrenOverridden { node, value: old }))
            }
            Action::SetReusable { node, value } => {
                let n = doc.scene.node_mut(node);
                let old = n.reusable;
                n.reusable = value;
                Ok(Some(Action::SetReusable { node, value: old }))
            }
            Action::SetPrototype { node, link } => {
                let old = prototype::detach_from_prototype(&mut doc.scene, node);
                if let Some(link) = link {
                    prototype::attach_to_prototype(
                        &mut doc.scene,
                        node,
                        link.target,
                        link.children_overridden,
                    )?;
                    if let Some(set) = &mut doc.scene.node_mut(node).prototype {
                        set.overridden = link.overridden.clone();
                        set.is_instance_boundary = link.is_instance_boundary;
                    }
                }
                doc.scene.mark_resolved_dirty(node);
                Ok(Some(Action::SetPrototype {
                    node,
                    link: old.map(Box::new),
                }))
            }
            Action::ReplaceChildren { parent, children } => {
                let old = doc.scene.children(parent).to_vec();
                for &child in old.iter().rev() {
                    doc.unsubscribe_subtree(child);
                    doc.scene.detach(child)?;
                }
                for &child in &children {
                    doc.scene.attach(child, parent, None)?;
                    doc.subscribe_subtree(child);
                }
                doc.invalidate_subtree(parent);
                Ok(Some(Action::ReplaceChildren {
                    parent,
                    children: old,
                }))
            }
        }
    }

    /// Nodes an entry keeps alive while it sits in the undo/redo stacks.
    pub(crate) fn referenced_nodes(&self) -> SmallVec<[NodeIndex; 4]> {
        let mut out = SmallVec::new();
        match self {
            Action::Attach { node, parent, .. } | Action::MoveNode { node, parent, .. } => {
                out.push(*node);
                out.push(*parent);
            }
            Action::Detach { node }
            | Action::SetProps { node, .. }
            | Action::SetId { node, .. }
            | Action::SetChildrenOverridden { node, .. }
            | Action::SetReusable { node, .. } => out.push(*node),
            Action::SetPrototype { node, link } => {
                out.push(*node);
                if let Some(link) = link {
                    out.push(link.target);
                }
            }
            Action::ReplaceChildren { parent, children } => {
                out.push(*parent);
                out.extend(children.iter().copied());
            }
            Action::Reorder { parent, .. } => out.push(*parent),
            Action::SetThemes { .. }
            | Action::VarRemove { .. }
            | Action::VarRestore { .. }
            | Action::VarSetValues { .. }
            | Action::VarRename { .. } => {}
        }
        out
    }
}

/// Write the listed slots of `values` into a node's bag, maintaining
/// variable subscriptions and resolved-cache invalidation. Returns the
/// prior slots and the keys that actually changed.
fn apply_props(
    doc: &mut Document,
    node: NodeIndex,
    values: &Properties,
    keys: &[PropKey],
) -> (Properties, SmallVec<[PropKey; 8]>) {
    let mut prior = Properties::default();
    let mut changed = SmallVec::new();
    let attached = doc.is_attached(node);
    for &key in keys {
        if doc.scene.node(node).props.key_eq(values, key) {
            continue;
        }
        let old_refs = doc.scene.node(node).props.var_refs(key);
        prior.copy_key_from(&doc.scene.node(node).props, key);
        doc.scene.node_mut(node).props.copy_key_from(values, key);
        if attached {
            for var in old_refs {
                doc.vars.unsubscribe(var, node, key);
            }
            for var in doc.scene.node(node).props.var_refs(key) {
                doc.vars.subscribe(var, node, key);
            }
        }
        changed.push(key);
    }
    if !changed.is_empty() {
        doc.invalidate_props(node, &changed);
    }
    (prior, changed)
}

// ─── Update block ────────────────────────────────────────────────────────

/// A transactional journal over one document. At most one block is open at
/// a time; `commit` or `rollback` releases the slot. Dropping an
/// un-committed block rolls back.
pub struct UpdateBlock<'a> {
    pub(crate) doc: &'a mut Document,
    journal: Vec<Action>,
    /// Arena nodes inserted by this block (freed again on rollback).
    created: Vec<NodeIndex>,
    /// Subtree roots detached by `delete_node` / `clear_children`.
    deleted: Vec<NodeIndex>,
    /// Parents whose child list changed (drives instance rebuilds).
    structure_changed: Vec<NodeIndex>,
    /// (node, key) pairs whose inverse is pre-recorded; later writes to
    /// them are coalesced into the snapshot.
    snapshotted: HashSet<(NodeIndex, PropKey)>,
    finished: bool,
}

impl<'a> std::fmt::Debug for UpdateBlock<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateBlock")
            .field("journal_len", &self.journal.len())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'a> UpdateBlock<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        Self {
            doc,
            journal: Vec::new(),
            created: Vec::new(),
            deleted: Vec::new(),
            structure_changed: Vec::new(),
            snapshotted: HashSet::new(),
            finished: false,
        }
    }

    /// Read access to the document mid-block (the block owns the only
    /// mutable handle).
    pub fn document(&self) -> &Document {
        self.doc
    }

    fn run(&mut self, action: Action) -> Result<()> {
        if let Some(inverse) = action.apply(self.doc)? {
            self.journal.push(inverse);
        }
        Ok(())
    }

    fn note_structure_change(&mut self, parent: NodeIndex) {
        if !self.structure_changed.contains(&parent) {
            self.structure_changed.push(parent);
        }
    }

    /// Flip `children_overridden` before the first structural divergence
    /// of an instance's child list.
    fn allow_structural_override(&mut self, parent: NodeIndex) -> Result<()> {
        let needs = matches!(
            &self.doc.scene.node(parent).prototype,
            Some(link) if !link.children_overridden
        );
        if needs {
            self.run(Action::SetChildrenOverridden {
                node: parent,
                value: true,
            })?;
        }
        Ok(())
    }

    // ─── Structure ───────────────────────────────────────────────────────

    /// Insert a new node under `parent`. The node becomes observable at
    /// this point (inside the block); commit makes it durable.
    pub fn add_node(&mut self, node: Node, parent: NodeIndex, index: Option<usize>) -> Result<NodeIndex> {
        let idx = self.doc.scene.insert(node);
        self.created.push(idx);
        self.allow_structural_override(parent)?;
        let at = index.unwrap_or(self.doc.scene.children(parent).len());
        self.run(Action::Attach { node: idx, parent, index: at })?;
        self.note_structure_change(parent);
        Ok(idx)
    }

    /// Attach an already-built detached subtree (clone, instance, paste).
    pub fn add_subtree(&mut self, root: NodeIndex, parent: NodeIndex, index: Option<usize>) -> Result<NodeIndex> {
        for n in self.doc.scene.descendants(root) {
            self.created.push(n);
        }
        self.allow_structural_override(parent)?;
        let at = index.unwrap_or(self.doc.scene.children(parent).len());
        self.run(Action::Attach { node: root, parent, index: at })?;
        self.note_structure_change(parent);
        Ok(root)
    }

    pub fn delete_node(&mut self, node: NodeIndex) -> Result<()> {
        if node == self.doc.scene.viewport() {
            return Err(Error::invalid_path("viewport"));
        }
        let parent = self
            .doc
            .scene
            .parent(node)
            .ok_or_else(|| Error::not_found(self.doc.scene.node(node).id.as_str()))?;
        self.allow_structural_override(parent)?;
        self.run(Action::Detach { node })?;
        self.deleted.push(node);
        self.note_structure_change(parent);
        Ok(())
    }

    pub fn change_parent(&mut self, node: NodeIndex, new_parent: NodeIndex, index: Option<usize>) -> Result<()> {
        if node == new_parent || self.doc.scene.is_ancestor_of(node, new_parent) {
            return Err(Error::new(
                ErrorKind::ReferenceCycle,
                self.doc.scene.path_of(node),
            ));
        }
        let old_parent = self
            .doc
            .scene
            .parent(node)
            .ok_or_else(|| Error::not_found(self.doc.scene.node(node).id.as_str()))?;
        self.allow_structural_override(old_parent)?;
        self.allow_structural_override(new_parent)?;
        let at = index.unwrap_or_else(|| {
            let len = self.doc.scene.children(new_parent).len();
            if old_parent == new_parent { len.saturating_sub(1) } else { len }
        });
        self.run(Action::MoveNode { node, parent: new_parent, index: at })?;
        self.note_structure_change(old_parent);
        self.note_structure_change(new_parent);
        Ok(())
    }

    pub fn clear_children(&mut self, node: NodeIndex) -> Result<()> {
        self.allow_structural_override(node)?;
        for child in self.doc.scene.children(node).to_vec() {
            self.run(Action::Detach { node: child })?;
            self.deleted.push(child);
        }
        self.note_structure_change(node);
        Ok(())
    }

    // ─── Z-order ─────────────────────────────────────────────────────────

    fn reorder_to(&mut self, node: NodeIndex, to: impl Fn(usize, usize) -> usize) -> Result<bool> {
        let Some(parent) = self.doc.scene.parent(node) else {
            return Ok(false);
        };
        let len = self.doc.scene.children(parent).len();
        let from = self.doc.scene.position_of(parent, node).expect("attached");
        let target = to(from, len);
        if target == from {
            return Ok(false);
        }
        self.run(Action::Reorder { parent, from, to: target })?;
        self.note_structure_change(parent);
        Ok(true)
    }

    /// Swap with the previous sibling. Returns whether z-order changed.
    pub fn send_backward(&mut self, node: NodeIndex) -> Result<bool> {
        self.reorder_to(node, |from, _| from.saturating_sub(1))
    }

    /// Swap with the next sibling.
    pub fn bring_forward(&mut self, node: NodeIndex) -> Result<bool> {
        self.reorder_to(node, |from, len| (from + 1).min(len - 1))
    }

    pub fn send_to_back(&mut self, node: NodeIndex) -> Result<bool> {
        self.reorder_to(node, |_, _| 0)
    }

    pub fn bring_to_front(&mut self, node: NodeIndex) -> Result<bool> {
        self.reorder_to(node, |_, len| len - 1)
    }

    // ─── Properties ──────────────────────────────────────────────────────

    /// Apply a partial property map. Only the keys that actually change
    /// are journalled. Setting an instance's key to the prototype's value
    /// removes the override instead.
    pub fn update(&mut self, node: NodeIndex, delta: &Properties) -> Result<()> {
        let keys = delta.set_keys();
        let mut values = delta.clone();

        // Overrides that stop diverging evaporate: the slot reverts to
        // unset so reads fall back to the prototype again.
        if let Some(link) = self.doc.scene.node(node).prototype.clone() {
            if self.doc.scene.contains(link.target) {
                for &key in &keys {
                    let proto_props = &self.doc.scene.node(link.target).props;
                    if values.key_eq(proto_props, key) {
                        values.clear_key(key);
                    }
                }
            }
        }

        let mut fresh: SmallVec<[PropKey; 8]> = SmallVec::new();
        let mut coalesced: SmallVec<[PropKey; 8]> = SmallVec::new();
        for &key in &keys {
            if self.snapshotted.contains(&(node, key)) {
                coalesced.push(key);
            } else {
                fresh.push(key);
            }
        }
        if !coalesced.is_empty() {
            apply_props(self.doc, node, &values, &coalesced);
        }
        if !fresh.is_empty() {
            self.run(Action::SetProps {
                node,
                values: Box::new(values),
                keys: fresh,
            })?;
        }
        Ok(())
    }

    /// Apply a property map to an instance descendant addressed by its
    /// canonical (prototype-id) path relative to the instance root. Unlike
    /// rebuild-time reapplication, a path that does not resolve is an
    /// error here, not a silent drop.
    pub fn update_descendant(
        &mut self,
        instance: NodeIndex,
        path: &str,
        delta: &Properties,
    ) -> Result<()> {
        let segments: Vec<NodeId> = path.split('/').map(NodeId::intern).collect();
        let target = prototype::walk_canonical(&self.doc.scene, instance, &segments)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOverridePath,
                    format!("{}: {path}", self.doc.scene.path_of(instance)),
                )
            })?;
        self.update(target, delta)
    }

    /// Pre-record inverses for `keys` so subsequent writes coalesce into
    /// one undo step (a drag records one snapshot, then streams updates).
    pub fn snapshot_properties(&mut self, node: NodeIndex, keys: &[PropKey]) -> Result<()> {
        let mut prior = Properties::default();
        let mut fresh: SmallVec<[PropKey; 8]> = SmallVec::new();
        for &key in keys {
            if self.snapshotted.insert((node, key)) {
                prior.copy_key_from(&self.doc.scene.node(node).props, key);
                fresh.push(key);
            }
        }
        if !fresh.is_empty() {
            self.journal.push(Action::SetProps {
                node,
                values: Box::new(prior),
                keys: fresh,
            });
        }
        Ok(())
    }

    /// Rename a node this block built while it is still detached. The
    /// pre-attachment state is unobservable, so nothing is journalled.
    pub fn set_detached_id(&mut self, node: NodeIndex, id: NodeId) {
        debug_assert!(
            self.doc.scene.parent(node).is_none(),
            "set_detached_id on an attached node"
        );
        self.doc.scene.node_mut(node).id = id;
    }

    /// Rename a node. Inside an instance this marks the node unique: its
    /// id no longer follows the prototype's.
    pub fn set_node_id(&mut self, node: NodeIndex, id: NodeId) -> Result<()> {
        let unique = self.doc.scene.is_mirrored_child(node)
            && self
                .doc
                .scene
                .node(node)
                .prototype
                .as_ref()
                .map_or(false, |l| self.doc.scene.node(l.target).id != id);
        self.run(Action::SetId { node, id, unique })
    }

    // ─── Themes & variables ──────────────────────────────────────────────

    pub fn set_themes(&mut self, themes: Vec<ThemeAxis>) -> Result<()> {
        self.run(Action::SetThemes { themes })
    }

    pub fn add_variable(&mut self, name: &str, ty: VarType) -> Result<VarId> {
        let id = self.doc.vars.add(name, ty)?;
        self.journal.push(Action::VarRemove { id });
        Ok(id)
    }

    /// Delete a variable. Every property holding the handle is first
    /// rewritten to the concrete value resolved under the viewport theme.
    pub fn delete_variable(&mut self, name: &str) -> Result<()> {
        let id = self
            .doc
            .vars
            .lookup(name)
            .ok_or_else(|| Error::not_found(format!("variable {name}")))?;
        let viewport_theme = self.doc.viewport_theme();
        let value = self.doc.vars.resolve(id, &viewport_theme);
        for (node, key) in self.doc.vars.listeners(id).to_vec() {
            let mut values = Properties::default();
            values.copy_key_from(&self.doc.scene.node(node).props, key);
            values.substitute_var(id, &value);
            self.run(Action::SetProps {
                node,
                values: Box::new(values),
                keys: smallvec::smallvec![key],
            })?;
        }
        self.run(Action::VarRemove { id })
    }

    pub fn rename_variable(&mut self, old: &str, new: &str) -> Result<()> {
        if old != new && self.doc.vars.lookup(new).is_some() {
            return Err(Error::new(ErrorKind::DuplicateName, new));
        }
        let id = self
            .doc
            .vars
            .lookup(old)
            .ok_or_else(|| Error::not_found(format!("variable {old}")))?;
        self.run(Action::VarRename {
            id,
            name: new.to_string(),
        })
    }

    /// Replace a variable's themed values; one undoable step.
    pub fn set_variable(&mut self, name: &str, values: Vec<ThemedValue>) -> Result<()> {
        let id = self
            .doc
            .vars
            .lookup(name)
            .ok_or_else(|| Error::not_found(format!("variable {name}")))?;
        self.run(Action::VarSetValues { id, values })
    }

    // ─── Prototypes ──────────────────────────────────────────────────────

    pub fn attach_prototype(&mut self, node: NodeIndex, proto: NodeIndex, children_overridden: bool) -> Result<()> {
        let mut link = PrototypeLink::new(proto);
        link.children_overridden = children_overridden;
        self.run(Action::SetPrototype {
            node,
            link: Some(Box::new(link)),
        })
    }

    /// Expand `proto` into a new instance attached under `parent`. An
    /// instance may not land inside its own prototype's subtree — every
    /// later rebuild would re-expand it.
    pub fn instantiate(
        &mut self,
        proto: NodeIndex,
        id: NodeId,
        parent: NodeIndex,
        index: Option<usize>,
    ) -> Result<NodeIndex> {
        if parent == proto || self.doc.scene.is_ancestor_of(proto, parent) {
            return Err(Error::new(
                ErrorKind::ReferenceCycle,
                self.doc.scene.path_of(proto),
            ));
        }
        let mut creating = HashSet::new();
        let root = prototype::instantiate(&mut self.doc.scene, proto, id, &mut creating)?;
        self.add_subtree(root, parent, index)
    }

    pub fn mark_reusable(&mut self, node: NodeIndex, value: bool) -> Result<()> {
        self.run(Action::SetReusable { node, value })
    }

    /// Walk up from a prototype and mark it reusable if neither it nor an
    /// ancestor already is. Recorded as an undoable step.
    pub fn ensure_prototype_reusability(&mut self, proto: NodeIndex) -> Result<()> {
        if !self.doc.scene.is_reusable(proto) {
            self.run(Action::SetReusable { node: proto, value: true })?;
        }
        Ok(())
    }

    // ─── Compound operations ─────────────────────────────────────────────

    /// Wrap siblings in a new group, preserving committed positions.
    pub fn group_nodes(&mut self, nodes: &[NodeIndex], group_id: NodeId) -> Result<NodeIndex> {
        let first = *nodes
            .first()
            .ok_or_else(|| Error::invalid_path("(empty selection)"))?;
        let parent = self
            .doc
            .scene
            .parent(first)
            .ok_or_else(|| Error::not_found(self.doc.scene.node(first).id.as_str()))?;
        for &n in nodes {
            if self.doc.scene.parent(n) != Some(parent) {
                return Err(Error::new(
                    ErrorKind::InvalidPath,
                    "grouped nodes must share a parent",
                ));
            }
        }

        let (min_x, min_y) = nodes.iter().fold((f64::MAX, f64::MAX), |(mx, my), &n| {
            let g = self.doc.scene.node(n).geometry;
            (mx.min(g.x), my.min(g.y))
        });

        let slot = self.doc.scene.position_of(parent, first).expect("attached");
        let mut group = Node::new(group_id, NodeKind::Group);
        group.props.x = Some(crate::model::Prop::Value(min_x));
        group.props.y = Some(crate::model::Prop::Value(min_y));
        let group_idx = self.add_node(group, parent, Some(slot))?;

        for &n in nodes {
            let g = self.doc.scene.node(n).geometry;
            self.change_parent(n, group_idx, None)?;
            let mut delta = Properties::default();
            delta.x = Some(crate::model::Prop::Value(g.x - min_x));
            delta.y = Some(crate::model::Prop::Value(g.y - min_y));
            self.update(n, &delta)?;
        }
        Ok(group_idx)
    }

    /// Dissolve a group, lifting children into its parent.
    pub fn ungroup(&mut self, group: NodeIndex) -> Result<Vec<NodeIndex>> {
        if !matches!(self.doc.scene.node(group).kind, NodeKind::Group) {
            return Err(Error::new(
                ErrorKind::InvalidPath,
                format!("{} is not a group", self.doc.scene.path_of(group)),
            ));
        }
        let parent = self
            .doc
            .scene
            .parent(group)
            .ok_or_else(|| Error::not_found(self.doc.scene.node(group).id.as_str()))?;
        let origin = self.doc.scene.node(group).geometry;
        let slot = self.doc.scene.position_of(parent, group).expect("attached");
        let children = self.doc.scene.children(group).to_vec();
        for (i, &child) in children.iter().enumerate() {
            let g = self.doc.scene.node(child).geometry;
            // Lifted ids may clash with existing siblings.
            let taken: Vec<NodeId> = self
                .doc
                .scene
                .children(parent)
                .iter()
                .map(|&c| self.doc.scene.node(c).id)
                .collect();
            let id = self.doc.scene.node(child).id.dedup_against(&taken);
            if id != self.doc.scene.node(child).id {
                self.set_node_id(child, id)?;
            }
            self.change_parent(child, parent, Some(slot + i))?;
            let mut delta = Properties::default();
            delta.x = Some(crate::model::Prop::Value(origin.x + g.x));
            delta.y = Some(crate::model::Prop::Value(origin.y + g.y));
            self.update(child, &delta)?;
        }
        self.delete_node(group)?;
        Ok(children)
    }

    /// Clone a subtree beside the original with a fresh unique root id and
    /// a small offset.
    pub fn duplicate(&mut self, node: NodeIndex) -> Result<NodeIndex> {
        let parent = self
            .doc
            .scene
            .parent(node)
            .ok_or_else(|| Error::not_found(self.doc.scene.node(node).id.as_str()))?;
        let mut creating = HashSet::new();
        let copy = self.doc.scene.clone_subtree(node, &mut creating)?;
        register_clone_links(&mut self.doc.scene, copy);

        let taken: Vec<NodeId> = self
            .doc
            .scene
            .children(parent)
            .iter()
            .map(|&c| self.doc.scene.node(c).id)
            .collect();
        let fresh = self.doc.scene.node(copy).id.dedup_against(&taken);
        self.doc.scene.node_mut(copy).id = fresh;

        let g = self.doc.scene.node(node).geometry;
        let slot = self.doc.scene.position_of(parent, node).expect("attached") + 1;
        let idx = self.add_subtree(copy, parent, Some(slot))?;
        let mut delta = Properties::default();
        delta.x = Some(crate::model::Prop::Value(g.x + 20.0));
        delta.y = Some(crate::model::Prop::Value(g.y + 20.0));
        self.update(idx, &delta)?;
        Ok(idx)
    }

    // ─── Commit / rollback ───────────────────────────────────────────────

    /// Replay the journal in reverse, restoring the pre-block state, and
    /// release the open-block slot.
    pub fn rollback(mut self) {
        self.rollback_inner();
    }

    fn rollback_inner(&mut self) {
        log::debug!("rolling back block of {} entries", self.journal.len());
        while let Some(action) = self.journal.pop() {
            action
                .apply(self.doc)
                .expect("rollback replay failed: journal corrupted");
        }
        // Nodes born in this block are unreachable again; free them.
        for idx in std::mem::take(&mut self.created) {
            if self.doc.scene.contains(idx) && self.doc.scene.parent(idx).is_none() {
                self.doc.free_detached_subtree(idx);
            }
        }
        self.doc.block_open = false;
        self.finished = true;
    }

    /// Validate, reconcile derived state, and seal the journal. On error
    /// the block rolls back first, so observable state is unchanged.
    pub fn commit(mut self, undo: bool) -> Result<()> {
        match self.commit_inner() {
            Ok(()) => {
                let journal = std::mem::take(&mut self.journal);
                self.doc.finish_commit(journal, undo);
                self.finished = true;
                Ok(())
            }
            Err(err) => {
                log::debug!("commit failed, rolling back: {err}");
                self.rollback_inner();
                Err(err)
            }
        }
    }

    fn commit_inner(&mut self) -> Result<()> {
        // Deleting a prototype is rejected while instances still point at
        // any node of its subtree.
        for &root in &self.deleted.clone() {
            if self.doc.is_attached(root) {
                continue; // re-attached later in the same block
            }
            for n in self.doc.scene.descendants(root) {
                let in_use = self.doc.scene.node(n).instances.iter().any(|&inst| {
                    self.doc.is_attached(inst) && !self.doc.scene.is_ancestor_of(root, inst) && inst != root
                });
                if in_use {
                    return Err(Error::new(
                        ErrorKind::PrototypeInUse,
                        self.doc.scene.node(n).id.as_str(),
                    ));
                }
            }
        }

        // Rebuild instances of every prototype whose structure changed.
        let mut worklist: Vec<NodeIndex> = self.structure_changed.clone();
        let mut seen = HashSet::new();
        while let Some(proto) = worklist.pop() {
            if !seen.insert(proto) || !self.doc.scene.contains(proto) {
                continue;
            }
            let instances: Vec<NodeIndex> = self
                .doc
                .scene
                .node(proto)
                .instances
                .iter()
                .copied()
                .filter(|&i| self.doc.is_attached(i))
                .collect();
            for instance in instances {
                let link = self.doc.scene.node(instance).prototype.clone();
                let Some(link) = link else { continue };
                if link.target != proto || link.children_overridden {
                    continue;
                }
                self.rebuild_instance(instance, proto)?;
                worklist.push(instance);
            }
        }

        // Every instance must reference a reusable prototype.
        let attached: Vec<NodeIndex> = self.doc.scene.descendants(self.doc.scene.viewport());
        for &idx in &attached {
            let proto = match &self.doc.scene.node(idx).prototype {
                Some(link) if self.doc.scene.contains(link.target) => link.target,
                _ => continue,
            };
            if self.doc.is_attached(proto) {
                self.ensure_prototype_reusability(proto)?;
            }
        }

        // Override sets shrink to the keys that actually diverge.
        for &idx in &attached {
            prototype::reconcile_overrides(&mut self.doc.scene, idx);
        }

        // Structural mirroring must hold for every non-overridden instance.
        for &idx in &attached {
            prototype::verify_instance_structure(&self.doc.scene, idx)?;
        }

        // Derived state: resolution, then layout over the whole tree.
        let theme = self.doc.viewport_theme();
        self.doc.scene.refresh_resolved_all(&self.doc.vars, &theme, false);
        let vp = self.doc.scene.viewport();
        layout::run_layout(&mut self.doc.scene, vp, self.doc.measurer.as_ref());
        Ok(())
    }

    /// Re-clone an instance's mirrored children from its prototype,
    /// carrying overrides across. Overrides whose path vanished are
    /// dropped here (and only here).
    fn rebuild_instance(&mut self, instance: NodeIndex, proto: NodeIndex) -> Result<()> {
        let overrides = prototype::serialize_overrides(&self.doc.scene, instance);
        let mut fresh = Vec::new();
        for child in self.doc.scene.children(proto).to_vec() {
            let copy = prototype::mirror_subtree(&mut self.doc.scene, child)?;
            self.created.push(copy);
            for n in self.doc.scene.descendants(copy) {
                if n != copy {
                    self.created.push(n);
                }
            }
            fresh.push(copy);
        }
        // Overrides are reapplied while the copies are still detached, so
        // attach-time subscription sees the final bags.
        let holder = self.doc.scene.insert(Node::new(NodeId::fresh("rebuild"), NodeKind::Group));
        self.created.push(holder);
        for &f in &fresh {
            self.doc.scene.attach(f, holder, None)?;
        }
        prototype::reapply_overrides(&mut self.doc.scene, holder, overrides);
        for &f in &fresh {
            self.doc.scene.detach(f)?;
        }
        self.run(Action::ReplaceChildren {
            parent: instance,
            children: fresh,
        })?;
        Ok(())
    }
}

impl Drop for UpdateBlock<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_inner();
        }
    }
}

/// After a plain `clone_subtree`, copied prototype links exist but their
/// back-references don't. Register them.
pub(crate) fn register_clone_links(scene: &mut crate::scene::Scene, root: NodeIndex) {
    for n in scene.descendants(root) {
        let target = scene.node(n).prototype.as_ref().map(|l| l.target);
        if let Some(target) = target {
            if scene.contains(target) && !scene.node(target).instances.contains(&n) {
                scene.node_mut(target).instances.push(n);
            }
        }
    }
}
