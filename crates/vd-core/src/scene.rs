//! The retained scene graph.
//!
//! Nodes live in a `StableDiGraph` arena; containment edges run parent →
//! child and an authoritative order vector per parent fixes sibling order
//! (petgraph's adjacency order is not stable across targets). Parent,
//! prototype, and instance links are all `NodeIndex` handles into the same
//! arena — non-owning, maintained by the update block.
//!
//! Ids are unique per parent only; global addressing is by slash-delimited
//! paths from the viewport root.

use crate::error::{Error, ErrorKind, Result};
use crate::geom;
use crate::id::NodeId;
use crate::model::{Properties, PropKey, ResolvedProps};
use crate::variable::{ThemeMap, VariableStore};
use kurbo::{Affine, BezPath, Rect, Shape};
use petgraph::stable_graph::StableDiGraph;
use petgraph::graph::NodeIndex;
use petgraph::Direction as PetDirection;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

// ─── Node ────────────────────────────────────────────────────────────────

/// The node kinds. The shared header (transform, properties, bounds) lives
/// on `Node`; payloads carry only type-specific state.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The invisible document root. No geometry; owns top-level children.
    Viewport,
    Frame,
    Group,
    Rectangle,
    Ellipse,
    Line,
    Polygon { sides: u32 },
    Path { data: BezPath },
    Text,
    Icon { glyph: String },
    Note,
    Prompt,
    Context,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Viewport => "viewport",
            Self::Frame => "frame",
            Self::Group => "group",
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Line => "line",
            Self::Polygon { .. } => "polygon",
            Self::Path { .. } => "path",
            Self::Text => "text",
            Self::Icon { .. } => "icon",
            Self::Note => "note",
            Self::Prompt => "prompt",
            Self::Context => "context",
        }
    }

    pub fn same_type(&self, other: &NodeKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Committed layout box, in the parent's coordinate space. Written by the
/// layout pass at commit; never journalled (it is derived state).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub fn rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// The prototype side of an instance node.
#[derive(Debug, Clone)]
pub struct PrototypeLink {
    /// Non-owning handle to the prototype node.
    pub target: NodeIndex,
    /// Property keys whose value diverges from the prototype.
    pub overridden: SmallVec<[PropKey; 8]>,
    /// Once set, the instance owns its full child list.
    pub children_overridden: bool,
    /// Set when this instance's root is itself a prototype's root; marks
    /// where descendant path rewriting switches to a second-level segment.
    pub is_instance_boundary: bool,
}

impl PrototypeLink {
    pub fn new(target: NodeIndex) -> Self {
        Self {
            target,
            overridden: SmallVec::new(),
            children_overridden: false,
            is_instance_boundary: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub props: Properties,
    /// Committed layout box.
    pub geometry: Geometry,
    /// Explicitly marked as an instantiable prototype (or inherited from an
    /// ancestor; see `Scene::is_reusable`).
    pub reusable: bool,
    /// True when this node's id was overridden to differ from its
    /// prototype counterpart.
    pub is_unique: bool,
    pub prototype: Option<PrototypeLink>,
    /// Back-references from a prototype to its live instances.
    pub instances: SmallVec<[NodeIndex; 2]>,
    /// Cached concrete property view; refreshed during commit.
    pub resolved: ResolvedProps,
    pub(crate) resolved_dirty: bool,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            props: Properties::default(),
            geometry: Geometry::default(),
            reusable: false,
            is_unique: false,
            prototype: None,
            instances: SmallVec::new(),
            resolved: ResolvedProps::default(),
            resolved_dirty: true,
        }
    }
}

// ─── Scene ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Scene {
    graph: StableDiGraph<Node, ()>,
    viewport: NodeIndex,
    /// Authoritative sibling order per parent.
    order: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl Scene {
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let viewport = graph.add_node(Node::new(NodeId::intern("viewport"), NodeKind::Viewport));
        Self {
            graph,
            viewport,
            order: HashMap::new(),
        }
    }

    pub fn viewport(&self) -> NodeIndex {
        self.viewport
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.graph[idx]
    }

    pub fn contains(&self, idx: NodeIndex) -> bool {
        self.graph.node_weight(idx).is_some()
    }

    /// Insert a node into the arena, detached. It becomes observable only
    /// once attached under a parent.
    pub fn insert(&mut self, node: Node) -> NodeIndex {
        self.graph.add_node(node)
    }

    pub fn parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, PetDirection::Incoming)
            .next()
    }

    pub fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.order.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn child_by_id(&self, parent: NodeIndex, id: NodeId) -> Option<NodeIndex> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.graph[c].id == id)
    }

    pub fn position_of(&self, parent: NodeIndex, child: NodeIndex) -> Option<usize> {
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Attach a detached node under `parent`. Fails with `DuplicateId` when
    /// a sibling already carries the node's id.
    pub fn attach(&mut self, child: NodeIndex, parent: NodeIndex, index: Option<usize>) -> Result<()> {
        debug_assert!(self.parent(child).is_none(), "attach of an attached node");
        let id = self.graph[child].id;
        if self.child_by_id(parent, id).is_some() {
            return Err(Error::new(
                ErrorKind::DuplicateId,
                format!("{} under {}", id, self.graph[parent].id),
            ));
        }
        self.graph.add_edge(parent, child, ());
        let siblings = self.order.entry(parent).or_default();
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, child);
        Ok(())
    }

    /// Detach a node from its parent, returning the old slot. The subtree
    /// stays alive in the arena (the journal may re-attach it).
    pub fn detach(&mut self, child: NodeIndex) -> Result<(NodeIndex, usize)> {
        let parent = self
            .parent(child)
            .ok_or_else(|| Error::not_found(format!("parent of {}", self.graph[child].id)))?;
        let edge = self
            .graph
            .find_edge(parent, child)
            .expect("containment edge missing for attached node");
        self.graph.remove_edge(edge);
        let siblings = self.order.get_mut(&parent).expect("order entry missing");
        let at = siblings
            .iter()
            .position(|&c| c == child)
            .expect("order entry missing child");
        siblings.remove(at);
        Ok((parent, at))
    }

    /// Move a child within its siblings.
    pub fn reorder(&mut self, parent: NodeIndex, from: usize, to: usize) -> Result<()> {
        let siblings = self
            .order
            .get_mut(&parent)
            .ok_or_else(|| Error::not_found(format!("children of {}", self.graph[parent].id)))?;
        if from >= siblings.len() || to >= siblings.len() {
            return Err(Error::new(
                ErrorKind::SizeOutOfRange,
                format!("reorder {from} -> {to} among {}", siblings.len()),
            ));
        }
        let child = siblings.remove(from);
        siblings.insert(to, child);
        Ok(())
    }

    /// Every live arena slot, attached or not.
    pub fn arena_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Preorder listing of a subtree, root first.
    pub fn descendants(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self.children(n).iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Permanently remove a detached subtree from the arena. The caller
    /// clears variable listeners and prototype back-refs first.
    pub fn free_subtree(&mut self, idx: NodeIndex) {
        debug_assert!(self.parent(idx).is_none(), "free of an attached subtree");
        for n in self.descendants(idx) {
            self.order.remove(&n);
            self.graph.remove_node(n);
        }
    }

    pub fn is_ancestor_of(&self, ancestor: NodeIndex, descendant: NodeIndex) -> bool {
        if ancestor == descendant {
            return false;
        }
        let mut cur = descendant;
        while let Some(p) = self.parent(cur) {
            if p == ancestor {
                return true;
            }
            cur = p;
        }
        false
    }

    // ─── Paths ───────────────────────────────────────────────────────────

    /// Slash-delimited id path from the viewport (exclusive) to `idx`.
    pub fn path_of(&self, idx: NodeIndex) -> String {
        let mut segments = Vec::new();
        let mut cur = idx;
        while cur != self.viewport {
            segments.push(self.graph[cur].id.as_str().to_string());
            match self.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        segments.reverse();
        segments.join("/")
    }

    /// Resolve a path to a node. Fails with `NotFound` naming the full
    /// path, or `InvalidPath` for an empty one.
    pub fn node_by_path(&self, path: &str) -> Result<NodeIndex> {
        if path.is_empty() {
            return Err(Error::invalid_path("(empty)"));
        }
        let mut cur = self.viewport;
        for segment in path.split('/') {
            let id = NodeId::intern(segment);
            cur = self
                .child_by_id(cur, id)
                .or_else(|| self.child_by_proto_id(cur, id))
                .ok_or_else(|| Error::not_found(path))?;
        }
        Ok(cur)
    }

    /// Find a child whose *prototype counterpart* carries `id` — lets paths
    /// written against the prototype's ids resolve inside instances.
    fn child_by_proto_id(&self, parent: NodeIndex, id: NodeId) -> Option<NodeIndex> {
        self.children(parent).iter().copied().find(|&c| {
            self.graph[c]
                .prototype
                .as_ref()
                .map_or(false, |link| self.graph[link.target].id == id)
        })
    }

    /// True when `idx` is a mirrored instance descendant: its prototype
    /// target is a child of its parent's prototype target. Such nodes are
    /// addressed canonically by the prototype child's id.
    pub fn is_mirrored_child(&self, idx: NodeIndex) -> bool {
        let Some(link) = &self.graph[idx].prototype else {
            return false;
        };
        let Some(parent) = self.parent(idx) else {
            return false;
        };
        let Some(parent_link) = &self.graph[parent].prototype else {
            return false;
        };
        self.parent(link.target) == Some(parent_link.target)
    }

    /// Rewrite each segment of `path` to its canonical form: the prototype
    /// child's id wherever the local node is a mirrored, non-unique
    /// instance descendant.
    pub fn canonicalize_path(&self, path: &str) -> Result<String> {
        let mut cur = self.viewport;
        let mut segments = Vec::new();
        for segment in path.split('/') {
            let id = NodeId::intern(segment);
            let child = self
                .child_by_id(cur, id)
                .or_else(|| self.child_by_proto_id(cur, id))
                .ok_or_else(|| Error::invalid_path(path))?;
            let node = &self.graph[child];
            let canonical = if !node.is_unique && self.is_mirrored_child(child) {
                self.graph[node.prototype.as_ref().unwrap().target].id
            } else {
                node.id
            };
            segments.push(canonical.as_str().to_string());
            cur = child;
        }
        Ok(segments.join("/"))
    }

    // ─── Clone ───────────────────────────────────────────────────────────

    /// Deep-copy a subtree into detached arena nodes. `creating` guards
    /// against reference cycles: re-entry on an id already being created
    /// fails with `ReferenceCycle`.
    pub fn clone_subtree(
        &mut self,
        src: NodeIndex,
        creating: &mut HashSet<NodeId>,
    ) -> Result<NodeIndex> {
        let src_node = &self.graph[src];
        let id = src_node.id;
        if !creating.insert(id) {
            return Err(Error::new(ErrorKind::ReferenceCycle, id.as_str()));
        }
        let mut copy = src_node.clone();
        copy.instances = SmallVec::new();
        let copy_idx = self.insert(copy);

        for child in self.children(src).to_vec() {
            let child_copy = self.clone_subtree(child, creating)?;
            self.attach(child_copy, copy_idx, None)?;
        }
        creating.remove(&id);
        Ok(copy_idx)
    }

    // ─── Transforms & bounds ─────────────────────────────────────────────

    /// translate(x, y) · rotate(rotation) · scale(±1, ±1), from committed
    /// geometry and resolved rotation/flips.
    pub fn local_matrix(&self, idx: NodeIndex) -> Affine {
        let node = &self.graph[idx];
        if matches!(node.kind, NodeKind::Viewport) {
            return Affine::IDENTITY;
        }
        geom::local_matrix(
            node.geometry.x,
            node.geometry.y,
            node.resolved.rotation,
            node.resolved.flip_x,
            node.resolved.flip_y,
        )
    }

    pub fn world_matrix(&self, idx: NodeIndex) -> Affine {
        match self.parent(idx) {
            Some(p) => self.world_matrix(p) * self.local_matrix(idx),
            None => self.local_matrix(idx),
        }
    }

    /// Type-specific tight bounds in the node's own space.
    pub fn local_bounds(&self, idx: NodeIndex) -> Rect {
        let node = &self.graph[idx];
        match &node.kind {
            NodeKind::Viewport => Rect::ZERO,
            NodeKind::Group => {
                let mut out: Option<Rect> = None;
                for &c in self.children(idx) {
                    let b = geom::transformed_bounds(self.local_bounds(c), self.local_matrix(c));
                    out = Some(match out {
                        Some(acc) => acc.union(b),
                        None => b,
                    });
                }
                out.unwrap_or(Rect::ZERO)
            }
            NodeKind::Path { data } => data.bounding_box(),
            _ => node.geometry.rect(),
        }
    }

    /// Fill bounds expanded by stroke alignment and enabled effects.
    pub fn visual_local_bounds(&self, idx: NodeIndex) -> Rect {
        let node = &self.graph[idx];
        let mut bounds = self.local_bounds(idx);
        if let Some(stroke) = &node.resolved.stroke {
            if let crate::model::Prop::Value(w) = stroke.width {
                bounds = bounds.inflate(stroke.outset(w), stroke.outset(w));
            }
        }
        let mut expansion = 0.0f64;
        for effect in &node.resolved.effects {
            if effect.enabled() {
                expansion = expansion.max(effect.expansion());
            }
        }
        bounds.inflate(expansion, expansion)
    }

    /// Axis-aligned bounds of the subtree root in viewport space.
    pub fn world_bounds(&self, idx: NodeIndex) -> Rect {
        geom::transformed_bounds(self.local_bounds(idx), self.world_matrix(idx))
    }

    // ─── Resolution ──────────────────────────────────────────────────────

    /// Property fallback chain: the node's own bag, then its prototype's,
    /// then the prototype's prototype, … (acyclic by invariant).
    pub fn props_chain(&self, idx: NodeIndex) -> SmallVec<[&Properties; 4]> {
        let mut chain = SmallVec::new();
        let mut cur = idx;
        loop {
            let node = &self.graph[cur];
            chain.push(&node.props);
            match &node.prototype {
                Some(link) if self.contains(link.target) => cur = link.target,
                _ => break,
            }
        }
        chain
    }

    /// The active theme for a node: the viewport default overlaid with
    /// ancestor overrides, nearest ancestor winning per axis.
    pub fn theme_for(&self, idx: NodeIndex, viewport_default: &ThemeMap) -> ThemeMap {
        let mut lineage = Vec::new();
        let mut cur = Some(idx);
        while let Some(n) = cur {
            lineage.push(n);
            cur = self.parent(n);
        }
        let mut theme = viewport_default.clone();
        for &n in lineage.iter().rev() {
            if let Some(over) = self
                .props_chain(n)
                .iter()
                .find_map(|p| p.theme.as_ref())
            {
                for (axis, value) in over {
                    theme.insert(axis.clone(), value.clone());
                }
            }
        }
        theme
    }

    pub fn mark_resolved_dirty(&mut self, idx: NodeIndex) {
        if self.contains(idx) {
            self.graph[idx].resolved_dirty = true;
        }
    }

    /// Recompute the resolved view of `idx` (and nothing else).
    pub fn refresh_resolved(
        &mut self,
        idx: NodeIndex,
        vars: &VariableStore,
        viewport_default: &ThemeMap,
    ) {
        let theme = self.theme_for(idx, viewport_default);
        let resolved = crate::model::resolve_chain(&self.props_chain(idx), vars, &theme);
        let node = &mut self.graph[idx];
        node.resolved = resolved;
        node.resolved_dirty = false;
    }

    /// Refresh every dirty node; `force` refreshes all reachable nodes.
    pub fn refresh_resolved_all(
        &mut self,
        vars: &VariableStore,
        viewport_default: &ThemeMap,
        force: bool,
    ) {
        for idx in self.descendants(self.viewport) {
            if force || self.graph[idx].resolved_dirty {
                self.refresh_resolved(idx, vars, viewport_default);
            }
        }
    }

    /// True when the node is explicitly reusable or any ancestor is.
    pub fn is_reusable(&self, idx: NodeIndex) -> bool {
        let mut cur = Some(idx);
        while let Some(n) = cur {
            if self.graph[n].reusable {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
