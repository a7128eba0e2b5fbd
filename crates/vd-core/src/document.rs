//! The per-document owner: scene + variables + themes + undo history.
//!
//! There are no process-wide singletons; everything a mutation touches
//! hangs off one `Document`, and the only way to mutate is through an
//! `UpdateBlock` obtained from `begin_update`. Commits are strictly
//! serialized — one open block at a time — so observers never see a state
//! mixing two in-flight blocks.

use crate::error::{Error, ErrorKind, Result};
use crate::layout::{self, HeuristicMeasurer, TextMeasurer};
use crate::model::{Connection, PropKey};
use crate::scene::Scene;
use crate::update::{Action, UpdateBlock};
use crate::variable::{default_theme, ThemeAxis, ThemeMap, VariableStore};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;

pub(crate) struct UndoEntry {
    pub actions: Vec<Action>,
}

pub struct Document {
    pub scene: Scene,
    pub vars: VariableStore,
    pub themes: Vec<ThemeAxis>,
    pub connections: Vec<Connection>,
    pub(crate) undo_stack: Vec<UndoEntry>,
    pub(crate) redo_stack: Vec<UndoEntry>,
    max_undo_depth: usize,
    pub(crate) block_open: bool,
    pub(crate) measurer: Box<dyn TextMeasurer>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("themes", &self.themes)
            .field("connections", &self.connections)
            .field("max_undo_depth", &self.max_undo_depth)
            .field("block_open", &self.block_open)
            .finish()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_measurer(Box::new(HeuristicMeasurer))
    }

    /// Hosts with real font shaping inject their measurer here.
    pub fn with_measurer(measurer: Box<dyn TextMeasurer>) -> Self {
        Self {
            scene: Scene::new(),
            vars: VariableStore::new(),
            themes: Vec::new(),
            connections: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_undo_depth: 100,
            block_open: false,
            measurer,
        }
    }

    /// The viewport's active theme: the first value of every axis.
    pub fn viewport_theme(&self) -> ThemeMap {
        default_theme(&self.themes)
    }

    /// Open the document's single update block.
    pub fn begin_update(&mut self) -> Result<UpdateBlock<'_>> {
        if self.block_open {
            return Err(Error::new(ErrorKind::BlockAlreadyOpen, "document"));
        }
        self.block_open = true;
        Ok(UpdateBlock::new(self))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Revert the most recent committed block. Returns whether anything
    /// was undone.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.undo_stack.pop() else {
            return false;
        };
        let redo = self.replay(entry);
        self.redo_stack.push(redo);
        self.reconcile_derived();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        let undo = self.replay(entry);
        self.undo_stack.push(undo);
        self.reconcile_derived();
        true
    }

    /// Apply an entry's actions in reverse order, collecting their
    /// inverses as the opposite-direction entry.
    fn replay(&mut self, entry: UndoEntry) -> UndoEntry {
        let mut inverses = Vec::with_capacity(entry.actions.len());
        for action in entry.actions.into_iter().rev() {
            if let Some(inverse) = action.apply(self).expect("history replay failed: undo stack corrupted") {
                inverses.push(inverse);
            }
        }
        UndoEntry { actions: inverses }
    }

    /// Recompute resolution and layout after a replay (derived state is
    /// never journalled).
    fn reconcile_derived(&mut self) {
        let theme = self.viewport_theme();
        self.scene.refresh_resolved_all(&self.vars, &theme, true);
        for idx in self.scene.descendants(self.scene.viewport()) {
            crate::prototype::reconcile_overrides(&mut self.scene, idx);
        }
        let vp = self.scene.viewport();
        layout::run_layout(&mut self.scene, vp, self.measurer.as_ref());
    }

    /// Seal a committed journal: push the undo entry, clear redo, evict
    /// overflow, and sweep unreachable arena nodes.
    pub(crate) fn finish_commit(&mut self, journal: Vec<Action>, undo: bool) {
        log::debug!("commit: {} journal entries, undo={undo}", journal.len());
        if undo && !journal.is_empty() {
            self.undo_stack.push(UndoEntry { actions: journal });
            while self.undo_stack.len() > self.max_undo_depth {
                self.undo_stack.remove(0);
            }
        }
        self.redo_stack.clear();
        self.block_open = false;
        self.collect_garbage();
    }

    /// Whether a node is reachable from the viewport.
    pub fn is_attached(&self, idx: NodeIndex) -> bool {
        if !self.scene.contains(idx) {
            return false;
        }
        let mut cur = idx;
        loop {
            if cur == self.scene.viewport() {
                return true;
            }
            match self.scene.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    // ─── Subscriptions & invalidation ────────────────────────────────────

    /// Register listener entries for every variable handle in a subtree
    /// (called when the subtree becomes observable).
    pub(crate) fn subscribe_subtree(&mut self, root: NodeIndex) {
        for idx in self.scene.descendants(root) {
            for &key in PropKey::ALL {
                for var in self.scene.node(idx).props.var_refs(key) {
                    self.vars.subscribe(var, idx, key);
                }
            }
        }
    }

    pub(crate) fn unsubscribe_subtree(&mut self, root: NodeIndex) {
        for idx in self.scene.descendants(root) {
            for &key in PropKey::ALL {
                for var in self.scene.node(idx).props.var_refs(key) {
                    self.vars.unsubscribe(var, idx, key);
                }
            }
        }
    }

    /// Invalidate resolved caches after property writes. A theme override
    /// re-themes the whole subtree; any change invalidates the node itself
    /// plus every instance that falls back to its bag.
    pub(crate) fn invalidate_props(&mut self, node: NodeIndex, keys: &[PropKey]) {
        if keys.contains(&PropKey::ThemeKey) {
            self.invalidate_subtree(node);
        } else {
            self.scene.mark_resolved_dirty(node);
        }
        self.invalidate_instances(node);
    }

    pub(crate) fn invalidate_subtree(&mut self, root: NodeIndex) {
        for idx in self.scene.descendants(root) {
            self.scene.mark_resolved_dirty(idx);
            self.invalidate_instances(idx);
        }
    }

    fn invalidate_instances(&mut self, node: NodeIndex) {
        let instances = self.scene.node(node).instances.clone();
        for inst in instances {
            if self.scene.contains(inst) && !self.scene.node(inst).resolved_dirty {
                self.scene.mark_resolved_dirty(inst);
                self.invalidate_instances(inst);
            }
        }
    }

    // ─── Arena hygiene ───────────────────────────────────────────────────

    /// Free a detached subtree immediately (rollback of created nodes).
    pub(crate) fn free_detached_subtree(&mut self, root: NodeIndex) {
        for idx in self.scene.descendants(root) {
            crate::prototype::detach_from_prototype(&mut self.scene, idx);
            self.vars.unsubscribe_node(idx);
        }
        self.scene.free_subtree(root);
        self.prune_instance_backrefs();
    }

    /// Drop arena nodes that are neither reachable from the viewport nor
    /// referenced by any undo/redo entry.
    pub(crate) fn collect_garbage(&mut self) {
        let mut keep: HashSet<NodeIndex> = HashSet::new();
        for idx in self.scene.descendants(self.scene.viewport()) {
            keep.insert(idx);
        }
        for entry in self.undo_stack.iter().chain(self.redo_stack.iter()) {
            for action in &entry.actions {
                for node in action.referenced_nodes() {
                    if self.scene.contains(node) && !keep.contains(&node) {
                        for idx in self.scene.descendants(node) {
                            keep.insert(idx);
                        }
                    }
                }
            }
        }
        let doomed: Vec<NodeIndex> = self
            .scene
            .arena_indices()
            .into_iter()
            .filter(|idx| !keep.contains(idx))
            .collect();
        if doomed.is_empty() {
            return;
        }
        log::trace!("sweeping {} unreachable nodes", doomed.len());
        for &idx in &doomed {
            if self.scene.contains(idx) && self.scene.parent(idx).is_none() {
                for n in self.scene.descendants(idx) {
                    crate::prototype::detach_from_prototype(&mut self.scene, n);
                    self.vars.unsubscribe_node(n);
                }
                self.scene.free_subtree(idx);
            }
        }
        self.prune_instance_backrefs();
    }

    /// Remove instance back-references that point at freed arena slots.
    fn prune_instance_backrefs(&mut self) {
        let all = self.scene.arena_indices();
        for idx in all {
            let stale = self
                .scene
                .node(idx)
                .instances
                .iter()
                .any(|&i| !self.scene.contains(i));
            if stale {
                let live: smallvec::SmallVec<[NodeIndex; 2]> = {
                    let node = self.scene.node(idx);
                    node.instances
                        .iter()
                        .copied()
                        .filter(|&i| self.scene.contains(i))
                        .collect()
                };
                self.scene.node_mut(idx).instances = live;
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
