//! Variables and themes.
//!
//! A variable is a named, typed binding whose value can differ per theme.
//! Resolution picks the *last* themed value whose selector is a subset of
//! the active theme, falling back to the type's default. Property slots
//! holding a variable handle register a listener entry so their resolved
//! caches can be invalidated when the variable changes; listeners never
//! mutate the graph.

use crate::error::{Error, ErrorKind, Result};
use crate::model::{Color, PropKey};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ─── Themes ──────────────────────────────────────────────────────────────

/// A (partial) theme: axis → value.
pub type ThemeMap = BTreeMap<String, String>;

/// One theme axis with its ordered values; the first value is the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeAxis {
    pub axis: String,
    pub values: Vec<String>,
}

/// The viewport's default theme: the first value of every axis.
pub fn default_theme(axes: &[ThemeAxis]) -> ThemeMap {
    axes.iter()
        .filter_map(|a| {
            a.values
                .first()
                .map(|v| (a.axis.clone(), v.clone()))
        })
        .collect()
}

/// Whether `selector` is a subset of `active` (every axis pinned by the
/// selector holds the same value in the active theme).
pub fn theme_matches(selector: &ThemeMap, active: &ThemeMap) -> bool {
    selector
        .iter()
        .all(|(axis, value)| active.get(axis) == Some(value))
}

// ─── Variables ───────────────────────────────────────────────────────────

/// Handle into the variable store. Stable for the document's lifetime;
/// deleted slots are tombstoned, never reused, so undo can restore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Boolean,
    Number,
    Color,
    String,
}

impl VarType {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Color => "color",
            Self::String => "string",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(Self::Boolean),
            "number" => Some(Self::Number),
            "color" => Some(Self::Color),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Boolean(bool),
    Number(f64),
    Color(Color),
    String(String),
}

impl VarValue {
    pub fn var_type(&self) -> VarType {
        match self {
            Self::Boolean(_) => VarType::Boolean,
            Self::Number(_) => VarType::Number,
            Self::Color(_) => VarType::Color,
            Self::String(_) => VarType::String,
        }
    }

    /// The type defaults used when no themed value matches:
    /// false / 0 / #000000 / "".
    pub fn default_for(ty: VarType) -> Self {
        match ty {
            VarType::Boolean => Self::Boolean(false),
            VarType::Number => Self::Number(0.0),
            VarType::Color => Self::Color(Color::BLACK),
            VarType::String => Self::String(String::new()),
        }
    }
}

/// One value arm: the value plus the theme selector it applies under.
/// `theme: None` matches any active theme.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemedValue {
    pub value: VarValue,
    pub theme: Option<ThemeMap>,
}

impl ThemedValue {
    pub fn always(value: VarValue) -> Self {
        Self { value, theme: None }
    }

    pub fn themed(value: VarValue, theme: ThemeMap) -> Self {
        Self {
            value,
            theme: Some(theme),
        }
    }
}

/// A dependent property resolution: which node slot holds this variable.
pub type Listener = (NodeIndex, PropKey);

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: VarType,
    pub values: Vec<ThemedValue>,
    /// Exactly one entry per property slot currently holding this handle.
    pub(crate) listeners: Vec<Listener>,
}

// ─── Store ───────────────────────────────────────────────────────────────

/// Owning store with a name index. All mutation goes through the update
/// block, which records inverses.
#[derive(Debug, Default)]
pub struct VariableStore {
    slots: Vec<Option<Variable>>,
    by_name: HashMap<String, VarId>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, ty: VarType) -> Result<VarId> {
        if self.by_name.contains_key(name) {
            return Err(Error::new(ErrorKind::DuplicateName, name));
        }
        let id = VarId(self.slots.len() as u32);
        self.slots.push(Some(Variable {
            name: name.to_string(),
            ty,
            values: Vec::new(),
            listeners: Vec::new(),
        }));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Look up by name, checking the expected type.
    pub fn lookup_typed(&self, name: &str, expected: VarType) -> Result<VarId> {
        let id = self
            .lookup(name)
            .ok_or_else(|| Error::not_found(format!("variable {name}")))?;
        let var = self.var(id);
        if var.ty != expected {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                format!(
                    "variable {name} is {}, expected {}",
                    var.ty.wire_name(),
                    expected.wire_name()
                ),
            ));
        }
        Ok(id)
    }

    /// Panics on a tombstoned or foreign handle — holding one is a
    /// corrupted-invariant bug, not an input error.
    pub fn var(&self, id: VarId) -> &Variable {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("stale variable handle")
    }

    pub fn try_var(&self, id: VarId) -> Option<&Variable> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<VarId> {
        if old != new && self.by_name.contains_key(new) {
            return Err(Error::new(ErrorKind::DuplicateName, new));
        }
        let id = self
            .by_name
            .remove(old)
            .ok_or_else(|| Error::not_found(format!("variable {old}")))?;
        self.by_name.insert(new.to_string(), id);
        if let Some(var) = &mut self.slots[id.0 as usize] {
            var.name = new.to_string();
        }
        Ok(id)
    }

    /// Tombstone a variable, returning it for the undo journal.
    pub fn remove(&mut self, id: VarId) -> Variable {
        let var = self.slots[id.0 as usize]
            .take()
            .expect("stale variable handle");
        self.by_name.remove(&var.name);
        var
    }

    /// Reverse of `remove`: put a journalled variable back in its slot.
    pub fn restore(&mut self, id: VarId, var: Variable) {
        self.by_name.insert(var.name.clone(), id);
        self.slots[id.0 as usize] = Some(var);
    }

    /// Replace the value list, returning the previous one.
    pub fn set_values(&mut self, id: VarId, values: Vec<ThemedValue>) -> Vec<ThemedValue> {
        let var = self.slots[id.0 as usize]
            .as_mut()
            .expect("stale variable handle");
        std::mem::replace(&mut var.values, values)
    }

    /// Last themed value whose selector is a subset of `theme`; type
    /// default when none match.
    pub fn resolve(&self, id: VarId, theme: &ThemeMap) -> VarValue {
        let var = self.var(id);
        var.values
            .iter()
            .rev()
            .find(|tv| {
                tv.theme
                    .as_ref()
                    .map_or(true, |sel| theme_matches(sel, theme))
            })
            .map(|tv| tv.value.clone())
            .unwrap_or_else(|| VarValue::default_for(var.ty))
    }

    pub fn subscribe(&mut self, id: VarId, node: NodeIndex, key: PropKey) {
        let var = self.slots[id.0 as usize]
            .as_mut()
            .expect("stale variable handle");
        if !var.listeners.contains(&(node, key)) {
            var.listeners.push((node, key));
        }
    }

    pub fn unsubscribe(&mut self, id: VarId, node: NodeIndex, key: PropKey) {
        if let Some(var) = self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut()) {
            var.listeners.retain(|l| *l != (node, key));
        }
    }

    pub fn listeners(&self, id: VarId) -> &[Listener] {
        &self.var(id).listeners
    }

    /// Drop every listener registered by `node` (used when a subtree is
    /// permanently freed).
    pub fn unsubscribe_node(&mut self, node: NodeIndex) {
        for slot in self.slots.iter_mut().flatten() {
            slot.listeners.retain(|(n, _)| *n != node);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (VarId(i as u32), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(pairs: &[(&str, &str)]) -> ThemeMap {
        pairs
            .iter()
            .map(|(a, v)| (a.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut store = VariableStore::new();
        store.add("accent", VarType::Color).unwrap();
        let err = store.add("accent", VarType::Number).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateName);
    }

    #[test]
    fn typed_lookup_checks_type() {
        let mut store = VariableStore::new();
        store.add("gap", VarType::Number).unwrap();
        assert!(store.lookup_typed("gap", VarType::Number).is_ok());
        let err = store.lookup_typed("gap", VarType::Color).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
        let err = store.lookup_typed("missing", VarType::Color).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn resolution_prefers_last_subset_match() {
        let mut store = VariableStore::new();
        let id = store.add("accent", VarType::Color).unwrap();
        store.set_values(
            id,
            vec![
                ThemedValue::always(VarValue::Color(Color::from_hex("#FF0000").unwrap())),
                ThemedValue::themed(
                    VarValue::Color(Color::from_hex("#0000FF").unwrap()),
                    theme(&[("mode", "dark")]),
                ),
            ],
        );

        let light = store.resolve(id, &theme(&[("mode", "light")]));
        assert_eq!(light, VarValue::Color(Color::from_hex("#FF0000").unwrap()));

        let dark = store.resolve(id, &theme(&[("mode", "dark")]));
        assert_eq!(dark, VarValue::Color(Color::from_hex("#0000FF").unwrap()));
    }

    #[test]
    fn unmatched_resolution_uses_type_default() {
        let mut store = VariableStore::new();
        let id = store.add("visible", VarType::Boolean).unwrap();
        store.set_values(
            id,
            vec![ThemedValue::themed(
                VarValue::Boolean(true),
                theme(&[("density", "compact")]),
            )],
        );
        let value = store.resolve(id, &theme(&[("density", "cozy")]));
        assert_eq!(value, VarValue::Boolean(false));
    }

    #[test]
    fn rename_is_atomic_and_checked() {
        let mut store = VariableStore::new();
        let id = store.add("primary", VarType::Color).unwrap();
        store.add("secondary", VarType::Color).unwrap();

        let err = store.rename("primary", "secondary").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateName);
        assert_eq!(store.lookup("primary"), Some(id));

        store.rename("primary", "brand").unwrap();
        assert_eq!(store.lookup("brand"), Some(id));
        assert_eq!(store.lookup("primary"), None);
        assert_eq!(store.var(id).name, "brand");
    }

    #[test]
    fn remove_and_restore_keep_handles_stable() {
        let mut store = VariableStore::new();
        let id = store.add("gap", VarType::Number).unwrap();
        let var = store.remove(id);
        assert!(store.lookup("gap").is_none());
        store.restore(id, var);
        assert_eq!(store.lookup("gap"), Some(id));
    }

    #[test]
    fn default_theme_takes_first_axis_values() {
        let axes = vec![
            ThemeAxis {
                axis: "mode".into(),
                values: vec!["light".into(), "dark".into()],
            },
            ThemeAxis {
                axis: "density".into(),
                values: vec!["cozy".into()],
            },
        ];
        let t = default_theme(&axes);
        assert_eq!(t.get("mode").map(String::as_str), Some("light"));
        assert_eq!(t.get("density").map(String::as_str), Some("cozy"));
    }
}
