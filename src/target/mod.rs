//! Target specifications and resolution against a live fleet inventory.

pub mod glob;

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use glob::{glob_match, validate_pattern};

/// A pattern identifying zero or more agents.
///
/// Resolved lazily at submission time and never cached across jobs, since
/// fleet membership may change between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSpec {
    /// Shell-style glob over target ids, e.g. `web-*`.
    Glob(String),
    /// Explicit list of target ids.
    List(Vec<String>),
    /// Named group defined by the inventory.
    Group(String),
}

/// One addressable remote agent. Immutable once resolved for a job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Unique agent identifier.
    pub id: String,
    /// Transport address, opaque to this core.
    pub addr: String,
}

impl Target {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

/// Live fleet membership source.
///
/// External collaborator in production (an inventory service); tests and
/// embedded use wire up [`StaticInventory`]. Implementations return a
/// point-in-time snapshot; the resolver queries it fresh for every job.
pub trait Inventory: Send + Sync {
    /// All currently known members of the fleet.
    fn members(&self) -> Vec<Target>;

    /// Members of a named group, or None if the group is not defined.
    fn group(&self, name: &str) -> Option<Vec<Target>>;
}

/// In-memory inventory with mutable membership and named groups.
#[derive(Default)]
pub struct StaticInventory {
    inner: RwLock<InventoryState>,
}

#[derive(Default)]
struct InventoryState {
    members: HashMap<String, Target>,
    groups: HashMap<String, BTreeSet<String>>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, target: Target) {
        let mut state = self.inner.write().expect("inventory lock poisoned");
        state.members.insert(target.id.clone(), target);
    }

    pub fn remove_member(&self, id: &str) -> bool {
        let mut state = self.inner.write().expect("inventory lock poisoned");
        for group in state.groups.values_mut() {
            group.remove(id);
        }
        state.members.remove(id).is_some()
    }

    /// Add a member id to a named group, creating the group if needed.
    /// Unknown ids are accepted; they simply resolve to nothing until the
    /// member joins.
    pub fn add_to_group(&self, group: &str, id: &str) {
        let mut state = self.inner.write().expect("inventory lock poisoned");
        state
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(id.to_string());
    }

    pub fn member_count(&self) -> usize {
        self.inner
            .read()
            .expect("inventory lock poisoned")
            .members
            .len()
    }
}

impl Inventory for StaticInventory {
    fn members(&self) -> Vec<Target> {
        let state = self.inner.read().expect("inventory lock poisoned");
        state.members.values().cloned().collect()
    }

    fn group(&self, name: &str) -> Option<Vec<Target>> {
        let state = self.inner.read().expect("inventory lock poisoned");
        let ids = state.groups.get(name)?;
        Some(
            ids.iter()
                .filter_map(|id| state.members.get(id).cloned())
                .collect(),
        )
    }
}

/// Expand a target spec into a concrete set of targets.
///
/// Fails with `InvalidTargetSpec` only when the spec is syntactically
/// invalid. A well-formed spec that matches nothing returns an empty set;
/// intermittent membership changes make empty matches an expected,
/// reportable outcome rather than a fault.
pub fn resolve(spec: &TargetSpec, inventory: &dyn Inventory) -> Result<BTreeSet<Target>> {
    match spec {
        TargetSpec::Glob(pattern) => {
            validate_pattern(pattern)?;
            Ok(inventory
                .members()
                .into_iter()
                .filter(|t| glob_match(pattern, &t.id))
                .collect())
        }
        TargetSpec::List(ids) => {
            if ids.iter().any(|id| id.is_empty()) {
                return Err(FleetError::InvalidTargetSpec(
                    "target list contains an empty id".to_string(),
                ));
            }
            let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            Ok(inventory
                .members()
                .into_iter()
                .filter(|t| wanted.contains(t.id.as_str()))
                .collect())
        }
        TargetSpec::Group(name) => {
            if name.is_empty() {
                return Err(FleetError::InvalidTargetSpec(
                    "empty group name".to_string(),
                ));
            }
            // Unknown group resolves to nothing, same as an empty group
            Ok(inventory
                .group(name)
                .unwrap_or_default()
                .into_iter()
                .collect())
        }
    }
}
