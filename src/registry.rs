//! Component registry.
//!
//! Holds the (base_weight, available, enabled) facts for every
//! registered detector and derives the effective weight table from
//! them. The table is a pure function of those facts, recomputed
//! whole and swapped in atomically rather than mutated field by field,
//! so concurrently running analyses only ever observe a complete table.

use crate::detectors::DetectorId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

/// Sum tolerance for the renormalized weights.
pub const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct ComponentEntry {
    base_weight: f64,
    available: bool,
    enabled: bool,
}

impl ComponentEntry {
    fn is_active(&self) -> bool {
        self.available && self.enabled
    }
}

/// Immutable snapshot of effective weights. `Σ weights == 1.0` whenever
/// any detector is active; otherwise the table collapses to the
/// always-on tactics detector at weight 1.0.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeightTable {
    weights: BTreeMap<DetectorId, f64>,
}

impl WeightTable {
    /// Effective weight for a detector; unregistered or inactive ids
    /// contribute zero.
    pub fn get(&self, id: DetectorId) -> f64 {
        self.weights.get(&id).copied().unwrap_or(0.0)
    }

    pub fn is_active(&self, id: DetectorId) -> bool {
        self.get(id) > 0.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (DetectorId, f64)> + '_ {
        self.weights.iter().map(|(id, w)| (*id, *w))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

pub struct ComponentRegistry {
    entries: Mutex<BTreeMap<DetectorId, ComponentEntry>>,
    table: RwLock<Arc<WeightTable>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            table: RwLock::new(Arc::new(compute_table(&BTreeMap::new()))),
        }
    }

    /// Record a detector's facts and recompute the table. Calling
    /// again for the same id replaces its facts; recomputation is
    /// idempotent and independent of registration order.
    pub fn register(&self, id: DetectorId, base_weight: f64, available: bool, enabled: bool) {
        let snapshot = {
            let mut entries = self.entries.lock().expect("registry entries poisoned");
            entries.insert(
                id,
                ComponentEntry {
                    base_weight: base_weight.max(0.0),
                    available,
                    enabled,
                },
            );
            entries.clone()
        };

        let table = Arc::new(compute_table(&snapshot));
        log::debug!("registry: recomputed weights {:?}", table.weights);
        *self.table.write().expect("registry table poisoned") = table;
    }

    /// Current table snapshot. Cheap to take and immune to later
    /// recomputation; an in-flight analysis keeps the table it
    /// started with.
    pub fn active_weights(&self) -> Arc<WeightTable> {
        Arc::clone(&self.table.read().expect("registry table poisoned"))
    }

    /// Availability/enablement flags for the technical-detail record.
    pub fn active_flags(&self) -> BTreeMap<DetectorId, bool> {
        let entries = self.entries.lock().expect("registry entries poisoned");
        entries
            .iter()
            .map(|(id, entry)| (*id, entry.is_active()))
            .collect()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure recomputation: base weights of active detectors rescaled to
/// sum 1.0, or the tactics-only fallback when nothing is active.
fn compute_table(entries: &BTreeMap<DetectorId, ComponentEntry>) -> WeightTable {
    let active_sum: f64 = entries
        .values()
        .filter(|e| e.is_active())
        .map(|e| e.base_weight)
        .sum();

    if active_sum <= 0.0 {
        let mut weights = BTreeMap::new();
        weights.insert(DetectorId::Tactics, 1.0);
        return WeightTable { weights };
    }

    let weights = entries
        .iter()
        .filter(|(_, e)| e.is_active() && e.base_weight > 0.0)
        .map(|(id, e)| (*id, e.base_weight / active_sum))
        .collect();
    WeightTable { weights }
}
