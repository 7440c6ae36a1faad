//! Last-known state per machine and transition detection.
//!
//! Every machine owns a [`MachineSlot`] behind its own mutex: the stored
//! [`MachineState`] plus the classifier's [`MachineHistory`]. Work for one
//! machine is serialized on that mutex while different machines proceed in
//! parallel. The outer map lock is only held long enough to find or insert a
//! slot.

use crate::core::classifier::MachineHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Stored occupancy of a single machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub machine_id: String,
    pub occupied: bool,
    pub last_changed_at: DateTime<Utc>,
}

impl MachineState {
    fn available(machine_id: &str) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            occupied: false,
            last_changed_at: Utc::now(),
        }
    }
}

/// A detected transition, broadcast verbatim to subscribers.
///
/// Serializes as `{"id": "<machineId>", "status": <bool>}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "id")]
    pub machine_id: String,
    pub status: bool,
}

/// Everything the registry keeps for one machine.
#[derive(Debug)]
pub struct MachineSlot {
    pub state: MachineState,
    pub history: MachineHistory,
}

impl MachineSlot {
    fn new(machine_id: &str) -> Self {
        Self {
            state: MachineState::available(machine_id),
            history: MachineHistory::default(),
        }
    }

    /// Store a new decision, returning an event only if it differs.
    pub fn apply(&mut self, occupied: bool) -> Option<StatusEvent> {
        if self.state.occupied == occupied {
            return None;
        }
        self.state.occupied = occupied;
        self.state.last_changed_at = Utc::now();
        Some(StatusEvent {
            machine_id: self.state.machine_id.clone(),
            status: occupied,
        })
    }

    /// Return to the default "available" state and drop the smoothing window.
    pub fn reset(&mut self) -> Option<StatusEvent> {
        self.history.clear();
        self.apply(false)
    }
}

/// Keyed store of machine slots.
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: RwLock<HashMap<String, Arc<Mutex<MachineSlot>>>>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, machine_id: &str) -> Arc<Mutex<MachineSlot>> {
        {
            let machines = self.machines.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = machines.get(machine_id) {
                return Arc::clone(slot);
            }
        }

        let mut machines = self.machines.write().unwrap_or_else(PoisonError::into_inner);
        let slot = machines.entry(machine_id.to_string()).or_insert_with(|| {
            tracing::info!(machine_id, "Registered new machine");
            Arc::new(Mutex::new(MachineSlot::new(machine_id)))
        });
        Arc::clone(slot)
    }

    /// Run `f` with exclusive access to the machine's slot, creating it first
    /// if needed.
    pub fn update<R>(&self, machine_id: &str, f: impl FnOnce(&mut MachineSlot) -> R) -> R {
        let slot = self.slot(machine_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Current state of a machine, registering it as available on first access.
    pub fn get_or_create(&self, machine_id: &str) -> MachineState {
        self.update(machine_id, |slot| slot.state.clone())
    }

    /// Current state of a machine if it has been seen.
    pub fn get(&self, machine_id: &str) -> Option<MachineState> {
        let slot = {
            let machines = self.machines.read().unwrap_or_else(PoisonError::into_inner);
            machines.get(machine_id).cloned()
        }?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.state.clone())
    }

    /// Store a classifier decision, returning an event only on a transition.
    pub fn apply_classification(&self, machine_id: &str, occupied: bool) -> Option<StatusEvent> {
        self.update(machine_id, |slot| slot.apply(occupied))
    }

    /// Force a machine back to "available".
    pub fn reset(&self, machine_id: &str) -> Option<StatusEvent> {
        self.update(machine_id, MachineSlot::reset)
    }

    /// All known machines, ordered by id.
    pub fn snapshot(&self) -> Vec<MachineState> {
        let slots: Vec<_> = {
            let machines = self.machines.read().unwrap_or_else(PoisonError::into_inner);
            machines.values().cloned().collect()
        };
        let mut states: Vec<MachineState> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).state.clone())
            .collect();
        states.sort_by(|a, b| a.machine_id.cmp(&b.machine_id));
        states
    }

    pub fn len(&self) -> usize {
        self.machines.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
