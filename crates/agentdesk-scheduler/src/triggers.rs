//! Trigger registry with one live registration per task id.
//!
//! Every registration carries a revision number. The engine remembers the
//! revision a firing started under; if the task was re-registered or removed
//! while the action was running, the revision no longer matches and the
//! firing's outcome must not overwrite the newer schedule.

use std::collections::HashMap;

use crate::tasks::Timestamp;

/// What makes a registered task due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Due once `now >= at`.
    At(Timestamp),
    /// Probe the task's condition once `now >= next_probe`.
    Watch { next_probe: Timestamp },
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    trigger: Trigger,
    revision: u64,
}

#[derive(Debug, Default)]
pub struct TriggerRegistry {
    entries: HashMap<String, Registration>,
    next_revision: u64,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the trigger for `id`. Returns the new revision.
    pub fn register(&mut self, id: &str, trigger: Trigger) -> u64 {
        self.next_revision += 1;
        let revision = self.next_revision;
        self.entries
            .insert(id.to_string(), Registration { trigger, revision });
        revision
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: &str) -> Option<Trigger> {
        self.entries.get(id).map(|r| r.trigger)
    }

    pub fn revision(&self, id: &str) -> Option<u64> {
        self.entries.get(id).map(|r| r.revision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids whose time trigger is due at `now`.
    pub fn due_at(&self, now: Timestamp) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, r)| matches!(r.trigger, Trigger::At(at) if now >= at))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids whose condition should be probed at `now`.
    pub fn probes_due(&self, now: Timestamp) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, r)| matches!(r.trigger, Trigger::Watch { next_probe } if now >= next_probe))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Push a watch trigger's next probe back without bumping its revision.
    pub fn defer_probe(&mut self, id: &str, next_probe: Timestamp) {
        if let Some(reg) = self.entries.get_mut(id) {
            if let Trigger::Watch { .. } = reg.trigger {
                reg.trigger = Trigger::Watch { next_probe };
            }
        }
    }
}
