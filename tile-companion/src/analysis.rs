use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use tracing::{debug, warn};

use crate::{
    events::{RecordAction, Seat},
    notify::CompanionNotifier,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub match_id: String,
    pub seat: Seat,
}

impl AnalysisKey {
    pub fn new(match_id: impl Into<String>, seat: Seat) -> Self {
        Self {
            match_id: match_id.into(),
            seat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub actions_analyzed: usize,
    pub summary: String,
}

pub trait Advisor: Send + Sync {
    fn analyze(&self, seat: Seat, actions: &[RecordAction]) -> Advisory;
}

#[derive(Debug, Default)]
pub struct SnapshotAdvisor;

impl Advisor for SnapshotAdvisor {
    fn analyze(&self, seat: Seat, actions: &[RecordAction]) -> Advisory {
        let last = actions
            .last()
            .map(|action| action.name.as_str())
            .unwrap_or("nothing");
        let outcome = if actions.iter().any(RecordAction::ends_round) {
            "finished"
        } else {
            "in progress"
        };
        Advisory {
            actions_analyzed: actions.len(),
            summary: format!("seat {seat}: round {outcome}, last action {last}"),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    task_id: u64,
    advisory: Option<Advisory>,
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores a finished result unless a newer task has taken the slot since.
fn publish(slot: &Mutex<Slot>, task_id: u64, advisory: Advisory) -> bool {
    let mut guard = lock_slot(slot);
    if guard.task_id != task_id {
        return false;
    }
    guard.advisory = Some(advisory);
    true
}

#[derive(Debug)]
struct AnalysisEntry {
    slot: Arc<Mutex<Slot>>,
    last_generation: u64,
    tasks_started: u64,
}

impl AnalysisEntry {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            last_generation: 0,
            tasks_started: 0,
        }
    }
}

// Runs are never interrupted. A superseded run keeps going on its own
// snapshot and its result is dropped. Entries not touched within the last
// `retained_generations` starts are evicted.
pub struct AnalysisTaskManager {
    advisor: Arc<dyn Advisor>,
    notifier: Arc<dyn CompanionNotifier>,
    entries: HashMap<AnalysisKey, AnalysisEntry>,
    active: Option<AnalysisKey>,
    generation: u64,
    retained_generations: u64,
}

impl AnalysisTaskManager {
    pub fn new(
        advisor: Arc<dyn Advisor>,
        notifier: Arc<dyn CompanionNotifier>,
        retained_generations: u64,
    ) -> Self {
        Self {
            advisor,
            notifier,
            entries: HashMap::new(),
            active: None,
            generation: 0,
            retained_generations: retained_generations.max(1),
        }
    }

    pub fn ensure(&mut self, key: AnalysisKey, snapshot: Arc<[RecordAction]>) -> u64 {
        self.generation += 1;
        let task_id = self.generation;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(AnalysisEntry::new);
        entry.last_generation = task_id;
        entry.tasks_started += 1;
        {
            let mut slot = lock_slot(&entry.slot);
            slot.task_id = task_id;
            slot.advisory = None;
        }

        let slot = Arc::clone(&entry.slot);
        let advisor = Arc::clone(&self.advisor);
        let notifier = Arc::clone(&self.notifier);
        let task_key = key.clone();
        let spawned = thread::Builder::new()
            .name(format!("analysis-{}-{}", key.match_id, key.seat))
            .spawn(move || {
                let advisory = advisor.analyze(task_key.seat, &snapshot);
                if publish(&slot, task_id, advisory.clone()) {
                    notifier.advisory_ready(&task_key, &advisory);
                } else {
                    debug!(record = %task_key.match_id, seat = task_key.seat, task_id, "superseded analysis finished");
                }
            });
        match spawned {
            Ok(_) => debug!(
                record = %key.match_id,
                seat = key.seat,
                task_id,
                runs = entry.tasks_started,
                "analysis started"
            ),
            Err(err) => {
                warn!(?err, record = %key.match_id, seat = key.seat, "failed to start analysis thread");
            }
        }

        self.active = Some(key);
        self.evict_stale();
        task_id
    }

    pub fn restart_active(&mut self, snapshot: Arc<[RecordAction]>) -> Option<u64> {
        let key = self.active.clone()?;
        Some(self.ensure(key, snapshot))
    }

    pub fn clear_match(&mut self, match_id: &str) {
        self.entries.retain(|key, _| key.match_id != match_id);
        if self
            .active
            .as_ref()
            .map(|key| key.match_id == match_id)
            .unwrap_or(false)
        {
            self.active = None;
        }
    }

    fn evict_stale(&mut self) {
        let generation = self.generation;
        let window = self.retained_generations;
        let active = self.active.clone();
        self.entries.retain(|key, entry| {
            Some(key) == active.as_ref() || generation - entry.last_generation < window
        });
    }
}

#[cfg(test)]
impl AnalysisTaskManager {
    pub fn active_key(&self) -> Option<&AnalysisKey> {
        self.active.as_ref()
    }

    pub fn contains(&self, key: &AnalysisKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn tasks_started(&self, key: &AnalysisKey) -> u64 {
        self.entries
            .get(key)
            .map(|entry| entry.tasks_started)
            .unwrap_or(0)
    }

    pub fn advisory(&self, key: &AnalysisKey) -> Option<Advisory> {
        self.entries
            .get(key)
            .and_then(|entry| lock_slot(&entry.slot).advisory.clone())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::{Advisor, Advisory};
    use crate::events::{RecordAction, Seat};

    #[derive(Debug, Default)]
    pub struct CountingAdvisor {
        pub calls: Mutex<Vec<(Seat, usize)>>,
    }

    impl Advisor for CountingAdvisor {
        fn analyze(&self, seat: Seat, actions: &[RecordAction]) -> Advisory {
            self.calls
                .lock()
                .expect("advisor lock")
                .push((seat, actions.len()));
            Advisory {
                actions_analyzed: actions.len(),
                summary: format!("seat {seat}"),
            }
        }
    }
}
