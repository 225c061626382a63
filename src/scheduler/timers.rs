//! Per-target timer registry, owned by the coordination loop.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use crate::target::{PlatformId, ScrapeTarget};

#[derive(Debug)]
struct TimerEntry {
    target: ScrapeTarget,
    interval: Duration,
    next_due: Instant,
}

/// What changed during one reconcile.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct Reconciled {
    pub added: usize,
    pub removed: usize,
    pub retimed: usize,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.retimed == 0
    }
}

/// One timer per known target plus the set of targets with a job queued or
/// running.
///
/// In-flight tracking is kept apart from the timers so that a target removed
/// and re-added while its job is still running is not dispatched twice.
#[derive(Debug)]
pub(super) struct TimerRegistry {
    default_interval: Duration,
    entries: HashMap<PlatformId, TimerEntry>,
    in_flight: HashSet<PlatformId>,
}

impl TimerRegistry {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            entries: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, id: PlatformId) -> bool {
        self.in_flight.contains(&id)
    }

    fn interval_of(&self, target: &ScrapeTarget) -> Duration {
        target
            .interval
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_interval)
    }

    /// Bring the timers in line with a fresh target snapshot.
    ///
    /// New targets are due immediately. A target whose interval changed is
    /// re-timed to fire one new interval from `now`. Later duplicates of an
    /// id replace earlier ones.
    pub fn reconcile(&mut self, targets: Vec<ScrapeTarget>, now: Instant) -> Reconciled {
        let mut result = Reconciled::default();
        let mut seen = HashSet::with_capacity(targets.len());

        for target in targets {
            let interval = self.interval_of(&target);
            seen.insert(target.id);
            match self.entries.get_mut(&target.id) {
                Some(entry) => {
                    if entry.interval != interval {
                        entry.interval = interval;
                        entry.next_due = now + interval;
                        result.retimed += 1;
                    }
                    entry.target = target;
                }
                None => {
                    self.entries.insert(
                        target.id,
                        TimerEntry {
                            target,
                            interval,
                            next_due: now,
                        },
                    );
                    result.added += 1;
                }
            }
        }

        let before = self.entries.len();
        self.entries.retain(|id, _| seen.contains(id));
        result.removed = before - self.entries.len();
        result
    }

    /// Take every due target that has no job in flight.
    ///
    /// Returned targets are marked in flight and their timers advanced by
    /// one interval, oldest deadline first. A timer that fell more than an
    /// interval behind restarts from `now` instead of firing a burst.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScrapeTarget> {
        let mut due: Vec<(Instant, PlatformId)> = self
            .entries
            .iter()
            .filter(|(id, entry)| entry.next_due <= now && !self.in_flight.contains(*id))
            .map(|(id, entry)| (entry.next_due, *id))
            .collect();
        due.sort();

        let mut targets = Vec::with_capacity(due.len());
        for (_, id) in due {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            entry.next_due += entry.interval;
            if entry.next_due <= now {
                entry.next_due = now + entry.interval;
            }
            self.in_flight.insert(id);
            targets.push(entry.target.clone());
        }
        targets
    }

    /// Mark a target's job as finished.
    pub fn complete(&mut self, id: PlatformId) {
        self.in_flight.remove(&id);
    }
}
