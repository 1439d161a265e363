use crate::activity::{Cadence, Runnable, Scope};
use crate::error::SchedulerError;
use crate::interface::InterfaceRef;
use chrono::{DateTime, NaiveTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of periodic activities the slot table can hold.
pub const MAX_ACTIVITIES: usize = 64;

/// Index of a slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

/// Per-target run statistics, updated by worker threads.
#[derive(Debug, Default)]
pub(crate) struct TargetStats {
    pub(crate) runs: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) not_executed: AtomicU64,
    pub(crate) deferred: AtomicU64,
    /// Milliseconds since the epoch; 0 until the first run starts.
    pub(crate) last_start_ms: AtomicI64,
    pub(crate) last_duration_ms: AtomicU64,
}

impl TargetStats {
    pub(crate) fn record_start(&self, at: DateTime<Utc>) {
        self.last_start_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub(crate) fn record_finish(&self, elapsed: Duration, failed: bool) {
        self.last_duration_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.runs.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Clears the in-flight flag of a target when the run ends, however it ends.
pub(crate) struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One execution context of a slot: an interface, or the system.
pub(crate) struct Target {
    pub(crate) interface: InterfaceRef,
    pub(crate) in_flight: Arc<AtomicBool>,
    pub(crate) stats: Arc<TargetStats>,
}

impl Target {
    fn new(interface: InterfaceRef) -> Self {
        Self {
            interface,
            in_flight: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(TargetStats::default()),
        }
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

pub(crate) struct Slot {
    pub(crate) name: Arc<str>,
    pub(crate) handle: Arc<dyn Runnable>,
    pub(crate) cadence: Cadence,
    pub(crate) scope: Scope,
    pub(crate) enabled: bool,
    pub(crate) last_run: Option<DateTime<Utc>>,
    /// Next natural due time of a daily slot.
    pub(crate) next_due: Option<DateTime<Utc>>,
    pub(crate) forced: bool,
    pub(crate) targets: Vec<Target>,
}

impl Slot {
    pub(crate) fn new(
        name: Arc<str>,
        handle: Arc<dyn Runnable>,
        cadence: Cadence,
        scope: Scope,
        enabled: bool,
        interfaces: &[InterfaceRef],
    ) -> Self {
        let targets = match scope {
            Scope::PerInterface => interfaces.iter().cloned().map(Target::new).collect(),
            Scope::SystemWide => vec![Target::new(InterfaceRef::system())],
        };
        Self {
            name,
            handle,
            cadence,
            scope,
            enabled,
            last_run: None,
            next_due: None,
            forced: false,
            targets,
        }
    }

    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.forced {
            return true;
        }
        match self.cadence {
            Cadence::Periodic(interval) => match self.last_run {
                None => true,
                Some(last) => (now - last).to_std().is_ok_and(|elapsed| elapsed >= interval),
            },
            Cadence::Daily => self.next_due.is_some_and(|due| now >= due),
            Cadence::DailyDelayed => false,
        }
    }

    /// Anchor the slot at `now` as if it had just been submitted.
    pub(crate) fn mark_submitted(&mut self, now: DateTime<Utc>, daily_at: NaiveTime) {
        self.last_run = Some(now);
        self.forced = false;
        if self.cadence.is_daily() {
            self.next_due = Some(next_daily_due(now, daily_at));
        }
    }

    pub(crate) fn target_for(&self, interface: &InterfaceRef) -> Option<&Target> {
        match self.scope {
            Scope::SystemWide => self.targets.first(),
            Scope::PerInterface => self.targets.iter().find(|t| t.interface.id == interface.id),
        }
    }
}

/// First occurrence of `at` strictly after `after`.
pub(crate) fn next_daily_due(after: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = after.date_naive().and_time(at).and_utc();
    if today > after {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Fixed-capacity table of periodic activities. Slots are never removed.
#[derive(Default)]
pub(crate) struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub(crate) fn with_capacity(requested: usize) -> Result<Self, SchedulerError> {
        if requested > MAX_ACTIVITIES {
            return Err(SchedulerError::TooManyActivities {
                requested,
                max: MAX_ACTIVITIES,
            });
        }
        Ok(Self {
            slots: Vec::with_capacity(MAX_ACTIVITIES),
        })
    }

    pub(crate) fn push(&mut self, slot: Slot) -> Result<SlotId, SchedulerError> {
        if self.slots.len() >= MAX_ACTIVITIES {
            return Err(SchedulerError::TooManyActivities {
                requested: self.slots.len() + 1,
                max: MAX_ACTIVITIES,
            });
        }
        if self.find(&slot.name).is_some() {
            return Err(SchedulerError::DuplicateActivity(slot.name.to_string()));
        }
        self.slots.push(slot);
        Ok(SlotId(self.slots.len() - 1))
    }

    pub(crate) fn find(&self, name: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| &*slot.name == name)
            .map(SlotId)
    }

    pub(crate) fn get(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id.0]
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SlotId> {
        (0..self.slots.len()).map(SlotId)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Daily work that found the pool saturated, waiting for a free worker.
#[derive(Default)]
pub(crate) struct DelayedSlot {
    pub(crate) pending: VecDeque<(SlotId, usize)>,
    pub(crate) last_run: Option<DateTime<Utc>>,
    pub(crate) deferrals: u64,
    pub(crate) submitted: u64,
}

impl DelayedSlot {
    /// Queue a target of a daily slot. Returns false when it is already queued.
    pub(crate) fn defer(&mut self, slot: SlotId, target: usize) -> bool {
        if self.pending.contains(&(slot, target)) {
            return false;
        }
        self.pending.push_back((slot, target));
        self.deferrals += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActivityResult;
    use crate::ActivityContext;
    use chrono::TimeZone;

    fn noop() -> Arc<dyn Runnable> {
        Arc::new(|_: &ActivityContext| -> ActivityResult { Ok(()) })
    }

    fn slot(name: &str, cadence: Cadence) -> Slot {
        Slot::new(name.into(), noop(), cadence, Scope::SystemWide, true, &[])
    }

    #[test]
    fn periodic_slot_is_due_after_its_interval() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut s = slot("minute", Cadence::Periodic(Duration::from_secs(60)));
        assert!(s.is_due(start));

        s.mark_submitted(start, NaiveTime::MIN);
        assert!(!s.is_due(start + chrono::Duration::seconds(59)));
        assert!(s.is_due(start + chrono::Duration::seconds(60)));
        assert!(!s.is_due(start - chrono::Duration::seconds(5)));
    }

    #[test]
    fn daily_anchor_is_strictly_after() {
        let at = NaiveTime::from_hms_opt(3, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        let exactly = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(
            next_daily_due(before, at),
            Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()
        );
        assert_eq!(
            next_daily_due(exactly, at),
            Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn forced_daily_slot_is_due_once() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut s = slot("daily", Cadence::Daily);
        s.next_due = Some(next_daily_due(now, NaiveTime::MIN));
        assert!(!s.is_due(now));

        s.forced = true;
        assert!(s.is_due(now));
        s.mark_submitted(now, NaiveTime::MIN);
        assert!(!s.is_due(now + chrono::Duration::seconds(1)));
        assert!(s.is_due(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn run_guard_allows_one_holder() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = RunGuard::try_acquire(&flag).unwrap();
        assert!(RunGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(RunGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn table_rejects_overflow_and_duplicates() {
        let mut table = SlotTable::with_capacity(0).unwrap();
        for i in 0..MAX_ACTIVITIES {
            table
                .push(slot(&format!("a{i}"), Cadence::Periodic(Duration::from_secs(1))))
                .unwrap();
        }
        assert!(matches!(
            table.push(slot("overflow", Cadence::Daily)),
            Err(SchedulerError::TooManyActivities { .. })
        ));
        assert!(matches!(
            SlotTable::with_capacity(MAX_ACTIVITIES + 1),
            Err(SchedulerError::TooManyActivities { requested: 65, max: 64 })
        ));

        let mut table = SlotTable::default();
        table.push(slot("dup", Cadence::Daily)).unwrap();
        assert!(matches!(
            table.push(slot("dup", Cadence::Daily)),
            Err(SchedulerError::DuplicateActivity(_))
        ));
    }

    #[test]
    fn delayed_slot_does_not_queue_twice() {
        let mut delayed = DelayedSlot::default();
        assert!(delayed.defer(SlotId(0), 0));
        assert!(!delayed.defer(SlotId(0), 0));
        assert!(delayed.defer(SlotId(0), 1));
        assert_eq!(delayed.pending.len(), 2);
        assert_eq!(delayed.deferrals, 2);
    }
}
