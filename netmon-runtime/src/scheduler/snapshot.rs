use super::slot::{DelayedSlot, Slot, SlotTable, Target};
use crate::activity::{Cadence, Scope};
use crate::interface::InterfaceRef;
use serde::Serialize;
use std::sync::atomic::Ordering;

/// Read-only view of the scheduler for one interface.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitiesSnapshot {
    pub running: bool,
    pub pool_size: usize,
    pub pool_busy: usize,
    pub activities: Vec<ActivitySnapshot>,
}

impl ActivitiesSnapshot {
    pub fn activity(&self, name: &str) -> Option<&ActivitySnapshot> {
        self.activities.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySnapshot {
    pub name: String,
    /// `periodic`, `daily` or `daily_delayed`.
    pub cadence: &'static str,
    pub interval_secs: u64,
    pub scope: Scope,
    pub enabled: bool,
    /// Seconds since the epoch.
    pub last_run: Option<i64>,
    pub next_due: Option<i64>,
    pub in_progress: bool,
    /// Deferred runs waiting for a free worker (`daily_delayed` only).
    pub pending: usize,
    pub stats: TargetSnapshot,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetSnapshot {
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub not_executed: u64,
    pub deferred: u64,
    /// Milliseconds since the epoch.
    pub last_start_ms: Option<i64>,
    pub last_duration_ms: u64,
    /// Last run took longer than the slot interval.
    pub slow: bool,
}

impl TargetSnapshot {
    fn of(target: &Target, cadence: Cadence) -> Self {
        let stats = &target.stats;
        let last_start = stats.last_start_ms.load(Ordering::Relaxed);
        let last_duration_ms = stats.last_duration_ms.load(Ordering::Relaxed);
        Self {
            runs: stats.runs.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            not_executed: stats.not_executed.load(Ordering::Relaxed),
            deferred: stats.deferred.load(Ordering::Relaxed),
            last_start_ms: (last_start != 0).then_some(last_start),
            last_duration_ms,
            slow: u128::from(last_duration_ms) > cadence.interval().as_millis(),
        }
    }
}

fn slot_snapshot(slot: &Slot, target: &Target) -> ActivitySnapshot {
    ActivitySnapshot {
        name: slot.name.to_string(),
        cadence: slot.cadence.class(),
        interval_secs: slot.cadence.interval().as_secs(),
        scope: slot.scope,
        enabled: slot.enabled,
        last_run: slot.last_run.map(|t| t.timestamp()),
        next_due: slot.next_due.map(|t| t.timestamp()),
        in_progress: target.is_in_flight(),
        pending: 0,
        stats: TargetSnapshot::of(target, slot.cadence),
    }
}

pub(crate) fn activities_for(
    table: &SlotTable,
    delayed: &DelayedSlot,
    has_daily: bool,
    interface: &InterfaceRef,
) -> Vec<ActivitySnapshot> {
    let mut activities: Vec<ActivitySnapshot> = table
        .iter()
        .filter_map(|slot| slot.target_for(interface).map(|target| slot_snapshot(slot, target)))
        .collect();

    if has_daily {
        let pending = delayed
            .pending
            .iter()
            .filter(|(id, idx)| {
                let target = &table.get(*id).targets[*idx];
                target.interface.is_system() || target.interface.id == interface.id
            })
            .count();
        activities.push(ActivitySnapshot {
            name: "daily_delayed".to_string(),
            cadence: Cadence::DailyDelayed.class(),
            interval_secs: Cadence::DailyDelayed.interval().as_secs(),
            scope: Scope::SystemWide,
            enabled: true,
            last_run: delayed.last_run.map(|t| t.timestamp()),
            next_due: None,
            in_progress: false,
            pending,
            stats: TargetSnapshot {
                runs: delayed.submitted,
                deferred: delayed.deferrals,
                ..TargetSnapshot::default()
            },
        });
    }
    activities
}
