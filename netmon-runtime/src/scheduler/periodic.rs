use super::pool::{Submission, WorkerPool};
use super::slot::{next_daily_due, DelayedSlot, RunGuard, Slot, SlotId, SlotTable};
use super::snapshot::{activities_for, ActivitiesSnapshot};
use crate::activity::{
    discover_scripts, threads_per_pool, ActivityContext, Cadence, Runnable, ScriptActivity,
    ScriptInventory, ScriptRunner, Scope,
};
use crate::config::SchedulerSettings;
use crate::console::{self, Console};
use crate::error::SchedulerError;
use crate::interface::InterfaceRef;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// An activity registered in code rather than discovered from a script.
#[derive(Clone)]
pub(crate) struct ActivitySpec {
    pub(crate) name: String,
    pub(crate) cadence: Cadence,
    pub(crate) scope: Scope,
    pub(crate) handle: Arc<dyn Runnable>,
}

#[derive(Default)]
struct State {
    table: SlotTable,
    daily: Vec<SlotId>,
    daily_delayed: DelayedSlot,
    pool: Option<WorkerPool>,
    started: bool,
}

struct Shared {
    settings: SchedulerSettings,
    interfaces: Vec<InterfaceRef>,
    runner: Option<Arc<dyn ScriptRunner>>,
    registrations: Mutex<Vec<ActivitySpec>>,
    state: Mutex<State>,
    running: AtomicBool,
}

struct ControlThread {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum Dispatch {
    Submitted,
    InFlight,
    Rejected,
}

/// Periodic activities scheduler.
///
/// Built by [`PeriodicActivitiesBuilder`](super::PeriodicActivitiesBuilder),
/// idle until [`start_periodic_activities_loop`](Self::start_periodic_activities_loop).
pub struct PeriodicActivities {
    shared: Arc<Shared>,
    control: Mutex<Option<ControlThread>>,
}

impl PeriodicActivities {
    pub(crate) fn new(
        settings: SchedulerSettings,
        interfaces: Vec<InterfaceRef>,
        runner: Option<Arc<dyn ScriptRunner>>,
        registrations: Vec<ActivitySpec>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                interfaces,
                runner,
                registrations: Mutex::new(registrations),
                state: Mutex::new(State::default()),
                running: AtomicBool::new(false),
            }),
            control: Mutex::new(None),
        }
    }

    /// Discover scripts, size and build the worker pool, fill the slot table
    /// and spawn the control thread.
    ///
    /// Must be called from outside an async runtime. Any error leaves the
    /// scheduler stopped.
    pub fn start_periodic_activities_loop(&self) -> Result<(), SchedulerError> {
        let settings = &self.shared.settings;
        {
            let mut state = self.shared.state.lock();
            if state.started {
                return Err(SchedulerError::AlreadyStarted);
            }

            let inventory = discover_scripts(&settings.scripts_dir, &settings.script_extension);
            info!(
                scripts_dir = %settings.scripts_dir.display(),
                interface_scripts = inventory.interface.len(),
                system_scripts = inventory.system.len(),
                "Discovered periodic scripts"
            );

            let threads = threads_per_pool(
                &inventory.interface,
                &inventory.system,
                settings.min_threads,
                settings.max_threads,
            );
            let pool = WorkerPool::new(threads)?;
            let table = self.shared.build_table(&inventory, Utc::now())?;

            state.daily = table
                .ids()
                .filter(|id| table.get(*id).cadence.is_daily())
                .collect();
            info!(
                activities = table.len(),
                daily = state.daily.len(),
                interfaces = self.shared.interfaces.len(),
                threads,
                "Periodic activities registered"
            );
            state.table = table;
            state.pool = Some(pool);
            state.started = true;
        }

        match spawn_control_thread(self.shared.clone(), settings.tick) {
            Ok(control) => {
                *self.control.lock() = Some(control);
                info!(tick_ms = settings.tick.as_millis() as u64, "Periodic activities loop started");
                Ok(())
            }
            Err(e) => {
                let pool = {
                    let mut state = self.shared.state.lock();
                    let pool = state.pool.take();
                    *state = State::default();
                    pool
                };
                drop(pool);
                Err(e)
            }
        }
    }

    /// Run one scheduling pass now.
    pub fn run(&self) {
        self.shared.run_at(Utc::now());
    }

    /// Run one scheduling pass as if the clock read `now`.
    pub fn run_at(&self, now: DateTime<Utc>) {
        self.shared.run_at(now);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Make every daily activity due on the next pass, whatever the time.
    pub fn force_start_daily_activity(&self) {
        let now = Utc::now();
        let daily_at = self.shared.settings.daily_at;
        let mut state = self.shared.state.lock();
        let State { table, daily, .. } = &mut *state;
        if daily.is_empty() {
            warn!("No daily activity registered, nothing to force");
            return;
        }
        for id in daily.iter() {
            let slot = table.get_mut(*id);
            slot.last_run = Some(now);
            slot.next_due = Some(next_daily_due(now, daily_at));
            slot.forced = true;
            info!(activity = %slot.name, "Daily activity forced");
        }
    }

    /// Enable or disable a slot by name. Returns false if no slot has that name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut state = self.shared.state.lock();
        match state.table.find(name) {
            Some(id) => {
                state.table.get_mut(id).enabled = enabled;
                info!(activity = name, enabled, "Periodic activity toggled");
                true
            }
            None => false,
        }
    }

    /// Current state of every slot relevant to `interface`. System-wide
    /// slots are always included.
    pub fn snapshot(&self, interface: &InterfaceRef) -> ActivitiesSnapshot {
        let state = self.shared.state.lock();
        let (pool_size, pool_busy) = state
            .pool
            .as_ref()
            .map_or((0, 0), |pool| (pool.size(), pool.busy()));
        ActivitiesSnapshot {
            running: self.is_running(),
            pool_size,
            pool_busy,
            activities: activities_for(
                &state.table,
                &state.daily_delayed,
                !state.daily.is_empty(),
                interface,
            ),
        }
    }

    /// Publish [`snapshot`](Self::snapshot) to the console as `periodic_activities`.
    pub fn publish(&self, interface: &InterfaceRef, console: &mut dyn Console) {
        console::publish(console, "periodic_activities", &self.snapshot(interface));
    }

    /// Stop the control loop and wait for in-flight activities to return.
    pub fn shutdown(&self) {
        if let Some(control) = self.control.lock().take() {
            control.cancel.cancel();
            if control.handle.join().is_err() {
                error!("Periodic activities control thread panicked");
            }
        }
        let pool = self.shared.state.lock().pool.take();
        if let Some(mut pool) = pool {
            pool.shutdown();
            info!("Periodic activities stopped");
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for PeriodicActivities {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn build_table(
        &self,
        inventory: &ScriptInventory,
        now: DateTime<Utc>,
    ) -> Result<SlotTable, SchedulerError> {
        let mut specs = Vec::new();

        match &self.runner {
            Some(runner) => {
                for scope in [Scope::PerInterface, Scope::SystemWide] {
                    for script in inventory.scripts(scope) {
                        let stem = script
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        let Some(cadence) = Cadence::from_script_name(&stem) else {
                            warn!(script = %script.display(), "Unknown script cadence, ignoring");
                            continue;
                        };
                        specs.push(ActivitySpec {
                            name: format!("{}/{}", scope.dir_name(), stem),
                            cadence,
                            scope,
                            handle: Arc::new(ScriptActivity::new(script.clone(), runner.clone())),
                        });
                    }
                }
            }
            None if !inventory.is_empty() => {
                warn!(
                    scripts = inventory.len(),
                    "No script runner configured, discovered scripts will not be scheduled"
                );
            }
            None => {}
        }
        specs.extend(self.registrations.lock().iter().cloned());

        let mut table = SlotTable::with_capacity(specs.len())?;
        for spec in specs {
            if spec.cadence == Cadence::DailyDelayed {
                warn!(activity = %spec.name, "daily_delayed is reserved for deferred daily work, ignoring");
                continue;
            }
            let enabled = !self.settings.disabled.iter().any(|d| *d == spec.name);
            let mut slot = Slot::new(
                spec.name.into(),
                spec.handle,
                spec.cadence,
                spec.scope,
                enabled,
                &self.interfaces,
            );
            if slot.cadence.is_daily() {
                slot.next_due = Some(next_daily_due(now, self.settings.daily_at));
            }
            debug!(
                activity = %slot.name,
                cadence = %slot.cadence,
                targets = slot.targets.len(),
                enabled,
                "Registering periodic activity"
            );
            table.push(slot)?;
        }
        Ok(table)
    }

    fn run_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let State {
            table,
            daily_delayed,
            pool,
            ..
        } = &mut *state;
        let Some(pool) = pool.as_ref() else {
            debug!("Scheduling pass skipped, periodic activities not started");
            return;
        };

        run_delayed(table, daily_delayed, pool, now);

        for id in table.ids().collect::<Vec<_>>() {
            let slot = table.get_mut(id);
            if !slot.enabled || !slot.is_due(now) {
                continue;
            }
            slot.mark_submitted(now, self.settings.daily_at);
            let slot = table.get(id);

            if slot.cadence.is_daily() && pool.available() == 0 {
                info!(activity = %slot.name, "Worker pool saturated, deferring daily activity");
                for idx in 0..slot.targets.len() {
                    defer(daily_delayed, slot, id, idx);
                }
                continue;
            }

            for idx in 0..slot.targets.len() {
                match dispatch(pool, slot, idx, slot.cadence, now) {
                    Dispatch::Submitted | Dispatch::InFlight => {}
                    Dispatch::Rejected if slot.cadence.is_daily() => {
                        defer(daily_delayed, slot, id, idx);
                    }
                    Dispatch::Rejected => {
                        let target = &slot.targets[idx];
                        target.stats.not_executed.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            activity = %slot.name,
                            interface = %target.interface,
                            "Worker pool saturated, activity not executed"
                        );
                    }
                }
            }
        }
    }
}

/// Submit deferred daily work while the pool has free workers. Targets of
/// disabled slots stay queued until their slot is enabled again.
fn run_delayed(table: &SlotTable, delayed: &mut DelayedSlot, pool: &WorkerPool, now: DateTime<Utc>) {
    let mut waiting = VecDeque::with_capacity(delayed.pending.len());
    while let Some((id, idx)) = delayed.pending.pop_front() {
        let slot = table.get(id);
        if !slot.enabled {
            waiting.push_back((id, idx));
            continue;
        }
        if pool.available() == 0 {
            waiting.push_back((id, idx));
            break;
        }
        match dispatch(pool, slot, idx, Cadence::DailyDelayed, now) {
            Dispatch::Submitted => {
                delayed.submitted += 1;
                delayed.last_run = Some(now);
                info!(activity = %slot.name, interface = %slot.targets[idx].interface, "Delayed daily activity submitted");
            }
            Dispatch::InFlight => {}
            Dispatch::Rejected => {
                waiting.push_back((id, idx));
                break;
            }
        }
    }
    waiting.append(&mut delayed.pending);
    if !waiting.is_empty() {
        debug!(pending = waiting.len(), "Delayed daily activities still waiting");
    }
    delayed.pending = waiting;
}

fn defer(delayed: &mut DelayedSlot, slot: &Slot, id: SlotId, idx: usize) {
    let target = &slot.targets[idx];
    if delayed.defer(id, idx) {
        target.stats.deferred.fetch_add(1, Ordering::Relaxed);
        debug!(activity = %slot.name, interface = %target.interface, "Daily activity moved to daily_delayed");
    }
}

/// Submit one target of `slot` unless its previous run is still in flight.
fn dispatch(
    pool: &WorkerPool,
    slot: &Slot,
    idx: usize,
    cadence: Cadence,
    now: DateTime<Utc>,
) -> Dispatch {
    let target = &slot.targets[idx];
    let Some(guard) = RunGuard::try_acquire(&target.in_flight) else {
        target.stats.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(
            activity = %slot.name,
            interface = %target.interface,
            "Previous run still in progress, skipping"
        );
        return Dispatch::InFlight;
    };

    let interval = slot.cadence.interval();
    let deadline = now
        + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(1));
    let ctx = ActivityContext {
        activity: slot.name.clone(),
        interface: target.interface.clone(),
        cadence,
        scheduled_at: now,
        deadline,
    };
    let handle = slot.handle.clone();
    let stats = target.stats.clone();
    let label = format!("{}@{}", slot.name, target.interface);

    let job = move || {
        let _guard = guard;
        stats.record_start(Utc::now());
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| handle.run(&ctx)));
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(format!("activity panicked: {}", panic_message(panic.as_ref())).into()),
        };
        stats.record_finish(elapsed, result.is_err());
        if elapsed > interval {
            warn!(
                activity = %ctx.activity,
                interface = %ctx.interface,
                elapsed_ms = elapsed.as_millis() as u64,
                "Activity ran longer than its interval"
            );
        }
        result
    };

    match pool.submit(&label, job) {
        Submission::Accepted => Dispatch::Submitted,
        Submission::Rejected => Dispatch::Rejected,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn spawn_control_thread(shared: Arc<Shared>, tick: Duration) -> Result<ControlThread, SchedulerError> {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

    let handle = std::thread::Builder::new()
        .name("periodic-activities".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            shared.running.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(Ok(()));

            runtime.block_on(async {
                let mut interval = tokio::time::interval(tick);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => shared.run_at(Utc::now()),
                    }
                }
            });
            shared.running.store(false, Ordering::SeqCst);
            debug!("Periodic activities control loop exited");
        })
        .map_err(|e| SchedulerError::ControlThread(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(ControlThread { cancel, handle }),
        Ok(Err(reason)) => {
            let _ = handle.join();
            Err(SchedulerError::ControlThread(reason))
        }
        Err(_) => {
            let _ = handle.join();
            Err(SchedulerError::ControlThread(
                "control thread exited before starting".to_string(),
            ))
        }
    }
}
