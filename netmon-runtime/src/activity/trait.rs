use super::cadence::Cadence;
use crate::error::ActivityResult;
use crate::interface::InterfaceRef;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What a periodic activity receives when it runs.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// Slot name, e.g. `interface/minute`.
    pub activity: Arc<str>,
    /// Target interface; the system pseudo-interface for system-wide slots.
    pub interface: InterfaceRef,
    pub cadence: Cadence,
    /// Instant the run was submitted to the worker pool.
    pub scheduled_at: DateTime<Utc>,
    /// Advisory end of the run's time slice. Nothing enforces it.
    pub deadline: DateTime<Utc>,
}

/// Trait for periodic activities
///
/// Implementations run on worker pool threads, possibly at the same time as
/// other activities, so they must not assume exclusive access to anything
/// beyond what the context hands them.
///
/// # Example
///
/// ```rust
/// use netmon_runtime::{ActivityContext, ActivityResult, Runnable};
///
/// struct PurgeIdleHosts;
///
/// impl Runnable for PurgeIdleHosts {
///     fn run(&self, ctx: &ActivityContext) -> ActivityResult {
///         println!("purging idle hosts on {}", ctx.interface);
///         Ok(())
///     }
/// }
/// ```
pub trait Runnable: Send + Sync {
    /// Execute the activity once for the given target
    fn run(&self, ctx: &ActivityContext) -> ActivityResult;
}

impl<F> Runnable for F
where
    F: Fn(&ActivityContext) -> ActivityResult + Send + Sync,
{
    fn run(&self, ctx: &ActivityContext) -> ActivityResult {
        self(ctx)
    }
}
