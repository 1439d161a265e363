mod builder;
mod periodic;
mod pool;
mod slot;
mod snapshot;

pub use builder::PeriodicActivitiesBuilder;
pub use periodic::PeriodicActivities;
pub use pool::{Submission, WorkerPool};
pub use slot::MAX_ACTIVITIES;
pub use snapshot::{ActivitiesSnapshot, ActivitySnapshot, TargetSnapshot};
