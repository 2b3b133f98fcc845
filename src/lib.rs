//! Flexible job-shop scheduling as a mixed-integer linear program.
//!
//! An [`Instance`] is turned into a MILP by [`ModelBuilder`], solved with
//! `good_lp`, and read back as a [`SolvedSchedule`] that can be verified
//! against the model's constraints and printed as a [`Report`].

pub mod error;
pub mod instance;
pub mod model;
pub mod schedule;

pub use error::{Result, ScheduleViolation, ShopError};
pub use instance::{Instance, Job, Operation};
pub use model::ModelBuilder;
pub use schedule::{Report, ScheduledOperation, SolvedSchedule};

/// Build and solve the model of an instance.
pub fn solve(instance: &Instance) -> Result<SolvedSchedule> {
    ModelBuilder::new(instance)?.solve()
}
