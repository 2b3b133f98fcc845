//! Error types for flexshop.

use thiserror::Error;

/// Error type for building and solving a scheduling model.
#[derive(Debug, Error)]
pub enum ShopError {
    /// The instance data is malformed.
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// Big-M cannot bound every time value of a serial schedule.
    #[error("big-M {big_m} is too small, at least {required} is required")]
    BigMTooSmall { big_m: f64, required: f64 },

    /// Big-M is beyond what the solver handles reliably.
    #[error("big-M {big_m} exceeds the limit of {limit}")]
    BigMTooLarge { big_m: f64, limit: f64 },

    /// The solver returned no solution (infeasible, unbounded or backend failure).
    #[error("No solution: {0}")]
    NoSolution(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// A solved schedule that breaks one of the model's constraints.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleViolation {
    #[error("{name} = {value} is not binary")]
    NotBinary { name: String, value: f64 },

    #[error("operation ({job}, {operation}) is assigned to {count} machines")]
    Assignment {
        job: usize,
        operation: usize,
        count: usize,
    },

    #[error("operation ({job}, {operation}) ends at {end}, expected start + time = {expected}")]
    Duration {
        job: usize,
        operation: usize,
        end: f64,
        expected: f64,
    },

    #[error("operation ({job}, {operation}) on unassigned machine {machine} has nonzero times")]
    Unassigned {
        job: usize,
        operation: usize,
        machine: usize,
    },

    #[error("operation ({job}, {operation}) starts before its predecessor ends")]
    Precedence { job: usize, operation: usize },

    #[error("jobs {first} and {second} overlap on machine {machine}")]
    Overlap {
        first: usize,
        second: usize,
        machine: usize,
    },

    #[error("Ci_{job} = {value} differs from its last operation's end {expected}")]
    JobCompletion { job: usize, value: f64, expected: f64 },

    #[error("makespan {makespan} differs from the latest job completion {expected}")]
    Makespan { makespan: f64, expected: f64 },
}

/// Result type for flexshop operations.
pub type Result<T> = std::result::Result<T, ShopError>;
