#[macro_use]
extern crate serde;
extern crate log;

use std::error::Error;
use std::fmt;
use std::io;
pub mod config;
pub mod hw_library;
pub mod operation;
pub mod scheduled_module;
pub mod scheduling_graph;
pub mod table;
pub mod testutil;

pub use config::{PlanSelection, SchedulerConfig, MAX_TIME_LIMIT_SECONDS};
pub use hw_library::{HwLibrary, OperationPRModules, PRModule};
pub use operation::OperationType;
pub use scheduled_module::ScheduledModule;
pub use scheduling_graph::{SchedulingGraph, SchedulingNode, StreamLink};
pub use table::{SortedStatus, TableMetadata, Tables};

/// Stream index used by boundary links.
pub const BOUNDARY_STREAM: i32 = -1;

/// Custom error type.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// IO Errors.
    IOError(String),
    /// Internal scheduling errors.
    SchedulerError(String),
    /// Malformed graphs, catalogs, tables or configs.
    ValidationError(String),
    /// A node can never be placed on the fabric.
    UnschedulableError(String),
    /// The search produced no complete plan.
    NoPlanError(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SchedulerError::ValidationError(s) => format!("Validation Error: {}", s),
                SchedulerError::SchedulerError(s) => format!("Scheduler Error: {}", s),
                SchedulerError::UnschedulableError(s) => format!("Unschedulable Error: {}", s),
                SchedulerError::NoPlanError(s) => format!("No Plan Error: {}", s),
                SchedulerError::IOError(s) => s.to_string(),
            }
        )
    }
}

// Implement std::convert::From for SchedulerError; from io::Error
impl From<io::Error> for SchedulerError {
    fn from(error: io::Error) -> Self {
        SchedulerError::IOError(error.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(error: serde_json::Error) -> Self {
        SchedulerError::ValidationError(error.to_string())
    }
}

impl Error for SchedulerError {}

/// Turns a missing value into a validation error naming what was looked up.
///
/// # Arguments
///
/// * `value` - Looked up value.
/// * `what` - Description of the lookup for the error message.
pub fn require<T>(value: Option<T>, what: &str) -> Result<T, SchedulerError> {
    value.ok_or_else(|| SchedulerError::ValidationError(format!("{} not found", what)))
}
