//! Core types for opscrew: the data model, error taxonomy, configuration
//! structs, and the OS command tables shared by every other crate.

pub mod commands;
pub mod config;
pub mod error;
pub mod types;

pub use commands::{standard_battery, BundleRegistry};
pub use config::{
    CommandPolicy, OpscrewConfig, OracleConfig, RolePolicy, ServerRegistry, SimulationConfig,
};
pub use error::{Error, Result};
pub use types::{
    Category, CommandResult, CommandSpec, Credential, ExecutionRecord, IssueTicket, OsFamily,
    PlanStep, ResolutionPlan, ServerDescriptor, StepOutcome, TicketStatus, ValidationVerdict,
};
