pub mod cli;
pub mod core;
pub mod modules;

pub use crate::core::dispatch::{CancelToken, Outcome, RunMode, RunReport, TargetOutcome};
pub use crate::core::errors::PocketError;
pub use crate::core::options::{ExploitOption, OptionSet};
pub use crate::core::session::Session;
pub use crate::modules::{
    Descriptor, ExecutionResult, ExploitModule, ModuleRegistry, TargetType,
};
