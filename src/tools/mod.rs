//! Guarded tool invocation
//!
//! - `types`: result shapes and the `ToolOutcome` failure classifier
//! - `apply`: fix execution (`FixApplier`, `ShellApplier`)
//! - `wrapper`: resolve, apply and retry once

pub mod apply;
pub mod types;
pub mod wrapper;

pub use apply::{extract_command, ApplyOutcome, FixApplier, ShellApplier};
pub use types::{CommandOutput, ToolFailure, ToolOutcome, ToolResult};
pub use wrapper::{ToolInvocationWrapper, WrappedOperation, WrapperConfig};
