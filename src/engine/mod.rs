//! Execution engine for scriptdeploy
//!
//! The engine wraps a reconciliation cycle with:
//! 1. Displaying - property reports, diffs and captured output
//! 2. Executing - spinners per phase, confirmation before Commit

pub mod differ;
pub mod executor;

pub use executor::{ExecuteOptions, execute};
