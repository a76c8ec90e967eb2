//! State module for tracking monitoring cycles
//!
//! # Components
//!
//! - `CycleState`: The states one site cycle passes through
//! - `CycleTracker`: Enforces legal transitions between those states
//! - `RunStatus`: The final status written to crawl history

mod cycle_state;
mod run_status;

// Re-export main types
pub use cycle_state::{CycleState, CycleTracker};
pub use run_status::RunStatus;
