//! Polygon refresh pipeline
//!
//! The orchestrator turns the current store snapshot into one provider
//! request per polygon and commits the resolved `(value, color)` pairs; the
//! scheduler decides when a pass runs, collapsing bursts of changes into a
//! single pass after a quiet period.

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::*;
pub use scheduler::*;
