//! Orchestration of generation, validation and optimization.
//!
//! This module provides:
//! - [`PipelineInput`]: the immutable inputs of one run
//! - [`Orchestrator`]: the state machine that drives the three stages

mod input;
mod recorder;
mod runner;

#[cfg(test)]
mod integration_tests;

pub use input::PipelineInput;
pub use runner::Orchestrator;
