//! Test doubles and fixtures for docflow runs.
//!
//! This module provides:
//! - A scripted completion provider with call timing
//! - Scripted generator, validator and optimizer stages
//! - A sample catering quote (template, branding, request)
//! - Canned reply bodies for each stage
//!
//! Compiled for unit tests and with the `testing` feature.

pub mod fixtures;
mod mocks;
pub mod replies;

pub use mocks::{ScriptedGenerator, ScriptedOptimizer, ScriptedProvider, ScriptedValidator};
