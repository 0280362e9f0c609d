//! Test doubles and data builders for the orchestrator crates.
//!
//! This crate provides:
//! - An in-memory [`TaskRepository`](orchestrator_core::repository::TaskRepository)
//!   mock with call-history tracking and error injection
//! - Scripted [`AgentExecutor`](orchestrator_core::dispatcher::AgentExecutor) and
//!   [`StepRunner`](orchestrator_core::workflow_engine::StepRunner) doubles
//! - Fluent builders for tasks, agents, and workflow definitions
//! - Fixtures for common task/agent/workflow states
//! - Custom assertions for lifecycle transitions
//! - `fake`/`proptest`-based generators for property tests

pub mod assertions;
pub mod builders;
pub mod contracts;
pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod repository;

pub use assertions::*;
pub use builders::*;
pub use doubles::{ScriptedAgentExecutor, ScriptedStepRunner};
pub use fixtures::*;
pub use generators::*;
pub use repository::MockTaskRepository;
