//! TaskPilot - autonomous task execution engine
//!
//! TaskPilot drives long-running goals to completion by iteratively
//! consulting LLM providers, invoking tools under resource limits, and
//! persisting every step durably so work survives restarts.
//!
//! # Core flow
//!
//! A goal becomes a [`domain::Task`] in the [`repo::TaskRepository`]. The
//! [`supervisor::Supervisor`] enqueues it; a [`worker::Worker`] pulls it and
//! runs the decision-action loop: the [`llm::ModelRouter`] picks a provider
//! (policy + metrics + account rotation), the response is scanned for
//! in-band [`commands`], completion markers, and tool calls, and tool
//! invocations run through the [`security`] sandbox and policy filter.
//! Every step appends to the task and persists atomically.
//!
//! Tasks created with `iris-new` instead route through the `iris` crate's
//! deterministic READ->PLAN->WRITE enforcement loop.
//!
//! # Modules
//!
//! - [`domain`] - tasks, steps, priorities, behavior profiles
//! - [`store`] / [`repo`] - atomic JSON persistence and the task repository
//! - [`llm`] - provider contract, metrics, policy, and the router
//! - [`auth`] - multi-account pools, rotation, and sessions
//! - [`tools`] - tool contract, registry, call extraction, built-ins
//! - [`security`] - process sandbox and command-pattern policy
//! - [`commands`] - in-band command interception
//! - [`skills`] - goal-matching task templates
//! - [`worker`] / [`supervisor`] - the decision-action loop and its pool
//! - [`remote`] - node registry and delegation protocol
//! - [`plugins`] - lifecycle hooks around task execution
//! - [`engine`] - object-graph wiring behind the CLI

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod engine;
pub mod iris_bridge;
pub mod llm;
pub mod plugins;
pub mod prompts;
pub mod remote;
pub mod repo;
pub mod security;
pub mod skills;
pub mod store;
pub mod supervisor;
pub mod tools;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use domain::{CollaborationMode, Priority, Profile, Step, Task, TaskStatus};
pub use engine::Engine;
pub use llm::{AuthType, ModelRouter, PromptContext, Provider, ProviderError};
pub use repo::TaskRepository;
pub use store::JsonStore;
pub use supervisor::{RunSummary, Supervisor, SupervisorConfig};
pub use tools::{Tool, ToolOutcome, ToolRegistry};
pub use worker::{TaskOutcome, Worker, WorkerDeps, WorkerStatus};
