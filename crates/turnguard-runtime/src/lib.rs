//! # turnguard-runtime
//!
//! Asynchronous half of the turnguard behavior-rule engine.
//!
//! This crate owns everything that talks to a judge:
//! - [`judge`]: backends that answer one rendered prompt (OpenCode,
//!   Anthropic behind the `anthropic` feature, a scripted in-process judge)
//! - [`client`]: one rule against one context, failing open
//! - [`evaluator`]: all applicable rules concurrently, under one deadline
//! - [`engine`]: the full invocation, from messages to a [`Decision`]
//! - [`config`]: layered configuration (defaults, YAML, environment)
//! - [`server`]: reference-counted lifecycle of a shared OpenCode server
//!
//! The deterministic pieces (transcripts, rules, aggregation, output) live in
//! `turnguard-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turnguard_runtime::{build_backend, EngineBuilder, EngineConfig, Invocation};
//!
//! let config = EngineConfig::load();
//! let engine = EngineBuilder::from_config(&config)
//!     .rules(config.rule_source(None).load()?)
//!     .backend(build_backend(&config)?)
//!     .build()?;
//!
//! let decision = engine.run(Invocation::new(session_id, messages)).await;
//! ```
//!
//! [`Decision`]: turnguard_core::Decision

pub mod client;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod judge;
pub mod prompts;

#[cfg(unix)]
pub mod server;

pub use client::JudgeClient;
pub use config::{BackendKind, ConfigError, EngineConfig, RuleSource, BUNDLED_RULES};
pub use engine::{Engine, EngineBuilder, EngineError, Invocation};
pub use evaluator::{ConcurrentEvaluator, EvaluationOutcome, EvaluationTask, DEADLINE_GRACE};
pub use judge::{build_backend, JudgeBackend, Reply, ScriptedBackend};
pub use prompts::build_judge_prompt;

#[cfg(unix)]
pub use server::{ServerError, ServerLifecycle, ServerRefs};
