// src/lib.rs

//! nfviz: idempotent step orchestration and status reconciliation for a
//! Nextflow workload running on Google Cloud Batch.
//!
//! The crate provides:
//!  - Steps built as pipelines of named, async sub-steps that stream progress
//!    events while they run.
//!  - A string-keyed step registry whose executor always produces a
//!    well-formed event stream ending in exactly one terminal event.
//!  - A Server-Sent Events encoder for those streams.
//!  - A task-status model fed from two independent sources: a classifier
//!    for pipeline log lines and a reconciler for batch job listings.
//!  - A best-effort aggregator that snapshots storage, jobs and the managed
//!    notebook environment in one read.
//!
//! External systems are reached only through the traits in [`external`];
//! the run configuration is an explicit [`RunConfig`] value.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod core;
pub mod error;
pub mod external;
pub mod pipeline;
pub mod poll;
pub mod reconcile;
pub mod registry;
pub mod sse;
pub mod status;

// --- Re-exports for the Public API ---

pub use crate::core::context::{Handler, StepContext, StepRequest};
pub use crate::core::control::{StepControl, StepOutcome};
pub use crate::core::event::{truncate_diagnostic, Event, EventSink, Severity, TerminalStatus, MAX_DIAGNOSTIC_CHARS};
pub use crate::core::step::{SkipCondition, SubStepDef};
pub use crate::core::stream::EventStream;

pub use crate::pipeline::definition::Pipeline;
pub use crate::registry::StepRegistry;

pub use crate::error::{ExternalError, ExternalErrorKind, ExternalResult, FlowError, FlowResult};

pub use crate::config::RunConfig;
pub use crate::external::Collaborators;
pub use crate::status::{StatusMap, TaskId, TaskStatus};

pub use crate::aggregate::{AggregateSnapshot, StatusAggregator};
pub use crate::classify::{classify, Classification};
pub use crate::poll::{poll_until_done, PollBudget, PollOutcome};
pub use crate::reconcile::{JobReconciler, JobsReport};

/*
    Typical flow:
    1. Build a `RunConfig` and the `Collaborators` bundle.
    2. For each step, define a `Pipeline<StepData, StepError>` of sub-steps and
       attach handlers with `.on_step()`.
    3. Register every pipeline in a `StepRegistry` with a factory producing the
       per-run data; add aliases for alternative step ids.
    4. `registry.execute(StepRequest::new("create-bucket"))` returns an
       `EventStream`; map it through `sse::frames` to serve it.
    5. For polling, call `StatusAggregator::snapshot()` or
       `JobReconciler::report()`.
*/
