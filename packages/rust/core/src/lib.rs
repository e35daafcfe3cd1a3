//! Content generation pipeline for postforge.
//!
//! This crate turns sources into stored posts and runs the batch jobs on
//! top of that:
//! - [`Pipeline`]: guard, generation, parsing, promotions, slugging, persistence
//! - [`Orchestrator`]: rate-limited calls to a [`TextGenerator`]
//! - [`BatchScheduler`]: checkpointed, quota-bounded runs over a work list
//! - [`jobs`]: the video, topic and translation batches, plus [`publish_due`]

pub mod checkpoint;
pub mod generation;
pub mod guard;
pub mod jobs;
pub mod parser;
pub mod pipeline;
pub mod promo;
mod prompts;
pub mod publish;
pub mod rate_limit;
pub mod scheduler;
pub mod translation;

pub use checkpoint::{
    BatchCheckpoint, CheckpointLease, CheckpointStore, FailedKey, FileCheckpointStore,
    MemoryCheckpointStore,
};
pub use generation::{
    GenerationContext, GenerationParams, OpenRouterClient, Orchestrator, TextGenerator,
};
pub use pipeline::{Disposition, ItemOutcome, Pipeline, ProgressReporter, SilentProgress};
pub use publish::publish_due;
pub use rate_limit::RateLimiter;
pub use scheduler::{BatchScheduler, ItemStatus, RunState, RunSummary};
pub use translation::TranslationJob;
