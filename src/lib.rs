//! A staged training engine driven by lifecycle hooks.
//!
//! The `Engine` runs a model through stages, epochs and steps. Everything around the bare
//! forward pass (optimizer steps, lr schedules, timing, checkpoints and metric writers) is a
//! `Hook` registered into it, either built in code or from a `{"type": ...}` record through a
//! `Registry`.

pub mod buffer;
pub mod comm;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod launcher;
pub mod model;
pub mod optimization;
pub mod registry;
pub mod writers;

pub use buffer::{Buffer, KeyKind, MediaKind, Record};
pub use comm::{Comm, LocalComm};
pub use config::{EngineConfig, StageConfig};
pub use engine::{Checkpoint, Engine, EngineBuilder, Mode};
pub use error::{EngineErr, Result};
pub use hooks::{Event, Hook, HookRegistry, HookSource};
pub use launcher::{launch_replicas, ReplicaReport};
pub use registry::{ObjectSpec, Registry, Source};
pub use writers::{Writer, WriterRegistry};
