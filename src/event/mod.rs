//! Event dispatch core.
//!
//! Samples flow `Coordinator::publish` → every `EventTrigger` queue → the
//! trigger's `Condition` → on match, every `EventHandler` queue → the
//! handler's `Action`. Every trigger and handler runs on its own `Worker`.

/// Condition evaluators, including edge crossing detection.
pub mod condition;
/// Trigger set ownership and the publish barrier.
pub mod coordinator;
/// Leaf workers performing one effect per sample.
pub mod handler;
/// Condition-gated fan-out workers.
pub mod trigger;
/// Bounded single-consumer worker threads.
pub mod worker;

pub use condition::{Always, Condition, Edge, EdgeCrossing};
pub use coordinator::{Coordinator, CoordinatorState, PublishSummary};
pub use handler::{Action, EventHandler};
pub use trigger::EventTrigger;
pub use worker::{Message, Process, Worker, WorkerConfig, WorkerHandle, WorkerState};
