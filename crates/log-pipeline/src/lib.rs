//! tailhub ingestion pipeline.
//!
//! Tails configured log files, normalizes every line into a
//! [`StructuredEvent`](tailhub_core::types::StructuredEvent), raises alerts,
//! and distributes accepted events to a replay store and a live hub.
//!
//! # Modules
//!
//! - [`collector`]: rotation-aware file tailing and one-shot backfill
//! - [`parser`]: json, nginx/apache and syslog grammars
//! - [`filter`]: operator criteria (regex, severity, time range, fields)
//! - [`alert`]: named alert rules evaluated against every event
//! - [`event`]: display/wire representation of an accepted event
//! - [`store`]: bounded replay buffer
//! - [`hub`]: live fan-out actor
//! - [`pipeline`]: the coordinating consumer loop
//! - [`error`]: domain error type
//!
//! # Architecture
//!
//! ```text
//! FileTailer --+                          +--> AlertEvaluator --> mpsc<Match>
//! FileTailer --+--> mpsc<RawLine> --> LogPipeline
//! backfill  ---+                          +--> Criteria --> EventStore / Hub / stdout
//! ```

pub mod alert;
pub mod error;
pub mod event;
pub mod filter;
pub mod hub;
pub mod pipeline;
pub mod store;

pub mod collector;
pub mod parser;

// --- re-exports ---

// pipeline
pub use pipeline::{Disposition, EventProcessor, LogPipeline, LogPipelineBuilder, PipelineStats};

// errors
pub use error::LogPipelineError;

// parsing
pub use parser::{LineParser, LogFormat};

// collection
pub use collector::{FileTailer, NotifySource, RawLine, backfill};

// criteria and alerts
pub use alert::{AlertEvaluator, AlertRule, Match};
pub use filter::{Criteria, CriteriaInputs};

// distribution
pub use event::{DisplayEvent, ReplayEvent};
pub use hub::{Hub, HubHandle, Subscription};
pub use store::EventStore;
