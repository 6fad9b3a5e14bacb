//! Backend disruption sampling.
//!
//! This crate continuously probes an HTTP backend and records a minimal,
//! time-ordered log of availability intervals: when the backend stopped
//! responding, with which error, and when it started responding again.
//!
//! # Architecture
//!
//! - **Prober** ([`BackendSampler`]): one GET per check against a backend,
//!   over new or reused connections
//! - **Producer**: one sample per tick, check spawned without waiting
//! - **Consumer** ([`DisruptionConsumer`]): samples evaluated strictly in
//!   creation order, folded into intervals on a [`Recorder`]
//! - **Hooks** ([`SamplerHook`]): side effects when a disruption begins
//!
//! # Example
//!
//! ```no_run
//! use disruption::{BackendSamplerBuilder, ConnectionType, MemoryRecorder};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sampler = Arc::new(
//!     BackendSamplerBuilder::simple("https://api.example.com", "api", "/healthz", ConnectionType::New)
//!         .expected_body("ok")
//!         .build()?,
//! );
//! let recorder = Arc::new(MemoryRecorder::new());
//! let cancel = CancellationToken::new();
//!
//! sampler.start_endpoint_monitoring(&cancel, recorder.clone())?;
//! // ... run the disruptive workload ...
//! sampler.stop().await?;
//!
//! for interval in recorder.intervals() {
//!     println!("{}: {}", interval.level, interval.message.human_message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod dns;
pub mod hook;
pub mod host;
pub mod locator;
pub mod message;
pub mod prober;
pub mod recorder;
pub mod sample;
pub mod sampler;
pub mod types;

pub use consumer::{DisruptionConsumer, Transition};
pub use hook::SamplerHook;
pub use host::{HostResolver, StaticHost};
pub use locator::Locator;
pub use message::{IntervalReason, Message};
pub use prober::{BackendSampler, BackendSamplerBuilder, CheckOutcome, ProbeError, TlsConfig};
pub use recorder::{MemoryRecorder, Recorder};
pub use sample::{Sample, SampleCompleter, SampleQueue};
pub use types::{ConnectionType, Interval, IntervalHandle, IntervalLevel};
