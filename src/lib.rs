//! Laundry Status Hub - live machine occupancy from accelerometer sensors.
//!
//! Sensor nodes strapped to washers and dryers report raw accelerometer
//! samples. The hub infers whether each machine is occupied, keeps the last
//! known state per machine, and pushes only the changes to every connected
//! browser.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Laundry Status Hub                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │  Reading  │──▶│ Classifier │──▶│ Registry │──▶│ EventHub  │  │
//! │  │ (validate)│   │ (window +  │   │ (detect  │   │ (fan-out) │  │
//! │  └───────────┘   │  debounce) │   │  change) │   └─────┬─────┘  │
//! │                  └────────────┘   └──────────┘         │        │
//! │                                                        ▼        │
//! │                                              ┌──────────────┐   │
//! │                                              │ SSE /events  │   │
//! │                                              └──────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use laundry_status_hub::{ClassifierConfig, HubConfig, RawReading, StatusPipeline};
//!
//! let (pipeline, mut dispatcher) =
//!     StatusPipeline::new(ClassifierConfig::default(), &HubConfig::default());
//! let mut subscriber = pipeline.subscribe();
//!
//! for _ in 0..3 {
//!     pipeline.ingest(RawReading::new("washer-1", 6.0, 8.0, 25.0)).unwrap();
//! }
//! dispatcher.dispatch_pending();
//!
//! let delivery = subscriber.try_recv().unwrap();
//! assert_eq!(delivery.event.machine_id, "washer-1");
//! assert!(delivery.event.status);
//! ```

pub mod config;
pub mod core;
pub mod hub;
pub mod pipeline;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ServerSettings};
pub use core::{
    ClassifierConfig, IngestError, MachineRegistry, MachineState, RawReading, Reading,
    StateClassifier, StatusEvent, ThresholdMode, WarmupPolicy,
};
pub use hub::{Delivery, Dispatcher, EventHub, HubConfig, Subscriber, SubscriberId};
pub use pipeline::{IngestOutcome, StatusPipeline};
pub use stats::{HubStats, SharedHubStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
