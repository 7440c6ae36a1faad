//! Core functionality for the laundry status hub.
//!
//! This module contains:
//! - Reading validation for samples arriving from sensor nodes
//! - Occupancy classification from vibration magnitude
//! - The per-machine registry that detects state transitions

pub mod classifier;
pub mod reading;
pub mod registry;

// Re-export commonly used types
pub use classifier::{
    ClassifierConfig, MachineHistory, StateClassifier, ThresholdMode, WarmupPolicy,
};
pub use reading::{IngestError, RawReading, Reading};
pub use registry::{MachineRegistry, MachineSlot, MachineState, StatusEvent};
