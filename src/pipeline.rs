//! The ingest → classify → detect → publish pipeline.

use crate::core::reading::normalize_machine_id;
use crate::core::{
    ClassifierConfig, IngestError, MachineRegistry, MachineState, RawReading, Reading,
    StateClassifier, StatusEvent,
};
use crate::hub::{Dispatcher, EventHub, HubConfig, Subscriber};
use crate::stats::{HubStats, SharedHubStats};
use serde::Serialize;
use std::sync::Arc;

/// Result of ingesting one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub machine_id: String,
    /// Classifier decision for this reading
    pub occupied: bool,
    /// The transition this reading caused, if any
    pub event: Option<StatusEvent>,
}

/// Process-wide status hub: owns the registry, classifier and event hub.
#[derive(Clone)]
pub struct StatusPipeline {
    classifier: Arc<StateClassifier>,
    registry: Arc<MachineRegistry>,
    hub: EventHub,
    stats: SharedHubStats,
}

impl StatusPipeline {
    /// Build a pipeline and the dispatcher that delivers its events.
    pub fn new(classifier: ClassifierConfig, hub: &HubConfig) -> (Self, Dispatcher) {
        let stats = Arc::new(HubStats::new());
        let (hub, dispatcher) = EventHub::new(hub, Arc::clone(&stats));
        let pipeline = Self {
            classifier: Arc::new(StateClassifier::new(classifier)),
            registry: Arc::new(MachineRegistry::new()),
            hub,
            stats,
        };
        (pipeline, dispatcher)
    }

    /// Build a pipeline with its dispatcher running on the current runtime.
    pub fn spawn(classifier: ClassifierConfig, hub: &HubConfig) -> Self {
        let (pipeline, dispatcher) = Self::new(classifier, hub);
        tokio::spawn(dispatcher.run());
        pipeline
    }

    /// Validate, classify and record a reading, publishing any transition.
    ///
    /// Invalid readings are dropped without touching machine state.
    pub fn ingest(&self, raw: RawReading) -> Result<IngestOutcome, IngestError> {
        let reading = match Reading::try_from(raw) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.record_reading_rejected();
                tracing::warn!("Dropping reading: {}", e);
                return Err(e);
            }
        };
        self.stats.record_reading_accepted();

        let (occupied, event) = self.registry.update(&reading.machine_id, |slot| {
            let occupied = self.classifier.classify(&mut slot.history, &reading);
            let event = slot.apply(occupied);
            // Enqueued under the machine lock so per-machine order survives
            if let Some(ref event) = event {
                self.hub.publish(event.clone());
            }
            (occupied, event)
        });

        if let Some(ref event) = event {
            self.stats.record_transition();
            tracing::info!(
                machine_id = %event.machine_id,
                occupied = event.status,
                "Machine status changed"
            );
        }

        Ok(IngestOutcome {
            machine_id: reading.machine_id,
            occupied,
            event,
        })
    }

    /// Force a machine back to "available", publishing if that is a change.
    ///
    /// The id is trimmed like a reading's; a blank id is rejected.
    pub fn reset_machine_state(
        &self,
        machine_id: &str,
    ) -> Result<Option<StatusEvent>, IngestError> {
        let machine_id = match normalize_machine_id(machine_id) {
            Ok(machine_id) => machine_id,
            Err(e) => {
                tracing::warn!("Ignoring reset: {}", e);
                return Err(e);
            }
        };

        let event = self.registry.update(machine_id, |slot| {
            let event = slot.reset();
            if let Some(ref event) = event {
                self.hub.publish(event.clone());
            }
            event
        });

        match event {
            Some(ref event) => {
                self.stats.record_transition();
                tracing::info!(machine_id = %event.machine_id, "Machine status reset");
            }
            None => tracing::debug!(machine_id, "Reset requested; already available"),
        }
        Ok(event)
    }

    pub fn subscribe(&self) -> Subscriber {
        self.hub.subscribe()
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &SharedHubStats {
        &self.stats
    }

    /// Stored state of every known machine.
    pub fn machines(&self) -> Vec<MachineState> {
        self.registry.snapshot()
    }
}
