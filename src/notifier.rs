//! Live event broadcast to subscribed clients.
//!
//! The notifier is created once at startup and cloned into every component
//! that publishes. Delivery is fire-and-forget: nobody acknowledges an event,
//! and emitting with no subscribers is not an error.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Forecast result parsed from the inference worker
pub const FORECAST_READY: &str = "hasilPeramalanBaru";
/// Training worker finished successfully
pub const TRAINING_COMPLETED: &str = "trainingModelSelesai";
/// Narrative summary produced for a forecast
pub const SUMMARY_READY: &str = "ringkasanPeramalan";
pub const SENSOR_DATA_CREATED: &str = "dataSensorBaru";
pub const SENSOR_DATA_UPDATED: &str = "dataSensorUpdate";
pub const HISTORY_CREATED: &str = "peramalanBaru";
pub const HISTORY_UPDATED: &str = "peramalanUpdate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Event>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit<T: Serialize + ?Sized>(&self, name: &str, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping event {}: payload is not serializable: {}", name, e);
                return;
            }
        };

        let event = Event {
            name: name.to_string(),
            payload,
        };

        match self.sender.send(event) {
            Ok(receivers) => debug!("Emitted {} to {} subscriber(s)", name, receivers),
            Err(_) => debug!("Emitted {} with no subscribers", name),
        }
    }
}
