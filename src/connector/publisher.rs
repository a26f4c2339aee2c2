use crate::connector::{BrokerTransport, Connection};
use crate::model::Reading;
use crate::physical::PhysicalDevice;
use crate::worker::{LoopState, Worker, TICK};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// The state message: the reading's values, its timestamp, and the status marked as good.
///
/// The timestamp and the marker replace values of the same name.
fn telemetry(reading: &Reading) -> Map<String, Value> {
    let mut payload = reading.values.clone();
    payload.insert(
        "last_update".into(),
        humantime::format_rfc3339(reading.last_update)
            .to_string()
            .into(),
    );
    payload.insert("status".into(), "OK".into());
    payload
}

/// Publishes the device's reading to its state topic whenever a new one was sampled.
///
/// A reading counts as new when its `last_update` changed, regardless of its values. Nothing is
/// published while the connection isn't discovered.
pub struct PublisherLoop {
    worker: Worker,
}

impl PublisherLoop {
    pub fn start<T, P>(
        connection: Arc<Connection<T>>,
        state_topic: impl Into<String>,
        device: Arc<P>,
    ) -> Self
    where
        T: BrokerTransport,
        P: PhysicalDevice,
    {
        let state_topic = state_topic.into();
        let last_update = device.data().last_update;
        let mut worker = Worker::new("publisher");
        worker.spawn(move |token| run(connection, state_topic, device, last_update, token));
        Self { worker }
    }

    pub fn request_stop(&self) {
        self.worker.request_stop();
    }

    pub async fn join(&mut self) {
        self.worker.join().await;
    }

    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }

    pub fn state(&self) -> LoopState {
        self.worker.state()
    }
}

async fn run<T, P>(
    connection: Arc<Connection<T>>,
    state_topic: String,
    device: Arc<P>,
    mut last_update: SystemTime,
    token: CancellationToken,
) where
    T: BrokerTransport,
    P: PhysicalDevice,
{
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {},
        }

        let reading = device.data();
        if reading.last_update == last_update {
            continue;
        }
        last_update = reading.last_update;

        if !connection.is_discovered() {
            log::debug!("Not discovered, skipping state update on {state_topic}");
            continue;
        }

        connection
            .update_state(&state_topic, &telemetry(&reading))
            .await;
    }
}
