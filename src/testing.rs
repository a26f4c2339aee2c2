//! Doubles for the transport, the physical device and the host.

use crate::connector::{BrokerTransport, Endpoint, ReturnCode, TransportEvent};
use crate::environment::HardwareEnvironment;
use crate::model::{Reading, ReadingCell};
use crate::physical::PhysicalDevice;
use bytes::Bytes;
use rumqttc::QoS;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("payload must be JSON")
    }
}

/// Records what would go to the broker. Connects successfully unless told otherwise.
pub struct MockTransport {
    connected: AtomicBool,
    connect_result: Mutex<ReturnCode>,
    publish_result: Mutex<ReturnCode>,
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connect_result: Mutex::new(ReturnCode::SUCCESS),
            publish_result: Mutex::new(ReturnCode::SUCCESS),
            published: Default::default(),
            subscriptions: Default::default(),
            disconnects: AtomicUsize::new(0),
            events: None,
        }
    }
}

impl MockTransport {
    /// A transport which also raises connect and disconnect events, like a real one does.
    pub fn with_events() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Some(tx),
                ..Default::default()
            },
            rx,
        )
    }

    pub fn refuse_connect(&self, rc: ReturnCode) {
        *self.connect_result.lock().unwrap() = rc;
    }

    pub fn fail_publish(&self, rc: ReturnCode) {
        *self.publish_result.lock().unwrap() = rc;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|published| published.topic == topic)
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl BrokerTransport for MockTransport {
    async fn connect(&self, _endpoint: &Endpoint) -> ReturnCode {
        let rc = *self.connect_result.lock().unwrap();
        self.set_connected(rc.is_success());
        self.emit(TransportEvent::Connected(rc));
        rc
    }

    async fn disconnect(&self) -> ReturnCode {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if !self.connected.swap(false, Ordering::SeqCst) {
            return ReturnCode::NO_CONNECTION;
        }
        self.emit(TransportEvent::Disconnected(ReturnCode::SUCCESS));
        ReturnCode::SUCCESS
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> ReturnCode {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        ReturnCode::SUCCESS
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> ReturnCode {
        let rc = *self.publish_result.lock().unwrap();
        if rc.is_success() {
            self.published.lock().unwrap().push(Published {
                topic: topic.to_string(),
                payload,
                qos,
                retain,
            });
        }
        rc
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(&'static str);

/// A device replaying scripted samples. Once the script ran out, samples keep the last reading.
#[derive(Default)]
pub struct FakeDevice {
    cell: ReadingCell,
    script: Mutex<VecDeque<Result<Reading, &'static str>>>,
    samples: AtomicUsize,
}

impl FakeDevice {
    pub fn push(&self, sample: Result<Reading, &'static str>) {
        self.script.lock().unwrap().push_back(sample);
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn sample_now(&self) -> Result<(), FakeError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(reading)) => {
                self.cell.store(reading);
                Ok(())
            }
            Some(Err(err)) => Err(FakeError(err)),
            None => Ok(()),
        }
    }
}

impl PhysicalDevice for FakeDevice {
    type Error = FakeError;

    async fn sample(&self) -> Result<(), Self::Error> {
        self.sample_now()
    }

    fn data(&self) -> Reading {
        self.cell.load()
    }
}

#[derive(Clone, Debug)]
pub struct StaticEnvironment {
    pub cpu_model: String,
    pub object_id: String,
    pub cpu_temperature: f64,
    pub os_pretty_name: String,
    pub uptime: String,
    pub last_restart: String,
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self {
            cpu_model: "Raspberry Pi 3 Model B Rev 1.2".into(),
            object_id: "b827ebc1f24d".into(),
            cpu_temperature: 47.2,
            os_pretty_name: "Raspbian GNU/Linux 11 (bullseye)".into(),
            uptime: "3days 4h 5m".into(),
            last_restart: "2024-01-01T00:00:00Z".into(),
        }
    }
}

impl HardwareEnvironment for StaticEnvironment {
    fn cpu_model(&self) -> String {
        self.cpu_model.clone()
    }

    fn object_id(&self) -> String {
        self.object_id.clone()
    }

    fn cpu_temperature(&self) -> f64 {
        self.cpu_temperature
    }

    fn os_pretty_name(&self) -> String {
        self.os_pretty_name.clone()
    }

    fn uptime(&self) -> String {
        self.uptime.clone()
    }

    fn last_restart(&self) -> String {
        self.last_restart.clone()
    }
}
