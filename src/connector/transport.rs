use bytes::Bytes;
use rumqttc::QoS;
use std::fmt::Formatter;
use std::future::Future;

/// Result of a broker operation.
///
/// Values up to 5 are the MQTT 3.1.1 connect return codes, values from 128 on are raised
/// locally by the client.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ReturnCode(u8);

impl ReturnCode {
    pub const SUCCESS: Self = Self(0);
    pub const UNACCEPTABLE_PROTOCOL_VERSION: Self = Self(1);
    pub const IDENTIFIER_REJECTED: Self = Self(2);
    pub const BROKER_UNAVAILABLE: Self = Self(3);
    pub const BAD_CREDENTIALS: Self = Self(4);
    pub const NOT_AUTHORIZED: Self = Self(5);

    pub const NO_CONNECTION: Self = Self(128);
    pub const NETWORK: Self = Self(129);
    pub const TIMEOUT: Self = Self(130);
    pub const INVALID_PAYLOAD: Self = Self(131);
    pub const REQUEST_QUEUE: Self = Self(132);

    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u8 {
        self.0
    }

    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }

    pub fn message(&self) -> &'static str {
        match *self {
            Self::SUCCESS => "Connection Accepted.",
            Self::UNACCEPTABLE_PROTOCOL_VERSION => {
                "Connection Refused: unacceptable protocol version."
            }
            Self::IDENTIFIER_REJECTED => "Connection Refused: identifier rejected.",
            Self::BROKER_UNAVAILABLE => "Connection Refused: broker unavailable.",
            Self::BAD_CREDENTIALS => "Connection Refused: bad user name or password.",
            Self::NOT_AUTHORIZED => "Connection Refused: not authorised.",
            Self::NO_CONNECTION => "The client is not currently connected.",
            Self::NETWORK => "Connection lost or refused by the network.",
            Self::TIMEOUT => "Timed out waiting for the broker.",
            Self::INVALID_PAYLOAD => "The payload could not be encoded.",
            Self::REQUEST_QUEUE => "The client request queue is not available.",
            _ => "Connection Refused: unknown reason.",
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (rc {})", self.message(), self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where and as whom to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

/// Events raised by a transport, on its own task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(ReturnCode),
    Disconnected(ReturnCode),
    Message { topic: String, payload: Bytes },
}

/// The MQTT client used by the bridge.
///
/// Events are delivered out of band, as [`TransportEvent`]s, through a channel handed to the
/// transport when it is created.
pub trait BrokerTransport: Send + Sync + 'static {
    /// Connect to the broker. May take as long as the handshake does.
    fn connect(&self, endpoint: &Endpoint) -> impl Future<Output = ReturnCode> + Send;

    fn disconnect(&self) -> impl Future<Output = ReturnCode> + Send;

    fn subscribe(&self, topic: &str, qos: QoS) -> impl Future<Output = ReturnCode> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> impl Future<Output = ReturnCode> + Send;

    /// Whether the transport currently considers itself connected.
    fn is_connected(&self) -> bool;
}
