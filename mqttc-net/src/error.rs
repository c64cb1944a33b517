use std::io;
use std::sync::Arc;

use mqttc_codec::{DecodeError, EncodeError};

/// Transport level failure. Fatal to whatever session owns the stream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MqttError {
    /// MQTT decoding error
    #[error("Decoding error: {0}")]
    Decode(DecodeError),
    /// MQTT encoding error
    #[error("Encoding error: {0}")]
    Encode(EncodeError),
    #[error("io error: {0}")]
    Io(Arc<io::Error>),
    /// Read timeout
    #[error("Read timeout")]
    ReadTimeout,
    /// Write timeout
    #[error("Write timeout")]
    WriteTimeout,
    /// Close timeout
    #[error("Close timeout")]
    CloseTimeout,
    #[error("Connect timeout")]
    ConnectTimeout,
    /// Peer closed the stream
    #[error("connection closed")]
    Closed,
    #[error("invalid url, {0}")]
    InvalidUrl(String),
    #[error("unsupported scheme, {0}")]
    UnsupportedScheme(String),
    #[error("tls error, {0}")]
    Tls(String),
    #[error("websocket error, {0}")]
    WebSocket(String),
    #[error("websocket message is not binary")]
    NotBinary,
}

impl MqttError {
    /// True when the peer went away rather than sending garbage.
    pub fn is_closed(&self) -> bool {
        match self {
            MqttError::Closed => true,
            MqttError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    fn from_io(e: Arc<io::Error>) -> Self {
        // adapters smuggle typed errors through io::Error
        if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<MqttError>()) {
            return inner.clone();
        }
        MqttError::Io(e)
    }
}

impl From<io::Error> for MqttError {
    fn from(e: io::Error) -> Self {
        MqttError::from_io(Arc::new(e))
    }
}

impl From<DecodeError> for MqttError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(e) => MqttError::from_io(e),
            e => MqttError::Decode(e),
        }
    }
}

impl From<EncodeError> for MqttError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Io(e) => MqttError::from_io(e),
            e => MqttError::Encode(e),
        }
    }
}
