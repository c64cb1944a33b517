use mqttc_codec::{ConnectAckReason, DecodeError, EncodeError};
use mqttc_net::MqttError;

/// Errors surfaced by [`Client`](crate::Client) operations and their futures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("already connecting or connected")]
    AlreadyConnecting,
    #[error("client id is required")]
    MissingClientId,
    #[error("invalid options, {0}")]
    InvalidOptions(String),
    #[error("invalid topic, {0}")]
    InvalidTopic(String),
    #[error("not connected")]
    NotConnected,
    #[error("no packet_id available")]
    PacketIdExhausted,
    #[error("{}", _0.reason())]
    ConnectionRefused(ConnectAckReason),
    #[error("protocol violation, {0}")]
    ProtocolViolation(String),
    #[error(transparent)]
    Net(#[from] MqttError),
    #[error("keepalive timeout, no PINGRESP received")]
    KeepAliveTimeout,
    #[error("timeout")]
    Timeout,
    #[error("session closed")]
    SessionClosed,
    #[error("already completed")]
    AlreadyCompleted,
}

impl ClientError {
    /// Rejected before anything was written to the network.
    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ClientError::AlreadyConnecting
                | ClientError::MissingClientId
                | ClientError::InvalidOptions(_)
                | ClientError::InvalidTopic(_)
                | ClientError::NotConnected
                | ClientError::PacketIdExhausted
        )
    }

    /// The connection is presumed dead.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Net(_) | ClientError::KeepAliveTimeout | ClientError::Timeout)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Net(e.into())
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Net(e.into())
    }
}
