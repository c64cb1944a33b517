#![deny(unsafe_code)]

//! Byte stream plumbing for the mqttc client
//!
//! - [`PacketStream`] / [`PacketSink`]: the read and write halves of a transport, speaking whole
//!   MQTT packets instead of bytes
//! - [`ServerAddr`] and [`dial`]: turn a broker url into a connected [`Transport`]
//!   (`mqtt://`, `mqtts://`, `ws://`, `wss://`)

mod error;
mod stream;
mod transport;
#[cfg(feature = "ws")]
mod ws;

pub use error::MqttError;
pub use stream::{split, PacketSink, PacketStream};
pub use transport::{dial, BoxedTransport, DialOptions, Scheme, ServerAddr, Transport};
#[cfg(feature = "ws")]
pub use ws::WsStream;

pub type Result<T> = std::result::Result<T, MqttError>;
