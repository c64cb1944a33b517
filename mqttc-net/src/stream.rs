use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use mqttc_codec::{Codec, Packet};

use crate::error::MqttError;
use crate::Result;

/// Read half of a transport, yielding whole packets.
///
/// Partial frames stay buffered until the rest arrives. The first decode or
/// io error is kept and every later read returns it again.
pub struct PacketStream<R> {
    io: FramedRead<R, Codec>,
    failed: Option<MqttError>,
}

impl<R> PacketStream<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(io: R, max_packet_size: u32) -> Self {
        PacketStream { io: FramedRead::new(io, Codec::new(max_packet_size)), failed: None }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Next packet, `Ok(None)` on a clean end of stream.
    #[inline]
    pub async fn recv(&mut self) -> Result<Option<Packet>> {
        self.next().await.transpose()
    }

    #[inline]
    pub async fn recv_timeout(&mut self, tm: Duration) -> Result<Option<Packet>> {
        match tokio::time::timeout(tm, self.recv()).await {
            Ok(res) => res,
            Err(_) => Err(MqttError::ReadTimeout),
        }
    }
}

impl<R> Stream for PacketStream<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Packet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(e) = &this.failed {
            return Poll::Ready(Some(Err(e.clone())));
        }
        Poll::Ready(match futures::ready!(Pin::new(&mut this.io).poll_next(cx)) {
            Some(Ok(packet)) => Some(Ok(packet)),
            Some(Err(e)) => {
                let e = MqttError::from(e);
                this.failed = Some(e.clone());
                Some(Err(e))
            }
            None => None,
        })
    }
}

/// Write half of a transport. Each packet is encoded into one buffer and flushed.
pub struct PacketSink<W> {
    io: FramedWrite<W, Codec>,
    send_timeout: Duration,
}

impl<W> PacketSink<W>
where
    W: AsyncWrite + Unpin,
{
    /// A zero `send_timeout` waits forever.
    pub fn new(io: W, send_timeout: Duration) -> Self {
        PacketSink { io: FramedWrite::new(io, Codec::default()), send_timeout }
    }

    #[inline]
    pub async fn send(&mut self, packet: Packet) -> Result<()> {
        if self.send_timeout.is_zero() {
            self.io.send(packet).await?;
            Ok(())
        } else {
            match tokio::time::timeout(self.send_timeout, self.io.send(packet)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(MqttError::from(e)),
                Err(_) => Err(MqttError::WriteTimeout),
            }
        }
    }

    #[inline]
    pub async fn close(&mut self) -> Result<()> {
        if self.send_timeout.is_zero() {
            self.io.close().await?;
            Ok(())
        } else {
            match tokio::time::timeout(self.send_timeout, self.io.close()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(MqttError::from(e)),
                Err(_) => Err(MqttError::CloseTimeout),
            }
        }
    }
}

/// Split a transport into its packet halves.
pub fn split<T>(
    io: T,
    max_packet_size: u32,
    send_timeout: Duration,
) -> (PacketStream<ReadHalf<T>>, PacketSink<WriteHalf<T>>)
where
    T: AsyncRead + AsyncWrite,
{
    let (r, w) = tokio::io::split(io);
    (PacketStream::new(r, max_packet_size), PacketSink::new(w, send_timeout))
}
