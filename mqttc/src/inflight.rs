use std::collections::BTreeMap;
use std::num::NonZeroU16;
use std::sync::atomic::{AtomicU16, Ordering};

use mqttc_codec::{Packet, Publish};

use crate::future::{PublishFuture, SubscribeFuture, UnsubscribeFuture};
use crate::{ClientError, Result};

pub type PacketId = NonZeroU16;

/// Where a tracked packet is in its acknowledgement handshake.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum MomentStatus {
    /// outbound QoS 1 PUBLISH, waiting for PUBACK
    UnAck,
    /// outbound QoS 2 PUBLISH, waiting for PUBREC
    UnReceived,
    /// PUBREL sent, waiting for PUBCOMP
    UnComplete,
    UnSubAck,
    UnUnsubAck,
    /// inbound QoS 2 PUBLISH, PUBREC sent, waiting for PUBREL
    UnRelease,
}

/// Completion side of an outbound operation.
#[derive(Debug, Clone)]
pub enum Waiter {
    Publish(PublishFuture),
    Subscribe(SubscribeFuture),
    Unsubscribe(UnsubscribeFuture),
}

impl Waiter {
    #[inline]
    pub(crate) fn fail(&self, e: ClientError) {
        let _ = match self {
            Waiter::Publish(f) | Waiter::Unsubscribe(f) => f.complete(Err(e)),
            Waiter::Subscribe(f) => f.complete(Err(e)),
        };
    }

    /// Resolve a publish or unsubscribe waiter. SUBACK carries codes and is resolved by the caller.
    #[inline]
    pub(crate) fn complete_unit(&self) {
        if let Waiter::Publish(f) | Waiter::Unsubscribe(f) = self {
            let _ = f.complete(Ok(()));
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutInflightMessage {
    pub packet: Packet,
    pub status: MomentStatus,
    pub waiter: Waiter,
}

impl OutInflightMessage {
    #[inline]
    pub fn new(status: MomentStatus, packet: Packet, waiter: Waiter) -> Self {
        Self { packet, status, waiter }
    }
}

#[derive(Debug, Clone)]
pub struct InInflightMessage {
    pub publish: Publish,
    pub status: MomentStatus,
}

/// Packets whose handshake has started but not finished, keyed by packet id.
///
/// Ids come from a wrapping 16-bit counter that never yields `0` and skips ids still in the table.
pub struct InflightTable<M> {
    next: AtomicU16,
    queues: BTreeMap<PacketId, M>,
}

impl<M> Default for InflightTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> InflightTable<M> {
    #[inline]
    pub fn new() -> Self {
        Self { next: AtomicU16::new(1), queues: BTreeMap::new() }
    }

    /// Insert, handing back whatever was stored under the same id.
    #[inline]
    pub fn put(&mut self, packet_id: PacketId, m: M) -> Option<M> {
        self.queues.insert(packet_id, m)
    }

    #[inline]
    pub fn get(&self, packet_id: &PacketId) -> Option<&M> {
        self.queues.get(packet_id)
    }

    #[inline]
    pub fn get_mut(&mut self, packet_id: &PacketId) -> Option<&mut M> {
        self.queues.get_mut(packet_id)
    }

    #[inline]
    pub fn delete(&mut self, packet_id: &PacketId) -> Option<M> {
        self.queues.remove(packet_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    #[inline]
    pub fn exist(&self, packet_id: &PacketId) -> bool {
        self.queues.contains_key(packet_id)
    }

    #[inline]
    pub fn next_id(&self) -> Result<PacketId> {
        // one full lap, plus the 0 that gets skipped on wrap
        for _ in 0..=u16::MAX {
            let Some(packet_id) = NonZeroU16::new(self.next.fetch_add(1, Ordering::SeqCst)) else {
                continue;
            };
            if !self.queues.contains_key(&packet_id) {
                return Ok(packet_id);
            }
        }
        Err(ClientError::PacketIdExhausted)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.queues.clear()
    }

    /// Empty the table, yielding entries in packet id order.
    #[inline]
    pub fn drain(&mut self) -> impl Iterator<Item = (PacketId, M)> {
        std::mem::take(&mut self.queues).into_iter()
    }
}
