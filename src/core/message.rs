use serde::{Deserialize, Serialize};

/// The wire datum exchanged between supersteps: one payload plus the
/// header that tells the receiving partition how to deliver it.
///
/// `some_recipients` doubles as the discriminator: an empty list means a
/// broadcast-to-partition envelope whose recipients are reconstructed from
/// the receiver's local out-neighbour index, a non-empty list enumerates
/// the recipients explicitly. Every header field is populated at packing
/// time; nothing downstream synthesizes headers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<K, M> {
    pub payload: M,
    pub sender: K,
    /// Empty iff this is a broadcast-to-partition envelope; all listed keys
    /// belong to `channel_id`.
    pub some_recipients: Vec<K>,
    /// The destination partition.
    pub channel_id: usize,
    /// Representative of the destination partition; the routing key of
    /// broadcast envelopes, absent on explicit-list envelopes.
    pub repr_vertex: Option<K>,
}

impl<K, M> Envelope<K, M> {
    pub fn is_broadcast(&self) -> bool {
        self.some_recipients.is_empty()
    }
}
