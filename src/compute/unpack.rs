//! Turns the envelope stream of a destination partition back into
//! `(recipient, payload)` pairs for the update phase.

use rustc_hash::FxHashMap;

use crate::core::message::Envelope;
use crate::core::{DataType, VertexKey};

/// Flat-maps an explicit-list envelope into one pair per listed recipient.
pub(crate) fn unpack_with_recipients<K: VertexKey, M: DataType>(
    envelope: Envelope<K, M>,
    out: &mut Vec<(K, M)>,
) {
    for target in envelope.some_recipients {
        out.push((target, envelope.payload.clone()));
    }
}

/// Reconstructs the recipients of broadcast envelopes from this
/// partition's own edges.
///
/// The out-neighbour index is materialized once, from the edges whose
/// destination lives in this partition, and reused for the rest of the
/// run; broadcast envelopes only carry the sender, so delivery is a lookup
/// of `out_neighbours_in_part[sender]`.
pub(crate) struct BroadcastUnpacker<K> {
    out_neighbours_in_part: FxHashMap<K, Vec<K>>,
    primed: bool,
}

impl<K: VertexKey> BroadcastUnpacker<K> {
    pub(crate) fn new() -> Self {
        Self {
            out_neighbours_in_part: FxHashMap::default(),
            primed: false,
        }
    }

    /// Builds the out-neighbour index; called on the first superstep only.
    pub(crate) fn prime(&mut self, edges_in_part: &[(K, K)]) {
        if self.primed {
            return;
        }
        self.primed = true;
        for (source, target) in edges_in_part {
            self.out_neighbours_in_part
                .entry(source.clone())
                .or_default()
                .push(target.clone());
        }
    }

    pub(crate) fn unpack<M: DataType>(&self, envelope: &Envelope<K, M>, out: &mut Vec<(K, M)>) {
        if let Some(targets) = self.out_neighbours_in_part.get(&envelope.sender) {
            for target in targets {
                out.push((target.clone(), envelope.payload.clone()));
            }
        }
    }
}

#[cfg(test)]
mod unpack_test {
    use super::*;

    fn broadcast(sender: u64, payload: &'static str) -> Envelope<u64, &'static str> {
        Envelope {
            payload,
            sender,
            some_recipients: vec![],
            channel_id: 0,
            repr_vertex: Some(1),
        }
    }

    #[test]
    fn explicit_list_unpacks_to_every_recipient() {
        let envelope = Envelope {
            payload: "m",
            sender: 1u64,
            some_recipients: vec![4, 5, 6],
            channel_id: 0,
            repr_vertex: None,
        };

        let mut out = Vec::new();
        unpack_with_recipients(envelope, &mut out);
        assert_eq!(out, vec![(4, "m"), (5, "m"), (6, "m")]);
    }

    #[test]
    fn broadcast_unpacks_against_the_local_edge_index() {
        let mut unpacker = BroadcastUnpacker::new();
        unpacker.prime(&[(1, 4), (1, 5), (2, 4)]);

        let mut out = Vec::new();
        unpacker.unpack(&broadcast(1, "a"), &mut out);
        unpacker.unpack(&broadcast(2, "b"), &mut out);
        assert_eq!(out, vec![(4, "a"), (5, "a"), (4, "b")]);
    }

    #[test]
    fn unknown_sender_unpacks_to_nothing() {
        let mut unpacker = BroadcastUnpacker::new();
        unpacker.prime(&[(1, 4)]);

        let mut out: Vec<(u64, &str)> = Vec::new();
        unpacker.unpack(&broadcast(9, "a"), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn priming_happens_once() {
        let mut unpacker = BroadcastUnpacker::new();
        unpacker.prime(&[(1, 4)]);
        // a later superstep must not double the index
        unpacker.prime(&[(1, 4)]);

        let mut out = Vec::new();
        unpacker.unpack(&broadcast(1, "a"), &mut out);
        assert_eq!(out, vec![(4, "a")]);
    }
}
