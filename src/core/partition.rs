//! Partition assignment and the auxiliary edge tables the messaging
//! pipeline is built on.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::core::{DataType, VertexKey};

/// Assigns every vertex key to one of `P` channels (partitions).
///
/// This is the only channel-from-key function in the crate: envelope
/// routing, recipient grouping and edge indexing all go through it, so a
/// key always lands on the same partition no matter which side asks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashPartitioner {
    channels: usize,
}

impl HashPartitioner {
    pub fn new(channels: usize) -> Self {
        debug_assert!(channels > 0);
        Self { channels }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn channel<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.channels as u64) as usize
    }
}

/// One outgoing edge as seen from its source vertex: the target plus the
/// edge value (`()` for plain edges).
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingEdge<K, E> {
    pub target: K,
    pub value: E,
}

/// The auxiliary tables built once over the edge set before the iteration
/// starts.
///
/// * per source partition, the out-edge adjacency the messaging phase
///   co-groups with the work set (the only place edge values survive);
/// * per destination partition, the `(src, dst)` pairs whose target lives
///   there, feeding the broadcast unpacker's local out-neighbour index;
/// * the representative of each destination partition: the minimum target
///   key hashed to it.
///
/// Representatives are derived from edge destinations only. A partition
/// that holds no edge destination has no representative; it also can never
/// be the target of a broadcast, so the gap is unobservable.
pub struct EdgeIndex<K, E> {
    out_edges: Vec<FxHashMap<K, Vec<OutgoingEdge<K, E>>>>,
    dst_edges: Vec<Vec<(K, K)>>,
    representatives: Vec<Option<K>>,
}

impl<K: VertexKey, E: DataType> EdgeIndex<K, E> {
    pub fn build(edges: Vec<(K, K, E)>, partitioner: &HashPartitioner) -> Self {
        let channels = partitioner.channels();
        let mut out_edges: Vec<FxHashMap<K, Vec<OutgoingEdge<K, E>>>> =
            (0..channels).map(|_| FxHashMap::default()).collect();
        let mut dst_edges: Vec<Vec<(K, K)>> = (0..channels).map(|_| Vec::new()).collect();
        let mut representatives: Vec<Option<K>> = vec![None; channels];

        for (src, dst, value) in edges {
            let dst_channel = partitioner.channel(&dst);
            dst_edges[dst_channel].push((src.clone(), dst.clone()));

            let repr = &mut representatives[dst_channel];
            if repr.as_ref().map_or(true, |r| dst < *r) {
                *repr = Some(dst.clone());
            }

            let src_channel = partitioner.channel(&src);
            out_edges[src_channel]
                .entry(src)
                .or_default()
                .push(OutgoingEdge { target: dst, value });
        }

        Self {
            out_edges,
            dst_edges,
            representatives,
        }
    }

    /// Out-edges of `key`, looked up in its source partition's adjacency.
    pub fn out_edges_of(&self, channel: usize, key: &K) -> &[OutgoingEdge<K, E>] {
        self.out_edges[channel]
            .get(key)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }

    /// Edges whose destination is held by `channel`, values projected away.
    pub fn dst_edges(&self, channel: usize) -> &[(K, K)] {
        &self.dst_edges[channel]
    }

    pub fn representative(&self, channel: usize) -> Option<&K> {
        self.representatives[channel].as_ref()
    }

    /// The representative table in broadcast-set row form:
    /// `(channel, representative)` for every partition that has one.
    pub fn representative_rows(&self) -> Vec<(usize, K)> {
        self.representatives
            .iter()
            .enumerate()
            .filter_map(|(channel, repr)| repr.clone().map(|r| (channel, r)))
            .collect()
    }
}
