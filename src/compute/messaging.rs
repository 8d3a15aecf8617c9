//! The messaging side of a superstep: the user's messaging function and
//! the packing that turns its sends into per-partition envelopes.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::compute::context::SuperstepContext;
use crate::compute::HASH_KEYS_BROADCAST_SET;
use crate::core::agg::{AggId, AggregateFn};
use crate::core::errors::ComputeError;
use crate::core::message::Envelope;
use crate::core::partition::HashPartitioner;
use crate::core::{DataType, VertexKey};

pub use crate::core::partition::OutgoingEdge;

/// Produces the messages of one superstep, invoked once per changed vertex.
///
/// One clone of the function runs per partition worker; instance state is
/// worker-local. `init` runs once on the first superstep, the
/// pre/post hooks once per superstep per worker.
pub trait MessagingFunction<K, V, M, E>: Clone + Send {
    /// Called once per superstep for each vertex that changed in the
    /// previous superstep. Produces the messages received in the next
    /// update phase.
    fn send_messages(
        &mut self,
        scope: &mut MessageScope<'_, '_, K, M, E>,
        key: &K,
        value: &V,
    ) -> Result<(), ComputeError>;

    fn init(&mut self, _ctx: &mut SuperstepContext<'_>) -> Result<(), ComputeError> {
        Ok(())
    }

    fn pre_superstep(&mut self, _ctx: &mut SuperstepContext<'_>) -> Result<(), ComputeError> {
        Ok(())
    }

    fn post_superstep(&mut self, _ctx: &mut SuperstepContext<'_>) -> Result<(), ComputeError> {
        Ok(())
    }
}

/// One-shot cursor over the outgoing edges of the current vertex.
pub struct OutgoingEdges<'a, K, E> {
    inner: std::slice::Iter<'a, OutgoingEdge<K, E>>,
}

impl<'a, K, E> Iterator for OutgoingEdges<'a, K, E> {
    type Item = &'a OutgoingEdge<K, E>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Per-channel buffers the packing writes envelopes into. Routing always
/// goes through the partitioner on the envelope's outer key, the same
/// function that grouped the recipients.
pub(crate) struct Outbox<K, M> {
    partitioner: HashPartitioner,
    channels: Vec<Vec<Envelope<K, M>>>,
}

impl<K: VertexKey, M> Outbox<K, M> {
    pub(crate) fn new(partitioner: HashPartitioner) -> Self {
        Self {
            partitioner,
            channels: (0..partitioner.channels()).map(|_| Vec::new()).collect(),
        }
    }

    fn collect(&mut self, outer_key: &K, envelope: Envelope<K, M>) {
        let channel = self.partitioner.channel(outer_key);
        self.channels[channel].push(envelope);
    }

    pub(crate) fn into_channels(self) -> Vec<Vec<Envelope<K, M>>> {
        self.channels
    }
}

/// The packing API handed to [`MessagingFunction::send_messages`] for one
/// vertex.
///
/// A multicast is shipped as one explicit-list envelope per destination
/// partition; a send-to-all-neighbours is shipped as one broadcast envelope
/// per destination partition spanned by the out-edges, with the recipients
/// reconstructed from the receiver's local edge index.
pub struct MessageScope<'a, 'ctx, K, M, E> {
    sender: &'a K,
    edges: &'a [OutgoingEdge<K, E>],
    edges_used: bool,
    partitioner: HashPartitioner,
    hash_keys: &'a FxHashMap<usize, K>,
    outbox: &'a mut Outbox<K, M>,
    ctx: &'a mut SuperstepContext<'ctx>,
}

impl<'a, 'ctx, K, M, E> MessageScope<'a, 'ctx, K, M, E>
where
    K: VertexKey,
    M: DataType,
    E: DataType,
{
    pub(crate) fn new(
        sender: &'a K,
        edges: &'a [OutgoingEdge<K, E>],
        partitioner: HashPartitioner,
        hash_keys: &'a FxHashMap<usize, K>,
        outbox: &'a mut Outbox<K, M>,
        ctx: &'a mut SuperstepContext<'ctx>,
    ) -> Self {
        Self {
            sender,
            edges,
            edges_used: false,
            partitioner,
            hash_keys,
            outbox,
            ctx,
        }
    }

    /// All outgoing edges of the current vertex. Mutually exclusive with
    /// [`send_message_to_all_neighbours`](Self::send_message_to_all_neighbours)
    /// and usable at most once per `send_messages` invocation.
    pub fn outgoing_edges(&mut self) -> Result<OutgoingEdges<'a, K, E>, ComputeError> {
        if self.edges_used {
            return Err(ComputeError::EdgesExhausted);
        }
        self.edges_used = true;
        Ok(OutgoingEdges {
            inner: self.edges.iter(),
        })
    }

    /// Sends `m` to one vertex. If the target does not exist the next
    /// superstep fails with a non-deliverable message error.
    pub fn send_message_to(&mut self, target: K, m: M) -> usize {
        self.send_message_to_multiple_recipients(std::slice::from_ref(&target), m)
    }

    /// Sends `m` to every listed recipient, packed as one envelope per
    /// destination partition. Returns the number of envelopes shipped.
    pub fn send_message_to_multiple_recipients(&mut self, recipients: &[K], m: M) -> usize {
        let mut recipients_in_block: FxHashMap<usize, Vec<K>> = FxHashMap::default();
        for target in recipients {
            recipients_in_block
                .entry(self.partitioner.channel(target))
                .or_default()
                .push(target.clone());
        }

        let mut blocked = 0;
        let mut channels: Vec<usize> = recipients_in_block.keys().copied().collect();
        channels.sort_unstable();
        for channel in channels {
            let targets = recipients_in_block
                .remove(&channel)
                .unwrap_or_default();
            let outer_key = targets[0].clone();
            let envelope = Envelope {
                payload: m.clone(),
                sender: self.sender.clone(),
                some_recipients: targets,
                channel_id: channel,
                repr_vertex: None,
            };
            self.outbox.collect(&outer_key, envelope);
            blocked += 1;
        }
        blocked
    }

    /// Sends `m` to every target of an outgoing edge of the current vertex,
    /// as one broadcast envelope per destination partition routed by that
    /// partition's representative. Mutually exclusive with
    /// [`outgoing_edges`](Self::outgoing_edges) and usable at most once per
    /// `send_messages` invocation. Returns the number of envelopes shipped.
    pub fn send_message_to_all_neighbours(&mut self, m: M) -> Result<usize, ComputeError> {
        if self.edges_used {
            return Err(ComputeError::EdgesExhausted);
        }
        self.edges_used = true;

        let mut channel_set: FxHashSet<usize> = FxHashSet::default();
        let mut blocked = 0;
        for edge in self.edges {
            let channel = self.partitioner.channel(&edge.target);
            if channel_set.insert(channel) {
                // later neighbours on this channel are suppressed; the
                // receiving partition re-enumerates them from its own edges
                let repr = self.hash_keys.get(&channel).cloned().ok_or_else(|| {
                    ComputeError::custom(format!("no representative for partition {channel}"))
                })?;
                let envelope = Envelope {
                    payload: m.clone(),
                    sender: self.sender.clone(),
                    some_recipients: Vec::new(),
                    channel_id: channel,
                    repr_vertex: Some(repr.clone()),
                };
                self.outbox.collect(&repr, envelope);
                blocked += 1;
            }
        }
        Ok(blocked)
    }

    /// The number of the current superstep, starting at 1.
    pub fn superstep(&self) -> usize {
        self.ctx.superstep()
    }

    pub fn aggregate<F: AggregateFn>(
        &mut self,
        id: &AggId<F>,
        value: F::Value,
    ) -> Result<(), ComputeError> {
        self.ctx.aggregate(id, value)
    }

    pub fn previous_aggregate<F: AggregateFn>(&self, id: &AggId<F>) -> Option<F::Value> {
        self.ctx.previous_aggregate(id)
    }

    pub fn broadcast_set<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<&[T], ComputeError> {
        self.ctx.broadcast_set(name)
    }
}

/// One partition's messaging worker: the user function clone plus the
/// representative table it reads from the reserved broadcast set at init.
pub(crate) struct MessagingWorker<MF, K> {
    pub(crate) udf: MF,
    pub(crate) hash_keys: FxHashMap<usize, K>,
}

impl<MF, K: VertexKey> MessagingWorker<MF, K> {
    pub(crate) fn new(udf: MF) -> Self {
        Self {
            udf,
            hash_keys: FxHashMap::default(),
        }
    }

    pub(crate) fn init<V, M, E>(
        &mut self,
        ctx: &mut SuperstepContext<'_>,
    ) -> Result<(), ComputeError>
    where
        MF: MessagingFunction<K, V, M, E>,
    {
        let rows = ctx.broadcast_set::<(usize, K)>(HASH_KEYS_BROADCAST_SET)?;
        self.hash_keys = rows.iter().cloned().collect();
        self.udf.init(ctx)
    }
}
