//! The update side of a superstep: the user's vertex update function and
//! the scope it emits new states through.

use crate::compute::context::SuperstepContext;
use crate::core::agg::{AggId, AggregateFn};
use crate::core::errors::ComputeError;

/// Folds the messages received by one vertex into an optional new state,
/// invoked once per message-receiving vertex per superstep.
///
/// One clone of the function runs per partition worker. Emitting a new
/// state through the scope puts the vertex into the next superstep's work
/// set; emitting nothing leaves the vertex unchanged and inactive.
pub trait VertexUpdateFunction<K, V, M>: Clone + Send {
    fn update_vertex(
        &mut self,
        scope: &mut UpdateScope<'_, '_, V>,
        key: &K,
        value: &V,
        messages: MessageIterator<'_, M>,
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

/// The messages delivered to one vertex in this superstep, in no
/// guaranteed order.
pub struct MessageIterator<'a, M> {
    inner: std::slice::Iter<'a, M>,
}

impl<'a, M> MessageIterator<'a, M> {
    pub(crate) fn new(messages: &'a [M]) -> Self {
        Self {
            inner: messages.iter(),
        }
    }
}

impl<'a, M> Iterator for MessageIterator<'a, M> {
    type Item = &'a M;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Emission handle for [`VertexUpdateFunction::update_vertex`]: at most one
/// new state per invocation, a later call replaces an earlier one. The
/// vertex key is owned by the host and cannot be changed here.
pub struct UpdateScope<'a, 'ctx, V> {
    new_value: Option<V>,
    ctx: &'a mut SuperstepContext<'ctx>,
}

impl<'a, 'ctx, V> UpdateScope<'a, 'ctx, V> {
    pub(crate) fn new(ctx: &'a mut SuperstepContext<'ctx>) -> Self {
        Self {
            new_value: None,
            ctx,
        }
    }

    /// Replaces the vertex state and schedules the vertex into the next
    /// superstep's work set.
    pub fn set_new_vertex_value(&mut self, value: V) {
        self.new_value = Some(value);
    }

    pub(crate) fn into_new_value(self) -> Option<V> {
        self.new_value
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
