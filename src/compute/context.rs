use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::agg::{AggId, AggPartials, AggregateFn, PrevAggregates};
use crate::core::errors::ComputeError;

/// Named data sets replicated read-only to every worker, type-erased so
/// sets of different element types can share one registry.
pub(crate) type BroadcastSets = FxHashMap<String, Arc<dyn Any + Send + Sync>>;

/// Per-worker, per-superstep view of the iteration runtime, passed by
/// reference into UDF lifecycle methods.
///
/// Aggregator writes land in this worker's partial state and are merged
/// across workers at the superstep barrier; the merged result is readable
/// through [`previous_aggregate`](Self::previous_aggregate) from the next
/// superstep on.
pub struct SuperstepContext<'a> {
    pub(crate) superstep: usize,
    pub(crate) partials: &'a mut AggPartials,
    pub(crate) prev: &'a PrevAggregates,
    pub(crate) broadcast_sets: &'a BroadcastSets,
}

impl<'a> SuperstepContext<'a> {
    /// The number of the current superstep, starting at 1.
    pub fn superstep(&self) -> usize {
        self.superstep
    }

    /// Adds a value to the named aggregator for the current superstep.
    pub fn aggregate<F: AggregateFn>(
        &mut self,
        id: &AggId<F>,
        value: F::Value,
    ) -> Result<(), ComputeError> {
        self.partials.add(id, value)
    }

    /// The value the named aggregator merged to in the previous superstep,
    /// or `None` in the first superstep.
    pub fn previous_aggregate<F: AggregateFn>(&self, id: &AggId<F>) -> Option<F::Value> {
        self.prev
            .get(id.name())
            .and_then(|value| value.downcast_ref::<F::Value>())
            .cloned()
    }

    /// The broadcast set registered under `name`.
    pub fn broadcast_set<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<&[T], ComputeError> {
        self.broadcast_sets
            .get(name)
            .and_then(|set| set.downcast_ref::<Vec<T>>())
            .map(|set| set.as_slice())
            .ok_or_else(|| {
                ComputeError::Configuration(format!(
                    "no broadcast set registered under '{name}'"
                ))
            })
    }
}

#[cfg(test)]
mod context_test {
    use super::*;
    use crate::core::agg::{aggregators, AggRegistry};

    fn empty_prev() -> PrevAggregates {
        FxHashMap::default()
    }

    #[test]
    fn broadcast_set_lookup_is_typed() {
        let mut sets: BroadcastSets = FxHashMap::default();
        sets.insert("weights".to_owned(), Arc::new(vec![1.0f64, 2.0]));

        let registry = AggRegistry::default();
        let mut partials = registry.fresh_partials();
        let prev = empty_prev();
        let ctx = SuperstepContext {
            superstep: 1,
            partials: &mut partials,
            prev: &prev,
            broadcast_sets: &sets,
        };

        assert_eq!(ctx.broadcast_set::<f64>("weights").unwrap(), &[1.0, 2.0]);
        assert!(ctx.broadcast_set::<u32>("weights").is_err());
        assert!(ctx.broadcast_set::<f64>("missing").is_err());
    }

    #[test]
    fn previous_aggregate_is_absent_in_the_first_superstep() {
        let total = aggregators::sum::<u64>("total");
        let mut registry = AggRegistry::default();
        registry.register(&total).unwrap();

        let mut partials = registry.fresh_partials();
        let prev = empty_prev();
        let sets: BroadcastSets = FxHashMap::default();
        let mut ctx = SuperstepContext {
            superstep: 1,
            partials: &mut partials,
            prev: &prev,
            broadcast_sets: &sets,
        };

        assert_eq!(ctx.previous_aggregate(&total), None);
        ctx.aggregate(&total, 5).unwrap();

        registry.absorb(partials);
        let rolled = registry.roll();

        let mut partials = registry.fresh_partials();
        let ctx = SuperstepContext {
            superstep: 2,
            partials: &mut partials,
            prev: &rolled,
            broadcast_sets: &sets,
        };
        assert_eq!(ctx.previous_aggregate(&total), Some(5));
    }
}
