//! Per-superstep aggregation.
//!
//! UDFs contribute values to named aggregators while a superstep runs; the
//! per-worker partials are merged at the superstep barrier, and the merged
//! result becomes readable from every UDF in the next superstep through
//! the same [`AggId`] handle.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::AddAssign;
use std::sync::Arc;

use num_traits::{Bounded, Zero};
use rustc_hash::FxHashMap;

use crate::core::errors::ComputeError;
use crate::core::StateType;

/// The reduction behind a named aggregator: the neutral element a
/// superstep starts from, and how one contribution folds into the running
/// value. Worker partials are merged with the same fold at the barrier, so
/// the fold must be commutative and associative.
pub trait AggregateFn: Send + Sync + 'static {
    type Value: StateType;

    fn neutral() -> Self::Value;

    fn fold(acc: &mut Self::Value, value: Self::Value);
}

/// Keeps the smallest contributed value.
pub struct MinFn<T>(PhantomData<T>);

impl<T: StateType + Bounded + PartialOrd> AggregateFn for MinFn<T> {
    type Value = T;

    fn neutral() -> T {
        T::max_value()
    }

    fn fold(acc: &mut T, value: T) {
        if value < *acc {
            *acc = value;
        }
    }
}

/// Keeps the largest contributed value.
pub struct MaxFn<T>(PhantomData<T>);

impl<T: StateType + Bounded + PartialOrd> AggregateFn for MaxFn<T> {
    type Value = T;

    fn neutral() -> T {
        T::min_value()
    }

    fn fold(acc: &mut T, value: T) {
        if value > *acc {
            *acc = value;
        }
    }
}

/// Sums the contributed values.
pub struct SumFn<T>(PhantomData<T>);

impl<T: StateType + Zero + AddAssign<T>> AggregateFn for SumFn<T> {
    type Value = T;

    fn neutral() -> T {
        T::zero()
    }

    fn fold(acc: &mut T, value: T) {
        *acc += value;
    }
}

/// A typed handle to a named aggregator registered on the iteration.
///
/// UDF code passes the handle to `aggregate` and `previous_aggregate`; the
/// driver keys its registry by the name.
pub struct AggId<F: AggregateFn> {
    name: &'static str,
    _f: PhantomData<fn() -> F>,
}

impl<F: AggregateFn> Copy for AggId<F> {}

impl<F: AggregateFn> Clone for AggId<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: AggregateFn> fmt::Debug for AggId<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggId").field("name", &self.name).finish()
    }
}

impl<F: AggregateFn> AggId<F> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub mod aggregators {
    use super::{AggId, AggregateFn, MaxFn, MinFn, SumFn};
    use crate::core::StateType;
    use num_traits::{Bounded, Zero};
    use std::marker::PhantomData;
    use std::ops::AddAssign;

    fn id<F: AggregateFn>(name: &'static str) -> AggId<F> {
        AggId {
            name,
            _f: PhantomData,
        }
    }

    pub fn min<T: StateType + Bounded + PartialOrd>(name: &'static str) -> AggId<MinFn<T>> {
        id(name)
    }

    pub fn max<T: StateType + Bounded + PartialOrd>(name: &'static str) -> AggId<MaxFn<T>> {
        id(name)
    }

    pub fn sum<T: StateType + Zero + AddAssign<T>>(name: &'static str) -> AggId<SumFn<T>> {
        id(name)
    }
}

// ------------------------------------------------------------------------
// driver-side state: one type-erased slot per registered aggregator
// ------------------------------------------------------------------------

pub(crate) trait AggSlot: Send + Sync {
    fn fresh(&self) -> Box<dyn AggSlot>;

    fn merge_from(&mut self, other: &dyn AggSlot);

    /// Takes the merged value for publication and restarts the slot at the
    /// neutral element for the next superstep.
    fn take(&mut self) -> Arc<dyn Any + Send + Sync>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<F: AggregateFn> {
    value: F::Value,
}

impl<F: AggregateFn> Slot<F> {
    fn empty() -> Self {
        Self {
            value: F::neutral(),
        }
    }
}

impl<F: AggregateFn> AggSlot for Slot<F> {
    fn fresh(&self) -> Box<dyn AggSlot> {
        Box::new(Slot::<F>::empty())
    }

    fn merge_from(&mut self, other: &dyn AggSlot) {
        if let Some(other) = other.as_any().downcast_ref::<Slot<F>>() {
            F::fold(&mut self.value, other.value.clone());
        }
    }

    fn take(&mut self) -> Arc<dyn Any + Send + Sync> {
        let merged = std::mem::replace(&mut self.value, F::neutral());
        Arc::new(merged)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Merged aggregator results of a finished superstep, keyed by name.
pub(crate) type PrevAggregates = FxHashMap<String, Arc<dyn Any + Send + Sync>>;

/// The master registry owned by the iteration driver.
#[derive(Default)]
pub(crate) struct AggRegistry {
    slots: FxHashMap<String, Box<dyn AggSlot>>,
}

impl AggRegistry {
    pub(crate) fn register<F: AggregateFn>(&mut self, id: &AggId<F>) -> Result<(), ComputeError> {
        if self.slots.contains_key(id.name()) {
            return Err(ComputeError::Configuration(format!(
                "aggregator '{}' is already registered",
                id.name()
            )));
        }
        self.slots
            .insert(id.name().to_owned(), Box::new(Slot::<F>::empty()));
        Ok(())
    }

    /// Neutral copies of every registered slot, for one worker and one
    /// superstep.
    pub(crate) fn fresh_partials(&self) -> AggPartials {
        AggPartials {
            slots: self
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), slot.fresh()))
                .collect(),
        }
    }

    /// Folds one worker's partials into the master slots.
    pub(crate) fn absorb(&mut self, partials: AggPartials) {
        for (name, partial) in partials.slots {
            if let Some(slot) = self.slots.get_mut(&name) {
                slot.merge_from(partial.as_ref());
            }
        }
    }

    /// Ends the superstep: publishes every merged value and restarts the
    /// slots for the next one.
    pub(crate) fn roll(&mut self) -> PrevAggregates {
        self.slots
            .iter_mut()
            .map(|(name, slot)| (name.clone(), slot.take()))
            .collect()
    }
}

/// Worker-local aggregation state for one superstep.
pub(crate) struct AggPartials {
    slots: FxHashMap<String, Box<dyn AggSlot>>,
}

impl AggPartials {
    pub(crate) fn add<F: AggregateFn>(
        &mut self,
        id: &AggId<F>,
        value: F::Value,
    ) -> Result<(), ComputeError> {
        let slot = self
            .slots
            .get_mut(id.name())
            .ok_or_else(|| ComputeError::UnknownAggregator(id.name().to_owned()))?;
        let slot = slot
            .as_any_mut()
            .downcast_mut::<Slot<F>>()
            .ok_or_else(|| {
                ComputeError::Configuration(format!(
                    "aggregator '{}' was registered with a different type",
                    id.name()
                ))
            })?;
        F::fold(&mut slot.value, value);
        Ok(())
    }
}
