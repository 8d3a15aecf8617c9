use std::fmt::Debug;
use std::hash::Hash;

pub mod agg;
pub mod errors;
pub mod message;
pub mod partition;

/// Bounds required of a vertex identifier: totally ordered (for
/// representative selection), hashable (for partition assignment) and
/// cheap to move between worker threads.
pub trait VertexKey: Ord + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Ord + Hash + Clone + Debug + Send + Sync + 'static> VertexKey for T {}

/// Bounds required of values carried through the engine: vertex states,
/// messages and edge values.
pub trait DataType: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> DataType for T {}

/// Bounds required of aggregator state.
pub trait StateType: PartialEq + Clone + Debug + Send + Sync + 'static {}

impl<T: PartialEq + Clone + Debug + Send + Sync + 'static> StateType for T {}
