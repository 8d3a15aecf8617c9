//! Vertexcast is a vertex-centric iterative graph computation engine.
//!
//! Computations are expressed in the Bulk-Synchronous-Parallel style: a
//! messaging function turns changed vertex states into messages along the
//! outgoing edges, and an update function folds the incoming messages into a
//! new vertex state. Supersteps repeat until no vertex changes or a
//! configured bound is hit.
//!
//! Messages identical across many recipients are shipped once per
//! destination partition rather than once per recipient: a multicast is
//! packed into one envelope per (sender, partition) pair and unpacked on the
//! receiving partition against a locally held out-neighbour index.
//!
//! # Propagate the minimum vertex id through a graph
//!
//! ```
//! use vertexcast::compute::messaging::{MessageScope, MessagingFunction};
//! use vertexcast::compute::runner::VertexCentricIteration;
//! use vertexcast::compute::update::{MessageIterator, UpdateScope, VertexUpdateFunction};
//! use vertexcast::core::errors::ComputeError;
//!
//! #[derive(Clone)]
//! struct MinMessenger;
//!
//! impl MessagingFunction<u64, u64, u64, ()> for MinMessenger {
//!     fn send_messages(
//!         &mut self,
//!         scope: &mut MessageScope<'_, '_, u64, u64, ()>,
//!         _key: &u64,
//!         value: &u64,
//!     ) -> Result<(), ComputeError> {
//!         scope.send_message_to_all_neighbours(*value)?;
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Clone)]
//! struct MinUpdater;
//!
//! impl VertexUpdateFunction<u64, u64, u64> for MinUpdater {
//!     fn update_vertex(
//!         &mut self,
//!         scope: &mut UpdateScope<'_, '_, u64>,
//!         _key: &u64,
//!         value: &u64,
//!         messages: MessageIterator<'_, u64>,
//!     ) -> Result<(), ComputeError> {
//!         if let Some(smallest) = messages.min() {
//!             if smallest < value {
//!                 scope.set_new_vertex_value(*smallest);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let edges = vec![(1u64, 2u64), (2, 1), (2, 3), (3, 2)];
//! let mut iteration =
//!     VertexCentricIteration::with_plain_edges(edges, MinUpdater, MinMessenger, 10).unwrap();
//! iteration.set_input(vec![(1u64, 1u64), (2, 2), (3, 3)]);
//!
//! let mut result = iteration.create_result().unwrap();
//! result.sort();
//! assert_eq!(result, vec![(1, 1), (2, 1), (3, 1)]);
//! ```

pub mod compute;
pub mod core;

pub use crate::compute::messaging::{MessageScope, MessagingFunction, OutgoingEdge};
pub use crate::compute::runner::VertexCentricIteration;
pub use crate::compute::update::{MessageIterator, UpdateScope, VertexUpdateFunction};
pub use crate::core::errors::ComputeError;

#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;
