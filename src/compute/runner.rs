//! The delta-iteration driver: builder surface, superstep loop and the
//! wiring between the messaging, unpack and update phases.

use std::marker::PhantomData;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::compute::context::{BroadcastSets, SuperstepContext};
use crate::compute::messaging::{MessageScope, MessagingFunction, MessagingWorker, Outbox};
use crate::compute::solution::SolutionSet;
use crate::compute::unpack::{unpack_with_recipients, BroadcastUnpacker};
use crate::compute::update::{MessageIterator, UpdateScope, VertexUpdateFunction};
use crate::compute::HASH_KEYS_BROADCAST_SET;
use crate::core::agg::{AggId, AggPartials, AggRegistry, AggregateFn, PrevAggregates};
use crate::core::errors::ComputeError;
use crate::core::message::Envelope;
use crate::core::partition::{EdgeIndex, HashPartitioner};
use crate::core::{DataType, VertexKey};

/// An iterative vertex-centric graph computation.
///
/// Configured through the builder methods, fed an initial vertex set with
/// [`set_input`](Self::set_input) and executed with
/// [`create_result`](Self::create_result). Each superstep runs the
/// messaging function over the vertices changed in the previous superstep
/// and the update function over the vertices that received messages; the
/// iteration ends when no vertex changes or the superstep bound is hit.
pub struct VertexCentricIteration<K, V, M, E, MF, UF> {
    update_function: UF,
    messaging_function: MF,
    edges: Vec<(K, K, E)>,
    max_supersteps: usize,
    aggregators: AggRegistry,
    bc_messaging: BroadcastSets,
    bc_update: BroadcastSets,
    name: Option<String>,
    parallelism: Option<usize>,
    unmanaged_solution_set: bool,
    initial_vertices: Option<Vec<(K, V)>>,
    _marker: PhantomData<M>,
}

impl<K, V, M, MF, UF> VertexCentricIteration<K, V, M, (), MF, UF>
where
    K: VertexKey,
    V: DataType,
    M: DataType,
    MF: MessagingFunction<K, V, M, ()>,
    UF: VertexUpdateFunction<K, V, M>,
{
    /// A vertex-centric iteration over edges without values, given as
    /// `(source, target)` pairs.
    pub fn with_plain_edges(
        edges: Vec<(K, K)>,
        update_function: UF,
        messaging_function: MF,
        max_supersteps: usize,
    ) -> Result<Self, ComputeError> {
        Self::with_valued_edges(
            edges.into_iter().map(|(s, t)| (s, t, ())).collect(),
            update_function,
            messaging_function,
            max_supersteps,
        )
    }
}

impl<K, V, M, E, MF, UF> VertexCentricIteration<K, V, M, E, MF, UF>
where
    K: VertexKey,
    V: DataType,
    M: DataType,
    E: DataType,
    MF: MessagingFunction<K, V, M, E>,
    UF: VertexUpdateFunction<K, V, M>,
{
    /// A vertex-centric iteration over edges with values, given as
    /// `(source, target, value)` triples.
    pub fn with_valued_edges(
        edges: Vec<(K, K, E)>,
        update_function: UF,
        messaging_function: MF,
        max_supersteps: usize,
    ) -> Result<Self, ComputeError> {
        if max_supersteps == 0 {
            return Err(ComputeError::Configuration(
                "the maximum number of supersteps must be at least one".to_owned(),
            ));
        }
        Ok(Self {
            update_function,
            messaging_function,
            edges,
            max_supersteps,
            aggregators: AggRegistry::default(),
            bc_messaging: BroadcastSets::default(),
            bc_update: BroadcastSets::default(),
            name: None,
            parallelism: None,
            unmanaged_solution_set: false,
            initial_vertices: None,
            _marker: PhantomData,
        })
    }

    /// Registers an aggregator; its merged value is readable through the
    /// same handle in the next superstep from both UDFs.
    pub fn register_aggregator<F: AggregateFn>(
        &mut self,
        id: &AggId<F>,
    ) -> Result<(), ComputeError> {
        self.aggregators.register(id)
    }

    /// Makes `data` available to the messaging function under `name`.
    pub fn add_broadcast_set_for_messaging_function<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        data: Vec<T>,
    ) -> Result<(), ComputeError> {
        Self::check_broadcast_name(name)?;
        self.bc_messaging.insert(name.to_owned(), Arc::new(data));
        Ok(())
    }

    /// Makes `data` available to the update function under `name`.
    pub fn add_broadcast_set_for_update_function<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        data: Vec<T>,
    ) -> Result<(), ComputeError> {
        Self::check_broadcast_name(name)?;
        self.bc_update.insert(name.to_owned(), Arc::new(data));
        Ok(())
    }

    fn check_broadcast_name(name: &str) -> Result<(), ComputeError> {
        if name == HASH_KEYS_BROADCAST_SET {
            return Err(ComputeError::Configuration(format!(
                "the broadcast set name '{HASH_KEYS_BROADCAST_SET}' is reserved"
            )));
        }
        Ok(())
    }

    /// Names the iteration in log output.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Sets the degree of parallelism, which is also the partition count
    /// and the size of the worker pool; `-1` resolves to the number of
    /// available CPU threads at run time.
    pub fn set_parallelism(&mut self, parallelism: isize) -> Result<(), ComputeError> {
        if parallelism <= 0 && parallelism != -1 {
            return Err(ComputeError::Configuration(
                "the degree of parallelism must be positive, or -1 (use default)".to_owned(),
            ));
        }
        self.parallelism = (parallelism > 0).then_some(parallelism as usize);
        Ok(())
    }

    /// Switches the solution set from the compact sorted store to a plain
    /// in-memory map.
    pub fn set_solution_set_unmanaged_memory(&mut self, unmanaged: bool) {
        self.unmanaged_solution_set = unmanaged;
    }

    /// Sets the initial vertex states.
    pub fn set_input(&mut self, initial_vertices: Vec<(K, V)>) {
        self.initial_vertices = Some(initial_vertices);
    }

    /// Runs the iteration to completion and returns the final vertex set.
    pub fn create_result(self) -> Result<Vec<(K, V)>, ComputeError> {
        let Self {
            update_function,
            messaging_function,
            edges,
            max_supersteps,
            aggregators: mut registry,
            bc_messaging,
            bc_update,
            name,
            parallelism,
            unmanaged_solution_set,
            initial_vertices,
            _marker,
        } = self;

        let initial_vertices = initial_vertices.ok_or_else(|| {
            ComputeError::Configuration("the input data set has not been set".to_owned())
        })?;

        // one worker thread per partition
        let channels = parallelism.unwrap_or_else(default_parallelism);
        let pool = ThreadPoolBuilder::new()
            .num_threads(channels)
            .build()
            .map_err(|err| {
                ComputeError::Configuration(format!("could not build the worker pool: {err}"))
            })?;
        let partitioner = HashPartitioner::new(channels);
        let name = name.unwrap_or_else(|| "vertex-centric iteration".to_owned());

        let index = EdgeIndex::build(edges, &partitioner);

        let mut bc_messaging = bc_messaging;
        bc_messaging.insert(
            HASH_KEYS_BROADCAST_SET.to_owned(),
            Arc::new(index.representative_rows()),
        );

        let mut vertex_parts: Vec<Vec<(K, V)>> = (0..channels).map(|_| Vec::new()).collect();
        for (key, value) in initial_vertices {
            vertex_parts[partitioner.channel(&key)].push((key, value));
        }

        // initially every vertex counts as changed
        let mut workset: Vec<Vec<(K, V)>> = vertex_parts.clone();
        let mut solution: Vec<SolutionSet<K, V>> = vertex_parts
            .into_iter()
            .map(|part| SolutionSet::build(part, unmanaged_solution_set))
            .collect();
        let total_vertices: usize = solution.iter().map(|part| part.len()).sum();

        let mut messaging_workers: Vec<MessagingWorker<MF, K>> = (0..channels)
            .map(|_| MessagingWorker::new(messaging_function.clone()))
            .collect();
        let mut update_workers: Vec<UF> =
            (0..channels).map(|_| update_function.clone()).collect();
        let mut unpackers: Vec<BroadcastUnpacker<K>> =
            (0..channels).map(|_| BroadcastUnpacker::new()).collect();

        let mut prev_aggregates: Arc<PrevAggregates> = Arc::new(PrevAggregates::default());

        info!(
            name = %name,
            parallelism = channels,
            vertices = total_vertices,
            "starting vertex-centric iteration"
        );

        let mut superstep = 1;
        while superstep <= max_supersteps {
            let work_count: usize = workset.iter().map(|part| part.len()).sum();
            if work_count == 0 {
                break;
            }

            // messaging phase: per source partition over the work set
            let phase: Vec<Result<(Outbox<K, M>, AggPartials), ComputeError>> =
                pool.install(|| {
                    messaging_workers
                        .par_iter_mut()
                        .zip(workset.par_iter())
                        .enumerate()
                        .map(|(channel, (worker, local_work))| {
                            let mut partials = registry.fresh_partials();
                            let mut ctx = SuperstepContext {
                                superstep,
                                partials: &mut partials,
                                prev: prev_aggregates.as_ref(),
                                broadcast_sets: &bc_messaging,
                            };
                            if superstep == 1 {
                                worker.init::<V, M, E>(&mut ctx)?;
                            }
                            worker.udf.pre_superstep(&mut ctx)?;

                            let mut outbox = Outbox::new(partitioner);
                            for (key, value) in local_work {
                                let edges = index.out_edges_of(channel, key);
                                let mut scope = MessageScope::new(
                                    key,
                                    edges,
                                    partitioner,
                                    &worker.hash_keys,
                                    &mut outbox,
                                    &mut ctx,
                                );
                                worker.udf.send_messages(&mut scope, key, value)?;
                            }

                            worker.udf.post_superstep(&mut ctx)?;
                            Ok((outbox, partials))
                        })
                        .collect()
                });

            let mut outboxes = Vec::with_capacity(channels);
            for result in phase {
                let (outbox, partials) = result?;
                registry.absorb(partials);
                outboxes.push(outbox);
            }

            // exchange: ship every envelope to its destination partition
            let mut inboxes: Vec<Vec<Envelope<K, M>>> =
                (0..channels).map(|_| Vec::new()).collect();
            let mut envelope_count = 0usize;
            for outbox in outboxes {
                for (channel, mut envelopes) in outbox.into_channels().into_iter().enumerate() {
                    envelope_count += envelopes.len();
                    inboxes[channel].append(&mut envelopes);
                }
            }

            // unpack + update phase: per destination partition
            let phase: Vec<Result<(Vec<(K, V)>, AggPartials), ComputeError>> =
                pool.install(|| {
                    update_workers
                        .par_iter_mut()
                        .zip(solution.par_iter_mut())
                        .zip(unpackers.par_iter_mut())
                        .zip(inboxes.into_par_iter())
                        .enumerate()
                        .map(|(channel, (((udf, solution_part), unpacker), inbox))| {
                            let mut partials = registry.fresh_partials();
                            let mut ctx = SuperstepContext {
                                superstep,
                                partials: &mut partials,
                                prev: prev_aggregates.as_ref(),
                                broadcast_sets: &bc_update,
                            };
                            if superstep == 1 {
                                unpacker.prime(index.dst_edges(channel));
                                udf.init(&mut ctx)?;
                            }
                            udf.pre_superstep(&mut ctx)?;

                            let mut pairs: Vec<(K, M)> = Vec::new();
                            for envelope in inbox {
                                if envelope.is_broadcast() {
                                    unpacker.unpack(&envelope, &mut pairs);
                                } else {
                                    unpack_with_recipients(envelope, &mut pairs);
                                }
                            }

                            // co-group with the solution set, keyed by recipient
                            pairs.sort_by(|a, b| a.0.cmp(&b.0));
                            let mut delta: Vec<(K, V)> = Vec::new();
                            let mut idx = 0;
                            while idx < pairs.len() {
                                let mut end = idx + 1;
                                while end < pairs.len() && pairs[end].0 == pairs[idx].0 {
                                    end += 1;
                                }
                                let key = pairs[idx].0.clone();
                                let messages: Vec<M> =
                                    pairs[idx..end].iter().map(|(_, m)| m.clone()).collect();
                                let value = solution_part.get(&key).cloned().ok_or_else(|| {
                                    ComputeError::MissingVertex(format!("{key:?}"))
                                })?;

                                let mut scope = UpdateScope::new(&mut ctx);
                                udf.update_vertex(
                                    &mut scope,
                                    &key,
                                    &value,
                                    MessageIterator::new(&messages),
                                )?;
                                if let Some(new_value) = scope.into_new_value() {
                                    delta.push((key, new_value));
                                }
                                idx = end;
                            }

                            udf.post_superstep(&mut ctx)?;

                            for (key, value) in &delta {
                                solution_part.replace(key, value.clone());
                            }
                            Ok((delta, partials))
                        })
                        .collect()
                });

            let mut new_workset = Vec::with_capacity(channels);
            for result in phase {
                let (delta, partials) = result?;
                registry.absorb(partials);
                new_workset.push(delta);
            }

            let changed: usize = new_workset.iter().map(|part| part.len()).sum();
            prev_aggregates = Arc::new(registry.roll());
            debug!(
                superstep,
                changed,
                envelopes = envelope_count,
                "superstep complete"
            );

            workset = new_workset;
            superstep += 1;
        }

        info!(name = %name, supersteps = superstep - 1, "vertex-centric iteration finished");

        let mut result = Vec::with_capacity(total_vertices);
        for part in solution {
            result.extend(part.into_vec());
        }
        Ok(result)
    }
}

/// The partition count used when the parallelism is left at `-1`.
fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
