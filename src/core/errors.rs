use thiserror::Error;

/// Everything that can go wrong while building or running a vertex-centric
/// iteration. No variant is recovered from internally; the first error
/// aborts the job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    /// Builder-time validation failure. The job is never started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A message was sent to a vertex id that is not in the solution set.
    #[error("target vertex '{0}' does not exist")]
    MissingVertex(String),

    /// `outgoing_edges()` and `send_message_to_all_neighbours()` are
    /// mutually exclusive and single-use within one `send_messages` call.
    #[error(
        "can use either 'outgoing_edges()' or 'send_message_to_all_neighbours()' exactly once"
    )]
    EdgesExhausted,

    /// An aggregator was used without being registered on the iteration.
    #[error("aggregator '{0}' is not registered")]
    UnknownAggregator(String),

    /// Failure raised by user code inside a UDF.
    #[error("{0}")]
    User(String),
}

impl ComputeError {
    /// Wraps a user-supplied failure message; UDFs return this to abort the
    /// superstep and fail the job.
    pub fn custom(msg: impl Into<String>) -> Self {
        ComputeError::User(msg.into())
    }
}
