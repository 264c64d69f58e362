use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed: {message}")]
    Api {
        operation: String,
        message: String,
        transient: bool,
    },

    #[error("isolation policy for {namespace} could not be applied: {message}")]
    PolicyApply { namespace: String, message: String },

    #[error("rollout of {deployment} in {namespace} not ready after {waited_secs}s ({last_status})")]
    RolloutTimeout {
        namespace: String,
        deployment: String,
        waited_secs: u64,
        last_status: String,
    },

    #[error("unexpected cluster response: {0}")]
    Decode(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// Worth retrying: the API server was unreachable or overloaded.
    pub fn is_transient(&self) -> bool {
        match self {
            ClusterError::Api { transient, .. } => *transient,
            ClusterError::Unavailable(_) => true,
            _ => false,
        }
    }

    pub(crate) fn api(operation: impl Into<String>, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        ClusterError::Api {
            operation: operation.into(),
            transient: looks_transient(&message),
            message,
        }
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "i/o timeout",
    "tls handshake timeout",
    "the server is currently unable to handle the request",
    "serviceunavailable",
    "too many requests",
    "etcdserver: request timed out",
    "unexpected eof",
];

fn looks_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}
