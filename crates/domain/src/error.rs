/// Shared error type used across all Callsign crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// A reference token the reasoner produced is not in the session's
    /// registry. Recoverable: surfaced to the caller as "not in the
    /// current context", never silently substituted.
    #[error("unknown reference: {ref_token}")]
    UnknownRef { ref_token: String },

    /// A mint collided with an existing mapping. Registries never remint,
    /// so this signals a caller bug rather than bad user input.
    #[error("duplicate reference: {ref_token} already bound to {internal_id}")]
    DuplicateRef {
        ref_token: String,
        internal_id: String,
    },

    /// The summarization collaborator could not be reached or answered
    /// with garbage. History compression skips the cycle and retries on
    /// a later turn.
    #[error("summarizer unavailable: {0}")]
    SummarizerUnavailable(String),

    /// A turn was submitted for a session that already has a pending or
    /// running job. Rejected at admission, never queued.
    #[error("session {session_id} already has an active job")]
    SessionBusy { session_id: String },

    #[error("collaborator {endpoint}: {message}")]
    Collaborator { endpoint: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for faults worth retrying at a transport layer (the REST
    /// collaborator client uses this to decide back-off vs. bail).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_) | Error::Io(_))
    }
}
