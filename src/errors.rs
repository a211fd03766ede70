use std::io;

use thiserror::Error;

/// Result type alias for slotwise operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing commands to a cluster.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The peer sent something the wire protocol does not allow.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server replied with an error value.
    #[error("server error: {message}")]
    Server {
        /// Error message from the server.
        message: String,
    },

    /// The redirection budget for a single call was exhausted.
    ///
    /// Every MOVED and ASK reply counts against the budget; a chain longer
    /// than `max_redirection` means the cluster view is too unstable to
    /// follow.
    #[error("too many redirections ({redirections})")]
    Redirection {
        /// Number of redirections observed before giving up.
        redirections: u32,
    },

    /// The connection-error budget for a single call was exhausted.
    #[error("connection error budget exhausted: {source}")]
    Connection {
        /// The last underlying failure.
        source: Box<Error>,
    },

    /// A command or batch cannot be assigned to exactly one slot.
    #[error("routing error: {message}")]
    Routing {
        /// Why the batch is unroutable.
        message: String,
    },

    /// The client was configured with invalid options.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid option.
        message: String,
    },

    /// The server behaved in a way the protocol rules out entirely.
    ///
    /// A redirect in reply to a keyless topology probe is the canonical
    /// case. This is fatal and never retried.
    #[error("protocol assertion failed: {message}")]
    Assertion {
        /// What impossible behavior was observed.
        message: String,
    },
}
