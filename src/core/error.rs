use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The host connection table could not be read.
    #[error("failed to enumerate connections: {0}")]
    Enumeration(String),

    #[error("process {0} not found")]
    ProcessNotFound(u32),

    #[error("failed to terminate process {0}")]
    TerminateFailed(u32),

    #[error("lookup for {target} failed: {reason}")]
    Lookup { target: String, reason: String },

    /// Address the resolver refuses to query (unspecified, link-local).
    #[error("{0} is not resolvable")]
    Unresolvable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
