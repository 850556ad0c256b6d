//! Interface engine error types.

use thiserror::Error;

/// Errors raised by the interface engine.
///
/// Every error is terminal for the single operation that raised it: the
/// connection model and any specification under construction are left as
/// they were before the call.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No capability is registered under this name.
    #[error("unknown interface: {0}")]
    UnknownCapability(String),

    /// A capability with this name is already registered.
    #[error("interface already registered: {0}")]
    DuplicateCapability(String),

    /// A plug or slot declaration failed sanitization.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// The base declaration or a capability override denied the connection.
    #[error("connection denied: {0}")]
    PolicyDenied(String),

    /// The connection would exceed a connection-count limit or bind a
    /// declaration to its own package where that is forbidden.
    #[error("connection conflict: {0}")]
    StructuralConflict(String),

    /// A specification was queried for a tag that received no snippets.
    #[error("no snippets for security tag {0}")]
    NoSuchTag(String),

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("package already present: {0}")]
    DuplicatePackage(String),

    #[error("package {package} has no plug named {plug}")]
    UnknownPlug { package: String, plug: String },

    #[error("package {package} has no slot named {slot}")]
    UnknownSlot { package: String, slot: String },

    /// A connect request left the slot name out and more than one slot of
    /// the package matches.
    #[error("ambiguous slot for {0}")]
    AmbiguousSlot(String),

    /// Disconnect was requested for a pair that is not connected.
    #[error("{0} is not connected")]
    NotConnected(String),

    /// A package cannot be removed while any of its plugs or slots is
    /// connected.
    #[error("package {0} still has connections")]
    StillConnected(String),

    /// The base declaration text is unparseable or violates monotonicity.
    #[error("invalid base declaration: {0}")]
    BaseDeclaration(String),

    /// Failed to parse TOML input.
    #[error("failed to parse: {0}")]
    Parse(String),

    /// An I/O error occurred while reading a base declaration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
