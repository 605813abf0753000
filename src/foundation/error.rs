/// Convenience result type used across the crate.
pub type Dri2Result<T> = Result<T, Dri2Error>;

/// Top-level error taxonomy used by buffer management APIs.
///
/// None of these are fatal to the host: callers log them and degrade (drop a frame, fall back to
/// blitting) rather than abort.
#[derive(thiserror::Error, Debug)]
pub enum Dri2Error {
    /// The buffer-object backend could not satisfy a request.
    #[error("backend error: {0}")]
    Backend(String),

    /// The rendering client or host violated the buffer exchange protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid or unparsable driver options.
    #[error("configuration error: {0}")]
    Config(String),

    /// Hook chains were installed or removed out of order.
    #[error("hook error: {0}")]
    Hook(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Dri2Error {
    /// Build a [`Dri2Error::Backend`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Build a [`Dri2Error::Protocol`] value.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Build a [`Dri2Error::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`Dri2Error::Hook`] value.
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
