//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Kadnode crate error enum.
pub enum Error {
    /// Bytes that were expected to be an [Id](crate::Id) had the wrong length.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// A string that was expected to be a hex encoded [Id](crate::Id) is not.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// The local store refused a write.
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Why an outbound call failed.
pub enum CallError {
    /// The remote node did not answer before the transport's request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The transport could not deliver the request at all.
    #[error("Node is unreachable")]
    Unreachable,

    /// The transport dropped the call before resolving it.
    #[error("Transport was dropped before the call resolved")]
    Disconnected,

    /// The remote node answered, but its handler failed.
    #[error("Remote error: {0}")]
    Remote(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(CallError::Timeout.to_string(), "Request timed out");
        assert_eq!(
            CallError::Remote(Error::InvalidIdSize(2).to_string()).to_string(),
            "Remote error: Invalid Id size, expected 20, got 2"
        );
    }
}
