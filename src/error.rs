use thiserror::Error;

/// Errors surfaced by the library.
///
/// Transport and encoding failures pass through unmodified; the rest are
/// protocol-level conditions raised at well-defined boundaries.
#[derive(Debug, Error)]
pub enum Error {
    /// `add_component` was called twice with the same key. Fatal to the add;
    /// the registry is left unchanged.
    #[error("duplicate component key: {0}")]
    DuplicateKey(String),

    /// An inbound command payload had no `;` delimiter (or a non-UTF-8 key).
    /// Raised from command parsing and caught at the dispatch boundary.
    #[error("malformed command payload (expected \"key;payload\")")]
    MalformedCommand,

    /// A component tried to publish before an MQTT client was bound to it.
    #[error("component has no MQTT client bound")]
    NoClient,

    /// Payload encoding failed.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    /// The MQTT collaborator rejected an operation.
    #[error("transport: {0}")]
    Transport(String),

    /// A periodic task died without returning an error of its own.
    #[error("task failed: {0}")]
    Task(String),
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
