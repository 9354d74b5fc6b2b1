use std::{error::Error, fmt, io};

use crate::buffer::BufferErr;

/// The result type used across the engine.
pub type Result<T> = std::result::Result<T, EngineErr>;

/// Engine, hook and writer failures.
#[derive(Debug)]
pub enum EngineErr {
    /// A registry was asked for a name nobody registered.
    UnknownType {
        registry: &'static str,
        name: String,
    },
    /// A factory was registered twice under the same name.
    DuplicateRegistration {
        registry: &'static str,
        name: String,
    },
    /// A config record isn't an object with a string `type` field.
    InvalidSpec(String),
    /// A config record's parameters don't match the constructor's.
    InvalidParams {
        kind: String,
        source: serde_json::Error,
    },
    DuplicateHook(String),
    HookNotFound(String),
    InvalidConfig(String),
    UnsupportedLogType(String),
    MissingDataLoader(String),
    /// A writer needs a dashboard backend that isn't available in this build.
    BackendUnavailable {
        name: String,
        available: Vec<String>,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Buffer(BufferErr),
    Model(String),
    /// The run was cancelled between two steps.
    Cancelled {
        iter: usize,
    },
    /// A replica task panicked or was cancelled.
    Replica {
        rank: usize,
        reason: String,
    },
    Json(serde_json::Error),
    Io(io::Error),
}

impl fmt::Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType { registry, name } => {
                write!(f, "unknown {registry} type: '{name}'")
            }
            Self::DuplicateRegistration { registry, name } => {
                write!(f, "{registry} type '{name}' is already registered")
            }
            Self::InvalidSpec(msg) => write!(f, "invalid config record: {msg}"),
            Self::InvalidParams { kind, source } => {
                write!(f, "invalid parameters for '{kind}': {source}")
            }
            Self::DuplicateHook(name) => write!(f, "hook '{name}' exists"),
            Self::HookNotFound(name) => write!(f, "hook '{name}' not found"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::UnsupportedLogType(token) => write!(f, "unsupported log type: {token}"),
            Self::MissingDataLoader(name) => write!(f, "data loader '{name}' not found"),
            Self::BackendUnavailable { name, available } => write!(
                f,
                "dashboard backend '{name}' is not available, use one of [{}] or register it \
                 in the backend registry before opening the writer",
                available.join(", ")
            ),
            Self::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} size mismatch: got {got}, expected {expected}"),
            Self::Buffer(e) => write!(f, "buffer error: {e}"),
            Self::Model(msg) => write!(f, "model error: {msg}"),
            Self::Cancelled { iter } => write!(f, "run cancelled at iteration {iter}"),
            Self::Replica { rank, reason } => write!(f, "replica {rank} failed: {reason}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidParams { source, .. } => Some(source),
            Self::Buffer(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EngineErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<BufferErr> for EngineErr {
    fn from(value: BufferErr) -> Self {
        Self::Buffer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_log_type_names_the_token() {
        let err = EngineErr::UnsupportedLogType("unknowntype".into());
        assert_eq!(err.to_string(), "unsupported log type: unknowntype");
    }

    #[test]
    fn backend_unavailable_is_actionable() {
        let err = EngineErr::BackendUnavailable {
            name: "tensorboard".into(),
            available: vec!["event_file".into()],
        };

        let msg = err.to_string();
        assert!(msg.contains("tensorboard"));
        assert!(msg.contains("event_file"));
    }

    #[test]
    fn buffer_errors_keep_their_source() {
        let err = EngineErr::from(BufferErr::KeyNotFound("loss".into()));
        assert!(err.source().is_some());
    }
}
