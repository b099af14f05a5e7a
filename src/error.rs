use thiserror::Error;

/// Errors raised while walking a flow.
///
/// Only [`EngineError::Reply`] escapes the walker; the others are logged at the
/// point where they occur and the walk degrades around them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("edge `{edge_id}` references missing node `{node_id}`")]
    NodeReference { edge_id: String, node_id: String },

    #[error("node `{0}` was already visited in this invocation")]
    CycleDetected(String),

    #[error("classifier failed: {0}")]
    Classifier(#[source] AiError),

    #[error("ai responder failed: {0}")]
    Ai(#[source] AiError),

    #[error("could not read suspension state: {0}")]
    CacheRead(#[source] StoreError),

    #[error("could not write suspension state: {0}")]
    CacheWrite(#[source] StoreError),

    #[error("reply failed: {0}")]
    Reply(#[from] ReplyError),
}

/// Failures of a [`crate::session::SuspensionStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("could not (de)serialize execution state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures of the AI collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AiError {
    #[error("no AI provider configured")]
    NotConfigured,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("empty response from provider")]
    EmptyResponse,
}

/// Failure to deliver an outbound message.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not deliver reply: {0}")]
pub struct ReplyError(pub String);

/// Loading and saving flow definitions.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("unsupported extension `{0}` (expected .json, .yaml or .yml)")]
    UnsupportedExtension(String),

    #[error("invalid node `{node_id}`: {reason}")]
    InvalidNode { node_id: String, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::NodeReference {
            edge_id: "e1".into(),
            node_id: "n9".into(),
        };
        assert_eq!(err.to_string(), "edge `e1` references missing node `n9`");

        let err = EngineError::from(ReplyError("socket closed".into()));
        assert_eq!(err.to_string(), "reply failed: could not deliver reply: socket closed");
    }

    #[test]
    fn test_flow_error_extension() {
        let err = FlowError::UnsupportedExtension("toml".into());
        assert!(err.to_string().contains("`toml`"));
    }
}
