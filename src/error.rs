use thiserror::Error;

/// Error types for network construction and the solve pipeline
#[derive(Debug, Error)]
pub enum McnfError {
    /// A commodity's destination is unreachable under the current arc costs
    #[error("commodity {commodity} cannot reach its destination under the current arc costs")]
    InfeasibleCommodity { commodity: usize },

    /// The quadratic subproblem was rejected by the underlying conic solver
    #[error("quadratic subproblem failed: {reason}")]
    QpInfeasible { reason: String },

    /// Arc endpoints do not name an arc of the network
    #[error("no arc from vertex {head} to vertex {tail}")]
    UnknownArc { head: usize, tail: usize },

    /// Structurally invalid network input
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// Unrecognized configuration key
    #[error("unknown setting `{0}`")]
    UnknownSetting(String),

    /// Configuration value failed to parse
    #[error("invalid value `{value}` for setting `{key}`")]
    InvalidSetting { key: String, value: String },
}

/// Result type alias for solver operations
pub type Result<T> = std::result::Result<T, McnfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McnfError::InfeasibleCommodity { commodity: 3 };
        assert_eq!(
            err.to_string(),
            "commodity 3 cannot reach its destination under the current arc costs"
        );

        let err = McnfError::UnknownArc { head: 0, tail: 7 };
        assert_eq!(err.to_string(), "no arc from vertex 0 to vertex 7");

        let err = McnfError::InvalidSetting {
            key: "initial beta".to_string(),
            value: "fast".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value `fast` for setting `initial beta`"
        );
    }
}
