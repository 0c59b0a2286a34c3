use std::fmt::Display;

pub use crate::model::ErrorData;
use crate::handler::server::tool::RegistryError;

impl Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.0, self.message)?;
        if let Some(data) = &self.data {
            write!(f, "({})", data)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorData {}

/// Everything that can stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum EcuroMcpError {
    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCode, ErrorData};

    #[test]
    fn test_error_data_display_without_data() {
        let error = ErrorData {
            code: ErrorCode(-32600),
            message: "Invalid Request".into(),
            data: None,
        };
        assert_eq!(format!("{}", error), "-32600: Invalid Request");
    }

    #[test]
    fn test_error_data_display_with_data() {
        let error = ErrorData {
            code: ErrorCode(-32602),
            message: "tool not found".into(),
            data: Some(serde_json::json!({"tool": "missing"})),
        };
        assert_eq!(
            format!("{}", error),
            "-32602: tool not found({\"tool\":\"missing\"})"
        );
    }

    #[test]
    fn test_registry_error_display() {
        let error = EcuroMcpError::from(RegistryError::DuplicateTool("ecuro_ping".into()));
        assert_eq!(
            error.to_string(),
            "Tool registry error: duplicate tool name: ecuro_ping"
        );
    }

    #[test]
    fn test_error_data_is_std_error() {
        let error = ErrorData::session_required();
        let _: &dyn std::error::Error = &error;
    }
}
