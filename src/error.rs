// Error taxonomy shared by the installers and the orchestrating commands

use thiserror::Error;

/// Errors callers need to tell apart. Everything else travels as a plain
/// `anyhow::Error` and is reported untouched.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Unsupported platform/flavor/GUI combination or malformed input
    #[error("{0}")]
    Config(String),

    /// The chosen strategy does not apply here; the selector may fall back
    #[error("{0}")]
    Unavailable(String),

    #[error("Target release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Target asset not found: /{patterns}/ in {assets:?}")]
    AssetNotFound {
        patterns: String,
        assets: Vec<String>,
    },

    /// Install was asked for a version that resolution never produced
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Vim executable could not found")]
    ExecutableNotFound,
}

impl SetupError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// True when `err` is the recoverable "strategy does not apply" signal
    pub fn is_unavailable(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<SetupError>(), Some(SetupError::Unavailable(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_detected_through_anyhow() {
        let err: anyhow::Error = SetupError::unavailable("no download").into();
        assert!(SetupError::is_unavailable(&err));

        let err: anyhow::Error = SetupError::config("bad").into();
        assert!(!SetupError::is_unavailable(&err));

        let err = anyhow::anyhow!("network down");
        assert!(!SetupError::is_unavailable(&err));
    }

    #[test]
    fn test_asset_not_found_message_lists_assets() {
        let err = SetupError::AssetNotFound {
            patterns: "\\.AppImage$".to_string(),
            assets: vec!["vim.zip".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Target asset not found: /\\.AppImage$/ in [\"vim.zip\"]"
        );
    }
}
