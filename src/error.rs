use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Fatal errors. Resolution failures, rule panics and malformed files are
/// not errors: they degrade into `Resolution::Unknown`, `RuleError` and
/// `ModelError` values carried by the scan report.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: could not rewrite the severity code [{token}] for '{rule}'")]
    UnknownSeverity { rule: String, token: String },

    #[error("Rule registration failed: short code '{short_code}' is already registered")]
    DuplicateRule { short_code: String },

    #[error("Rule registration failed ({short_code}): {message}")]
    InvalidRule { short_code: String, message: String },

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ScanError {
    pub fn exit_code(&self) -> i32 {
        2
    }

    /// Configuration errors abort the run before any file is scanned.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownSeverity { .. }
                | Self::DuplicateRule { .. }
                | Self::InvalidRule { .. }
                | Self::Yaml(_)
                | Self::Toml(_)
        )
    }
}
