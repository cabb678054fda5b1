//! Debug language tags and parsing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Language of the program being debugged.
///
/// Each language maps to one debug adapter backend. `Mock` has no builtin
/// backend; it resolves only when a factory is registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLanguage {
    Python,
    Go,
    Rust,
    JavaScript,
    Mock,
}

impl DebugLanguage {
    /// Lowercase tag used in APIs and config
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::Mock => "mock",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Go => "Go",
            Self::Rust => "Rust",
            Self::JavaScript => "JavaScript",
            Self::Mock => "Mock",
        }
    }

    /// Languages with a builtin adapter.
    pub const SUPPORTED: &'static [DebugLanguage] =
        &[Self::Python, Self::Go, Self::Rust, Self::JavaScript];

    /// Every recognized tag, including test-only ones.
    pub const ALL: &'static [DebugLanguage] = &[
        Self::Python,
        Self::Go,
        Self::Rust,
        Self::JavaScript,
        Self::Mock,
    ];

    pub fn supported_list() -> String {
        Self::SUPPORTED
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Error message for a missing or unrecognized language tag.
    pub fn language_error(lang: &str) -> String {
        if lang.is_empty() {
            format!("language is required. Supported: {}", Self::supported_list())
        } else {
            format!(
                "Unsupported language '{}'. Supported: {}",
                lang,
                Self::supported_list()
            )
        }
    }

    /// Guess the language from a source file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" => Some(Self::Python),
            "go" => Some(Self::Go),
            "rs" => Some(Self::Rust),
            "js" | "mjs" | "cjs" | "ts" => Some(Self::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for DebugLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DebugLanguage {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "go" | "golang" => Ok(Self::Go),
            "rust" | "rs" => Ok(Self::Rust),
            "javascript" | "js" | "node" => Ok(Self::JavaScript),
            "mock" => Ok(Self::Mock),
            _ => Err(ParseLanguageError::new(s)),
        }
    }
}

/// Error for unrecognized language tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLanguageError {
    pub invalid_value: String,
    pub context: Option<String>,
}

impl ParseLanguageError {
    pub fn new(invalid_value: impl Into<String>) -> Self {
        Self {
            invalid_value: invalid_value.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ParseLanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(
                f,
                "{} ({})",
                DebugLanguage::language_error(&self.invalid_value),
                ctx
            ),
            None => write!(f, "{}", DebugLanguage::language_error(&self.invalid_value)),
        }
    }
}

impl std::error::Error for ParseLanguageError {}
