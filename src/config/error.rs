use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("required config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: DocumentError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("failed to deserialize config: {0}")]
    DeserializeError(DocumentError),

    #[error("template file '{0}' requires a variables file")]
    TemplateWithoutVariables(PathBuf),

    #[error("template error in '{key}': {source}")]
    Template { key: String, source: TemplateError },

    #[error("cannot resolve variables: {}", .keys.join(", "))]
    UnresolvedVariables { keys: Vec<String> },
}

/// Failures of the document parser/serializer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("cannot express value as TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("document root must be a mapping")]
    NotAMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("map has no entry for key \"{0}\"")]
    MissingKey(String),

    #[error("error calling {function}: {message}")]
    Call { function: String, message: String },

    #[error("{0}")]
    Exec(String),
}

impl TemplateError {
    /// True when execution failed only because a referenced variable is absent.
    pub fn is_missing_key(&self) -> bool {
        matches!(self, TemplateError::MissingKey(_))
    }
}

/// Failure reported by an [`Encryptor`](super::Encryptor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EncryptError {
    message: String,
}

impl EncryptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
