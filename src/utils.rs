use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the command generator
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Grammar '{0}' has no $Main rule")]
    MissingRoot(String),

    #[error("Failed to load {dataset} dataset: {reason}")]
    DatasetLoad { dataset: String, reason: String },

    #[error("Invalid difficulty code: {0:?}")]
    InvalidDifficulty(String),

    #[error("Cyclic grammar: {}", .0.join(" -> "))]
    CyclicGrammar(Vec<String>),

    #[error("Recursion limit of {limit} exceeded while expanding {rule}")]
    RecursionLimit { rule: String, limit: usize },

    #[error("No candidates for wildcard {0}")]
    NoCandidates(String),

    #[error("No grammar available for tier {0}")]
    NoGrammarForTier(String),

    #[error("Unterminated wildcard at offset {offset} in {template:?}")]
    UnterminatedWildcard { template: String, offset: usize },

    #[error("Rule {0} uses an id reserved for generated rules")]
    ReservedRuleId(String),

    #[error("Grammar name {0:?} cannot be used as a file name")]
    InvalidGrammarName(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML dataset error: {0}")]
    XmlDe(#[from] quick_xml::de::DeError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Location validation failed: {}", .0.join(", "))]
    LocationValidation(Vec<String>),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for generator operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Trait extension for Option<T> to convert to GrammarError
pub trait OptionExt<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| GrammarError::Parse(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = GrammarError::CyclicGrammar(vec![
            "$A".to_string(),
            "$B".to_string(),
            "$A".to_string(),
        ]);
        assert_eq!(err.to_string(), "Cyclic grammar: $A -> $B -> $A");
    }

    #[test]
    fn test_option_ext() {
        let missing: Option<u8> = None;
        let err = missing.ok_or_grammar_err(|| "nothing here".to_string());
        assert!(matches!(err, Err(GrammarError::Parse(msg)) if msg == "nothing here"));

        assert_eq!(Some(3).ok_or_grammar_err(|| String::new()).unwrap(), 3);
    }
}
