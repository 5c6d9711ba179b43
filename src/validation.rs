//! Input validation for account names and user-chosen labels (habit and pet names).

use std::collections::HashSet;

use crate::ledger::errors::LedgerError;

/// Name validation errors with helpful messages
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name is too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("Name is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Name cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Name contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },

    #[error("Name is a reserved system name")]
    Reserved,
}

impl From<NameError> for LedgerError {
    fn from(err: NameError) -> Self {
        LedgerError::Invalid(err.to_string())
    }
}

/// Validation rules for one kind of name
#[derive(Debug, Clone)]
pub struct NameRules {
    pub min_length: usize,
    pub max_length: usize,
    /// Leading/trailing whitespace is trimmed instead of rejected
    pub trim: bool,
    pub check_reserved: bool,
}

impl NameRules {
    /// Account names: 2-30 characters, exact (no surrounding whitespace), not reserved.
    pub fn username() -> Self {
        NameRules {
            min_length: 2,
            max_length: 30,
            trim: false,
            check_reserved: true,
        }
    }

    /// Habit and pet names: 1-40 characters after trimming.
    pub fn label() -> Self {
        NameRules {
            min_length: 1,
            max_length: 40,
            trim: true,
            check_reserved: false,
        }
    }
}

fn reserved_names() -> HashSet<&'static str> {
    [
        "admin", "administrator", "root", "system", "sysop", "operator", "moderator",
        "guest", "anonymous", "null", "undefined", "shop", "store", "support",
    ]
    .iter()
    .copied()
    .collect()
}

/// Validate `name` against `rules`, returning the accepted (possibly trimmed) form.
/// Lengths count characters, not bytes.
pub fn validate_name(name: &str, rules: &NameRules) -> Result<String, NameError> {
    let trimmed = name.trim();
    if !rules.trim && trimmed != name {
        return Err(NameError::InvalidWhitespace);
    }

    let length = trimmed.chars().count();
    if length < rules.min_length {
        return Err(NameError::TooShort {
            min: rules.min_length,
        });
    }
    if length > rules.max_length {
        return Err(NameError::TooLong {
            max: rules.max_length,
        });
    }

    let control: Vec<String> = trimmed
        .chars()
        .filter(|c| c.is_control())
        .map(|c| format!("\\u{{{:04x}}}", c as u32))
        .collect();
    if !control.is_empty() {
        return Err(NameError::InvalidCharacters {
            chars: control.join(", "),
        });
    }

    if rules.check_reserved && reserved_names().contains(trimmed.to_lowercase().as_str()) {
        return Err(NameError::Reserved);
    }

    Ok(trimmed.to_string())
}

pub fn validate_username(name: &str) -> Result<String, NameError> {
    validate_name(name, &NameRules::username())
}

pub fn validate_label(name: &str) -> Result<String, NameError> {
    validate_name(name, &NameRules::label())
}

/// Normalise an optional free-text description: control characters other than newline
/// and tab are dropped, blank input becomes `None`.
pub fn sanitize_description(description: Option<&str>, max_chars: usize) -> Result<Option<String>, NameError> {
    let Some(text) = description else {
        return Ok(None);
    };
    let cleaned: String = text
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > max_chars {
        return Err(NameError::TooLong { max: max_chars });
    }
    Ok(Some(cleaned.to_string()))
}
