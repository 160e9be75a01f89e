//! Name validation for attributes, skills and paragon stats.
//!
//! Callers hand the engine free-form identifiers; they end up embedded in sled
//! keys (`skills:<character>:<skill>`) and cache keys, so they are normalized to
//! a small lowercase alphabet before anything is stored.

/// Longest accepted identifier, in bytes.
pub const MAX_NAME_LEN: usize = 48;

/// Name validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },

    #[error("{kind} name is too long (maximum {max} characters)")]
    TooLong { kind: &'static str, max: usize },

    #[error("{kind} name contains invalid characters: {chars}")]
    InvalidCharacters { kind: &'static str, chars: String },
}

/// What an identifier names; only used to word error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Attribute,
    Skill,
    Stat,
}

impl NameKind {
    fn label(self) -> &'static str {
        match self {
            NameKind::Attribute => "attribute",
            NameKind::Skill => "skill",
            NameKind::Stat => "stat",
        }
    }
}

fn allowed(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-' | '.')
}

/// Trim and lowercase `raw`, then check it against the identifier alphabet.
///
/// Returns the normalized name on success.
pub fn normalize_name(raw: &str, kind: NameKind) -> Result<String, NameError> {
    let label = kind.label();
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(NameError::Empty { kind: label });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong {
            kind: label,
            max: MAX_NAME_LEN,
        });
    }
    let mut bad: Vec<char> = name.chars().filter(|c| !allowed(*c)).collect();
    if !bad.is_empty() {
        bad.dedup();
        return Err(NameError::InvalidCharacters {
            kind: label,
            chars: bad.into_iter().collect(),
        });
    }
    Ok(name)
}
