use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// One of the two chat participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Identity {
    Leo,
    Janice,
}

impl Identity {
    pub const ALL: [Identity; 2] = [Identity::Leo, Identity::Janice];

    pub fn as_str(self) -> &'static str {
        match self {
            Identity::Leo => "Leo",
            Identity::Janice => "Janice",
        }
    }

    /// The other participant.
    pub fn counterpart(self) -> Identity {
        match self {
            Identity::Leo => Identity::Janice,
            Identity::Janice => Identity::Leo,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact match, used for persisted `user_name` values and presence keys.
impl FromStr for Identity {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Identity::ALL
            .into_iter()
            .find(|identity| identity.as_str() == value)
            .ok_or_else(|| ChatError::InvalidIdentity(value.to_string()))
    }
}

/// Login gate: capitalizes the first character, lowercases the rest and
/// accepts only the two known names.
pub fn normalize(input: &str) -> Result<Identity, ChatError> {
    let mut chars = input.chars();
    let formatted: String = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    };

    formatted
        .parse()
        .map_err(|_| ChatError::InvalidIdentity(input.to_string()))
}
