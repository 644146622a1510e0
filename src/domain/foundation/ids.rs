//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Declares a UUID-backed identifier with the usual constructors and
/// `Display`/`FromStr` impls.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Server-generated identifier for one live client transport.
    ConnectionId
);
uuid_id!(
    /// Unique identifier for a board (plate).
    BoardId
);
uuid_id!(
    /// Unique identifier for a column (header) within a board.
    ColumnId
);
uuid_id!(
    /// Unique identifier for an item (card).
    ItemId
);
uuid_id!(
    /// Unique identifier for a team.
    TeamId
);
uuid_id!(
    /// Unique identifier for a linked chat or mail account.
    AccountId
);

/// User identifier (the `sub` claim of the verified credential).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new UserId, returning error if empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("user_id"));
        }
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_id_roundtrips_through_string() {
        let id = BoardId::new();
        let parsed: BoardId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_ids_are_not_equal() {
        assert_ne!(ItemId::new(), ItemId::new());
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = ColumnId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn user_id_rejects_blank() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert_eq!(UserId::new("user-1").unwrap().as_str(), "user-1");
    }
}
