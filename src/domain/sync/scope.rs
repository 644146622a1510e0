//! Routing keys: which entity a connection is listening to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, BoardId, TeamId, UserId};

/// External streaming provider an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Chat,
    Mail,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Chat => "chat",
            Provider::Mail => "mail",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind component of a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Team,
    Board,
    Account(Provider),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => f.write_str("user"),
            EntityKind::Team => f.write_str("team"),
            EntityKind::Board => f.write_str("board"),
            EntityKind::Account(provider) => write!(f, "{}", provider),
        }
    }
}

/// Routing key `(kind, id)` used to find interested connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    User(UserId),
    Team(TeamId),
    Board(BoardId),
    Account(Provider, AccountId),
}

impl Scope {
    pub fn kind(&self) -> EntityKind {
        match self {
            Scope::User(_) => EntityKind::User,
            Scope::Team(_) => EntityKind::Team,
            Scope::Board(_) => EntityKind::Board,
            Scope::Account(provider, _) => EntityKind::Account(*provider),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User(id) => write!(f, "user:{}", id),
            Scope::Team(id) => write!(f, "team:{}", id),
            Scope::Board(id) => write!(f, "board:{}", id),
            Scope::Account(provider, id) => write!(f, "{}:{}", provider, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_includes_kind() {
        let board = BoardId::new();
        assert_eq!(Scope::Board(board).to_string(), format!("board:{}", board));

        let account = AccountId::new();
        assert_eq!(
            Scope::Account(Provider::Mail, account).to_string(),
            format!("mail:{}", account)
        );
    }

    #[test]
    fn account_scope_kind_carries_provider() {
        let scope = Scope::Account(Provider::Chat, AccountId::new());
        assert_eq!(scope.kind(), EntityKind::Account(Provider::Chat));
        assert_eq!(scope.kind().to_string(), "chat");
    }
}
