//! WebSocket message types for the sync protocol.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}`.
//! - Client → Server: handshake, `listen for ...` subscriptions, provider
//!   sends, and item/column commands
//! - Server → Client: entity mutations ([`SyncEvent`]) and per-connection
//!   notices ([`ConnectionNotice`])

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, BoardId, ColumnId, ConnectionId, ItemId, TeamId, UserId};
use crate::domain::sync::{Provider, SyncEvent};
use crate::ports::ProviderEvent;

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Handshake: must be the first frame on a connection.
    #[serde(rename = "authenticate")]
    Authenticate { token: String },

    /// Heartbeat request.
    #[serde(rename = "ping")]
    Ping {},

    #[serde(rename = "listen for user events")]
    ListenForUserEvents {},

    #[serde(rename = "listen for team events", rename_all = "camelCase")]
    ListenForTeamEvents { team_id: TeamId },

    #[serde(rename = "listen for board events", rename_all = "camelCase")]
    ListenForBoardEvents { board_id: BoardId },

    #[serde(rename = "stop listening for board events", rename_all = "camelCase")]
    StopListeningForBoardEvents { board_id: BoardId },

    #[serde(rename = "listen for chat events", rename_all = "camelCase")]
    ListenForChatEvents { account_id: AccountId },

    #[serde(rename = "listen for mail events", rename_all = "camelCase")]
    ListenForMailEvents { account_id: AccountId },

    #[serde(rename = "chat send message", rename_all = "camelCase")]
    ChatSendMessage {
        account_id: AccountId,
        channel_or_thread_id: String,
        message: String,
    },

    #[serde(rename = "mail send message", rename_all = "camelCase")]
    MailSendMessage {
        account_id: AccountId,
        channel_or_thread_id: String,
        message: String,
    },

    #[serde(rename = "add item", rename_all = "camelCase")]
    AddItem {
        board_id: BoardId,
        column_id: ColumnId,
        pos: usize,
        title: String,
    },

    #[serde(rename = "edit item", rename_all = "camelCase")]
    EditItem { item_id: ItemId, title: String },

    #[serde(rename = "move item", rename_all = "camelCase")]
    MoveItem {
        item_id: ItemId,
        to_board_id: BoardId,
        to_column_id: ColumnId,
        to_pos: usize,
    },

    #[serde(rename = "remove item", rename_all = "camelCase")]
    RemoveItem { item_id: ItemId },

    #[serde(rename = "reopen item", rename_all = "camelCase")]
    ReopenItem { item_id: ItemId },

    #[serde(rename = "add column", rename_all = "camelCase")]
    AddColumn { board_id: BoardId, name: String },

    #[serde(rename = "remove column", rename_all = "camelCase")]
    RemoveColumn { board_id: BoardId, column_id: ColumnId },
}

impl ClientMessage {
    /// Parses a text frame. A missing `data` member is read as `{}` so
    /// payload-less events may omit it.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(object) = value.as_object_mut() {
            object
                .entry("data")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
        }
        serde_json::from_value(value)
    }

    /// Wire event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "authenticate",
            ClientMessage::Ping {} => "ping",
            ClientMessage::ListenForUserEvents {} => "listen for user events",
            ClientMessage::ListenForTeamEvents { .. } => "listen for team events",
            ClientMessage::ListenForBoardEvents { .. } => "listen for board events",
            ClientMessage::StopListeningForBoardEvents { .. } => "stop listening for board events",
            ClientMessage::ListenForChatEvents { .. } => "listen for chat events",
            ClientMessage::ListenForMailEvents { .. } => "listen for mail events",
            ClientMessage::ChatSendMessage { .. } => "chat send message",
            ClientMessage::MailSendMessage { .. } => "mail send message",
            ClientMessage::AddItem { .. } => "add item",
            ClientMessage::EditItem { .. } => "edit item",
            ClientMessage::MoveItem { .. } => "move item",
            ClientMessage::RemoveItem { .. } => "remove item",
            ClientMessage::ReopenItem { .. } => "reopen item",
            ClientMessage::AddColumn { .. } => "add column",
            ClientMessage::RemoveColumn { .. } => "remove column",
        }
    }
}

// ============================================
// Server → Client Messages
// ============================================

/// Messages addressed to a single connection rather than fanned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ConnectionNotice {
    /// Handshake accepted.
    #[serde(rename = "authenticated", rename_all = "camelCase")]
    Authenticated {
        user_id: UserId,
        connection_id: ConnectionId,
    },

    /// Handshake rejected; the connection closes after this.
    #[serde(rename = "unauthorized")]
    Unauthorized { reason: String },

    /// Heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp: String },

    /// A frame could not be parsed or a command failed.
    #[serde(rename = "error")]
    Error { code: String, message: String },

    #[serde(rename = "chat authenticated", rename_all = "camelCase")]
    ChatAuthenticated {
        account_id: AccountId,
        account_name: String,
    },

    #[serde(rename = "mail authenticated", rename_all = "camelCase")]
    MailAuthenticated {
        account_id: AccountId,
        account_name: String,
    },

    #[serde(rename = "no chat for account", rename_all = "camelCase")]
    NoChatForAccount { account_id: AccountId },

    #[serde(rename = "no mail for account", rename_all = "camelCase")]
    NoMailForAccount { account_id: AccountId },

    #[serde(rename = "chat socket ready", rename_all = "camelCase")]
    ChatSocketReady { account_id: AccountId },

    #[serde(rename = "mail socket ready", rename_all = "camelCase")]
    MailSocketReady { account_id: AccountId },

    #[serde(rename = "chat socket unable to start", rename_all = "camelCase")]
    ChatSocketUnableToStart { account_id: AccountId },

    #[serde(rename = "mail socket unable to start", rename_all = "camelCase")]
    MailSocketUnableToStart { account_id: AccountId },

    #[serde(rename = "chat event", rename_all = "camelCase")]
    ChatEvent {
        account_id: AccountId,
        event: ProviderEvent,
    },

    #[serde(rename = "mail event", rename_all = "camelCase")]
    MailEvent {
        account_id: AccountId,
        event: ProviderEvent,
    },
}

impl ConnectionNotice {
    pub fn provider_authenticated(provider: Provider, account_id: AccountId, account_name: String) -> Self {
        match provider {
            Provider::Chat => ConnectionNotice::ChatAuthenticated {
                account_id,
                account_name,
            },
            Provider::Mail => ConnectionNotice::MailAuthenticated {
                account_id,
                account_name,
            },
        }
    }

    pub fn no_provider_for_account(provider: Provider, account_id: AccountId) -> Self {
        match provider {
            Provider::Chat => ConnectionNotice::NoChatForAccount { account_id },
            Provider::Mail => ConnectionNotice::NoMailForAccount { account_id },
        }
    }

    pub fn socket_ready(provider: Provider, account_id: AccountId) -> Self {
        match provider {
            Provider::Chat => ConnectionNotice::ChatSocketReady { account_id },
            Provider::Mail => ConnectionNotice::MailSocketReady { account_id },
        }
    }

    pub fn socket_unable_to_start(provider: Provider, account_id: AccountId) -> Self {
        match provider {
            Provider::Chat => ConnectionNotice::ChatSocketUnableToStart { account_id },
            Provider::Mail => ConnectionNotice::MailSocketUnableToStart { account_id },
        }
    }

    pub fn provider_event(provider: Provider, account_id: AccountId, event: ProviderEvent) -> Self {
        match provider {
            Provider::Chat => ConnectionNotice::ChatEvent { account_id, event },
            Provider::Mail => ConnectionNotice::MailEvent { account_id, event },
        }
    }
}

/// Anything the server writes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Sync(SyncEvent),
    Notice(ConnectionNotice),
}

impl ServerMessage {
    /// The wrapped sync event, if this is one.
    pub fn as_sync(&self) -> Option<&SyncEvent> {
        match self {
            ServerMessage::Sync(event) => Some(event),
            ServerMessage::Notice(_) => None,
        }
    }
}

impl From<SyncEvent> for ServerMessage {
    fn from(event: SyncEvent) -> Self {
        ServerMessage::Sync(event)
    }
}

impl From<ConnectionNotice> for ServerMessage {
    fn from(notice: ConnectionNotice) -> Self {
        ServerMessage::Notice(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_message_deserializes_listen_for_board() {
        let board = BoardId::new();
        let text = json!({"event": "listen for board events", "data": {"boardId": board}}).to_string();

        let msg = ClientMessage::parse(&text).unwrap();

        assert_eq!(msg, ClientMessage::ListenForBoardEvents { board_id: board });
    }

    #[test]
    fn payloadless_events_may_omit_data() {
        let msg = ClientMessage::parse(r#"{"event": "listen for user events"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ListenForUserEvents {});

        let msg = ClientMessage::parse(r#"{"event": "ping", "data": {}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping {});
    }

    #[test]
    fn provider_send_message_uses_camel_case_fields() {
        let account = AccountId::new();
        let text = json!({
            "event": "chat send message",
            "data": {"accountId": account, "channelOrThreadId": "C1", "message": "hi"}
        })
        .to_string();

        let msg = ClientMessage::parse(&text).unwrap();

        assert_eq!(msg.name(), "chat send message");
        assert!(matches!(msg, ClientMessage::ChatSendMessage { ref message, .. } if message == "hi"));
    }

    #[test]
    fn malformed_payload_is_rejected_at_the_boundary() {
        let text = json!({"event": "move item", "data": {"itemId": "not-a-uuid"}}).to_string();
        assert!(ClientMessage::parse(&text).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn provider_notices_use_provider_in_event_name() {
        let account = AccountId::new();

        let ready = serde_json::to_value(ServerMessage::from(ConnectionNotice::socket_ready(
            Provider::Mail,
            account,
        )))
        .unwrap();
        assert_eq!(ready["event"], "mail socket ready");
        assert_eq!(ready["data"]["accountId"], json!(account.to_string()));

        let missing = serde_json::to_value(ServerMessage::from(
            ConnectionNotice::no_provider_for_account(Provider::Chat, account),
        ))
        .unwrap();
        assert_eq!(missing["event"], "no chat for account");
    }

    #[test]
    fn server_message_roundtrips_sync_events() {
        let msg = ServerMessage::from(ConnectionNotice::Pong {
            timestamp: "2025-01-10T00:00:00Z".to_string(),
        });
        let text = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert!(back.as_sync().is_none());
    }
}
