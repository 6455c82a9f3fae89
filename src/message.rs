//! Wire message format shared by clients and the hub.

use serde::{Deserialize, Serialize};

/// Application-level chat message, sent as one JSON text frame.
///
/// Both fields are optional on the wire; absent fields are omitted rather
/// than serialized as empty strings. The reader pump stamps `nickname`
/// with the sending connection's registered nickname before the message
/// reaches the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Nickname of the sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Chat text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
