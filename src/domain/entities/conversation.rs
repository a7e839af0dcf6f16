use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Channel;

/// Engine-side view of a customer conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub agent_id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Watermark used by inactivity timers and sequence resets
    pub last_customer_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: i64, agent_id: i64, customer_name: String, customer_phone: String) -> Self {
        Self {
            id,
            agent_id,
            customer_name,
            customer_phone,
            message_count: 0,
            last_message_at: None,
            last_customer_message_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether free-form content may still be sent on this channel at `now`
    pub fn session_open(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        match channel.session_window() {
            None => true,
            Some(window) => match self.last_customer_message_at {
                Some(last) => now - last <= window,
                None => false,
            },
        }
    }

    /// True when the latest message was authored by the agent, i.e. the customer owes a reply
    pub fn awaiting_customer(&self) -> bool {
        match (self.last_message_at, self.last_customer_message_at) {
            (Some(last), Some(customer)) => last > customer,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageAuthor {
    Customer,
    Agent,
}

impl MessageAuthor {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageAuthor::Customer => "customer",
            MessageAuthor::Agent => "agent",
        }
    }
}

impl fmt::Display for MessageAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageAuthor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(MessageAuthor::Customer),
            "agent" => Ok(MessageAuthor::Agent),
            _ => Err(format!("Invalid message author: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Identifier assigned by the messaging platform; makes ingestion idempotent
    pub id: i64,
    pub conversation_id: i64,
    pub author: MessageAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
