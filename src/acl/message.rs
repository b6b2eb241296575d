//! ACL messages with conversation ids for tracking agent conversations.

use serde::{Deserialize, Serialize};

use super::aid::AgentId;
use super::types::{Performative, Protocol};

/// Message exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AclMessage {
    /// Speech act
    pub performative: Performative,
    /// Interaction protocol tag (None for free-form traffic)
    pub protocol: Option<Protocol>,
    /// Conversation ID shared by every message of one exchange
    pub conversation_id: String,
    /// Sending agent, stamped on send
    pub sender: Option<AgentId>,
    /// Receiving agents, in insertion order without duplicates
    pub receivers: Vec<AgentId>,
    /// Message body
    pub content: String,
    /// Token the receiver should echo in `in_reply_to`
    pub reply_with: Option<String>,
    /// Token of the message this one answers
    pub in_reply_to: Option<String>,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
}

impl AclMessage {
    /// Create a new message with a fresh conversation id.
    pub fn new(performative: Performative) -> Self {
        Self {
            performative,
            protocol: None,
            conversation_id: generate_id(),
            sender: None,
            receivers: Vec::new(),
            content: String::new(),
            reply_with: Some(generate_id()),
            in_reply_to: None,
            created_at: current_timestamp(),
        }
    }

    /// Create a request message.
    pub fn request(content: impl Into<String>) -> Self {
        Self::new(Performative::Request).with_content(content)
    }

    /// Create an inform message.
    pub fn inform(content: impl Into<String>) -> Self {
        Self::new(Performative::Inform).with_content(content)
    }

    /// Set the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the performative.
    pub fn with_performative(mut self, performative: Performative) -> Self {
        self.performative = performative;
        self
    }

    /// Set the protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the conversation ID.
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = id.into();
        self
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Add a receiver.
    pub fn with_receiver(mut self, receiver: AgentId) -> Self {
        self.add_receiver(receiver);
        self
    }

    /// Add several receivers.
    pub fn with_receivers(mut self, receivers: impl IntoIterator<Item = AgentId>) -> Self {
        for receiver in receivers {
            self.add_receiver(receiver);
        }
        self
    }

    /// Add a receiver unless it is already addressed.
    pub fn add_receiver(&mut self, receiver: AgentId) {
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
    }

    /// Check if this message is addressed to a specific agent.
    pub fn is_for(&self, aid: &AgentId) -> bool {
        self.receivers.contains(aid)
    }

    /// Derive a reply addressed back to the sender.
    ///
    /// The reply stays in the same conversation and protocol. When the
    /// original had a single receiver, that receiver becomes the sender.
    pub fn create_reply(&self) -> Self {
        let sender = match self.receivers.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };

        Self {
            performative: self.performative,
            protocol: self.protocol,
            conversation_id: self.conversation_id.clone(),
            sender,
            receivers: self.sender.iter().cloned().collect(),
            content: String::new(),
            reply_with: Some(generate_id()),
            in_reply_to: self.reply_with.clone(),
            created_at: current_timestamp(),
        }
    }
}

impl Default for AclMessage {
    fn default() -> Self {
        Self::new(Performative::default())
    }
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
