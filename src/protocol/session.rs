//! Session keys and the initiator's session registry.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::acl::{AclMessage, AgentId};
use crate::runtime::TimerId;

use super::conversation::ConversationSlot;

/// One leg of a conversation: the peer plus the conversation id.
///
/// A request to N receivers opens N sessions sharing one conversation id, so
/// each peer's replies route independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub peer: AgentId,
    pub conversation_id: String,
}

impl SessionKey {
    pub fn new(peer: AgentId, conversation_id: impl Into<String>) -> Self {
        Self {
            peer,
            conversation_id: conversation_id.into(),
        }
    }

    /// Key an inbound message belongs to (its sender and conversation id).
    pub fn for_inbound(message: &AclMessage) -> Option<Self> {
        let sender = message.sender.clone()?;
        Some(Self::new(sender, message.conversation_id.clone()))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.peer, self.conversation_id)
    }
}

/// Open session: the suspended conversation plus its expiry timer.
pub(crate) struct Session {
    pub(crate) conversation: Rc<ConversationSlot>,
    pub(crate) expiry: Option<TimerId>,
}

/// Open sessions of one initiator, keyed by `SessionKey`.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionRegistry {
    /// Register a session, returning any session it replaced.
    pub(crate) fn insert(&mut self, key: SessionKey, session: Session) -> Option<Session> {
        self.sessions.insert(key, session)
    }

    pub(crate) fn remove(&mut self, key: &SessionKey) -> Option<Session> {
        self.sessions.remove(key)
    }

    /// Conversation bound to a key.
    pub(crate) fn conversation(&self, key: &SessionKey) -> Option<Rc<ConversationSlot>> {
        self.sessions
            .get(key)
            .map(|session| Rc::clone(&session.conversation))
    }

    pub(crate) fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Check if any session is still open for a conversation id.
    pub(crate) fn has_conversation(&self, conversation_id: &str) -> bool {
        self.sessions
            .keys()
            .any(|key| key.conversation_id == conversation_id)
    }

    /// Remove every session bound to a conversation.
    pub(crate) fn remove_bound_to(
        &mut self,
        conversation: &Rc<ConversationSlot>,
    ) -> Vec<(SessionKey, Session)> {
        let keys: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, session)| Rc::ptr_eq(&session.conversation, conversation))
            .map(|(key, _)| key.clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.sessions.remove(&key).map(|session| (key, session)))
            .collect()
    }

    pub(crate) fn keys(&self) -> Vec<SessionKey> {
        self.sessions.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
