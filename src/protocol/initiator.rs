//! Initiator side of the FIPA request protocol.
//!
//! Handles:
//! - Sending protocol-tagged requests
//! - One session per (receiver, conversation id), all bound to the same conversation
//! - Resuming the conversation on each matching reply
//! - Session expiry and conversation-wide completion

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::acl::{AclMessage, Performative, Protocol};
use crate::runtime::{Agent, AgentContext, Behaviour, TimerId};

use super::conversation::{
    Ask, Conversation, ConversationEvent, ConversationSlot, Flow, NegativeOutcome,
};
use super::session::{Session, SessionKey, SessionRegistry};

/// Session lifetime when nothing else is configured.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

struct InitiatorInner {
    context: AgentContext,
    sessions: RefCell<SessionRegistry>,
    session_timeout: Cell<Duration>,
}

/// Drives outbound request conversations for one agent.
///
/// Cheap to clone; clones share the session registry. Lives on the
/// dispatch loop like everything else that touches sessions.
#[derive(Clone)]
pub struct RequestInitiator {
    inner: Rc<InitiatorInner>,
}

impl RequestInitiator {
    /// Create an initiator that is not yet registered with an agent.
    pub fn new(context: AgentContext) -> Self {
        let session_timeout = context.session_timeout();
        Self {
            inner: Rc::new(InitiatorInner {
                context,
                sessions: RefCell::new(SessionRegistry::default()),
                session_timeout: Cell::new(session_timeout),
            }),
        }
    }

    /// Create an initiator and register it as one of the agent's behaviours.
    pub fn attach(agent: &Agent) -> Self {
        let initiator = Self::new(agent.context().clone());
        agent.add_behaviour(Rc::new(initiator.clone()));
        initiator
    }

    /// Agent capabilities this initiator sends through.
    pub fn context(&self) -> &AgentContext {
        &self.inner.context
    }

    /// Timeout applied to sessions opened by `run`.
    pub fn session_timeout(&self) -> Duration {
        self.inner.session_timeout.get()
    }

    /// Change the timeout for sessions opened from now on.
    pub fn set_session_timeout(&self, timeout: Duration) {
        self.inner.session_timeout.set(timeout);
    }

    /// Tag a message as a request under this protocol and send it.
    pub fn send_request(&self, message: AclMessage) -> AclMessage {
        let message = message
            .with_protocol(Protocol::FipaRequest)
            .with_performative(Performative::Request);
        self.context().send(message)
    }

    /// Start a conversation with the initiator's session timeout.
    pub fn run<C>(&self, conversation: C) -> Vec<SessionKey>
    where
        C: Conversation + 'static,
    {
        self.run_with_timeout(conversation, self.session_timeout())
    }

    /// Start a conversation with a specific session timeout.
    ///
    /// Runs the conversation up to its request, then opens one session per
    /// receiver. Returns the keys of the opened sessions.
    pub fn run_with_timeout<C>(&self, conversation: C, timeout: Duration) -> Vec<SessionKey>
    where
        C: Conversation + 'static,
    {
        let mut conversation: Box<dyn Conversation> = Box::new(conversation);
        let request = conversation.start(self);

        debug_assert_eq!(
            request.performative,
            Performative::Request,
            "a conversation must open with a request"
        );
        debug_assert_eq!(
            request.protocol,
            Some(Protocol::FipaRequest),
            "a conversation must open through send_request"
        );

        let slot = ConversationSlot::new(conversation, request.conversation_id.clone());
        let mut keys = Vec::with_capacity(request.receivers.len());

        for receiver in &request.receivers {
            let key = SessionKey::new(receiver.clone(), request.conversation_id.clone());
            let expiry = self.schedule_expiry(key.clone(), timeout);
            let session = Session {
                conversation: Rc::clone(&slot),
                expiry: Some(expiry),
            };

            let replaced = self.inner.sessions.borrow_mut().insert(key.clone(), session);
            if let Some(old) = replaced {
                tracing::warn!("Session {} reopened by a new conversation", key);
                if let Some(timer) = old.expiry {
                    self.context().cancel_timer(timer);
                }
            }

            tracing::debug!("{} opened session {}", self.context().aid(), key);
            keys.push(key);
        }

        if keys.is_empty() {
            tracing::warn!(
                "{} started conversation {} without receivers",
                self.context().aid(),
                request.conversation_id
            );
        }

        keys
    }

    /// Send `request` and hand every event of its conversation to `on_event`.
    pub fn request<F>(&self, request: AclMessage, on_event: F) -> Vec<SessionKey>
    where
        F: FnMut(ConversationEvent, &RequestInitiator) -> Flow + 'static,
    {
        self.run(Ask::new(request, on_event))
    }

    /// Dispatch entry point for every inbound message of the agent.
    ///
    /// Messages for other protocols, for no open session, or with a
    /// performative this protocol does not expect are dropped silently.
    pub fn execute(&self, message: &AclMessage) {
        if message.protocol != Some(Protocol::FipaRequest) {
            return;
        }

        let Some(key) = SessionKey::for_inbound(message) else {
            return;
        };

        let slot = self.inner.sessions.borrow().conversation(&key);
        let Some(slot) = slot else {
            tracing::trace!("No open session for {}", key);
            return;
        };

        let event = match message.performative {
            Performative::Inform => ConversationEvent::Response(message.clone()),
            Performative::Agree => ConversationEvent::Agreed(message.clone()),
            Performative::Refuse => {
                ConversationEvent::Negative(NegativeOutcome::Refused(message.clone()))
            }
            Performative::Failure => {
                ConversationEvent::Negative(NegativeOutcome::Failed(message.clone()))
            }
            other => {
                tracing::trace!("Ignoring {} on session {}", other, key);
                return;
            }
        };

        tracing::debug!(
            "{} resuming {} with {}",
            self.context().aid(),
            key,
            message.performative
        );

        let terminal = event.is_terminal();
        if slot.deliver(event, self) == Flow::Finished {
            self.finish(&slot);
        }

        if terminal {
            self.delete_session(&key);
        }
    }

    /// Tear down a session. Absent keys are ignored.
    ///
    /// When the last session of a conversation id goes, the conversation is
    /// told `Complete`.
    pub fn delete_session(&self, key: &SessionKey) {
        let removed = self.inner.sessions.borrow_mut().remove(key);
        let Some(session) = removed else {
            return;
        };

        if let Some(timer) = session.expiry {
            self.context().cancel_timer(timer);
        }
        tracing::debug!("{} closed session {}", self.context().aid(), key);

        let still_open = self
            .inner
            .sessions
            .borrow()
            .has_conversation(&key.conversation_id);
        if !still_open {
            session.conversation.deliver(ConversationEvent::Complete, self);
        }
    }

    /// Check if a session is open.
    pub fn has_session(&self, key: &SessionKey) -> bool {
        self.inner.sessions.borrow().contains(key)
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.borrow().len()
    }

    /// Keys of all open sessions.
    pub fn session_keys(&self) -> Vec<SessionKey> {
        self.inner.sessions.borrow().keys()
    }

    fn schedule_expiry(&self, key: SessionKey, timeout: Duration) -> TimerId {
        let weak: Weak<InitiatorInner> = Rc::downgrade(&self.inner);
        self.context().call_later(timeout, move || {
            if let Some(inner) = weak.upgrade() {
                RequestInitiator { inner }.expire(&key);
            }
        })
    }

    /// Timer path: the peer never answered conclusively.
    fn expire(&self, key: &SessionKey) {
        let slot = self.inner.sessions.borrow().conversation(key);
        let Some(slot) = slot else {
            return;
        };

        tracing::info!("{} session {} expired", self.context().aid(), key);

        let event = ConversationEvent::Negative(NegativeOutcome::Expired {
            peer: key.peer.clone(),
            conversation_id: key.conversation_id.clone(),
        });
        if slot.deliver(event, self) == Flow::Finished {
            self.finish(&slot);
        }

        self.delete_session(key);
    }

    /// Drop every session of a conversation that has finished.
    fn finish(&self, slot: &Rc<ConversationSlot>) {
        let removed = self.inner.sessions.borrow_mut().remove_bound_to(slot);
        for (key, session) in removed {
            if let Some(timer) = session.expiry {
                self.context().cancel_timer(timer);
            }
            tracing::debug!(
                "{} closed session {} of finished conversation {}",
                self.context().aid(),
                key,
                slot.conversation_id()
            );
        }
    }
}

impl Behaviour for RequestInitiator {
    fn execute(&self, message: &AclMessage) {
        RequestInitiator::execute(self, message);
    }
}
