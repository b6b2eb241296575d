//! Suspendable conversations.
//!
//! A conversation is written as a state machine: `start` runs up to the
//! first suspension point and hands back the request it sent, then the
//! initiator feeds it one `ConversationEvent` at a time through `resume`
//! until it reports `Flow::Finished` or is told the conversation is complete.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::acl::{AclMessage, AgentId};

use super::initiator::RequestInitiator;

/// Why a session ended without a result.
#[derive(Debug, Clone, PartialEq)]
pub enum NegativeOutcome {
    /// Peer answered REFUSE
    Refused(AclMessage),
    /// Peer answered FAILURE
    Failed(AclMessage),
    /// No terminal reply arrived in time
    Expired {
        peer: AgentId,
        conversation_id: String,
    },
}

impl NegativeOutcome {
    /// Reply that caused the outcome, if any.
    pub fn message(&self) -> Option<&AclMessage> {
        match self {
            Self::Refused(message) | Self::Failed(message) => Some(message),
            Self::Expired { .. } => None,
        }
    }

    /// Peer whose leg ended.
    pub fn peer(&self) -> Option<&AgentId> {
        match self {
            Self::Refused(message) | Self::Failed(message) => message.sender.as_ref(),
            Self::Expired { peer, .. } => Some(peer),
        }
    }
}

/// Event a suspended conversation is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// INFORM: the answer
    Response(AclMessage),
    /// AGREE: request accepted, answer to follow
    Agreed(AclMessage),
    /// REFUSE, FAILURE or expiry
    Negative(NegativeOutcome),
    /// Every leg of the conversation has been torn down. Delivered once.
    Complete,
}

impl ConversationEvent {
    /// Message carried by the event, if any.
    pub fn message(&self) -> Option<&AclMessage> {
        match self {
            Self::Response(message) | Self::Agreed(message) => Some(message),
            Self::Negative(outcome) => outcome.message(),
            Self::Complete => None,
        }
    }

    /// Check if the event ends the peer leg it arrived on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response(_) | Self::Negative(_))
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Negative(_))
    }
}

/// What a conversation wants after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep waiting for events
    Continue,
    /// Done; never resume again
    Finished,
}

/// Conversation logic driven by a `RequestInitiator`.
pub trait Conversation {
    /// Run up to the first suspension point.
    ///
    /// Must send exactly one request through `initiator.send_request` and
    /// return it; one session is opened per receiver of that request.
    fn start(&mut self, initiator: &RequestInitiator) -> AclMessage;

    /// Handle the next event.
    fn resume(&mut self, event: ConversationEvent, initiator: &RequestInitiator) -> Flow;
}

/// Conversation made of a prepared request and an event closure.
pub struct Ask<F> {
    request: AclMessage,
    on_event: F,
}

impl<F> Ask<F>
where
    F: FnMut(ConversationEvent, &RequestInitiator) -> Flow,
{
    pub fn new(request: AclMessage, on_event: F) -> Self {
        Self { request, on_event }
    }
}

impl<F> Conversation for Ask<F>
where
    F: FnMut(ConversationEvent, &RequestInitiator) -> Flow,
{
    fn start(&mut self, initiator: &RequestInitiator) -> AclMessage {
        initiator.send_request(std::mem::take(&mut self.request))
    }

    fn resume(&mut self, event: ConversationEvent, initiator: &RequestInitiator) -> Flow {
        (self.on_event)(event, initiator)
    }
}

/// A running conversation shared by all of its sessions.
///
/// Events that arrive while the conversation is already handling one (it
/// tore down its own session, say) are queued and handed over in order as
/// soon as the current step returns.
pub(crate) struct ConversationSlot {
    conversation_id: String,
    conversation: RefCell<Option<Box<dyn Conversation>>>,
    pending: RefCell<VecDeque<ConversationEvent>>,
    completed: Cell<bool>,
}

impl ConversationSlot {
    pub(crate) fn new(
        conversation: Box<dyn Conversation>,
        conversation_id: impl Into<String>,
    ) -> Rc<Self> {
        Rc::new(Self {
            conversation_id: conversation_id.into(),
            conversation: RefCell::new(Some(conversation)),
            pending: RefCell::new(VecDeque::new()),
            completed: Cell::new(false),
        })
    }

    pub(crate) fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Check if the conversation has finished and been dropped.
    pub(crate) fn is_finished(&self) -> bool {
        match self.conversation.try_borrow() {
            Ok(conversation) => conversation.is_none(),
            Err(_) => false,
        }
    }

    /// Resume the conversation with an event.
    ///
    /// Returns `Flow::Finished` once the conversation is done, whether it
    /// finished just now or earlier. `Complete` is only ever handed over once.
    pub(crate) fn deliver(&self, event: ConversationEvent, initiator: &RequestInitiator) -> Flow {
        if matches!(event, ConversationEvent::Complete) && self.completed.replace(true) {
            return self.flow();
        }

        self.pending.borrow_mut().push_back(event);

        let Ok(mut guard) = self.conversation.try_borrow_mut() else {
            // Raised from inside `resume`; the outer call drains the queue.
            return Flow::Continue;
        };

        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };

            let Some(conversation) = guard.as_mut() else {
                self.pending.borrow_mut().clear();
                break;
            };

            if conversation.resume(event, initiator) == Flow::Finished {
                tracing::debug!("Conversation {} finished", self.conversation_id);
                *guard = None;
            }
        }

        if guard.is_some() {
            Flow::Continue
        } else {
            Flow::Finished
        }
    }

    fn flow(&self) -> Flow {
        if self.is_finished() {
            Flow::Finished
        } else {
            Flow::Continue
        }
    }
}
