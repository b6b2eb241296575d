//! Participant side of the FIPA request protocol.
//!
//! Stateless: every inbound REQUEST is handed to the registered handlers,
//! which answer through the `send_*` helpers whenever they are ready,
//! possibly after a round trip through the worker pool.

use std::cell::RefCell;
use std::rc::Rc;

use crate::acl::{AclMessage, Performative, Protocol};
use crate::runtime::{Agent, AgentContext, Behaviour};

type RequestHandler = Rc<dyn Fn(&RequestParticipant, &AclMessage)>;

struct ParticipantInner {
    context: AgentContext,
    handlers: RefCell<Vec<RequestHandler>>,
}

/// Answers inbound requests for one agent.
#[derive(Clone)]
pub struct RequestParticipant {
    inner: Rc<ParticipantInner>,
}

impl RequestParticipant {
    pub fn new(context: AgentContext) -> Self {
        Self {
            inner: Rc::new(ParticipantInner {
                context,
                handlers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a participant and register it as one of the agent's behaviours.
    pub fn attach(agent: &Agent) -> Self {
        let participant = Self::new(agent.context().clone());
        agent.add_behaviour(Rc::new(participant.clone()));
        participant
    }

    pub fn context(&self) -> &AgentContext {
        &self.inner.context
    }

    /// Register a handler for inbound requests.
    ///
    /// Handlers run in registration order on the dispatch loop.
    pub fn add_request_handler<F>(&self, handler: F)
    where
        F: Fn(&RequestParticipant, &AclMessage) + 'static,
    {
        self.inner.handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Dispatch entry point for every inbound message of the agent.
    pub fn execute(&self, message: &AclMessage) {
        if message.protocol != Some(Protocol::FipaRequest)
            || message.performative != Performative::Request
        {
            return;
        }

        tracing::debug!(
            "{} handling request {} from {:?}",
            self.context().aid(),
            message.conversation_id,
            message.sender.as_ref().map(|s| s.to_string())
        );

        let handlers = self.inner.handlers.borrow().clone();
        for handler in handlers {
            handler(self, message);
        }
    }

    /// Accept the request; the answer follows later.
    pub fn send_agree(&self, message: AclMessage) -> AclMessage {
        self.send_as(message, Performative::Agree)
    }

    /// Decline the request.
    pub fn send_refuse(&self, message: AclMessage) -> AclMessage {
        self.send_as(message, Performative::Refuse)
    }

    /// Answer the request.
    pub fn send_inform(&self, message: AclMessage) -> AclMessage {
        self.send_as(message, Performative::Inform)
    }

    /// Report that the request could not be carried out.
    pub fn send_failure(&self, message: AclMessage) -> AclMessage {
        self.send_as(message, Performative::Failure)
    }

    fn send_as(&self, message: AclMessage, performative: Performative) -> AclMessage {
        let message = message
            .with_protocol(Protocol::FipaRequest)
            .with_performative(performative);
        self.context().send(message)
    }
}

impl Behaviour for RequestParticipant {
    fn execute(&self, message: &AclMessage) {
        RequestParticipant::execute(self, message);
    }
}
