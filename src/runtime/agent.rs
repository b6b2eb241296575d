//! Agents hosted on a dispatch loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::acl::{AclMessage, AgentId};
use crate::error::{Error, Result};

use super::dispatch::{DispatchHandle, LoopShared, WorkResult};
use super::timer::TimerId;

/// Something that reacts to an agent's inbound messages.
///
/// Every inbound message addressed to the agent is offered to every
/// behaviour, unfiltered; behaviours pick what they care about.
pub trait Behaviour {
    fn execute(&self, message: &AclMessage);
}

/// Loop-side capabilities of an agent.
///
/// Not `Send`: sending, timers and resuming conversations all belong on the
/// dispatch loop. Worker threads get a `DispatchHandle` instead.
#[derive(Clone)]
pub struct AgentContext {
    aid: AgentId,
    shared: Rc<LoopShared>,
}

impl AgentContext {
    pub(crate) fn new(aid: AgentId, shared: Rc<LoopShared>) -> Self {
        Self { aid, shared }
    }

    /// Identity of this agent.
    pub fn aid(&self) -> &AgentId {
        &self.aid
    }

    /// Default session timeout for conversations started by this agent.
    pub fn session_timeout(&self) -> Duration {
        self.shared.session_timeout
    }

    /// Send a message to all of its receivers.
    ///
    /// The agent is stamped as sender. Delivery is best effort: a receiver
    /// the transport cannot reach is logged and skipped.
    pub fn send(&self, mut message: AclMessage) -> AclMessage {
        message.sender = Some(self.aid.clone());

        for receiver in &message.receivers {
            if let Err(e) = self.shared.transport.send(receiver, &message) {
                tracing::warn!(
                    "{} could not deliver {} to {}: {}",
                    self.aid,
                    message.performative,
                    receiver,
                    e
                );
            }
        }

        tracing::debug!(
            "{} sent {} ({}) to {} receiver(s)",
            self.aid,
            message.performative,
            message.conversation_id,
            message.receivers.len()
        );
        message
    }

    /// Run `callback` on the dispatch loop after `delay`.
    pub fn call_later<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        self.shared.timers().schedule(delay, Box::new(callback))
    }

    /// Cancel a pending timer. Returns false if it already fired.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.shared.timers().cancel(id)
    }

    /// Run blocking `work` on the worker pool, then `on_done` on the loop.
    ///
    /// `on_done` receives the work's result once it has been marshaled back,
    /// so it may send messages and drive conversations.
    pub fn defer_to_thread<T, W, C>(&self, work: W, on_done: C)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T>) + 'static,
    {
        let token = self.shared.park(Box::new(move |result: WorkResult| {
            let result = result.and_then(|value| {
                value
                    .downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| Error::Worker("unexpected worker result type".to_string()))
            });
            on_done(result);
        }));

        let handle = self.shared.handle.clone();
        self.shared.workers.submit(
            move || Box::new(work()) as Box<dyn std::any::Any + Send>,
            move |result| {
                if handle.resume(token, result).is_err() {
                    tracing::debug!("Worker finished after the dispatch loop stopped");
                }
            },
        );
    }

    /// Run blocking `work` on the worker pool without a continuation.
    pub fn call_in_thread<W>(&self, work: W)
    where
        W: FnOnce() + Send + 'static,
    {
        let aid = self.aid.clone();
        self.shared.workers.submit(work, move |result| {
            if let Err(e) = result {
                tracing::warn!("Background job for {} failed: {}", aid, e);
            }
        });
    }

    /// Handle for marshaling work back onto this loop from other threads.
    pub fn dispatch_handle(&self) -> DispatchHandle {
        self.shared.handle.clone()
    }
}

struct AgentInner {
    context: AgentContext,
    behaviours: RefCell<Vec<Rc<dyn Behaviour>>>,
}

/// An agent hosted on a dispatch loop.
#[derive(Clone)]
pub struct Agent {
    inner: Rc<AgentInner>,
}

impl Agent {
    pub(crate) fn new(context: AgentContext) -> Self {
        Self {
            inner: Rc::new(AgentInner {
                context,
                behaviours: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Identity of this agent.
    pub fn aid(&self) -> &AgentId {
        self.inner.context.aid()
    }

    /// Loop-side capabilities.
    pub fn context(&self) -> &AgentContext {
        &self.inner.context
    }

    /// Send a message to all of its receivers.
    pub fn send(&self, message: AclMessage) -> AclMessage {
        self.inner.context.send(message)
    }

    /// Register a behaviour. It sees inbound messages after those already registered.
    pub fn add_behaviour(&self, behaviour: Rc<dyn Behaviour>) {
        self.inner.behaviours.borrow_mut().push(behaviour);
    }

    /// Number of registered behaviours.
    pub fn behaviour_count(&self) -> usize {
        self.inner.behaviours.borrow().len()
    }

    /// Offer an inbound message to every behaviour.
    pub(crate) fn dispatch(&self, message: &AclMessage) {
        tracing::trace!(
            "{} received {} from {:?}",
            self.aid(),
            message.performative,
            message.sender.as_ref().map(|s| s.to_string())
        );

        // Snapshot so behaviours may register more behaviours while running.
        let behaviours = self.inner.behaviours.borrow().clone();
        for behaviour in behaviours {
            behaviour.execute(message);
        }
    }
}
