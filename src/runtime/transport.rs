//! Transport seam between agents.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::acl::{AclMessage, AgentId};
use crate::error::{Error, Result};

use super::dispatch::DispatchHandle;

/// Moves messages between agents.
///
/// `send` is called once per receiver; what happens on the wire, and whether
/// the receiver ever sees the message, is the transport's concern.
pub trait Transport: Send + Sync {
    /// Attach an agent's inbox so messages addressed to it can be delivered.
    fn bind(&self, aid: &AgentId, inbox: DispatchHandle) -> Result<()>;

    /// Deliver a message to one receiver.
    fn send(&self, receiver: &AgentId, message: &AclMessage) -> Result<()>;
}

/// In-process transport routing messages through each agent's dispatch loop.
#[derive(Default)]
pub struct LocalTransport {
    routes: RwLock<HashMap<AgentId, DispatchHandle>>,
}

impl LocalTransport {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an agent is reachable through this router.
    pub fn is_bound(&self, aid: &AgentId) -> bool {
        self.routes
            .read()
            .map(|routes| routes.contains_key(aid))
            .unwrap_or(false)
    }

    /// Forget an agent.
    pub fn unbind(&self, aid: &AgentId) -> bool {
        match self.routes.write() {
            Ok(mut routes) => routes.remove(aid).is_some(),
            Err(_) => false,
        }
    }
}

impl Transport for LocalTransport {
    fn bind(&self, aid: &AgentId, inbox: DispatchHandle) -> Result<()> {
        let mut routes = self
            .routes
            .write()
            .map_err(|e| Error::Transport(format!("route table poisoned: {}", e)))?;

        if routes.insert(aid.clone(), inbox).is_some() {
            tracing::warn!("Rebinding agent {} to a new inbox", aid);
        }
        Ok(())
    }

    fn send(&self, receiver: &AgentId, message: &AclMessage) -> Result<()> {
        let inbox = {
            let routes = self
                .routes
                .read()
                .map_err(|e| Error::Transport(format!("route table poisoned: {}", e)))?;
            routes
                .get(receiver)
                .cloned()
                .ok_or_else(|| Error::UnknownAgent(receiver.to_string()))?
        };

        inbox.deliver(receiver.clone(), message.clone())
    }
}

/// Transport that records every send instead of delivering it.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: std::sync::Mutex<Vec<(AgentId, AclMessage)>>,
}

#[cfg(test)]
impl RecordingTransport {
    pub(crate) fn sent(&self) -> Vec<(AgentId, AclMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn bind(&self, _aid: &AgentId, _inbox: DispatchHandle) -> Result<()> {
        Ok(())
    }

    fn send(&self, receiver: &AgentId, message: &AclMessage) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((receiver.clone(), message.clone()));
        Ok(())
    }
}
