//! Parley library root.
//!
//! FIPA request conversations between agents hosted on a single-threaded
//! dispatch loop, with blocking work offloaded to a worker pool.

pub mod acl;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod runtime;

pub use acl::{AclMessage, AgentId, Performative, Protocol};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use protocol::{
    Ask, Conversation, ConversationEvent, Flow, NegativeOutcome, RequestInitiator,
    RequestParticipant, SessionKey,
};
pub use runtime::{
    Agent, AgentContext, Behaviour, DispatchHandle, DispatchLoop, LocalTransport, Transport,
};
