//! Agent Communication Language for Parley.
//!
//! This module defines the message envelope exchanged between agents:
//! - Agent identities (`name@host:port`)
//! - Performatives and interaction protocol tags
//! - ACL messages with conversation ids and reply derivation

pub mod aid;
pub mod message;
pub mod types;

pub use aid::AgentId;
pub use message::AclMessage;
pub use types::{Performative, Protocol};
