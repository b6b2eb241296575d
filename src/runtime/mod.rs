//! Runtime module - dispatch loop, timers, workers and transport.
//!
//! This module contains the execution model every agent runs on:
//! - A single-threaded dispatch loop owning sends, timers and agent state
//! - A worker pool for blocking work, marshaled back through the loop's queue
//! - The transport seam agents send through

pub mod agent;
pub mod dispatch;
pub mod timer;
pub mod transport;
pub mod worker;

pub use agent::{Agent, AgentContext, Behaviour};
pub use dispatch::{AgentTask, DispatchHandle, DispatchLoop};
pub use timer::{TimerId, TimerQueue};
pub use transport::{LocalTransport, Transport};
pub use worker::WorkerPool;
