//! The dispatch loop: the single thread of control that owns sends, timers
//! and every loop-local piece of agent state.
//!
//! Structure:
//! - `DispatchLoop`: hosts agents, drains the job queue, fires timers
//! - `DispatchHandle`: the only `Send` way in, used by transports and workers
//! - `Job`: FIFO queue entries (deliveries, marshaled closures, worker results)

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::acl::{AclMessage, AgentId};
use crate::config::Settings;
use crate::error::{Error, Result};

use super::agent::{Agent, AgentContext};
use super::timer::TimerQueue;
use super::transport::Transport;
use super::worker::WorkerPool;

/// Result of a worker job, type-erased for the trip back to the loop.
pub(crate) type WorkResult = Result<Box<dyn Any + Send>>;

/// Loop-side continuation waiting for a worker result.
pub(crate) type Continuation = Box<dyn FnOnce(WorkResult)>;

/// Closure marshaled onto the loop and run against a hosted agent.
pub type AgentTask = Box<dyn FnOnce(&Agent) + Send>;

/// Entry in the dispatch loop's queue.
pub(crate) enum Job {
    /// Inbound message for a hosted agent
    Deliver { to: AgentId, message: AclMessage },
    /// Closure to run on the loop against a hosted agent
    Call { agent: AgentId, task: AgentTask },
    /// Worker result for a pending continuation
    Resume { token: u64, result: WorkResult },
    /// Stop the loop
    Shutdown,
}

/// Thread-safe hand-off into a dispatch loop.
#[derive(Clone)]
pub struct DispatchHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl DispatchHandle {
    /// Queue an inbound message for a hosted agent.
    pub fn deliver(&self, to: AgentId, message: AclMessage) -> Result<()> {
        self.push(Job::Deliver { to, message })
    }

    /// Run a closure on the dispatch loop with the hosted agent `agent`.
    pub fn call_from_thread<F>(&self, agent: AgentId, task: F) -> Result<()>
    where
        F: FnOnce(&Agent) + Send + 'static,
    {
        self.push(Job::Call {
            agent,
            task: Box::new(task),
        })
    }

    /// Schedule a closure to run on the dispatch loop after `delay`.
    ///
    /// Safe to call from any thread; the timer itself lives on the loop.
    pub fn call_later<F>(&self, agent: AgentId, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce(&Agent) + Send + 'static,
    {
        self.call_from_thread(agent, move |hosted| {
            let target = hosted.clone();
            hosted
                .context()
                .call_later(delay, move || task(&target));
        })
    }

    /// Ask the loop to stop after the jobs already queued.
    pub fn shutdown(&self) {
        if self.push(Job::Shutdown).is_err() {
            tracing::debug!("Shutdown requested for a loop that already stopped");
        }
    }

    /// Check if the loop is still accepting jobs.
    pub fn is_closed(&self) -> bool {
        self.jobs.is_closed()
    }

    pub(crate) fn resume(&self, token: u64, result: WorkResult) -> Result<()> {
        self.push(Job::Resume { token, result })
    }

    fn push(&self, job: Job) -> Result<()> {
        self.jobs.send(job).map_err(|_| Error::DispatchClosed)
    }
}

/// State shared by the loop and every agent context it hosts.
///
/// Reachable only through `Rc`, so it never leaves the loop thread.
pub(crate) struct LoopShared {
    pub(crate) handle: DispatchHandle,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) workers: WorkerPool,
    pub(crate) session_timeout: Duration,
    timers: RefCell<TimerQueue>,
    continuations: RefCell<HashMap<u64, Continuation>>,
    next_token: Cell<u64>,
}

impl LoopShared {
    pub(crate) fn timers(&self) -> std::cell::RefMut<'_, TimerQueue> {
        self.timers.borrow_mut()
    }

    pub(crate) fn park(&self, continuation: Continuation) -> u64 {
        let token = self.next_token.get() + 1;
        self.next_token.set(token);
        self.continuations.borrow_mut().insert(token, continuation);
        token
    }

    fn unpark(&self, token: u64) -> Option<Continuation> {
        self.continuations.borrow_mut().remove(&token)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow_mut().next_deadline()
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        loop {
            // Borrow released before the callback runs; callbacks routinely
            // schedule or cancel timers.
            let next = self.timers.borrow_mut().pop_due(now);
            let Some(callback) = next else {
                break;
            };
            callback();
        }
    }

    fn clear(&self) {
        self.timers.borrow_mut().clear();
        self.continuations.borrow_mut().clear();
    }
}

/// Single-threaded dispatch loop hosting one or more agents.
pub struct DispatchLoop {
    shared: Rc<LoopShared>,
    jobs: mpsc::UnboundedReceiver<Job>,
    agents: HashMap<AgentId, Agent>,
}

impl DispatchLoop {
    /// Create a loop with default settings.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_settings(&Settings::default(), transport)
    }

    /// Create a loop configured from settings.
    ///
    /// Must be called from within a tokio runtime; the worker pool attaches
    /// to it.
    pub fn with_settings(settings: &Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let workers = WorkerPool::new(settings.workers.max_concurrent)?;

        let shared = Rc::new(LoopShared {
            handle: DispatchHandle { jobs: tx },
            transport,
            workers,
            session_timeout: settings.protocol.session_timeout(),
            timers: RefCell::new(TimerQueue::new()),
            continuations: RefCell::new(HashMap::new()),
            next_token: Cell::new(0),
        });

        Ok(Self {
            shared,
            jobs: rx,
            agents: HashMap::new(),
        })
    }

    /// Handle for other threads and transports.
    pub fn handle(&self) -> DispatchHandle {
        self.shared.handle.clone()
    }

    /// Host a new agent on this loop and bind it to the transport.
    pub fn spawn_agent(&mut self, aid: AgentId) -> Result<Agent> {
        if self.agents.contains_key(&aid) {
            return Err(Error::AgentExists(aid.to_string()));
        }

        self.shared.transport.bind(&aid, self.handle())?;

        let agent = Agent::new(AgentContext::new(aid.clone(), Rc::clone(&self.shared)));
        self.agents.insert(aid.clone(), agent.clone());

        tracing::debug!("Hosting agent {}", aid);
        Ok(agent)
    }

    /// Look up a hosted agent.
    pub fn agent(&self, aid: &AgentId) -> Option<&Agent> {
        self.agents.get(aid)
    }

    /// Number of hosted agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Drive the loop until shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("Dispatch loop started with {} agent(s)", self.agents.len());

        loop {
            self.shared.fire_due_timers();

            let job = match self.shared.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        job = self.jobs.recv() => job,
                        _ = tokio::time::sleep_until(deadline) => continue,
                    }
                }
                None => self.jobs.recv().await,
            };

            match job {
                Some(Job::Shutdown) | None => break,
                Some(job) => self.handle_job(job),
            }
        }

        tracing::info!("Dispatch loop stopped");
        Ok(())
    }

    fn handle_job(&mut self, job: Job) {
        match job {
            Job::Deliver { to, message } => match self.agents.get(&to) {
                Some(agent) => agent.dispatch(&message),
                None => {
                    tracing::debug!("Dropping {} for unknown agent {}", message.performative, to)
                }
            },
            Job::Call { agent, task } => match self.agents.get(&agent) {
                Some(hosted) => task(hosted),
                None => tracing::warn!("Dropping marshaled call for unknown agent {}", agent),
            },
            Job::Resume { token, result } => match self.shared.unpark(token) {
                Some(continuation) => continuation(result),
                None => tracing::warn!("No continuation waiting for worker result {}", token),
            },
            Job::Shutdown => {}
        }
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        // Timers and continuations capture agent state; release them so the
        // agents can be freed with the loop.
        self.shared.clear();
    }
}
