//! Demo society for Parley.
//!
//! Three kinds of agents share one dispatch loop:
//! - Sender: asks every recipient for a favor, then stops the loop once every
//!   conversation has completed
//! - Recipient: agrees, works out a question on the worker pool, asks the
//!   calculator, works some more and finally informs the sender
//! - Calculator: answers `a+b` questions, fails anything else

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::acl::{AclMessage, AgentId};
use crate::config::{DemoSettings, Settings};
use crate::error::{Error, Result};
use crate::protocol::{
    Conversation, ConversationEvent, Flow, NegativeOutcome, RequestInitiator, RequestParticipant,
};
use crate::runtime::{DispatchLoop, LocalTransport};

/// What the sender asks every recipient.
pub const FAVOR: &str = "Would you do me a favor?";

/// How one recipient's conversation with the sender ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(String),
    Refused,
    Failed(String),
    Expired,
}

impl From<NegativeOutcome> for Outcome {
    fn from(outcome: NegativeOutcome) -> Self {
        match outcome {
            NegativeOutcome::Refused(_) => Outcome::Refused,
            NegativeOutcome::Failed(message) => Outcome::Failed(message.content),
            NegativeOutcome::Expired { .. } => Outcome::Expired,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Answered(answer) => write!(f, "answered: {}", answer),
            Outcome::Refused => write!(f, "refused"),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
            Outcome::Expired => write!(f, "expired"),
        }
    }
}

/// Outcomes collected by the sender, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct DemoReport {
    pub outcomes: Vec<(AgentId, Outcome)>,
}

impl DemoReport {
    /// Outcome recorded for a recipient.
    pub fn outcome(&self, recipient: &AgentId) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(aid, _)| aid == recipient)
            .map(|(_, outcome)| outcome)
    }
}

/// Parsed agent identities of the society.
#[derive(Debug, Clone)]
pub struct DemoAgents {
    pub sender: AgentId,
    pub recipients: Vec<AgentId>,
    pub calculator: AgentId,
}

impl DemoAgents {
    pub fn from_settings(settings: &DemoSettings) -> Result<Self> {
        Ok(Self {
            sender: settings.sender.parse()?,
            recipients: settings
                .recipients
                .iter()
                .map(|aid| aid.parse())
                .collect::<Result<Vec<_>>>()?,
            calculator: settings.calculator.parse()?,
        })
    }
}

/// Run the whole society until the sender has heard from every recipient.
pub async fn run(settings: &Settings) -> Result<DemoReport> {
    let mut dispatch = DispatchLoop::with_settings(settings, Arc::new(LocalTransport::new()))?;
    let report = stage(&mut dispatch, &settings.demo)?;

    dispatch.run().await?;

    let report = report.borrow().clone();
    Ok(report)
}

/// Host the society on a loop. The sender starts after the configured delay.
pub fn stage(
    dispatch: &mut DispatchLoop,
    settings: &DemoSettings,
) -> Result<Rc<RefCell<DemoReport>>> {
    let agents = DemoAgents::from_settings(settings)?;
    if agents.recipients.is_empty() {
        return Err(Error::Config("the demo needs at least one recipient".to_string()));
    }
    let work = Duration::from_millis(settings.work_millis);

    let calculator = dispatch.spawn_agent(agents.calculator.clone())?;
    RequestParticipant::attach(&calculator).add_request_handler(answer_question);

    for aid in &agents.recipients {
        let recipient = dispatch.spawn_agent(aid.clone())?;
        let initiator = RequestInitiator::attach(&recipient);
        let participant = RequestParticipant::attach(&recipient);
        let calculator = agents.calculator.clone();
        participant.add_request_handler(move |participant, request| {
            do_favor(participant, &initiator, &calculator, request, work);
        });
    }

    let sender = dispatch.spawn_agent(agents.sender.clone())?;
    let initiator = RequestInitiator::attach(&sender);
    let report = Rc::new(RefCell::new(DemoReport::default()));

    let recipients = agents.recipients;
    let outcomes = Rc::clone(&report);
    sender
        .context()
        .call_later(Duration::from_secs(settings.start_delay_secs), move || {
            ask_for_favors(&initiator, recipients, outcomes);
        });

    tracing::info!(
        "Demo staged: {} -> {} recipient(s) -> {}",
        agents.sender,
        settings.recipients.len(),
        agents.calculator
    );
    Ok(report)
}

/// Sender side: one conversation per recipient.
fn ask_for_favors(
    initiator: &RequestInitiator,
    recipients: Vec<AgentId>,
    report: Rc<RefCell<DemoReport>>,
) {
    let remaining = Rc::new(Cell::new(recipients.len()));

    for recipient in recipients {
        let report = Rc::clone(&report);
        let remaining = Rc::clone(&remaining);
        let shutdown = initiator.context().dispatch_handle();
        let peer = recipient.clone();

        initiator.request(
            AclMessage::request(FAVOR).with_receiver(recipient),
            move |event, _| {
                match event {
                    ConversationEvent::Agreed(_) => {
                        tracing::info!("{} agreed to do the favor", peer);
                    }
                    ConversationEvent::Response(message) => {
                        tracing::info!("{} answered: {}", peer, message.content);
                        report
                            .borrow_mut()
                            .outcomes
                            .push((peer.clone(), Outcome::Answered(message.content)));
                    }
                    ConversationEvent::Negative(outcome) => {
                        tracing::warn!("{} did not do the favor: {:?}", peer, outcome);
                        report.borrow_mut().outcomes.push((peer.clone(), outcome.into()));
                    }
                    ConversationEvent::Complete => {
                        remaining.set(remaining.get().saturating_sub(1));
                        if remaining.get() == 0 {
                            tracing::info!("Every favor settled, stopping");
                            shutdown.shutdown();
                        }
                    }
                }
                Flow::Continue
            },
        );
    }
}

/// Recipient side: agree, then think of a question off the loop.
fn do_favor(
    participant: &RequestParticipant,
    initiator: &RequestInitiator,
    calculator: &AgentId,
    request: &AclMessage,
    work: Duration,
) {
    participant.send_agree(request.create_reply());

    let me = participant.context().aid().clone();
    let consultation = Consultation {
        question: String::new(),
        calculator: calculator.clone(),
        participant: participant.clone(),
        request: request.clone(),
        work,
        answer: None,
    };
    let initiator = initiator.clone();

    participant.context().defer_to_thread(
        move || {
            std::thread::sleep(work);
            question_for(&me)
        },
        move |question| match question {
            Ok(question) => {
                initiator.run(Consultation {
                    question,
                    ..consultation
                });
            }
            Err(e) => {
                consultation
                    .participant
                    .send_failure(consultation.request.create_reply().with_content(e.to_string()));
            }
        },
    );
}

/// Question a recipient puts to the calculator.
fn question_for(aid: &AgentId) -> String {
    format!("{}+{}", aid.port / 1000, aid.name.len())
}

/// Recipient's nested conversation with the calculator.
///
/// Once it completes, the answer is polished on the worker pool and relayed
/// to whoever asked for the favor.
struct Consultation {
    question: String,
    calculator: AgentId,
    participant: RequestParticipant,
    request: AclMessage,
    work: Duration,
    answer: Option<std::result::Result<String, String>>,
}

impl Conversation for Consultation {
    fn start(&mut self, initiator: &RequestInitiator) -> AclMessage {
        initiator.send_request(
            AclMessage::request(self.question.clone()).with_receiver(self.calculator.clone()),
        )
    }

    fn resume(&mut self, event: ConversationEvent, _initiator: &RequestInitiator) -> Flow {
        match event {
            ConversationEvent::Agreed(_) => Flow::Continue,
            ConversationEvent::Response(message) => {
                self.answer = Some(Ok(message.content));
                Flow::Continue
            }
            ConversationEvent::Negative(outcome) => {
                let reason = match &outcome {
                    NegativeOutcome::Expired { .. } => "calculator did not answer".to_string(),
                    other => other
                        .message()
                        .map(|message| message.content.clone())
                        .unwrap_or_default(),
                };
                self.answer = Some(Err(reason));
                Flow::Continue
            }
            ConversationEvent::Complete => {
                self.relay();
                Flow::Finished
            }
        }
    }
}

impl Consultation {
    fn relay(&mut self) {
        let reply = self.request.create_reply();
        let participant = self.participant.clone();

        let (question, answer) = match self.answer.take() {
            Some(Ok(answer)) => (self.question.clone(), answer),
            Some(Err(reason)) => {
                participant.send_failure(reply.with_content(reason));
                return;
            }
            None => {
                participant.send_failure(reply.with_content("no answer from calculator"));
                return;
            }
        };

        let work = self.work;
        let context = participant.context().clone();
        context.defer_to_thread(
            move || {
                std::thread::sleep(work);
                format!("{} = {}", question, answer)
            },
            move |result| match result {
                Ok(content) => {
                    participant.send_inform(reply.with_content(content));
                }
                Err(e) => {
                    participant.send_failure(reply.with_content(e.to_string()));
                }
            },
        );
    }
}

/// Calculator side.
fn answer_question(participant: &RequestParticipant, request: &AclMessage) {
    let reply = request.create_reply();
    match evaluate(&request.content) {
        Some(sum) => {
            participant.send_inform(reply.with_content(sum.to_string()));
        }
        None => {
            tracing::debug!("Calculator cannot evaluate '{}'", request.content);
            participant.send_failure(
                reply.with_content(format!("cannot evaluate '{}'", request.content)),
            );
        }
    }
}

/// Evaluate an `a+b` question.
pub fn evaluate(question: &str) -> Option<i64> {
    let re = Regex::new(r"^\s*(-?\d+)\s*\+\s*(-?\d+)\s*$").ok()?;
    let caps = re.captures(question)?;
    let a: i64 = caps.get(1)?.as_str().parse().ok()?;
    let b: i64 = caps.get(2)?.as_str().parse().ok()?;
    a.checked_add(b)
}
