//! FIPA request interaction protocol for Parley.
//!
//! This module pairs the two roles of a request conversation:
//! - `RequestInitiator`: sends requests and resumes suspended conversations
//! - `RequestParticipant`: answers inbound requests
//! - Sessions keyed by (peer, conversation id), with expiry
//! - `Conversation`: the state machine a computation is written as

pub mod conversation;
pub mod initiator;
pub mod participant;
pub mod session;

pub use conversation::{Ask, Conversation, ConversationEvent, Flow, NegativeOutcome};
pub use initiator::{RequestInitiator, DEFAULT_SESSION_TIMEOUT};
pub use participant::RequestParticipant;
pub use session::SessionKey;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{AclMessage, AgentId};
    use crate::runtime::{DispatchHandle, DispatchLoop, LocalTransport};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Asks one question and records what comes back.
    struct Interview {
        receivers: Vec<AgentId>,
        content: String,
        log: Rc<RefCell<Vec<String>>>,
        done: DispatchHandle,
    }

    impl Conversation for Interview {
        fn start(&mut self, initiator: &RequestInitiator) -> AclMessage {
            initiator.send_request(
                AclMessage::request(self.content.clone()).with_receivers(self.receivers.clone()),
            )
        }

        fn resume(&mut self, event: ConversationEvent, _initiator: &RequestInitiator) -> Flow {
            let entry = match &event {
                ConversationEvent::Response(message) => {
                    format!("inform:{}:{}", sender_name(message), message.content)
                }
                ConversationEvent::Agreed(message) => format!("agree:{}", sender_name(message)),
                ConversationEvent::Negative(outcome) => format!(
                    "negative:{}",
                    outcome.peer().map(|peer| peer.name.as_str()).unwrap_or("?")
                ),
                ConversationEvent::Complete => "complete".to_string(),
            };
            self.log.borrow_mut().push(entry);

            if matches!(event, ConversationEvent::Complete) {
                self.done.shutdown();
            }
            Flow::Continue
        }
    }

    fn sender_name(message: &AclMessage) -> &str {
        message.sender.as_ref().map(|s| s.name.as_str()).unwrap_or("?")
    }

    fn society() -> (DispatchLoop, RequestInitiator) {
        crate::logging::init_test();
        let mut dispatch = DispatchLoop::new(Arc::new(LocalTransport::new())).unwrap();
        let alfa = dispatch.spawn_agent(AgentId::localhost("alfa", 61000)).unwrap();
        let initiator = RequestInitiator::attach(&alfa);
        (dispatch, initiator)
    }

    #[tokio::test]
    async fn test_agree_then_inform() {
        let (mut dispatch, initiator) = society();
        let bravo = dispatch.spawn_agent(AgentId::localhost("bravo", 52000)).unwrap();
        let participant = RequestParticipant::attach(&bravo);

        participant.add_request_handler(|participant, request| {
            participant.send_agree(request.create_reply());

            let later = participant.clone();
            let reply = request.create_reply().with_content("A");
            participant
                .context()
                .call_later(Duration::from_millis(10), move || {
                    later.send_inform(reply);
                });
        });

        let log = Rc::new(RefCell::new(Vec::new()));
        initiator.run(Interview {
            receivers: vec![bravo.aid().clone()],
            content: "Q".to_string(),
            log: Rc::clone(&log),
            done: dispatch.handle(),
        });

        dispatch.run().await.unwrap();

        assert_eq!(*log.borrow(), vec!["agree:bravo", "inform:bravo:A", "complete"]);
        assert_eq!(initiator.session_count(), 0);
    }

    #[tokio::test]
    async fn test_two_peers_complete_once() {
        let (mut dispatch, initiator) = society();
        let bravo = dispatch.spawn_agent(AgentId::localhost("bravo", 52000)).unwrap();
        let charlie = dispatch.spawn_agent(AgentId::localhost("charlie", 50001)).unwrap();

        RequestParticipant::attach(&bravo).add_request_handler(|participant, request| {
            participant.send_inform(request.create_reply().with_content("yes"));
        });
        RequestParticipant::attach(&charlie).add_request_handler(|participant, request| {
            participant.send_refuse(request.create_reply());
        });

        let log = Rc::new(RefCell::new(Vec::new()));
        let keys = initiator.run(Interview {
            receivers: vec![bravo.aid().clone(), charlie.aid().clone()],
            content: "Q".to_string(),
            log: Rc::clone(&log),
            done: dispatch.handle(),
        });
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].conversation_id, keys[1].conversation_id);

        dispatch.run().await.unwrap();

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        assert!(log.contains(&"inform:bravo:yes".to_string()));
        assert!(log.contains(&"negative:charlie".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("complete"));
        assert_eq!(log.iter().filter(|entry| *entry == "complete").count(), 1);
    }

    #[tokio::test]
    async fn test_worker_result_precedes_inform() {
        let (mut dispatch, initiator) = society();
        let calculator = dispatch
            .spawn_agent(AgentId::localhost("calculator", 55000))
            .unwrap();

        let loop_thread = std::thread::current().id();
        let worker_thread = Arc::new(Mutex::new(None));
        let worker_done = Arc::new(AtomicBool::new(false));

        let seen_thread = Arc::clone(&worker_thread);
        let seen_done = Arc::clone(&worker_done);
        RequestParticipant::attach(&calculator).add_request_handler(move |participant, request| {
            let thread = Arc::clone(&seen_thread);
            let done = Arc::clone(&seen_done);
            let (a, b) = match request.content.split_once('+') {
                Some((a, b)) => (a.trim().parse::<i64>(), b.trim().parse::<i64>()),
                None => return,
            };
            let (Ok(a), Ok(b)) = (a, b) else {
                return;
            };

            let replier = participant.clone();
            let reply = request.create_reply();
            participant.context().defer_to_thread(
                move || {
                    std::thread::sleep(Duration::from_millis(20));
                    *thread.lock().unwrap() = Some(std::thread::current().id());
                    done.store(true, Ordering::SeqCst);
                    a + b
                },
                move |result| match result {
                    Ok(sum) => {
                        replier.send_inform(reply.with_content(sum.to_string()));
                    }
                    Err(e) => {
                        replier.send_failure(reply.with_content(e.to_string()));
                    }
                },
            );
        });

        let observed = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&observed);
        let handle = dispatch.handle();
        let done_at_inform = Arc::clone(&worker_done);
        initiator.request(
            AclMessage::request("2+2").with_receiver(calculator.aid().clone()),
            move |event, _| {
                match event {
                    ConversationEvent::Response(message) => log.borrow_mut().push((
                        message.content.clone(),
                        done_at_inform.load(Ordering::SeqCst),
                        std::thread::current().id(),
                    )),
                    ConversationEvent::Complete => handle.shutdown(),
                    _ => {}
                }
                Flow::Continue
            },
        );

        dispatch.run().await.unwrap();

        let observed = observed.borrow();
        assert_eq!(observed.len(), 1);
        let (content, worker_finished, thread) = &observed[0];
        assert_eq!(content, "4");
        assert!(*worker_finished);
        assert_eq!(*thread, loop_thread);
        assert_ne!(worker_thread.lock().unwrap().unwrap(), loop_thread);
    }
}
