//! Operator approval for inbound transfers.
//!
//! The connection server never talks to the terminal. It asks a [`Consent`]
//! implementation, which for an interactive node is a [`ConsentBroker`]
//! forwarding the question to the console over a channel and denying the
//! transfer when nobody answers in time.

use async_trait::async_trait;
use log::{debug, warn};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// The peer wants to pull one of our files.
    Request,
    /// The peer wants to push a file to us.
    Offer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn is_approved(self) -> bool {
        self == Decision::Approved
    }

    /// Interpret an operator's answer. Only `y` and `yes` approve.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Decision::Approved,
            _ => Decision::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub peer: SocketAddr,
    pub file_name: String,
    pub kind: TransferKind,
}

impl fmt::Display for ConsentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransferKind::Request => write!(
                f,
                "Peer {} requests {}. Approve? (y/n): ",
                self.peer, self.file_name
            ),
            TransferKind::Offer => write!(
                f,
                "Peer {} offers {}. Accept? (y/n): ",
                self.peer, self.file_name
            ),
        }
    }
}

#[async_trait]
pub trait Consent: Send + Sync {
    async fn decide(&self, request: ConsentRequest) -> Decision;
}

/// Fixed answer for every request, for headless nodes.
pub struct AutoConsent(pub Decision);

#[async_trait]
impl Consent for AutoConsent {
    async fn decide(&self, request: ConsentRequest) -> Decision {
        debug!("Auto-{:?} {:?} of {} from {}", self.0, request.kind, request.file_name, request.peer);
        self.0
    }
}

/// A question waiting for the operator.
#[derive(Debug)]
pub struct PendingConsent {
    pub id: Uuid,
    pub request: ConsentRequest,
    responder: oneshot::Sender<Decision>,
}

impl PendingConsent {
    /// Deliver the operator's decision. Returns false when the asking side
    /// already gave up (timed out or connection dropped).
    pub fn answer(self, decision: Decision) -> bool {
        self.responder.send(decision).is_ok()
    }

    pub fn is_expired(&self) -> bool {
        self.responder.is_closed()
    }
}

pub struct ConsentBroker {
    tx: mpsc::Sender<PendingConsent>,
    timeout: Duration,
}

impl ConsentBroker {
    /// The receiver must be drained by whoever presents questions to the operator.
    pub fn new(timeout: Duration) -> (Self, mpsc::Receiver<PendingConsent>) {
        let (tx, rx) = mpsc::channel(32);
        (Self { tx, timeout }, rx)
    }
}

#[async_trait]
impl Consent for ConsentBroker {
    async fn decide(&self, request: ConsentRequest) -> Decision {
        let (responder, answer) = oneshot::channel();
        let pending = PendingConsent {
            id: Uuid::new_v4(),
            request: request.clone(),
            responder,
        };
        let id = pending.id;

        if self.tx.send(pending).await.is_err() {
            warn!("No console to ask about {}; denying", request.file_name);
            return Decision::Denied;
        }

        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(decision)) => {
                debug!("Consent {} for {}: {:?}", id, request.file_name, decision);
                decision
            }
            Ok(Err(_)) => {
                warn!("Consent {} dropped without an answer; denying", id);
                Decision::Denied
            }
            Err(_) => {
                warn!(
                    "No answer within {:?} for {} from {}; denying",
                    self.timeout, request.file_name, request.peer
                );
                Decision::Denied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: TransferKind) -> ConsentRequest {
        ConsentRequest {
            peer: "192.168.1.20:5000".parse().unwrap(),
            file_name: "notes.txt".to_string(),
            kind,
        }
    }

    #[test]
    fn test_from_answer() {
        assert_eq!(Decision::from_answer("y"), Decision::Approved);
        assert_eq!(Decision::from_answer(" YES\n"), Decision::Approved);
        assert_eq!(Decision::from_answer("n"), Decision::Denied);
        assert_eq!(Decision::from_answer(""), Decision::Denied);
        assert_eq!(Decision::from_answer("sure"), Decision::Denied);
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(
            request(TransferKind::Request).to_string(),
            "Peer 192.168.1.20:5000 requests notes.txt. Approve? (y/n): "
        );
        assert_eq!(
            request(TransferKind::Offer).to_string(),
            "Peer 192.168.1.20:5000 offers notes.txt. Accept? (y/n): "
        );
    }

    #[tokio::test]
    async fn test_broker_forwards_answer() {
        let (broker, mut rx) = ConsentBroker::new(Duration::from_secs(5));

        let operator = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request, request(TransferKind::Offer));
            assert!(pending.answer(Decision::Approved));
        });

        assert_eq!(broker.decide(request(TransferKind::Offer)).await, Decision::Approved);
        operator.await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_denies_on_timeout() {
        let (broker, mut rx) = ConsentBroker::new(Duration::from_millis(50));

        let decision = broker.decide(request(TransferKind::Request)).await;
        assert_eq!(decision, Decision::Denied);

        let late = rx.recv().await.unwrap();
        assert!(late.is_expired());
        assert!(!late.answer(Decision::Approved));
    }

    #[tokio::test]
    async fn test_broker_denies_without_console() {
        let (broker, rx) = ConsentBroker::new(Duration::from_secs(5));
        drop(rx);
        assert_eq!(broker.decide(request(TransferKind::Request)).await, Decision::Denied);
    }

    #[tokio::test]
    async fn test_auto_consent() {
        let consent = AutoConsent(Decision::Denied);
        assert_eq!(consent.decide(request(TransferKind::Offer)).await, Decision::Denied);
    }
}
