//! Performatives and interaction protocol tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Speech-act tag of an ACL message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Performative {
    AcceptProposal,
    Agree,
    Cancel,
    Cfp,
    Confirm,
    Disconfirm,
    Failure,
    #[default]
    Inform,
    InformIf,
    InformRef,
    NotUnderstood,
    Propagate,
    Propose,
    QueryIf,
    QueryRef,
    Refuse,
    RejectProposal,
    Request,
    RequestWhen,
    RequestWhenever,
    Subscribe,
}

impl Performative {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptProposal => "accept-proposal",
            Self::Agree => "agree",
            Self::Cancel => "cancel",
            Self::Cfp => "cfp",
            Self::Confirm => "confirm",
            Self::Disconfirm => "disconfirm",
            Self::Failure => "failure",
            Self::Inform => "inform",
            Self::InformIf => "inform-if",
            Self::InformRef => "inform-ref",
            Self::NotUnderstood => "not-understood",
            Self::Propagate => "propagate",
            Self::Propose => "propose",
            Self::QueryIf => "query-if",
            Self::QueryRef => "query-ref",
            Self::Refuse => "refuse",
            Self::RejectProposal => "reject-proposal",
            Self::Request => "request",
            Self::RequestWhen => "request-when",
            Self::RequestWhenever => "request-whenever",
            Self::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction protocol a message belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(rename = "fipa-request-protocol")]
    FipaRequest,
    #[serde(rename = "fipa-query-protocol")]
    FipaQuery,
    #[serde(rename = "fipa-contract-net-protocol")]
    FipaContractNet,
    #[serde(rename = "fipa-subscribe-protocol")]
    FipaSubscribe,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FipaRequest => "fipa-request-protocol",
            Self::FipaQuery => "fipa-query-protocol",
            Self::FipaContractNet => "fipa-contract-net-protocol",
            Self::FipaSubscribe => "fipa-subscribe-protocol",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&Protocol::FipaRequest).unwrap(),
            "\"fipa-request-protocol\""
        );
        assert_eq!(
            serde_json::to_string(&Performative::NotUnderstood).unwrap(),
            "\"not-understood\""
        );

        let parsed: Performative = serde_json::from_str("\"refuse\"").unwrap();
        assert_eq!(parsed, Performative::Refuse);
    }

    #[test]
    fn test_display_matches_serde() {
        for performative in [
            Performative::Request,
            Performative::Agree,
            Performative::Refuse,
            Performative::Inform,
            Performative::Failure,
            Performative::AcceptProposal,
        ] {
            let json = serde_json::to_string(&performative).unwrap();
            assert_eq!(json.trim_matches('"'), performative.to_string());
        }
    }
}
