//! Agent identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identity of an agent: local name plus transport address.
///
/// Equality and hashing are structural, so two ids parsed from the same
/// `name@host:port` text are interchangeable as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId {
    /// Local agent name (the part before `@`)
    pub name: String,
    /// Host the agent is reachable on
    pub host: String,
    /// Port the agent is reachable on
    pub port: u16,
}

impl AgentId {
    /// Create a new agent id.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Create an agent id on `localhost`.
    pub fn localhost(name: impl Into<String>, port: u16) -> Self {
        Self::new(name, "localhost", port)
    }

    /// Transport address (`host:port`).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.host, self.port)
    }
}

impl FromStr for AgentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAgentId(s.to_string());

        let (name, address) = s.trim().split_once('@').ok_or_else(invalid)?;
        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;

        if name.is_empty() || host.is_empty() {
            return Err(invalid());
        }

        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(name, host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_and_display() {
        let aid: AgentId = "alfa@localhost:61000".parse().unwrap();
        assert_eq!(aid.name, "alfa");
        assert_eq!(aid.host, "localhost");
        assert_eq!(aid.port, 61000);
        assert_eq!(aid.address(), "localhost:61000");
        assert_eq!(aid.to_string(), "alfa@localhost:61000");
    }

    #[test]
    fn test_invalid_ids() {
        for text in ["alfa", "alfa@localhost", "@localhost:1", "alfa@:1", "alfa@localhost:port"] {
            assert!(text.parse::<AgentId>().is_err(), "{} should not parse", text);
        }
    }

    #[test]
    fn test_structural_equality() {
        let a = AgentId::localhost("bravo", 52000);
        let b: AgentId = "bravo@localhost:52000".parse().unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
