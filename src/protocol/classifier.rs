//! Protocol classifier
//!
//! Decides the protocol of a connection from its first line. STOMP frames
//! open with a command line; a connection opens with `CONNECT` or `STOMP`.
//! Any line starting with one of those is STOMP. Anything else, including an
//! empty line, is treated as HTTP.

use std::fmt;

/// Commands that open a STOMP session
pub const STOMP_OPENING_COMMANDS: &[&str] = &["CONNECT", "STOMP"];

/// Classification decision for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProtocolTag {
    /// Pure STOMP frames
    Stomp,
    /// HTTP request/response, possibly upgraded to WebSocket
    HttpFamily,
}

impl ProtocolTag {
    /// Stable lowercase name, used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stomp => "stomp",
            Self::HttpFamily => "http",
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification policy
///
/// Implementations must be pure: the same line always yields the same tag.
/// They are shared across connections.
pub trait Classifier: Send + Sync {
    /// Classify the first line of a connection
    fn classify(&self, line: &str) -> ProtocolTag;
}

/// Default policy: STOMP opening command, otherwise HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct StompCommandClassifier;

impl Classifier for StompCommandClassifier {
    fn classify(&self, line: &str) -> ProtocolTag {
        classify(line)
    }
}

/// Classify a first line with the default policy
///
/// A line starting with one of [`STOMP_OPENING_COMMANDS`] (case-sensitive,
/// no leading whitespace) is `Stomp`.
pub fn classify(line: &str) -> ProtocolTag {
    if STOMP_OPENING_COMMANDS.iter().any(|command| line.starts_with(command)) {
        ProtocolTag::Stomp
    } else {
        ProtocolTag::HttpFamily
    }
}
