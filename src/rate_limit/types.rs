use std::fmt;
use std::time::Duration;

/// Length of the fixed counting window
pub const WINDOW: Duration = Duration::from_secs(1);

/// Which limit a decision was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    /// Limit applied to the client network address
    Ip,
    /// Limit applied to the API credential
    Token,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Ip => "ip",
            LimitKind::Token => "token",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind limits and block durations, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Requests per second allowed for an address
    pub ip_limit: u64,
    /// How long an address stays blocked after exceeding its limit
    pub ip_block_duration: Duration,
    /// Requests per second allowed for a credential
    pub token_limit: u64,
    /// How long a credential stays blocked after exceeding its limit
    pub token_block_duration: Duration,
}

impl LimiterConfig {
    /// Limit and block duration for the given kind
    pub fn policy(&self, kind: LimitKind) -> (u64, Duration) {
        match kind {
            LimitKind::Ip => (self.ip_limit, self.ip_block_duration),
            LimitKind::Token => (self.token_limit, self.token_block_duration),
        }
    }
}

/// The caller a request is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Client address as seen by the admission filter
    pub network_address: String,
    /// API credential; an empty one counts as absent
    pub credential: Option<String>,
}

impl Identity {
    /// Create an identity, treating an empty credential as absent
    pub fn new(network_address: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            network_address: network_address.into(),
            credential: credential.filter(|c| !c.is_empty()),
        }
    }

    /// Identity for a request carrying no credential
    pub fn from_address(network_address: impl Into<String>) -> Self {
        Self::new(network_address, None)
    }

    /// The single key this request is counted against.
    ///
    /// A non-empty credential always wins over the address.
    pub fn effective_key(&self) -> RateLimitKey {
        match &self.credential {
            Some(token) if !token.is_empty() => {
                RateLimitKey::new(LimitKind::Token, token.clone())
            }
            _ => RateLimitKey::new(LimitKind::Ip, self.network_address.clone()),
        }
    }
}

/// Rate limit key components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The kind of limit this key is counted against
    pub kind: LimitKind,
    /// The address or credential
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(kind: LimitKind, identifier: String) -> Self {
        Self { kind, identifier }
    }

    /// Key used by the counter stores
    pub fn to_store_key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.identifier)
    }
}

/// Outcome of an admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Deny(LimitKind),
}

impl Verdict {
    pub fn is_permit(&self) -> bool {
        matches!(self, Verdict::Permit)
    }
}
