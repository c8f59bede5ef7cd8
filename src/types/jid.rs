use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const GROUP_SERVER: &str = "g.us";

#[derive(Debug, Error)]
pub enum JidError {
    #[error("invalid JID format: {0}")]
    InvalidFormat(String),
    #[error("failed to parse component: {0}")]
    Parse(#[from] std::num::ParseIntError),
}

/// How a JID is addressed, derived from its server part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Phone-number addressed user (`s.whatsapp.net`).
    PhoneNumber,
    /// Privacy-addressed user (`lid`).
    Hidden,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            ..Default::default()
        }
    }

    pub fn pn(user: &str) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    pub fn lid(user: &str) -> Self {
        Self::new(user, HIDDEN_USER_SERVER)
    }

    /// Strips agent and device, leaving the account-level address.
    pub fn to_non_ad(&self) -> Self {
        Self {
            user: self.user.clone(),
            server: self.server.clone(),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> AddressKind {
        match self.server.as_str() {
            DEFAULT_USER_SERVER => AddressKind::PhoneNumber,
            HIDDEN_USER_SERVER => AddressKind::Hidden,
            _ => AddressKind::Other,
        }
    }

    pub fn is_pn(&self) -> bool {
        self.kind() == AddressKind::PhoneNumber
    }

    pub fn is_lid(&self) -> bool {
        self.kind() == AddressKind::Hidden
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = match s.split_once('@') {
            Some((u, s)) => (u, s),
            None => ("", s),
        };

        if server.contains('@') {
            return Err(JidError::InvalidFormat(s.to_string()));
        }

        if user_part.is_empty() {
            return Ok(Jid::new("", server));
        }

        let (user_base, device_str) = match user_part.rsplit_once(':') {
            Some((u, d)) => (u, Some(d)),
            None => (user_part, None),
        };

        let (user, agent_str) = match user_base.rsplit_once('.') {
            Some((u, a)) => (u, Some(a)),
            None => (user_base, None),
        };

        let agent = match agent_str {
            Some(a) => a.parse()?,
            None => 0,
        };
        let device = match device_str {
            Some(d) => d.parse()?,
            None => 0,
        };

        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            agent,
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return write!(f, "{}", self.server);
        }
        write!(f, "{}", self.user)?;
        if self.agent > 0 {
            write!(f, ".{}", self.agent)?;
        }
        if self.device > 0 {
            write!(f, ":{}", self.device)?;
        }
        write!(f, "@{}", self.server)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Jid::from_str(&value)
    }
}
