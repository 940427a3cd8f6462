use std::fmt;

use serde::{Deserialize, Serialize};

/// Port used when a host entry does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A worker host that tasks are dispatched to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Display name, used for logging and lookups only.
    ///
    /// It does not need to resolve to an address.
    pub name: String,
    /// Hostname or IP address.
    pub addr: String,
    /// Login user.
    pub username: String,
    /// Login password.
    ///
    /// `None` means "no password", as opposed to an empty password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Host {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            username: username.into(),
            password: None,
            port: DEFAULT_SSH_PORT,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@addr`, the destination form ssh and scp expect.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.addr)
    }

    /// Copy of the host with the password removed, safe to hand to clients.
    pub fn redacted(&self) -> Self {
        Self {
            password: None,
            ..self.clone()
        }
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_port_and_no_password() {
        let host = Host::new("alpha", "10.0.0.1", "geto");
        assert_eq!(host.port, DEFAULT_SSH_PORT);
        assert!(host.password.is_none());
        assert_eq!(host.destination(), "geto@10.0.0.1");
    }

    #[test]
    fn debug_hides_password() {
        let host = Host::new("alpha", "10.0.0.1", "geto").with_password("hunter2");
        let dbg = format!("{host:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn deserialize_fills_port_default() {
        let host: Host =
            serde_json::from_str(r#"{"name":"a","addr":"h","username":"u"}"#).unwrap();
        assert_eq!(host.port, 22);
        assert!(host.password.is_none());
    }

    #[test]
    fn redacted_drops_password() {
        let host = Host::new("a", "h", "u").with_password("p").with_port(2222);
        let clean = host.redacted();
        assert!(clean.password.is_none());
        assert_eq!(clean.port, 2222);
    }
}
