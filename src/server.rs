//! Server identity.
//!
//! A [`ServerConfig`] names one physical server plus the identity used to log
//! into it. The resolver hands out one shared `Arc<ServerConfig>` per
//! [`ServerConfig::server_id`], which is what lets connections be reused.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::parts::{ConfigProblem, MergedDataPart};

/// Transport protocol of a `P4PORT` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Tcp4,
    Tcp6,
    Tcp46,
    Tcp64,
    Ssl,
    Ssl4,
    Ssl6,
    Ssl46,
    Ssl64,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp4 => "tcp4",
            Protocol::Tcp6 => "tcp6",
            Protocol::Tcp46 => "tcp46",
            Protocol::Tcp64 => "tcp64",
            Protocol::Ssl => "ssl",
            Protocol::Ssl4 => "ssl4",
            Protocol::Ssl6 => "ssl6",
            Protocol::Ssl46 => "ssl46",
            Protocol::Ssl64 => "ssl64",
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(
            self,
            Protocol::Ssl | Protocol::Ssl4 | Protocol::Ssl6 | Protocol::Ssl46 | Protocol::Ssl64
        )
    }

    fn parse(value: &str) -> Option<Protocol> {
        let protocol = match value.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "tcp4" => Protocol::Tcp4,
            "tcp6" => Protocol::Tcp6,
            "tcp46" => Protocol::Tcp46,
            "tcp64" => Protocol::Tcp64,
            "ssl" => Protocol::Ssl,
            "ssl4" => Protocol::Ssl4,
            "ssl6" => Protocol::Ssl6,
            "ssl46" => Protocol::Ssl46,
            "ssl64" => Protocol::Ssl64,
            _ => return None,
        };
        Some(protocol)
    }
}

/// A parsed `P4PORT`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerName {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl ServerName {
    /// `protocol:host:port`, the form used in server ids
    pub fn full_port(&self) -> String {
        format!("{}:{}:{}", self.protocol.as_str(), self.host, self.port)
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol == Protocol::Tcp {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}:{}", self.protocol.as_str(), self.host, self.port)
        }
    }
}

impl FromStr for ServerName {
    type Err = String;

    /// Accepts `port`, `host:port` and `protocol:host:port`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err("server port is empty".to_string());
        }
        let pieces: Vec<&str> = value.split(':').collect();
        let (protocol, host, port) = match pieces.as_slice() {
            [port] => (Protocol::Tcp, "localhost", *port),
            [first, port] => match Protocol::parse(first) {
                // "ssl:1666" is a protocol with a local host
                Some(protocol) => (protocol, "localhost", *port),
                None => (Protocol::Tcp, *first, *port),
            },
            [protocol, host, port] => {
                let protocol = Protocol::parse(protocol)
                    .ok_or_else(|| format!("unknown protocol '{protocol}' in '{value}'"))?;
                (protocol, *host, *port)
            }
            _ => return Err(format!("cannot parse server port '{value}'")),
        };
        if host.is_empty() {
            return Err(format!("no host in server port '{value}'"));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("invalid port number in '{value}'"))?;
        Ok(ServerName {
            protocol,
            host: host.to_string(),
            port,
        })
    }
}

/// True for `XX:XX:...` hex fingerprints of SHA-1 or SHA-256 length.
fn is_valid_fingerprint(fingerprint: &str) -> bool {
    let groups: Vec<&str> = fingerprint.split(':').collect();
    (groups.len() == 20 || groups.len() == 32)
        && groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// One remote server and the login identity used against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    server_name: ServerName,
    user: String,
    password: Option<String>,
    requires_password_prompt: bool,
    auth_ticket_file: Option<PathBuf>,
    trust_ticket_file: Option<PathBuf>,
    server_fingerprint: Option<String>,
}

impl ServerConfig {
    /// Validation problems that block creating a config from `part`.
    pub fn problems_for(part: &MergedDataPart) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        let fields = part.fields();
        let server_name = match fields.port.as_deref() {
            None => {
                problems.push(part.problem("server port (P4PORT) is not set"));
                None
            }
            Some(port) => match port.parse::<ServerName>() {
                Ok(name) => Some(name),
                Err(message) => {
                    problems.push(part.problem(message));
                    None
                }
            },
        };
        if fields.user.as_deref().map_or(true, str::is_empty) {
            problems.push(part.problem("user name (P4USER) is not set"));
        }
        if let Some(fingerprint) = fields.server_fingerprint.as_deref() {
            if !is_valid_fingerprint(fingerprint) {
                problems.push(
                    part.problem(format!("malformed server fingerprint '{fingerprint}'")),
                );
            } else if server_name.as_ref().is_some_and(|n| !n.protocol.is_secure()) {
                problems.push(part.problem("a server fingerprint requires an ssl server port"));
            }
        }
        problems
    }

    /// Build a config from a part that [`problems_for`](Self::problems_for)
    /// accepts. Returns `None` otherwise; a config is never half built.
    pub fn create_from(part: &MergedDataPart) -> Option<ServerConfig> {
        if !Self::problems_for(part).is_empty() {
            return None;
        }
        let fields = part.fields();
        let server_name = fields.port.as_deref()?.parse::<ServerName>().ok()?;
        let requires_password_prompt = fields.requires_password_prompt.unwrap_or(false);
        Some(ServerConfig {
            server_name,
            user: fields.user.clone()?,
            // A prompted password is never kept in memory from config sources.
            password: if requires_password_prompt {
                None
            } else {
                fields.password.clone()
            },
            requires_password_prompt,
            auth_ticket_file: fields.auth_ticket_file.clone(),
            trust_ticket_file: fields.trust_ticket_file.clone(),
            server_fingerprint: fields.server_fingerprint.clone(),
        })
    }

    /// The id a merged part would resolve to, if it names a server at all.
    pub fn server_id_for(part: &MergedDataPart) -> Option<String> {
        ServerConfig::create_from(part).map(|config| config.server_id())
    }

    /// Deduplication key: protocol, host, port, user and credential scheme.
    pub fn server_id(&self) -> String {
        format!(
            "{}>>>{}>>>{}",
            self.server_name.full_port(),
            self.user,
            self.credential_scheme()
        )
    }

    /// Key used to make sure only one login prompt runs per server and user.
    pub fn login_key(&self) -> String {
        format!("{}>>>{}", self.server_name, self.user)
    }

    fn credential_scheme(&self) -> String {
        let mut scheme = if self.requires_password_prompt {
            "prompt".to_string()
        } else if self.password.is_some() {
            "password".to_string()
        } else {
            "none".to_string()
        };
        if let Some(tickets) = &self.auth_ticket_file {
            scheme.push_str(&format!(",ticket:{}", tickets.display()));
        }
        if let Some(fingerprint) = &self.server_fingerprint {
            scheme.push_str(&format!(",trust:{fingerprint}"));
        } else if let Some(trust) = &self.trust_ticket_file {
            scheme.push_str(&format!(",trust:{}", trust.display()));
        }
        scheme
    }

    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn requires_password_prompt(&self) -> bool {
        self.requires_password_prompt
    }

    pub fn auth_ticket_file(&self) -> Option<&PathBuf> {
        self.auth_ticket_file.as_ref()
    }

    pub fn trust_ticket_file(&self) -> Option<&PathBuf> {
        self.trust_ticket_file.as_ref()
    }

    pub fn server_fingerprint(&self) -> Option<&str> {
        self.server_fingerprint.as_deref()
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts::{DataPart, PartFields, PartSource};
    use rstest::rstest;
    use std::path::Path;

    fn merged(fields: PartFields) -> MergedDataPart {
        let part = DataPart::new(PartSource::Manual("test".to_string()), fields);
        MergedDataPart::merge(Path::new("/p"), [&part])
    }

    fn fields(port: &str, user: &str) -> PartFields {
        PartFields {
            port: Some(port.to_string()),
            user: Some(user.to_string()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::bare_port("1666", Protocol::Tcp, "localhost", 1666)]
    #[case::host_port("perforce:1666", Protocol::Tcp, "perforce", 1666)]
    #[case::ssl("ssl:perforce.example.com:1667", Protocol::Ssl, "perforce.example.com", 1667)]
    #[case::protocol_only("ssl:1666", Protocol::Ssl, "localhost", 1666)]
    #[case::tcp6("tcp6:p4:2000", Protocol::Tcp6, "p4", 2000)]
    fn test_parse_server_name(
        #[case] input: &str,
        #[case] protocol: Protocol,
        #[case] host: &str,
        #[case] port: u16,
    ) {
        let name: ServerName = input.parse().unwrap();
        assert_eq!(name.protocol, protocol);
        assert_eq!(name.host, host);
        assert_eq!(name.port, port);
    }

    #[rstest]
    #[case::empty("")]
    #[case::bad_port("perforce:abc")]
    #[case::zero_port("perforce:0")]
    #[case::bad_protocol("udp:perforce:1666")]
    #[case::too_many("a:b:c:d")]
    fn test_parse_server_name_rejects(#[case] input: &str) {
        assert!(input.parse::<ServerName>().is_err());
    }

    #[test]
    fn test_missing_fields_are_problems() {
        let problems = ServerConfig::problems_for(&merged(PartFields::default()));
        assert_eq!(problems.len(), 2);
        assert!(ServerConfig::create_from(&merged(PartFields::default())).is_none());
    }

    #[test]
    fn test_fingerprint_requires_ssl() {
        let fingerprint = vec!["AB"; 20].join(":");
        let mut plain = fields("perforce:1666", "jdoe");
        plain.server_fingerprint = Some(fingerprint.clone());
        assert_eq!(ServerConfig::problems_for(&merged(plain)).len(), 1);

        let mut secure = fields("ssl:perforce:1666", "jdoe");
        secure.server_fingerprint = Some(fingerprint);
        assert!(ServerConfig::problems_for(&merged(secure)).is_empty());
    }

    #[test]
    fn test_malformed_fingerprint() {
        let mut f = fields("ssl:perforce:1666", "jdoe");
        f.server_fingerprint = Some("not-a-fingerprint".to_string());
        let problems = ServerConfig::problems_for(&merged(f));
        assert_eq!(problems.len(), 1);
        assert!(problems[0].message().contains("fingerprint"));
    }

    #[test]
    fn test_server_id_depends_on_credential_scheme() {
        let stored = ServerConfig::create_from(&merged(PartFields {
            password: Some("secret".to_string()),
            ..fields("perforce:1666", "jdoe")
        }))
        .unwrap();
        let prompted = ServerConfig::create_from(&merged(PartFields {
            password: Some("secret".to_string()),
            requires_password_prompt: Some(true),
            ..fields("perforce:1666", "jdoe")
        }))
        .unwrap();

        assert_ne!(stored.server_id(), prompted.server_id());
        assert_eq!(stored.login_key(), prompted.login_key());
        assert!(prompted.password().is_none());
    }

    #[test]
    fn test_equivalent_ports_share_server_id() {
        let a = ServerConfig::create_from(&merged(fields("perforce:1666", "jdoe"))).unwrap();
        let b = ServerConfig::create_from(&merged(fields("tcp:perforce:1666", "jdoe"))).unwrap();
        assert_eq!(a.server_id(), b.server_id());
        assert_eq!(a.login_key(), "perforce:1666>>>jdoe");
    }
}
