use std::fmt;
use std::path::PathBuf;

/// Where a data part came from.
///
/// Problems carry a copy of this instead of owning the part, so a problem can
/// point back at its source after the part tree has been dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartSource {
    /// The implicit lowest-priority defaults
    Default,
    /// Process environment variables
    Environment,
    /// A P4CONFIG style file
    File(PathBuf),
    /// Values entered by hand, with a label for display
    Manual(String),
    /// A server fingerprint requirement
    ServerFingerprint,
    /// A requirement that the user enters the password
    RequirePassword,
    /// A composite part, named for display
    Composite(String),
    /// The merged view of several parts for one directory
    Merged(PathBuf),
}

impl fmt::Display for PartSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartSource::Default => write!(f, "defaults"),
            PartSource::Environment => write!(f, "environment"),
            PartSource::File(path) => write!(f, "file {}", path.display()),
            PartSource::Manual(label) => write!(f, "manual ({label})"),
            PartSource::ServerFingerprint => write!(f, "server fingerprint"),
            PartSource::RequirePassword => write!(f, "password requirement"),
            PartSource::Composite(name) => write!(f, "{name}"),
            PartSource::Merged(dir) => write!(f, "settings for {}", dir.display()),
        }
    }
}

/// A validation failure reported against the part that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigProblem {
    message: String,
    source: PartSource,
}

impl ConfigProblem {
    pub fn new(source: PartSource, message: impl Into<String>) -> Self {
        ConfigProblem {
            message: message.into(),
            source,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> &PartSource {
        &self.source
    }
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
