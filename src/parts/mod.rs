//! Configuration parts.
//!
//! A project's configuration is a tree of parts. Leaves ([`DataPart`]) are one
//! physical source of settings; [`CompositePart`]s order their children by
//! priority, earlier children winning over later ones.

mod declarations;
mod merged;
mod problem;
mod sources;

pub use declarations::{PartDeclaration, PartDeclarations};
pub use merged::MergedDataPart;
pub use problem::{ConfigProblem, PartSource};
pub use sources::{parse_config_text, relative_config_part};

use std::path::{Path, PathBuf};

/// The settings a data part may supply. Every field is optional; merging
/// takes the first value present in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartFields {
    /// Raw `P4PORT` value, e.g. `ssl:perforce:1666`
    pub port: Option<String>,
    pub user: Option<String>,
    pub client: Option<String>,
    pub password: Option<String>,
    /// The password must be entered by the user rather than stored
    pub requires_password_prompt: Option<bool>,
    pub auth_ticket_file: Option<PathBuf>,
    pub trust_ticket_file: Option<PathBuf>,
    pub server_fingerprint: Option<String>,
    pub charset: Option<String>,
    pub client_hostname: Option<String>,
}

impl PartFields {
    /// Fill every unset field from `other`.
    pub(crate) fn fill_from(&mut self, other: &PartFields) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }
        fill(&mut self.port, &other.port);
        fill(&mut self.user, &other.user);
        fill(&mut self.client, &other.client);
        fill(&mut self.password, &other.password);
        fill(&mut self.requires_password_prompt, &other.requires_password_prompt);
        fill(&mut self.auth_ticket_file, &other.auth_ticket_file);
        fill(&mut self.trust_ticket_file, &other.trust_ticket_file);
        fill(&mut self.server_fingerprint, &other.server_fingerprint);
        fill(&mut self.charset, &other.charset);
        fill(&mut self.client_hostname, &other.client_hostname);
    }
}

/// One physical configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPart {
    source: PartSource,
    root: Option<PathBuf>,
    fields: PartFields,
    problems: Vec<ConfigProblem>,
}

impl DataPart {
    pub fn new(source: PartSource, fields: PartFields) -> Self {
        DataPart {
            source,
            root: None,
            fields,
            problems: Vec::new(),
        }
    }

    /// Limit the part to a directory and everything below it.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_problem(mut self, message: impl Into<String>) -> Self {
        self.problems
            .push(ConfigProblem::new(self.source.clone(), message));
        self
    }

    pub fn source(&self) -> &PartSource {
        &self.source
    }

    /// The directory scope, `None` meaning the whole project.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn fields(&self) -> &PartFields {
        &self.fields
    }

    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }
}

/// An ordered group of parts; earlier children have higher priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositePart {
    name: String,
    parts: Vec<ConfigPart>,
    problems: Vec<ConfigProblem>,
}

impl CompositePart {
    pub fn new(name: impl Into<String>, parts: Vec<ConfigPart>) -> Self {
        CompositePart {
            name: name.into(),
            parts,
            problems: Vec::new(),
        }
    }

    pub fn with_problem(mut self, message: impl Into<String>) -> Self {
        let source = PartSource::Composite(self.name.clone());
        self.problems.push(ConfigProblem::new(source, message));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[ConfigPart] {
        &self.parts
    }

    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }
}

/// A node of the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPart {
    Data(DataPart),
    Composite(CompositePart),
}

impl From<DataPart> for ConfigPart {
    fn from(part: DataPart) -> Self {
        ConfigPart::Data(part)
    }
}

impl From<CompositePart> for ConfigPart {
    fn from(part: CompositePart) -> Self {
        ConfigPart::Composite(part)
    }
}

/// Every data part and problem of a tree, in priority order.
#[derive(Debug, Default)]
pub struct FlattenedParts<'a> {
    pub data_parts: Vec<&'a DataPart>,
    pub problems: Vec<ConfigProblem>,
}

impl ConfigPart {
    /// Pre-order, earlier-declared-first traversal.
    ///
    /// The position of a data part in the result is its priority: index 0
    /// outranks everything after it, at any nesting depth.
    pub fn flatten(&self) -> FlattenedParts<'_> {
        let mut out = FlattenedParts::default();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut FlattenedParts<'a>) {
        match self {
            ConfigPart::Data(data) => {
                out.problems.extend(data.problems.iter().cloned());
                out.data_parts.push(data);
            }
            ConfigPart::Composite(composite) => {
                out.problems.extend(composite.problems.iter().cloned());
                for child in &composite.parts {
                    child.flatten_into(out);
                }
            }
        }
    }
}
