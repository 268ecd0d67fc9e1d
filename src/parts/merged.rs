use std::path::{Path, PathBuf};

use super::{ConfigProblem, DataPart, PartFields, PartSource};

/// The combined view of every data part that applies to one directory.
///
/// Fields come from the highest priority part that sets them. Problems from
/// every contributing part are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDataPart {
    root: PathBuf,
    fields: PartFields,
    sources: Vec<PartSource>,
    problems: Vec<ConfigProblem>,
}

impl MergedDataPart {
    /// `parts` must already be in priority order.
    pub fn merge<'a>(root: &Path, parts: impl IntoIterator<Item = &'a DataPart>) -> Self {
        let mut fields = PartFields::default();
        let mut sources = Vec::new();
        let mut problems: Vec<ConfigProblem> = Vec::new();
        for part in parts {
            fields.fill_from(part.fields());
            sources.push(part.source().clone());
            for problem in part.problems() {
                if !problems.contains(problem) {
                    problems.push(problem.clone());
                }
            }
        }
        MergedDataPart {
            root: root.to_path_buf(),
            fields,
            sources,
            problems,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fields(&self) -> &PartFields {
        &self.fields
    }

    pub fn sources(&self) -> &[PartSource] {
        &self.sources
    }

    /// Problems reported by the contributing parts themselves.
    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }

    /// A problem attributed to this merged view.
    pub(crate) fn problem(&self, message: impl Into<String>) -> ConfigProblem {
        ConfigProblem::new(PartSource::Merged(self.root.clone()), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_empty_field_wins() {
        let env = DataPart::new(
            PartSource::Environment,
            PartFields {
                port: Some("env:1666".to_string()),
                ..Default::default()
            },
        );
        let file = DataPart::new(
            PartSource::File(PathBuf::from("/p/.p4config")),
            PartFields {
                port: Some("file:1666".to_string()),
                client: Some("ws".to_string()),
                ..Default::default()
            },
        )
        .with_problem("line 3 is not KEY=VALUE");

        let merged = MergedDataPart::merge(Path::new("/p"), [&env, &file]);
        assert_eq!(merged.fields().port.as_deref(), Some("env:1666"));
        assert_eq!(merged.fields().client.as_deref(), Some("ws"));
        assert_eq!(merged.sources().len(), 2);
        assert_eq!(merged.problems().len(), 1);
    }
}
