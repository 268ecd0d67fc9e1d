use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{CompositePart, ConfigPart, DataPart, PartFields, PartSource};

/// Apply one `P4*` setting to the fields. Returns false for unknown keys.
fn apply_setting(fields: &mut PartFields, key: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return true;
    }
    match key.trim() {
        "P4PORT" => fields.port = Some(value.to_string()),
        "P4USER" => fields.user = Some(value.to_string()),
        "P4CLIENT" => fields.client = Some(value.to_string()),
        "P4PASSWD" => fields.password = Some(value.to_string()),
        "P4TICKETS" => fields.auth_ticket_file = Some(PathBuf::from(value)),
        "P4TRUST" => fields.trust_ticket_file = Some(PathBuf::from(value)),
        "P4CHARSET" => fields.charset = Some(value.to_string()),
        "P4HOST" => fields.client_hostname = Some(value.to_string()),
        _ => return false,
    }
    true
}

/// Parse P4CONFIG file contents.
///
/// Returns the fields plus a message for every line that is not `KEY=VALUE`.
/// Unknown keys are skipped silently, the same as the command line client.
pub fn parse_config_text(text: &str) -> (PartFields, Vec<String>) {
    let mut fields = PartFields::default();
    let mut errors = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                apply_setting(&mut fields, key, value);
            }
            None => errors.push(format!("line {} is not KEY=VALUE", index + 1)),
        }
    }
    (fields, errors)
}

impl DataPart {
    /// Settings from the process environment.
    pub fn from_env() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Settings from an explicit variable map.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        let mut fields = PartFields::default();
        for (key, value) in vars {
            apply_setting(&mut fields, key, value);
        }
        DataPart::new(PartSource::Environment, fields)
    }

    /// Settings read from a P4CONFIG style file.
    ///
    /// A missing or unreadable file becomes a problem on the part.
    pub fn from_config_file(path: &Path) -> Self {
        let source = PartSource::File(path.to_path_buf());
        match fs::read_to_string(path) {
            Ok(text) => {
                let (fields, errors) = parse_config_text(&text);
                errors
                    .into_iter()
                    .fold(DataPart::new(source, fields), |part, msg| part.with_problem(msg))
            }
            Err(e) => {
                log::debug!("Could not read config file {}: {}", path.display(), e);
                DataPart::new(source, PartFields::default())
                    .with_problem(format!("cannot read config file: {e}"))
            }
        }
    }

    /// Explicitly entered settings.
    pub fn manual(label: impl Into<String>, fields: PartFields) -> Self {
        DataPart::new(PartSource::Manual(label.into()), fields)
    }

    /// Only a server fingerprint requirement.
    pub fn server_fingerprint(fingerprint: impl Into<String>) -> Self {
        let fingerprint: String = fingerprint.into();
        let fields = PartFields {
            server_fingerprint: Some(fingerprint.trim().to_string()),
            ..Default::default()
        };
        DataPart::new(PartSource::ServerFingerprint, fields)
    }

    /// Marks that the password is entered by the user, never stored.
    pub fn require_password() -> Self {
        let fields = PartFields {
            requires_password_prompt: Some(true),
            ..Default::default()
        };
        DataPart::new(PartSource::RequirePassword, fields)
    }

    /// The implicit part every project ends with.
    pub fn defaults() -> Self {
        let fields = PartFields {
            charset: Some("none".to_string()),
            requires_password_prompt: Some(false),
            ..Default::default()
        };
        DataPart::new(PartSource::Default, fields)
    }
}

/// Every `file_name` below `project_root`, each scoped to its own directory.
pub fn relative_config_part(project_root: &Path, file_name: &str) -> ConfigPart {
    let name = format!("relative config files ({file_name})");
    let mut files: Vec<PathBuf> = WalkDir::new(project_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
        .collect();
    // Shallow files first so the listing is stable.
    files.sort_by_key(|p| (p.components().count(), p.clone()));

    let parts: Vec<ConfigPart> = files
        .iter()
        .map(|file| {
            let dir = file.parent().unwrap_or(project_root);
            log::debug!("Found relative config file {}", file.display());
            DataPart::from_config_file(file).with_root(dir).into()
        })
        .collect();

    let composite = if parts.is_empty() {
        CompositePart::new(name, parts).with_problem(format!(
            "no {} files found under {}",
            file_name,
            project_root.display()
        ))
    } else {
        CompositePart::new(name, parts)
    };
    ConfigPart::Composite(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config_text() {
        let (fields, errors) = parse_config_text(
            "# team settings\nP4PORT=ssl:perforce:1666\nP4USER = jdoe\n\nP4FOO=bar\nbroken line\n",
        );
        assert_eq!(fields.port.as_deref(), Some("ssl:perforce:1666"));
        assert_eq!(fields.user.as_deref(), Some("jdoe"));
        assert_eq!(errors, vec!["line 6 is not KEY=VALUE".to_string()]);
    }

    #[test]
    fn test_env_map() {
        let vars: HashMap<String, String> = [
            ("P4PORT", "perforce:1666"),
            ("P4CLIENT", "jdoe-ws"),
            ("HOME", "/home/jdoe"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let part = DataPart::from_env_map(&vars);
        assert_eq!(part.fields().port.as_deref(), Some("perforce:1666"));
        assert_eq!(part.fields().client.as_deref(), Some("jdoe-ws"));
        assert!(part.root().is_none());
        assert!(part.problems().is_empty());
    }

    #[test]
    fn test_missing_config_file_is_a_problem() {
        let temp = TempDir::new().unwrap();
        let part = DataPart::from_config_file(&temp.path().join("absent"));
        assert_eq!(part.problems().len(), 1);
        assert!(part.problems()[0].message().contains("cannot read"));
    }

    #[test]
    fn test_relative_parts_are_scoped_to_their_directory() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("module").join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(temp.path().join(".p4config"), "P4CLIENT=top\n").unwrap();
        fs::write(sub.join(".p4config"), "P4CLIENT=nested\n").unwrap();

        let part = relative_config_part(temp.path(), ".p4config");
        let flat = part.flatten();
        assert!(flat.problems.is_empty());
        assert_eq!(flat.data_parts.len(), 2);
        assert_eq!(flat.data_parts[0].root(), Some(temp.path()));
        assert_eq!(flat.data_parts[1].root(), Some(sub.as_path()));
        assert_eq!(flat.data_parts[1].fields().client.as_deref(), Some("nested"));
    }

    #[test]
    fn test_relative_part_without_files_reports_problem() {
        let temp = TempDir::new().unwrap();
        let flat_part = relative_config_part(temp.path(), ".p4config");
        let flat = flat_part.flatten();
        assert!(flat.data_parts.is_empty());
        assert_eq!(flat.problems.len(), 1);
    }
}
