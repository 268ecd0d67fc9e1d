use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{relative_config_part, ConfigPart, DataPart, PartFields};
use crate::preferences::UserPreferences;

/// One `[[part]]` table of a project's `parts.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PartDeclaration {
    /// Read `P4*` variables from the environment
    Env,

    /// Read a single P4CONFIG file; relative paths are resolved against the project
    File { path: PathBuf },

    /// Look for config files throughout the project
    Relative {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },

    /// Values entered by hand
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_ticket_file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trust_ticket_file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charset: Option<String>,
    },

    /// Require the server to present this fingerprint
    Fingerprint { fingerprint: String },

    /// Always ask the user for the password
    RequirePassword,
}

/// The user-supplied config parts of a project, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDeclarations {
    #[serde(default, rename = "part")]
    pub parts: Vec<PartDeclaration>,
}

impl PartDeclarations {
    /// Load `<project>/.p4-workspace/parts.toml`; a missing file means
    /// "environment only".
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = crate::config::ConfigManager::parts_file_path(project_root);
        if !path.exists() {
            return Ok(PartDeclarations {
                parts: vec![PartDeclaration::Env],
            });
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read parts file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse parts file: {}", path.display()))
    }

    pub fn save(&self, project_root: &Path) -> Result<()> {
        let path = crate::config::ConfigManager::parts_file_path(project_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize parts")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write parts file: {}", path.display()))?;
        Ok(())
    }

    /// Build the concrete parts. Reads files and walks the project, so call it
    /// off latency-sensitive threads.
    pub fn to_parts(&self, project_root: &Path, prefs: &UserPreferences) -> Vec<ConfigPart> {
        self.parts
            .iter()
            .enumerate()
            .map(|(index, declaration)| declaration.to_part(index, project_root, prefs))
            .collect()
    }
}

impl PartDeclaration {
    fn to_part(&self, index: usize, project_root: &Path, prefs: &UserPreferences) -> ConfigPart {
        match self {
            PartDeclaration::Env => DataPart::from_env().into(),
            PartDeclaration::File { path } => {
                DataPart::from_config_file(&project_root.join(path)).into()
            }
            PartDeclaration::Relative { file_name } => relative_config_part(
                project_root,
                file_name
                    .as_deref()
                    .unwrap_or(&prefs.relative_config_file_name),
            ),
            PartDeclaration::Manual {
                root,
                port,
                user,
                client,
                auth_ticket_file,
                trust_ticket_file,
                charset,
            } => {
                let fields = PartFields {
                    port: port.clone(),
                    user: user.clone(),
                    client: client.clone(),
                    auth_ticket_file: auth_ticket_file.clone(),
                    trust_ticket_file: trust_ticket_file.clone(),
                    charset: charset.clone(),
                    ..Default::default()
                };
                let part = DataPart::manual(format!("part {}", index + 1), fields);
                match root {
                    Some(root) => part.with_root(project_root.join(root)).into(),
                    None => part.into(),
                }
            }
            PartDeclaration::Fingerprint { fingerprint } => {
                DataPart::server_fingerprint(fingerprint.as_str()).into()
            }
            PartDeclaration::RequirePassword => DataPart::require_password().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PARTS: &str = r#"
[[part]]
kind = "manual"
root = "sub"
port = "ssl:perforce:1666"
client = "sub-ws"

[[part]]
kind = "fingerprint"
fingerprint = "AB:CD"

[[part]]
kind = "require-password"
"#;

    #[test]
    fn test_parse_declarations() {
        let decls: PartDeclarations = toml::from_str(PARTS).unwrap();
        assert_eq!(decls.parts.len(), 3);
        assert!(matches!(decls.parts[0], PartDeclaration::Manual { .. }));
        assert_eq!(decls.parts[2], PartDeclaration::RequirePassword);
    }

    #[test]
    fn test_missing_file_defaults_to_environment() {
        let temp = TempDir::new().unwrap();
        let decls = PartDeclarations::load(temp.path()).unwrap();
        assert_eq!(decls.parts, vec![PartDeclaration::Env]);
    }

    #[test]
    fn test_save_load_and_build() {
        let temp = TempDir::new().unwrap();
        let decls: PartDeclarations = toml::from_str(PARTS).unwrap();
        decls.save(temp.path()).unwrap();

        let loaded = PartDeclarations::load(temp.path()).unwrap();
        assert_eq!(loaded, decls);

        let parts = loaded.to_parts(temp.path(), &UserPreferences::default());
        assert_eq!(parts.len(), 3);
        match &parts[0] {
            ConfigPart::Data(data) => {
                assert_eq!(data.root(), Some(temp.path().join("sub").as_path()));
                assert_eq!(data.fields().client.as_deref(), Some("sub-ws"));
            }
            other => panic!("expected a data part, got {other:?}"),
        }
    }
}
