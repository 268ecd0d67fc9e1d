//! Command handler modules
//!
//! One module per group of CLI commands. Handlers print with `colored` and
//! return `anyhow` errors for `main` to report.

pub mod pending;
pub mod preferences;
pub mod resolve;

pub use pending::{handle_discard, handle_pending};
pub use preferences::handle_set_offline;
pub use resolve::{handle_lookup, handle_resolve};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::parts::PartDeclarations;
use crate::preferences::UserPreferences;
use crate::project::Project;
use crate::resolver::ProjectConfigStack;

/// Resolve the configuration of the project at `dir`, or of the current
/// directory when none is given.
pub(crate) fn load_project(dir: Option<&Path>) -> Result<(ProjectConfigStack, UserPreferences)> {
    let root = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let root: PathBuf = root
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", root.display()))?;

    let preferences = UserPreferences::load().context("Failed to load preferences")?;
    let declarations = PartDeclarations::load(&root)?;
    log::debug!(
        "Loaded {} part declaration(s) for {}",
        declarations.parts.len(),
        root.display()
    );
    let parts = declarations.to_parts(&root, &preferences);
    Ok((ProjectConfigStack::new(Project::new(root), parts), preferences))
}
