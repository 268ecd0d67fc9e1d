//! Preference handlers

use anyhow::{Context, Result};
use colored::Colorize;

use crate::preferences::UserPreferences;

/// Set whether new connections start offline.
pub fn handle_set_offline(offline: bool) -> Result<()> {
    let mut preferences = UserPreferences::load().context("Failed to load preferences")?;
    preferences.auto_offline = offline;
    preferences.save()?;

    let mode = if offline { "offline".yellow() } else { "online".green() };
    println!("New connections will start {mode}");
    Ok(())
}
