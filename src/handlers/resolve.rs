//! Configuration inspection handlers

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use super::load_project;
use crate::client::ClientConfigSetup;

/// Print the directory map, every setup and every problem of a project.
pub fn handle_resolve(project: Option<&Path>) -> Result<()> {
    let (stack, _) = load_project(project)?;
    let snapshot = stack.snapshot();

    println!(
        "{} {}",
        "Project:".cyan().bold(),
        stack.project().root().display()
    );
    println!("{}", "=".repeat(80).cyan());

    if snapshot.is_empty() {
        println!("{}", "No directory resolved to a client workspace.".yellow());
    } else {
        println!("\n{}", "Directories".bold());
        for (dir, config) in snapshot.directories() {
            println!(
                "  {} {} {}",
                dir.display(),
                "->".dimmed(),
                config.to_string().green()
            );
        }
    }

    println!("\n{}", "Setups".bold());
    for setup in snapshot.setups() {
        print_setup(setup);
    }

    if !snapshot.problems().is_empty() {
        println!("\n{}", "Problems".red().bold());
        for problem in snapshot.problems() {
            println!("  {} {}", "!".red(), problem);
        }
    }
    Ok(())
}

fn print_setup(setup: &ClientConfigSetup) {
    let status = if setup.is_valid() {
        "valid".green()
    } else {
        "invalid".red()
    };
    let name = setup
        .client_config()
        .map(|c| c.to_string())
        .or_else(|| setup.source().fields().client.clone())
        .unwrap_or_else(|| "(no client)".to_string());
    println!("  {} [{}]", name.bold(), status);
    println!("     {} {}", "Scope:".dimmed(), setup.source().root().display());
    for root in setup.roots() {
        println!("     {} {}", "Root:".dimmed(), root.display());
    }
    for problem in setup.problems() {
        println!("     {} {}", "Problem:".dimmed(), problem.message().red());
    }
}

/// Print the client configuration governing `file`.
pub fn handle_lookup(file: &Path, project: Option<&Path>) -> Result<()> {
    let (stack, _) = load_project(project)?;
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(file)
    };

    match stack.client_config_for(&file) {
        Some(config) => {
            println!("{} {}", "Client:".dimmed(), config.client_name().green().bold());
            println!("{} {}", "Server:".dimmed(), config.server_config());
            println!("{} {}", "Server id:".dimmed(), config.server_config().server_id());
            for root in config.roots() {
                println!("{} {}", "Root:".dimmed(), root.display());
            }
        }
        None => println!(
            "{} {}",
            "No client workspace configured for".yellow(),
            file.display()
        ),
    }
    Ok(())
}
