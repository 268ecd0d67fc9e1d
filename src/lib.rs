//! # p4-workspace
//!
//! Resolves which Perforce client workspace governs each directory of a local
//! project, and keeps a per-workspace cache that stays usable while the server
//! is out of reach.
//!
//! ## Overview
//!
//! A project's configuration comes from a prioritized list of config parts
//! (environment variables, P4CONFIG files found in the tree, manual entries,
//! fingerprint and password requirements). `p4-workspace` merges those parts
//! per directory, validates them, and publishes an immutable snapshot mapping
//! directories to client configurations. Each distinct client workspace gets
//! one shared connection that can work online or offline; changes made while
//! offline are queued, persisted, and sent to the server later.
//!
//! ## Key Features
//!
//! - **Nearest-scope lookup**: the closest configured ancestor directory decides a file's client
//! - **Shared identities**: equal server and client configurations are the same object across refreshes
//! - **Problem reporting**: bad configuration is reported as data and only disables the affected setup
//! - **Offline work**: reads fall back to the cache, mutations queue up and survive restarts
//! - **Reconciliation**: queued changes are replayed in order, creating local changelists on the way
//!
//! ## Architecture
//!
//! - Configuration input ([`parts`], [`preferences`], [`config`])
//! - Resolution ([`server`], [`client`], [`resolver`])
//! - Connection and cache ([`connection`], [`cache`], [`changelist`], [`cancel`])
//! - Front end ([`workspace`], [`handlers`], [`logger`])

/// Platform-agnostic configuration directory management for p4-workspace.
///
/// Locates the user configuration directory (XDG on Linux, Application
/// Support on macOS, AppData on Windows) and the per-project storage
/// directory holding part declarations and caches.
pub mod config;

/// Per-client cache of server state and the queue of pending updates.
///
/// Holds opened files, changelists, jobs and workspace roots as the server
/// last reported them, and overlays queued local mutations on top so callers
/// see their own changes immediately. Persisted as JSON per client workspace.
pub mod cache;

/// Cooperative cancellation for resolution and server round-trips.
pub mod cancel;

/// Changelist ids, including the local ids reserved before the server
/// assigns a number.
pub mod changelist;

/// Client workspace configurations and the diagnostic setups they come from.
pub mod client;

/// Online/offline connections to client workspaces.
///
/// Provides the execution seam to the server, the shared connection per
/// client workspace, reconciliation of the pending queue, and the
/// deduplicated authentication failure flow.
pub mod connection;

/// Error taxonomy for server and connection failures.
pub mod error;

/// Command handlers used by the `p4-workspace` binary.
pub mod handlers;

/// Logging configuration and utilities.
///
/// Sets up console logging (configurable via `RUST_LOG`) and a persistent log
/// file in the config directory, with rotation once the file grows too large.
pub mod logger;

/// Configuration parts: the raw, prioritized inputs to resolution.
///
/// Data parts carry field values and an optional directory scope; composite
/// parts group other parts in priority order. Includes the concrete sources
/// (environment, P4CONFIG files, relative files, manual entries) and the
/// `parts.toml` declarations that build them.
pub mod parts;

/// User preferences shared by every project.
pub mod preferences;

/// Projects and their source directories.
pub mod project;

/// Turns a part tree into the directory to client configuration map.
///
/// Resolution is a pure function from parts and project to an immutable
/// snapshot; [`resolver::ProjectConfigStack`] republishes snapshots on
/// refresh while readers keep using the previous one.
pub mod resolver;

/// Server names, server configurations and their identity keys.
pub mod server;

/// High level operations on one client workspace.
pub mod workspace;

pub use error::{P4Error, P4Result};
