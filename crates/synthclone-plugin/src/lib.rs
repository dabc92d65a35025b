//! Plugin host for synthclone.
//!
//! A plugin is a stable, dotted identifier plus a root
//! [`Participant`](synthclone_session::Participant). The [`PluginManager`]
//! validates the identifier, registers the root participant with the session
//! and removes it again on unload, which cascades to everything the plugin
//! created.
//!
//! Two plugins ship with the host:
//!
//! - **zonegenerator**: fills the session with zones over a note range, with
//!   velocity, aftertouch and channel pressure layers.
//! - **trimmer**: an effect that trims silence from the start and end of a
//!   sample.
//!
//! # Example
//!
//! ```ignore
//! use synthclone_plugin::{HostConfig, PluginManager, builtin_plugins};
//!
//! let mut manager = PluginManager::new(session.clone(), HostConfig::load()?);
//! for plugin in builtin_plugins() {
//!     manager.register_plugin(plugin)?;
//! }
//! ```

pub mod builtin;
mod config;
mod runtime;
mod types;

pub use builtin::builtin_plugins;
pub use config::HostConfig;
pub use runtime::{LoadedPlugin, Plugin, PluginManager};
pub use types::{PluginError, PluginMetadata, PluginResult};
