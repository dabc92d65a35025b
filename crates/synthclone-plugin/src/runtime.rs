//! Plugin contract and the host-side manager.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use synthclone_core::ParticipantId;
use synthclone_session::{Participant, ParticipantKey, Registration, Session};

use crate::config::HostConfig;
use crate::types::{PluginError, PluginMetadata, PluginResult};

/// A loadable plugin: a stable id plus a root participant.
pub trait Plugin {
    /// Stable, dotted identifier. Also the id of the root participant.
    fn id(&self) -> &str;

    /// Descriptive information shown to users.
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::from(&self.participant().info())
    }

    /// The root participant registered with the session.
    fn participant(&self) -> Rc<dyn Participant>;
}

/// A registered plugin.
#[derive(Clone)]
pub struct LoadedPlugin {
    pub id: ParticipantId,
    pub metadata: PluginMetadata,
    /// Key of the root participant.
    pub key: ParticipantKey,
    registration: Registration<ParticipantKey>,
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

type PluginTable = Rc<RefCell<IndexMap<String, LoadedPlugin>>>;

/// Registers plugins with a session and removes them again.
///
/// Plugins are kept in registration order. A plugin whose root participant
/// is removed through the session directly is forgotten automatically.
pub struct PluginManager {
    session: Rc<Session>,
    config: HostConfig,
    plugins: PluginTable,
}

impl PluginManager {
    /// Create a manager for `session`.
    pub fn new(session: Rc<Session>, config: HostConfig) -> Self {
        Self {
            session,
            config,
            plugins: Rc::new(RefCell::new(IndexMap::new())),
        }
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Register the root participant of `plugin` under the plugin's id.
    ///
    /// The participant stays inactive until activated, either explicitly or
    /// by loading a session that saved it as active.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginResult<ParticipantKey> {
        let id = ParticipantId::parse(plugin.id()).map_err(|_| PluginError::InvalidId {
            id: plugin.id().to_string(),
        })?;
        if self.config.is_disabled(id.as_str()) {
            tracing::info!(target: "plugin", plugin = %id, "plugin disabled, skipping");
            return Err(PluginError::Disabled { id: id.to_string() });
        }
        if self.plugins.borrow().contains_key(id.as_str())
            || self.session.find_participant(id.as_str()).is_some()
        {
            return Err(PluginError::AlreadyRegistered { id: id.to_string() });
        }

        let metadata = plugin.metadata();
        let registration = self
            .session
            .add_participant(plugin.participant(), None, id.as_str());
        let key = registration.id();

        let table = Rc::downgrade(&self.plugins);
        let name = id.to_string();
        registration.on_unregistered(move |_, _| {
            if let Some(table) = table.upgrade() {
                table.borrow_mut().shift_remove(&name);
            }
        });

        tracing::info!(
            target: "plugin",
            plugin = %id,
            name = %metadata.name,
            version = %metadata.version,
            "plugin registered"
        );
        self.plugins.borrow_mut().insert(
            id.to_string(),
            LoadedPlugin {
                id,
                metadata,
                key,
                registration,
            },
        );
        Ok(key)
    }

    /// Register every plugin, logging and skipping the ones that fail.
    pub fn register_all(&mut self, plugins: impl IntoIterator<Item = Box<dyn Plugin>>) -> usize {
        let mut registered = 0;
        for plugin in plugins {
            match self.register_plugin(plugin) {
                Ok(_) => registered += 1,
                Err(PluginError::Disabled { .. }) => {}
                Err(e) => tracing::warn!(target: "plugin", error = %e, "failed to register plugin"),
            }
        }
        registered
    }

    /// Activate a registered plugin's root participant.
    pub fn activate_plugin(&self, id: &str) -> PluginResult<()> {
        let key = self.key(id)?;
        if !self.session.is_participant_active(key) {
            self.session.activate_participant(key);
        }
        Ok(())
    }

    /// Deactivate a registered plugin's root participant.
    pub fn deactivate_plugin(&self, id: &str) -> PluginResult<()> {
        let key = self.key(id)?;
        if self.session.is_participant_active(key) {
            self.session.deactivate_participant(key);
        }
        Ok(())
    }

    /// Remove a plugin, cascading to everything it created.
    pub fn unload_plugin(&mut self, id: &str) -> PluginResult<()> {
        let key = self.key(id)?;
        self.session.remove_participant(key);
        // The registration callback normally prunes the table already.
        self.plugins.borrow_mut().shift_remove(id);
        tracing::info!(target: "plugin", plugin = id, "plugin unloaded");
        Ok(())
    }

    /// Remove every plugin, most recently registered first.
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.plugins.borrow().keys().rev().cloned().collect();
        for id in ids {
            if let Err(e) = self.unload_plugin(&id) {
                tracing::warn!(target: "plugin", plugin = %id, error = %e, "failed to unload plugin");
            }
        }
    }

    pub fn plugin(&self, id: &str) -> Option<LoadedPlugin> {
        self.plugins.borrow().get(id).cloned()
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> Vec<LoadedPlugin> {
        self.plugins.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.borrow().is_empty()
    }

    fn key(&self, id: &str) -> PluginResult<ParticipantKey> {
        self.plugins
            .borrow()
            .get(id)
            .filter(|p| !p.registration.is_unregistered())
            .map(|p| p.key)
            .ok_or_else(|| PluginError::NotRegistered { id: id.to_string() })
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field("plugins", &self.plugins.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use synthclone_session::{Context, ParticipantInfo};

    struct Empty;

    impl Participant for Empty {
        fn info(&self) -> ParticipantInfo {
            ParticipantInfo {
                major_version: 1,
                ..ParticipantInfo::new("Empty")
            }
        }

        fn activate(&self, _context: &Context, _state: &Value) {}
    }

    struct TestPlugin(&'static str);

    impl Plugin for TestPlugin {
        fn id(&self) -> &str {
            self.0
        }

        fn participant(&self) -> Rc<dyn Participant> {
            Rc::new(Empty)
        }
    }

    fn manager(config: HostConfig) -> PluginManager {
        PluginManager::new(Session::new(), config)
    }

    #[test]
    fn test_register_and_unload() {
        let mut manager = manager(HostConfig::default());
        let key = manager
            .register_plugin(Box::new(TestPlugin("com.example.empty")))
            .unwrap();

        assert_eq!(manager.len(), 1);
        assert_eq!(
            manager.session().find_participant("com.example.empty"),
            Some(key)
        );
        let loaded = manager.plugin("com.example.empty").unwrap();
        assert_eq!(loaded.metadata.name, "Empty");
        assert_eq!(loaded.metadata.version, "1.0.0");

        manager.unload_plugin("com.example.empty").unwrap();
        assert!(manager.is_empty());
        assert!(!manager.session().has_participant(key));
    }

    #[test]
    fn test_rejects_invalid_id() {
        let mut manager = manager(HostConfig::default());
        let result = manager.register_plugin(Box::new(TestPlugin("com..example")));
        assert!(matches!(result, Err(PluginError::InvalidId { .. })));
        assert_eq!(manager.session().participant_count(None), 0);
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut manager = manager(HostConfig::default());
        manager
            .register_plugin(Box::new(TestPlugin("com.example.empty")))
            .unwrap();
        let result = manager.register_plugin(Box::new(TestPlugin("com.example.empty")));
        assert!(matches!(result, Err(PluginError::AlreadyRegistered { .. })));
    }

    #[test]
    fn test_skips_disabled() {
        let config = HostConfig::default().disable_plugin("com.example.off");
        let mut manager = manager(config);
        let registered = manager.register_all([
            Box::new(TestPlugin("com.example.on")) as Box<dyn Plugin>,
            Box::new(TestPlugin("com.example.off")),
        ]);
        assert_eq!(registered, 1);
        assert!(manager.plugin("com.example.off").is_none());
    }

    #[test]
    fn test_forgets_participant_removed_by_session() {
        let mut manager = manager(HostConfig::default());
        let key = manager
            .register_plugin(Box::new(TestPlugin("com.example.empty")))
            .unwrap();
        manager.session().remove_participant(key);
        assert!(manager.is_empty());
        assert!(matches!(
            manager.activate_plugin("com.example.empty"),
            Err(PluginError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_shutdown_unloads_in_reverse() {
        let mut manager = manager(HostConfig::default());
        manager
            .register_plugin(Box::new(TestPlugin("com.example.a")))
            .unwrap();
        manager
            .register_plugin(Box::new(TestPlugin("com.example.b")))
            .unwrap();
        manager.activate_plugin("com.example.a").unwrap();

        manager.shutdown();
        assert!(manager.is_empty());
        assert_eq!(manager.session().participant_count(None), 0);
    }
}
