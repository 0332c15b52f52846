//! Auxiliary indices maintained by registration hooks.

use std::collections::{BTreeSet, HashMap};

/// Side tables kept in step with the registry.
///
/// The registry maintains the auto-created set itself; resource types keep
/// per-type defaults through their `on_register`/`on_deregister` hooks.
#[derive(Debug, Default, Clone)]
pub struct RegistryIndex {
    defaults: HashMap<&'static str, String>,
    auto_created: BTreeSet<String>,
}

impl RegistryIndex {
    /// Mark `name` as the default resource of its type.
    pub fn set_default(&mut self, type_name: &'static str, name: &str) {
        self.defaults.insert(type_name, name.to_lowercase());
    }

    /// Forget the default for `type_name` if it is `name`.
    pub fn clear_default(&mut self, type_name: &'static str, name: &str) {
        if self.defaults.get(type_name).is_some_and(|n| n.eq_ignore_ascii_case(name)) {
            self.defaults.remove(type_name);
        }
    }

    /// Registry key of the default resource of `type_name`.
    pub fn default_name(&self, type_name: &str) -> Option<&str> {
        self.defaults.get(type_name).map(String::as_str)
    }

    pub(crate) fn add_auto_created(&mut self, key: &str) {
        self.auto_created.insert(key.to_string());
    }

    pub(crate) fn remove_auto_created(&mut self, key: &str) {
        self.auto_created.remove(key);
    }

    /// Registry keys of entries marked `autoCreated`.
    pub fn auto_created(&self) -> impl Iterator<Item = &str> {
        self.auto_created.iter().map(String::as_str)
    }
}
