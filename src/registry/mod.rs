//! The name -> resource table.
//!
//! A [`Registry`] is an explicit context object: whoever owns the object
//! graph owns the registry and passes it to creation and loading. Names are
//! compared case-insensitively; `Foo` and `foo` are the same entry.
//!
//! Lookups that miss are not errors: [`Registry::get`] logs a warning and
//! returns `Ok(None)` so callers can substitute a fallback.

mod index;

use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::rc::Rc;
use thiserror::Error;

use crate::persist::{self, PersistError, PersistMode};
use crate::resource::{Resource, ResourceCell, ResourceError, ResourceRef, Schema};
use crate::tags::TypeTable;

pub use index::RegistryIndex;

/// Error registering a resource.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Resources must be named before they can be registered
    #[error("cannot register an unnamed {type_name}")]
    Unnamed { type_name: String },
    /// Sub-resources belong to their parent
    #[error("'{name}' is a sub-resource and cannot be registered")]
    SubResource { name: String },
}

/// Behavior switches for a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Persist named dependencies by reference instead of inline
    pub run_mode: bool,
    /// Fail a creation cascade that loops back into itself
    pub detect_cycles: bool,
    /// Destroy dependencies created by a cascade that then failed
    pub rollback_failed_cascades: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self { run_mode: false, detect_cycles: true, rollback_failed_cascades: true }
    }
}

type CreatingCallback = Box<dyn Fn(&ResourceCell)>;

/// Case-insensitive table of named resources.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, ResourceRef>,
    index: RegistryIndex,
    options: RegistryOptions,
    creating: Option<CreatingCallback>,
    next_anonymous: u64,
}

/// Normalized registry key for a name.
pub fn registry_key(name: &str) -> String {
    name.to_lowercase()
}

impl Registry {
    /// Create an empty registry with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut RegistryOptions {
        &mut self.options
    }

    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    /// Install a callback invoked just before any resource's creation hook.
    pub fn set_creating_callback(&mut self, callback: impl Fn(&ResourceCell) + 'static) {
        self.creating = Some(Box::new(callback));
    }

    pub(crate) fn notify_creating(&self, cell: &ResourceCell) {
        if let Some(callback) = &self.creating {
            callback(cell);
        }
    }

    /// Register a named resource.
    ///
    /// Any entry previously registered under the same name is deregistered
    /// (not destroyed) and returned.
    pub fn put(&mut self, cell: ResourceRef) -> Result<Option<ResourceRef>, RegistryError> {
        let Some(name) = cell.name() else {
            error!("attempted to register an unnamed {}", cell.type_name());
            return Err(RegistryError::Unnamed { type_name: cell.type_name().to_string() });
        };
        if cell.is_sub_resource() {
            return Err(RegistryError::SubResource { name });
        }

        let key = registry_key(&name);
        let previous = self.entries.insert(key.clone(), cell.clone());
        if let Some(prev) = &previous {
            if Rc::ptr_eq(prev, &cell) {
                return Ok(None);
            }
            debug!("'{}' replaces a previous registration", name);
            self.deregistered(prev, &key);
        }

        self.registered(&cell, &key);
        Ok(previous)
    }

    fn registered(&mut self, cell: &ResourceCell, key: &str) {
        if cell.header().auto_created {
            self.index.add_auto_created(key);
        }
        if let Some(body) = cell.body() {
            body.on_register(key, &mut self.index);
        }
    }

    fn deregistered(&mut self, cell: &ResourceCell, key: &str) {
        self.index.remove_auto_created(key);
        if let Some(body) = cell.body() {
            body.on_deregister(key, &mut self.index);
        }
    }

    /// Remove an entry without destroying it.
    pub fn deregister(&mut self, name: &str) -> Option<ResourceRef> {
        let key = registry_key(name);
        let cell = self.entries.remove(&key)?;
        self.deregistered(&cell, &key);
        Some(cell)
    }

    /// Look up an entry without creating it.
    pub fn peek(&self, name: &str) -> Option<ResourceRef> {
        self.entries.get(&registry_key(name)).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(&registry_key(name))
    }

    /// Look up an entry, creating it first if necessary.
    ///
    /// Returns `Ok(None)` (and logs a warning) for unknown names; creation
    /// failures are errors.
    pub fn get(&self, name: &str) -> Result<Option<ResourceRef>, ResourceError> {
        let Some(cell) = self.peek(name) else {
            warn!("resource '{}' not found", name);
            return Ok(None);
        };
        cell.create(self)?;
        Ok(Some(cell))
    }

    /// Look up and create an entry, then borrow it as `T`.
    ///
    /// Returns `Ok(None)` when the name is unknown or the entry is not a `T`.
    pub fn with<T: Resource, R>(
        &self,
        name: &str,
        f: impl FnOnce(&T) -> R,
    ) -> Result<Option<R>, ResourceError> {
        let Some(cell) = self.get(name)? else { return Ok(None) };
        let result = cell.borrow_as::<T>().map(|body| f(&body));
        Ok(result)
    }

    /// Destroy and deregister an entry.
    pub fn remove(&mut self, name: &str) -> Option<ResourceRef> {
        let cell = self.peek(name)?;
        cell.destroy(self);
        self.deregister(name)
    }

    /// Named entries, ordered by key. Synthesized names are skipped.
    pub fn list(&self) -> Vec<ResourceRef> {
        self.entries.values().filter(|cell| !cell.header().synthetic).cloned().collect()
    }

    /// Every entry, ordered by key, anonymous ones included.
    pub fn entries(&self) -> Vec<ResourceRef> {
        self.entries.values().cloned().collect()
    }

    /// Named entries that are instances of `schema`.
    pub fn list_of(&self, schema: &'static Schema) -> Vec<ResourceRef> {
        self.list().into_iter().filter(|cell| cell.schema().is_a(schema)).collect()
    }

    /// Number of entries, synthesized names included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create every registered entry.
    pub fn create_all(&self) -> Result<(), ResourceError> {
        for cell in self.entries.values() {
            cell.create(self)?;
        }
        Ok(())
    }

    /// Create the entries marked `autoCreated`.
    pub fn create_auto_created(&self) -> Result<usize, ResourceError> {
        let mut created = 0;
        for key in self.index.auto_created() {
            if let Some(cell) = self.entries.get(key) {
                cell.create(self)?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Default entry of a type, as marked by its registration hook.
    pub fn default_of(&self, schema: &'static Schema) -> Option<ResourceRef> {
        let key = self.index.default_name(schema.type_name)?;
        self.entries.get(key).cloned()
    }

    /// Destroy every entry, optionally deregistering them too.
    pub fn reset(&mut self, deregister: bool) {
        for cell in self.entries.values() {
            cell.destroy(self);
        }

        if deregister {
            let entries = std::mem::take(&mut self.entries);
            for (key, cell) in &entries {
                self.deregistered(cell, key);
            }
        }
    }

    /// Destroy and deregister everything.
    pub fn clear(&mut self) {
        self.reset(true);
    }

    /// A fresh name for an anonymous resource: type name plus a counter.
    pub fn synthesize_name(&mut self, type_name: &str) -> String {
        loop {
            self.next_anonymous += 1;
            let name = format!("{}#{}", type_name, self.next_anonymous);
            if !self.exists(&name) {
                return name;
            }
        }
    }

    /// Persist every named entry using the mode from the options.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), PersistError> {
        let mode = if self.options.run_mode { PersistMode::Run } else { PersistMode::Definition };
        persist::save(&self.entries(), writer, mode)
    }

    /// Persist the named entries in `names`.
    pub fn save_entries<W: Write>(
        &self,
        names: &[&str],
        writer: W,
        mode: PersistMode,
    ) -> Result<(), PersistError> {
        let mut cells = Vec::with_capacity(names.len());
        for name in names {
            let cell = self
                .peek(name)
                .ok_or_else(|| PersistError::UnresolvedReference { name: name.to_string() })?;
            cells.push(cell);
        }
        persist::save(&cells, writer, mode)
    }

    /// Load a persisted stream into this registry.
    ///
    /// Returns the top-level resources read from the stream.
    pub fn load<R: Read>(
        &mut self,
        reader: R,
        types: &TypeTable,
    ) -> Result<Vec<ResourceRef>, PersistError> {
        persist::load(self, reader, types)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}
