//! Tag and type tables.
//!
//! Markup elements name their type through a tag (`<colormap>`), or
//! explicitly through `<instance class="ColorMap">`. [`TypeTable`] holds the
//! registered types with their constructors, the global tag map, the
//! canonical tag each type is written back as, and a stack of scoped
//! overlays used for document-local mappings.

use std::collections::HashMap;
use thiserror::Error;

use crate::resource::{Resource, Schema};

/// The declaration tag that cannot be remapped.
pub const RESERVED_MAP_TAG: &str = "map";

/// Constructor taking the declared `name`.
pub type NamedCtor = fn(&str) -> Box<dyn Resource>;

/// Constructor taking no arguments.
pub type DefaultCtor = fn() -> Box<dyn Resource>;

/// A constructible resource type.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub schema: &'static Schema,
    pub named_ctor: Option<NamedCtor>,
    pub default_ctor: Option<DefaultCtor>,
}

impl TypeInfo {
    /// A type built with a no-argument constructor.
    pub const fn new(schema: &'static Schema, ctor: DefaultCtor) -> Self {
        Self { schema, named_ctor: None, default_ctor: Some(ctor) }
    }

    pub const fn with_named(mut self, ctor: NamedCtor) -> Self {
        self.named_ctor = Some(ctor);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.schema.type_name
    }

    /// Build an empty body, preferring the named constructor when a name is
    /// given. `None` when the type has no constructor of a usable shape.
    pub fn construct(&self, name: Option<&str>) -> Option<Box<dyn Resource>> {
        match (name, self.named_ctor, self.default_ctor) {
            (Some(name), Some(named), _) => Some(named(name)),
            (_, _, Some(default)) => Some(default()),
            _ => None,
        }
    }
}

/// Error manipulating the tag tables.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TagError {
    /// Attempt to remap the `map` declaration itself
    #[error("tag '{0}' is reserved")]
    Reserved(String),
    /// Mapping target is not a registered type
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// `pop_scope` without a matching `push_scope`
    #[error("no tag scope to pop")]
    NoScope,
}

/// Registered types plus the tag ↔ type maps.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: HashMap<String, TypeInfo>,
    tags: HashMap<String, String>,
    canonical: HashMap<String, String>,
    scopes: Vec<HashMap<String, String>>,
}

fn key(s: &str) -> String {
    s.to_ascii_lowercase()
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in asset types and their tags.
    pub fn with_builtin() -> Self {
        let mut table = Self::new();
        crate::assets::register_builtin(&mut table);
        table
    }

    /// Register a type under its schema's type name.
    pub fn register(&mut self, info: TypeInfo) {
        self.types.insert(key(info.type_name()), info);
    }

    /// Register `tag` as the canonical tag of `type_name` and map it.
    pub fn register_tag(&mut self, type_name: &str, tag: &str) -> Result<(), TagError> {
        self.map(tag, type_name)?;
        self.canonical.insert(key(type_name), tag.to_string());
        Ok(())
    }

    /// Map `tag` to `type_name` globally.
    pub fn map(&mut self, tag: &str, type_name: &str) -> Result<(), TagError> {
        let target = self.checked_target(tag, type_name)?;
        self.tags.insert(key(tag), target);
        Ok(())
    }

    /// Map `tag` to `type_name` in the innermost scope only.
    ///
    /// Falls back to a global mapping when no scope is open.
    pub fn map_scoped(&mut self, tag: &str, type_name: &str) -> Result<(), TagError> {
        let target = self.checked_target(tag, type_name)?;
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(key(tag), target);
            }
            None => {
                self.tags.insert(key(tag), target);
            }
        }
        Ok(())
    }

    fn checked_target(&self, tag: &str, type_name: &str) -> Result<String, TagError> {
        if tag.eq_ignore_ascii_case(RESERVED_MAP_TAG) {
            return Err(TagError::Reserved(tag.to_string()));
        }
        let target = key(type_name);
        if !self.types.contains_key(&target) {
            return Err(TagError::UnknownType(type_name.to_string()));
        }
        Ok(target)
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) -> Result<(), TagError> {
        self.scopes.pop().map(|_| ()).ok_or(TagError::NoScope)
    }

    /// Resolve a tag through the open scopes, innermost first, then the
    /// global map.
    pub fn resolve_tag(&self, tag: &str) -> Option<&TypeInfo> {
        let tag = key(tag);
        let type_key = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&tag))
            .or_else(|| self.tags.get(&tag))?;
        self.types.get(type_key)
    }

    pub fn type_info(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(&key(type_name))
    }

    /// Canonical tag for writing `type_name` back to markup.
    pub fn tag_for(&self, type_name: &str) -> Option<&str> {
        self.canonical.get(&key(type_name)).map(String::as_str)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.types.values().map(TypeInfo::type_name).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{Probe, PROBE, SUB_PROBE};

    fn new_probe() -> Box<dyn Resource> {
        Box::new(Probe::new())
    }

    fn new_sub_probe() -> Box<dyn Resource> {
        Box::new(Probe::of(&SUB_PROBE))
    }

    fn table() -> TypeTable {
        let mut table = TypeTable::new();
        table.register(TypeInfo::new(&PROBE, new_probe));
        table.register(TypeInfo::new(&SUB_PROBE, new_sub_probe));
        table
    }

    #[test]
    fn test_register_tag_is_canonical() {
        let mut table = table();
        table.register_tag("Probe", "probe").unwrap();
        table.map("p", "probe").unwrap();

        assert_eq!(table.resolve_tag("P").unwrap().type_name(), "Probe");
        assert_eq!(table.tag_for("PROBE"), Some("probe"));
        assert_eq!(table.tag_for("SubProbe"), None);
    }

    #[test]
    fn test_map_rejects_reserved_and_unknown() {
        let mut table = table();
        assert_eq!(table.map("Map", "Probe"), Err(TagError::Reserved("Map".to_string())));
        assert_eq!(table.map("x", "Nothing"), Err(TagError::UnknownType("Nothing".to_string())));
        assert!(table.resolve_tag("x").is_none());
    }

    #[test]
    fn test_scoped_mapping_shadows_global() {
        let mut table = table();
        table.map("thing", "Probe").unwrap();

        table.push_scope();
        table.map_scoped("thing", "SubProbe").unwrap();
        table.map_scoped("local", "Probe").unwrap();
        assert_eq!(table.resolve_tag("thing").unwrap().type_name(), "SubProbe");
        assert!(table.resolve_tag("local").is_some());

        table.pop_scope().unwrap();
        assert_eq!(table.resolve_tag("thing").unwrap().type_name(), "Probe");
        assert!(table.resolve_tag("local").is_none());
        assert_eq!(table.pop_scope(), Err(TagError::NoScope));
    }

    #[test]
    fn test_global_map_inside_scope_survives_pop() {
        let mut table = table();
        table.push_scope();
        table.map("kept", "Probe").unwrap();
        table.pop_scope().unwrap();
        assert!(table.resolve_tag("kept").is_some());
    }

    #[test]
    fn test_construct_prefers_named() {
        fn named(_: &str) -> Box<dyn Resource> {
            Box::new(Probe::of(&SUB_PROBE))
        }
        let both = TypeInfo::new(&PROBE, new_probe).with_named(named);
        assert_eq!(both.construct(Some("x")).unwrap().schema().type_name, "SubProbe");
        assert_eq!(both.construct(None).unwrap().schema().type_name, "Probe");

        let named_only = TypeInfo { schema: &PROBE, named_ctor: Some(named), default_ctor: None };
        assert!(named_only.construct(None).is_none());
    }

    #[test]
    fn test_builtin_table() {
        let table = TypeTable::with_builtin();
        assert_eq!(table.resolve_tag("colormap").unwrap().type_name(), "ColorMap");
        assert_eq!(table.tag_for("AnimatedSprite"), Some("animsprite"));
        assert!(table.type_info("image").is_some());
    }
}
