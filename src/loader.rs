//! Markup → registry.
//!
//! A [`Loader`] walks a document's top-level declarations:
//!
//! - `<map tag=".." class=".."/>` maps a tag to a type (`local="true"` keeps
//!   the mapping inside the current document)
//! - `<include resource=".."/>` loads another document once per loader
//! - `<property key=".." value=".."/>` defines a key for the conditionals
//! - `<ifdef key=".." [value=".."]>` / `<ifndef ..>` guard their children
//! - `<instance class=".." ..>` declares a resource by type name
//! - any other tag declares a resource of the type the tag maps to
//!
//! Resource attributes are assigned through the type's schema. Child
//! elements are offered to the type first; the rest become owned inline
//! sub-resources filling a dependency slot.

use log::{debug, info, trace};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::include::{self, IncludeError, DEFAULT_EXTENSIONS};
use crate::markup::{parse_document, Element, MarkupError};
use crate::registry::{Registry, RegistryError};
use crate::resource::{
    AttributeError, Dependency, Header, Resource, ResourceCell, ResourceError, ResourceRef,
};
use crate::tags::{TagError, TypeInfo, TypeTable};
use crate::value::ValueType;

/// Attributes every resource element may carry besides its schema's.
pub const RESERVED_ATTRIBUTES: &[&str] = &["name", "autoCreated", "inherit", "locked"];

/// Error loading a document.
///
/// Every variant tied to an element carries its `<tag name="..">` form.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// Document could not be read
    #[error("cannot read '{}': {message}", .path.display())]
    Io { path: PathBuf, message: String },
    /// Document is not well-formed
    #[error("{origin}: {source}")]
    Markup {
        origin: String,
        #[source]
        source: MarkupError,
    },
    #[error("{element}: {source}")]
    Include {
        element: String,
        #[source]
        source: IncludeError,
    },
    /// Tag is neither a declaration nor mapped to a type
    #[error("{element}: unknown tag")]
    UnknownTag { element: String },
    /// `<instance class>` names an unregistered type
    #[error("{element}: unknown type '{class}'")]
    UnknownType { element: String, class: String },
    /// Declaration lacks an attribute it needs
    #[error("{element}: missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: &'static str },
    #[error("{element}: {source}")]
    Tag {
        element: String,
        #[source]
        source: TagError,
    },
    /// Type cannot be constructed with or without the given name
    #[error("{element}: type '{type_name}' has no usable constructor")]
    NoConstructor { element: String, type_name: String },
    #[error("{element}: {source}")]
    Attribute {
        element: String,
        #[source]
        source: AttributeError,
    },
    /// Inline child fits no dependency slot of its parent
    #[error("{element}: child {child} fits no dependency slot")]
    UnplacedChild { element: String, child: String },
    /// Name already registered and overwrite is off
    #[error("{element}: a resource named '{name}' already exists")]
    DuplicateName { element: String, name: String },
    /// Overwrite reload would change the resource's type
    #[error("{element}: '{name}' is a {previous}, cannot reload it as a {found}")]
    TypeChanged { element: String, name: String, previous: String, found: String },
    #[error("{element}: {source}")]
    Registry {
        element: String,
        #[source]
        source: RegistryError,
    },
    /// Re-creating a reloaded resource failed
    #[error("{element}: {source}")]
    Resource {
        element: String,
        #[source]
        source: ResourceError,
    },
}

type Listener<'a> = Box<dyn FnMut(&ResourceRef) + 'a>;

/// Loads markup documents into a registry.
pub struct Loader<'a> {
    registry: &'a mut Registry,
    types: &'a mut TypeTable,
    overwrite: bool,
    properties: HashMap<String, String>,
    extensions: Vec<String>,
    included: HashSet<PathBuf>,
    listener: Option<Listener<'a>>,
}

impl<'a> Loader<'a> {
    pub fn new(registry: &'a mut Registry, types: &'a mut TypeTable) -> Self {
        Self {
            registry,
            types,
            overwrite: false,
            properties: HashMap::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            included: HashSet::new(),
            listener: None,
        }
    }

    /// Reload existing names in place instead of failing.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Extensions tried for include paths written without one.
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Seed the key/value store used by `ifdef`/`ifndef`.
    pub fn properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Called once per loaded top-level resource.
    pub fn on_loaded(mut self, listener: impl FnMut(&ResourceRef) + 'a) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn define(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Load a document file.
    ///
    /// A file already loaded or included by this loader is skipped.
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<ResourceRef>, LoadError> {
        let io =
            |e: std::io::Error| LoadError::Io { path: path.to_path_buf(), message: e.to_string() };
        let canonical = path.canonicalize().map_err(io)?;
        if !self.included.insert(canonical.clone()) {
            debug!("'{}' already loaded", canonical.display());
            return Ok(Vec::new());
        }

        let source = std::fs::read_to_string(&canonical).map_err(io)?;
        let base = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        info!("loading '{}'", canonical.display());
        self.load_document(&source, &canonical.display().to_string(), &base)
    }

    /// Load an anonymous document; includes resolve relative to `base`.
    pub fn load_str(&mut self, source: &str, base: &Path) -> Result<Vec<ResourceRef>, LoadError> {
        self.load_document(source, "<string>", base)
    }

    fn load_document(
        &mut self,
        source: &str,
        origin: &str,
        base: &Path,
    ) -> Result<Vec<ResourceRef>, LoadError> {
        let root = parse_document(source)
            .map_err(|source| LoadError::Markup { origin: origin.to_string(), source })?;

        self.types.push_scope();
        let mut loaded = Vec::new();
        let result = self.process_all(&root.children, base, &mut loaded);
        if self.types.pop_scope().is_err() {
            debug!("tag scope already closed for {}", origin);
        }
        result.map(|_| loaded)
    }

    fn process_all(
        &mut self,
        elements: &[Element],
        base: &Path,
        loaded: &mut Vec<ResourceRef>,
    ) -> Result<(), LoadError> {
        for element in elements {
            self.process(element, base, loaded)?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        element: &Element,
        base: &Path,
        loaded: &mut Vec<ResourceRef>,
    ) -> Result<(), LoadError> {
        match element.tag.to_ascii_lowercase().as_str() {
            "map" => self.declare_map(element),
            "include" => self.include(element, base, loaded),
            "property" => {
                let key = required(element, "key")?;
                let value = element.attr("value").unwrap_or_default();
                self.define(key, value);
                Ok(())
            }
            "ifdef" | "ifndef" => {
                let key = required(element, "key")?;
                let defined = match element.attr("value") {
                    Some(value) => self.property(key) == Some(value),
                    None => self.property(key).is_some(),
                };
                if defined == element.is("ifdef") {
                    self.process_all(&element.children, base, loaded)?;
                } else {
                    trace!("skipping {}", element.describe());
                }
                Ok(())
            }
            _ => {
                if let Some(cell) = self.load_top_level(element)? {
                    loaded.push(cell);
                }
                Ok(())
            }
        }
    }

    fn declare_map(&mut self, element: &Element) -> Result<(), LoadError> {
        let tag = required(element, "tag")?;
        let class = required(element, "class")?;
        let local = flag(element, "local")?;
        let mapped = if local { self.types.map_scoped(tag, class) } else { self.types.map(tag, class) };
        mapped.map_err(|source| LoadError::Tag { element: element.describe(), source })
    }

    fn include(
        &mut self,
        element: &Element,
        base: &Path,
        loaded: &mut Vec<ResourceRef>,
    ) -> Result<(), LoadError> {
        let resource = required(element, "resource")?;
        let include_err = |source| LoadError::Include { element: element.describe(), source };

        let path = include::resolve_include_with_detection(
            resource,
            base,
            &self.extensions,
            &mut self.included,
        )
        .map_err(include_err)?;
        let Some(path) = path else {
            debug!("'{}' already included", resource);
            return Ok(());
        };

        let source = include::read_include(&path).map_err(include_err)?;
        let nested_base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut nested = self.load_document(&source, &path.display().to_string(), &nested_base)?;
        loaded.append(&mut nested);
        Ok(())
    }

    fn type_for(&self, element: &Element) -> Result<TypeInfo, LoadError> {
        if element.is("instance") {
            let class = required(element, "class")?;
            return self.types.type_info(class).copied().ok_or_else(|| LoadError::UnknownType {
                element: element.describe(),
                class: class.to_string(),
            });
        }
        self.types
            .resolve_tag(&element.tag)
            .copied()
            .ok_or_else(|| LoadError::UnknownTag { element: element.describe() })
    }

    /// Build a resource body and header from an element, without registering.
    fn build(&self, element: &Element) -> Result<(Box<dyn Resource>, Header), LoadError> {
        let info = self.type_for(element)?;
        let attribute_err = |source| LoadError::Attribute { element: element.describe(), source };

        let name = element.attr("name");
        let mut body = info.construct(name).ok_or_else(|| LoadError::NoConstructor {
            element: element.describe(),
            type_name: info.type_name().to_string(),
        })?;

        let header = Header {
            name: name.map(str::to_string),
            locked: flag(element, "locked")?,
            auto_created: flag(element, "autoCreated")?,
            inherit: element.attr("inherit").map(str::to_string),
            ..Header::default()
        };

        let schema = info.schema;
        for (key, value) in &element.attributes {
            if is_reserved(key) || (element.is("instance") && key.eq_ignore_ascii_case("class")) {
                continue;
            }
            let props = body.properties_mut();
            if schema.dependency(key).is_some() {
                props.set_dependency_name(key, value.as_str()).map_err(attribute_err)?;
            } else {
                props.set_markup(key, value).map_err(attribute_err)?;
            }
        }

        for child in &element.children {
            if body.load_child(child).map_err(attribute_err)? {
                continue;
            }
            self.attach_child(element, body.as_mut(), child)?;
        }

        // A template may still supply required values.
        if header.inherit.is_none() {
            if let Some(missing) = body.properties().missing_required().first() {
                return Err(attribute_err(AttributeError::Missing {
                    type_name: info.type_name().to_string(),
                    attribute: missing.to_string(),
                }));
            }
        }

        Ok((body, header))
    }

    /// Load `child` as an owned sub-resource of `parent`.
    fn attach_child(
        &self,
        element: &Element,
        parent: &mut dyn Resource,
        child: &Element,
    ) -> Result<(), LoadError> {
        let (child_body, mut child_header) = self.build(child)?;
        child_header.sub_resource = true;
        let child_cell = ResourceCell::new(child_body, child_header);
        let child_schema = child_cell.schema();

        let props = parent.properties_mut();
        let slot = match child.attr("slot") {
            Some(slot) => {
                let spec = props.schema().dependency(slot).ok_or_else(|| LoadError::Attribute {
                    element: element.describe(),
                    source: AttributeError::Unknown {
                        type_name: props.schema().type_name.to_string(),
                        attribute: slot.to_string(),
                    },
                })?;
                if !child_schema.is_a(spec.target) {
                    return Err(LoadError::UnplacedChild {
                        element: element.describe(),
                        child: child.describe(),
                    });
                }
                spec.attribute
            }
            None => props
                .schema()
                .dependencies_chain()
                .find(|spec| {
                    child_schema.is_a(spec.target)
                        && !props.dependency(spec.attribute).is_some_and(|d| d.is_set())
                })
                .map(|spec| spec.attribute)
                .ok_or_else(|| LoadError::UnplacedChild {
                    element: element.describe(),
                    child: child.describe(),
                })?,
        };

        let dependency = props.dependency_mut(slot).map_err(|source| LoadError::Attribute {
            element: element.describe(),
            source,
        })?;
        *dependency = Dependency::owned(child_cell);
        Ok(())
    }

    /// Build and register a top-level resource.
    ///
    /// Returns `None` when a locked resource was left untouched.
    fn load_top_level(&mut self, element: &Element) -> Result<Option<ResourceRef>, LoadError> {
        let (body, mut header) = self.build(element)?;
        let describe = || element.describe();

        let name = match header.name.clone() {
            Some(name) => name,
            None => {
                let name = self.registry.synthesize_name(body.schema().type_name);
                header.name = Some(name.clone());
                header.synthetic = true;
                name
            }
        };

        let cell = match self.registry.peek(&name) {
            Some(_) if !self.overwrite => {
                return Err(LoadError::DuplicateName { element: describe(), name });
            }
            Some(existing) => {
                if existing.is_locked() {
                    debug!("'{}' is locked; skipping reload", name);
                    return Ok(None);
                }
                if !std::ptr::eq(existing.schema(), body.schema()) {
                    return Err(LoadError::TypeChanged {
                        element: describe(),
                        name,
                        previous: existing.type_name().to_string(),
                        found: body.schema().type_name.to_string(),
                    });
                }
                self.reload(&existing, body, header, element)?;
                existing
            }
            None => {
                let cell = ResourceCell::new(body, header);
                self.registry
                    .put(cell.clone())
                    .map_err(|source| LoadError::Registry { element: describe(), source })?;
                cell
            }
        };

        trace!("loaded {}", element.describe());
        if let Some(listener) = self.listener.as_mut() {
            listener(&cell);
        }
        Ok(Some(cell))
    }

    /// Replace an existing resource's state, keeping its identity.
    fn reload(
        &mut self,
        existing: &ResourceRef,
        body: Box<dyn Resource>,
        header: Header,
        element: &Element,
    ) -> Result<(), LoadError> {
        let name = existing.label();
        let was_created = existing.is_created();
        if was_created {
            existing.destroy(self.registry);
        }
        self.registry.deregister(&name);

        existing
            .replace_body(body, header)
            .map_err(|source| LoadError::Resource { element: element.describe(), source })?;
        self.registry
            .put(existing.clone())
            .map_err(|source| LoadError::Registry { element: element.describe(), source })?;

        if was_created {
            existing
                .create(self.registry)
                .map_err(|source| LoadError::Resource { element: element.describe(), source })?;
        }
        info!("reloaded '{}'", name);
        Ok(())
    }
}

fn required<'e>(element: &'e Element, attribute: &'static str) -> Result<&'e str, LoadError> {
    element
        .attr(attribute)
        .ok_or_else(|| LoadError::MissingAttribute { element: element.describe(), attribute })
}

fn is_reserved(key: &str) -> bool {
    RESERVED_ATTRIBUTES.iter().any(|r| r.eq_ignore_ascii_case(key))
        || key.eq_ignore_ascii_case("slot")
}

fn parse_flag(element: &Element, attribute: &str, raw: &str) -> Result<bool, LoadError> {
    match ValueType::Bool.parse(raw) {
        Ok(value) => Ok(value.as_bool().unwrap_or(false)),
        Err(source) => Err(LoadError::Attribute {
            element: element.describe(),
            source: AttributeError::Invalid { attribute: attribute.to_string(), source },
        }),
    }
}

fn flag(element: &Element, attribute: &str) -> Result<bool, LoadError> {
    match element.attr(attribute) {
        Some(raw) => parse_flag(element, attribute, raw),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{counts, Probe, PROBE, STRANGER, SUB_PROBE};
    use crate::value::Value;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn new_probe() -> Box<dyn Resource> {
        Box::new(Probe::new())
    }

    fn new_sub_probe() -> Box<dyn Resource> {
        Box::new(Probe::of(&SUB_PROBE))
    }

    fn new_stranger() -> Box<dyn Resource> {
        Box::new(Probe::of(&STRANGER))
    }

    fn types() -> TypeTable {
        let mut types = TypeTable::new();
        types.register(TypeInfo::new(&PROBE, new_probe));
        types.register(TypeInfo::new(&SUB_PROBE, new_sub_probe));
        types.register(TypeInfo::new(&STRANGER, new_stranger));
        types.register_tag("Probe", "probe").unwrap();
        types.register_tag("SubProbe", "subprobe").unwrap();
        types
    }

    fn load(
        registry: &mut Registry,
        types: &mut TypeTable,
        source: &str,
    ) -> Result<Vec<ResourceRef>, LoadError> {
        Loader::new(registry, types).load_str(source, Path::new("."))
    }

    fn int(cell: &ResourceCell, name: &str) -> Option<i64> {
        cell.body().unwrap().properties().int(name)
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    #[test]
    fn test_load_tagged_and_instance() {
        let mut registry = Registry::new();
        let mut types = types();
        let loaded = load(
            &mut registry,
            &mut types,
            r#"<resources>
                 <probe name="a" level="3" dep="b"/>
                 <instance class="Probe" name="b" label="hello"/>
               </resources>"#,
        )
        .unwrap();

        assert_eq!(loaded.len(), 2);
        let a = registry.peek("A").unwrap();
        assert_eq!(int(&a, "level"), Some(3));
        assert_eq!(
            a.body().unwrap().properties().dependency("dep").unwrap().name.as_deref(),
            Some("b")
        );
        assert!(!a.is_created());
        assert!(registry.exists("b"));
    }

    #[test]
    fn test_unknown_tag_and_class() {
        let mut registry = Registry::new();
        let mut types = types();
        let err = load(&mut registry, &mut types, r#"<r><widget name="w"/></r>"#).unwrap_err();
        assert!(matches!(err, LoadError::UnknownTag { ref element } if element.contains("widget")));

        let err =
            load(&mut registry, &mut types, r#"<r><instance class="Widget"/></r>"#).unwrap_err();
        assert!(matches!(err, LoadError::UnknownType { .. }));
    }

    #[test]
    fn test_map_declaration() {
        let mut registry = Registry::new();
        let mut types = types();
        load(
            &mut registry,
            &mut types,
            r#"<r><map tag="thing" class="SubProbe"/><thing name="t" extra="4"/></r>"#,
        )
        .unwrap();
        assert_eq!(registry.peek("t").unwrap().type_name(), "SubProbe");
        assert!(types.resolve_tag("thing").is_some());

        let err = load(&mut registry, &mut types, r#"<r><map tag="map" class="Probe"/></r>"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::Tag { source: TagError::Reserved(_), .. }));
    }

    #[test]
    fn test_local_map_is_document_scoped() {
        let mut registry = Registry::new();
        let mut types = types();
        load(
            &mut registry,
            &mut types,
            r#"<r><map tag="local" class="Probe" local="true"/><local name="l"/></r>"#,
        )
        .unwrap();
        assert!(registry.exists("l"));
        assert!(types.resolve_tag("local").is_none());
    }

    #[test]
    fn test_conditionals() {
        let mut registry = Registry::new();
        let mut types = types();
        let mut loader = Loader::new(&mut registry, &mut types);
        loader.define("platform", "desktop");
        loader
            .load_str(
                r#"<r>
                     <ifdef key="platform"><probe name="any"/></ifdef>
                     <ifdef key="platform" value="mobile"><probe name="mobile"/></ifdef>
                     <ifndef key="platform" value="mobile"><probe name="notmobile"/></ifndef>
                     <ifndef key="debug"><probe name="release"/></ifndef>
                     <property key="debug" value="1"/>
                     <ifdef key="debug"><probe name="debug"/></ifdef>
                   </r>"#,
                Path::new("."),
            )
            .unwrap();
        drop(loader);

        assert!(registry.exists("any"));
        assert!(!registry.exists("mobile"));
        assert!(registry.exists("notmobile"));
        assert!(registry.exists("release"));
        assert!(registry.exists("debug"));
    }

    #[test]
    fn test_reserved_attributes() {
        let mut registry = Registry::new();
        let mut types = types();
        load(
            &mut registry,
            &mut types,
            r#"<r><probe name="a" locked="true" autoCreated="yes" inherit="b"/></r>"#,
        )
        .unwrap();
        let header = registry.peek("a").unwrap().header().clone();
        assert!(header.locked);
        assert!(header.auto_created);
        assert_eq!(header.inherit.as_deref(), Some("b"));
        assert_eq!(registry.index().auto_created().collect::<Vec<_>>(), vec!["a"]);

        let err = load(&mut registry, &mut types, r#"<r><probe name="c" locked="maybe"/></r>"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::Attribute { .. }));
    }

    #[test]
    fn test_bad_attribute() {
        let mut registry = Registry::new();
        let mut types = types();
        let err =
            load(&mut registry, &mut types, r#"<r><probe name="a" level="high"/></r>"#).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Attribute { source: AttributeError::Invalid { .. }, .. }
        ));
        let err =
            load(&mut registry, &mut types, r#"<r><probe name="b" colour="red"/></r>"#).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Attribute { source: AttributeError::Unknown { .. }, .. }
        ));
    }

    #[test]
    fn test_anonymous_gets_synthetic_name() {
        let mut registry = Registry::new();
        let mut types = types();
        let loaded = load(&mut registry, &mut types, "<r><probe/><probe/></r>").unwrap();

        let names: Vec<String> = loaded.iter().map(|c| c.name().unwrap()).collect();
        assert_eq!(names, vec!["Probe#1", "Probe#2"]);
        assert!(loaded[0].header().synthetic);
        assert!(registry.exists("probe#2"));
        assert!(registry.list().is_empty());
    }

    // ========================================================================
    // Children
    // ========================================================================

    #[test]
    fn test_inline_child_becomes_owned_dependency() {
        let mut registry = Registry::new();
        let mut types = types();
        load(
            &mut registry,
            &mut types,
            r#"<r>
                 <probe name="parent" dep="shared">
                   <probe level="1"/>
                   <subprobe slot="dep" level="2"/>
                 </probe>
               </r>"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        let parent = registry.peek("parent").unwrap();
        let body = parent.body().unwrap();
        let props = body.properties();

        let dep = props.dependency("dep").unwrap();
        assert!(dep.owned);
        let sub = dep.resolved.clone().unwrap();
        assert_eq!(sub.type_name(), "SubProbe");
        assert!(sub.is_sub_resource());

        let other = props.dependency("other").unwrap();
        assert!(other.owned);
        assert_eq!(int(other.resolved.as_ref().unwrap(), "level"), Some(1));
    }

    #[test]
    fn test_child_that_fits_nowhere() {
        let mut registry = Registry::new();
        let mut types = types();
        types.register_tag("Stranger", "stranger").unwrap();
        let err =
            load(&mut registry, &mut types, r#"<r><probe name="p"><stranger/></probe></r>"#)
                .unwrap_err();
        assert!(matches!(err, LoadError::UnplacedChild { .. }));
    }

    #[test]
    fn test_owned_children_created_and_destroyed_with_parent() {
        let mut registry = Registry::new();
        let mut types = types();
        load(&mut registry, &mut types, r#"<r><probe name="p"><probe/></probe></r>"#).unwrap();

        let parent = registry.get("p").unwrap().unwrap();
        let child = parent.body().unwrap().properties().resolved("dep").cloned().unwrap();
        assert!(child.is_created());
        assert_eq!(child.holders(), 0);

        registry.remove("p");
        assert!(!child.is_created());
        assert_eq!(counts(&child), (1, 1));
    }

    // ========================================================================
    // Names and overwrite
    // ========================================================================

    #[test]
    fn test_duplicate_name_is_an_error() {
        let mut registry = Registry::new();
        let mut types = types();
        let err = load(&mut registry, &mut types, r#"<r><probe name="a"/><probe name="A"/></r>"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::DuplicateName { ref name, .. } if name == "A"));
        assert!(registry.exists("a"));
    }

    #[test]
    fn test_overwrite_preserves_identity() {
        let mut registry = Registry::new();
        let mut types = types();
        load(
            &mut registry,
            &mut types,
            r#"<r><probe name="target" level="1"/><probe name="holder" dep="target"/></r>"#,
        )
        .unwrap();
        let holder = registry.get("holder").unwrap().unwrap();
        let target = registry.peek("target").unwrap();

        let notified = Rc::new(RefCell::new(Vec::new()));
        let seen = notified.clone();
        Loader::new(&mut registry, &mut types)
            .overwrite(true)
            .on_loaded(move |cell| seen.borrow_mut().push(cell.label()))
            .load_str(r#"<r><probe name="target" level="2"/></r>"#, Path::new("."))
            .unwrap();

        let reloaded = registry.peek("target").unwrap();
        assert!(Rc::ptr_eq(&reloaded, &target));
        assert_eq!(int(&target, "level"), Some(2));
        assert!(target.is_created());
        let held = holder.body().unwrap().properties().resolved("dep").cloned().unwrap();
        assert!(Rc::ptr_eq(&held, &target));
        assert_eq!(*notified.borrow(), vec!["target".to_string()]);
    }

    #[test]
    fn test_overwrite_uncreated_stays_uncreated() {
        let mut registry = Registry::new();
        let mut types = types();
        load(&mut registry, &mut types, r#"<r><probe name="a" level="1"/></r>"#).unwrap();
        Loader::new(&mut registry, &mut types)
            .overwrite(true)
            .load_str(r#"<r><probe name="a"/></r>"#, Path::new("."))
            .unwrap();

        let a = registry.peek("a").unwrap();
        assert!(!a.is_created());
        assert_eq!(int(&a, "level"), None);
    }

    #[test]
    fn test_overwrite_skips_locked() {
        let mut registry = Registry::new();
        let mut types = types();
        load(&mut registry, &mut types, r#"<r><probe name="a" level="1" locked="true"/></r>"#)
            .unwrap();
        let loaded = Loader::new(&mut registry, &mut types)
            .overwrite(true)
            .load_str(r#"<r><probe name="a" level="9"/></r>"#, Path::new("."))
            .unwrap();

        assert!(loaded.is_empty());
        assert_eq!(int(&registry.peek("a").unwrap(), "level"), Some(1));
    }

    #[test]
    fn test_overwrite_rejects_type_change() {
        let mut registry = Registry::new();
        let mut types = types();
        load(&mut registry, &mut types, r#"<r><probe name="a"/></r>"#).unwrap();
        let err = Loader::new(&mut registry, &mut types)
            .overwrite(true)
            .load_str(r#"<r><subprobe name="a"/></r>"#, Path::new("."))
            .unwrap_err();
        assert!(matches!(err, LoadError::TypeChanged { .. }));
    }

    #[test]
    fn test_partial_graph_survives_failure() {
        let mut registry = Registry::new();
        let mut types = types();
        let err = load(&mut registry, &mut types, r#"<r><probe name="ok"/><bogus/></r>"#);
        assert!(err.is_err());
        assert!(registry.exists("ok"));
    }

    // ========================================================================
    // Includes
    // ========================================================================

    #[test]
    fn test_include_once() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("shared.xml"),
            r#"<r><map tag="p2" class="Probe"/><probe name="shared"/></r>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("main.xml"),
            r#"<r>
                 <include resource="shared"/>
                 <include resource="./shared.xml"/>
                 <p2 name="mine"/>
               </r>"#,
        )
        .unwrap();

        let mut registry = Registry::new();
        let mut types = types();
        let loaded =
            Loader::new(&mut registry, &mut types).load_file(&dir.path().join("main.xml")).unwrap();

        let names: Vec<String> = loaded.iter().map(|c| c.label()).collect();
        assert_eq!(names, vec!["shared", "mine"]);
    }

    #[test]
    fn test_missing_include() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::new();
        let mut types = types();
        let err = Loader::new(&mut registry, &mut types)
            .load_str(r#"<r><include resource="nope"/></r>"#, dir.path())
            .unwrap_err();
        assert!(matches!(err, LoadError::Include { source: IncludeError::FileNotFound(..), .. }));
    }

    #[test]
    fn test_anonymous_documents_always_processed() {
        let mut registry = Registry::new();
        let mut types = types();
        let mut loader = Loader::new(&mut registry, &mut types).overwrite(true);
        let first = loader.load_str(r#"<r><probe name="a"/></r>"#, Path::new(".")).unwrap();
        let second = loader.load_str(r#"<r><probe name="a"/></r>"#, Path::new(".")).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_markup_error_names_origin() {
        let mut registry = Registry::new();
        let mut types = types();
        let err = load(&mut registry, &mut types, "<r><probe></r>").unwrap_err();
        match err {
            LoadError::Markup { origin, .. } => assert_eq!(origin, "<string>"),
            other => panic!("expected markup error, got {:?}", other),
        }
    }

    #[test]
    fn test_value_types_follow_schema() {
        let mut registry = Registry::new();
        let mut types = types();
        load(&mut registry, &mut types, r#"<r><probe name="a" label="007"/></r>"#).unwrap();
        let a = registry.peek("a").unwrap();
        assert_eq!(a.body().unwrap().properties().get("label"), Some(&Value::Text("007".into())));
    }
}
