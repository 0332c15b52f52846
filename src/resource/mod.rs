//! Graph members and their lifecycle.
//!
//! A resource is a [`ResourceCell`] shared through [`ResourceRef`]. The cell
//! owns the common header (name, `locked`, sub-resource and inheritance
//! flags), the lifecycle guard and the type-specific body, a boxed
//! [`Resource`] implementation.
//!
//! Access is single-threaded: cells use `Cell`/`RefCell` and are shared with
//! `Rc`.

pub mod feature;
pub mod lifecycle;
pub mod properties;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::markup::Element;
use crate::registry::{Registry, RegistryIndex};
use crate::value::{ValueError, ValueType};

pub use lifecycle::{Lifecycle, LifecycleState};
pub use properties::{Dependency, Properties};
pub use schema::{DependencySpec, FieldSpec, Schema};

/// Shared handle to a graph member.
pub type ResourceRef = Rc<ResourceCell>;

/// Error setting or loading a declared attribute.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AttributeError {
    /// Attribute not declared by the type's schema
    #[error("'{type_name}' has no attribute '{attribute}'")]
    Unknown { type_name: String, attribute: String },
    /// Markup value does not parse as the declared type
    #[error("invalid value for '{attribute}': {source}")]
    Invalid {
        attribute: String,
        #[source]
        source: ValueError,
    },
    /// Value of the wrong type assigned programmatically
    #[error("'{attribute}' expects {expected}, got {found}")]
    WrongType { attribute: String, expected: ValueType, found: ValueType },
    /// Required attribute left unset
    #[error("'{type_name}' requires attribute '{attribute}'")]
    Missing { type_name: String, attribute: String },
    /// Malformed type-specific child element
    #[error("invalid <{tag}> child: {message}")]
    Child { tag: String, message: String },
}

/// Error raised while creating a resource.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ResourceError {
    /// Wraps any failure inside a resource's creation
    #[error("failed to create resource '{name}': {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: Box<ResourceError>,
    },
    /// `inherit` names a resource that is not registered
    #[error("'{resource}' inherits from unknown template '{template}'")]
    TemplateNotFound { resource: String, template: String },
    /// `inherit` names a resource of an unrelated type
    #[error("'{resource}' ({expected}) cannot inherit from '{template}' ({found})")]
    TemplateTypeMismatch { resource: String, template: String, expected: String, found: String },
    /// A dependency name resolved to an object of the wrong type
    #[error("'{resource}.{attribute}' needs a {expected}, but '{target}' is a {found}")]
    DependencyTypeMismatch {
        resource: String,
        attribute: String,
        target: String,
        expected: String,
        found: String,
    },
    /// Dependency or inheritance chain loops back on itself
    #[error("cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    /// A type's creation hook failed
    #[error("{0}")]
    Hook(String),
    /// The resource body is borrowed elsewhere
    #[error("resource '{0}' is in use")]
    Busy(String),
}

impl ResourceError {
    /// The innermost error, below any `CreateFailed` wrappers.
    pub fn root_cause(&self) -> &ResourceError {
        match self {
            ResourceError::CreateFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Type-specific part of a resource.
///
/// The generic engine in [`feature`] drives declared attributes through
/// [`Properties`]; implementations add behavior through the hooks.
pub trait Resource: Any + fmt::Debug {
    fn schema(&self) -> &'static Schema;

    fn properties(&self) -> &Properties;

    fn properties_mut(&mut self) -> &mut Properties;

    /// Consume a type-specific child element.
    ///
    /// Returns `Ok(false)` when the element is not one this type handles, in
    /// which case the loader tries to treat it as an inline sub-resource.
    fn load_child(&mut self, _child: &Element) -> Result<bool, AttributeError> {
        Ok(false)
    }

    /// Type-specific child elements, the inverse of [`Resource::load_child`].
    fn child_elements(&self) -> Vec<Element> {
        Vec::new()
    }

    /// Runs after dependencies are resolved and created.
    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Runs before dependencies are released.
    fn on_destroy(&mut self) {}

    /// Called when registered under `name`.
    fn on_register(&self, _name: &str, _index: &mut RegistryIndex) {}

    /// Called when removed from the registry.
    fn on_deregister(&self, _name: &str, _index: &mut RegistryIndex) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Common attributes every resource carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Identity key, compared case-insensitively
    pub name: Option<String>,
    /// Name was synthesized for an anonymous declaration
    pub synthetic: bool,
    /// Exempt from reload and cascade destruction
    pub locked: bool,
    /// Owned by a parent resource, never registered
    pub sub_resource: bool,
    /// Created eagerly by `Registry::create_auto_created`
    pub auto_created: bool,
    /// Name of the template to borrow unset attributes from
    pub inherit: Option<String>,
    /// Inheritance already applied
    pub inherited: bool,
    /// Dependency names were discarded by `archive`
    pub archived: bool,
}

/// A graph member: header, lifecycle and type-specific body.
pub struct ResourceCell {
    schema: &'static Schema,
    header: RefCell<Header>,
    lifecycle: Lifecycle,
    holders: Cell<usize>,
    body: RefCell<Box<dyn Resource>>,
    /// Declared properties, readable while the body is borrowed for creation
    declared: RefCell<Option<Properties>>,
}

impl ResourceCell {
    /// Wrap a body into a new, uncreated cell.
    pub fn new(body: Box<dyn Resource>, header: Header) -> ResourceRef {
        Rc::new(Self {
            schema: body.schema(),
            header: RefCell::new(header),
            lifecycle: Lifecycle::new(),
            holders: Cell::new(0),
            body: RefCell::new(body),
            declared: RefCell::new(None),
        })
    }

    /// Wrap a body with a name.
    pub fn named(name: impl Into<String>, body: Box<dyn Resource>) -> ResourceRef {
        Self::new(body, Header { name: Some(name.into()), ..Header::default() })
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn type_name(&self) -> &'static str {
        self.schema.type_name
    }

    pub fn name(&self) -> Option<String> {
        self.header.borrow().name.clone()
    }

    /// Name for diagnostics; anonymous resources show their type.
    pub fn label(&self) -> String {
        match &self.header.borrow().name {
            Some(name) => name.clone(),
            None => format!("<anonymous {}>", self.schema.type_name),
        }
    }

    pub fn header(&self) -> Ref<'_, Header> {
        self.header.borrow()
    }

    pub fn header_mut(&self) -> RefMut<'_, Header> {
        self.header.borrow_mut()
    }

    pub fn is_locked(&self) -> bool {
        self.header.borrow().locked
    }

    pub fn set_locked(&self, locked: bool) {
        self.header.borrow_mut().locked = locked;
    }

    pub fn is_sub_resource(&self) -> bool {
        self.header.borrow().sub_resource
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_created(&self) -> bool {
        self.lifecycle.is_created()
    }

    /// Number of created resources currently holding this one as a shared
    /// dependency.
    pub fn holders(&self) -> usize {
        self.holders.get()
    }

    pub(crate) fn acquire(&self) {
        self.holders.set(self.holders.get() + 1);
    }

    /// Drop one holder; returns the remaining count.
    pub(crate) fn release(&self) -> usize {
        let remaining = self.holders.get().saturating_sub(1);
        self.holders.set(remaining);
        remaining
    }

    /// Borrow the type-specific body.
    ///
    /// Returns `None` while the body is mutably borrowed, which only happens
    /// while its creation or destruction hook runs.
    pub fn body(&self) -> Option<Ref<'_, Box<dyn Resource>>> {
        self.body.try_borrow().ok()
    }

    pub fn body_mut(&self) -> Option<RefMut<'_, Box<dyn Resource>>> {
        self.body.try_borrow_mut().ok()
    }

    /// Run `f` over the declared properties.
    ///
    /// Works mid-creation too: construction publishes a copy of the
    /// properties once inheritance is applied.
    pub fn with_declared<R>(&self, f: impl FnOnce(&Properties) -> R) -> Option<R> {
        if let Ok(body) = self.body.try_borrow() {
            return Some(f(body.properties()));
        }
        self.declared.borrow().as_ref().map(f)
    }

    pub(crate) fn publish_declared(&self, props: Option<Properties>) {
        *self.declared.borrow_mut() = props;
    }

    /// Borrow the body as a concrete type.
    pub fn borrow_as<T: Resource>(&self) -> Option<Ref<'_, T>> {
        let body = self.body.try_borrow().ok()?;
        Ref::filter_map(body, |b| (**b).as_any().downcast_ref::<T>()).ok()
    }

    pub fn borrow_as_mut<T: Resource>(&self) -> Option<RefMut<'_, T>> {
        let body = self.body.try_borrow_mut().ok()?;
        RefMut::filter_map(body, |b| (**b).as_any_mut().downcast_mut::<T>()).ok()
    }

    /// Replace the body in place, keeping this cell's identity.
    ///
    /// Used by overwrite reloads; the cell must be uncreated.
    pub(crate) fn replace_body(
        &self,
        body: Box<dyn Resource>,
        header: Header,
    ) -> Result<(), ResourceError> {
        let mut slot = self.body.try_borrow_mut().map_err(|_| ResourceError::Busy(self.label()))?;
        *slot = body;
        *self.header.borrow_mut() = header;
        Ok(())
    }

    /// Create this resource, resolving and creating its dependencies first.
    ///
    /// A no-op when already created or currently being created.
    pub fn create(&self, registry: &Registry) -> Result<(), ResourceError> {
        let mut cascade = feature::Cascade::new(registry);
        self.create_in(&mut cascade)
    }

    pub(crate) fn create_in(&self, cascade: &mut feature::Cascade<'_>) -> Result<(), ResourceError> {
        if self.lifecycle.state() == LifecycleState::Creating && cascade.detects_cycles() {
            if let Some(chain) = cascade.cycle_through(self) {
                return Err(ResourceError::Cycle { chain });
            }
        }

        let label = self.label();
        self.lifecycle
            .create_with(|| {
                cascade.registry().notify_creating(self);
                cascade.enter(self);
                let result = self
                    .body
                    .try_borrow_mut()
                    .map_err(|_| ResourceError::Busy(label.clone()))
                    .and_then(|mut body| feature::construct(self, &mut **body, cascade));
                self.publish_declared(None);
                cascade.leave();
                result
            })
            .map(|_| ())
            .map_err(|source| ResourceError::CreateFailed { name: label, source: Box::new(source) })
    }

    /// Destroy this resource and release what its creation acquired.
    ///
    /// A no-op unless currently created. Declared data survives, so the
    /// resource can be created again.
    pub fn destroy(&self, registry: &Registry) {
        self.lifecycle.destroy_with(|| match self.body.try_borrow_mut() {
            Ok(mut body) => feature::teardown(&mut **body, registry),
            Err(_) => log::error!("cannot destroy '{}': body is in use", self.label()),
        });
    }

    /// Discard dependency names whose objects are already resolved.
    ///
    /// The resource keeps working but can no longer re-resolve those
    /// dependencies from their names.
    pub fn archive(&self) {
        if let Ok(mut body) = self.body.try_borrow_mut() {
            if feature::archive(&mut **body) > 0 {
                self.header.borrow_mut().archived = true;
            }
        }
    }
}

impl fmt::Debug for ResourceCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCell")
            .field("type", &self.schema.type_name)
            .field("header", &*self.header.borrow())
            .field("state", &self.lifecycle.state())
            .field("holders", &self.holders.get())
            .finish()
    }
}
