//! resgraph - Named, lazily created resource graphs loaded from markup
//!
//! This library provides functionality to:
//! - Declare resources in XML documents and load them into a [`Registry`]
//! - Resolve named dependencies and create resources on demand
//! - Persist registries as binary bundles and export them back to markup
//!
//! ```ignore
//! let mut registry = Registry::new();
//! let mut types = TypeTable::with_builtin();
//! Loader::new(&mut registry, &mut types).load_file(Path::new("ui.xml"))?;
//! registry.with::<Sprite, _>("hero", |hero| hero.frame())?;
//! ```

pub mod assets;
pub mod cli;
pub mod color;
pub mod config;
pub mod include;
pub mod loader;
pub mod markup;
pub mod persist;
pub mod registry;
pub mod resource;
pub mod tags;
pub mod value;

pub use loader::{LoadError, Loader};
pub use registry::{Registry, RegistryOptions};
pub use resource::{Resource, ResourceCell, ResourceError, ResourceRef};
pub use tags::TypeTable;
