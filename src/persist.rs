//! Binary persistence of resource graphs.
//!
//! A stream holds one [`ResourceRecord`] per saved entry. Dependencies are
//! written as a [`Ref`]: either the full record inline, or only the target's
//! name, to be looked up again when the stream is loaded.
//!
//! Which form is used depends on [`PersistMode`]:
//! - `Definition` writes named dependencies inline unless they are saved as
//!   entries of the same stream, so a bundle is self-contained.
//! - `Run` writes every named dependency by name; loading resolves it
//!   against the registry of the loading process.
//!
//! Owned sub-resources are always inline.
//!
//! # Format
//!
//! ```text
//! magic "RGRF" | version u16 LE | mode u8 | count u32 LE
//! count × ( length u32 LE | bincode record )
//! ```

use bincode::config;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use thiserror::Error;

use crate::markup::Element;
use crate::registry::{registry_key, Registry, RegistryError};
use crate::resource::{
    AttributeError, Dependency, Header, Resource, ResourceCell, ResourceError, ResourceRef, Schema,
};
use crate::tags::TypeTable;
use crate::value::Value;

pub const MAGIC: [u8; 4] = *b"RGRF";
pub const FORMAT_VERSION: u16 = 1;

/// How named dependencies are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistMode {
    /// Full state, for building bundles
    Definition,
    /// Named dependencies by reference
    Run,
}

impl PersistMode {
    fn to_byte(self) -> u8 {
        match self {
            PersistMode::Definition => 0,
            PersistMode::Run => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PersistMode::Definition),
            1 => Some(PersistMode::Run),
            _ => None,
        }
    }
}

/// A persisted dependency target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ref {
    Inline(Box<ResourceRecord>),
    ByName(String),
}

/// One dependency slot of a persisted resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub attribute: String,
    /// Declared name, absent once archived
    pub name: Option<String>,
    pub owned: bool,
    /// Resolved target at save time
    pub target: Option<Ref>,
}

/// Persisted state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub type_name: String,
    pub name: Option<String>,
    pub synthetic: bool,
    pub locked: bool,
    pub auto_created: bool,
    pub inherit: Option<String>,
    /// Created when saved; recreated after loading
    pub created: bool,
    pub values: Vec<(String, Value)>,
    pub dependencies: Vec<DependencyRecord>,
    /// Type-specific child elements
    pub children: Vec<Element>,
}

/// Error saving or loading a stream.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(String),
    /// Stream does not start with the format magic
    #[error("not a resource stream")]
    BadMagic,
    #[error("unsupported stream version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown persistence mode {0}")]
    BadMode(u8),
    /// Record names a type the loading process does not know
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("type '{0}' has no usable constructor")]
    NoConstructor(String),
    /// By-name reference found neither in the stream nor in the registry
    #[error("unresolved reference to '{name}'")]
    UnresolvedReference { name: String },
    /// By-name reference resolved to an incompatible object
    #[error("'{resource}.{attribute}' needs a {expected}, but '{target}' is a {found}")]
    DependencyType {
        resource: String,
        attribute: String,
        target: String,
        expected: String,
        found: String,
    },
    /// Record would change the type of an existing entry
    #[error("'{name}' is a {previous}, cannot load it as a {found}")]
    TypeChanged { name: String, previous: String, found: String },
    #[error("'{resource}': {source}")]
    Attribute {
        resource: String,
        #[source]
        source: AttributeError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Create(#[from] ResourceError),
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e.to_string())
    }
}

/// Decoded stream contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub mode: PersistMode,
    pub records: Vec<ResourceRecord>,
}

// ============================================================================
// Saving
// ============================================================================

struct Encoder {
    mode: PersistMode,
    entries: HashSet<*const ResourceCell>,
    path: Vec<*const ResourceCell>,
}

impl Encoder {
    fn new(mode: PersistMode, cells: &[ResourceRef]) -> Self {
        let entries = cells.iter().map(|c| c.as_ref() as *const ResourceCell).collect();
        Self { mode, entries, path: Vec::new() }
    }

    fn record(&mut self, cell: &ResourceCell) -> ResourceRecord {
        let header = cell.header().clone();
        let mut record = ResourceRecord {
            type_name: cell.type_name().to_string(),
            name: header.name,
            synthetic: header.synthetic,
            locked: header.locked,
            auto_created: header.auto_created,
            inherit: header.inherit,
            created: cell.is_created(),
            values: Vec::new(),
            dependencies: Vec::new(),
            children: Vec::new(),
        };

        let Some(body) = cell.body() else {
            warn!("'{}' is in use; saving its header only", cell.label());
            return record;
        };
        let props = body.properties();

        for (name, value) in props.values() {
            if props.schema().field(name).is_some_and(|f| f.persisted) {
                record.values.push((name.to_string(), value.clone()));
            }
        }

        self.path.push(cell as *const ResourceCell);
        for (attribute, dep) in props.dependencies() {
            let target = dep.resolved.as_ref().and_then(|t| self.reference(t, dep.owned));
            record.dependencies.push(DependencyRecord {
                attribute: attribute.to_string(),
                name: dep.name.clone(),
                owned: dep.owned,
                target,
            });
        }
        self.path.pop();

        record.children = body.child_elements();
        record
    }

    fn reference(&mut self, target: &ResourceRef, owned: bool) -> Option<Ref> {
        let ptr = target.as_ref() as *const ResourceCell;
        let on_path = self.path.contains(&ptr);
        let name = {
            let header = target.header();
            header.name.clone().filter(|_| !header.synthetic)
        };

        if owned {
            return (!on_path).then(|| Ref::Inline(Box::new(self.record(target))));
        }

        match name {
            Some(name)
                if self.mode == PersistMode::Run || on_path || self.entries.contains(&ptr) =>
            {
                Some(Ref::ByName(name))
            }
            _ if on_path => {
                warn!("dropping anonymous cyclic reference to '{}'", target.label());
                None
            }
            _ => Some(Ref::Inline(Box::new(self.record(target)))),
        }
    }
}

/// Records for `cells` as they would be written in `mode`.
pub fn records(cells: &[ResourceRef], mode: PersistMode) -> Vec<ResourceRecord> {
    let mut encoder = Encoder::new(mode, cells);
    cells.iter().map(|cell| encoder.record(cell)).collect()
}

/// Write `cells` as a stream.
pub fn save<W: Write>(
    cells: &[ResourceRef],
    writer: W,
    mode: PersistMode,
) -> Result<(), PersistError> {
    write_stream(&records(cells, mode), writer, mode)
}

pub fn write_stream<W: Write>(
    records: &[ResourceRecord],
    mut writer: W,
    mode: PersistMode,
) -> Result<(), PersistError> {
    let count = u32::try_from(records.len()).map_err(|e| PersistError::Encode(e.to_string()))?;

    writer.write_all(&MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&[mode.to_byte()])?;
    writer.write_all(&count.to_le_bytes())?;

    for record in records {
        let payload = bincode::serde::encode_to_vec(record, config::standard())
            .map_err(|e| PersistError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len()).map_err(|e| PersistError::Encode(e.to_string()))?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&payload)?;
    }

    writer.flush()?;
    debug!("wrote {} records ({:?} mode)", records.len(), mode);
    Ok(())
}

// ============================================================================
// Loading
// ============================================================================

fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], PersistError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Decode a stream without touching any registry.
pub fn read_stream<R: Read>(mut reader: R) -> Result<Stream, PersistError> {
    if read_array::<4, _>(&mut reader)? != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = u16::from_le_bytes(read_array(&mut reader)?);
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    let [mode] = read_array::<1, _>(&mut reader)?;
    let mode = PersistMode::from_byte(mode).ok_or(PersistError::BadMode(mode))?;
    let count = u32::from_le_bytes(read_array(&mut reader)?);

    let mut records = Vec::new();
    for _ in 0..count {
        let len = u32::from_le_bytes(read_array(&mut reader)?) as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        let (record, _): (ResourceRecord, usize) =
            bincode::serde::decode_from_slice(&payload, config::standard())
                .map_err(|e| PersistError::Decode(e.to_string()))?;
        records.push(record);
    }

    Ok(Stream { mode, records })
}

/// Attribute, target name and expected schema of a by-name dependency.
type ByName = (&'static str, String, &'static Schema);

/// A by-name dependency waiting for every record to be materialized.
struct Pending {
    cell: ResourceRef,
    attribute: &'static str,
    name: String,
    target: &'static Schema,
}

struct Decoder<'r> {
    registry: &'r mut Registry,
    types: &'r TypeTable,
    /// Named records of this stream, by original registry key
    materialized: HashMap<String, ResourceRef>,
    pending: Vec<Pending>,
    create_queue: Vec<ResourceRef>,
}

impl Decoder<'_> {
    /// Turn a record into a cell and register it when it is named.
    fn materialize(
        &mut self,
        record: ResourceRecord,
        owned: bool,
    ) -> Result<ResourceRef, PersistError> {
        let stream_key = record.name.as_deref().map(registry_key);
        if let Some(existing) = stream_key.as_ref().and_then(|k| self.materialized.get(k)) {
            return Ok(existing.clone());
        }

        let created = record.created;
        let (body, mut header, by_name) = self.build(record)?;

        let cell = if owned {
            header.sub_resource = true;
            ResourceCell::new(body, header)
        } else {
            match header.name.clone() {
                Some(_) if header.synthetic => {
                    header.name = Some(self.registry.synthesize_name(body.schema().type_name));
                    let cell = ResourceCell::new(body, header);
                    self.registry.put(cell.clone())?;
                    cell
                }
                Some(name) => self.install(&name, body, header)?,
                None => ResourceCell::new(body, header),
            }
        };

        if let Some(key) = stream_key {
            self.materialized.insert(key, cell.clone());
        }
        for (attribute, name, target) in by_name {
            self.pending.push(Pending { cell: cell.clone(), attribute, name, target });
        }
        if created {
            self.create_queue.push(cell.clone());
        }
        Ok(cell)
    }

    /// Register a named record, updating an existing entry in place.
    fn install(
        &mut self,
        name: &str,
        body: Box<dyn Resource>,
        header: Header,
    ) -> Result<ResourceRef, PersistError> {
        let Some(existing) = self.registry.peek(name) else {
            let cell = ResourceCell::new(body, header);
            self.registry.put(cell.clone())?;
            return Ok(cell);
        };

        if existing.is_locked() {
            debug!("'{}' is locked; keeping the registered entry", name);
            return Ok(existing);
        }
        if !std::ptr::eq(existing.schema(), body.schema()) {
            return Err(PersistError::TypeChanged {
                name: name.to_string(),
                previous: existing.type_name().to_string(),
                found: body.schema().type_name.to_string(),
            });
        }

        let was_created = existing.is_created();
        existing.destroy(self.registry);
        self.registry.deregister(name);
        existing.replace_body(body, header)?;
        self.registry.put(existing.clone())?;
        if was_created {
            self.create_queue.push(existing.clone());
        }
        Ok(existing)
    }

    fn build(
        &mut self,
        record: ResourceRecord,
    ) -> Result<(Box<dyn Resource>, Header, Vec<ByName>), PersistError> {
        let info = *self
            .types
            .type_info(&record.type_name)
            .ok_or_else(|| PersistError::UnknownType(record.type_name.clone()))?;
        let label = record.name.clone().unwrap_or_else(|| format!("<anonymous {}>", info.type_name()));
        let attribute_err = |source| PersistError::Attribute { resource: label.clone(), source };

        let mut body = info
            .construct(record.name.as_deref())
            .ok_or_else(|| PersistError::NoConstructor(record.type_name.clone()))?;
        let schema = info.schema;

        for (name, value) in record.values {
            body.properties_mut().set(&name, value).map_err(attribute_err)?;
        }

        for child in &record.children {
            if !body.load_child(child).map_err(attribute_err)? {
                warn!("'{}': ignoring unexpected child {}", label, child.describe());
            }
        }

        let mut by_name = Vec::new();
        for dep in record.dependencies {
            let spec = schema.dependency(&dep.attribute).ok_or_else(|| {
                attribute_err(AttributeError::Unknown {
                    type_name: schema.type_name.to_string(),
                    attribute: dep.attribute.clone(),
                })
            })?;

            let resolved = match dep.target {
                Some(Ref::Inline(target)) => {
                    let target = self.materialize(*target, dep.owned)?;
                    check_target(&label, spec.attribute, spec.target, &target)?;
                    Some(target)
                }
                Some(Ref::ByName(name)) => {
                    by_name.push((spec.attribute, name, spec.target));
                    None
                }
                None => None,
            };

            let slot = body.properties_mut().dependency_mut(spec.attribute).map_err(attribute_err)?;
            *slot = match (dep.owned, resolved) {
                (true, Some(child)) => Dependency::owned(child),
                (_, resolved) => Dependency { name: dep.name, resolved, owned: false },
            };
        }

        let header = Header {
            name: record.name,
            synthetic: record.synthetic,
            locked: record.locked,
            auto_created: record.auto_created,
            inherit: record.inherit,
            ..Header::default()
        };
        Ok((body, header, by_name))
    }

    fn resolve_pending(&mut self) -> Result<(), PersistError> {
        for pending in std::mem::take(&mut self.pending) {
            let target = self
                .materialized
                .get(&registry_key(&pending.name))
                .cloned()
                .or_else(|| self.registry.peek(&pending.name))
                .ok_or_else(|| PersistError::UnresolvedReference { name: pending.name.clone() })?;

            let label = pending.cell.label();
            check_target(&label, pending.attribute, pending.target, &target)?;

            let mut body = pending.cell.body_mut().ok_or_else(|| ResourceError::Busy(label.clone()))?;
            let slot = body
                .properties_mut()
                .dependency_mut(pending.attribute)
                .map_err(|source| PersistError::Attribute { resource: label.clone(), source })?;
            slot.resolved = Some(target);
        }
        Ok(())
    }
}

fn check_target(
    resource: &str,
    attribute: &str,
    expected: &'static Schema,
    target: &ResourceCell,
) -> Result<(), PersistError> {
    if target.schema().is_a(expected) {
        return Ok(());
    }
    Err(PersistError::DependencyType {
        resource: resource.to_string(),
        attribute: attribute.to_string(),
        target: target.label(),
        expected: expected.type_name.to_string(),
        found: target.type_name().to_string(),
    })
}

/// Load a stream into `registry`.
///
/// Records are materialized first, then by-name references are resolved,
/// then every record that was created when saved is created again, in
/// stream order. Returns the top-level entries.
pub fn load<R: Read>(
    registry: &mut Registry,
    reader: R,
    types: &TypeTable,
) -> Result<Vec<ResourceRef>, PersistError> {
    let stream = read_stream(reader)?;
    debug!("loading {} records ({:?} mode)", stream.records.len(), stream.mode);

    let mut decoder = Decoder {
        registry,
        types,
        materialized: HashMap::new(),
        pending: Vec::new(),
        create_queue: Vec::new(),
    };

    let mut loaded = Vec::with_capacity(stream.records.len());
    for record in stream.records {
        if record.name.is_none() {
            return Err(RegistryError::Unnamed { type_name: record.type_name }.into());
        }
        loaded.push(decoder.materialize(record, false)?);
    }

    decoder.resolve_pending()?;

    for cell in std::mem::take(&mut decoder.create_queue) {
        cell.create(decoder.registry)?;
    }
    Ok(loaded)
}
