//! Minimal resource type for unit tests.

use std::any::Any;

use super::{
    DependencySpec, FieldSpec, Header, Properties, Resource, ResourceCell, ResourceError,
    ResourceRef, Schema,
};
use crate::registry::{Registry, RegistryIndex};
use crate::value::ValueType;

pub(crate) static PROBE: Schema = Schema {
    type_name: "Probe",
    parent: None,
    fields: &[
        FieldSpec::new("level", ValueType::Int),
        FieldSpec::new("label", ValueType::Text),
        FieldSpec::new("note", ValueType::Text).transient(),
        FieldSpec::new("fail", ValueType::Bool).not_inherited(),
        FieldSpec::new("default", ValueType::Bool).not_inherited(),
    ],
    dependencies: &[DependencySpec::new("dep", &PROBE), DependencySpec::new("other", &PROBE)],
};

pub(crate) static SUB_PROBE: Schema = Schema {
    type_name: "SubProbe",
    parent: Some(&PROBE),
    fields: &[FieldSpec::new("extra", ValueType::Int)],
    dependencies: &[],
};

pub(crate) static STRANGER: Schema =
    Schema { type_name: "Stranger", parent: None, fields: &[], dependencies: &[] };

/// Counts hook invocations; fails creation when `fail` is set.
#[derive(Debug)]
pub(crate) struct Probe {
    props: Properties,
    pub created: u32,
    pub destroyed: u32,
}

impl Probe {
    pub fn new() -> Self {
        Self::of(&PROBE)
    }

    pub fn of(schema: &'static Schema) -> Self {
        Self { props: Properties::new(schema), created: 0, destroyed: 0 }
    }
}

impl Resource for Probe {
    fn schema(&self) -> &'static Schema {
        self.props.schema()
    }

    fn properties(&self) -> &Properties {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.props
    }

    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        if self.props.bool("fail") == Some(true) {
            return Err(ResourceError::Hook("probe asked to fail".to_string()));
        }
        self.created += 1;
        Ok(())
    }

    fn on_destroy(&mut self) {
        self.destroyed += 1;
    }

    fn on_register(&self, name: &str, index: &mut RegistryIndex) {
        if self.props.bool("default") == Some(true) {
            index.set_default(self.props.schema().type_name, name);
        }
    }

    fn on_deregister(&self, name: &str, index: &mut RegistryIndex) {
        index.clear_default(self.props.schema().type_name, name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn probe(name: &str) -> ResourceRef {
    ResourceCell::named(name, Box::new(Probe::new()))
}

pub(crate) fn probe_of(name: &str, schema: &'static Schema) -> ResourceRef {
    ResourceCell::named(name, Box::new(Probe::of(schema)))
}

pub(crate) fn probe_with_dep(name: &str, dep: &str) -> ResourceRef {
    let mut body = Probe::new();
    body.props.set_dependency_name("dep", dep).unwrap();
    ResourceCell::new(Box::new(body), Header { name: Some(name.to_string()), ..Header::default() })
}

/// Creation and destruction counts of a probe cell.
pub(crate) fn counts(cell: &ResourceCell) -> (u32, u32) {
    let probe = cell.borrow_as::<Probe>().unwrap();
    (probe.created, probe.destroyed)
}
