//! Declared attribute storage.
//!
//! [`Properties`] only holds what was declared: an attribute that was never
//! set is absent rather than holding a default, which is what lets
//! inheritance fill exactly the unset slots.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::schema::Schema;
use super::{AttributeError, ResourceCell, ResourceRef};
use crate::value::Value;

/// A name reference paired with the object it resolves to.
#[derive(Default, Clone)]
pub struct Dependency {
    /// Registry name, as declared in markup
    pub name: Option<String>,
    /// Resolved object; set during creation or by an inline child
    pub resolved: Option<ResourceRef>,
    /// Inline child resource owned by the declaring resource
    pub owned: bool,
}

impl Dependency {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), resolved: None, owned: false }
    }

    /// An inline sub-resource owned by the declaring resource.
    pub fn owned(child: ResourceRef) -> Self {
        Self { name: None, resolved: Some(child), owned: true }
    }

    pub fn is_set(&self) -> bool {
        self.name.is_some() || self.resolved.is_some()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("resolved", &self.resolved.as_ref().map(|r| r.label()))
            .field("owned", &self.owned)
            .finish()
    }
}

/// Declared values and dependencies of one resource.
#[derive(Debug, Clone)]
pub struct Properties {
    schema: &'static Schema,
    values: BTreeMap<&'static str, Value>,
    dependencies: BTreeMap<&'static str, Dependency>,
}

impl Properties {
    pub fn new(schema: &'static Schema) -> Self {
        Self { schema, values: BTreeMap::new(), dependencies: BTreeMap::new() }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Declared value of an attribute, `None` when unset.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let field = self.schema.field(name)?;
        self.values.get(field.name)
    }

    /// Set an attribute, checking it exists and has the declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), AttributeError> {
        let field = self.schema.field(name).ok_or_else(|| AttributeError::Unknown {
            type_name: self.schema.type_name.to_string(),
            attribute: name.to_string(),
        })?;

        let value = match (field.ty, value) {
            (crate::value::ValueType::Float, Value::Int(i)) => Value::Float(i as f64),
            (_, value) => value,
        };
        if value.value_type() != field.ty {
            return Err(AttributeError::WrongType {
                attribute: field.name.to_string(),
                expected: field.ty,
                found: value.value_type(),
            });
        }

        self.values.insert(field.name, value);
        Ok(())
    }

    /// Parse a markup string for the named attribute and set it.
    pub fn set_markup(&mut self, name: &str, raw: &str) -> Result<(), AttributeError> {
        let field = self.schema.field(name).ok_or_else(|| AttributeError::Unknown {
            type_name: self.schema.type_name.to_string(),
            attribute: name.to_string(),
        })?;
        let value = field
            .ty
            .parse(raw)
            .map_err(|source| AttributeError::Invalid { attribute: field.name.to_string(), source })?;
        self.values.insert(field.name, value);
        Ok(())
    }

    /// Reset an attribute to unset.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let field = self.schema.field(name)?;
        self.values.remove(field.name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declared values in schema order.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.schema
            .fields_chain()
            .filter_map(move |field| self.values.get(field.name).map(|v| (field.name, v)))
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    pub fn dependency(&self, attribute: &str) -> Option<&Dependency> {
        let spec = self.schema.dependency(attribute)?;
        self.dependencies.get(spec.attribute)
    }

    /// Mutable dependency slot, created empty on first access.
    pub fn dependency_mut(&mut self, attribute: &str) -> Result<&mut Dependency, AttributeError> {
        let spec = self.schema.dependency(attribute).ok_or_else(|| AttributeError::Unknown {
            type_name: self.schema.type_name.to_string(),
            attribute: attribute.to_string(),
        })?;
        Ok(self.dependencies.entry(spec.attribute).or_default())
    }

    /// Set the registry name a dependency refers to.
    pub fn set_dependency_name(
        &mut self,
        attribute: &str,
        name: impl Into<String>,
    ) -> Result<(), AttributeError> {
        self.dependency_mut(attribute)?.name = Some(name.into());
        Ok(())
    }

    /// Resolved object of a dependency, if any.
    pub fn resolved(&self, attribute: &str) -> Option<&ResourceRef> {
        self.dependency(attribute).and_then(|d| d.resolved.as_ref())
    }

    /// Declared dependencies in schema order.
    pub fn dependencies(&self) -> impl Iterator<Item = (&'static str, &Dependency)> {
        self.schema
            .dependencies_chain()
            .filter_map(move |spec| self.dependencies.get(spec.attribute).map(|d| (spec.attribute, d)))
    }

    pub(crate) fn dependency_slots_mut(
        &mut self,
    ) -> impl Iterator<Item = (&'static str, &mut Dependency)> {
        self.dependencies.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Names of required attributes that are still unset.
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.schema
            .fields_chain()
            .filter(|f| f.required && !self.values.contains_key(f.name))
            .map(|f| f.name)
            .collect()
    }

    /// Whether any dependency slot resolves to `cell`.
    pub fn refers_to(&self, cell: &ResourceCell) -> bool {
        self.dependencies
            .values()
            .any(|d| d.resolved.as_ref().is_some_and(|r| std::ptr::eq(Rc::as_ptr(r), cell)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::schema::{DependencySpec, FieldSpec};
    use crate::value::ValueType;

    static TARGET: Schema =
        Schema { type_name: "Target", parent: None, fields: &[], dependencies: &[] };

    static THING: Schema = Schema {
        type_name: "Thing",
        parent: None,
        fields: &[
            FieldSpec::new("count", ValueType::Int),
            FieldSpec::new("ratio", ValueType::Float),
            FieldSpec::new("label", ValueType::Text).required(),
        ],
        dependencies: &[DependencySpec::new("target", &TARGET)],
    };

    #[test]
    fn test_unset_is_absent() {
        let props = Properties::new(&THING);
        assert!(props.get("count").is_none());
        assert!(!props.is_set("count"));
        assert_eq!(props.missing_required(), vec!["label"]);
    }

    #[test]
    fn test_set_markup_parses_declared_type() {
        let mut props = Properties::new(&THING);
        props.set_markup("COUNT", "7").unwrap();
        assert_eq!(props.int("count"), Some(7));

        let err = props.set_markup("count", "seven").unwrap_err();
        assert!(matches!(err, AttributeError::Invalid { .. }));
    }

    #[test]
    fn test_set_checks_type() {
        let mut props = Properties::new(&THING);
        let err = props.set("count", Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, AttributeError::WrongType { expected: ValueType::Int, .. }));

        props.set("ratio", Value::Int(2)).unwrap();
        assert_eq!(props.get("ratio"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_unknown_attribute() {
        let mut props = Properties::new(&THING);
        let err = props.set_markup("colour", "red").unwrap_err();
        assert_eq!(
            err,
            AttributeError::Unknown { type_name: "Thing".into(), attribute: "colour".into() }
        );
        assert!(props.set_dependency_name("nope", "x").is_err());
    }

    #[test]
    fn test_values_in_schema_order() {
        let mut props = Properties::new(&THING);
        props.set_markup("label", "hi").unwrap();
        props.set_markup("count", "1").unwrap();
        let names: Vec<_> = props.values().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["count", "label"]);
    }

    #[test]
    fn test_dependency_name() {
        let mut props = Properties::new(&THING);
        props.set_dependency_name("target", "other").unwrap();
        let dep = props.dependency("target").unwrap();
        assert_eq!(dep.name.as_deref(), Some("other"));
        assert!(dep.resolved.is_none());
        assert!(dep.is_set());
    }
}
