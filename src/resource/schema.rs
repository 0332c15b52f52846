//! Explicit per-type attribute schemas.
//!
//! Every resource type declares a static [`Schema`]: its plain attributes
//! ([`FieldSpec`]) and its name-reference dependencies ([`DependencySpec`]).
//! A schema may name a parent schema; the attribute set of a type is the
//! union of its own level and every ancestor level.

use std::fmt;

use crate::value::ValueType;

/// Static description of one resource type.
pub struct Schema {
    /// Type name used by `<instance class="..">` and persisted records
    pub type_name: &'static str,
    /// Schema of the parent type, if any
    pub parent: Option<&'static Schema>,
    /// Attributes declared at this level
    pub fields: &'static [FieldSpec],
    /// Dependencies declared at this level
    pub dependencies: &'static [DependencySpec],
}

/// A plain declared attribute.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: ValueType,
    /// Copied from an `inherit` template when left unset
    pub inheritable: bool,
    /// Written to markup and persisted streams
    pub persisted: bool,
    /// Must be present once loading finishes
    pub required: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: ValueType) -> Self {
        Self { name, ty, inheritable: true, persisted: true, required: false }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn transient(mut self) -> Self {
        self.persisted = false;
        self.inheritable = false;
        self
    }

    pub const fn not_inherited(mut self) -> Self {
        self.inheritable = false;
        self
    }
}

/// A name reference that resolves to another resource.
///
/// The attribute holds a resource name in markup; at creation time the name
/// is looked up in the registry and the object found there must be an
/// instance of `target`.
#[derive(Clone, Copy)]
pub struct DependencySpec {
    pub attribute: &'static str,
    pub target: &'static Schema,
}

impl DependencySpec {
    pub const fn new(attribute: &'static str, target: &'static Schema) -> Self {
        Self { attribute, target }
    }
}

// Schemas refer to each other, including themselves; print targets by name.
impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("parent", &self.parent.map(|p| p.type_name))
            .field("fields", &self.fields)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl fmt::Debug for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.attribute, self.target.type_name)
    }
}

impl Schema {
    /// Schema levels from the root ancestor down to this type.
    pub fn chain(&'static self) -> Vec<&'static Schema> {
        let mut levels = Vec::new();
        let mut current = Some(self);
        while let Some(schema) = current {
            levels.push(schema);
            current = schema.parent;
        }
        levels.reverse();
        levels
    }

    /// Whether this type is `other` or a subtype of it.
    pub fn is_a(&'static self, other: &'static Schema) -> bool {
        let mut current = Some(self);
        while let Some(schema) = current {
            if std::ptr::eq(schema, other) {
                return true;
            }
            current = schema.parent;
        }
        false
    }

    /// Whether one of the two types is a subtype of the other.
    pub fn is_related(&'static self, other: &'static Schema) -> bool {
        self.is_a(other) || other.is_a(self)
    }

    /// All attributes across the hierarchy, root level first.
    pub fn fields_chain(&'static self) -> impl Iterator<Item = &'static FieldSpec> {
        self.chain().into_iter().flat_map(|level| level.fields.iter())
    }

    /// All dependencies across the hierarchy, root level first.
    pub fn dependencies_chain(&'static self) -> impl Iterator<Item = &'static DependencySpec> {
        self.chain().into_iter().flat_map(|level| level.dependencies.iter())
    }

    /// Look up an attribute by name (case-insensitive).
    pub fn field(&'static self, name: &str) -> Option<&'static FieldSpec> {
        self.fields_chain().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Look up a dependency by attribute name (case-insensitive).
    pub fn dependency(&'static self, name: &str) -> Option<&'static DependencySpec> {
        self.dependencies_chain().find(|d| d.attribute.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static BASE: Schema = Schema {
        type_name: "Base",
        parent: None,
        fields: &[FieldSpec::new("a", ValueType::Int)],
        dependencies: &[],
    };

    static DERIVED: Schema = Schema {
        type_name: "Derived",
        parent: Some(&BASE),
        fields: &[FieldSpec::new("b", ValueType::Text).required()],
        dependencies: &[DependencySpec::new("other", &BASE)],
    };

    static UNRELATED: Schema =
        Schema { type_name: "Unrelated", parent: None, fields: &[], dependencies: &[] };

    #[test]
    fn test_chain_is_root_first() {
        let names: Vec<_> = DERIVED.chain().iter().map(|s| s.type_name).collect();
        assert_eq!(names, vec!["Base", "Derived"]);
    }

    #[test]
    fn test_is_a() {
        assert!(DERIVED.is_a(&BASE));
        assert!(!BASE.is_a(&DERIVED));
        assert!(BASE.is_related(&DERIVED));
        assert!(!UNRELATED.is_related(&BASE));
    }

    #[test]
    fn test_fields_include_ancestors() {
        let names: Vec<_> = DERIVED.fields_chain().map(|f| f.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(DERIVED.field("A").is_some());
        assert!(BASE.field("b").is_none());
        assert!(DERIVED.field("b").unwrap().required);
    }

    #[test]
    fn test_dependency_lookup() {
        let dep = DERIVED.dependency("OTHER").unwrap();
        assert!(std::ptr::eq(dep.target, &BASE));
        assert!(BASE.dependency("other").is_none());
    }

    #[test]
    fn test_transient_flags() {
        let spec = FieldSpec::new("note", ValueType::Text).transient();
        assert!(!spec.persisted);
        assert!(!spec.inheritable);
    }
}
