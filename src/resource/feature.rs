//! Default construction engine.
//!
//! Creating a resource runs, in order:
//! 1. Inheritance: unset attributes are copied from the `inherit` template.
//! 2. Resolution: dependency names are looked up in the registry.
//! 3. Cascade: every resolved dependency is created.
//! 4. The type's own `on_create` hook.
//!
//! Destruction runs the type's `on_destroy` hook and then undoes step 3.
//!
//! Dependencies resolved by name are shared: each created resource that
//! resolved one counts as a holder, and the dependency is only destroyed
//! when its last holder goes away. Inline child resources are owned and are
//! destroyed with their parent.

use log::{debug, trace};

use super::properties::Properties;
use super::{AttributeError, Resource, ResourceCell, ResourceError, ResourceRef};
use crate::registry::Registry;

/// State of one top-level `create()` call.
///
/// Tracks the chain of resources currently being created so that a
/// dependency pointing back into the chain is reported as a cycle.
pub struct Cascade<'r> {
    registry: &'r Registry,
    chain: Vec<(*const ResourceCell, String)>,
}

impl<'r> Cascade<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry, chain: Vec::new() }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub(crate) fn detects_cycles(&self) -> bool {
        self.registry.options().detect_cycles
    }

    pub(crate) fn enter(&mut self, cell: &ResourceCell) {
        self.chain.push((cell as *const ResourceCell, cell.label()));
    }

    pub(crate) fn leave(&mut self) {
        self.chain.pop();
    }

    /// The chain from `cell` back to itself, if `cell` is being created in
    /// this cascade.
    pub(crate) fn cycle_through(&self, cell: &ResourceCell) -> Option<Vec<String>> {
        let start = self.chain.iter().position(|(ptr, _)| std::ptr::eq(*ptr, cell))?;
        let mut chain: Vec<String> = self.chain[start..].iter().map(|(_, l)| l.clone()).collect();
        chain.push(cell.label());
        Some(chain)
    }
}

fn attribute_failure(e: AttributeError) -> ResourceError {
    ResourceError::Hook(e.to_string())
}

/// Run inheritance, resolution, cascade and the creation hook for `cell`.
pub(crate) fn construct(
    cell: &ResourceCell,
    body: &mut dyn Resource,
    cascade: &mut Cascade<'_>,
) -> Result<(), ResourceError> {
    let registry = cascade.registry();

    let mut chain = vec![cell.label()];
    apply_inheritance(cell, body.properties_mut(), registry, &mut chain)?;
    cell.publish_declared(Some(body.properties().clone()));

    let resolved_now = resolve_dependencies(cell, body.properties_mut(), registry)?;

    let mut acquired: Vec<ResourceRef> = Vec::new();
    let mut created_here: Vec<ResourceRef> = Vec::new();

    let dependencies: Vec<(ResourceRef, bool)> = body
        .properties()
        .dependencies()
        .filter_map(|(_, dep)| dep.resolved.clone().map(|target| (target, dep.owned)))
        .collect();

    for (target, owned) in dependencies {
        let was_created = target.is_created();
        if let Err(e) = target.create_in(cascade) {
            roll_back(body.properties_mut(), registry, &resolved_now, &acquired, &created_here);
            return Err(e);
        }
        if !was_created && target.is_created() {
            created_here.push(target.clone());
        }
        if !owned {
            target.acquire();
            acquired.push(target);
        }
    }

    if let Err(e) = body.on_create(registry) {
        roll_back(body.properties_mut(), registry, &resolved_now, &acquired, &created_here);
        return Err(e);
    }

    trace!("created '{}' ({} dependencies)", cell.label(), acquired.len());
    Ok(())
}

/// Undo the parts of a failed construction that already happened.
fn roll_back(
    props: &mut Properties,
    registry: &Registry,
    resolved_now: &[&'static str],
    acquired: &[ResourceRef],
    created_here: &[ResourceRef],
) {
    for target in acquired {
        target.release();
    }

    if registry.options().rollback_failed_cascades {
        for target in created_here.iter().rev() {
            if target.holders() == 0 && !target.is_locked() {
                debug!("rolling back '{}'", target.label());
                target.destroy(registry);
            }
        }
    }

    for attribute in resolved_now {
        if let Ok(dep) = props.dependency_mut(attribute) {
            dep.resolved = None;
        }
    }
}

/// Copy unset attributes from the `inherit` template.
///
/// The template is not created; only its declared values are read. A
/// template that itself inherits is completed first.
fn apply_inheritance(
    cell: &ResourceCell,
    props: &mut Properties,
    registry: &Registry,
    chain: &mut Vec<String>,
) -> Result<(), ResourceError> {
    let template_name = {
        let header = cell.header();
        if header.inherited {
            return Ok(());
        }
        match &header.inherit {
            Some(name) => name.clone(),
            None => return Ok(()),
        }
    };

    let template = registry.peek(&template_name).ok_or_else(|| ResourceError::TemplateNotFound {
        resource: cell.label(),
        template: template_name.clone(),
    })?;

    if std::ptr::eq(template.as_ref(), cell)
        || chain.iter().any(|seen| seen.eq_ignore_ascii_case(&template_name))
    {
        let mut cycle = chain.clone();
        cycle.push(template.label());
        return Err(ResourceError::Cycle { chain: cycle });
    }

    if !cell.schema().is_related(template.schema()) {
        return Err(ResourceError::TemplateTypeMismatch {
            resource: cell.label(),
            template: template.label(),
            expected: cell.type_name().to_string(),
            found: template.type_name().to_string(),
        });
    }

    // A template whose body is borrowed is mid-creation and past this step.
    if let Some(mut template_body) = template.body_mut() {
        chain.push(template.label());
        apply_inheritance(&template, template_body.properties_mut(), registry, chain)?;
        chain.pop();
    }

    let copied = template.with_declared(|inherited| copy_unset(inherited, props));
    copied.ok_or_else(|| ResourceError::Busy(template.label()))??;

    cell.header_mut().inherited = true;
    trace!("'{}' inherited from '{}'", cell.label(), template_name);
    Ok(())
}

/// Copy inheritable values and shared dependency names into unset slots.
fn copy_unset(inherited: &Properties, props: &mut Properties) -> Result<(), ResourceError> {
    let schema = props.schema();

    for (name, value) in inherited.values() {
        let Some(field) = schema.field(name) else { continue };
        if field.inheritable && !props.is_set(name) {
            props.set(name, value.clone()).map_err(attribute_failure)?;
        }
    }

    for (attribute, dep) in inherited.dependencies() {
        if dep.owned || schema.dependency(attribute).is_none() {
            continue;
        }
        let Some(name) = &dep.name else { continue };
        if !props.dependency(attribute).is_some_and(|d| d.is_set()) {
            props.set_dependency_name(attribute, name.clone()).map_err(attribute_failure)?;
        }
    }
    Ok(())
}

/// Look up every unresolved dependency name in the registry.
///
/// Names that do not resolve are skipped so optional dependencies work.
/// Returns the attributes resolved by this call.
fn resolve_dependencies(
    cell: &ResourceCell,
    props: &mut Properties,
    registry: &Registry,
) -> Result<Vec<&'static str>, ResourceError> {
    let mut resolved_now: Vec<&'static str> = Vec::new();

    for spec in props.schema().dependencies_chain() {
        let name = match props.dependency(spec.attribute) {
            Some(dep) if dep.resolved.is_none() => match &dep.name {
                Some(name) => name.clone(),
                None => continue,
            },
            _ => continue,
        };

        let Some(target) = registry.peek(&name) else {
            debug!("'{}.{}': '{}' is not registered", cell.label(), spec.attribute, name);
            continue;
        };

        if !target.schema().is_a(spec.target) {
            for attribute in &resolved_now {
                if let Ok(dep) = props.dependency_mut(attribute) {
                    dep.resolved = None;
                }
            }
            return Err(ResourceError::DependencyTypeMismatch {
                resource: cell.label(),
                attribute: spec.attribute.to_string(),
                target: name,
                expected: spec.target.type_name.to_string(),
                found: target.type_name().to_string(),
            });
        }

        props.dependency_mut(spec.attribute).map_err(attribute_failure)?.resolved = Some(target);
        resolved_now.push(spec.attribute);
    }

    Ok(resolved_now)
}

/// Run the destruction hook and release dependencies.
pub(crate) fn teardown(body: &mut dyn Resource, registry: &Registry) {
    body.on_destroy();

    for (attribute, dep) in body.properties_mut().dependency_slots_mut() {
        let Some(target) = dep.resolved.clone() else { continue };

        if dep.owned {
            if !target.is_locked() {
                target.destroy(registry);
            }
            continue;
        }

        let remaining = target.release();
        if remaining == 0 && !target.is_locked() {
            target.destroy(registry);
        }

        // Archived slots keep their object since the name is gone.
        if dep.name.is_some() {
            dep.resolved = None;
        } else {
            trace!("keeping archived dependency '{}' -> '{}'", attribute, target.label());
        }
    }
}

/// Clear the names of resolved shared dependencies; returns how many.
pub(crate) fn archive(body: &mut dyn Resource) -> usize {
    let mut cleared = 0;
    for (_, dep) in body.properties_mut().dependency_slots_mut() {
        if !dep.owned && dep.resolved.is_some() && dep.name.take().is_some() {
            cleared += 1;
        }
    }
    cleared
}
