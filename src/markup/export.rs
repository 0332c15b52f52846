//! Registry → markup, the inverse of the loader.

use super::Element;
use crate::registry::Registry;
use crate::resource::ResourceCell;
use crate::tags::TypeTable;

/// Markup for one resource and its owned children.
///
/// Emits the canonical tag of the type, or `<instance class="..">` when it
/// has none, followed by the reserved attributes, every declared persisted
/// value and dependency names. Owned sub-resources become nested elements
/// carrying the `slot` they fill.
pub fn resource_element(cell: &ResourceCell, types: &TypeTable) -> Element {
    let mut element = match types.tag_for(cell.type_name()) {
        Some(tag) => Element::new(tag),
        None => Element::new("instance").with_attr("class", cell.type_name()),
    };

    {
        let header = cell.header();
        if let Some(name) = header.name.as_ref().filter(|_| !header.synthetic) {
            element.set_attr("name", name.as_str());
        }
        if header.locked {
            element.set_attr("locked", "true");
        }
        if header.auto_created {
            element.set_attr("autoCreated", "true");
        }
        if let Some(inherit) = &header.inherit {
            element.set_attr("inherit", inherit.as_str());
        }
    }

    let Some(body) = cell.body() else {
        log::warn!("'{}' is in use; exporting header only", cell.label());
        return element;
    };
    let props = body.properties();

    for (name, value) in props.values() {
        if props.schema().field(name).is_some_and(|f| f.persisted) {
            element.set_attr(name, value.to_markup());
        }
    }

    for (attribute, dep) in props.dependencies() {
        if dep.owned {
            if let Some(child) = &dep.resolved {
                element.children.push(resource_element(child, types).with_attr("slot", attribute));
            }
            continue;
        }
        let name = dep.name.clone().or_else(|| dep.resolved.as_ref().and_then(|r| r.name()));
        if let Some(name) = name {
            element.set_attr(attribute, name);
        }
    }

    element.children.extend(body.child_elements());
    element
}

/// Markup document holding every registry entry.
///
/// Anonymous entries are written without a name, so reloading gives them
/// fresh synthesized names.
pub fn export_registry(registry: &Registry, types: &TypeTable) -> Element {
    let mut root = Element::new("resources");
    for cell in registry.entries() {
        root.children.push(resource_element(&cell, types));
    }
    root
}
