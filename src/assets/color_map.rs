//! Named colour tables.

use image::Rgba;
use log::debug;
use std::any::Any;
use std::collections::BTreeMap;

use crate::color::{format_color, parse_color};
use crate::markup::Element;
use crate::registry::{Registry, RegistryIndex};
use crate::resource::{
    AttributeError, DependencySpec, FieldSpec, Properties, Resource, ResourceError, Schema,
};
use crate::value::ValueType;

pub static COLOR_MAP: Schema = Schema {
    type_name: "ColorMap",
    parent: None,
    fields: &[FieldSpec::new("default", ValueType::Bool).not_inherited()],
    dependencies: &[DependencySpec::new("fallback", &COLOR_MAP)],
};

/// Colours by id, declared as `<color id="red" c="255,0,0,255"/>` children.
///
/// Lookups that miss fall through to the `fallback` colour map once the map
/// is created.
#[derive(Debug)]
pub struct ColorMap {
    props: Properties,
    colors: BTreeMap<String, Rgba<u8>>,
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorMap {
    pub fn new() -> Self {
        Self { props: Properties::new(&COLOR_MAP), colors: BTreeMap::new() }
    }

    pub(crate) fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    pub fn insert_color(&mut self, id: impl Into<String>, color: Rgba<u8>) {
        self.colors.insert(id.into(), color);
    }

    /// Colours declared by this map, ordered by id.
    pub fn colors(&self) -> impl Iterator<Item = (&str, Rgba<u8>)> {
        self.colors.iter().map(|(id, c)| (id.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Look up a colour, then walk the fallback chain.
    pub fn get_color(&self, id: &str) -> Option<Rgba<u8>> {
        let mut seen = vec![self as *const ColorMap];
        self.lookup(id, &mut seen)
    }

    fn lookup(&self, id: &str, seen: &mut Vec<*const ColorMap>) -> Option<Rgba<u8>> {
        if let Some(color) = self.colors.get(id) {
            return Some(*color);
        }
        let fallback = self.props.resolved("fallback")?;
        let fallback = fallback.borrow_as::<ColorMap>()?;
        let ptr = &*fallback as *const ColorMap;
        if seen.contains(&ptr) {
            return None;
        }
        seen.push(ptr);
        fallback.lookup(id, seen)
    }
}

impl Resource for ColorMap {
    fn schema(&self) -> &'static Schema {
        &COLOR_MAP
    }

    fn properties(&self) -> &Properties {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.props
    }

    fn load_child(&mut self, child: &Element) -> Result<bool, AttributeError> {
        if !child.is("color") {
            return Ok(false);
        }
        let invalid = |message: String| AttributeError::Child { tag: child.tag.clone(), message };

        let id = child.attr("id").ok_or_else(|| invalid("missing 'id'".to_string()))?;
        let raw = child.attr("c").ok_or_else(|| invalid(format!("color '{}' has no 'c'", id)))?;
        let color = parse_color(raw).map_err(|e| invalid(format!("color '{}': {}", id, e)))?;
        self.insert_color(id, color);
        Ok(true)
    }

    fn child_elements(&self) -> Vec<Element> {
        self.colors
            .iter()
            .map(|(id, color)| {
                Element::new("color").with_attr("id", id.as_str()).with_attr("c", format_color(*color))
            })
            .collect()
    }

    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        debug!("color map with {} colors", self.colors.len());
        Ok(())
    }

    fn on_register(&self, name: &str, index: &mut RegistryIndex) {
        if self.props.bool("default") == Some(true) {
            index.set_default(COLOR_MAP.type_name, name);
        }
    }

    fn on_deregister(&self, name: &str, index: &mut RegistryIndex) {
        index.clear_default(COLOR_MAP.type_name, name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceCell;

    fn color_element(id: &str, c: &str) -> Element {
        Element::new("color").with_attr("id", id).with_attr("c", c)
    }

    #[test]
    fn test_load_color_children() {
        let mut map = ColorMap::new();
        assert!(map.load_child(&color_element("red", "255,0,0,255")).unwrap());
        assert!(map.load_child(&color_element("sky", "#87CEEB")).unwrap());
        assert!(!map.load_child(&Element::new("image")).unwrap());

        assert_eq!(map.get_color("red"), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(map.get_color("sky"), Some(Rgba([0x87, 0xCE, 0xEB, 255])));
        assert_eq!(map.get_color("blue"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_bad_color_child() {
        let mut map = ColorMap::new();
        let err = map.load_child(&color_element("red", "not-a-color")).unwrap_err();
        assert!(matches!(err, AttributeError::Child { ref tag, .. } if tag == "color"));
        assert!(map.load_child(&Element::new("color").with_attr("c", "1,2,3")).is_err());
    }

    #[test]
    fn test_child_elements_mirror_loaded_colors() {
        let mut map = ColorMap::new();
        map.insert_color("a", Rgba([1, 2, 3, 4]));
        let children = map.child_elements();
        assert_eq!(children, vec![color_element("a", "1,2,3,4")]);
    }

    #[test]
    fn test_fallback_chain() {
        let mut registry = Registry::new();
        let mut base = ColorMap::new();
        base.insert_color("white", Rgba([255, 255, 255, 255]));
        registry.put(ResourceCell::named("base", Box::new(base))).unwrap();

        let mut top = ColorMap::new();
        top.insert_color("red", Rgba([255, 0, 0, 255]));
        top.props.set_dependency_name("fallback", "base").unwrap();
        registry.put(ResourceCell::named("top", Box::new(top))).unwrap();

        let found = registry.with::<ColorMap, _>("top", |map| map.get_color("white")).unwrap();
        assert_eq!(found, Some(Some(Rgba([255, 255, 255, 255]))));
    }

    #[test]
    fn test_default_color_map_index() {
        let mut registry = Registry::new();
        let mut map = ColorMap::new();
        map.props.set_markup("default", "true").unwrap();
        registry.put(ResourceCell::named("Main", Box::new(map))).unwrap();

        let default = registry.default_of(&COLOR_MAP).unwrap();
        assert_eq!(default.name().as_deref(), Some("Main"));

        registry.deregister("main");
        assert!(registry.default_of(&COLOR_MAP).is_none());
    }
}
