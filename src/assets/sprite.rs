//! Sprites: a region of an image drawn with a colour map.

use image::Rgba;
use std::any::Any;

use super::color_map::{ColorMap, COLOR_MAP};
use super::image_asset::{Image, IMAGE};
use crate::registry::Registry;
use crate::resource::{DependencySpec, FieldSpec, Properties, Resource, ResourceError, Schema};
use crate::value::ValueType;

pub static SPRITE: Schema = Schema {
    type_name: "Sprite",
    parent: None,
    fields: &[
        FieldSpec::new("x", ValueType::Int),
        FieldSpec::new("y", ValueType::Int),
        FieldSpec::new("w", ValueType::Int),
        FieldSpec::new("h", ValueType::Int),
        FieldSpec::new("scale", ValueType::Float),
        FieldSpec::new("alpha", ValueType::Float),
        FieldSpec::new("layer", ValueType::Int),
        FieldSpec::new("comment", ValueType::Text).transient(),
    ],
    dependencies: &[
        DependencySpec::new("image", &IMAGE),
        DependencySpec::new("palette", &COLOR_MAP),
    ],
};

/// Geometry computed when a sprite is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub scale: f64,
}

/// Resolve the frame of a sprite-like resource.
///
/// Width and height fall back to the image's declared size.
pub(crate) fn compute_frame(props: &Properties) -> Result<Frame, ResourceError> {
    let image_size = props
        .resolved("image")
        .and_then(|image| image.borrow_as::<Image>().and_then(|image| image.size()));

    let width = props.int("w").or(image_size.map(|(w, _)| w)).unwrap_or(0);
    let height = props.int("h").or(image_size.map(|(_, h)| h)).unwrap_or(0);
    if width < 0 || height < 0 {
        return Err(ResourceError::Hook(format!("negative sprite size {}x{}", width, height)));
    }

    let scale = props.float("scale").unwrap_or(1.0);
    if scale <= 0.0 {
        return Err(ResourceError::Hook(format!("scale must be positive, got {}", scale)));
    }
    if let Some(alpha) = props.float("alpha") {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ResourceError::Hook(format!("alpha {} outside 0..1", alpha)));
        }
    }

    Ok(Frame {
        x: props.int("x").unwrap_or(0),
        y: props.int("y").unwrap_or(0),
        width,
        height,
        scale,
    })
}

/// Look up `id` in the sprite's palette.
pub(crate) fn palette_color(props: &Properties, id: &str) -> Option<Rgba<u8>> {
    let palette = props.resolved("palette")?;
    let palette = palette.borrow_as::<ColorMap>()?;
    palette.get_color(id)
}

#[derive(Debug)]
pub struct Sprite {
    props: Properties,
    frame: Option<Frame>,
}

impl Default for Sprite {
    fn default() -> Self {
        Self::new()
    }
}

impl Sprite {
    pub fn new() -> Self {
        Self { props: Properties::new(&SPRITE), frame: None }
    }

    pub(crate) fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    /// Geometry, available once created.
    pub fn frame(&self) -> Option<Frame> {
        self.frame
    }

    pub fn layer(&self) -> i64 {
        self.props.int("layer").unwrap_or(0)
    }

    pub fn color(&self, id: &str) -> Option<Rgba<u8>> {
        palette_color(&self.props, id)
    }
}

impl Resource for Sprite {
    fn schema(&self) -> &'static Schema {
        &SPRITE
    }

    fn properties(&self) -> &Properties {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.props
    }

    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        self.frame = Some(compute_frame(&self.props)?);
        Ok(())
    }

    fn on_destroy(&mut self) {
        self.frame = None;
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

    fn registry_with_image() -> Registry {
        let mut registry = Registry::new();
        let mut image = Image::named("tiles.png");
        image.properties_mut().set_markup("width", "64").unwrap();
        image.properties_mut().set_markup("height", "32").unwrap();
        registry.put(ResourceCell::named("tiles", Box::new(image))).unwrap();

        let mut palette = ColorMap::new();
        palette.insert_color("skin", Rgba([250, 200, 180, 255]));
        registry.put(ResourceCell::named("pal", Box::new(palette))).unwrap();
        registry
    }

    fn sprite(attributes: &[(&str, &str)]) -> Sprite {
        let mut sprite = Sprite::new();
        for (key, value) in attributes {
            let props = sprite.properties_mut();
            if SPRITE.dependency(key).is_some() {
                props.set_dependency_name(key, *value).unwrap();
            } else {
                props.set_markup(key, value).unwrap();
            }
        }
        sprite
    }

    #[test]
    fn test_size_from_image() {
        let mut registry = registry_with_image();
        let body = sprite(&[("image", "tiles"), ("x", "4")]);
        registry.put(ResourceCell::named("hero", Box::new(body))).unwrap();

        let frame = registry.with::<Sprite, _>("hero", |s| s.frame()).unwrap().flatten().unwrap();
        assert_eq!(frame, Frame { x: 4, y: 0, width: 64, height: 32, scale: 1.0 });
        assert!(registry.peek("tiles").unwrap().is_created());
    }

    #[test]
    fn test_explicit_size_wins() {
        let mut registry = registry_with_image();
        let body = sprite(&[("image", "tiles"), ("w", "8"), ("h", "8")]);
        registry.put(ResourceCell::named("icon", Box::new(body))).unwrap();

        let frame = registry.with::<Sprite, _>("icon", |s| s.frame()).unwrap().flatten().unwrap();
        assert_eq!((frame.width, frame.height), (8, 8));
    }

    #[test]
    fn test_palette_lookup() {
        let mut registry = registry_with_image();
        registry.put(ResourceCell::named("hero", Box::new(sprite(&[("palette", "pal")])))).unwrap();

        let skin = registry.with::<Sprite, _>("hero", |s| s.color("skin")).unwrap().flatten();
        assert_eq!(skin, Some(Rgba([250, 200, 180, 255])));
    }

    #[test]
    fn test_invalid_alpha() {
        let mut registry = Registry::new();
        registry.put(ResourceCell::named("ghost", Box::new(sprite(&[("alpha", "1.5")])))).unwrap();
        assert!(registry.get("ghost").is_err());
    }

    #[test]
    fn test_palette_must_be_color_map() {
        let mut registry = registry_with_image();
        registry.put(ResourceCell::named("bad", Box::new(sprite(&[("palette", "tiles")])))).unwrap();
        let err = registry.get("bad").unwrap_err();
        assert!(matches!(err.root_cause(), ResourceError::DependencyTypeMismatch { .. }));
    }
}
