//! Image file references.

use image::ImageFormat;
use std::any::Any;

use crate::registry::Registry;
use crate::resource::{FieldSpec, Properties, Resource, ResourceError, Schema};
use crate::value::{Value, ValueType};

pub static IMAGE: Schema = Schema {
    type_name: "Image",
    parent: None,
    fields: &[
        FieldSpec::new("url", ValueType::Text).required(),
        FieldSpec::new("width", ValueType::Int),
        FieldSpec::new("height", ValueType::Int),
        FieldSpec::new("linear", ValueType::Bool),
    ],
    dependencies: &[],
};

/// An image file, identified by `url`.
///
/// Creation checks that the url names a known image format; the file itself
/// is not read.
#[derive(Debug)]
pub struct Image {
    props: Properties,
    format: Option<ImageFormat>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    pub fn new() -> Self {
        Self { props: Properties::new(&IMAGE), format: None }
    }

    /// An image whose url defaults to its name, as in `<image name="tiles.png"/>`.
    pub fn named(name: &str) -> Self {
        let mut image = Self::new();
        if image.props.set("url", Value::Text(name.to_string())).is_err() {
            log::error!("image schema has no text url");
        }
        image
    }

    pub(crate) fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    pub(crate) fn boxed_named(name: &str) -> Box<dyn Resource> {
        Box::new(Self::named(name))
    }

    pub fn url(&self) -> Option<&str> {
        self.props.text("url")
    }

    /// Declared size, when both dimensions are set.
    pub fn size(&self) -> Option<(i64, i64)> {
        Some((self.props.int("width")?, self.props.int("height")?))
    }

    /// Format detected at creation.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn is_linear(&self) -> bool {
        self.props.bool("linear").unwrap_or(false)
    }
}

impl Resource for Image {
    fn schema(&self) -> &'static Schema {
        &IMAGE
    }

    fn properties(&self) -> &Properties {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.props
    }

    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        let url = self.url().ok_or_else(|| ResourceError::Hook("image has no url".to_string()))?;
        let format = ImageFormat::from_path(url)
            .map_err(|_| ResourceError::Hook(format!("unsupported image format: '{}'", url)))?;

        for dimension in ["width", "height"] {
            if let Some(value) = self.props.int(dimension) {
                if value <= 0 {
                    let message = format!("{} must be positive, got {}", dimension, value);
                    return Err(ResourceError::Hook(message));
                }
            }
        }

        self.format = Some(format);
        Ok(())
    }

    fn on_destroy(&mut self) {
        self.format = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
