use image::Rgba;
use std::any::Any;

use super::sprite::{compute_frame, palette_color, Frame, SPRITE};
use crate::registry::Registry;
use crate::resource::{FieldSpec, Properties, Resource, ResourceError, Schema};
use crate::value::ValueType;

pub static ANIMATED_SPRITE: Schema = Schema {
    type_name: "AnimatedSprite",
    parent: Some(&SPRITE),
    fields: &[
        FieldSpec::new("frames", ValueType::Int),
        FieldSpec::new("delay", ValueType::Float),
        FieldSpec::new("looping", ValueType::Bool),
    ],
    dependencies: &[],
};

/// A sprite stepping through `frames` cells of its image, `delay` seconds
/// apart.
#[derive(Debug)]
pub struct AnimatedSprite {
    props: Properties,
    frame: Option<Frame>,
}

impl Default for AnimatedSprite {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimatedSprite {
    pub fn new() -> Self {
        Self { props: Properties::new(&ANIMATED_SPRITE), frame: None }
    }

    pub(crate) fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    pub fn frame(&self) -> Option<Frame> {
        self.frame
    }

    pub fn frame_count(&self) -> i64 {
        self.props.int("frames").unwrap_or(1)
    }

    pub fn is_looping(&self) -> bool {
        self.props.bool("looping").unwrap_or(true)
    }

    /// Length of one pass through the animation, in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 * self.props.float("delay").unwrap_or(0.0)
    }

    pub fn color(&self, id: &str) -> Option<Rgba<u8>> {
        palette_color(&self.props, id)
    }
}

impl Resource for AnimatedSprite {
    fn schema(&self) -> &'static Schema {
        &ANIMATED_SPRITE
    }

    fn properties(&self) -> &Properties {
        &self.props
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.props
    }

    fn on_create(&mut self, _registry: &Registry) -> Result<(), ResourceError> {
        if self.frame_count() < 1 {
            return Err(ResourceError::Hook(format!(
                "an animation needs at least one frame, got {}",
                self.frame_count()
            )));
        }
        if self.props.float("delay").is_some_and(|d| d < 0.0) {
            return Err(ResourceError::Hook("delay cannot be negative".to_string()));
        }
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
