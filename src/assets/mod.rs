//! Built-in resource types.
//!
//! | Tag          | Type             | Dependencies                       |
//! |--------------|------------------|------------------------------------|
//! | `colormap`   | [`ColorMap`]     | `fallback` → ColorMap              |
//! | `image`      | [`Image`]        |                                    |
//! | `sprite`     | [`Sprite`]       | `image` → Image, `palette` → ColorMap |
//! | `animsprite` | [`AnimatedSprite`] | inherited from Sprite            |

mod animated_sprite;
mod color_map;
mod image_asset;
mod sprite;

pub use animated_sprite::{AnimatedSprite, ANIMATED_SPRITE};
pub use color_map::{ColorMap, COLOR_MAP};
pub use image_asset::{Image, IMAGE};
pub use sprite::{Sprite, SPRITE};

use crate::tags::{TypeInfo, TypeTable};

/// Register the built-in types and their canonical tags.
pub fn register_builtin(table: &mut TypeTable) {
    let builtin = [
        (TypeInfo::new(&COLOR_MAP, ColorMap::boxed), "colormap"),
        (TypeInfo::new(&IMAGE, Image::boxed).with_named(Image::boxed_named), "image"),
        (TypeInfo::new(&SPRITE, Sprite::boxed), "sprite"),
        (TypeInfo::new(&ANIMATED_SPRITE, AnimatedSprite::boxed), "animsprite"),
    ];

    for (info, tag) in builtin {
        table.register(info);
        if let Err(e) = table.register_tag(info.type_name(), tag) {
            log::error!("cannot register tag <{}>: {}", tag, e);
        }
    }
}
