pub mod conversion;
pub mod extract;
pub mod helpers;

pub use conversion::{
    image_to_lab, lab_to_rgb, lab_to_rgb_pixel, lab_to_scaled, lab8_to_rgb, normalize_dynamic,
    normalize_f32, rgb_to_lab, rgb_to_lab_pixel, rgb_to_lab8, scaled_to_lab,
};
pub use extract::ColorExtractor;
pub use helpers::{distinct_colors, recolor};
