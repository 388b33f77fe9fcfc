pub mod mask;
pub mod point;
pub mod rect;
mod util;

pub use mask::{
    LabelMap, Mask, biggest_contour, bounding_rect, circle_mask, contour_area, crop, crop_mask,
    dilate, empty_mask, erode, erode_planes, fill_contour, mass_center,
};
pub use point::{Point, PointF32};
pub use rect::{Rect, safe_rect, squareify};
pub(crate) use util::quantile_sorted;
