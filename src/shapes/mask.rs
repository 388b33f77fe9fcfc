use super::point::{Point, PointF32};
use super::rect::Rect;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::morphology;
use ndarray::{Array2, Array3, Axis, s};
use tracing::warn;

/// Boolean region selector, shape `(height, width)`.
pub type Mask = Array2<bool>;

/// Per-pixel segment codes, shape `(height, width)`.
pub type LabelMap = Array2<i32>;

const ON: Luma<u8> = Luma([255u8]);
const OFF: Luma<u8> = Luma([0u8]);

pub fn empty_mask(width: u32, height: u32) -> Mask {
    Mask::from_elem((height as usize, width as usize), false)
}

pub fn mask_dims(mask: &Mask) -> (u32, u32) {
    let (h, w) = mask.dim();
    (w as u32, h as u32)
}

pub fn to_gray(mask: &Mask) -> GrayImage {
    let (w, h) = mask_dims(mask);
    GrayImage::from_fn(w, h, |x, y| {
        if mask[[y as usize, x as usize]] { ON } else { OFF }
    })
}

pub fn from_gray(img: &GrayImage) -> Mask {
    Mask::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[0] != 0
    })
}

pub fn crop(img: &RgbImage, rect: Rect) -> RgbImage {
    let (x, y, w, h) = rect.to_tl();
    image::imageops::crop_imm(img, x as u32, y as u32, w as u32, h as u32).to_image()
}

pub fn crop_mask(mask: &Mask, rect: Rect) -> Mask {
    mask.slice(s![rect.top..rect.bottom, rect.left..rect.right])
        .to_owned()
}

/// imageproc takes the structuring element radius as u8, so larger kernels are capped at 255.
fn radius(kernel_size: usize) -> u8 {
    if kernel_size > u8::MAX as usize {
        warn!(kernel_size, "structuring element radius capped at 255");
    }
    kernel_size.min(u8::MAX as usize) as u8
}

/// Erode with a `(2k+1)` square element, treating pixels outside the mask as `background`.
pub fn erode(mask: &Mask, kernel_size: usize, background: bool) -> Mask {
    if kernel_size == 0 || mask.is_empty() {
        return mask.clone();
    }

    let k = radius(kernel_size) as u32;
    let (w, h) = mask_dims(mask);
    let fill = if background { ON } else { OFF };

    let mut padded = GrayImage::from_pixel(w + 2 * k, h + 2 * k, fill);
    for ((y, x), v) in mask.indexed_iter() {
        padded.put_pixel(x as u32 + k, y as u32 + k, if *v { ON } else { OFF });
    }

    let eroded = morphology::erode(&padded, Norm::LInf, k as u8);
    let eroded = image::imageops::crop_imm(&eroded, k, k, w, h).to_image();
    from_gray(&eroded)
}

/// Erode every plane (last axis) independently.
pub fn erode_planes(masks: &Array3<bool>, kernel_size: usize, background: bool) -> Array3<bool> {
    let mut out = masks.clone();
    for (i, plane) in masks.axis_iter(Axis(2)).enumerate() {
        let eroded = erode(&plane.to_owned(), kernel_size, background);
        out.index_axis_mut(Axis(2), i).assign(&eroded);
    }
    out
}

/// Dilate with a `(2k+1)` square element.
pub fn dilate(mask: &Mask, kernel_size: usize) -> Mask {
    if kernel_size == 0 || mask.is_empty() {
        return mask.clone();
    }
    from_gray(&morphology::dilate(&to_gray(mask), Norm::LInf, radius(kernel_size)))
}

/// Outer boundary enclosing the largest area, empty when the mask has no regions.
pub fn biggest_contour(mask: &Mask) -> Vec<Point> {
    if mask.is_empty() {
        return Vec::new();
    }

    let mut best: Option<(f64, Vec<Point>)> = None;
    for contour in find_contours::<i32>(&to_gray(mask)) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let points: Vec<Point> = contour.points.into_iter().map(Point::from).collect();
        let area = contour_area(&points);
        match best {
            Some((best_area, _)) if best_area >= area => {}
            _ => best = Some((area, points)),
        }
    }

    best.map(|(_, points)| points).unwrap_or_default()
}

/// Shoelace area of a closed contour.
pub fn contour_area(contour: &[Point]) -> f64 {
    if contour.len() < 3 {
        return 0.;
    }
    let mut twice_area = 0i64;
    for (i, p) in contour.iter().enumerate() {
        let q = contour[(i + 1) % contour.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area as f64 / 2.).abs()
}

pub fn mass_center(contour: &[Point]) -> Option<PointF32> {
    if contour.is_empty() {
        return None;
    }
    let n = contour.len() as f32;
    let (sx, sy) = contour
        .iter()
        .fold((0f32, 0f32), |(sx, sy), p| (sx + p.x as f32, sy + p.y as f32));
    Some(PointF32::new(sx / n, sy / n))
}

pub fn bounding_rect(contour: &[Point]) -> Option<Rect> {
    let first = contour.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in contour {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Some(Rect::from_corners(min_x, min_y, max_x, max_y))
}

/// Solid mask of the region enclosed by `contour`, boundary included.
pub fn fill_contour(contour: &[Point], (width, height): (u32, u32)) -> Mask {
    let mut canvas = GrayImage::new(width, height);

    let mut poly: Vec<imageproc::point::Point<i32>> =
        contour.iter().map(|p| (*p).into()).collect();
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() >= 3 {
        draw_polygon_mut(&mut canvas, &poly, ON);
    }
    for p in contour {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
            canvas.put_pixel(p.x as u32, p.y as u32, ON);
        }
    }

    from_gray(&canvas)
}

/// Filled circle clipped to the image; the center may lie outside it.
pub fn circle_mask((width, height): (u32, u32), center: Point, radius: i32) -> Mask {
    let mut canvas = GrayImage::new(width, height);
    if radius >= 0 {
        draw_filled_circle_mut(&mut canvas, (center.x, center.y), radius, ON);
    }
    from_gray(&canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: usize, from: usize, to: usize) -> Mask {
        Mask::from_shape_fn((size, size), |(y, x)| {
            (from..to).contains(&y) && (from..to).contains(&x)
        })
    }

    #[test]
    fn erode_shrinks_by_kernel() {
        let mask = square_mask(20, 5, 15);
        let eroded = erode(&mask, 2, false);
        assert_eq!(eroded.iter().filter(|v| **v).count(), 36);
        assert!(eroded[[7, 7]]);
        assert!(!eroded[[6, 6]]);
    }

    #[test]
    fn erode_background_controls_border() {
        let full = Mask::from_elem((10, 10), true);
        assert!(erode(&full, 1, true).iter().all(|v| *v));
        let eroded = erode(&full, 1, false);
        assert!(!eroded[[0, 0]]);
        assert!(eroded[[5, 5]]);
        assert_eq!(eroded.iter().filter(|v| **v).count(), 64);
    }

    #[test]
    fn erode_planes_is_per_plane() {
        let mut planes = Array3::from_elem((10, 10, 2), false);
        planes
            .index_axis_mut(Axis(2), 0)
            .assign(&square_mask(10, 2, 8));
        let eroded = erode_planes(&planes, 1, false);
        assert_eq!(eroded.dim(), (10, 10, 2));
        assert_eq!(
            eroded.index_axis(Axis(2), 0).iter().filter(|v| **v).count(),
            16
        );
        assert!(eroded.index_axis(Axis(2), 1).iter().all(|v| !*v));
    }

    #[test]
    fn dilate_grows_by_kernel() {
        let mask = square_mask(20, 9, 11);
        let dilated = dilate(&mask, 3);
        assert_eq!(dilated.iter().filter(|v| **v).count(), 64);
    }

    #[test]
    fn oversized_kernel_is_capped() {
        let mut mask = empty_mask(601, 601);
        mask[[300, 300]] = true;
        let dilated = dilate(&mask, 300);
        assert_eq!(dilated.iter().filter(|v| **v).count(), 511 * 511);
    }

    #[test]
    fn biggest_contour_picks_largest_region() {
        let mut mask = square_mask(30, 2, 6);
        for y in 10..25 {
            for x in 10..25 {
                mask[[y, x]] = true;
            }
        }
        let contour = biggest_contour(&mask);
        assert_eq!(bounding_rect(&contour), Some(Rect::from_tl(10, 10, 15, 15)));
        assert_eq!(contour_area(&contour), 14. * 14.);

        let filled = fill_contour(&contour, (30, 30));
        assert_eq!(filled.iter().filter(|v| **v).count(), 15 * 15);
    }

    #[test]
    fn empty_mask_has_no_contour() {
        let contour = biggest_contour(&empty_mask(10, 10));
        assert!(contour.is_empty());
        assert_eq!(bounding_rect(&contour), None);
        assert_eq!(mass_center(&contour), None);
        assert!(fill_contour(&contour, (10, 10)).iter().all(|v| !*v));
    }

    #[test]
    fn single_pixel_contour() {
        let mut mask = empty_mask(5, 5);
        mask[[2, 3]] = true;
        let contour = biggest_contour(&mask);
        assert_eq!(bounding_rect(&contour), Some(Rect::from_tl(3, 2, 1, 1)));
        assert_eq!(fill_contour(&contour, (5, 5)), mask);
    }

    #[test]
    fn circle_mask_clips_to_image() {
        let mask = circle_mask((10, 10), Point::new(-3, -3), 5);
        assert!(mask[[0, 0]]);
        assert!(!mask[[9, 9]]);

        let far = circle_mask((10, 10), Point::new(100, 100), 5);
        assert!(far.iter().all(|v| !*v));
    }

    #[test]
    fn crop_mask_slices_rect() {
        let mask = square_mask(10, 2, 5);
        let cropped = crop_mask(&mask, Rect::from_tl(2, 2, 3, 4));
        assert_eq!(cropped.dim(), (4, 3));
        assert_eq!(cropped.iter().filter(|v| **v).count(), 9);
    }
}
