use crate::shapes::Mask;
use image::{Rgb, RgbImage};
use palette::{FromColor, Hsv, Srgb};

/// Blend `color` over the pixels selected by `mask`.
pub fn recolor(img: &RgbImage, mask: &Mask, color: [u8; 3], alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0., 1.);
    let mut out = img.clone();
    for ((y, x), on) in mask.indexed_iter() {
        if !*on {
            continue;
        }
        if let Some(px) = out.get_pixel_mut_checked(x as u32, y as u32) {
            let blended: [u8; 3] = std::array::from_fn(|c| {
                (px[c] as f32 * (1. - alpha) + color[c] as f32 * alpha).round() as u8
            });
            *px = Rgb(blended);
        }
    }
    out
}

/// `k` colors spread evenly around the hue circle.
pub fn distinct_colors(k: usize) -> Vec<[u8; 3]> {
    (0..k)
        .map(|i| {
            let hue = 360. * i as f32 / k as f32;
            let rgb: Srgb<u8> = Srgb::from_color(Hsv::new(hue, 0.85, 0.95)).into_format();
            [rgb.red, rgb.green, rgb.blue]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::empty_mask;

    #[test]
    fn recolor_only_touches_mask() {
        let img = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let mut mask = empty_mask(4, 4);
        mask[[1, 2]] = true;

        let out = recolor(&img, &mask, [200, 100, 50], 0.5);
        assert_eq!(out.get_pixel(2, 1), &Rgb([100, 50, 25]));
        assert_eq!(out.get_pixel(1, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn distinct_colors_differ() {
        let colors = distinct_colors(6);
        assert_eq!(colors.len(), 6);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
