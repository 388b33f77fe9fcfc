use crate::error::{Error, Result};
use image::{DynamicImage, RgbImage};
use ndarray::{Array2, ArrayD, ArrayView3, ArrayViewD, Axis};
use palette::{FromColor, Lab, Srgb};

fn to_byte(c: f32) -> u8 {
    (c.clamp(0., 1.) * 255.).round() as u8
}

pub fn rgb_to_lab_pixel([r, g, b]: [u8; 3]) -> Lab {
    Lab::from_color(Srgb::new(r, g, b).into_format::<f32>())
}

pub fn lab_to_rgb_pixel(lab: Lab) -> [u8; 3] {
    let rgb = Srgb::from_color(lab);
    [to_byte(rgb.red), to_byte(rgb.green), to_byte(rgb.blue)]
}

/// Lab with every channel stretched to the 8-bit range: `L·255/100`, `a+128`, `b+128`.
pub fn lab_to_scaled(lab: Lab) -> [f32; 3] {
    [lab.l * 255. / 100., lab.a + 128., lab.b + 128.]
}

pub fn scaled_to_lab([l, a, b]: [f32; 3]) -> Lab {
    Lab::new(l * 100. / 255., a - 128., b - 128.)
}

/// 8-bit Lab of an RGB color, each scaled channel rounded to a byte.
pub fn rgb_to_lab8(rgb: [u8; 3]) -> [u8; 3] {
    lab_to_scaled(rgb_to_lab_pixel(rgb)).map(|v| v.round().clamp(0., 255.) as u8)
}

pub fn lab8_to_rgb(lab: [u8; 3]) -> [u8; 3] {
    lab_to_rgb_pixel(scaled_to_lab(lab.map(f32::from)))
}

fn check_layout(shape: &[usize]) -> Result<()> {
    if !(2..=4).contains(&shape.len()) {
        return Err(Error::InvalidDimensions(
            shape.len(),
            "2 (colors), 3 (image) or 4 (batch)",
        ));
    }
    let channels = shape[shape.len() - 1];
    if channels != 3 {
        return Err(Error::InvalidChannels(channels));
    }
    Ok(())
}

/// Convert RGB values to Lab along the last axis.
///
/// Accepts a color list `(n, 3)`, an image `(h, w, 3)` or a batch `(n, h, w, 3)`.
pub fn rgb_to_lab(rgb: ArrayViewD<u8>) -> Result<ArrayD<f32>> {
    check_layout(rgb.shape())?;
    let last = Axis(rgb.ndim() - 1);

    let mut out = ArrayD::<f32>::zeros(rgb.raw_dim());
    for (src, mut dst) in rgb.lanes(last).into_iter().zip(out.lanes_mut(last)) {
        let lab = rgb_to_lab_pixel([src[0], src[1], src[2]]);
        dst[0] = lab.l;
        dst[1] = lab.a;
        dst[2] = lab.b;
    }
    Ok(out)
}

/// Inverse of [`rgb_to_lab`], rounding to bytes.
pub fn lab_to_rgb(lab: ArrayViewD<f32>) -> Result<ArrayD<u8>> {
    check_layout(lab.shape())?;
    let last = Axis(lab.ndim() - 1);

    let mut out = ArrayD::<u8>::zeros(lab.raw_dim());
    for (src, mut dst) in lab.lanes(last).into_iter().zip(out.lanes_mut(last)) {
        let rgb = lab_to_rgb_pixel(Lab::new(src[0], src[1], src[2]));
        dst[0] = rgb[0];
        dst[1] = rgb[1];
        dst[2] = rgb[2];
    }
    Ok(out)
}

pub fn image_to_lab(img: &RgbImage) -> Array2<Lab> {
    Array2::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        rgb_to_lab_pixel(img.get_pixel(x as u32, y as u32).0)
    })
}

/// Scale `[0, 1]` float images (`(h, w, c)` or `(n, h, w, c)`, c = 1 or 3) to bytes.
pub fn normalize_f32(img: ArrayViewD<f32>) -> Result<ArrayD<u8>> {
    if !(3..=4).contains(&img.ndim()) {
        return Err(Error::InvalidDimensions(img.ndim(), "3 or 4"));
    }
    let channels = img.shape()[img.ndim() - 1];
    if channels != 3 && channels != 1 {
        return Err(Error::InvalidChannels(channels));
    }
    if let Some(bad) = img.iter().find(|v| !v.is_finite() || **v < 0. || **v > 1.) {
        return Err(Error::InvalidPixelValue(*bad));
    }
    Ok(img.mapv(|v| (v * 255.).round_ties_even() as u8))
}

/// Bring any 3-channel image to 8-bit RGB without dropping or inventing channels.
pub fn normalize_dynamic(img: &DynamicImage) -> Result<RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb) => Ok(rgb.clone()),
        DynamicImage::ImageRgb16(_) => Ok(img.to_rgb8()),
        DynamicImage::ImageRgb32F(rgb) => {
            let (w, h) = rgb.dimensions();
            let view = ArrayView3::from_shape((h as usize, w as usize, 3), rgb.as_raw())?;
            let bytes: Vec<u8> = normalize_f32(view.into_dyn())?.iter().copied().collect();
            let len = bytes.len();
            RgbImage::from_vec(w, h, bytes).ok_or(Error::InvalidDimensions(len, "width * height * 3"))
        }
        other => Err(Error::InvalidChannels(
            other.color().channel_count() as usize,
        )),
    }
}
