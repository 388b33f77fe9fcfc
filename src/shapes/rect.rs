use super::point::PointF32;
use super::util::trunc_mult;
use crate::error::{Error, Result};

/// Axis-aligned rectangle in image coordinates.
///
/// Top-left corner is the origin, so `bottom >= top` and `right >= left`.
/// `top`/`left` are inclusive, `bottom`/`right` exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rect {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Rect {
    pub fn new(top: i32, bottom: i32, left: i32, right: i32) -> Rect {
        Rect {
            top: top.min(bottom),
            bottom: top.max(bottom),
            left: left.min(right),
            right: left.max(right),
        }
    }

    /// Position + size convention: `(x, y, w, h)`.
    pub fn from_tl(x: i32, y: i32, w: i32, h: i32) -> Rect {
        Rect::new(y, y + h, x, x + w)
    }

    /// Corner-pair convention with inclusive right/bottom corner.
    pub fn from_corners(left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        Rect::new(top, bottom + 1, left, right + 1)
    }

    pub fn to_tl(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.width(), self.height())
    }

    pub fn to_corners(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.right - 1, self.bottom - 1)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center(&self) -> PointF32 {
        PointF32 {
            x: 0.5 * (self.left + self.right) as f32,
            y: 0.5 * (self.top + self.bottom) as f32,
        }
    }

    /// Scale about `origin` (rect center when `None`), truncating to integer bounds.
    pub fn scale(&self, factor: f64, origin: Option<(f64, f64)>) -> Rect {
        let (ox, oy) = origin.unwrap_or((
            0.5 * (self.left + self.right) as f64,
            0.5 * (self.top + self.bottom) as f64,
        ));

        let shift = |v: i32, o: f64| (trunc_mult(v as f64 - o, factor) as f64 + o).trunc() as i32;

        Rect::new(
            shift(self.top, oy),
            shift(self.bottom, oy),
            shift(self.left, ox),
            shift(self.right, ox),
        )
    }

    pub fn overlap_pct(&self, other: &Rect) -> f32 {
        let x_min = self.left.max(other.left);
        let x_max = self.right.min(other.right);
        let y_min = self.top.max(other.top);
        let y_max = self.bottom.min(other.bottom);

        let overlap_area = if x_min < x_max && y_min < y_max {
            (x_max - x_min) as i64 * (y_max - y_min) as i64
        } else {
            0
        };

        let area_delta = self.area() + other.area() - overlap_area;

        if area_delta > 0 {
            overlap_area as f32 / area_delta as f32 * 100.
        } else {
            0.
        }
    }
}

/// Expand the shorter side so the rect becomes a square of the longer side.
pub fn squareify(rect: Rect) -> Rect {
    let (x, y, w, h) = rect.to_tl();
    if w >= h {
        Rect::from_tl(x, y - (w - h) / 2, w, w)
    } else {
        Rect::from_tl(x - (h - w) / 2, y, h, h)
    }
}

/// Move `rect` inside a `width` x `height` image.
///
/// Rects bigger than the image are rejected unless `allow_scaling` is set, in
/// which case they are shrunk about their center to fit first.
pub fn safe_rect(rect: Rect, (width, height): (u32, u32), allow_scaling: bool) -> Result<Rect> {
    let im_w = width as i32;
    let im_h = height as i32;

    let mut rect = rect;
    if rect.width() > im_w || rect.height() > im_h {
        if !allow_scaling {
            return Err(if rect.width() > im_w {
                Error::RectTooLarge {
                    dimension: "width",
                    size: rect.width(),
                    limit: im_w,
                }
            } else {
                Error::RectTooLarge {
                    dimension: "height",
                    size: rect.height(),
                    limit: im_h,
                }
            });
        }
        let factor = (im_w as f64 / rect.width() as f64).min(im_h as f64 / rect.height() as f64);
        rect = rect.scale(factor, None);
    }

    let w = rect.width().min(im_w);
    let h = rect.height().min(im_h);
    let mut x = rect.left.max(0);
    let mut y = rect.top.max(0);
    x -= (x + w - im_w).max(0);
    y -= (y + h - im_h).max(0);

    Ok(Rect::from_tl(x, y, w, h))
}
