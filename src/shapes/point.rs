#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointF32 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }
}

impl PointF32 {
    pub fn new(x: f32, y: f32) -> PointF32 {
        PointF32 { x, y }
    }
}

impl From<imageproc::point::Point<i32>> for Point {
    fn from(p: imageproc::point::Point<i32>) -> Point {
        Point { x: p.x, y: p.y }
    }
}

impl From<Point> for imageproc::point::Point<i32> {
    fn from(p: Point) -> imageproc::point::Point<i32> {
        imageproc::point::Point::new(p.x, p.y)
    }
}

impl From<Point> for PointF32 {
    fn from(p: Point) -> PointF32 {
        PointF32 {
            x: p.x as f32,
            y: p.y as f32,
        }
    }
}
