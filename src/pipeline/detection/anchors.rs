use crate::shapes::PointF32;

pub const NUM_ANCHORS: usize = 896;

const INPUT_SIZE: u32 = 128;
// stride 8 layer carries 2 anchors per cell, the three stride 16 layers are
// merged into 6 per cell
const LAYERS: [(u32, usize); 2] = [(8, 2), (16, 6)];

/// Anchor centers of the short-range BlazeFace model, normalized to [0, 1].
///
/// Short-range anchors all have unit size, so only the centers matter.
pub fn gen_anchors() -> Vec<PointF32> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in LAYERS {
        let cells = INPUT_SIZE.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = PointF32 {
                    x: (x as f32 + 0.5) / cells as f32,
                    y: (y as f32 + 0.5) / cells as f32,
                };
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}
