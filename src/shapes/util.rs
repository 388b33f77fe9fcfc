// Truncates toward zero, matching integer casts of scaled coordinates.
pub fn trunc_mult(v: f64, f: f64) -> i32 {
    (v * f).trunc() as i32
}

/// Linear-interpolated quantile of sorted values, `q` in `[0, 1]`.
pub fn quantile_sorted(sorted: &[f32], q: f32) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0., 1.) * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
