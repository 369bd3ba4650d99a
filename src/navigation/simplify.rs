use bevy::prelude::*;

/// Distance from `p` to the segment `a`-`b`.
fn segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

/// Ramer–Douglas–Peucker polyline simplification.
///
/// Keeps the endpoints and every point needed to stay within `tolerance` of
/// the input polyline. Uses an explicit stack, so long grid paths cannot
/// overflow. A tolerance of zero (or less) still drops exactly collinear
/// interior points.
pub fn simplify_rdp(points: &[Vec3], tolerance: f32) -> Vec<Vec3> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut max_dist = 0.0_f32;
        let mut max_idx = first;
        for i in first + 1..last {
            let dist = segment_distance(points[i], points[first], points[last]);
            if dist > max_dist {
                max_dist = dist;
                max_idx = i;
            }
        }
        if max_dist > tolerance.max(0.0) {
            keep[max_idx] = true;
            stack.push((first, max_idx));
            stack.push((max_idx, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Sum of segment lengths.
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}
