//! Planar geometry helpers for track-local coordinates.
//!
//! Everything here works on meters in the track plane; there is no
//! geodesy anywhere in the pipeline.

/// Squared distance between two points.
pub fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    dx * dx + dy * dy
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    dist2(a, b).sqrt()
}

/// 2D cross product (z component).
pub fn cross2(a: (f64, f64), b: (f64, f64)) -> f64 {
    a.0 * b.1 - a.1 * b.0
}

/// Project `point` onto the segment `a..b`.
///
/// Returns `(t, x, y)` where `t` in 0..=1 is the normalized position along
/// the segment and `(x, y)` is the closest point.
pub fn project_onto_segment(point: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64, f64) {
    let vx = b.0 - a.0;
    let vy = b.1 - a.1;
    let len2 = vx * vx + vy * vy;
    if len2 <= f64::EPSILON {
        return (0.0, a.0, a.1);
    }
    let t = (((point.0 - a.0) * vx + (point.1 - a.1) * vy) / len2).clamp(0.0, 1.0);
    (t, a.0 + t * vx, a.1 + t * vy)
}

/// Intersection point of the closed segments `a1..a2` and `b1..b2`, if any.
///
/// Solved parametrically: `a1 + t*r` meets `b1 + u*s` where both parameters
/// land in `0..=1`. Collinear overlaps report the midpoint of the shared
/// extent so the caller always gets a representative point.
pub fn segment_intersection(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> Option<(f64, f64)> {
    const EPS: f64 = 1e-9;
    let r = (a2.0 - a1.0, a2.1 - a1.1);
    let s = (b2.0 - b1.0, b2.1 - b1.1);
    let qp = (b1.0 - a1.0, b1.1 - a1.1);
    let denom = cross2(r, s);

    if denom.abs() > EPS {
        let t = cross2(qp, s) / denom;
        let u = cross2(qp, r) / denom;
        if (-EPS..=1.0 + EPS).contains(&t) && (-EPS..=1.0 + EPS).contains(&u) {
            return Some((a1.0 + t * r.0, a1.1 + t * r.1));
        }
        return None;
    }

    let len2 = r.0 * r.0 + r.1 * r.1;
    if len2 <= f64::EPSILON {
        // `a` degenerates to a point; a distance check settles it.
        let (_, cx, cy) = project_onto_segment(a1, b1, b2);
        return (dist2(a1, (cx, cy)) <= EPS).then_some(a1);
    }
    if cross2(qp, r).abs() > EPS * len2.sqrt().max(1.0) {
        // Parallel but not collinear.
        return None;
    }
    let t0 = (qp.0 * r.0 + qp.1 * r.1) / len2;
    let t1 = t0 + (s.0 * r.0 + s.1 * r.1) / len2;
    let lo = t0.min(t1).max(0.0);
    let hi = t0.max(t1).min(1.0);
    if lo > hi {
        return None;
    }
    let tm = (lo + hi) / 2.0;
    Some((a1.0 + tm * r.0, a1.1 + tm * r.1))
}

/// Wrap an angle into (-pi, pi].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * std::f64::consts::PI);
    if wrapped > std::f64::consts::PI {
        wrapped - 2.0 * std::f64::consts::PI
    } else {
        wrapped
    }
}

/// Interpolate between two angles along the shortest arc.
pub fn lerp_angle(from: f64, to: f64, frac: f64) -> f64 {
    wrap_angle(from + wrap_angle(to - from) * frac)
}

/// Tangents for monotone cubic Hermite interpolation (Fritsch-Carlson).
///
/// Keeps the interpolant free of overshoot between samples, which is what
/// makes the positional-continuity invariant hold without clamping.
pub fn monotone_tangents(times: &[f64], values: &[f64]) -> Vec<f64> {
    let n = values.len();
    debug_assert_eq!(times.len(), n);
    if n < 2 {
        return vec![0.0; n];
    }

    let mut slopes = Vec::with_capacity(n - 1);
    for i in 0..n - 1 {
        let dt = times[i + 1] - times[i];
        slopes.push(if dt > 0.0 { (values[i + 1] - values[i]) / dt } else { 0.0 });
    }

    let mut tangents = vec![0.0; n];
    tangents[0] = slopes[0];
    tangents[n - 1] = slopes[n - 2];
    for i in 1..n - 1 {
        if slopes[i - 1] * slopes[i] <= 0.0 {
            tangents[i] = 0.0;
        } else {
            tangents[i] = (slopes[i - 1] + slopes[i]) / 2.0;
        }
    }

    // Limit tangents so the interpolant stays monotone on each interval.
    for i in 0..n - 1 {
        if slopes[i] == 0.0 {
            tangents[i] = 0.0;
            tangents[i + 1] = 0.0;
            continue;
        }
        let alpha = tangents[i] / slopes[i];
        let beta = tangents[i + 1] / slopes[i];
        let mag2 = alpha * alpha + beta * beta;
        if mag2 > 9.0 {
            let tau = 3.0 / mag2.sqrt();
            tangents[i] = tau * alpha * slopes[i];
            tangents[i + 1] = tau * beta * slopes[i];
        }
    }

    tangents
}

/// Evaluate the cubic Hermite interpolant on the interval `[t0, t1]`.
pub fn hermite(t: f64, t0: f64, t1: f64, v0: f64, v1: f64, m0: f64, m1: f64) -> f64 {
    let h = t1 - t0;
    if h <= 0.0 {
        return v0;
    }
    let s = ((t - t0) / h).clamp(0.0, 1.0);
    let s2 = s * s;
    let s3 = s2 * s;
    (2.0 * s3 - 3.0 * s2 + 1.0) * v0
        + (s3 - 2.0 * s2 + s) * h * m0
        + (-2.0 * s3 + 3.0 * s2) * v1
        + (s3 - s2) * h * m1
}

/// Piecewise monotone cubic interpolant over sample points.
///
/// Evaluation keeps a cursor so sweeping queries in increasing time are
/// linear overall.
#[derive(Debug, Clone)]
pub struct MonotoneCubic {
    times: Vec<f64>,
    values: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneCubic {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        let tangents = monotone_tangents(&times, &values);
        Self { times, values, tangents }
    }

    /// Evaluate at `t`, advancing `cursor` as needed. `t` is clamped to the
    /// sampled time range.
    pub fn eval(&self, t: f64, cursor: &mut usize) -> f64 {
        let n = self.times.len();
        if n == 1 {
            return self.values[0];
        }
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }
        while *cursor + 2 < n && self.times[*cursor + 1] <= t {
            *cursor += 1;
        }
        let i = *cursor;
        hermite(
            t,
            self.times[i],
            self.times[i + 1],
            self.values[i],
            self.values[i + 1],
            self.tangents[i],
            self.tangents[i + 1],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_onto_segment_clamps_to_endpoints() {
        let (t, x, y) = project_onto_segment((-5.0, 1.0), (0.0, 0.0), (10.0, 0.0));
        assert_eq!(t, 0.0);
        assert_eq!((x, y), (0.0, 0.0));

        let (t, x, _) = project_onto_segment((20.0, 1.0), (0.0, 0.0), (10.0, 0.0));
        assert_eq!(t, 1.0);
        assert_eq!(x, 10.0);
    }

    #[test]
    fn segment_intersection_finds_the_crossing_point() {
        let hit =
            segment_intersection((0.0, 0.0), (10.0, 10.0), (0.0, 10.0), (10.0, 0.0)).unwrap();
        assert!((hit.0 - 5.0).abs() < 1e-9);
        assert!((hit.1 - 5.0).abs() < 1e-9);

        assert!(segment_intersection((0.0, 0.0), (10.0, 0.0), (0.0, 5.0), (10.0, 5.0)).is_none());
    }

    #[test]
    fn collinear_overlap_reports_a_point_on_the_shared_extent() {
        let hit =
            segment_intersection((0.0, 0.0), (10.0, 0.0), (5.0, 0.0), (15.0, 0.0)).unwrap();
        assert!(hit.1.abs() < 1e-9);
        assert!((5.0..=10.0).contains(&hit.0));

        assert!(segment_intersection((0.0, 0.0), (10.0, 0.0), (11.0, 0.0), (15.0, 0.0)).is_none());
    }

    #[test]
    fn monotone_cubic_does_not_overshoot() {
        let times = vec![0.0, 1.0, 2.0, 3.0];
        let values = vec![0.0, 0.0, 10.0, 10.0];
        let spline = MonotoneCubic::new(times, values);
        let mut cursor = 0;
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=300 {
            let t = i as f64 / 100.0;
            let v = spline.eval(t, &mut cursor);
            assert!((-1e-9..=10.0 + 1e-9).contains(&v), "overshoot at t={t}: {v}");
            assert!(v >= prev - 1e-9, "non-monotone at t={t}");
            prev = v;
        }
    }

    #[test]
    fn lerp_angle_takes_shortest_arc() {
        let a = 3.0;
        let b = -3.0; // short way crosses pi
        let mid = lerp_angle(a, b, 0.5);
        assert!(mid.abs() > 3.0 || (mid - std::f64::consts::PI).abs() < 0.3);
    }
}
