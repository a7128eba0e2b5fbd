//! Geometry primitives shared by layout, hit-testing, and snapping.
//!
//! Everything is kurbo-native: `Rect` for axis-aligned bounds, `Affine` for
//! node transforms. Rotated bounds are handled as oriented corner quads with
//! a SAT overlap test.

use kurbo::{Affine, Point, Rect, Vec2};

/// Build a node's local transform: translate(x, y) · rotate(rotation) ·
/// scale(±1, ±1). Rotation is counter-clockwise radians.
pub fn local_matrix(x: f64, y: f64, rotation: f64, flip_x: bool, flip_y: bool) -> Affine {
    let sx = if flip_x { -1.0 } else { 1.0 };
    let sy = if flip_y { -1.0 } else { 1.0 };
    Affine::translate(Vec2::new(x, y)) * Affine::rotate(rotation) * Affine::scale_non_uniform(sx, sy)
}

/// Axis-aligned bounding box of `rect` mapped through `transform`.
pub fn transformed_bounds(rect: Rect, transform: Affine) -> Rect {
    let corners = oriented_corners(rect, transform);
    let mut out = Rect::new(
        corners[0].x,
        corners[0].y,
        corners[0].x,
        corners[0].y,
    );
    for p in &corners[1..] {
        out = out.union_pt(*p);
    }
    out
}

/// The four corners of `rect` mapped through `transform`, in winding order.
pub fn oriented_corners(rect: Rect, transform: Affine) -> [Point; 4] {
    [
        transform * Point::new(rect.x0, rect.y0),
        transform * Point::new(rect.x1, rect.y0),
        transform * Point::new(rect.x1, rect.y1),
        transform * Point::new(rect.x0, rect.y1),
    ]
}

/// Separating-axis overlap test between an oriented quad and an
/// axis-aligned rect. Candidate axes: x, y, and the quad's two edge normals.
pub fn sat_overlap(quad: &[Point; 4], rect: Rect) -> bool {
    let rect_corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let mut axes = [Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), Vec2::ZERO, Vec2::ZERO];
    let e0 = quad[1] - quad[0];
    let e1 = quad[3] - quad[0];
    axes[2] = Vec2::new(-e0.y, e0.x);
    axes[3] = Vec2::new(-e1.y, e1.x);

    for axis in axes {
        if axis.hypot2() < 1e-12 {
            continue; // degenerate quad edge
        }
        let (a_min, a_max) = project(quad, axis);
        let (b_min, b_max) = project(&rect_corners, axis);
        if a_max < b_min || b_max < a_min {
            return false;
        }
    }
    true
}

fn project(points: &[Point; 4], axis: Vec2) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in points {
        let d = p.to_vec2().dot(axis);
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

/// Clamp a corner radius so opposing corners never overlap.
pub fn clamp_corner_radius(radius: f64, width: f64, height: f64) -> f64 {
    radius.max(0.0).min(width / 2.0).min(height / 2.0)
}

/// The five snap handles of a bounding box: four corners plus the center.
pub fn handle_points(rect: Rect) -> [Point; 5] {
    [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
        rect.center(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn local_matrix_translates_then_rotates() {
        let m = local_matrix(10.0, 20.0, 0.0, false, false);
        assert_eq!(m * Point::ZERO, Point::new(10.0, 20.0));

        let m = local_matrix(0.0, 0.0, FRAC_PI_2, false, false);
        let p = m * Point::new(1.0, 0.0);
        assert!((p.x - 0.0).abs() < 1e-9 && (p.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flip_negates_axis() {
        let m = local_matrix(0.0, 0.0, 0.0, true, false);
        assert_eq!(m * Point::new(3.0, 4.0), Point::new(-3.0, 4.0));
    }

    #[test]
    fn transformed_bounds_of_rotated_square() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = transformed_bounds(r, Affine::rotate(FRAC_PI_2));
        assert!((b.x0 - -10.0).abs() < 1e-9);
        assert!((b.y1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn sat_detects_separation_and_overlap() {
        let quad = oriented_corners(Rect::new(0.0, 0.0, 10.0, 10.0), Affine::rotate(0.3));
        assert!(sat_overlap(&quad, Rect::new(-5.0, -5.0, 5.0, 5.0)));
        assert!(!sat_overlap(&quad, Rect::new(50.0, 50.0, 60.0, 60.0)));
    }

    #[test]
    fn corner_radius_clamps_to_half_extent() {
        assert_eq!(clamp_corner_radius(100.0, 40.0, 30.0), 15.0);
        assert_eq!(clamp_corner_radius(-2.0, 40.0, 30.0), 0.0);
        assert_eq!(clamp_corner_radius(4.0, 40.0, 30.0), 4.0);
    }
}
