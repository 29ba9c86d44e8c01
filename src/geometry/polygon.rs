use std::f64::consts::PI;

use serde::Serialize;

use super::point::{Mirroring, Point};

/// Segments used to approximate a full circle.
pub const ARC_STEPS: usize = 40;

/// Two vertices closer than this are the same vertex.
pub const CLOSE_EPSILON: f64 = 1e-12;

/// Axis-aligned bounding box, empty until the first expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Point::new(f64::INFINITY, f64::INFINITY),
            max: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn expand_point(&mut self, x: f64, y: f64) {
        self.min.x = self.min.x.min(x);
        self.min.y = self.min.y.min(y);
        self.max.x = self.max.x.max(x);
        self.max.y = self.max.y.max(y);
    }

    pub fn merge(&mut self, other: &Bounds) {
        if !other.is_empty() {
            self.expand_point(other.min.x, other.min.y);
            self.expand_point(other.max.x, other.max.y);
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// A polygon stored as a flat packed buffer of alternating x,y coordinates.
///
/// The packed layout keeps transforms and bounds computations as linear scans
/// over one allocation. A polygon is closed when its last vertex equals its
/// first within [`CLOSE_EPSILON`]. `solid` distinguishes filled outlines from
/// zero-width open polylines produced by thin draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    coords: Vec<f64>,
    pub solid: bool,
}

impl Default for Polygon {
    fn default() -> Self {
        Self::new()
    }
}

impl Polygon {
    pub fn new() -> Self {
        Self {
            coords: Vec::new(),
            solid: true,
        }
    }

    pub fn with_capacity(vertices: usize) -> Self {
        Self {
            coords: Vec::with_capacity(vertices * 2),
            solid: true,
        }
    }

    /// Open polyline carrying a thin (zero-width) trace.
    pub fn wire(points: &[Point]) -> Self {
        let mut p = Polygon::with_capacity(points.len());
        for pt in points {
            p.push(*pt);
        }
        p.solid = false;
        p
    }

    pub fn from_points(points: &[Point]) -> Self {
        let mut p = Polygon::with_capacity(points.len());
        for pt in points {
            p.push(*pt);
        }
        p
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.coords.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn point(&self, i: usize) -> Point {
        Point::new(self.coords[i * 2], self.coords[i * 2 + 1])
    }

    pub fn first(&self) -> Option<Point> {
        (!self.is_empty()).then(|| self.point(0))
    }

    pub fn last(&self) -> Option<Point> {
        (!self.is_empty()).then(|| self.point(self.len() - 1))
    }

    pub fn push(&mut self, p: Point) {
        self.coords.push(p.x);
        self.coords.push(p.y);
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.coords.chunks_exact(2).map(|c| Point::new(c[0], c[1]))
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn is_closed(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) if self.len() > 1 => {
                a.distance_squared(&b) < CLOSE_EPSILON * CLOSE_EPSILON
            }
            _ => false,
        }
    }

    /// Append the first vertex if the ring is not yet closed.
    pub fn close(&mut self) {
        if let Some(first) = self.first() {
            if !self.is_closed() {
                self.push(first);
            }
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for pair in self.coords.chunks_exact_mut(2) {
            pair[0] += dx;
            pair[1] += dy;
        }
    }

    /// Rotate about the origin by `angle` radians, counter-clockwise.
    pub fn rotate(&mut self, angle: f64) {
        if angle.abs() < CLOSE_EPSILON {
            return;
        }
        let (sin, cos) = angle.sin_cos();
        for pair in self.coords.chunks_exact_mut(2) {
            let (x, y) = (pair[0], pair[1]);
            pair[0] = x * cos - y * sin;
            pair[1] = x * sin + y * cos;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.coords {
            *c *= factor;
        }
    }

    pub fn mirror(&mut self, axis: Mirroring) {
        let (fx, fy) = match axis {
            Mirroring::None => return,
            Mirroring::X => (-1.0, 1.0),
            Mirroring::Y => (1.0, -1.0),
            Mirroring::XY => (-1.0, -1.0),
        };
        for pair in self.coords.chunks_exact_mut(2) {
            pair[0] *= fx;
            pair[1] *= fy;
        }
        // A single-axis flip reverses winding; restore the original
        // orientation so outlines stay CCW and holes stay CW.
        if fx * fy < 0.0 {
            self.reverse();
        }
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for pair in self.coords.chunks_exact(2) {
            b.expand_point(pair[0], pair[1]);
        }
        b
    }

    /// Shoelace area; positive for counter-clockwise winding.
    pub fn signed_area(&self) -> f64 {
        let n = self.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.point(i);
            let b = self.point((i + 1) % n);
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    pub fn reverse(&mut self) {
        let n = self.len();
        for i in 0..n / 2 {
            let j = n - 1 - i;
            self.coords.swap(i * 2, j * 2);
            self.coords.swap(i * 2 + 1, j * 2 + 1);
        }
    }
}

/// Circle of radius `r` approximated with `n` segments, traversed
/// counter-clockwise starting at angle `-rotation`. Yields `n + 1` vertices,
/// the last equal to the first.
pub fn circle_to_polygon(r: f64, n: usize, rotation: f64) -> Polygon {
    let mut p = Polygon::with_capacity(n + 1);
    for k in 0..=n {
        let angle = -rotation + 2.0 * PI * (k % n) as f64 / n as f64;
        p.push(Point::new(r * angle.cos(), r * angle.sin()));
    }
    p
}

/// Axis-aligned rectangle centered on the origin, 5 vertices, CCW.
pub fn rectangle_to_polygon(w: f64, h: f64) -> Polygon {
    let (hw, hh) = (w / 2.0, h / 2.0);
    Polygon::from_points(&[
        Point::new(-hw, -hh),
        Point::new(hw, -hh),
        Point::new(hw, hh),
        Point::new(-hw, hh),
        Point::new(-hw, -hh),
    ])
}

/// Obround (stadium) centered on the origin: two half circles joined by
/// straight segments. Degenerates to a circle when the sides are equal.
pub fn obround_to_polygon(w: f64, h: f64) -> Polygon {
    if (w - h).abs() < CLOSE_EPSILON {
        return circle_to_polygon(w / 2.0, ARC_STEPS, 0.0);
    }
    let steps = ARC_STEPS / 2;
    let mut p = Polygon::with_capacity(ARC_STEPS + 3);
    if w > h {
        let r = h / 2.0;
        let cx = (w - h) / 2.0;
        // Right cap sweeps -90°..90°, left cap 90°..270°.
        for k in 0..=steps {
            let angle = -PI / 2.0 + PI * k as f64 / steps as f64;
            p.push(Point::new(cx + r * angle.cos(), r * angle.sin()));
        }
        for k in 0..=steps {
            let angle = PI / 2.0 + PI * k as f64 / steps as f64;
            p.push(Point::new(-cx + r * angle.cos(), r * angle.sin()));
        }
    } else {
        let r = w / 2.0;
        let cy = (h - w) / 2.0;
        // Top cap sweeps 0°..180°, bottom cap 180°..360°.
        for k in 0..=steps {
            let angle = PI * k as f64 / steps as f64;
            p.push(Point::new(r * angle.cos(), cy + r * angle.sin()));
        }
        for k in 0..=steps {
            let angle = PI + PI * k as f64 / steps as f64;
            p.push(Point::new(r * angle.cos(), -cy + r * angle.sin()));
        }
    }
    p.close();
    p
}

/// Counter-clockwise arc from `start` to `end` around `center`, sampled with
/// [`ARC_STEPS`] steps. The end angle is wrapped into the start angle's
/// forward revolution. `pin_start`/`pin_end` substitute the exact endpoint
/// coordinates for the first/last sample so adjoining geometry meets without
/// float drift.
pub fn arc_to_polygon(
    start: Point,
    end: Point,
    center: Point,
    pin_start: bool,
    pin_end: bool,
) -> Polygon {
    let r = start.distance(&center);
    let start_angle = start.angle_from(&center);
    let mut end_angle = end.angle_from(&center);
    while end_angle < start_angle {
        end_angle += 2.0 * PI;
    }
    while end_angle >= start_angle + 2.0 * PI {
        end_angle -= 2.0 * PI;
    }

    let mut p = Polygon::with_capacity(ARC_STEPS + 1);
    for k in 0..=ARC_STEPS {
        if k == 0 && pin_start {
            p.push(start);
            continue;
        }
        if k == ARC_STEPS && pin_end {
            p.push(end);
            continue;
        }
        let t = k as f64 / ARC_STEPS as f64;
        let angle = start_angle + t * (end_angle - start_angle);
        p.push(Point::new(
            center.x + r * angle.cos(),
            center.y + r * angle.sin(),
        ));
    }
    p
}

/// A group of polygons forming one image layer or one shape with holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PolygonSet {
    pub polygons: Vec<Polygon>,
}

impl PolygonSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polygon(p: Polygon) -> Self {
        Self { polygons: vec![p] }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn push(&mut self, p: Polygon) {
        self.polygons.push(p);
    }

    pub fn extend(&mut self, other: PolygonSet) {
        self.polygons.extend(other.polygons);
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for p in &mut self.polygons {
            p.translate(dx, dy);
        }
    }

    pub fn rotate(&mut self, angle: f64) {
        for p in &mut self.polygons {
            p.rotate(angle);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for p in &mut self.polygons {
            p.scale(factor);
        }
    }

    pub fn mirror(&mut self, axis: Mirroring) {
        for p in &mut self.polygons {
            p.mirror(axis);
        }
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for p in &self.polygons {
            b.merge(&p.bounds());
        }
        b
    }
}

impl FromIterator<Polygon> for PolygonSet {
    fn from_iter<T: IntoIterator<Item = Polygon>>(iter: T) -> Self {
        Self {
            polygons: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_closed_ccw() {
        let c = circle_to_polygon(1.0, ARC_STEPS, 0.0);
        assert_eq!(c.len(), ARC_STEPS + 1);
        assert!(c.is_closed());
        assert!(c.signed_area() > 0.0);
        // Area converges to πr² from below
        assert!((c.signed_area() - PI).abs() < 0.02);
    }

    #[test]
    fn test_circle_rotation_start_vertex() {
        let c = circle_to_polygon(2.0, 8, PI / 2.0);
        let first = c.point(0);
        assert_relative_eq!(first.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(first.y, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rectangle() {
        let r = rectangle_to_polygon(4.0, 2.0);
        assert_eq!(r.len(), 5);
        assert!(r.is_closed());
        assert_relative_eq!(r.signed_area(), 8.0);
        let b = r.bounds();
        assert_relative_eq!(b.min.x, -2.0);
        assert_relative_eq!(b.max.y, 1.0);
    }

    #[test]
    fn test_obround_wide() {
        let o = obround_to_polygon(4.0, 2.0);
        assert!(o.is_closed());
        let b = o.bounds();
        assert_relative_eq!(b.width(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(b.height(), 2.0, epsilon = 1e-9);
        // Stadium area: rect + circle = 2*2 + π*1²
        assert_relative_eq!(o.signed_area(), 4.0 + PI, epsilon = 0.02);
    }

    #[test]
    fn test_obround_tall_and_degenerate() {
        let o = obround_to_polygon(2.0, 4.0);
        let b = o.bounds();
        assert_relative_eq!(b.width(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(b.height(), 4.0, epsilon = 1e-9);

        let c = obround_to_polygon(3.0, 3.0);
        assert_eq!(c.len(), ARC_STEPS + 1);
    }

    #[test]
    fn test_arc_half_circle() {
        let p = arc_to_polygon(
            Point::new(1.0, 0.0),
            Point::new(-1.0, 0.0),
            Point::new(0.0, 0.0),
            true,
            true,
        );
        assert_eq!(p.len(), ARC_STEPS + 1);
        assert_eq!(p.point(0), Point::new(1.0, 0.0));
        assert_eq!(p.point(ARC_STEPS), Point::new(-1.0, 0.0));
        // Midpoint of the sweep sits at the top of the circle
        let mid = p.point(ARC_STEPS / 2);
        assert_relative_eq!(mid.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_wraps_forward() {
        // End angle numerically behind the start angle wraps a full turn
        let p = arc_to_polygon(
            Point::new(0.0, 1.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 0.0),
            false,
            false,
        );
        // 3/4 turn CCW: sweep passes through (-1, 0)
        let b = p.bounds();
        assert_relative_eq!(b.min.x, -1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_transforms() {
        let mut r = rectangle_to_polygon(2.0, 2.0);
        r.translate(5.0, 1.0);
        let b = r.bounds();
        assert_relative_eq!(b.min.x, 4.0);
        assert_relative_eq!(b.max.x, 6.0);

        let mut r = rectangle_to_polygon(2.0, 1.0);
        r.rotate(PI / 2.0);
        let b = r.bounds();
        assert_relative_eq!(b.width(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(b.height(), 2.0, epsilon = 1e-12);

        let mut r = rectangle_to_polygon(2.0, 2.0);
        r.scale(3.0);
        assert_relative_eq!(r.signed_area(), 36.0);

        let mut w = Polygon::from_points(&[Point::new(1.0, 2.0)]);
        w.mirror(Mirroring::X);
        assert_eq!(w.point(0), Point::new(-1.0, 2.0));
    }

    #[test]
    fn test_mirror_preserves_winding() {
        for axis in [Mirroring::X, Mirroring::Y, Mirroring::XY] {
            let mut outline = rectangle_to_polygon(2.0, 1.0);
            outline.translate(3.0, 0.0);
            outline.mirror(axis);
            assert!(
                outline.signed_area() > 0.0,
                "{axis:?}: outline must stay counter-clockwise"
            );

            let mut hole = rectangle_to_polygon(1.0, 0.5);
            hole.reverse();
            hole.translate(3.0, 0.0);
            hole.mirror(axis);
            assert!(
                hole.signed_area() < 0.0,
                "{axis:?}: hole must stay clockwise"
            );
        }
    }

    #[test]
    fn test_reverse_flips_winding() {
        let mut r = rectangle_to_polygon(2.0, 2.0);
        let area = r.signed_area();
        r.reverse();
        assert_relative_eq!(r.signed_area(), -area);
    }

    #[test]
    fn test_close() {
        let mut p = Polygon::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
        ]);
        assert!(!p.is_closed());
        p.close();
        assert!(p.is_closed());
        assert_eq!(p.len(), 4);
        // Closing twice is a no-op
        p.close();
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn test_bounds_merge() {
        let mut b = Bounds::empty();
        assert!(b.is_empty());
        b.expand_point(1.0, 2.0);
        let mut other = Bounds::empty();
        other.expand_point(-1.0, 5.0);
        b.merge(&other);
        assert_relative_eq!(b.min.x, -1.0);
        assert_relative_eq!(b.max.y, 5.0);
        // Merging an empty bounds changes nothing
        b.merge(&Bounds::empty());
        assert_relative_eq!(b.max.x, 1.0);
    }

    #[test]
    fn test_set_bounds() {
        let mut set = PolygonSet::new();
        set.push(rectangle_to_polygon(2.0, 2.0));
        let mut shifted = rectangle_to_polygon(2.0, 2.0);
        shifted.translate(10.0, 0.0);
        set.push(shifted);
        let b = set.bounds();
        assert_relative_eq!(b.min.x, -1.0);
        assert_relative_eq!(b.max.x, 11.0);
    }
}
