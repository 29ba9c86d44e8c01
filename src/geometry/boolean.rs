//! Union/difference over polygon sets, backed by the `geo` clipping engine.
//!
//! This is the only module that talks to the clipper. Packed polygon sets go
//! in, packed polygon sets come out; winding is preserved (exterior rings
//! counter-clockwise, hole rings clockwise) so a non-zero fill rule renders
//! the result correctly. Open wires never enter the clipper: unions carry
//! wires from both operands, differences carry the minuend's wires.

use geo::{BooleanOps, Contains, Coord, LineString, MultiPolygon, Point as GeoPoint};

use super::point::Point;
use super::polygon::{Bounds, Polygon, PolygonSet, CLOSE_EPSILON};

type GeoPolygon = geo::Polygon<f64>;

/// Union of two polygon sets.
pub fn union(a: &PolygonSet, b: &PolygonSet) -> (PolygonSet, Bounds) {
    let solution = to_multi(a).union(&to_multi(b));
    let mut out = from_multi(&solution);
    carry_wires(&mut out, a);
    carry_wires(&mut out, b);
    let bounds = out.bounds();
    (out, bounds)
}

/// Difference `a − b`.
pub fn subtract(a: &PolygonSet, b: &PolygonSet) -> (PolygonSet, Bounds) {
    let solution = to_multi(a).difference(&to_multi(b));
    let mut out = from_multi(&solution);
    carry_wires(&mut out, a);
    let bounds = out.bounds();
    (out, bounds)
}

/// Drop consecutive duplicate vertices and collinear midpoints.
pub fn simplify_polygon(polygon: &Polygon) -> Polygon {
    let mut points: Vec<Point> = Vec::with_capacity(polygon.len());
    for p in polygon.points() {
        if let Some(last) = points.last() {
            if last.distance_squared(&p) < CLOSE_EPSILON * CLOSE_EPSILON {
                continue;
            }
        }
        points.push(p);
    }

    // Drop midpoints that sit on the segment joining their neighbours.
    let mut i = 1;
    while points.len() >= 3 && i + 1 < points.len() {
        let (a, b, c) = (points[i - 1], points[i], points[i + 1]);
        let ab = b - a;
        let bc = c - b;
        let cross = ab.x * bc.y - ab.y * bc.x;
        if cross.abs() < CLOSE_EPSILON {
            points.remove(i);
        } else {
            i += 1;
        }
    }

    let mut out = Polygon::from_points(&points);
    out.solid = polygon.solid;
    out
}

/// Concatenate open polylines whose endpoints coincide within `tolerance`.
/// A polyline may be reversed to make its endpoint meet another's. Solid
/// polygons pass through untouched.
pub fn connect_wires(set: &PolygonSet, tolerance: f64) -> PolygonSet {
    let mut out = PolygonSet::new();
    let mut wires: Vec<Vec<Point>> = Vec::new();
    for p in &set.polygons {
        if p.solid {
            out.push(p.clone());
        } else if !p.is_empty() {
            wires.push(p.points().collect());
        }
    }

    let tol2 = tolerance * tolerance;
    let mut joined = true;
    while joined {
        joined = false;
        'outer: for i in 0..wires.len() {
            for j in 0..wires.len() {
                if i == j {
                    continue;
                }
                let (i_start, i_end, j_start, j_end) = {
                    let a = &wires[i];
                    let b = &wires[j];
                    (a[0], a[a.len() - 1], b[0], b[b.len() - 1])
                };
                // End-to-start appends directly; end-to-end reverses the
                // appended wire; start-to-start reverses the receiver.
                // Start-to-end is the (j, i) pair's first case.
                let direct = i_end.distance_squared(&j_start) < tol2;
                let reverse_tail = i_end.distance_squared(&j_end) < tol2;
                let reverse_receiver = i_start.distance_squared(&j_start) < tol2;
                if direct || reverse_tail || reverse_receiver {
                    let mut tail = wires.remove(j);
                    let i = if j < i { i - 1 } else { i };
                    if !direct {
                        if reverse_tail {
                            tail.reverse();
                        } else {
                            wires[i].reverse();
                        }
                    }
                    wires[i].extend(tail.drain(1..));
                    joined = true;
                    break 'outer;
                }
            }
        }
    }

    for w in wires {
        out.push(Polygon::wire(&w));
    }
    out
}

fn carry_wires(out: &mut PolygonSet, from: &PolygonSet) {
    for p in &from.polygons {
        if !p.solid {
            out.push(p.clone());
        }
    }
}

/// Build the clipper's subject from the flat ring set: counter-clockwise
/// rings are outlines, clockwise rings are holes attached to the first
/// outline containing them. Overlapping outlines are merged by folding the
/// union so the result is a valid multipolygon.
fn to_multi(set: &PolygonSet) -> MultiPolygon<f64> {
    let mut outlines: Vec<GeoPolygon> = Vec::new();
    let mut outline_areas: Vec<f64> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for p in &set.polygons {
        if !p.solid || p.len() < 3 {
            continue;
        }
        let ring = to_linestring(p);
        let area = p.signed_area();
        if area >= 0.0 {
            outlines.push(GeoPolygon::new(ring, vec![]));
            outline_areas.push(area);
        } else {
            holes.push(ring);
        }
    }

    for hole in holes {
        let Some(probe) = hole.0.first().copied() else {
            continue;
        };
        let probe = GeoPoint::new(probe.x, probe.y);
        // Concentric outlines nest; the hole belongs to the innermost
        // (smallest) outline containing it, not the first one found.
        let mut owner: Option<usize> = None;
        for (index, outline) in outlines.iter().enumerate() {
            if outline.contains(&probe)
                && owner.map_or(true, |best| outline_areas[index] < outline_areas[best])
            {
                owner = Some(index);
            }
        }
        if let Some(index) = owner {
            outlines[index].interiors_push(hole);
        }
    }

    outlines
        .into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, poly| {
            acc.union(&MultiPolygon::new(vec![poly]))
        })
}

fn to_linestring(p: &Polygon) -> LineString<f64> {
    LineString::new(p.points().map(|pt| Coord { x: pt.x, y: pt.y }).collect())
}

fn from_multi(multi: &MultiPolygon<f64>) -> PolygonSet {
    let mut out = PolygonSet::new();
    for poly in &multi.0 {
        out.push(from_ring(poly.exterior()));
        for interior in poly.interiors() {
            out.push(from_ring(interior));
        }
    }
    out
}

fn from_ring(ring: &LineString<f64>) -> Polygon {
    let mut p = Polygon::with_capacity(ring.0.len());
    for c in &ring.0 {
        p.push(Point::new(c.x, c.y));
    }
    p.close();
    p
}
