//! Aperture model: standard templates (C/R/O/P), macro-backed apertures and
//! block apertures, plus the stroke and flash generators that turn draws
//! through an aperture into polygons.

use std::cell::OnceCell;
use std::f64::consts::PI;
use std::rc::Rc;

use crate::error::ArtworkError;
use crate::geometry::polygon::{
    arc_to_polygon, circle_to_polygon, obround_to_polygon, rectangle_to_polygon, Polygon,
    PolygonSet, ARC_STEPS,
};
use crate::geometry::{Mirroring, Point};

use super::macros::ApertureMacro;
use super::primitives::{GraphicsObject, ObjectState};

const EPS: f64 = 1e-9;

/// Standard aperture template letter from an %AD command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardTemplate {
    Circle,
    Rectangle,
    Obround,
    Polygon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApertureKind {
    Standard {
        template: StandardTemplate,
        /// Dimension modifiers, already in mm.
        modifiers: Vec<f64>,
    },
    Macro {
        def: Rc<ApertureMacro>,
        /// Modifiers in file units; scaled during expansion.
        modifiers: Vec<f64>,
        unit_scale: f64,
    },
    Block {
        objects: Vec<GraphicsObject>,
    },
}

/// A resolved aperture from the aperture table.
#[derive(Debug, Clone)]
pub struct Aperture {
    pub code: u32,
    pub kind: ApertureKind,
    shape: OnceCell<PolygonSet>,
}

impl PartialEq for Aperture {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.kind == other.kind
    }
}

impl Aperture {
    pub fn standard(
        code: u32,
        template: StandardTemplate,
        modifiers: Vec<f64>,
    ) -> Result<Self, String> {
        validate_standard(template, &modifiers)?;
        Ok(Self {
            code,
            kind: ApertureKind::Standard {
                template,
                modifiers,
            },
            shape: OnceCell::new(),
        })
    }

    pub fn macro_backed(
        code: u32,
        def: Rc<ApertureMacro>,
        modifiers: Vec<f64>,
        unit_scale: f64,
    ) -> Self {
        Self {
            code,
            kind: ApertureKind::Macro {
                def,
                modifiers,
                unit_scale,
            },
            shape: OnceCell::new(),
        }
    }

    pub fn block(code: u32, objects: Vec<GraphicsObject>) -> Self {
        Self {
            code,
            kind: ApertureKind::Block { objects },
            shape: OnceCell::new(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, ApertureKind::Block { .. })
    }

    /// Nested objects of a block aperture, polarity-flipped when the flash
    /// polarity is clear. Non-block apertures have no object list.
    pub fn block_objects(&self, flash_polarity: super::primitives::Polarity) -> Vec<GraphicsObject> {
        let ApertureKind::Block { objects } = &self.kind else {
            return Vec::new();
        };
        match flash_polarity {
            super::primitives::Polarity::Dark => objects.clone(),
            super::primitives::Polarity::Clear => objects
                .iter()
                .map(GraphicsObject::with_inverted_polarity)
                .collect(),
        }
    }

    /// The aperture outline tessellated at the origin, hole subtracted as a
    /// reversed inner ring. Cached per aperture instance.
    pub fn shape_polygons(&self) -> Result<&PolygonSet, ArtworkError> {
        if let Some(shape) = self.shape.get() {
            return Ok(shape);
        }
        let computed = self.compute_shape()?;
        Ok(self.shape.get_or_init(|| computed))
    }

    fn compute_shape(&self) -> Result<PolygonSet, ArtworkError> {
        match &self.kind {
            ApertureKind::Standard {
                template,
                modifiers,
            } => {
                let modifier = |i: usize| modifiers.get(i).copied().unwrap_or(0.0);
                let (outline, hole) = match template {
                    StandardTemplate::Circle => (
                        circle_to_polygon(modifier(0) / 2.0, ARC_STEPS, 0.0),
                        modifier(1),
                    ),
                    StandardTemplate::Rectangle => {
                        (rectangle_to_polygon(modifier(0), modifier(1)), modifier(2))
                    }
                    StandardTemplate::Obround => {
                        (obround_to_polygon(modifier(0), modifier(1)), modifier(2))
                    }
                    StandardTemplate::Polygon => {
                        let mut p =
                            circle_to_polygon(modifier(0) / 2.0, modifier(1) as usize, 0.0);
                        p.rotate(modifier(2).to_radians());
                        (p, modifier(3))
                    }
                };
                let mut set = PolygonSet::from_polygon(outline);
                if hole > EPS {
                    let mut ring = circle_to_polygon(hole / 2.0, ARC_STEPS, 0.0);
                    ring.reverse();
                    set.push(ring);
                }
                Ok(set)
            }
            ApertureKind::Macro {
                def,
                modifiers,
                unit_scale,
            } => def.expand(modifiers, *unit_scale),
            ApertureKind::Block { .. } => Ok(PolygonSet::new()),
        }
    }

    /// Flash the aperture at a point under the current transform state.
    pub fn flash(&self, at: Point, state: &ObjectState) -> Result<PolygonSet, ArtworkError> {
        if self.is_block() {
            return Err(ArtworkError::Unsupported(format!(
                "block aperture D{} cannot be rendered as a single flash",
                self.code
            )));
        }
        let mut shape = self.shape_polygons()?.clone();
        shape.mirror(state.mirroring);
        if (state.scale - 1.0).abs() > EPS {
            shape.scale(state.scale);
        }
        if state.rotation.abs() > EPS {
            shape.rotate(state.rotation.to_radians());
        }
        shape.translate(at.x, at.y);
        Ok(shape)
    }

    /// Stroke a straight segment with this aperture.
    pub fn line_draw(
        &self,
        start: Point,
        end: Point,
        state: &ObjectState,
    ) -> Result<PolygonSet, ArtworkError> {
        if start.distance(&end) < EPS {
            return self.flash(start.midpoint(&end), state);
        }

        match &self.kind {
            ApertureKind::Standard {
                template: StandardTemplate::Circle,
                modifiers,
            } => {
                let r = modifiers.first().copied().unwrap_or(0.0) / 2.0 * state.scale;
                if r < EPS {
                    let mut set = PolygonSet::new();
                    set.push(Polygon::wire(&[start, end]));
                    return Ok(set);
                }
                Ok(PolygonSet::from_polygon(stadium(start, end, r)))
            }
            ApertureKind::Standard {
                template: StandardTemplate::Rectangle,
                modifiers,
            } => {
                if state.rotation.abs() > EPS || state.mirroring != Mirroring::None {
                    return Err(ArtworkError::Unsupported(format!(
                        "draw with rotated or mirrored rectangle aperture D{}",
                        self.code
                    )));
                }
                let hw = modifiers.first().copied().unwrap_or(0.0) / 2.0 * state.scale;
                let hh = modifiers.get(1).copied().unwrap_or(0.0) / 2.0 * state.scale;
                Ok(PolygonSet::from_polygon(rectangle_stroke(
                    start, end, hw, hh,
                )))
            }
            _ => Err(ArtworkError::Unsupported(format!(
                "draw with aperture D{} is not supported",
                self.code
            ))),
        }
    }

    /// Stroke a counter-clockwise arc from `start` to `end` around `center`.
    pub fn arc_draw(
        &self,
        start: Point,
        end: Point,
        center: Point,
        state: &ObjectState,
    ) -> Result<PolygonSet, ArtworkError> {
        if start.distance(&end) < EPS {
            return self.flash(start.midpoint(&end), state);
        }

        match &self.kind {
            ApertureKind::Standard {
                template: StandardTemplate::Circle,
                modifiers,
            } => {
                let r = modifiers.first().copied().unwrap_or(0.0) / 2.0 * state.scale;
                if r < EPS {
                    let mut wire = arc_to_polygon(start, end, center, true, true);
                    wire.solid = false;
                    return Ok(PolygonSet::from_polygon(wire));
                }
                Ok(PolygonSet::from_polygon(fat_arc(start, end, center, r)))
            }
            ApertureKind::Standard {
                template: StandardTemplate::Obround,
                modifiers,
            } => {
                let w = modifiers.first().copied().unwrap_or(0.0);
                let h = modifiers.get(1).copied().unwrap_or(0.0);
                let r = w.min(h) / 2.0 * state.scale;
                if r < EPS {
                    let mut wire = arc_to_polygon(start, end, center, true, true);
                    wire.solid = false;
                    return Ok(PolygonSet::from_polygon(wire));
                }
                Ok(PolygonSet::from_polygon(fat_arc(start, end, center, r)))
            }
            ApertureKind::Standard {
                template: StandardTemplate::Rectangle,
                modifiers,
            } => {
                if state.rotation.abs() > EPS || state.mirroring != Mirroring::None {
                    return Err(ArtworkError::Unsupported(format!(
                        "arc with rotated or mirrored rectangle aperture D{}",
                        self.code
                    )));
                }
                let w = modifiers.first().copied().unwrap_or(0.0);
                let h = modifiers.get(1).copied().unwrap_or(0.0);
                let half = w.max(h) / 2.0 * state.scale;
                Ok(PolygonSet::from_polygon(flat_arc_band(
                    start, end, center, half,
                )))
            }
            _ => Err(ArtworkError::Unsupported(format!(
                "arc with aperture D{} is not supported",
                self.code
            ))),
        }
    }

    /// Trace a full circle of `radius` with this aperture: an annulus spanning
    /// radius ± aperture radius.
    pub fn circle_draw(
        &self,
        center: Point,
        radius: f64,
        state: &ObjectState,
    ) -> Result<PolygonSet, ArtworkError> {
        match &self.kind {
            ApertureKind::Standard {
                template: StandardTemplate::Circle,
                modifiers,
            } => {
                let r = modifiers.first().copied().unwrap_or(0.0) / 2.0 * state.scale;
                if r < EPS {
                    let mut ring = circle_to_polygon(radius, ARC_STEPS, 0.0);
                    ring.translate(center.x, center.y);
                    ring.solid = false;
                    return Ok(PolygonSet::from_polygon(ring));
                }
                let mut set = PolygonSet::new();
                let mut outer = circle_to_polygon(radius + r, ARC_STEPS, 0.0);
                outer.translate(center.x, center.y);
                set.push(outer);
                let inner_r = radius - r;
                if inner_r > EPS {
                    let mut inner = circle_to_polygon(inner_r, ARC_STEPS, 0.0);
                    inner.reverse();
                    inner.translate(center.x, center.y);
                    set.push(inner);
                }
                Ok(set)
            }
            _ => Err(ArtworkError::Unsupported(format!(
                "circular trace with aperture D{} is not supported",
                self.code
            ))),
        }
    }
}

fn validate_standard(template: StandardTemplate, modifiers: &[f64]) -> Result<(), String> {
    let modifier = |i: usize| modifiers.get(i).copied().unwrap_or(0.0);
    match template {
        StandardTemplate::Circle => {
            if modifiers.is_empty() {
                return Err("circle aperture needs a diameter".into());
            }
            let d = modifier(0);
            if d < 0.0 {
                return Err(format!("negative circle diameter {d}"));
            }
            if modifier(1) > d {
                return Err("circle hole larger than diameter".into());
            }
        }
        StandardTemplate::Rectangle | StandardTemplate::Obround => {
            if modifiers.len() < 2 {
                return Err("rectangle/obround aperture needs two sizes".into());
            }
            let (w, h) = (modifier(0), modifier(1));
            if w < 0.0 || h < 0.0 {
                return Err(format!("negative aperture size {w}x{h}"));
            }
            if modifier(2) > w.min(h) {
                return Err("hole larger than the aperture".into());
            }
        }
        StandardTemplate::Polygon => {
            if modifiers.len() < 2 {
                return Err("polygon aperture needs diameter and vertex count".into());
            }
            let vertices = modifier(1);
            if (vertices - vertices.round()).abs() > EPS {
                return Err(format!("polygon vertex count {vertices} is not integral"));
            }
            let n = vertices.round();
            if !(3.0..=12.0).contains(&n) {
                return Err(format!("polygon vertex count {n} out of range 3..=12"));
            }
            if modifier(3) > modifier(0) {
                return Err("hole larger than the polygon diameter".into());
            }
        }
    }
    Ok(())
}

fn dir(angle: f64) -> Point {
    Point::new(angle.cos(), angle.sin())
}

/// Round-capped stroke of a straight segment: two half-circle caps joined by
/// two parallel sides.
fn stadium(start: Point, end: Point, r: f64) -> Polygon {
    let theta = (end - start).angle();
    let steps = ARC_STEPS / 2;
    let mut p = Polygon::with_capacity(ARC_STEPS + 3);
    for k in 0..=steps {
        let a = theta - PI / 2.0 + PI * k as f64 / steps as f64;
        p.push(end + dir(a).scale(r));
    }
    for k in 0..=steps {
        let a = theta + PI / 2.0 + PI * k as f64 / steps as f64;
        p.push(start + dir(a).scale(r));
    }
    p.close();
    p
}

/// Rectangle-aperture stroke. Axis-aligned draws grow a rectangle around the
/// segment; diagonal draws take the convex hull of the two aperture
/// positions, with the vertex ordering picked by the draw direction's
/// quadrant.
fn rectangle_stroke(start: Point, end: Point, hw: f64, hh: f64) -> Polygon {
    let dx = end.x - start.x;
    let dy = end.y - start.y;

    if dx.abs() < EPS || dy.abs() < EPS {
        let min = Point::new(start.x.min(end.x) - hw, start.y.min(end.y) - hh);
        let max = Point::new(start.x.max(end.x) + hw, start.y.max(end.y) + hh);
        return Polygon::from_points(&[
            Point::new(min.x, min.y),
            Point::new(max.x, min.y),
            Point::new(max.x, max.y),
            Point::new(min.x, max.y),
            Point::new(min.x, min.y),
        ]);
    }

    // Normalize to dx > 0 (the swept hull is symmetric in the endpoints).
    let (s, e) = if dx > 0.0 { (start, end) } else { (end, start) };
    let mut p = if e.y > s.y {
        // North-east draw
        Polygon::from_points(&[
            Point::new(s.x - hw, s.y - hh),
            Point::new(s.x + hw, s.y - hh),
            Point::new(e.x + hw, e.y - hh),
            Point::new(e.x + hw, e.y + hh),
            Point::new(e.x - hw, e.y + hh),
            Point::new(s.x - hw, s.y + hh),
        ])
    } else {
        // South-east draw
        Polygon::from_points(&[
            Point::new(s.x - hw, s.y - hh),
            Point::new(e.x - hw, e.y - hh),
            Point::new(e.x + hw, e.y - hh),
            Point::new(e.x + hw, e.y + hh),
            Point::new(s.x + hw, s.y + hh),
            Point::new(s.x - hw, s.y + hh),
        ])
    };
    p.close();
    if p.signed_area() < 0.0 {
        p.reverse();
    }
    p
}

/// Round-capped stroke of a counter-clockwise arc: concentric arcs at
/// radius ± aperture radius joined by half-circle caps around the endpoints.
fn fat_arc(start: Point, end: Point, center: Point, r_ap: f64) -> Polygon {
    let r_arc = start.distance(&center);
    let phi_s = start.angle_from(&center);
    let mut phi_e = end.angle_from(&center);
    while phi_e <= phi_s {
        phi_e += 2.0 * PI;
    }

    let outer = r_arc + r_ap;
    let inner = (r_arc - r_ap).max(0.0);
    let caps = ARC_STEPS / 2;

    let mut p = Polygon::with_capacity(3 * ARC_STEPS);
    for k in 0..=ARC_STEPS {
        let a = phi_s + (phi_e - phi_s) * k as f64 / ARC_STEPS as f64;
        p.push(center + dir(a).scale(outer));
    }
    for k in 1..=caps {
        let a = phi_e + PI * k as f64 / caps as f64;
        p.push(end + dir(a).scale(r_ap));
    }
    for k in 0..=ARC_STEPS {
        let a = phi_e - (phi_e - phi_s) * k as f64 / ARC_STEPS as f64;
        p.push(center + dir(a).scale(inner));
    }
    for k in 1..=caps {
        let a = phi_s + PI + PI * k as f64 / caps as f64;
        p.push(start + dir(a).scale(r_ap));
    }
    p.close();
    p
}

/// Flat-capped arc band used for rectangle-aperture arc strokes.
fn flat_arc_band(start: Point, end: Point, center: Point, half: f64) -> Polygon {
    let r_arc = start.distance(&center);
    let phi_s = start.angle_from(&center);
    let mut phi_e = end.angle_from(&center);
    while phi_e <= phi_s {
        phi_e += 2.0 * PI;
    }

    let outer = r_arc + half;
    let inner = (r_arc - half).max(0.0);

    let mut p = Polygon::with_capacity(2 * ARC_STEPS + 3);
    for k in 0..=ARC_STEPS {
        let a = phi_s + (phi_e - phi_s) * k as f64 / ARC_STEPS as f64;
        p.push(center + dir(a).scale(outer));
    }
    for k in 0..=ARC_STEPS {
        let a = phi_e - (phi_e - phi_s) * k as f64 / ARC_STEPS as f64;
        p.push(center + dir(a).scale(inner));
    }
    p.close();
    p
}
