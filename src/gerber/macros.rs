//! Aperture macro definitions (%AM) and their expansion into polygons.
//!
//! A macro body is an ordered list of variable definitions, primitives and
//! comments. Expansion evaluates the body against a variable memory seeded
//! from the aperture's modifier list; primitives land on a positive or
//! negative pile by exposure, and the final shape is positives minus
//! negatives.

use std::f64::consts::PI;

use log::warn;

use crate::error::ArtworkError;
use crate::geometry::boolean;
use crate::geometry::polygon::{
    circle_to_polygon, rectangle_to_polygon, Polygon, PolygonSet, ARC_STEPS,
};
use crate::geometry::Point;

use super::expr::{parse_expr, Expr, Memory};

const EPS: f64 = 1e-9;

/// One element of a macro body.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroContent {
    Comment,
    /// `$n=expr` variable definition.
    Variable { index: u32, expr: Expr },
    /// Primitive invocation: code plus its parameter expressions.
    Primitive { code: u32, params: Vec<Expr> },
}

/// An aperture macro definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureMacro {
    pub name: String,
    pub content: Vec<MacroContent>,
}

impl ApertureMacro {
    /// Parse the body of an `AM` block. `lines` are the `*`-separated
    /// sub-commands following the name.
    pub fn parse(name: &str, lines: &[&str]) -> Result<Self, String> {
        let mut content = Vec::with_capacity(lines.len());
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("0 ") || line == "0" {
                content.push(MacroContent::Comment);
                continue;
            }
            if let Some(rest) = line.strip_prefix('$') {
                let eq = rest
                    .find('=')
                    .ok_or_else(|| format!("macro variable without '=': {line}"))?;
                let index: u32 = rest[..eq]
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad macro variable id: {line}"))?;
                let expr = parse_expr(&rest[eq + 1..])?;
                content.push(MacroContent::Variable { index, expr });
                continue;
            }

            let mut parts = line.split(',');
            let code: u32 = parts
                .next()
                .unwrap_or("")
                .trim()
                .parse()
                .map_err(|_| format!("bad macro primitive code: {line}"))?;
            let params = parts.map(parse_expr).collect::<Result<Vec<_>, _>>()?;
            content.push(MacroContent::Primitive { code, params });
        }
        Ok(ApertureMacro {
            name: name.to_string(),
            content,
        })
    }

    /// Expand the macro for one modifier list into a polygon set.
    /// `unit_scale` converts the file's units to mm after evaluation.
    pub fn expand(
        &self,
        modifiers: &[f64],
        unit_scale: f64,
    ) -> Result<PolygonSet, ArtworkError> {
        let mut memory = Memory::from_modifiers(modifiers);
        let mut positives = PolygonSet::new();
        let mut negatives = PolygonSet::new();

        for item in &self.content {
            match item {
                MacroContent::Comment => {}
                MacroContent::Variable { index, expr } => {
                    let value = expr.eval(&memory);
                    memory.set(*index, value);
                }
                MacroContent::Primitive { code, params } => {
                    expand_primitive(*code, params, &memory, &mut positives, &mut negatives)?;
                }
            }
        }

        let mut shape = if negatives.is_empty() {
            positives
        } else {
            boolean::subtract(&positives, &negatives).0
        };
        if (unit_scale - 1.0).abs() > EPS {
            shape.scale(unit_scale);
        }
        Ok(shape)
    }
}

fn expand_primitive(
    code: u32,
    params: &[Expr],
    memory: &Memory,
    positives: &mut PolygonSet,
    negatives: &mut PolygonSet,
) -> Result<(), ArtworkError> {
    let eval = |i: usize| params.get(i).map(|e| e.eval(memory)).unwrap_or(0.0);
    let need = |n: usize| -> Result<(), ArtworkError> {
        if params.len() < n {
            Err(ArtworkError::Geometry(format!(
                "macro primitive {code} needs {n} parameters, got {}",
                params.len()
            )))
        } else {
            Ok(())
        }
    };

    match code {
        0 => {}
        1 => {
            // Circle: exposure, diameter, cx, cy [, rotation]
            need(4)?;
            let d = eval(1);
            if d < EPS {
                return Ok(());
            }
            let mut p = circle_to_polygon(d / 2.0, ARC_STEPS, 0.0);
            p.translate(eval(2), eval(3));
            p.rotate(eval(4).to_radians());
            deposit(eval(0), p, positives, negatives);
        }
        4 => {
            // Outline: exposure, n, x0,y0 .. xn,yn, rotation
            need(2)?;
            let n = eval(1) as usize;
            need(2 + (n + 1) * 2 + 1)?;
            let mut p = Polygon::with_capacity(n + 1);
            for k in 0..=n {
                p.push(Point::new(eval(2 + k * 2), eval(3 + k * 2)));
            }
            p.close();
            if p.signed_area() < 0.0 {
                p.reverse();
            }
            p.rotate(eval(2 + (n + 1) * 2).to_radians());
            deposit(eval(0), p, positives, negatives);
        }
        5 => {
            // Regular polygon: exposure, nSides, cx, cy, diameter, rotation
            need(6)?;
            let sides = eval(1);
            if sides < 3.0 {
                return Err(ArtworkError::Geometry(format!(
                    "regular polygon needs at least 3 vertices, got {sides}"
                )));
            }
            let mut p = circle_to_polygon(eval(4) / 2.0, sides as usize, 0.0);
            p.translate(eval(2), eval(3));
            p.rotate(eval(5).to_radians());
            deposit(eval(0), p, positives, negatives);
        }
        6 => {
            // Moire: cx, cy, outerD, ringT, gap, maxRings, crossT, crossL, rotation
            need(9)?;
            let (cx, cy) = (eval(0), eval(1));
            let ring_t = eval(3);
            let ring_gap = eval(4);
            let max_rings = eval(5) as usize;
            let rotation = eval(8).to_radians();

            let mut d = eval(2);
            let mut rings = 0;
            while rings < max_rings && d > EPS {
                let mut outer = circle_to_polygon(d / 2.0, ARC_STEPS, 0.0);
                finish_moire_part(&mut outer, cx, cy, rotation);
                positives.push(outer);
                let inner_d = d - 2.0 * ring_t;
                if inner_d > EPS {
                    let mut hole = circle_to_polygon(inner_d / 2.0, ARC_STEPS, 0.0);
                    hole.reverse();
                    finish_moire_part(&mut hole, cx, cy, rotation);
                    positives.push(hole);
                }
                d = inner_d - 2.0 * ring_gap;
                rings += 1;
            }

            let cross_t = eval(6);
            let cross_l = eval(7);
            if cross_t > EPS && cross_l > EPS {
                let mut horizontal = rectangle_to_polygon(cross_l, cross_t);
                finish_moire_part(&mut horizontal, cx, cy, rotation);
                positives.push(horizontal);
                let mut vertical = rectangle_to_polygon(cross_t, cross_l);
                finish_moire_part(&mut vertical, cx, cy, rotation);
                positives.push(vertical);
            }
        }
        7 => {
            // Thermal: cx, cy, outerD, innerD, gap, rotation
            need(6)?;
            expand_thermal(
                eval(0),
                eval(1),
                eval(2),
                eval(3),
                eval(4),
                eval(5).to_radians(),
                positives,
            )?;
        }
        2 | 20 => {
            // Vector line: exposure, width, x1, y1, x2, y2, rotation
            need(7)?;
            let w = eval(1);
            let start = Point::new(eval(2), eval(3));
            let end = Point::new(eval(4), eval(5));
            let len = start.distance(&end);
            if w < EPS || len < EPS {
                return Ok(());
            }
            let dir = (end - start).scale(1.0 / len);
            let normal = Point::new(-dir.y, dir.x).scale(w / 2.0);
            let mut p = Polygon::from_points(&[
                start - normal,
                end - normal,
                end + normal,
                start + normal,
                start - normal,
            ]);
            if p.signed_area() < 0.0 {
                p.reverse();
            }
            p.rotate(eval(6).to_radians());
            deposit(eval(0), p, positives, negatives);
        }
        21 => {
            // Center line: exposure, width, height, cx, cy, rotation
            need(6)?;
            let mut p = rectangle_to_polygon(eval(1), eval(2));
            p.translate(eval(3), eval(4));
            p.rotate(eval(5).to_radians());
            deposit(eval(0), p, positives, negatives);
        }
        other => {
            warn!("skipping unknown macro primitive code {other}");
        }
    }
    Ok(())
}

fn finish_moire_part(p: &mut Polygon, cx: f64, cy: f64, rotation: f64) {
    p.translate(cx, cy);
    p.rotate(rotation);
}

fn deposit(exposure: f64, p: Polygon, positives: &mut PolygonSet, negatives: &mut PolygonSet) {
    if exposure >= 0.5 {
        positives.push(p);
    } else {
        negatives.push(p);
    }
}

/// Thermal: an annulus interrupted by four gaps centered on the axes,
/// yielding one wedge per quadrant.
fn expand_thermal(
    cx: f64,
    cy: f64,
    outer_d: f64,
    inner_d: f64,
    gap: f64,
    rotation: f64,
    positives: &mut PolygonSet,
) -> Result<(), ArtworkError> {
    if outer_d <= inner_d {
        return Err(ArtworkError::Geometry(format!(
            "thermal inner diameter {inner_d} must be smaller than outer {outer_d}"
        )));
    }
    if gap >= outer_d / std::f64::consts::SQRT_2 {
        return Err(ArtworkError::Geometry(format!(
            "thermal gap {gap} too large for outer diameter {outer_d}"
        )));
    }

    let outer_r = outer_d / 2.0;
    let inner_r = inner_d / 2.0;

    if gap < EPS {
        // No gaps: plain annulus (or disc when there is no inner hole).
        let mut outer = circle_to_polygon(outer_r, ARC_STEPS, 0.0);
        outer.translate(cx, cy);
        outer.rotate(rotation);
        positives.push(outer);
        if inner_r > EPS {
            let mut hole = circle_to_polygon(inner_r, ARC_STEPS, 0.0);
            hole.reverse();
            hole.translate(cx, cy);
            hole.rotate(rotation);
            positives.push(hole);
        }
        return Ok(());
    }

    let half_gap = gap / 2.0;
    // Angle consumed by the gap at each radius; the gap edges are the lines
    // x = ±gap/2 and y = ±gap/2.
    let outer_trim = (half_gap / outer_r).clamp(-1.0, 1.0).asin();
    let steps = ARC_STEPS / 4;

    for quadrant in 0..4u32 {
        let base = quadrant as f64 * PI / 2.0;
        let outer_start = base + outer_trim;
        let outer_end = base + PI / 2.0 - outer_trim;
        if outer_end <= outer_start {
            continue;
        }

        let mut wedge = Polygon::with_capacity(2 * steps + 3);
        for k in 0..=steps {
            let a = outer_start + (outer_end - outer_start) * k as f64 / steps as f64;
            wedge.push(Point::new(outer_r * a.cos(), outer_r * a.sin()));
        }

        if inner_r > half_gap + EPS {
            // Annular wedge: walk the inner arc back.
            let inner_trim = (half_gap / inner_r).clamp(-1.0, 1.0).asin();
            let inner_start = base + inner_trim;
            let inner_end = base + PI / 2.0 - inner_trim;
            for k in 0..=steps {
                let a = inner_end - (inner_end - inner_start) * k as f64 / steps as f64;
                wedge.push(Point::new(inner_r * a.cos(), inner_r * a.sin()));
            }
        } else if inner_r > EPS {
            // The gap swallows the inner ring; fall back to the gap corner.
            let corner = base + PI / 4.0;
            let r = half_gap * std::f64::consts::SQRT_2;
            wedge.push(Point::new(r * corner.cos(), r * corner.sin()));
        } else {
            // Pie slice down to the center.
            wedge.push(Point::new(0.0, 0.0));
        }
        wedge.close();
        wedge.translate(cx, cy);
        wedge.rotate(rotation);
        positives.push(wedge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parse_body(lines: &[&str]) -> ApertureMacro {
        ApertureMacro::parse("TEST", lines).unwrap()
    }

    #[test]
    fn test_parse_primitives_and_variables() {
        let mac = parse_body(&["0 a comment", "$3=$1x2", "5,1,8,0,0,1.08239X$1,22.5"]);
        assert_eq!(mac.content.len(), 3);
        assert!(matches!(mac.content[0], MacroContent::Comment));
        assert!(matches!(
            mac.content[1],
            MacroContent::Variable { index: 3, .. }
        ));
        assert!(matches!(
            mac.content[2],
            MacroContent::Primitive { code: 5, .. }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_variable() {
        assert!(ApertureMacro::parse("X", &["$a=1"]).is_err());
        assert!(ApertureMacro::parse("X", &["$1+1"]).is_err());
    }

    #[test]
    fn test_circle_primitive() {
        let mac = parse_body(&["1,1,$1,0,0"]);
        let shape = mac.expand(&[0.5], 1.0).unwrap();
        assert_eq!(shape.len(), 1);
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 0.5, epsilon = 1e-6);
        assert!(shape.polygons[0].is_closed());
    }

    #[test]
    fn test_circle_below_epsilon_is_empty() {
        let mac = parse_body(&["1,1,0,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert!(shape.is_empty());
    }

    #[test]
    fn test_octagon_macro() {
        // The OC8 macro emitted by EAGLE
        let mac = ApertureMacro::parse("OC8", &["5,1,8,0,0,1.08239X$1,22.5"]).unwrap();
        let shape = mac.expand(&[1.0], 1.0).unwrap();
        assert_eq!(shape.len(), 1);
        assert_eq!(shape.polygons[0].len(), 9);
        assert!(shape.polygons[0].signed_area() > 0.0);
    }

    #[test]
    fn test_polygon_too_few_sides_fails() {
        let mac = parse_body(&["5,1,2,0,0,1,0"]);
        assert!(mac.expand(&[], 1.0).is_err());
    }

    #[test]
    fn test_outline_reversed_to_ccw() {
        // Clockwise triangle input comes out counter-clockwise
        let mac = parse_body(&["4,1,3,0,0,0,1,1,1,0,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 1);
        assert!(shape.polygons[0].signed_area() > 0.0);
        assert!(shape.polygons[0].is_closed());
    }

    #[test]
    fn test_vector_line_stroke() {
        let mac = parse_body(&["20,1,0.5,0,0,4,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 1);
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(b.height(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(shape.polygons[0].signed_area(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_center_line_rotated() {
        let mac = parse_body(&["21,1,2,1,0,0,90"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(b.height(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exposure_off_subtracts() {
        // A dark square with a clear inner square punched out
        let mac = parse_body(&["21,1,4,4,0,0,0", "21,0,2,2,0,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        let area: f64 = shape.polygons.iter().map(|p| p.signed_area()).sum();
        assert_relative_eq!(area, 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_variables_feed_primitives() {
        let mac = parse_body(&["$2=$1x2", "1,1,$2,0,0"]);
        let shape = mac.expand(&[0.5], 1.0).unwrap();
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_unit_scale_applied() {
        let mac = parse_body(&["1,1,1,0,0"]);
        let shape = mac.expand(&[], 25.4).unwrap();
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 25.4, epsilon = 1e-4);
    }

    #[test]
    fn test_moire_rings() {
        // outerD 10, ring thickness 1, gap 1, up to 2 rings, no cross-hair
        let mac = parse_body(&["6,0,0,10,1,1,2,0,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        // Two rings, each an outline + hole
        assert_eq!(shape.len(), 4);
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 10.0, epsilon = 1e-6);
        // Second ring outer diameter: 10 - 2*(1+1) = 6
        let second = shape.polygons[2].bounds();
        assert_relative_eq!(second.width(), 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_moire_survives_clipper() {
        // The concentric rings must come back from a Boolean pass with
        // their centers still open.
        let mac = parse_body(&["6,0,0,10,1,1,2,0,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        let flat_area: f64 = shape.polygons.iter().map(|p| p.signed_area()).sum();

        let (clipped, _) = boolean::union(&shape, &PolygonSet::new());
        assert_eq!(clipped.len(), 4);
        let clipped_area: f64 = clipped.polygons.iter().map(|p| p.signed_area()).sum();
        assert_relative_eq!(clipped_area, flat_area, epsilon = 1e-6);
    }

    #[test]
    fn test_moire_cross_hair() {
        let mac = parse_body(&["6,0,0,4,1,1,1,0.2,6,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        // One ring (outline+hole) plus two cross rectangles
        assert_eq!(shape.len(), 4);
        let b = shape.bounds();
        assert_relative_eq!(b.width(), 6.0, epsilon = 1e-6);
        assert_relative_eq!(b.height(), 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_thermal_four_wedges() {
        let mac = parse_body(&["7,0,0,10,6,1,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 4);
        let b = shape.bounds();
        // Outermost vertex: radius 5, trimmed off the axis by the gap
        assert_relative_eq!(b.max.x, 5.0 * (1.0 - 0.01f64).sqrt(), epsilon = 1e-6);
        for wedge in &shape.polygons {
            assert!(wedge.is_closed());
            assert!(wedge.signed_area() > 0.0);
            let wb = wedge.bounds();
            // No wedge crosses the gap half-width around an axis
            assert!(wb.min.x.abs() >= 0.5 - 1e-9 || wb.min.y.abs() >= 0.5 - 1e-9);
        }
        // Inner radius 3: no vertex closer to the center
        for wedge in &shape.polygons {
            for pt in wedge.points() {
                assert!(pt.distance(&Point::new(0.0, 0.0)) >= 3.0 - 1e-6);
            }
        }
    }

    #[test]
    fn test_thermal_pie_when_no_inner() {
        let mac = parse_body(&["7,0,0,10,0,1,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 4);
        // Pie slices reach the center
        let reaches_center = shape
            .polygons
            .iter()
            .any(|p| p.points().any(|pt| pt.distance(&Point::new(0.0, 0.0)) < 1e-9));
        assert!(reaches_center);
    }

    #[test]
    fn test_thermal_no_gap_is_annulus() {
        let mac = parse_body(&["7,0,0,10,6,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 2);
        assert!(shape.polygons[1].signed_area() < 0.0);
    }

    #[test]
    fn test_thermal_validation() {
        let inner_too_big = parse_body(&["7,0,0,4,6,1,0"]);
        assert!(inner_too_big.expand(&[], 1.0).is_err());
        let gap_too_big = parse_body(&["7,0,0,4,2,3,0"]);
        assert!(gap_too_big.expand(&[], 1.0).is_err());
    }

    #[test]
    fn test_unknown_primitive_skipped() {
        let mac = parse_body(&["99,1,2,3", "1,1,1,0,0"]);
        let shape = mac.expand(&[], 1.0).unwrap();
        assert_eq!(shape.len(), 1);
    }
}
