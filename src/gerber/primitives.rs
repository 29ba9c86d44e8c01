//! Resolved graphics objects: the primitives an interpreted Gerber file
//! reduces to, each carrying the aperture it was emitted with and a snapshot
//! of the transform state. Polygon buffers are materialized on first access
//! and owned by the object.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::error::ArtworkError;
use crate::geometry::boolean;
use crate::geometry::polygon::{arc_to_polygon, Bounds, Polygon, PolygonSet};
use crate::geometry::{Mirroring, Point};

use super::apertures::Aperture;

/// Whether an object adds material (dark) or removes it (clear).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

impl Polarity {
    pub fn inverted(self) -> Self {
        match self {
            Polarity::Dark => Polarity::Clear,
            Polarity::Clear => Polarity::Dark,
        }
    }
}

/// Immutable transform snapshot taken when an object is emitted
/// (%LP, %LM, %LR, %LS).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub polarity: Polarity,
    pub mirroring: Mirroring,
    /// Rotation in degrees.
    pub rotation: f64,
    pub scale: f64,
}

impl Default for ObjectState {
    fn default() -> Self {
        Self {
            polarity: Polarity::Dark,
            mirroring: Mirroring::None,
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

/// One segment of a region contour.
#[derive(Debug, Clone, PartialEq)]
pub enum ContourSegment {
    Line {
        start: Point,
        end: Point,
    },
    Arc {
        start: Point,
        end: Point,
        center: Point,
        ccw: bool,
    },
    /// Degenerate full circle (a zero-length arc in multi-quadrant mode).
    Circle {
        center: Point,
        radius: f64,
    },
}

/// An ordered run of segments bounding part of a region. The walk is
/// auto-closed if the last endpoint differs from the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contour {
    pub segments: Vec<ContourSegment>,
}

impl Contour {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Flatten the segment walk into a closed polygon.
    pub fn to_polygon(&self) -> Polygon {
        let mut p = Polygon::new();
        for segment in &self.segments {
            match segment {
                ContourSegment::Line { start, end } => {
                    if p.is_empty() {
                        p.push(*start);
                    }
                    p.push(*end);
                }
                ContourSegment::Arc {
                    start,
                    end,
                    center,
                    ccw,
                } => {
                    let sampled = if *ccw {
                        arc_to_polygon(*start, *end, *center, true, true)
                    } else {
                        let mut s = arc_to_polygon(*end, *start, *center, true, true);
                        s.reverse();
                        s
                    };
                    let skip = usize::from(!p.is_empty());
                    for pt in sampled.points().skip(skip) {
                        p.push(pt);
                    }
                }
                ContourSegment::Circle { center, radius } => {
                    let mut c = crate::geometry::polygon::circle_to_polygon(
                        *radius,
                        crate::geometry::ARC_STEPS,
                        0.0,
                    );
                    c.translate(center.x, center.y);
                    for pt in c.points() {
                        p.push(pt);
                    }
                }
            }
        }
        p.close();
        p
    }
}

/// A block captured by an aperture block (%AB) or step-and-repeat (%SR)
/// scope, together with the repeat grid parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub x_repeat: u32,
    pub y_repeat: u32,
    pub x_delta: f64,
    pub y_delta: f64,
    pub objects: Vec<GraphicsObject>,
}

/// The geometric payload of a graphics object.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicsPrimitive {
    Line {
        start: Point,
        end: Point,
    },
    Arc {
        start: Point,
        end: Point,
        center: Point,
        radius: f64,
        ccw: bool,
    },
    /// Full circle traced with the current aperture.
    Circle {
        center: Point,
        radius: f64,
    },
    Flash {
        center: Point,
    },
    Region {
        contours: Vec<Contour>,
    },
    /// A block instanced on a repeat grid anchored at `origin`.
    Repeat {
        block: Rc<Block>,
        origin: Point,
    },
}

/// A resolved primitive plus its emission context.
#[derive(Debug, Clone)]
pub struct GraphicsObject {
    pub primitive: GraphicsPrimitive,
    pub aperture: Option<Rc<Aperture>>,
    pub state: ObjectState,
    polygons: OnceCell<PolygonSet>,
}

impl PartialEq for GraphicsObject {
    fn eq(&self, other: &Self) -> bool {
        self.primitive == other.primitive && self.state == other.state
    }
}

impl GraphicsObject {
    pub fn new(
        primitive: GraphicsPrimitive,
        aperture: Option<Rc<Aperture>>,
        state: ObjectState,
    ) -> Self {
        Self {
            primitive,
            aperture,
            state,
            polygons: OnceCell::new(),
        }
    }

    /// The polygon rendering of this object, materialized on first call.
    pub fn polygons(&self) -> Result<&PolygonSet, ArtworkError> {
        if let Some(p) = self.polygons.get() {
            return Ok(p);
        }
        let computed = self.compute_polygons()?;
        Ok(self.polygons.get_or_init(|| computed))
    }

    pub fn bounds(&self) -> Result<Bounds, ArtworkError> {
        Ok(self.polygons()?.bounds())
    }

    /// Copy of this object shifted by (dx, dy); the polygon cache is not
    /// carried over.
    pub fn translated(&self, dx: f64, dy: f64) -> GraphicsObject {
        let shift = Point::new(dx, dy);
        let primitive = match &self.primitive {
            GraphicsPrimitive::Line { start, end } => GraphicsPrimitive::Line {
                start: *start + shift,
                end: *end + shift,
            },
            GraphicsPrimitive::Arc {
                start,
                end,
                center,
                radius,
                ccw,
            } => GraphicsPrimitive::Arc {
                start: *start + shift,
                end: *end + shift,
                center: *center + shift,
                radius: *radius,
                ccw: *ccw,
            },
            GraphicsPrimitive::Circle { center, radius } => GraphicsPrimitive::Circle {
                center: *center + shift,
                radius: *radius,
            },
            GraphicsPrimitive::Flash { center } => GraphicsPrimitive::Flash {
                center: *center + shift,
            },
            GraphicsPrimitive::Region { contours } => GraphicsPrimitive::Region {
                contours: contours
                    .iter()
                    .map(|c| Contour {
                        segments: c.segments.iter().map(|s| translate_segment(s, shift)).collect(),
                    })
                    .collect(),
            },
            GraphicsPrimitive::Repeat { block, origin } => GraphicsPrimitive::Repeat {
                block: block.clone(),
                origin: *origin + shift,
            },
        };
        GraphicsObject::new(primitive, self.aperture.clone(), self.state)
    }

    /// Same object with the opposite polarity.
    pub fn with_inverted_polarity(&self) -> GraphicsObject {
        let mut state = self.state;
        state.polarity = state.polarity.inverted();
        GraphicsObject::new(self.primitive.clone(), self.aperture.clone(), state)
    }

    fn require_aperture(&self) -> Result<&Rc<Aperture>, ArtworkError> {
        self.aperture
            .as_ref()
            .ok_or(ArtworkError::StateNotSet("current aperture"))
    }

    fn compute_polygons(&self) -> Result<PolygonSet, ArtworkError> {
        match &self.primitive {
            GraphicsPrimitive::Line { start, end } => {
                self.require_aperture()?.line_draw(*start, *end, &self.state)
            }
            GraphicsPrimitive::Arc {
                start, end, center, ccw, ..
            } => {
                let ap = self.require_aperture()?;
                // Stroke generation always walks counter-clockwise.
                if *ccw {
                    ap.arc_draw(*start, *end, *center, &self.state)
                } else {
                    ap.arc_draw(*end, *start, *center, &self.state)
                }
            }
            GraphicsPrimitive::Circle { center, radius } => {
                self.require_aperture()?
                    .circle_draw(*center, *radius, &self.state)
            }
            GraphicsPrimitive::Flash { center } => {
                self.require_aperture()?.flash(*center, &self.state)
            }
            GraphicsPrimitive::Region { contours } => {
                let mut set = PolygonSet::new();
                for contour in contours {
                    if !contour.is_empty() {
                        set.push(contour.to_polygon());
                    }
                }
                Ok(set)
            }
            GraphicsPrimitive::Repeat { block, origin } => {
                let (tile, _) = compose_solid_image(&block.objects, false)?;
                let mut set = PolygonSet::new();
                for i in 0..block.x_repeat {
                    for j in 0..block.y_repeat {
                        let mut copy = tile.clone();
                        copy.translate(
                            origin.x + i as f64 * block.x_delta,
                            origin.y + j as f64 * block.y_delta,
                        );
                        set.extend(copy);
                    }
                }
                Ok(set)
            }
        }
    }
}

fn translate_segment(segment: &ContourSegment, shift: Point) -> ContourSegment {
    match segment {
        ContourSegment::Line { start, end } => ContourSegment::Line {
            start: *start + shift,
            end: *end + shift,
        },
        ContourSegment::Arc {
            start,
            end,
            center,
            ccw,
        } => ContourSegment::Arc {
            start: *start + shift,
            end: *end + shift,
            center: *center + shift,
            ccw: *ccw,
        },
        ContourSegment::Circle { center, radius } => ContourSegment::Circle {
            center: *center + shift,
            radius: *radius,
        },
    }
}

/// Compose an ordered object list into one solid image.
///
/// Polarity is temporal, not set-theoretic: dark objects accumulate into the
/// running image, clear objects pile up until the next dark object (or the
/// end), at which point the pending pile is subtracted in one clip. With
/// `union_final` the finished image is additionally unioned with the empty
/// set to merge touching outlines.
pub fn compose_solid_image(
    objects: &[GraphicsObject],
    union_final: bool,
) -> Result<(PolygonSet, Bounds), ArtworkError> {
    let mut image = PolygonSet::new();
    let mut pending_clear = PolygonSet::new();

    for object in objects {
        let polygons = object.polygons()?;
        match object.state.polarity {
            Polarity::Dark => {
                if !pending_clear.is_empty() {
                    image = boolean::subtract(&image, &pending_clear).0;
                    pending_clear = PolygonSet::new();
                }
                image.extend(polygons.clone());
            }
            Polarity::Clear => {
                pending_clear.extend(polygons.clone());
            }
        }
    }

    if !pending_clear.is_empty() {
        image = boolean::subtract(&image, &pending_clear).0;
    }
    if union_final {
        image = boolean::union(&image, &PolygonSet::new()).0;
    }
    let bounds = image.bounds();
    Ok((image, bounds))
}
