//! Interpreter state for a single Gerber document, including the stack of
//! graphics consumers that regions, aperture blocks and step-and-repeat
//! scopes push while open.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::error::ArtworkError;
use crate::geometry::{Mirroring, Point};

use super::apertures::Aperture;
use super::coord::{CoordinateFormat, Notation, Units};
use super::macros::ApertureMacro;
use super::primitives::{
    Contour, ContourSegment, GraphicsObject, GraphicsPrimitive, ObjectState, Polarity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    Linear,
    /// Linear with a coordinate scale carried from G10/G11/G12; no effect on
    /// the rendered geometry.
    LinearScaled,
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadrantMode {
    Single,
    Multi,
}

/// Parameters of an open %SR scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRepeat {
    pub x_repeat: u32,
    pub y_repeat: u32,
    pub x_delta: f64,
    pub y_delta: f64,
}

/// Collects emitted objects verbatim (the base of the stack).
#[derive(Debug, Default)]
pub struct BaseCollector {
    pub objects: Vec<GraphicsObject>,
}

/// Accumulates region contours between G36 and G37.
#[derive(Debug, Default)]
pub struct RegionCollector {
    pub contours: Vec<Contour>,
    current: Contour,
}

impl RegionCollector {
    fn push_segment(&mut self, segment: ContourSegment) {
        self.current.segments.push(segment);
    }

    pub fn close_contour(&mut self) {
        if !self.current.is_empty() {
            self.contours.push(std::mem::take(&mut self.current));
        }
    }
}

/// Collects the contents of an %AB or %SR scope.
#[derive(Debug, Default)]
pub struct BlockCollector {
    pub objects: Vec<GraphicsObject>,
}

/// One entry of the consumer stack. A tagged enum keeps dispatch off the
/// hot path.
#[derive(Debug)]
pub enum GraphicsConsumer {
    Base(BaseCollector),
    Region(RegionCollector),
    Block(BlockCollector),
}

impl GraphicsConsumer {
    pub fn is_region(&self) -> bool {
        matches!(self, GraphicsConsumer::Region(_))
    }

    pub fn line(
        &mut self,
        start: Point,
        end: Point,
        aperture: Option<Rc<Aperture>>,
        state: ObjectState,
    ) {
        match self {
            GraphicsConsumer::Region(region) => {
                region.push_segment(ContourSegment::Line { start, end });
            }
            _ => self.push_object(GraphicsObject::new(
                GraphicsPrimitive::Line { start, end },
                aperture,
                state,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        &mut self,
        start: Point,
        end: Point,
        center: Point,
        radius: f64,
        ccw: bool,
        aperture: Option<Rc<Aperture>>,
        state: ObjectState,
    ) {
        match self {
            GraphicsConsumer::Region(region) => {
                region.push_segment(ContourSegment::Arc {
                    start,
                    end,
                    center,
                    ccw,
                });
            }
            _ => self.push_object(GraphicsObject::new(
                GraphicsPrimitive::Arc {
                    start,
                    end,
                    center,
                    radius,
                    ccw,
                },
                aperture,
                state,
            )),
        }
    }

    pub fn circle(
        &mut self,
        center: Point,
        radius: f64,
        aperture: Option<Rc<Aperture>>,
        state: ObjectState,
    ) {
        match self {
            GraphicsConsumer::Region(region) => {
                region.push_segment(ContourSegment::Circle { center, radius });
            }
            _ => self.push_object(GraphicsObject::new(
                GraphicsPrimitive::Circle { center, radius },
                aperture,
                state,
            )),
        }
    }

    /// Flash the given aperture. Block apertures expand into their nested
    /// object lists; flashing inside a region is an error.
    pub fn flash(
        &mut self,
        center: Point,
        aperture: &Rc<Aperture>,
        state: ObjectState,
    ) -> Result<(), ArtworkError> {
        if self.is_region() {
            return Err(ArtworkError::Geometry(
                "flash inside a region block".into(),
            ));
        }
        if aperture.is_block() {
            for nested in aperture.block_objects(state.polarity) {
                self.push_object(nested.translated(center.x, center.y));
            }
            return Ok(());
        }
        self.push_object(GraphicsObject::new(
            GraphicsPrimitive::Flash { center },
            Some(aperture.clone()),
            state,
        ));
        Ok(())
    }

    /// Record an already-built object (finished regions, repeats).
    pub fn push_object(&mut self, object: GraphicsObject) {
        match self {
            GraphicsConsumer::Base(base) => base.objects.push(object),
            GraphicsConsumer::Block(block) => block.objects.push(object),
            GraphicsConsumer::Region(_) => {
                // Nothing inside a region emits whole objects; regions are
                // closed before anything lands here.
            }
        }
    }

    /// Close the open contour when a D02 arrives inside a region.
    pub fn close_contour(&mut self) {
        if let GraphicsConsumer::Region(region) = self {
            region.close_contour();
        }
    }
}

/// The full interpreter state for one document.
#[derive(Debug)]
pub struct GerberState {
    format: Option<CoordinateFormat>,
    units: Option<Units>,
    current_aperture: Option<u32>,
    interpolation: Option<InterpolationMode>,
    quadrant: Option<QuadrantMode>,

    pub current_point: Point,
    /// Last seen I/J arc offsets, in mm.
    pub arc_offset: Point,
    pub polarity: Polarity,
    pub mirroring: Mirroring,
    /// Object rotation in degrees (%LR).
    pub rotation: f64,
    pub scale: f64,
    pub notation: Notation,

    pub apertures: HashMap<u32, Rc<Aperture>>,
    pub macros: HashMap<String, Rc<ApertureMacro>>,

    consumers: Vec<GraphicsConsumer>,
    pub open_blocks: Vec<u32>,
    pub step_repeats: Vec<StepRepeat>,

    /// Attribute records from TF/TA/TO, kept without geometric effect.
    pub attributes: Vec<String>,
    pub warnings: Vec<String>,
    pub done: bool,
    /// Final object list, filled when the end-of-file command executes.
    pub objects: Vec<GraphicsObject>,
}

impl Default for GerberState {
    fn default() -> Self {
        Self::new()
    }
}

impl GerberState {
    pub fn new() -> Self {
        Self {
            format: None,
            units: None,
            current_aperture: None,
            interpolation: None,
            quadrant: None,
            current_point: Point::new(0.0, 0.0),
            arc_offset: Point::new(0.0, 0.0),
            polarity: Polarity::Dark,
            mirroring: Mirroring::None,
            rotation: 0.0,
            scale: 1.0,
            notation: Notation::Absolute,
            apertures: HashMap::new(),
            macros: HashMap::new(),
            consumers: vec![GraphicsConsumer::Base(BaseCollector::default())],
            open_blocks: Vec::new(),
            step_repeats: Vec::new(),
            attributes: Vec::new(),
            warnings: Vec::new(),
            done: false,
            objects: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    // ─── Required-before-use state ───────────────────────────────────

    pub fn set_format(&mut self, format: CoordinateFormat) {
        if self.format.is_some() {
            self.warn("coordinate format specified more than once; keeping the first");
            return;
        }
        self.notation = format.notation;
        self.format = Some(format);
    }

    pub fn format(&self) -> Result<&CoordinateFormat, ArtworkError> {
        self.format
            .as_ref()
            .ok_or(ArtworkError::StateNotSet("coordinate format"))
    }

    pub fn set_units(&mut self, units: Units) {
        self.units = Some(units);
    }

    pub fn units(&self) -> Result<Units, ArtworkError> {
        self.units.ok_or(ArtworkError::StateNotSet("units"))
    }

    pub fn set_aperture(&mut self, code: u32) {
        self.current_aperture = Some(code);
    }

    pub fn aperture(&self) -> Result<Rc<Aperture>, ArtworkError> {
        let code = self
            .current_aperture
            .ok_or(ArtworkError::StateNotSet("current aperture"))?;
        self.apertures
            .get(&code)
            .cloned()
            .ok_or_else(|| ArtworkError::Geometry(format!("aperture D{code} is not defined")))
    }

    pub fn set_interpolation(&mut self, mode: InterpolationMode) {
        self.interpolation = Some(mode);
    }

    pub fn interpolation(&self) -> Result<InterpolationMode, ArtworkError> {
        self.interpolation
            .ok_or(ArtworkError::StateNotSet("interpolation mode"))
    }

    pub fn set_quadrant(&mut self, mode: QuadrantMode) {
        self.quadrant = Some(mode);
    }

    pub fn quadrant(&self) -> Result<QuadrantMode, ArtworkError> {
        self.quadrant
            .ok_or(ArtworkError::StateNotSet("quadrant mode"))
    }

    // ─── Derived helpers ─────────────────────────────────────────────

    /// Snapshot of the transform state stamped onto emitted objects.
    pub fn object_state(&self) -> ObjectState {
        ObjectState {
            polarity: self.polarity,
            mirroring: self.mirroring,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Scale factor from file units to mm (requires %MO).
    pub fn unit_scale(&self) -> Result<f64, ArtworkError> {
        Ok(self.units()?.scale())
    }

    // ─── Consumer stack ──────────────────────────────────────────────

    pub fn consumer(&mut self) -> &mut GraphicsConsumer {
        self.consumers
            .last_mut()
            .expect("consumer stack always holds the base collector")
    }

    pub fn in_region(&self) -> bool {
        self.consumers.last().is_some_and(GraphicsConsumer::is_region)
    }

    pub fn push_consumer(&mut self, consumer: GraphicsConsumer) {
        self.consumers.push(consumer);
    }

    pub fn pop_consumer(&mut self) -> Result<GraphicsConsumer, ArtworkError> {
        if self.consumers.len() <= 1 {
            return Err(ArtworkError::Geometry(
                "no open region or block scope to close".into(),
            ));
        }
        Ok(self
            .consumers
            .pop()
            .expect("stack length checked above"))
    }

    /// Drain the base collector at end of file.
    pub fn take_base_objects(&mut self) -> Result<Vec<GraphicsObject>, ArtworkError> {
        if self.consumers.len() != 1 {
            return Err(ArtworkError::Geometry(
                "unclosed region or block scope at end of file".into(),
            ));
        }
        match self.consumers.first_mut() {
            Some(GraphicsConsumer::Base(base)) => Ok(std::mem::take(&mut base.objects)),
            _ => Err(ArtworkError::Geometry(
                "consumer stack bottom is not the base collector".into(),
            )),
        }
    }
}
