//! Gerber (RS-274X / X2) interpreter: framing, command dispatch, the image
//! state machine, and polygon resolution.

pub mod apertures;
pub mod commands;
pub mod coord;
pub mod expr;
pub mod macros;
pub mod primitives;
pub mod state;
pub mod tokenizer;

use crate::error::ArtworkError;
use crate::geometry::polygon::{Bounds, PolygonSet};

use self::state::GerberState;

pub use self::primitives::{compose_solid_image, GraphicsObject, GraphicsPrimitive, Polarity};
pub use self::tokenizer::GerberTokenizer;

/// The resolved image of one Gerber file: the ordered object list plus the
/// attribute and warning records collected along the way.
#[derive(Debug)]
pub struct GerberImage {
    pub objects: Vec<GraphicsObject>,
    pub attributes: Vec<String>,
    pub warnings: Vec<String>,
}

impl GerberImage {
    /// Compose the ordered object list into one solid polygon image,
    /// honoring polarity order.
    pub fn solid_image(&self, union: bool) -> Result<(PolygonSet, Bounds), ArtworkError> {
        compose_solid_image(&self.objects, union)
    }

    /// Overall image bounds from the per-object polygon bounds, without
    /// running any Boolean composition.
    pub fn bounds(&self) -> Result<Bounds, ArtworkError> {
        let mut bounds = Bounds::empty();
        for object in &self.objects {
            bounds.merge(&object.bounds()?);
        }
        Ok(bounds)
    }
}

/// Parse a complete Gerber document into its resolved image.
pub fn parse_gerber(content: &str) -> Result<GerberImage, ArtworkError> {
    let records = tokenizer::tokenize(content);
    if records.is_empty() {
        return Err(ArtworkError::parse(0, "empty Gerber input"));
    }
    let parsed = commands::parse_commands(&records)?;

    let mut state = GerberState::new();
    let mut last_line = 0;
    for spanned in &parsed {
        spanned.command.execute(&mut state, spanned.line)?;
        last_line = spanned.line;
        if state.done {
            break;
        }
    }

    if !state.done {
        // Some writers drop the M02; salvage what was collected.
        state.warn("input ended without an end-of-file command");
        commands::GerberCommand::EndOfFile.execute(&mut state, last_line)?;
    }

    Ok(GerberImage {
        objects: std::mem::take(&mut state.objects),
        attributes: std::mem::take(&mut state.attributes),
        warnings: std::mem::take(&mut state.warnings),
    })
}
