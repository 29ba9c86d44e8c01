//! Resolve PCB fabrication artwork into polygon images.
//!
//! Gerber (RS-274X / X2) files are interpreted by a command state machine
//! into graphics objects (lines, arcs, flashes, regions and repeats) that
//! know how to expand themselves into packed polygon sets using
//! aperture-aware stroke generation. Excellon drill files are parsed into
//! hole lists. Polarity-aware union/difference composition turns an ordered
//! object list into a single solid image suitable for rendering and bounds
//! queries.
//!
//! ```
//! let image = pcb_artwork::parse_gerber(
//!     "%FSLAX26Y26*%%MOMM*%%ADD10C,1.000*%D10*X0Y0D03*M02*",
//! )?;
//! let (polygons, bounds) = image.solid_image(false)?;
//! assert_eq!(polygons.len(), 1);
//! assert!((bounds.width() - 1.0).abs() < 1e-9);
//! # Ok::<(), pcb_artwork::ArtworkError>(())
//! ```

pub mod error;
pub mod excellon;
pub mod geometry;
pub mod gerber;

pub use error::ArtworkError;
pub use excellon::{parse_excellon, DrillFile, DrillHole};
pub use geometry::{Bounds, Mirroring, Point, Polygon, PolygonSet};
pub use gerber::{compose_solid_image, parse_gerber, GerberImage, GerberTokenizer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_serializes_for_renderers() {
        let image = parse_gerber(
            "%FSLAX24Y24*%%MOMM*%%ADD10C,1*%D10*X0Y0D03*M02*",
        )
        .unwrap();
        let (polygons, bounds) = image.solid_image(false).unwrap();
        let json = serde_json::to_value(&polygons).unwrap();
        assert!(json["polygons"].is_array());
        let json = serde_json::to_value(bounds).unwrap();
        assert!((json["min"]["x"].as_f64().unwrap() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_drill_file_serializes() {
        let drills = parse_excellon("M48\nMETRIC,TZ\nT1C0.5\n%\nT1\nX1.000Y2.000\nM30\n").unwrap();
        let json = serde_json::to_value(&drills).unwrap();
        assert_eq!(json["holes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_independent_documents_share_nothing() {
        let a = parse_gerber("%FSLAX24Y24*%%MOMM*%%ADD10C,1*%D10*X0Y0D03*M02*").unwrap();
        let b = parse_gerber("%FSLAX24Y24*%%MOMM*%%ADD10C,2*%D10*X0Y0D03*M02*").unwrap();
        assert!((a.bounds().unwrap().width() - 1.0).abs() < 1e-9);
        assert!((b.bounds().unwrap().width() - 2.0).abs() < 1e-9);
    }
}
