pub mod boolean;
pub mod point;
pub mod polygon;

pub use point::{Mirroring, Point};
pub use polygon::{Bounds, Polygon, PolygonSet, ARC_STEPS, CLOSE_EPSILON};
