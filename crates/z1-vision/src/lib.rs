//! Frame-to-state vision: calibration, template matching and HUD decoding.

pub mod calibration;
pub mod decoder;
pub mod engine;
pub mod landmarks;
pub mod layout;
pub mod ncc;
pub mod sampler;
pub mod templates;

pub use calibration::{calibrate, Calibration, CalibrationError, CanonicalLandmarks, Landmarks};
pub use decoder::decode;
pub use engine::{FrameMeasurements, MatchingEngine, RegionSignals, RoomMatch, TileMatch};
pub use landmarks::detect_landmarks;
pub use layout::{TileDefinition, TileId};
pub use templates::{NormalizedTemplate, TemplateBank, TemplateLibrary};
