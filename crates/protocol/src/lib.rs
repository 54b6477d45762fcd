pub mod constants;
pub mod frames;
pub mod types;

// Re-export primary types for convenience.
pub use constants::FrameType;
pub use frames::{FrameError, InboundEvent, LocationReport, OutboundMessage, decode_frame};
pub use types::{ActiveShift, Coordinates, UserLocation};
