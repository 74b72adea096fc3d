pub mod attendance;
pub mod error;
pub mod motion;
pub mod notification;
pub mod position;
pub mod route;
pub mod session;
pub mod telemetry;
pub mod trip;

pub use error::TrackerError;
