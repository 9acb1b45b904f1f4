pub mod command;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod frames;
pub mod state;
pub mod vehicle;

pub use config::{RetryPolicy, VehicleConfig};
pub use error::VehicleError;
pub use vehicle::Vehicle;

pub use state::{LinkState, LocalPose, PositionTarget, SystemStatus, VehicleState};
