//! Fixed-rate offboard controller: drains operator input, evaluates the
//! mission mode and streams setpoints to the vehicle.

pub mod autopilot;
pub mod cli;
pub mod config;
pub mod inbound;
pub mod server;
pub mod status;
pub mod tick;

pub use autopilot::{Autopilot, LinkAutopilot, Telemetry};
pub use config::{ConfigError, ControllerConfig};
pub use inbound::{ControllerHandle, Inbound, InboundQueue, SubmitError};
pub use status::StatusSnapshot;
pub use tick::TickLoop;
