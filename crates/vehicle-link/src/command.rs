use crate::error::VehicleError;
use crate::state::PositionTarget;
use tokio::sync::oneshot;

pub(crate) enum Command {
    Disarm {
        force: bool,
        reply: oneshot::Sender<Result<(), VehicleError>>,
    },
    PositionTarget(PositionTarget),
    Shutdown,
}
