use crate::command::Command;
use crate::config::VehicleConfig;
use crate::error::VehicleError;
use crate::event_loop::run_event_loop;
use crate::state::{create_channels, LinkState, LocalPose, PositionTarget, StateChannels, VehicleState};
use mavlink::common;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Async MAVLink handle to the autopilot.
///
/// `Vehicle` is `Clone + Send + Sync`. Clones share the same connection.
/// When the last clone is dropped, the event loop is cancelled.
#[derive(Clone)]
pub struct Vehicle {
    inner: Arc<VehicleInner>,
}

struct VehicleInner {
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    channels: StateChannels,
}

impl Drop for VehicleInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Vehicle {
    /// Connect using a mavlink address string (e.g. `udpin:0.0.0.0:14550`).
    /// Waits for the first autopilot HEARTBEAT before returning.
    pub async fn connect(address: &str) -> Result<Self, VehicleError> {
        Self::connect_with_config(address, VehicleConfig::default()).await
    }

    pub async fn connect_with_config(
        address: &str,
        config: VehicleConfig,
    ) -> Result<Self, VehicleError> {
        Self::connect_with_cancel(address, config, CancellationToken::new()).await
    }

    /// Connect under an externally owned shutdown token. Cancelling it stops
    /// the event loop and aborts a pending connect; dropping the vehicle does
    /// not cancel it.
    pub async fn connect_with_cancel(
        address: &str,
        config: VehicleConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, VehicleError> {
        let cancel = shutdown.child_token();
        let connection = mavlink::connect_async::<common::MavMessage>(address)
            .await
            .map_err(|err| VehicleError::ConnectionFailed(err.to_string()))?;

        let (writers, channels) = create_channels();
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let connect_timeout = config.connect_timeout;

        tokio::spawn(run_event_loop(
            connection,
            command_rx,
            writers,
            config,
            cancel.clone(),
        ));

        let vehicle = Vehicle {
            inner: Arc::new(VehicleInner {
                command_tx,
                cancel: cancel.clone(),
                channels,
            }),
        };

        let mut vs_rx = vehicle.state();
        let heartbeat_wait = async {
            loop {
                if vs_rx.borrow_and_update().heartbeat_seen() {
                    return Ok::<(), VehicleError>(());
                }
                vs_rx.changed().await.map_err(|_| VehicleError::Disconnected)?;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(VehicleError::Cancelled),
            result = heartbeat_wait => result?,
            _ = tokio::time::sleep(connect_timeout) => {
                return Err(VehicleError::Timeout);
            }
        }

        Ok(vehicle)
    }

    // --- Reactive state (watch channels) ---

    pub fn state(&self) -> watch::Receiver<VehicleState> {
        self.inner.channels.vehicle_state.clone()
    }

    pub fn pose(&self) -> watch::Receiver<Option<LocalPose>> {
        self.inner.channels.pose.clone()
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.channels.link_state.clone()
    }

    // --- Vehicle commands ---

    /// Queue a local position setpoint without waiting.
    pub fn publish_position_target(&self, target: PositionTarget) -> Result<(), VehicleError> {
        self.inner
            .command_tx
            .try_send(Command::PositionTarget(target))
            .map_err(|err| match err {
                TrySendError::Full(_) => VehicleError::QueueFull,
                TrySendError::Closed(_) => VehicleError::Disconnected,
            })
    }

    pub async fn disarm(&self, force: bool) -> Result<(), VehicleError> {
        self.send_command(|reply| Command::Disarm { force, reply }).await
    }

    /// Gracefully disconnect from the vehicle.
    pub async fn disconnect(self) -> Result<(), VehicleError> {
        let _ = self.inner.command_tx.send(Command::Shutdown).await;
        Ok(())
    }

    async fn send_command<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, VehicleError>>) -> Command,
    ) -> Result<T, VehicleError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(make(tx))
            .await
            .map_err(|_| VehicleError::Disconnected)?;
        rx.await.map_err(|_| VehicleError::Disconnected)?
    }
}
