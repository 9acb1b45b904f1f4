use crate::autopilot::Autopilot;
use crate::config::ControllerConfig;
use crate::inbound::{Inbound, InboundQueue};
use crate::status::StatusSnapshot;
use mission_core::{CalibrationOutcome, IngestOutcome, MissionState, ModeController, TickOutput};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vehicle_link::VehicleError;

/// Fixed-rate driver. Owns the [`MissionState`] and is the only writer to it.
pub struct TickLoop<A> {
    autopilot: A,
    inbound: InboundQueue,
    state: MissionState,
    controller: ModeController,
    period: Duration,
    force_disarm: bool,
}

impl<A: Autopilot> TickLoop<A> {
    pub fn new(autopilot: A, inbound: InboundQueue, config: &ControllerConfig) -> Self {
        Self {
            autopilot,
            inbound,
            state: MissionState::new(&config.mission),
            controller: ModeController::new(config.mission),
            period: config.tick.period(),
            force_disarm: config.abort.force_disarm,
        }
    }

    pub fn state(&self) -> &MissionState {
        &self.state
    }

    /// Run one tick. Never waits: a disarm request is spawned onto the runtime.
    pub fn tick(&mut self, now: Instant) -> TickOutput {
        let telemetry = self.autopilot.telemetry();
        self.state.update_pose(telemetry.pose);
        self.state.update_vehicle(telemetry.vehicle);

        while let Some(message) = self.inbound.try_next() {
            self.apply(message);
        }

        let output = self.controller.evaluate(&mut self.state, now);

        if let Some(setpoint) = &output.setpoint {
            if let Err(err) = self.autopilot.publish_setpoint(setpoint) {
                warn!("failed to publish setpoint: {err}");
            }
        }

        if output.disarm {
            info!(force = self.force_disarm, "requesting disarm");
            let request = self.autopilot.disarm(self.force_disarm);
            tokio::spawn(async move {
                match request.await {
                    Ok(()) => info!("disarm accepted"),
                    Err(VehicleError::Cancelled) => debug!("disarm request superseded"),
                    Err(err) => warn!("disarm failed: {err}"),
                }
            });
        }

        self.inbound
            .publish_status(StatusSnapshot::from_state(&self.state, output.hold));
        output
    }

    fn apply(&mut self, message: Inbound) {
        match message {
            Inbound::Command(command) => {
                self.state.apply_command(command);
            }
            Inbound::Calibration(sample) => {
                let outcome = self.state.submit_calibration(&sample);
                if let CalibrationOutcome::AlreadyCalibrated = outcome {
                    debug!("ignoring calibration sample, transform already fixed");
                }
            }
            Inbound::Mission(points) => match self.state.submit_mission(points) {
                IngestOutcome::Deferred => info!("mission held until calibration completes"),
                IngestOutcome::AlreadyIngested => debug!("ignoring mission upload, already ingested"),
                IngestOutcome::Rejected(err) => warn!("mission upload rejected: {err}"),
                IngestOutcome::Ingested { .. } => {}
            },
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period = ?self.period, "tick loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("tick loop stopping");
                    return Ok(());
                }
                instant = interval.tick() => {
                    self.tick(instant.into_std());
                }
            }
        }
    }
}
