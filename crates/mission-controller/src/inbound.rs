use crate::status::StatusSnapshot;
use mission_core::{CalibrationSample, OperatorCommand, Point3};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, watch};

/// Messages from the operator, calibration and mission-upload channels.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(OperatorCommand),
    Calibration(CalibrationSample),
    Mission(Vec<Point3>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("controller inbound queue is full")]
    QueueFull,
    #[error("controller has stopped")]
    Stopped,
}

/// Producer side. Every method enqueues and returns without waiting on the
/// tick loop.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Inbound>,
    status: watch::Receiver<StatusSnapshot>,
}

impl ControllerHandle {
    pub fn command(&self, command: OperatorCommand) -> Result<(), SubmitError> {
        self.submit(Inbound::Command(command))
    }

    pub fn calibration(&self, sample: CalibrationSample) -> Result<(), SubmitError> {
        self.submit(Inbound::Calibration(sample))
    }

    pub fn mission(&self, points: Vec<[f64; 3]>) -> Result<(), SubmitError> {
        self.submit(Inbound::Mission(points.into_iter().map(Point3::from).collect()))
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    fn submit(&self, message: Inbound) -> Result<(), SubmitError> {
        self.tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Closed(_) => SubmitError::Stopped,
        })
    }
}

/// Consumer side, owned by the tick loop.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<Inbound>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl InboundQueue {
    /// Next queued message, if any. Never waits.
    pub fn try_next(&mut self) -> Option<Inbound> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn publish_status(&self, status: StatusSnapshot) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

pub fn channel(capacity: usize) -> (ControllerHandle, InboundQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let (status_tx, status) = watch::channel(StatusSnapshot::default());
    (
        ControllerHandle { tx, status },
        InboundQueue { rx, status_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_core::Mode;

    #[test]
    fn messages_arrive_in_order() {
        let (handle, mut queue) = channel(8);
        handle.command(OperatorCommand::Launch).unwrap();
        handle.mission(vec![[1.0, 2.0, 3.0]]).unwrap();
        handle.command(OperatorCommand::Land).unwrap();

        assert_eq!(queue.try_next(), Some(Inbound::Command(OperatorCommand::Launch)));
        assert_eq!(
            queue.try_next(),
            Some(Inbound::Mission(vec![Point3::new(1.0, 2.0, 3.0)]))
        );
        assert_eq!(queue.try_next(), Some(Inbound::Command(OperatorCommand::Land)));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn full_queue_fails_fast() {
        let (handle, _queue) = channel(1);
        handle.command(OperatorCommand::Launch).unwrap();
        assert_eq!(handle.command(OperatorCommand::Abort), Err(SubmitError::QueueFull));
    }

    #[test]
    fn dropped_queue_reports_stopped() {
        let (handle, queue) = channel(1);
        drop(queue);
        assert_eq!(handle.command(OperatorCommand::Abort), Err(SubmitError::Stopped));
    }

    #[test]
    fn status_is_visible_to_handles() {
        let (handle, queue) = channel(1);
        queue.publish_status(StatusSnapshot {
            mode: Mode::Land,
            ..StatusSnapshot::default()
        });
        assert_eq!(handle.status().mode, Mode::Land);
    }
}
