use crate::calibration::FrameTransform;
use crate::geometry::Point3;
use tracing::{debug, info, warn};

/// Mission waypoints in the local frame, with the uploaded external-frame
/// points kept alongside. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct WaypointList {
    local: Vec<Point3>,
    external: Vec<Point3>,
}

#[allow(clippy::len_without_is_empty)]
impl WaypointList {
    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn last_index(&self) -> usize {
        self.local.len().saturating_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<&Point3> {
        self.local.get(index)
    }

    pub fn local(&self) -> &[Point3] {
        &self.local
    }

    pub fn external(&self) -> &[Point3] {
        &self.external
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("mission contains no waypoints")]
    Empty,
    #[error("waypoint {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested { count: usize },
    /// Held until calibration completes.
    Deferred,
    /// A mission was already accepted; the upload was ignored.
    AlreadyIngested,
    Rejected(IngestError),
}

/// Transform every external-frame point into the local frame, preserving order.
pub fn transform_points(points: &[Point3], transform: &FrameTransform) -> Vec<Point3> {
    points.iter().map(|p| transform.external_to_local(p)).collect()
}

/// Accepts the first valid mission upload and converts it to the local frame
/// once a transform is available.
#[derive(Debug, Clone, Default)]
pub struct WaypointIngestor {
    pending: Option<Vec<Point3>>,
    list: Option<WaypointList>,
}

impl WaypointIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waypoints(&self) -> Option<&WaypointList> {
        self.list.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn submit(
        &mut self,
        points: Vec<Point3>,
        transform: Option<&FrameTransform>,
    ) -> IngestOutcome {
        if self.list.is_some() || self.pending.is_some() {
            debug!("ignoring mission upload, one is already held");
            return IngestOutcome::AlreadyIngested;
        }

        if let Err(err) = validate(&points) {
            warn!("mission upload rejected: {err}");
            return IngestOutcome::Rejected(err);
        }

        match transform {
            Some(transform) => self.ingest(points, transform),
            None => {
                info!(
                    count = points.len(),
                    "mission received before calibration, holding until the frame transform is known"
                );
                self.pending = Some(points);
                IngestOutcome::Deferred
            }
        }
    }

    /// Ingest a held mission now that `transform` is known.
    pub fn resume(&mut self, transform: &FrameTransform) -> Option<IngestOutcome> {
        let points = self.pending.take()?;
        Some(self.ingest(points, transform))
    }

    fn ingest(&mut self, external: Vec<Point3>, transform: &FrameTransform) -> IngestOutcome {
        let local = transform_points(&external, transform);
        info!(?local, "waypoints in local frame");
        info!(?external, "waypoints in external frame");

        let count = local.len();
        self.list = Some(WaypointList { local, external });
        IngestOutcome::Ingested { count }
    }
}

fn validate(points: &[Point3]) -> Result<(), IngestError> {
    if points.is_empty() {
        return Err(IngestError::Empty);
    }
    match points
        .iter()
        .position(|p| !p.iter().all(|c| c.is_finite()))
    {
        Some(index) => Err(IngestError::NonFinite { index }),
        None => Ok(()),
    }
}
