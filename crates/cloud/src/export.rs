//! Asynchronous export jobs.
//!
//! Submitting an export returns an [`ExportJob`] immediately. The pipeline
//! does not wait on it; callers may poll with [`ExportJob::try_status`] or
//! block with [`ExportJob::wait`].

use crate::error::{CloudError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use fieldzones_core::io::write_zone_geotiff;
use fieldzones_core::ZoneRaster;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lifecycle of an export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExportStatus {
    Submitted,
    Running,
    Completed { location: String },
    Failed { reason: String },
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed { .. } | ExportStatus::Failed { .. })
    }

    /// Map a service state string (`SUBMITTED`, `RUNNING`, `COMPLETED`,
    /// `FAILED`, with common synonyms) to a status.
    pub fn from_state(state: &str, location: Option<String>, error: Option<String>) -> Result<Self> {
        match state.to_ascii_uppercase().as_str() {
            "SUBMITTED" | "READY" | "PENDING" | "QUEUED" => Ok(ExportStatus::Submitted),
            "RUNNING" | "IN_PROGRESS" => Ok(ExportStatus::Running),
            "COMPLETED" | "SUCCEEDED" | "DONE" => Ok(ExportStatus::Completed {
                location: location.unwrap_or_default(),
            }),
            "FAILED" | "CANCELLED" | "CANCELED" => Ok(ExportStatus::Failed {
                reason: error.unwrap_or_else(|| state.to_ascii_lowercase()),
            }),
            other => Err(CloudError::Decode(format!("unknown export state '{}'", other))),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::Submitted => write!(f, "submitted"),
            ExportStatus::Running => write!(f, "running"),
            ExportStatus::Completed { location } => write!(f, "completed ({})", location),
            ExportStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Where status updates of a job come from.
pub trait JobSource: Send {
    /// Latest status, waiting at most `wait` for a change. `None` when
    /// nothing new is known.
    fn refresh(&mut self, wait: Option<Duration>) -> Result<Option<ExportStatus>>;
}

/// Handle to a submitted export.
pub struct ExportJob {
    id: String,
    destination: String,
    status: ExportStatus,
    source: Box<dyn JobSource>,
}

impl fmt::Debug for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportJob")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("status", &self.status)
            .finish()
    }
}

impl ExportJob {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        status: ExportStatus,
        source: Box<dyn JobSource>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            status,
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable destination, e.g. `zone_exports/management_zones_export`
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Last status observed, without polling.
    pub fn last_status(&self) -> &ExportStatus {
        &self.status
    }

    /// Poll once without waiting for completion.
    pub fn try_status(&mut self) -> Result<ExportStatus> {
        if !self.status.is_terminal() {
            if let Some(status) = self.source.refresh(None)? {
                self.status = status;
            }
        }
        Ok(self.status.clone())
    }

    /// Block until the job reaches a terminal state or `timeout` elapses,
    /// polling every `interval`. Returns the last status seen.
    pub fn wait(&mut self, timeout: Duration, interval: Duration) -> Result<ExportStatus> {
        let deadline = Instant::now() + timeout;
        while !self.status.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = interval.min(deadline - now);
            if let Some(status) = self.source.refresh(Some(wait))? {
                self.status = status;
            }
        }
        Ok(self.status.clone())
    }
}

// ---------------------------------------------------------------------------
// Local file sink
// ---------------------------------------------------------------------------

/// Status updates pushed by a background writer thread.
struct ChannelSource {
    rx: Receiver<ExportStatus>,
}

impl JobSource for ChannelSource {
    fn refresh(&mut self, wait: Option<Duration>) -> Result<Option<ExportStatus>> {
        let mut disconnected = false;
        let mut latest = match wait {
            Some(d) => match self.rx.recv_timeout(d) {
                Ok(status) => Some(status),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    None
                }
            },
            None => None,
        };
        while !disconnected {
            match self.rx.try_recv() {
                Ok(status) => latest = Some(status),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => disconnected = true,
            }
        }
        // A writer that hangs up without a terminal status has died.
        if disconnected && !latest.as_ref().is_some_and(ExportStatus::is_terminal) {
            latest = Some(ExportStatus::Failed {
                reason: "export worker exited".into(),
            });
        }
        Ok(latest)
    }
}

/// Write `raster` to `<root>/<folder>/<description>.tif` on a background
/// thread.
pub fn spawn_file_export(
    id: String,
    root: &Path,
    folder: &str,
    description: &str,
    raster: ZoneRaster,
) -> Result<ExportJob> {
    for (name, value) in [("folder", folder), ("description", description)] {
        if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
            return Err(CloudError::ExportRejected(format!("invalid {} name '{}'", name, value)));
        }
    }

    let dir = root.join(folder);
    let path: PathBuf = dir.join(format!("{}.tif", description));
    let destination = format!("{}/{}", folder, description);
    let (tx, rx) = crossbeam_channel::unbounded();

    let job_id = id.clone();
    std::thread::spawn(move || run_file_export(&job_id, &dir, &path, &raster, &tx));

    Ok(ExportJob::new(
        id,
        destination,
        ExportStatus::Submitted,
        Box::new(ChannelSource { rx }),
    ))
}

fn run_file_export(id: &str, dir: &Path, path: &Path, raster: &ZoneRaster, tx: &Sender<ExportStatus>) {
    let _ = tx.send(ExportStatus::Running);

    let result = std::fs::create_dir_all(dir)
        .map_err(fieldzones_core::Error::from)
        .and_then(|_| write_zone_geotiff(raster, path));

    let status = match result {
        Ok(()) => {
            tracing::debug!("Export {} written to {}", id, path.display());
            ExportStatus::Completed {
                location: path.display().to_string(),
            }
        }
        Err(e) => {
            tracing::warn!("Export {} failed: {}", id, e);
            ExportStatus::Failed { reason: e.to_string() }
        }
    };
    let _ = tx.send(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldzones_core::{GeoTransform, ZONE_NODATA};

    fn raster() -> ZoneRaster {
        let mut r = ZoneRaster::from_vec(vec![0, 1, 1, ZONE_NODATA], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(-50.0, -16.99, 0.0001, -0.0001));
        r.set_nodata(Some(ZONE_NODATA));
        r
    }

    #[test]
    fn file_export_completes() {
        let root = tempfile::tempdir().unwrap();
        let mut job = spawn_file_export("job-1".into(), root.path(), "zone_exports", "zones", raster()).unwrap();
        assert_eq!(job.id(), "job-1");
        assert_eq!(job.destination(), "zone_exports/zones");

        let status = job.wait(Duration::from_secs(10), Duration::from_millis(20)).unwrap();
        match status {
            ExportStatus::Completed { location } => {
                assert!(location.ends_with("zones.tif"));
                assert!(root.path().join("zone_exports/zones.tif").exists());
            }
            other => panic!("unexpected status {:?}", other),
        }
        // Terminal status is sticky.
        assert!(job.try_status().unwrap().is_terminal());
        assert!(job.last_status().is_terminal());
    }

    #[test]
    fn worker_hanging_up_fails_the_job() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(ExportStatus::Running).unwrap();
        drop(tx);

        let mut job = ExportJob::new("job-2", "zone_exports/zones", ExportStatus::Submitted, Box::new(ChannelSource { rx }));
        let started = Instant::now();
        let status = job.wait(Duration::from_secs(30), Duration::from_millis(20)).unwrap();
        assert_eq!(status, ExportStatus::Failed { reason: "export worker exited".into() });
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn terminal_status_before_hang_up_is_kept() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(ExportStatus::Completed { location: "out.tif".into() }).unwrap();
        drop(tx);

        let mut job = ExportJob::new("job-3", "zone_exports/zones", ExportStatus::Submitted, Box::new(ChannelSource { rx }));
        assert_eq!(job.try_status().unwrap(), ExportStatus::Completed { location: "out.tif".into() });
    }

    #[test]
    fn rejects_path_like_names() {
        let root = tempfile::tempdir().unwrap();
        assert!(spawn_file_export("j".into(), root.path(), "../up", "zones", raster()).is_err());
        assert!(spawn_file_export("j".into(), root.path(), "ok", "", raster()).is_err());
    }

    #[test]
    fn state_strings() {
        assert_eq!(ExportStatus::from_state("running", None, None).unwrap(), ExportStatus::Running);
        assert_eq!(
            ExportStatus::from_state("FAILED", None, Some("quota".into())).unwrap(),
            ExportStatus::Failed { reason: "quota".into() }
        );
        assert!(ExportStatus::from_state("???", None, None).is_err());
    }
}
