//! Snapshot creation and polling.
//!
//! Writing `Updating` to the status point of a snapshot model makes the meter
//! capture and sign its current state. The meter reports the result through
//! the same status point.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{BsmDevice, BsmError};
use crate::config::SnapshotConfig;
use crate::sunspec::{ModelHandle, PointValue, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Valid = 0,
    Invalid = 1,
    Updating = 2,
    FailedGeneral = 3,
    FailedNotEnabled = 4,
    FailedFeedback = 5,
}

impl TryFrom<i64> for SnapshotStatus {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        return match value {
            0 => Ok(SnapshotStatus::Valid),
            1 => Ok(SnapshotStatus::Invalid),
            2 => Ok(SnapshotStatus::Updating),
            3 => Ok(SnapshotStatus::FailedGeneral),
            4 => Ok(SnapshotStatus::FailedNotEnabled),
            5 => Ok(SnapshotStatus::FailedFeedback),
            v => Err(v),
        };
    }
}

/// Value of the `Typ` point of a snapshot model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotType {
    Current = 0,
    TurnOn = 1,
    TurnOff = 2,
}

impl SnapshotType {
    pub fn alias(&self) -> &'static str {
        return match self {
            SnapshotType::Current => "signed_current_snapshot",
            SnapshotType::TurnOn => "signed_turn_on_snapshot",
            SnapshotType::TurnOff => "signed_turn_off_snapshot",
        };
    }

    pub fn ocmf_alias(&self) -> &'static str {
        return match self {
            SnapshotType::Current => "ocmf_signed_current_snapshot",
            SnapshotType::TurnOn => "ocmf_signed_turn_on_snapshot",
            SnapshotType::TurnOff => "ocmf_signed_turn_off_snapshot",
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// `None` polls until the meter leaves `Updating`, however long it takes.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        return PollOptions::from(&SnapshotConfig::default());
    }
}

impl From<&SnapshotConfig> for PollOptions {
    fn from(config: &SnapshotConfig) -> Self {
        return PollOptions { interval: config.poll_interval(), timeout: config.timeout() };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Valid(ModelHandle),
    Failed(SnapshotStatus),
    TimedOut,
}

impl SnapshotOutcome {
    pub fn snapshot(&self) -> Option<ModelHandle> {
        return match self {
            SnapshotOutcome::Valid(handle) => Some(*handle),
            _ => None,
        };
    }

    /// Status the meter settled on, `None` after a timeout.
    pub fn status(&self) -> Option<SnapshotStatus> {
        return match self {
            SnapshotOutcome::Valid(_) => Some(SnapshotStatus::Valid),
            SnapshotOutcome::Failed(status) => Some(*status),
            SnapshotOutcome::TimedOut => None,
        };
    }
}

impl<T: Transport> BsmDevice<T> {
    pub fn create_snapshot(&mut self, alias: &str) -> Result<ModelHandle, BsmError> {
        let handle = self.snapshot(alias)?;
        let status_id = self.config.points.snapshot_status.clone();
        self.device
            .write_point(handle, &status_id, PointValue::Integer(SnapshotStatus::Updating as i64))?;
        debug!("Requested snapshot {alias}");
        return Ok(handle);
    }

    /// Status as of the last read of the snapshot model.
    pub fn snapshot_status(&self, handle: ModelHandle) -> Result<SnapshotStatus, BsmError> {
        let value = self.point_integer(handle, &self.config.points.snapshot_status)?;
        return match value {
            Some(v) => SnapshotStatus::try_from(v).map_err(|v| BsmError::UnknownSnapshotStatus(Some(v))),
            None => Err(BsmError::UnknownSnapshotStatus(None)),
        };
    }

    /// Creates a snapshot and reads it back until the meter is done with it.
    pub fn poll_snapshot(&mut self, alias: &str, options: &PollOptions) -> Result<SnapshotOutcome, BsmError> {
        let handle = self.create_snapshot(alias)?;
        let deadline = options.timeout.map(|t| Instant::now() + t);

        loop {
            self.read_model(handle)?;
            let status = self.snapshot_status(handle)?;
            debug!("Snapshot {alias} status {status:?}");

            match status {
                SnapshotStatus::Valid => {
                    info!("Snapshot {alias} is valid");
                    return Ok(SnapshotOutcome::Valid(handle));
                }
                SnapshotStatus::Updating => {}
                failed => {
                    warn!("Snapshot {alias} failed with {failed:?}");
                    return Ok(SnapshotOutcome::Failed(failed));
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() + options.interval > deadline {
                    warn!("Timeout waiting for snapshot {alias}");
                    return Ok(SnapshotOutcome::TimedOut);
                }
            }

            if !options.interval.is_zero() {
                thread::sleep(options.interval);
            }
        }
    }

    /// The snapshot model if a fresh snapshot turned out valid. Uses the poll
    /// options from the configuration.
    pub fn get_snapshot(&mut self, alias: &str) -> Result<Option<ModelHandle>, BsmError> {
        let options = PollOptions::from(&self.config.snapshot);
        return Ok(self.poll_snapshot(alias, &options)?.snapshot());
    }
}
