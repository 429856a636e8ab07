//! TelemetryReader - periodic LLC occupancy polling
//!
//! Each poll is a fresh read of `<group>/mon_data/mon_L3_*/llc_occupancy`.
//! No cursor or history is kept, so a stream can be dropped and restarted at
//! any time. Polling runs independently of any workload: observing the
//! workload while it runs is the whole point.
//!
//! ```text
//! ┌──────────────┐  tick (1s)  ┌──────────────┐  read_occupancy  ┌─────────┐
//! │ poller task  │ ──────────► │ TelemetryRdr │ ───────────────► │ resctrl │
//! └──────────────┘             └──────────────┘                  └─────────┘
//!        │
//!        ▼
//!   tracing + rdtctl_llc_occupancy_bytes{group,domain}
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::metrics;
use crate::resctrl::{OccupancySample, ResctrlError, ResctrlGateway};

/// Occupancy of one group at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub group: String,
    pub taken_at: SystemTime,
    pub samples: Vec<OccupancySample>,
}

impl TelemetrySnapshot {
    /// Occupancy summed over all L3 domains
    pub fn total_bytes(&self) -> u64 {
        self.samples.iter().map(|s| s.bytes).sum()
    }
}

pub struct TelemetryReader {
    gateway: Arc<ResctrlGateway>,
    interval: Duration,
}

impl TelemetryReader {
    pub fn new(gateway: Arc<ResctrlGateway>, interval: Duration) -> Self {
        Self { gateway, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One read of the group's occupancy counters
    pub fn poll(&self, group: &str) -> Result<Vec<OccupancySample>, ResctrlError> {
        self.gateway.read_occupancy(group)
    }

    pub fn snapshot(&self, group: &str) -> Result<TelemetrySnapshot, ResctrlError> {
        read_snapshot(&self.gateway, group)
    }

    /// Unbounded stream of snapshots, one per interval
    ///
    /// The first snapshot is taken immediately. Errors are yielded, not
    /// swallowed: after the group is destroyed every item is `FileNotFound`.
    pub fn snapshots(
        &self,
        group: impl Into<String>,
    ) -> impl Stream<Item = Result<TelemetrySnapshot, ResctrlError>> + Send + 'static {
        let gateway = self.gateway.clone();
        let period = self.interval;
        let group = group.into();

        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                yield read_snapshot(&gateway, &group);
            }
        }
    }

    /// Poll in a background task, logging and exporting every snapshot
    ///
    /// Runs until the returned handle is aborted.
    pub fn spawn_poller(&self, group: impl Into<String>) -> JoinHandle<()> {
        let group = group.into();
        let stream = self.snapshots(group.clone());

        tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(result) = stream.next().await {
                match result {
                    Ok(snapshot) => {
                        for sample in &snapshot.samples {
                            metrics::record_occupancy(&snapshot.group, sample.domain, sample.bytes);
                            info!(
                                group = %snapshot.group,
                                domain = sample.domain,
                                bytes = sample.bytes,
                                "llc occupancy"
                            );
                        }
                    }
                    Err(e) => warn!(group = %group, error = %e, "occupancy poll failed"),
                }
            }
        })
    }
}

fn read_snapshot(
    gateway: &ResctrlGateway,
    group: &str,
) -> Result<TelemetrySnapshot, ResctrlError> {
    let samples = gateway.read_occupancy(group)?;
    Ok(TelemetrySnapshot {
        group: group.to_string(),
        taken_at: SystemTime::now(),
        samples,
    })
}
