//! Device property aggregation
//!
//! `get_prop` runs a two-level query graph:
//!
//! ```text
//! level 0 (joined):  Status  DndTimer  CleanSummary  Consumable
//!                       │                   │
//! level 1 (joined):  DockSummary       CleanRecord
//!                    ├ DustCollectionMode            (any dock)
//!                    ├ SmartWashParameters ┐ EmptyWashFillDock only,
//!                    └ WashingMode         ┘ concurrent with the above
//! ```
//!
//! Any failed query fails the whole call. Level 1 is not started unless all
//! of level 0 succeeded.

use crate::queries::DeviceQueries;
use rockwire_protocol::{
    CleanRecord, CleanSummary, Consumable, DeviceResult, DndTimer, DustCollectionMode,
    SmartWashParameters, Status, WashingMode,
};
use rockwire_transport::{CommandError, CommandSender};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("{query} query failed: {source}")]
    PartialFailure {
        query: &'static str,
        source: CommandError,
    },
}

impl AggregationError {
    /// Name of the query that failed
    pub fn query(&self) -> &'static str {
        match self {
            AggregationError::PartialFailure { query, .. } => query,
        }
    }
}

/// Dock state, present only when a dock is attached
#[derive(Debug, Clone, PartialEq)]
pub struct DockSummary {
    pub dust_collection_mode: DustCollectionMode,
    pub smart_wash_params: Option<SmartWashParameters>,
    pub washing_mode: Option<WashingMode>,
}

/// A complete device snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperty {
    pub status: Status,
    pub dnd_timer: DndTimer,
    pub clean_summary: CleanSummary,
    pub consumable: Consumable,
    pub last_clean_record: Option<CleanRecord>,
    pub dock_summary: Option<DockSummary>,
}

/// Builds `DeviceProperty` snapshots from individual queries
pub struct PropertyAggregator<S: ?Sized> {
    sender: Arc<S>,
}

impl<S: CommandSender + ?Sized> PropertyAggregator<S> {
    pub fn new(sender: Arc<S>) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &Arc<S> {
        &self.sender
    }

    /// Fetch a fresh snapshot of `device_id`
    pub async fn get_prop(&self, device_id: &str) -> Result<DeviceProperty, AggregationError> {
        let sender = self.sender.as_ref();

        let (status, dnd_timer, clean_summary, consumable) = tokio::join!(
            sender.get_status(device_id),
            sender.get_dnd_timer(device_id),
            sender.get_clean_summary(device_id),
            sender.get_consumable(device_id),
        );
        let status = required::<Status>(device_id, status)?;
        let dnd_timer = required::<DndTimer>(device_id, dnd_timer)?;
        let clean_summary = required::<CleanSummary>(device_id, clean_summary)?;
        let consumable = required::<Consumable>(device_id, consumable)?;

        debug!(
            "Device {}: dock {:?}, {} clean record(s)",
            device_id,
            status.dock_type,
            clean_summary.records.len()
        );

        let record = async {
            match clean_summary.latest_record() {
                Some(record_id) => {
                    let record = sender.get_clean_record(device_id, record_id).await;
                    required::<CleanRecord>(device_id, record).map(Some)
                }
                None => Ok(None),
            }
        };
        let dock = async {
            if status.dock_type.has_dock() {
                self.get_dock_summary(device_id, &status).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let (last_clean_record, dock_summary) = tokio::join!(record, dock);

        Ok(DeviceProperty {
            last_clean_record: last_clean_record?,
            dock_summary: dock_summary?,
            status,
            dnd_timer,
            clean_summary,
            consumable,
        })
    }

    /// Fetch the dock sub-graph for a robot known to have a dock
    pub async fn get_dock_summary(
        &self,
        device_id: &str,
        status: &Status,
    ) -> Result<DockSummary, AggregationError> {
        let sender = self.sender.as_ref();

        if !status.dock_type.washes_mops() {
            let mode = sender.get_dust_collection_mode(device_id).await;
            return Ok(DockSummary {
                dust_collection_mode: required::<DustCollectionMode>(device_id, mode)?,
                smart_wash_params: None,
                washing_mode: None,
            });
        }

        let (mode, params, washing) = tokio::join!(
            sender.get_dust_collection_mode(device_id),
            sender.get_smart_wash_params(device_id),
            sender.get_washing_mode(device_id),
        );

        Ok(DockSummary {
            dust_collection_mode: required::<DustCollectionMode>(device_id, mode)?,
            smart_wash_params: Some(required::<SmartWashParameters>(device_id, params)?),
            washing_mode: Some(required::<WashingMode>(device_id, washing)?),
        })
    }
}

fn required<T: DeviceResult>(
    device_id: &str,
    result: Result<T, CommandError>,
) -> Result<T, AggregationError> {
    result.map_err(|source| {
        warn!("Device {}: {} query failed: {}", device_id, T::NAME, source);
        AggregationError::PartialFailure {
            query: T::NAME,
            source,
        }
    })
}
