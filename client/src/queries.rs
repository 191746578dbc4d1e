//! Typed device queries
//!
//! Each helper issues one command and parses its result into the matching
//! container. Available on anything that implements `CommandSender`.

use async_trait::async_trait;
use rockwire_protocol::{
    CleanRecord, CleanSummary, Consumable, DeviceResult, DndTimer, DustCollectionMode,
    MultiMapsList, RoborockCommand, SmartWashParameters, Status, WashingMode,
};
use rockwire_transport::{CommandError, CommandSender};
use serde_json::{json, Value};
use tracing::trace;

#[async_trait]
pub trait DeviceQueries: CommandSender {
    /// Send `method` and parse the result as `T`
    async fn fetch<T>(
        &self,
        device_id: &str,
        method: RoborockCommand,
        params: Vec<Value>,
    ) -> Result<T, CommandError>
    where
        T: DeviceResult + Send,
    {
        let value = self.send_command(device_id, method, params).await?;
        trace!("Parsing {} reply as {}", method, T::NAME);
        Ok(T::from_value(value)?)
    }

    async fn get_status(&self, device_id: &str) -> Result<Status, CommandError> {
        self.fetch(device_id, RoborockCommand::GetStatus, vec![]).await
    }

    async fn get_dnd_timer(&self, device_id: &str) -> Result<DndTimer, CommandError> {
        self.fetch(device_id, RoborockCommand::GetDndTimer, vec![]).await
    }

    async fn get_clean_summary(&self, device_id: &str) -> Result<CleanSummary, CommandError> {
        self.fetch(device_id, RoborockCommand::GetCleanSummary, vec![]).await
    }

    async fn get_clean_record(
        &self,
        device_id: &str,
        record_id: u64,
    ) -> Result<CleanRecord, CommandError> {
        self.fetch(device_id, RoborockCommand::GetCleanRecord, vec![json!(record_id)])
            .await
    }

    async fn get_consumable(&self, device_id: &str) -> Result<Consumable, CommandError> {
        self.fetch(device_id, RoborockCommand::GetConsumable, vec![]).await
    }

    async fn get_dust_collection_mode(
        &self,
        device_id: &str,
    ) -> Result<DustCollectionMode, CommandError> {
        self.fetch(device_id, RoborockCommand::GetDustCollectionMode, vec![])
            .await
    }

    /// Mop washing intensity of a wash-and-fill dock
    async fn get_washing_mode(&self, device_id: &str) -> Result<WashingMode, CommandError> {
        self.fetch(device_id, RoborockCommand::GetWashTowelMode, vec![])
            .await
    }

    /// Mop wash parameters of a wash-and-fill dock
    async fn get_smart_wash_params(
        &self,
        device_id: &str,
    ) -> Result<SmartWashParameters, CommandError> {
        self.fetch(device_id, RoborockCommand::GetSmartWashParams, vec![])
            .await
    }

    async fn get_multi_maps_list(&self, device_id: &str) -> Result<MultiMapsList, CommandError> {
        self.fetch(device_id, RoborockCommand::GetMultiMapsList, vec![])
            .await
    }

    /// Ask for the current map; the map itself arrives as a push notification
    async fn get_map_v1(&self, device_id: &str) -> Result<Value, CommandError> {
        self.send_command(device_id, RoborockCommand::GetMapV1, vec![])
            .await
    }
}

impl<S: CommandSender + ?Sized> DeviceQueries for S {}
