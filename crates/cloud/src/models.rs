//! Login and home payloads

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a successful login
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserData {
    /// Bearer token for the account API
    pub token: String,

    /// Regional credentials for the signed home API
    pub rriot: Rriot,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// Regional credential bundle
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Rriot {
    #[serde(rename = "u")]
    pub user: String,

    #[serde(rename = "s")]
    pub password: String,

    /// HMAC secret
    #[serde(rename = "h")]
    pub hmac_key: String,

    #[serde(rename = "k", default)]
    pub mqtt_key: String,

    #[serde(rename = "r")]
    pub reference: RriotReference,
}

/// Regional service locations
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RriotReference {
    #[serde(rename = "r", default)]
    pub region: String,

    /// Base URL of the regional home API
    #[serde(rename = "a")]
    pub api: String,

    #[serde(rename = "m", default)]
    pub mqtt: String,

    #[serde(rename = "l", default)]
    pub l_unknown: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomeDataProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomeDataDevice {
    pub duid: String,
    pub name: String,
    pub local_key: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub fv: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub time_zone_id: Option<String>,
}

/// A home and the devices in it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomeData {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub products: Vec<HomeDataProduct>,
    #[serde(default)]
    pub devices: Vec<HomeDataDevice>,
    #[serde(default)]
    pub received_devices: Vec<HomeDataDevice>,
}

impl HomeData {
    /// Owned devices followed by devices shared with the account
    pub fn all_devices(&self) -> impl Iterator<Item = &HomeDataDevice> {
        self.devices.iter().chain(self.received_devices.iter())
    }

    /// Device id -> local key, ready to seed a device client
    pub fn local_keys(&self) -> HashMap<String, String> {
        self.all_devices()
            .map(|device| (device.duid.clone(), device.local_key.clone()))
            .collect()
    }

    pub fn device(&self, duid: &str) -> Option<&HomeDataDevice> {
        self.all_devices().find(|device| device.duid == duid)
    }
}
