//! Typed device results
//!
//! Replies arrive as loosely-typed JSON. Each container here is parsed
//! fallibly: a missing required field or an unknown mode code is a
//! `ParseError`, never a silently defaulted value.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{container}: expected {expected}, found {found}")]
    UnexpectedShape {
        container: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{container}: {reason}")]
    Invalid {
        container: &'static str,
        reason: String,
    },

    #[error("{container}: missing field `{field}`")]
    MissingField {
        container: &'static str,
        field: &'static str,
    },

    #[error("Unknown {kind} code: {code}")]
    UnknownCode { kind: &'static str, code: i64 },
}

/// A result type that can be built from a device reply
pub trait DeviceResult: Sized {
    /// Name used in errors and logs
    const NAME: &'static str;

    /// Parse the (already unwrapped) `result` value of a reply
    fn from_value(value: Value) -> Result<Self, ParseError>;
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_object<T: DeserializeOwned>(container: &'static str, value: Value) -> Result<T, ParseError> {
    if !value.is_object() {
        return Err(ParseError::UnexpectedShape {
            container,
            expected: "object",
            found: kind_of(&value),
        });
    }
    serde_json::from_value(value).map_err(|e| ParseError::Invalid {
        container,
        reason: e.to_string(),
    })
}

fn required_code(container: &'static str, value: &Value, field: &'static str) -> Result<i64, ParseError> {
    let Some(object) = value.as_object() else {
        return Err(ParseError::UnexpectedShape {
            container,
            expected: "object",
            found: kind_of(value),
        });
    };
    let raw = object
        .get(field)
        .ok_or(ParseError::MissingField { container, field })?;
    raw.as_i64().ok_or_else(|| ParseError::Invalid {
        container,
        reason: format!("`{field}` is not an integer"),
    })
}

// -- Code mappings --

/// Kind of dock attached to the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "i64")]
pub enum DockType {
    NoDock,
    AutoEmptyDock,
    EmptyWashFillDock,
    AutoEmptyDockPure,
    Unknown(i64),
}

impl From<i64> for DockType {
    fn from(code: i64) -> Self {
        match code {
            0 => DockType::NoDock,
            1 => DockType::AutoEmptyDock,
            3 => DockType::EmptyWashFillDock,
            5 => DockType::AutoEmptyDockPure,
            other => DockType::Unknown(other),
        }
    }
}

impl DockType {
    /// True when some dock is present
    pub fn has_dock(&self) -> bool {
        !matches!(self, DockType::NoDock)
    }

    /// True for docks that also wash mops
    pub fn washes_mops(&self) -> bool {
        matches!(self, DockType::EmptyWashFillDock)
    }
}

/// Dock dust-collection strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DustCollectionMode {
    Smart,
    Light,
    Balanced,
    Max,
}

impl DustCollectionMode {
    pub fn from_code(code: i64) -> Result<Self, ParseError> {
        match code {
            0 => Ok(DustCollectionMode::Smart),
            1 => Ok(DustCollectionMode::Light),
            2 => Ok(DustCollectionMode::Balanced),
            4 => Ok(DustCollectionMode::Max),
            code => Err(ParseError::UnknownCode {
                kind: "dust collection mode",
                code,
            }),
        }
    }
}

impl DeviceResult for DustCollectionMode {
    const NAME: &'static str = "DustCollectionMode";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        Self::from_code(required_code(Self::NAME, &value, "mode")?)
    }
}

/// Dock mop washing intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WashingMode {
    Light,
    Balanced,
    Deep,
}

impl WashingMode {
    pub fn from_code(code: i64) -> Result<Self, ParseError> {
        match code {
            0 => Ok(WashingMode::Light),
            1 => Ok(WashingMode::Balanced),
            2 => Ok(WashingMode::Deep),
            code => Err(ParseError::UnknownCode {
                kind: "washing mode",
                code,
            }),
        }
    }
}

impl DeviceResult for WashingMode {
    const NAME: &'static str = "WashingMode";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        Self::from_code(required_code(Self::NAME, &value, "wash_mode")?)
    }
}

// -- Containers --

/// Robot status
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    pub state: i64,
    pub battery: i64,
    pub dock_type: DockType,
    pub msg_ver: Option<i64>,
    pub msg_seq: Option<i64>,
    pub clean_time: Option<u64>,
    pub clean_area: Option<u64>,
    pub error_code: Option<i64>,
    pub map_present: Option<i64>,
    pub in_cleaning: Option<i64>,
    pub in_returning: Option<i64>,
    pub in_fresh_state: Option<i64>,
    pub lab_status: Option<i64>,
    pub water_box_status: Option<i64>,
    pub fan_power: Option<i64>,
    pub dnd_enabled: Option<i64>,
    pub map_status: Option<i64>,
    pub lock_status: Option<i64>,
    pub water_box_mode: Option<i64>,
    pub water_box_carriage_status: Option<i64>,
    pub mop_forbidden_enable: Option<i64>,
    pub water_shortage_status: Option<i64>,
    pub dust_collection_status: Option<i64>,
    pub auto_dust_collection: Option<i64>,
    pub mop_mode: Option<i64>,
    pub dock_error_status: Option<i64>,
    pub charge_status: Option<i64>,
}

impl DeviceResult for Status {
    const NAME: &'static str = "Status";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

/// Do-not-disturb window
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DndTimer {
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    pub enabled: u8,
}

impl DndTimer {
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

impl DeviceResult for DndTimer {
    const NAME: &'static str = "DndTimer";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

/// Lifetime cleaning totals and recent record ids (newest first)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanSummary {
    pub clean_time: u64,
    pub clean_area: u64,
    pub clean_count: u64,
    pub dust_collection_count: Option<u64>,
    #[serde(default)]
    pub records: Vec<u64>,
}

impl CleanSummary {
    /// Most recent record id, if any
    pub fn latest_record(&self) -> Option<u64> {
        self.records.first().copied()
    }
}

impl DeviceResult for CleanSummary {
    const NAME: &'static str = "CleanSummary";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        match value {
            // Older firmware: [clean_time, clean_area, clean_count, [records...]]
            Value::Array(items) => {
                let mut items = items.into_iter();
                let mut number = |field: &'static str| -> Result<u64, ParseError> {
                    items
                        .next()
                        .ok_or(ParseError::MissingField {
                            container: Self::NAME,
                            field,
                        })?
                        .as_u64()
                        .ok_or_else(|| ParseError::Invalid {
                            container: Self::NAME,
                            reason: format!("`{field}` is not an unsigned integer"),
                        })
                };
                let clean_time = number("clean_time")?;
                let clean_area = number("clean_area")?;
                let clean_count = number("clean_count")?;
                let records = match items.next() {
                    Some(records) => serde_json::from_value(records).map_err(|e| ParseError::Invalid {
                        container: Self::NAME,
                        reason: e.to_string(),
                    })?,
                    None => Vec::new(),
                };
                Ok(Self {
                    clean_time,
                    clean_area,
                    clean_count,
                    dust_collection_count: None,
                    records,
                })
            }
            other => parse_object(Self::NAME, other),
        }
    }
}

/// One past cleaning run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanRecord {
    pub begin: u64,
    pub end: u64,
    pub duration: u64,
    pub area: u64,
    pub error: Option<i64>,
    pub complete: Option<i64>,
    pub start_type: Option<i64>,
    pub clean_type: Option<i64>,
    pub finish_reason: Option<i64>,
    pub dust_collection_status: Option<i64>,
    pub avoid_count: Option<i64>,
    pub wash_count: Option<i64>,
    pub map_flag: Option<i64>,
}

impl DeviceResult for CleanRecord {
    const NAME: &'static str = "CleanRecord";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

/// Consumable wear counters, in seconds of use
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Consumable {
    pub main_brush_work_time: u64,
    pub side_brush_work_time: u64,
    pub filter_work_time: u64,
    pub filter_element_work_time: Option<u64>,
    pub sensor_dirty_time: Option<u64>,
    pub strainer_work_times: Option<u64>,
    pub dust_collection_work_times: Option<u64>,
    pub cleaning_brush_work_times: Option<u64>,
}

impl DeviceResult for Consumable {
    const NAME: &'static str = "Consumable";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

/// Dock mop-wash schedule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmartWashParameters {
    pub smart_wash: i64,
    pub wash_interval: u64,
}

impl DeviceResult for SmartWashParameters {
    const NAME: &'static str = "SmartWashParameters";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

/// One stored floor map
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MultiMapInfo {
    #[serde(rename = "mapFlag")]
    pub map_flag: i64,
    pub add_time: Option<u64>,
    pub length: Option<u64>,
    pub name: Option<String>,
    #[serde(default)]
    pub bak_maps: Vec<Value>,
}

/// Stored floor maps
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MultiMapsList {
    pub max_multi_map: u32,
    pub max_bak_map: Option<u32>,
    pub multi_map_count: u32,
    #[serde(default)]
    pub map_info: Vec<MultiMapInfo>,
}

impl DeviceResult for MultiMapsList {
    const NAME: &'static str = "MultiMapsList";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        parse_object(Self::NAME, value)
    }
}

impl DeviceResult for Value {
    const NAME: &'static str = "Value";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        Ok(value)
    }
}
