//! Wire-level JSON request/response shapes and the device status snapshot
//! they carry, per the `get_status` result shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outgoing request, `{"id", "method", "params"}`.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u32,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Request {
    pub fn new(id: u32, method: impl Into<String>, params: Value) -> Self {
        Request {
            id,
            method: method.into(),
            params,
        }
    }
}

/// An incoming response, `{"id", "code", "msg", "result"}`. `code == 0` is success.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: u32,
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub result: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOverallStatus {
    Ready,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Empty,
    Ready,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DryerStatus {
    Stop,
    Drying,
}

/// A single device-reported filament slot, as carried in a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub index: u8,
    pub status: SlotStatus,
    #[serde(default)]
    pub sku: String,
    #[serde(rename = "type", default)]
    pub material: String,
    #[serde(default)]
    pub color: [u8; 3],
    #[serde(default)]
    pub target_temp: i64,
}

impl Slot {
    pub fn empty(index: u8) -> Self {
        Slot {
            index,
            status: SlotStatus::Empty,
            sku: String::new(),
            material: String::new(),
            color: [0, 0, 0],
            target_temp: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dryer {
    pub status: DryerStatus,
    pub target_temp: i64,
    pub duration: i64,
    pub remain_time: i64,
}

impl Default for Dryer {
    fn default() -> Self {
        Dryer {
            status: DryerStatus::Stop,
            target_temp: 0,
            duration: 0,
            remain_time: 0,
        }
    }
}

/// Full device status snapshot, the `result` of a `get_status` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub status: DeviceOverallStatus,
    pub dryer: Dryer,
    pub temp: i64,
    pub fan_speed: i64,
    pub feed_assist_count: i64,
    pub cont_assist_time: f64,
    pub slots: [Slot; 4],
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus {
            status: DeviceOverallStatus::Ready,
            dryer: Dryer::default(),
            temp: 0,
            fan_speed: 7000,
            feed_assist_count: 0,
            cont_assist_time: 0.0,
            slots: [Slot::empty(0), Slot::empty(1), Slot::empty(2), Slot::empty(3)],
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
