//! Typed views over inbound payloads.

use super::messages::{InboundMessage, Payload, Scalar, ServerMessageType};
use crate::core::{LinkError, LinkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DoorState {
    #[default]
    Unknown,
    Open,
    Closing,
    Closed,
    Opening,
}

impl DoorState {
    pub fn parse(value: &str) -> Self {
        match value {
            "OPEN" => DoorState::Open,
            "CLOSING" => DoorState::Closing,
            "CLOSED" => DoorState::Closed,
            "OPENING" => DoorState::Opening,
            _ => DoorState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MqttClientState {
    #[default]
    Disabled,
    Error,
    Connecting,
    Connected,
    Disconnected,
}

impl MqttClientState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DISABLED" => Some(MqttClientState::Disabled),
            "ERROR" => Some(MqttClientState::Error),
            "CONNECTING" => Some(MqttClientState::Connecting),
            "CONNECTED" => Some(MqttClientState::Connected),
            "DISCONNECTED" => Some(MqttClientState::Disconnected),
            _ => None,
        }
    }
}

/// Door and MQTT status pushed whenever either changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusChange {
    pub door_state: DoorState,
    pub mqtt_state: Option<MqttClientState>,
    pub mqtt_error: Option<String>,
}

/// Full device configuration snapshot. Missing keys stay at their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    pub firmware_version: Option<String>,
    pub mdns_name: Option<String>,
    pub device_name: Option<String>,
    pub wifi_ssid: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub mqtt_enabled: bool,
    pub mqtt_broker_address: Option<String>,
    pub mqtt_broker_port: Option<u16>,
    pub mqtt_device_id: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_topic: Option<String>,
    pub mqtt_state_topic: Option<String>,
    pub top_ir_sensor_threshold: Option<i64>,
    pub bottom_ir_sensor_threshold: Option<i64>,
}

/// Raw IR sensor readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorData {
    pub top_detected: bool,
    pub top_ambient: i64,
    pub top_active: i64,
    pub bottom_detected: bool,
    pub bottom_ambient: i64,
    pub bottom_active: i64,
    pub available_memory: i64,
}

/// Strongly typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Status(StatusChange),
    Config(Box<DeviceConfig>),
    Sensors(SensorData),
    Rebooting,
}

impl DeviceEvent {
    pub fn from_message(message: &InboundMessage) -> LinkResult<Self> {
        let p = &message.payload;
        let event = match message.kind {
            ServerMessageType::StatusChange => {
                let door = text(p, "door_state").ok_or_else(|| missing("door_state"))?;
                DeviceEvent::Status(StatusChange {
                    door_state: DoorState::parse(door),
                    mqtt_state: text(p, "mqtt_state").and_then(MqttClientState::parse),
                    mqtt_error: text(p, "mqtt_error")
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                })
            }
            ServerMessageType::ConfigChange => DeviceEvent::Config(Box::new(DeviceConfig {
                firmware_version: owned(p, "firmware_version"),
                mdns_name: owned(p, "mdns_name"),
                device_name: owned(p, "device_name"),
                wifi_ssid: owned(p, "wifi_ssid"),
                ip_address: owned(p, "ip_address"),
                mac_address: owned(p, "mac_address"),
                mqtt_enabled: flag(p, "mqtt_enabled"),
                mqtt_broker_address: owned(p, "mqtt_broker_address"),
                mqtt_broker_port: int(p, "mqtt_broker_port").and_then(|n| u16::try_from(n).ok()),
                mqtt_device_id: owned(p, "mqtt_device_id"),
                mqtt_username: owned(p, "mqtt_username"),
                mqtt_topic: owned(p, "mqtt_topic"),
                mqtt_state_topic: owned(p, "mqtt_state_topic"),
                top_ir_sensor_threshold: int(p, "top_ir_sensor_threshold"),
                bottom_ir_sensor_threshold: int(p, "bottom_ir_sensor_threshold"),
            })),
            ServerMessageType::SensorData => DeviceEvent::Sensors(SensorData {
                top_detected: flag(p, "top_detected"),
                top_ambient: int(p, "top_ambient").unwrap_or_default(),
                top_active: int(p, "top_active").unwrap_or_default(),
                bottom_detected: flag(p, "bottom_detected"),
                bottom_ambient: int(p, "bottom_ambient").unwrap_or_default(),
                bottom_active: int(p, "bottom_active").unwrap_or_default(),
                available_memory: int(p, "available_memory").unwrap_or_default(),
            }),
            ServerMessageType::Rebooting => DeviceEvent::Rebooting,
        };
        Ok(event)
    }
}

fn missing(key: &str) -> LinkError {
    LinkError::MalformedFrame(format!("payload is missing `{key}`"))
}

fn text<'a>(p: &'a Payload, key: &str) -> Option<&'a str> {
    p.get(key).and_then(Scalar::as_str)
}

fn owned(p: &Payload, key: &str) -> Option<String> {
    text(p, key).map(str::to_string)
}

fn int(p: &Payload, key: &str) -> Option<i64> {
    p.get(key).and_then(Scalar::as_i64)
}

// The firmware sends booleans either as JSON bools or as 0/1.
fn flag(p: &Payload, key: &str) -> bool {
    match p.get(key) {
        Some(Scalar::Bool(b)) => *b,
        Some(other) => other.as_i64().is_some_and(|n| n != 0),
        None => false,
    }
}
