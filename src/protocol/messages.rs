use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar payload value. Payloads are flat; nested objects and arrays are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<u16> for Scalar {
    fn from(value: u16) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Message payload: string keys to scalar values.
pub type Payload = BTreeMap<String, Scalar>;

/// Message types the panel sends to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMessageType {
    ButtonPress,
    Reboot,
    ForgetWifi,
    ResetToFactoryDefaults,
    SetSensorThreshold,
}

impl ClientMessageType {
    pub const ALL: [ClientMessageType; 5] = [
        ClientMessageType::ButtonPress,
        ClientMessageType::Reboot,
        ClientMessageType::ForgetWifi,
        ClientMessageType::ResetToFactoryDefaults,
        ClientMessageType::SetSensorThreshold,
    ];

    /// Wire code; must match the firmware.
    pub fn code(self) -> &'static str {
        match self {
            ClientMessageType::ButtonPress => "BP",
            ClientMessageType::Reboot => "RS",
            ClientMessageType::ForgetWifi => "FW",
            ClientMessageType::ResetToFactoryDefaults => "RD",
            ClientMessageType::SetSensorThreshold => "ST",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for ClientMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Message types the device sends to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerMessageType {
    StatusChange,
    ConfigChange,
    SensorData,
    Rebooting,
}

impl ServerMessageType {
    pub const ALL: [ServerMessageType; 4] = [
        ServerMessageType::StatusChange,
        ServerMessageType::ConfigChange,
        ServerMessageType::SensorData,
        ServerMessageType::Rebooting,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ServerMessageType::StatusChange => "SC",
            ServerMessageType::ConfigChange => "CC",
            ServerMessageType::SensorData => "SD",
            ServerMessageType::Rebooting => "RB",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for ServerMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Virtual buttons the device can be asked to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualButton {
    Activate,
    Open,
    Close,
}

impl VirtualButton {
    pub fn as_str(self) -> &'static str {
        match self {
            VirtualButton::Activate => "ACTIVATE",
            VirtualButton::Open => "OPEN",
            VirtualButton::Close => "CLOSE",
        }
    }
}

/// Which IR sensor a threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorPosition {
    Top,
    Bottom,
}

impl SensorPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorPosition::Top => "TOP",
            SensorPosition::Bottom => "BOTTOM",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub kind: ClientMessageType,
    pub payload: Payload,
}

impl OutboundMessage {
    pub fn new(kind: ClientMessageType, payload: Payload) -> Self {
        Self { kind, payload }
    }

    pub fn empty(kind: ClientMessageType) -> Self {
        Self::new(kind, Payload::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn button_press(button: VirtualButton) -> Self {
        Self::empty(ClientMessageType::ButtonPress).with("b", button.as_str())
    }

    pub fn reboot() -> Self {
        Self::empty(ClientMessageType::Reboot)
    }

    pub fn forget_wifi() -> Self {
        Self::empty(ClientMessageType::ForgetWifi)
    }

    pub fn reset_to_factory_defaults() -> Self {
        Self::empty(ClientMessageType::ResetToFactoryDefaults)
    }

    pub fn set_sensor_threshold(sensor: SensorPosition, threshold: i64) -> Self {
        Self::empty(ClientMessageType::SetSensorThreshold)
            .with("s", sensor.as_str())
            .with("t", threshold)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: ServerMessageType,
    pub payload: Payload,
}

impl InboundMessage {
    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.payload.get(key)
    }
}
