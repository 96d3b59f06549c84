use crate::push::PushMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Heater,
    Deadzone,
    HeaterTask,
}

impl ToggleKind {
    /// Bare command understood by the device socket.
    pub fn socket_command(self) -> &'static str {
        match self {
            ToggleKind::Heater => "toggle_heater",
            ToggleKind::Deadzone => "toggle_deadzone",
            ToggleKind::HeaterTask => "toggle_heater_task",
        }
    }

    /// Form endpoint used when the socket is down. Only the heater has one.
    pub fn legacy_path(self) -> Option<&'static str> {
        match self {
            ToggleKind::Heater => Some("/toggle"),
            ToggleKind::Deadzone | ToggleKind::HeaterTask => None,
        }
    }
}

pub const REQUEST_STATUS_COMMAND: &str = "request_status";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermostatSettings {
    pub target_temp: Option<f64>,
    pub hysteresis: Option<f64>,
    pub task_delay: Option<f64>,
    pub deadzone_start: Option<String>, // HH:MM
    pub deadzone_end: Option<String>,   // HH:MM
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub start: Option<String>, // HH:MM local
    pub end: Option<String>,   // HH:MM local
    pub target_cap_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Toggle(ToggleKind),
    SyncTime,
    Refresh,
    ApplySettings(ThermostatSettings),
    Reboot,
    CalibrationStart {
        target_temp_c: f64,
        start_epoch_utc: Option<i64>,
    },
    CalibrationStartAt {
        target_temp_c: f64,
        date: String,
        time: String,
    },
    CalibrationCancel,
    CalibrationDelete {
        epoch_utc: Option<i64>,
        confirmed: bool,
    },
    CalibrationAutomation(AutomationSettings),
    ReadyBySchedule {
        date: String,
        time: String,
        target_temp_c: f64,
    },
    ReadyByClear,
    KFactorSuggest {
        ambient: f64,
        target: f64,
        warmup_min: f64,
    },
    KFactorApply(f64),
    LogsClear,
}

#[derive(Debug)]
pub enum Task {
    Push(PushMessage),
    User(UserCommand),
    Shutdown,
}

/// Deserializes a field that the device may send with the wrong type.
/// Anything that does not fit `T` (including `null`) is treated as absent.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// List counterpart of `lenient`: elements that do not fit `T` are dropped,
/// the rest are kept in order. A non-array is treated as absent.
pub fn lenient_items<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

/// Replaces `slot` only when the observed value is present.
pub fn merge_field<T: Clone>(slot: &mut T, observed: &Option<T>) {
    if let Some(v) = observed {
        *slot = v.clone();
    }
}
