use crate::clock_sync::ClockSync;
use crate::common::{lenient, merge_field};
use crate::device_client::{get_json, SharedApi};
use crate::format::format_opt_temp;
use crate::presenter::SharedPresenter;
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;

pub const STATUS_PATH: &str = "/api/status";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    pub temp: Option<f64>,
    pub heater_on: bool,
    pub deadzone_enabled: bool,
    pub in_deadzone: bool,
    pub heater_task_enabled: bool,
    pub wifi_ssid: String,
    pub current_time_label: String,
    pub time_synced: bool,
    pub target_temp: Option<f64>,
    pub hysteresis: Option<f64>,
    pub task_delay: Option<f64>,
    pub deadzone_start: Option<String>,
    pub deadzone_end: Option<String>,
}

/// Status fields as sent by the device, each one optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusPatch {
    #[serde(default, deserialize_with = "lenient")]
    pub temp: Option<f64>,
    #[serde(default, rename = "is_on", deserialize_with = "lenient")]
    pub heater_on: Option<bool>,
    #[serde(default, rename = "dz_enabled", deserialize_with = "lenient")]
    pub deadzone_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub in_deadzone: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub heater_task_enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub wifi_ssid: Option<String>,
    #[serde(default, rename = "current_time", deserialize_with = "lenient")]
    pub current_time_label: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub time_synced: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub target_temp: Option<f64>,
    #[serde(default, rename = "hyst", deserialize_with = "lenient")]
    pub hysteresis: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub task_delay: Option<f64>,
    #[serde(default, rename = "dz_start", deserialize_with = "lenient")]
    pub deadzone_start: Option<String>,
    #[serde(default, rename = "dz_end", deserialize_with = "lenient")]
    pub deadzone_end: Option<String>,
}

impl DeviceStatus {
    pub fn merge(&mut self, patch: &StatusPatch) {
        merge_field(&mut self.heater_on, &patch.heater_on);
        merge_field(&mut self.deadzone_enabled, &patch.deadzone_enabled);
        merge_field(&mut self.in_deadzone, &patch.in_deadzone);
        merge_field(&mut self.heater_task_enabled, &patch.heater_task_enabled);
        merge_field(&mut self.wifi_ssid, &patch.wifi_ssid);
        merge_field(&mut self.current_time_label, &patch.current_time_label);
        merge_field(&mut self.time_synced, &patch.time_synced);
        for (slot, observed) in [
            (&mut self.temp, patch.temp),
            (&mut self.target_temp, patch.target_temp),
            (&mut self.hysteresis, patch.hysteresis),
            (&mut self.task_delay, patch.task_delay),
        ] {
            if observed.is_some() {
                *slot = observed;
            }
        }
        if patch.deadzone_start.is_some() {
            self.deadzone_start = patch.deadzone_start.clone();
        }
        if patch.deadzone_end.is_some() {
            self.deadzone_end = patch.deadzone_end.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    On,
    Off,
}

impl ButtonStyle {
    pub fn class(self) -> &'static str {
        match self {
            ButtonStyle::On => "on",
            ButtonStyle::Off => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonView {
    pub label: &'static str,
    pub style: ButtonStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub temp: String,
    pub heater_state: &'static str,
    pub heater_button: ButtonView,
    pub deadzone: &'static str,
    pub deadzone_button: ButtonView,
    pub heater_task: &'static str,
    pub heater_task_button: ButtonView,
    pub current_time: String,
    pub wifi_ssid: String,
    pub time_synced: bool,
    pub target_temp: String,
    pub hysteresis: String,
    pub task_delay: String,
    pub deadzone_start: String,
    pub deadzone_end: String,
}

fn toggle_button(enabled: bool, when_on: &'static str, when_off: &'static str) -> ButtonView {
    if enabled {
        ButtonView {
            label: when_on,
            style: ButtonStyle::Off,
        }
    } else {
        ButtonView {
            label: when_off,
            style: ButtonStyle::On,
        }
    }
}

impl StatusView {
    pub fn of(status: &DeviceStatus) -> StatusView {
        StatusView {
            temp: format_opt_temp(status.temp),
            heater_state: if status.heater_on { "ON" } else { "OFF" },
            heater_button: toggle_button(status.heater_on, "Heater OFF", "Heater ON"),
            deadzone: match (status.deadzone_enabled, status.in_deadzone) {
                (true, true) => "Yes",
                (true, false) => "No",
                (false, _) => "Disabled",
            },
            deadzone_button: toggle_button(
                status.deadzone_enabled,
                "Disable Deadzone",
                "Enable Deadzone",
            ),
            heater_task: if status.heater_task_enabled {
                "Enabled"
            } else {
                "Disabled"
            },
            heater_task_button: toggle_button(
                status.heater_task_enabled,
                "Disable Heater Task",
                "Enable Heater Task",
            ),
            current_time: status.current_time_label.clone(),
            wifi_ssid: status.wifi_ssid.clone(),
            time_synced: status.time_synced,
            target_temp: format_opt_temp(status.target_temp),
            hysteresis: format_opt_temp(status.hysteresis),
            task_delay: format_opt_temp(status.task_delay),
            deadzone_start: status.deadzone_start.clone().unwrap_or_default(),
            deadzone_end: status.deadzone_end.clone().unwrap_or_default(),
        }
    }
}

pub struct StatusReconciler {
    api: SharedApi,
    clock_sync: Arc<ClockSync>,
    presenter: SharedPresenter,
    current: Option<DeviceStatus>,
}

impl StatusReconciler {
    pub fn new(api: SharedApi, clock_sync: Arc<ClockSync>, presenter: SharedPresenter) -> Self {
        StatusReconciler {
            api,
            clock_sync,
            presenter,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&DeviceStatus> {
        self.current.as_ref()
    }

    pub async fn refresh_from_pull(&mut self) {
        if self.pull().await && !self.time_synced() {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    pub async fn apply_push(&mut self, patch: &StatusPatch) {
        match self.current.as_mut() {
            Some(status) => {
                status.merge(patch);
                self.present();
            }
            // a partial frame is not a snapshot
            None if patch.time_synced != Some(false) => {
                debug!("status push before first pull");
                self.pull().await;
            }
            None => {}
        }

        if patch.time_synced == Some(false) {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    fn time_synced(&self) -> bool {
        self.current.as_ref().map_or(true, |s| s.time_synced)
    }

    /// Replaces the snapshot from the device. Never triggers a clock sync.
    pub async fn pull(&mut self) -> bool {
        match get_json::<StatusPatch>(self.api.as_ref(), STATUS_PATH).await {
            Ok(patch) => {
                let mut status = DeviceStatus::default();
                status.merge(&patch);
                self.current = Some(status);
                self.present();
                true
            }
            Err(e) => {
                warn!("load status failed ({:#})", e);
                false
            }
        }
    }

    fn present(&self) {
        if let Some(status) = &self.current {
            if !status.time_synced {
                debug!("device reports its clock as not synced");
            }
            self.presenter.status(&StatusView::of(status));
        }
    }
}
