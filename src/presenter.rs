use crate::calibration::CalibrationView;
use crate::kfactor::KFactorView;
use crate::ready_by::ReadyByView;
use crate::status::StatusView;
use log::{info, warn};
use std::sync::Arc;

/// Consumer of the view models computed by the sync core.
pub trait Presenter: Send + Sync {
    fn status(&self, _view: &StatusView) {}
    fn calibration(&self, _view: &CalibrationView) {}
    fn ready_by(&self, _view: &ReadyByView) {}
    fn kfactor(&self, _view: &KFactorView) {}
    fn logs(&self, _lines: &[String]) {}
    fn log_line(&self, _line: &str) {}
    /// Short user-facing message (errors, confirmations).
    fn notice(&self, _message: &str) {}
}

pub type SharedPresenter = Arc<dyn Presenter>;

/// Writes every view through the log facade.
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn status(&self, v: &StatusView) {
        info!(
            "status: {} °C, heater {} [{}], deadzone {} [{}], heater task {} [{}], time {}, wifi {}",
            v.temp,
            v.heater_state,
            v.heater_button.label,
            v.deadzone,
            v.deadzone_button.label,
            v.heater_task,
            v.heater_task_button.label,
            v.current_time,
            v.wifi_ssid
        );
        info!(
            "config: target {} hyst {} delay {} deadzone {}-{}",
            v.target_temp, v.hysteresis, v.task_delay, v.deadzone_start, v.deadzone_end
        );
    }

    fn calibration(&self, v: &CalibrationView) {
        info!(
            "calibration: {} k={} elapsed {} (start {}, cancel {})",
            v.state_text,
            v.current_k,
            v.elapsed,
            if v.controls.start_enabled { "enabled" } else { "disabled" },
            if v.controls.cancel_enabled { "enabled" } else { "disabled" }
        );
        info!(
            "calibration automation: {} {}-{} cap {}",
            if v.auto_enabled { "on" } else { "off" },
            v.auto_start,
            v.auto_end,
            v.auto_target_cap
        );
        for record in &v.records {
            info!("  {}", record);
        }
    }

    fn ready_by(&self, v: &ReadyByView) {
        info!(
            "ready-by: {}, warmup {}, start {}, target {} ({} °C), now {} °C, ambient {} °C",
            v.status_text,
            v.warmup,
            v.start,
            v.target,
            v.target_temp,
            v.current_temp,
            v.ambient_temp
        );
    }

    fn kfactor(&self, v: &KFactorView) {
        info!(
            "k-factor: current {} ideal {} s/°C",
            v.current_k, v.ideal_seconds_per_deg
        );
        if let Some(result) = &v.result {
            info!("k-factor: {}", result);
        }
    }

    fn logs(&self, lines: &[String]) {
        if lines.is_empty() {
            info!("device log: no log entries yet.");
        }
        for line in lines {
            info!("device log: {}", line);
        }
    }

    fn log_line(&self, line: &str) {
        info!("device log: {}", line);
    }

    fn notice(&self, message: &str) {
        warn!("{}", message);
    }
}
