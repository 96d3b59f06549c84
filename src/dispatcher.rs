use crate::common::{ThermostatSettings, ToggleKind};
use crate::connection::SharedChannel;
use crate::device_client::{post_command, CommandError, SharedApi};
use crate::status::StatusReconciler;
use crate::clock::parse_hhmm;
use log::info;

pub const SET_CONFIG_PATH: &str = "/set-config";
pub const REBOOT_PATH: &str = "/api/reboot";

/// Sends user intents to the device. Never predicts the resulting state.
pub struct CommandDispatcher {
    api: SharedApi,
    channel: SharedChannel,
}

impl CommandDispatcher {
    pub fn new(api: SharedApi, channel: SharedChannel) -> CommandDispatcher {
        CommandDispatcher { api, channel }
    }

    /// Socket first, legacy form endpoint when the socket is down and the
    /// device has one.
    /// Either way the outcome is observed through a status pull.
    pub async fn toggle(
        &self,
        kind: ToggleKind,
        status: &mut StatusReconciler,
    ) -> Result<(), CommandError> {
        let command = kind.socket_command();
        if self.channel.is_open() && self.channel.send(command).await {
            info!("sent {} over socket", command);
        } else {
            let path = kind.legacy_path().ok_or(CommandError::NotConnected(command))?;
            info!("socket not open, posting {}", path);
            post_command(self.api.as_ref(), path, &[]).await?;
        }
        status.refresh_from_pull().await;
        Ok(())
    }

    pub async fn apply_settings(
        &self,
        settings: &ThermostatSettings,
        status: &mut StatusReconciler,
    ) -> Result<(), CommandError> {
        let mut fields = Vec::new();
        for (name, value) in [
            ("target", settings.target_temp),
            ("hyst", settings.hysteresis),
            ("taskdelay", settings.task_delay),
        ] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(CommandError::Validation(format!("Invalid {} value", name)));
                }
                fields.push((name, v.to_string()));
            }
        }
        for (name, value) in [
            ("dzstart", &settings.deadzone_start),
            ("dzend", &settings.deadzone_end),
        ] {
            if let Some(v) = value {
                let time = parse_hhmm(v).ok_or_else(|| {
                    CommandError::Validation(format!("Invalid deadzone time {}", v))
                })?;
                fields.push((name, time.format("%H:%M").to_string()));
            }
        }

        info!("update config ({} fields)", fields.len());
        post_command(self.api.as_ref(), SET_CONFIG_PATH, &fields).await?;
        status.refresh_from_pull().await;
        Ok(())
    }

    pub async fn reboot(&self) -> Result<(), CommandError> {
        info!("reboot device");
        post_command(self.api.as_ref(), REBOOT_PATH, &[]).await.map(|_| ())
    }
}
