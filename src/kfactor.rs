use crate::common::lenient;
use crate::device_client::{get_json, post_command, CommandError, SharedApi};
use crate::format::PLACEHOLDER;
use crate::presenter::SharedPresenter;
use log::{info, warn};
use serde::Deserialize;

pub const KFACTOR_STATUS_PATH: &str = "/api/kfactor/status";
pub const KFACTOR_SUGGEST_PATH: &str = "/api/kfactor/suggest";
pub const KFACTOR_APPLY_PATH: &str = "/api/kfactor/apply";

const LOAD_FAILED: &str = "Failed to load current kFactor";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KFactorStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub current_k: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ideal_seconds_per_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KFactorView {
    pub current_k: String,
    pub ideal_seconds_per_deg: String,
    /// Outcome of the last suggestion, or the last load error.
    pub result: Option<String>,
    pub result_ok: bool,
    /// Pre-filled value for the apply input.
    pub apply_input: Option<String>,
    pub status: Option<String>,
}

fn two_decimals(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Manual k-factor tuning: suggest from an observed warm-up, then apply.
pub struct KFactorPanel {
    api: SharedApi,
    presenter: SharedPresenter,
    status: KFactorStatus,
    result: Option<(String, bool)>,
    apply_input: Option<String>,
    save_status: Option<String>,
}

impl KFactorPanel {
    pub fn new(api: SharedApi, presenter: SharedPresenter) -> KFactorPanel {
        KFactorPanel {
            api,
            presenter,
            status: KFactorStatus::default(),
            result: None,
            apply_input: None,
            save_status: None,
        }
    }

    pub fn view(&self) -> KFactorView {
        KFactorView {
            current_k: two_decimals(self.status.current_k),
            ideal_seconds_per_deg: two_decimals(self.status.ideal_seconds_per_deg),
            result: self.result.as_ref().map(|(text, _)| text.clone()),
            result_ok: self.result.as_ref().map_or(true, |(_, ok)| *ok),
            apply_input: self.apply_input.clone(),
            status: self.save_status.clone(),
        }
    }

    fn present(&self) {
        self.presenter.kfactor(&self.view());
    }

    pub async fn refresh(&mut self) {
        match get_json::<KFactorStatus>(self.api.as_ref(), KFACTOR_STATUS_PATH).await {
            Ok(status) => {
                self.status = status;
                if matches!(&self.result, Some((text, false)) if text == LOAD_FAILED) {
                    self.result = None;
                }
            }
            Err(e) => {
                warn!("load kfactor failed ({:#})", e);
                self.result = Some((LOAD_FAILED.to_string(), false));
            }
        }
        self.present();
    }

    /// Asks the device for a k-factor matching an observed warm-up.
    pub async fn suggest(
        &mut self,
        ambient: f64,
        target: f64,
        warmup_min: f64,
    ) -> Result<f64, CommandError> {
        if !(ambient.is_finite() && target.is_finite() && warmup_min.is_finite()) {
            let err = CommandError::Validation("Please fill all numbers".to_string());
            self.result = Some((err.to_string(), false));
            self.present();
            return Err(err);
        }

        let fields = [
            ("ambient", ambient.to_string()),
            ("target", target.to_string()),
            ("warmup_min", warmup_min.to_string()),
        ];
        let outcome = post_command(self.api.as_ref(), KFACTOR_SUGGEST_PATH, &fields)
            .await
            .and_then(|reply| {
                let k = reply.field::<f64>("suggested_k").ok_or_else(|| {
                    CommandError::Rejected("Suggestion failed".to_string())
                })?;
                let seconds = reply.field::<f64>("warmup_seconds").unwrap_or(warmup_min * 60.0);
                let delta = reply.field::<f64>("delta_t_c").unwrap_or(target - ambient);
                Ok((k, seconds, delta))
            });

        match outcome {
            Ok((k, seconds, delta)) => {
                let text = format!(
                    "Suggested kFactor: {:.2} (observed {:.0}s over Δ{:.1}°C)",
                    k, seconds, delta
                );
                info!("{}", text);
                self.result = Some((text, true));
                self.apply_input = Some(format!("{:.2}", k));
                self.present();
                Ok(k)
            }
            Err(e) => {
                self.result = Some((e.to_string(), false));
                self.present();
                Err(e)
            }
        }
    }

    pub async fn apply(&mut self, k: f64) -> Result<(), CommandError> {
        if !k.is_finite() || k <= 0.0 {
            let err = CommandError::Validation("Enter a valid kFactor first.".to_string());
            self.save_status = Some(err.to_string());
            self.present();
            return Err(err);
        }

        info!("apply kfactor {:.2}", k);
        match post_command(self.api.as_ref(), KFACTOR_APPLY_PATH, &[("k", k.to_string())]).await {
            Ok(_) => {
                self.save_status = Some(format!("Saved kFactor = {:.2}", k));
                self.refresh().await;
                Ok(())
            }
            Err(e) => {
                self.save_status = Some(e.to_string());
                self.present();
                Err(e)
            }
        }
    }
}
