use crate::clock::{local_date_time, local_to_epoch, parse_date, parse_hhmm, tomorrow, Clock};
use crate::clock_sync::ClockSync;
use crate::common::{lenient, merge_field};
use crate::device_client::{get_json, post_command, CommandError, SharedApi};
use crate::format::{format_opt_temp, format_warmup, PLACEHOLDER};
use crate::presenter::SharedPresenter;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

pub const READY_BY_PATH: &str = "/api/ready-by";
pub const READY_BY_CLEAR_PATH: &str = "/api/ready-by/clear";

const DEFAULT_TIME: &str = "07:30";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadyBySchedule {
    pub scheduled: bool,
    pub warmup_seconds: Option<f64>,
    pub start_epoch_utc: Option<i64>,
    pub target_epoch_utc: Option<i64>,
    pub target_temp_c: Option<f64>,
    pub current_temp_c: Option<f64>,
    pub ambient_temp_c: Option<f64>,
    /// Device clock at the time of the snapshot.
    pub now_epoch_utc: Option<i64>,
    pub time_synced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadyByPatch {
    #[serde(default, deserialize_with = "lenient")]
    pub scheduled: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub warmup_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub start_epoch_utc: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub target_epoch_utc: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub target_temp_c: Option<f64>,
    #[serde(default, rename = "current_temp", deserialize_with = "lenient")]
    pub current_temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ambient_temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub now_epoch_utc: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub time_synced: Option<bool>,
}

impl ReadyBySchedule {
    pub fn merge(&mut self, patch: &ReadyByPatch) {
        merge_field(&mut self.scheduled, &patch.scheduled);
        merge_field(&mut self.time_synced, &patch.time_synced);
        for (slot, observed) in [
            (&mut self.warmup_seconds, patch.warmup_seconds),
            (&mut self.target_temp_c, patch.target_temp_c),
            (&mut self.current_temp_c, patch.current_temp_c),
            (&mut self.ambient_temp_c, patch.ambient_temp_c),
        ] {
            if observed.is_some() {
                *slot = observed;
            }
        }
        for (slot, observed) in [
            (&mut self.start_epoch_utc, patch.start_epoch_utc),
            (&mut self.target_epoch_utc, patch.target_epoch_utc),
            (&mut self.now_epoch_utc, patch.now_epoch_utc),
        ] {
            if observed.is_some() {
                *slot = observed;
            }
        }
    }
}

/// Editable form values.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyByInputs {
    pub date: String,
    pub time: String,
    pub target_temp_c: Option<f64>,
}

impl ReadyByInputs {
    pub fn defaults(clock: &dyn Clock) -> ReadyByInputs {
        ReadyByInputs {
            date: tomorrow(clock),
            time: DEFAULT_TIME.to_string(),
            target_temp_c: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyByView {
    pub scheduled: bool,
    pub status_text: &'static str,
    pub warmup: String,
    pub start: String,
    pub target: String,
    pub target_temp: String,
    pub current_temp: String,
    pub ambient_temp: String,
    pub form_visible: bool,
    pub inputs: ReadyByInputs,
}

fn local_text(clock: &dyn Clock, epoch: Option<i64>) -> Option<String> {
    epoch
        .and_then(|e| local_date_time(clock, e))
        .map(|(d, t)| format!("{} {}", d, t))
}

impl ReadyByView {
    pub fn of(clock: &dyn Clock, schedule: &ReadyBySchedule, inputs: &ReadyByInputs) -> ReadyByView {
        let input_target = if inputs.date.is_empty() || inputs.time.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            format!("{} {}", inputs.date, inputs.time)
        };

        if !schedule.scheduled {
            return ReadyByView {
                scheduled: false,
                status_text: "Not scheduled",
                warmup: PLACEHOLDER.to_string(),
                start: PLACEHOLDER.to_string(),
                target: input_target,
                target_temp: format_opt_temp(inputs.target_temp_c),
                current_temp: format_opt_temp(schedule.current_temp_c),
                ambient_temp: format_opt_temp(schedule.ambient_temp_c),
                form_visible: true,
                inputs: inputs.clone(),
            };
        }

        ReadyByView {
            scheduled: true,
            status_text: "Scheduled",
            warmup: format_warmup(schedule.warmup_seconds.unwrap_or(0.0)),
            start: local_text(clock, schedule.start_epoch_utc)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            target: local_text(clock, schedule.target_epoch_utc).unwrap_or(input_target),
            target_temp: format_opt_temp(schedule.target_temp_c),
            current_temp: format_opt_temp(schedule.current_temp_c),
            ambient_temp: format_opt_temp(schedule.ambient_temp_c),
            form_visible: false,
            inputs: inputs.clone(),
        }
    }
}

pub struct ReadyByScheduler {
    api: SharedApi,
    clock_sync: Arc<ClockSync>,
    presenter: SharedPresenter,
    schedule: Option<ReadyBySchedule>,
    inputs: ReadyByInputs,
}

impl ReadyByScheduler {
    pub fn new(api: SharedApi, clock_sync: Arc<ClockSync>, presenter: SharedPresenter) -> Self {
        let inputs = ReadyByInputs::defaults(clock_sync.clock());
        ReadyByScheduler {
            api,
            clock_sync,
            presenter,
            schedule: None,
            inputs,
        }
    }

    pub fn schedule_state(&self) -> Option<&ReadyBySchedule> {
        self.schedule.as_ref()
    }

    pub fn inputs(&self) -> &ReadyByInputs {
        &self.inputs
    }

    pub async fn refresh_from_pull(&mut self) {
        if let Some(false) = self.pull().await {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    pub async fn apply_push(&mut self, patch: &ReadyByPatch) {
        self.schedule
            .get_or_insert_with(ReadyBySchedule::default)
            .merge(patch);
        self.observed();

        if patch.time_synced == Some(false) {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    async fn pull(&mut self) -> Option<bool> {
        match get_json::<ReadyByPatch>(self.api.as_ref(), READY_BY_PATH).await {
            Ok(patch) => {
                let mut schedule = ReadyBySchedule::default();
                schedule.merge(&patch);
                self.schedule = Some(schedule);
                self.observed();
                Some(patch.time_synced.unwrap_or(true))
            }
            Err(e) => {
                warn!("load ready-by failed ({:#})", e);
                None
            }
        }
    }

    /// Re-populates the inputs from an active schedule, then presents.
    fn observed(&mut self) {
        if let Some(schedule) = &self.schedule {
            if schedule.scheduled {
                let clock = self.clock_sync.clock();
                if let Some((date, time)) = schedule
                    .target_epoch_utc
                    .and_then(|e| local_date_time(clock, e))
                {
                    self.inputs.date = date;
                    self.inputs.time = time;
                }
                if schedule.target_temp_c.is_some() {
                    self.inputs.target_temp_c = schedule.target_temp_c;
                }
            }
        }
        self.present();
    }

    fn present(&self) {
        let idle = ReadyBySchedule::default();
        let schedule = self.schedule.as_ref().unwrap_or(&idle);
        self.presenter.ready_by(&ReadyByView::of(
            self.clock_sync.clock(),
            schedule,
            &self.inputs,
        ));
    }

    pub async fn schedule(
        &mut self,
        date: &str,
        time: &str,
        target_temp_c: f64,
    ) -> Result<(), CommandError> {
        let missing = || {
            CommandError::Validation("Please fill date, time and target temperature".to_string())
        };
        if parse_date(date).is_none() || parse_hhmm(time).is_none() || !target_temp_c.is_finite() {
            return Err(missing());
        }
        let epoch = local_to_epoch(self.clock_sync.clock(), date, time).ok_or_else(missing)?;

        self.inputs = ReadyByInputs {
            date: date.trim().to_string(),
            time: time.trim().to_string(),
            target_temp_c: Some(target_temp_c),
        };
        info!(
            "schedule ready-by {} {} ({}), {} °C",
            date, time, epoch, target_temp_c
        );
        post_command(
            self.api.as_ref(),
            READY_BY_PATH,
            &[
                ("target_epoch_utc", epoch.to_string()),
                ("target_temp_c", target_temp_c.to_string()),
            ],
        )
        .await?;
        self.refresh_from_pull().await;
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<(), CommandError> {
        info!("clear ready-by");
        post_command(self.api.as_ref(), READY_BY_CLEAR_PATH, &[]).await?;

        let current_temp_c = self.schedule.as_ref().and_then(|s| s.current_temp_c);
        let time_synced = self.schedule.as_ref().map_or(true, |s| s.time_synced);
        self.schedule = Some(ReadyBySchedule {
            current_temp_c,
            time_synced,
            ..ReadyBySchedule::default()
        });
        self.inputs = ReadyByInputs::defaults(self.clock_sync.clock());
        self.present();
        Ok(())
    }
}
