use crate::clock::{format_minute_of_day, local_label, local_to_epoch, minute_of_day};
use crate::clock_sync::ClockSync;
use crate::common::{lenient, lenient_items, merge_field, AutomationSettings};
use crate::device_client::{get_json, post_command, CommandError, CommandReply, SharedApi};
use crate::format::{format_opt_temp, format_seconds, format_temp, PLACEHOLDER};
use crate::presenter::SharedPresenter;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

pub const CALIBRATION_PATH: &str = "/api/calibration";
pub const CALIBRATION_START_PATH: &str = "/api/calibration/start";
pub const CALIBRATION_CANCEL_PATH: &str = "/api/calibration/cancel";
pub const CALIBRATION_DELETE_PATH: &str = "/api/calibration/delete";
pub const CALIBRATION_SETTINGS_PATH: &str = "/api/calibration/settings";

const MINUTES_PER_DAY: u16 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationState {
    Idle,
    Scheduled,
    Running,
    Cancelled,
    Completed,
}

impl Default for CalibrationState {
    fn default() -> Self {
        CalibrationState::Idle
    }
}

impl CalibrationState {
    pub fn is_active(self) -> bool {
        matches!(self, CalibrationState::Scheduled | CalibrationState::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            CalibrationState::Idle => "Idle",
            CalibrationState::Scheduled => "Scheduled",
            CalibrationState::Running => "Running",
            CalibrationState::Cancelled => "Cancelled",
            CalibrationState::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationRecord {
    #[serde(deserialize_with = "lenient")]
    pub epoch_utc: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub k: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub ambient_c: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub target_c: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub warmup_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSession {
    pub state: CalibrationState,
    pub current_k: f64,
    pub ambient_start_c: Option<f64>,
    pub target_temp_c: Option<f64>,
    pub elapsed_seconds: f64,
    pub time_synced: bool,
    /// Device order, never re-sorted.
    pub records: Vec<CalibrationRecord>,
    pub auto_enabled: bool,
    pub auto_start_minute_of_day: u16,
    pub auto_end_minute_of_day: u16,
    pub auto_target_cap_c: f64,
    pub start_epoch_utc: Option<i64>,
    pub current_temp_c: Option<f64>,
    pub suggested_k: Option<f64>,
}

/// Calibration snapshot as sent by the device, every field optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CalibrationPatch {
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<CalibrationState>,
    #[serde(default, deserialize_with = "lenient")]
    pub current_k: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ambient_start_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub target_temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub time_synced: Option<bool>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub records: Option<Vec<CalibrationRecord>>,
    #[serde(default, deserialize_with = "lenient")]
    pub auto_enabled: Option<bool>,
    #[serde(default, rename = "auto_start_min", deserialize_with = "lenient")]
    pub auto_start_minute_of_day: Option<u16>,
    #[serde(default, rename = "auto_end_min", deserialize_with = "lenient")]
    pub auto_end_minute_of_day: Option<u16>,
    #[serde(default, deserialize_with = "lenient")]
    pub auto_target_cap_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub start_epoch_utc: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub current_temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub suggested_k: Option<f64>,
}

impl CalibrationSession {
    pub fn merge(&mut self, patch: &CalibrationPatch) {
        merge_field(&mut self.state, &patch.state);
        merge_field(&mut self.current_k, &patch.current_k);
        merge_field(&mut self.elapsed_seconds, &patch.elapsed_seconds);
        merge_field(&mut self.time_synced, &patch.time_synced);
        merge_field(&mut self.records, &patch.records);
        merge_field(&mut self.auto_enabled, &patch.auto_enabled);
        merge_field(&mut self.auto_target_cap_c, &patch.auto_target_cap_c);

        let in_day = |m: &Option<u16>| m.filter(|v| *v < MINUTES_PER_DAY);
        merge_field(
            &mut self.auto_start_minute_of_day,
            &in_day(&patch.auto_start_minute_of_day),
        );
        merge_field(
            &mut self.auto_end_minute_of_day,
            &in_day(&patch.auto_end_minute_of_day),
        );

        if patch.ambient_start_c.is_some() {
            self.ambient_start_c = patch.ambient_start_c;
        }
        if patch.target_temp_c.is_some() {
            self.target_temp_c = patch.target_temp_c;
        }
        if patch.start_epoch_utc.is_some() {
            self.start_epoch_utc = patch.start_epoch_utc;
        }
        if patch.current_temp_c.is_some() {
            self.current_temp_c = patch.current_temp_c;
        }
        if patch.suggested_k.is_some() {
            self.suggested_k = patch.suggested_k;
        }
    }

    pub fn record(&self, epoch_utc: i64) -> Option<&CalibrationRecord> {
        self.records
            .iter()
            .find(|r| r.epoch_utc == Some(epoch_utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationControls {
    pub start_enabled: bool,
    pub cancel_enabled: bool,
}

impl CalibrationControls {
    pub fn of(session: &CalibrationSession, in_flight: bool) -> CalibrationControls {
        let active = session.state.is_active();
        CalibrationControls {
            start_enabled: !in_flight && !active && session.time_synced,
            cancel_enabled: !in_flight && active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationView {
    pub state: CalibrationState,
    pub state_text: &'static str,
    pub controls: CalibrationControls,
    pub time_synced: bool,
    pub current_k: String,
    pub suggested_k: String,
    pub target_temp: String,
    pub ambient_start: String,
    pub current_temp: String,
    pub elapsed: String,
    pub start_at: String,
    pub records: Vec<String>,
    pub auto_enabled: bool,
    pub auto_start: String,
    pub auto_end: String,
    pub auto_target_cap: String,
}

fn format_k(k: Option<f64>) -> String {
    k.filter(|v| v.is_finite())
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn describe_record(clock: &dyn crate::clock::Clock, record: &CalibrationRecord) -> String {
    format!(
        "{}  k={}  {} → {} °C  warmup {}",
        local_label(clock, record.epoch_utc),
        format_k(record.k),
        format_opt_temp(record.ambient_c),
        format_opt_temp(record.target_c),
        format_seconds(record.warmup_seconds.unwrap_or(0.0))
    )
}

impl CalibrationView {
    pub fn of(
        clock: &dyn crate::clock::Clock,
        session: &CalibrationSession,
        in_flight: bool,
    ) -> CalibrationView {
        CalibrationView {
            state: session.state,
            state_text: session.state.label(),
            controls: CalibrationControls::of(session, in_flight),
            time_synced: session.time_synced,
            current_k: format!("{:.2}", session.current_k),
            suggested_k: session
                .suggested_k
                .filter(|k| k.is_finite() && *k > 0.0)
                .map(|k| format!("{:.2}", k))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            target_temp: format_opt_temp(session.target_temp_c),
            ambient_start: format_opt_temp(session.ambient_start_c),
            current_temp: format_opt_temp(session.current_temp_c),
            elapsed: format_seconds(session.elapsed_seconds),
            start_at: local_label(clock, session.start_epoch_utc.filter(|e| *e > 0)),
            records: session
                .records
                .iter()
                .map(|r| describe_record(clock, r))
                .collect(),
            auto_enabled: session.auto_enabled,
            auto_start: format_minute_of_day(session.auto_start_minute_of_day),
            auto_end: format_minute_of_day(session.auto_end_minute_of_day),
            auto_target_cap: format_temp(session.auto_target_cap_c),
        }
    }
}

pub struct CalibrationController {
    api: SharedApi,
    clock_sync: Arc<ClockSync>,
    presenter: SharedPresenter,
    session: Option<CalibrationSession>,
    in_flight: bool,
}

impl CalibrationController {
    pub fn new(api: SharedApi, clock_sync: Arc<ClockSync>, presenter: SharedPresenter) -> Self {
        CalibrationController {
            api,
            clock_sync,
            presenter,
            session: None,
            in_flight: false,
        }
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    pub fn controls(&self) -> CalibrationControls {
        let idle = CalibrationSession::default();
        CalibrationControls::of(self.session.as_ref().unwrap_or(&idle), self.in_flight)
    }

    pub async fn refresh_from_pull(&mut self) {
        if let Some(false) = self.pull().await {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    pub async fn apply_push(&mut self, patch: &CalibrationPatch) {
        let session = self.session.get_or_insert_with(CalibrationSession::default);
        let previous = session.state;
        session.merge(patch);
        if session.state != previous {
            info!(
                "calibration state {} -> {}",
                previous.label(),
                session.state.label()
            );
        }
        self.present();

        if patch.time_synced == Some(false) {
            self.clock_sync.sync_time().await;
            self.pull().await;
        }
    }

    /// Pulls the session; returns the reported sync flag on success.
    async fn pull(&mut self) -> Option<bool> {
        match get_json::<CalibrationPatch>(self.api.as_ref(), CALIBRATION_PATH).await {
            Ok(patch) => {
                let mut session = CalibrationSession::default();
                session.merge(&patch);
                self.session = Some(session);
                self.present();
                Some(patch.time_synced.unwrap_or(true))
            }
            Err(e) => {
                warn!("load calibration failed ({:#})", e);
                None
            }
        }
    }

    fn present(&self) {
        if let Some(session) = &self.session {
            self.presenter.calibration(&CalibrationView::of(
                self.clock_sync.clock(),
                session,
                self.in_flight,
            ));
        }
    }

    async fn run_command(
        &mut self,
        path: &str,
        fields: &[(&str, String)],
    ) -> Result<CommandReply, CommandError> {
        self.in_flight = true;
        self.present();
        let result = post_command(self.api.as_ref(), path, fields).await;
        self.in_flight = false;

        match result {
            Ok(reply) => {
                self.refresh_from_pull().await;
                Ok(reply)
            }
            Err(e) => {
                self.present();
                Err(e)
            }
        }
    }

    /// `None` or `Some(0)` starts immediately, a positive epoch schedules the start.
    pub async fn start(
        &mut self,
        target_temp_c: f64,
        start_epoch_utc: Option<i64>,
    ) -> Result<(), CommandError> {
        if !target_temp_c.is_finite() {
            return Err(CommandError::Validation(
                "Please enter a target temperature".to_string(),
            ));
        }
        let start = start_epoch_utc.unwrap_or(0);
        if start < 0 {
            return Err(CommandError::Validation(
                "Start time must not be before 1970".to_string(),
            ));
        }

        info!(
            "start calibration: target {} °C, start {}",
            target_temp_c,
            if start == 0 { "now".to_string() } else { start.to_string() }
        );
        self.run_command(
            CALIBRATION_START_PATH,
            &[
                ("target", target_temp_c.to_string()),
                ("start_epoch_utc", start.to_string()),
            ],
        )
        .await
        .map(|_| ())
    }

    pub async fn start_at_local(
        &mut self,
        target_temp_c: f64,
        date: &str,
        time: &str,
    ) -> Result<(), CommandError> {
        let epoch = local_to_epoch(self.clock_sync.clock(), date, time).ok_or_else(|| {
            CommandError::Validation("Please fill a valid start date and time".to_string())
        })?;
        self.start(target_temp_c, Some(epoch)).await
    }

    pub async fn cancel(&mut self) -> Result<(), CommandError> {
        info!("cancel calibration");
        self.run_command(CALIBRATION_CANCEL_PATH, &[]).await.map(|_| ())
    }

    /// Deletes a historical record. Returns `Ok(false)` when `confirm` declines.
    pub async fn delete_record<F>(
        &mut self,
        epoch_utc: Option<i64>,
        confirm: F,
    ) -> Result<bool, CommandError>
    where
        F: FnOnce(&str) -> bool,
    {
        let epoch = epoch_utc.ok_or_else(|| {
            CommandError::Validation("Missing calibration record id".to_string())
        })?;

        let clock = self.clock_sync.clock();
        let prompt = match self.session.as_ref().and_then(|s| s.record(epoch)) {
            Some(record) => format!(
                "Delete calibration from {}: k={}, ambient {} °C, target {} °C?",
                local_label(clock, Some(epoch)),
                format_k(record.k),
                format_opt_temp(record.ambient_c),
                format_opt_temp(record.target_c)
            ),
            None => format!(
                "Delete calibration from {}?",
                local_label(clock, Some(epoch))
            ),
        };
        if !confirm(&prompt) {
            return Ok(false);
        }

        info!("delete calibration record {}", epoch);
        self.run_command(CALIBRATION_DELETE_PATH, &[("epoch_utc", epoch.to_string())])
            .await
            .map(|_| true)
    }

    pub async fn save_automation_settings(
        &mut self,
        settings: &AutomationSettings,
    ) -> Result<(), CommandError> {
        let mut fields = vec![(
            "auto_enabled",
            if settings.enabled { "1" } else { "0" }.to_string(),
        )];
        if let Some(start) = &settings.start {
            let minutes = minute_of_day(start).ok_or_else(|| {
                CommandError::Validation(format!("Invalid start time {}", start))
            })?;
            fields.push(("auto_start_min", minutes.to_string()));
        }
        if let Some(end) = &settings.end {
            let minutes = minute_of_day(end)
                .ok_or_else(|| CommandError::Validation(format!("Invalid end time {}", end)))?;
            fields.push(("auto_end_min", minutes.to_string()));
        }
        if let Some(cap) = settings.target_cap_c {
            if !cap.is_finite() {
                return Err(CommandError::Validation(
                    "Please enter a target cap".to_string(),
                ));
            }
            fields.push(("auto_target_cap_c", cap.to_string()));
        }

        self.run_command(CALIBRATION_SETTINGS_PATH, &fields)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed::FixedClock;
    use crate::testing::{FakeApi, RecordingPresenter};

    const SNAPSHOT: &str = r#"{
        "state": "idle", "current_k": 1.25, "time_synced": true,
        "auto_enabled": true, "auto_start_min": 1320, "auto_end_min": 360, "auto_target_cap_c": 30,
        "records": [
            {"epoch_utc": 1709352000, "k": 1.1, "ambient_c": 5, "target_c": 20, "warmup_seconds": 1800},
            {"epoch_utc": 1709294400, "k": 0.9, "ambient_c": 10, "target_c": 22, "warmup_seconds": 900}
        ]
    }"#;

    fn setup() -> (Arc<FakeApi>, Arc<RecordingPresenter>, CalibrationController) {
        let api = Arc::new(FakeApi::new());
        let presenter = Arc::new(RecordingPresenter::default());
        let clock_sync = Arc::new(ClockSync::new(
            api.clone(),
            Arc::new(FixedClock::new(1709294400, 120)),
        ));
        let controller = CalibrationController::new(api.clone(), clock_sync, presenter.clone());
        api.reply(CALIBRATION_PATH, 200, SNAPSHOT);
        (api, presenter, controller)
    }

    fn patch(json: &str) -> CalibrationPatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn controls_follow_state() {
        let mut session = CalibrationSession {
            time_synced: true,
            ..CalibrationSession::default()
        };
        assert_eq!(
            CalibrationControls::of(&session, false),
            CalibrationControls {
                start_enabled: true,
                cancel_enabled: false
            }
        );
        for state in [CalibrationState::Scheduled, CalibrationState::Running] {
            session.state = state;
            assert_eq!(
                CalibrationControls::of(&session, false),
                CalibrationControls {
                    start_enabled: false,
                    cancel_enabled: true
                }
            );
        }
        session.state = CalibrationState::Completed;
        session.time_synced = false;
        assert!(!CalibrationControls::of(&session, false).start_enabled);
        session.time_synced = true;
        session.state = CalibrationState::Running;
        assert!(!CalibrationControls::of(&session, true).cancel_enabled);
    }

    #[test]
    fn merge_keeps_previous_on_bad_fields() {
        let mut session = CalibrationSession::default();
        session.merge(&patch(SNAPSHOT));
        assert_eq!(session.records.len(), 2);

        session.merge(&patch(
            r#"{"state":"exploded","current_k":"high","records":"none","auto_start_min":2000}"#,
        ));
        assert_eq!(session.state, CalibrationState::Idle);
        assert_eq!(session.current_k, 1.25);
        assert_eq!(session.records.len(), 2);
        assert_eq!(session.auto_start_minute_of_day, 1320);

        session.merge(&patch(r#"{"state":"running","elapsed_seconds":90}"#));
        assert_eq!(session.state, CalibrationState::Running);
        assert_eq!(session.elapsed_seconds, 90.0);
    }

    #[test]
    fn null_field_keeps_the_rest_of_the_history() {
        let clock = FixedClock::new(1709294400, 120);
        let mut session = CalibrationSession::default();
        session.merge(&patch(
            r#"{"records":[
                {"epoch_utc": 1709352000, "k": 1.1, "ambient_c": 5, "target_c": 20, "warmup_seconds": 1800},
                {"epoch_utc": 1709294400, "k": null, "ambient_c": null, "target_c": 22, "warmup_seconds": 900},
                "garbage"
            ]}"#,
        ));

        assert_eq!(session.records.len(), 2);
        assert_eq!(session.records[1].k, None);
        assert_eq!(session.records[1].target_c, Some(22.0));
        let view = CalibrationView::of(&clock, &session, false);
        assert_eq!(
            view.records[1],
            "2024-03-01 14:00  k=–  – → 22.0 °C  warmup 15m 0s"
        );
    }

    #[test]
    fn records_keep_device_order() {
        let mut session = CalibrationSession::default();
        session.merge(&patch(SNAPSHOT));
        let epochs: Vec<_> = session.records.iter().map(|r| r.epoch_utc).collect();
        assert_eq!(epochs, vec![Some(1709352000), Some(1709294400)]);
    }

    #[test]
    fn view_formatting() {
        let clock = FixedClock::new(1709294400, 120);
        let mut session = CalibrationSession::default();
        session.merge(&patch(SNAPSHOT));
        session.merge(&patch(r#"{"state":"running","elapsed_seconds":90}"#));
        let view = CalibrationView::of(&clock, &session, false);
        assert_eq!(view.state_text, "Running");
        assert_eq!(view.current_k, "1.25");
        assert_eq!(view.elapsed, "1m 30s");
        assert_eq!(view.auto_start, "22:00");
        assert_eq!(view.auto_end, "06:00");
        assert_eq!(view.start_at, "–");
        assert_eq!(
            view.records[0],
            "2024-03-02 06:00  k=1.10  5.0 → 20.0 °C  warmup 30m 0s"
        );
    }

    #[tokio::test]
    async fn start_rejects_nan_locally() {
        let (api, _, mut controller) = setup();
        let err = controller.start(f64::NAN, None).await.unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        let err = controller.start(40.0, Some(-5)).await.unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn start_immediately_then_refresh() {
        let (api, presenter, mut controller) = setup();
        controller.refresh_from_pull().await;
        api.reply(CALIBRATION_START_PATH, 200, r#"{"ok":true}"#);

        controller.start(45.0, None).await.unwrap();

        let posted = api.requests_to(CALIBRATION_START_PATH);
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].field("target"), Some("45"));
        assert_eq!(posted[0].field("start_epoch_utc"), Some("0"));
        assert_eq!(api.count(CALIBRATION_PATH), 2);

        // controls were greyed out while the command was in flight
        let views = presenter.calibration_views();
        assert!(views
            .iter()
            .any(|v| !v.controls.start_enabled && !v.controls.cancel_enabled));
        assert!(views.last().unwrap().controls.start_enabled);
    }

    #[tokio::test]
    async fn start_at_local_time() {
        let (api, _, mut controller) = setup();
        api.reply(CALIBRATION_START_PATH, 200, r#"{"ok":true}"#);

        controller
            .start_at_local(45.0, "2024-03-02", "07:30")
            .await
            .unwrap();

        let posted = api.requests_to(CALIBRATION_START_PATH);
        assert_eq!(posted[0].field("start_epoch_utc"), Some("1709357400"));
    }

    #[tokio::test]
    async fn remote_rejection_is_surfaced() {
        let (api, _, mut controller) = setup();
        controller.refresh_from_pull().await;
        api.reply(
            CALIBRATION_START_PATH,
            200,
            r#"{"ok":false,"error":"Calibration already active"}"#,
        );

        let err = controller.start(45.0, Some(1709357400)).await.unwrap_err();
        assert_eq!(err.to_string(), "Calibration already active");
        assert!(controller.controls().start_enabled);
        // no refresh after a failed command
        assert_eq!(api.count(CALIBRATION_PATH), 1);
    }

    #[tokio::test]
    async fn cancel_posts_without_body() {
        let (api, _, mut controller) = setup();
        api.reply(CALIBRATION_CANCEL_PATH, 200, r#"{"ok":true}"#);
        controller.cancel().await.unwrap();
        let posted = api.requests_to(CALIBRATION_CANCEL_PATH);
        assert_eq!(posted.len(), 1);
        assert!(posted[0].fields.is_empty());
    }

    #[tokio::test]
    async fn delete_requires_id() {
        let (api, _, mut controller) = setup();
        let err = controller
            .delete_record(None, |_| panic!("must not ask"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn delete_describes_record_and_honours_refusal() {
        let (api, _, mut controller) = setup();
        controller.refresh_from_pull().await;
        api.reply(CALIBRATION_DELETE_PATH, 200, r#"{"ok":true}"#);

        let mut asked = String::new();
        let deleted = controller
            .delete_record(Some(1709352000), |prompt| {
                asked = prompt.to_string();
                false
            })
            .await
            .unwrap();
        assert!(!deleted);
        assert_eq!(
            asked,
            "Delete calibration from 2024-03-02 06:00: k=1.10, ambient 5.0 °C, target 20.0 °C?"
        );
        assert_eq!(api.count(CALIBRATION_DELETE_PATH), 0);

        let deleted = controller
            .delete_record(Some(1709352000), |_| true)
            .await
            .unwrap();
        assert!(deleted);
        let posted = api.requests_to(CALIBRATION_DELETE_PATH);
        assert_eq!(posted[0].field("epoch_utc"), Some("1709352000"));
    }

    #[tokio::test]
    async fn automation_settings_are_partial() {
        let (api, _, mut controller) = setup();
        api.reply(CALIBRATION_SETTINGS_PATH, 200, r#"{"ok":true}"#);

        controller
            .save_automation_settings(&AutomationSettings {
                enabled: true,
                start: Some("22:00".to_string()),
                end: None,
                target_cap_c: Some(30.0),
            })
            .await
            .unwrap();

        let posted = api.requests_to(CALIBRATION_SETTINGS_PATH);
        assert_eq!(
            posted[0].fields,
            vec![
                ("auto_enabled".to_string(), "1".to_string()),
                ("auto_start_min".to_string(), "1320".to_string()),
                ("auto_target_cap_c".to_string(), "30".to_string()),
            ]
        );

        let err = controller
            .save_automation_settings(&AutomationSettings {
                enabled: false,
                start: None,
                end: Some("25:10".to_string()),
                target_cap_c: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
        assert_eq!(api.count(CALIBRATION_SETTINGS_PATH), 1);
    }

    #[tokio::test]
    async fn unsynced_session_triggers_sync() {
        let (api, _, mut controller) = setup();
        api.reply("/sync-time", 200, "Time synchronized");

        controller
            .apply_push(&patch(r#"{"state":"idle","time_synced":false}"#))
            .await;

        assert_eq!(api.count("/sync-time"), 1);
        assert_eq!(api.count(CALIBRATION_PATH), 1);
        assert!(controller.session().unwrap().time_synced);
    }
}
