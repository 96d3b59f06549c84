use crate::clock_sync::ClockSync;
use crate::common::lenient;
use crate::device_client::{get_json, post_command, CommandError, SharedApi};
use crate::presenter::SharedPresenter;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

pub const LOGS_PATH: &str = "/api/logs";
pub const LOGS_CLEAR_PATH: &str = "/logs/clear";

#[derive(Debug, Default, Deserialize)]
struct LogSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    logs: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    time_synced: Option<bool>,
}

/// Device log, newest line first.
pub struct LogFeed {
    api: SharedApi,
    clock_sync: Arc<ClockSync>,
    presenter: SharedPresenter,
    lines: Vec<String>,
}

impl LogFeed {
    pub fn new(api: SharedApi, clock_sync: Arc<ClockSync>, presenter: SharedPresenter) -> LogFeed {
        LogFeed {
            api,
            clock_sync,
            presenter,
            lines: Vec::new(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub async fn refresh_from_pull(&mut self) {
        let snapshot = match get_json::<LogSnapshot>(self.api.as_ref(), LOGS_PATH).await {
            Ok(s) => s,
            Err(e) => {
                warn!("load logs failed ({:#})", e);
                return;
            }
        };

        self.lines = snapshot
            .logs
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        self.presenter.logs(&self.lines);

        if snapshot.time_synced == Some(false) {
            self.clock_sync.sync_time().await;
        }
    }

    pub fn append(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        self.lines.insert(0, line.to_string());
        self.presenter.log_line(line);
    }

    pub async fn clear(&mut self) -> Result<(), CommandError> {
        info!("clear device log");
        post_command(self.api.as_ref(), LOGS_CLEAR_PATH, &[]).await?;
        self.refresh_from_pull().await;
        Ok(())
    }
}
