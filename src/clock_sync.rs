use crate::clock::Clock;
use crate::device_client::SharedApi;
use log::{info, warn};
use std::sync::Arc;

pub const SYNC_TIME_PATH: &str = "/sync-time";

/// Pushes the host clock to the device.
pub struct ClockSync {
    api: SharedApi,
    clock: Arc<dyn Clock>,
}

impl ClockSync {
    pub fn new(api: SharedApi, clock: Arc<dyn Clock>) -> ClockSync {
        ClockSync { api, clock }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Fire-and-forget: failures are logged, never returned.
    pub async fn sync_time(&self) {
        let now = self.clock.now_utc();
        let epoch = now.timestamp();
        let tz = self.clock.utc_offset_minutes(now);
        info!("sync time: epoch={} tz={}", epoch, tz);

        let fields = [("epoch", epoch.to_string()), ("tz", tz.to_string())];
        match self.api.post_form(SYNC_TIME_PATH, &fields).await {
            Ok(reply) if reply.is_success() || reply.is_redirect() => {}
            Ok(reply) => warn!("time sync returned HTTP {}", reply.status),
            Err(e) => warn!("time sync failed ({:#})", e),
        }
    }
}
