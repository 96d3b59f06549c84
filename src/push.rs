use crate::calibration::CalibrationPatch;
use crate::common::lenient;
use crate::ready_by::ReadyByPatch;
use crate::status::StatusPatch;
use serde::Deserialize;

/// Frame pushed by the device over the socket, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    TempUpdate(StatusPatch),
    CalibrationUpdate(CalibrationPatch),
    ReadyByUpdate(ReadyByPatch),
    TimeSync {
        #[serde(default, deserialize_with = "lenient")]
        time_synced: Option<bool>,
    },
    LogAppend {
        #[serde(default, deserialize_with = "lenient")]
        line: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    pub fn parse(text: &str) -> serde_json::Result<PushMessage> {
        serde_json::from_str(text)
    }
}
