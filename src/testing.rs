use crate::calibration::CalibrationView;
use crate::connection::CommandChannel;
use crate::device_client::{DeviceApi, HttpReply};
use crate::kfactor::KFactorView;
use crate::presenter::Presenter;
use crate::ready_by::ReadyByView;
use crate::status::StatusView;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub fields: Vec<(String, String)>,
}

impl Recorded {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

enum Canned {
    Reply(u16, String),
    Fail,
}

/// Device API answering from canned per-path replies. Unknown paths fail.
#[derive(Default)]
pub struct FakeApi {
    replies: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeApi {
    pub fn new() -> FakeApi {
        FakeApi::default()
    }

    pub fn reply(&self, path: &str, status: u16, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(path.to_string(), Canned::Reply(status, body.to_string()));
    }

    pub fn fail(&self, path: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(path.to_string(), Canned::Fail);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn answer(&self, method: &'static str, path: &str, fields: &[(&str, String)]) -> anyhow::Result<HttpReply> {
        self.requests.lock().unwrap().push(Recorded {
            method,
            path: path.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
        match self.replies.lock().unwrap().get(path) {
            Some(Canned::Reply(status, body)) => Ok(HttpReply {
                status: *status,
                body: body.clone().into_bytes(),
            }),
            Some(Canned::Fail) => Err(anyhow!("connection refused")),
            None => Err(anyhow!("no reply for {}", path)),
        }
    }
}

#[async_trait]
impl DeviceApi for FakeApi {
    async fn get(&self, path: &str) -> anyhow::Result<HttpReply> {
        self.answer("GET", path, &[])
    }

    async fn post_form(&self, path: &str, fields: &[(&str, String)]) -> anyhow::Result<HttpReply> {
        self.answer("POST", path, fields)
    }
}

/// Command channel whose open flag is set by the test.
#[derive(Default)]
pub struct FakeChannel {
    open: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub fn new(open: bool) -> FakeChannel {
        FakeChannel {
            open: AtomicBool::new(open),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, command: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        self.sent.lock().unwrap().push(command.to_string());
        true
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    status: Mutex<Vec<StatusView>>,
    calibration: Mutex<Vec<CalibrationView>>,
    ready_by: Mutex<Vec<ReadyByView>>,
    kfactor: Mutex<Vec<KFactorView>>,
    logs: Mutex<Option<Vec<String>>>,
    log_lines: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    pub fn last_status(&self) -> Option<StatusView> {
        self.status.lock().unwrap().last().cloned()
    }

    pub fn calibration_views(&self) -> Vec<CalibrationView> {
        self.calibration.lock().unwrap().clone()
    }

    pub fn last_calibration(&self) -> Option<CalibrationView> {
        self.calibration.lock().unwrap().last().cloned()
    }

    pub fn last_ready_by(&self) -> Option<ReadyByView> {
        self.ready_by.lock().unwrap().last().cloned()
    }

    pub fn last_kfactor(&self) -> Option<KFactorView> {
        self.kfactor.lock().unwrap().last().cloned()
    }

    pub fn logs(&self) -> Option<Vec<String>> {
        self.logs.lock().unwrap().clone()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log_lines.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn status(&self, view: &StatusView) {
        self.status.lock().unwrap().push(view.clone());
    }

    fn calibration(&self, view: &CalibrationView) {
        self.calibration.lock().unwrap().push(view.clone());
    }

    fn ready_by(&self, view: &ReadyByView) {
        self.ready_by.lock().unwrap().push(view.clone());
    }

    fn kfactor(&self, view: &KFactorView) {
        self.kfactor.lock().unwrap().push(view.clone());
    }

    fn logs(&self, lines: &[String]) {
        *self.logs.lock().unwrap() = Some(lines.to_vec());
    }

    fn log_line(&self, line: &str) {
        self.log_lines.lock().unwrap().push(line.to_string());
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}
