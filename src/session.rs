use crate::calibration::CalibrationController;
use crate::clock::Clock;
use crate::clock_sync::ClockSync;
use crate::common::{Task, UserCommand, REQUEST_STATUS_COMMAND};
use crate::connection::SharedChannel;
use crate::device_client::{CommandError, SharedApi};
use crate::dispatcher::CommandDispatcher;
use crate::kfactor::KFactorPanel;
use crate::logs::LogFeed;
use crate::presenter::SharedPresenter;
use crate::push::PushMessage;
use crate::ready_by::ReadyByScheduler;
use crate::status::StatusReconciler;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Session {
    clock_sync: Arc<ClockSync>,
    channel: SharedChannel,
    presenter: SharedPresenter,
    status: StatusReconciler,
    dispatcher: CommandDispatcher,
    calibration: CalibrationController,
    ready_by: ReadyByScheduler,
    kfactor: KFactorPanel,
    logs: LogFeed,
}

impl Session {
    pub fn new(
        api: SharedApi,
        clock: Arc<dyn Clock>,
        channel: SharedChannel,
        presenter: SharedPresenter,
    ) -> Session {
        let clock_sync = Arc::new(ClockSync::new(api.clone(), clock));
        Session {
            status: StatusReconciler::new(api.clone(), clock_sync.clone(), presenter.clone()),
            dispatcher: CommandDispatcher::new(api.clone(), channel.clone()),
            calibration: CalibrationController::new(
                api.clone(),
                clock_sync.clone(),
                presenter.clone(),
            ),
            ready_by: ReadyByScheduler::new(api.clone(), clock_sync.clone(), presenter.clone()),
            kfactor: KFactorPanel::new(api.clone(), presenter.clone()),
            logs: LogFeed::new(api, clock_sync.clone(), presenter.clone()),
            clock_sync,
            channel,
            presenter,
        }
    }

    /// Optional clock sync, then one pull of every view.
    pub async fn start(&mut self, sync_time: bool) {
        if sync_time {
            self.clock_sync.sync_time().await;
        }
        self.refresh_all().await;
    }

    async fn refresh_all(&mut self) {
        self.status.refresh_from_pull().await;
        self.calibration.refresh_from_pull().await;
        self.ready_by.refresh_from_pull().await;
        self.kfactor.refresh().await;
        self.logs.refresh_from_pull().await;
    }

    pub async fn run(&mut self, receiver: &mut UnboundedReceiver<Task>) {
        while let Some(task) = receiver.recv().await {
            match task {
                Task::Push(message) => self.handle_push(message).await,
                Task::User(command) => self.handle_command(command).await,
                Task::Shutdown => {
                    info!("session shutdown");
                    break;
                }
            }
        }
    }

    /// Asks the device for fresh status, over the socket when it is open.
    async fn request_status(&mut self) {
        if !(self.channel.is_open() && self.channel.send(REQUEST_STATUS_COMMAND).await) {
            self.status.pull().await;
        }
    }

    pub async fn handle_push(&mut self, message: PushMessage) {
        match message {
            PushMessage::TempUpdate(patch) => self.status.apply_push(&patch).await,
            PushMessage::CalibrationUpdate(patch) => self.calibration.apply_push(&patch).await,
            PushMessage::ReadyByUpdate(patch) => self.ready_by.apply_push(&patch).await,
            PushMessage::TimeSync {
                time_synced: Some(false),
            } => {
                info!("device lost its clock");
                self.clock_sync.sync_time().await;
                self.request_status().await;
            }
            PushMessage::TimeSync { .. } => debug!("device clock in sync"),
            PushMessage::LogAppend { line: Some(line) } => self.logs.append(&line),
            PushMessage::LogAppend { line: None } => {}
            PushMessage::Unknown => {}
        }
    }

    pub async fn handle_command(&mut self, command: UserCommand) {
        debug!("user command {:?}", command);
        if let Err(e) = self.execute(command).await {
            warn!("command failed ({})", e);
            self.presenter.notice(&e.to_string());
        }
    }

    async fn execute(&mut self, command: UserCommand) -> Result<(), CommandError> {
        match command {
            UserCommand::Toggle(kind) => self.dispatcher.toggle(kind, &mut self.status).await,
            UserCommand::SyncTime => {
                self.clock_sync.sync_time().await;
                self.request_status().await;
                Ok(())
            }
            UserCommand::Refresh => {
                self.refresh_all().await;
                Ok(())
            }
            UserCommand::ApplySettings(settings) => {
                self.dispatcher
                    .apply_settings(&settings, &mut self.status)
                    .await
            }
            UserCommand::Reboot => {
                self.dispatcher.reboot().await?;
                self.presenter.notice("Rebooting...");
                Ok(())
            }
            UserCommand::CalibrationStart {
                target_temp_c,
                start_epoch_utc,
            } => self.calibration.start(target_temp_c, start_epoch_utc).await,
            UserCommand::CalibrationStartAt {
                target_temp_c,
                date,
                time,
            } => {
                self.calibration
                    .start_at_local(target_temp_c, &date, &time)
                    .await
            }
            UserCommand::CalibrationCancel => self.calibration.cancel().await,
            UserCommand::CalibrationDelete {
                epoch_utc,
                confirmed,
            } => {
                let presenter = self.presenter.clone();
                let deleted = self
                    .calibration
                    .delete_record(epoch_utc, |prompt| {
                        if !confirmed {
                            presenter.notice(&format!("{} (repeat with \"yes\" to confirm)", prompt));
                        }
                        confirmed
                    })
                    .await?;
                if deleted {
                    self.presenter.notice("Calibration record deleted");
                }
                Ok(())
            }
            UserCommand::CalibrationAutomation(settings) => {
                self.calibration.save_automation_settings(&settings).await
            }
            UserCommand::ReadyBySchedule {
                date,
                time,
                target_temp_c,
            } => self.ready_by.schedule(&date, &time, target_temp_c).await,
            UserCommand::ReadyByClear => self.ready_by.clear().await,
            UserCommand::KFactorSuggest {
                ambient,
                target,
                warmup_min,
            } => self
                .kfactor
                .suggest(ambient, target, warmup_min)
                .await
                .map(|_| ()),
            UserCommand::KFactorApply(k) => self.kfactor.apply(k).await,
            UserCommand::LogsClear => self.logs.clear().await,
        }
    }
}
