mod calibration;
mod clock;
mod clock_sync;
mod common;
mod config;
mod connection;
mod console;
mod device_client;
mod dispatcher;
mod format;
mod kfactor;
mod logs;
mod presenter;
mod push;
mod ready_by;
mod session;
mod status;
#[cfg(test)]
mod testing;

use anyhow::anyhow;
use log::{info, warn};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc::unbounded_channel;

extern crate serde;
#[macro_use]
extern crate clap;

use crate::clock::SystemClock;
use crate::common::Task;
use crate::config::Config;
use crate::connection::{socket_url, WsTransport};
use crate::device_client::{HttpDeviceClient, SharedApi};
use crate::presenter::ConsolePresenter;
use crate::session::Session;
use syslog::Facility;

fn init_logging(config: &Config) -> anyhow::Result<()> {
    if config.use_syslog {
        syslog::init(Facility::LOG_USER, config.log_level, None)
            .map_err(|e| anyhow!("syslog init failed ({:?})", e))?;
    } else {
        env_logger::Builder::new()
            .filter_level(config.log_level)
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = clap_app!(HeaterSync =>
        (version: crate_version!())
        (@arg CONFIG: -c --config +takes_value "Sets a custom config file"))
    .get_matches();

    let path_to_config = matches
        .value_of("CONFIG")
        .unwrap_or("/usr/local/etc/heater_sync/config.toml");

    let config = Config::read_from_file(path_to_config)?;

    init_logging(&config)?;
    info!(
        "heater-sync {} for device {}",
        env!("CARGO_PKG_VERSION"),
        config.device_origin
    );

    let ws_url = socket_url(&config.device_origin)?;
    let api: SharedApi = Arc::new(HttpDeviceClient::new(
        &config.device_origin,
        config.request_timeout,
    ));

    let (sender, mut receiver) = unbounded_channel::<Task>();

    let connection = connection::start(
        Arc::new(WsTransport {
            connect_timeout: config.request_timeout,
        }),
        ws_url,
        config.reconnect_delay,
        sender.clone(),
    );

    tokio::spawn(console::read_commands(
        BufReader::new(tokio::io::stdin()),
        sender.clone(),
    ));

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("wait for ctrl-c failed ({:?})", e);
            return;
        }
        info!("interrupted");
        if let Err(e) = sender.send(Task::Shutdown) {
            warn!("shutdown send to session failed ({:?})", e);
        }
    });

    let mut session = Session::new(
        api,
        Arc::new(SystemClock),
        Arc::new(connection),
        Arc::new(ConsolePresenter),
    );
    session.start(config.sync_time_on_start).await;
    session.run(&mut receiver).await;

    Ok(())
}
