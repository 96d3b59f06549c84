use crate::common::{AutomationSettings, Task, ThermostatSettings, ToggleKind, UserCommand};
use anyhow::{anyhow, Context};
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedSender;

pub const HELP: &str = "commands: heater | deadzone | task | sync | refresh | reboot | \
set [target=] [hyst=] [taskdelay=] [dzstart=HH:MM] [dzend=HH:MM] | \
cal start <temp> [now|<epoch>|<date> <time>] | cal cancel | cal delete <epoch> [yes] | \
cal auto on|off [start=HH:MM] [end=HH:MM] [cap=<temp>] | \
readyby <date> <time> <temp> | readyby clear | \
k suggest <ambient> <target> <warmup_min> | k apply <k> | logs clear | quit";

fn number(s: Option<&str>, what: &str) -> anyhow::Result<f64> {
    let s = s.ok_or_else(|| anyhow!("missing {}", what))?;
    s.parse::<f64>()
        .with_context(|| format!("invalid {} {}", what, s))
}

/// `key=value` pairs after the command word.
fn options<'a>(args: &[&'a str]) -> anyhow::Result<Vec<(&'a str, &'a str)>> {
    args.iter()
        .map(|a| {
            a.split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got {}", a))
        })
        .collect()
}

fn parse_settings(args: &[&str]) -> anyhow::Result<ThermostatSettings> {
    let mut settings = ThermostatSettings::default();
    for (key, value) in options(args)? {
        match key {
            "target" => settings.target_temp = Some(number(Some(value), key)?),
            "hyst" => settings.hysteresis = Some(number(Some(value), key)?),
            "taskdelay" => settings.task_delay = Some(number(Some(value), key)?),
            "dzstart" => settings.deadzone_start = Some(value.to_string()),
            "dzend" => settings.deadzone_end = Some(value.to_string()),
            _ => return Err(anyhow!("unknown setting {}", key)),
        }
    }
    Ok(settings)
}

fn parse_automation(args: &[&str]) -> anyhow::Result<AutomationSettings> {
    let enabled = match args.first() {
        Some(&"on") => true,
        Some(&"off") => false,
        _ => return Err(anyhow!("expected on or off")),
    };
    let mut settings = AutomationSettings {
        enabled,
        ..AutomationSettings::default()
    };
    for (key, value) in options(&args[1..])? {
        match key {
            "start" => settings.start = Some(value.to_string()),
            "end" => settings.end = Some(value.to_string()),
            "cap" => settings.target_cap_c = Some(number(Some(value), key)?),
            _ => return Err(anyhow!("unknown automation setting {}", key)),
        }
    }
    Ok(settings)
}

fn parse_calibration(args: &[&str]) -> anyhow::Result<UserCommand> {
    match args {
        ["start", target, rest @ ..] => {
            let target_temp_c = number(Some(*target), "target temperature")?;
            match rest {
                [] | ["now"] => Ok(UserCommand::CalibrationStart {
                    target_temp_c,
                    start_epoch_utc: None,
                }),
                [epoch] => Ok(UserCommand::CalibrationStart {
                    target_temp_c,
                    start_epoch_utc: Some(
                        epoch
                            .parse::<i64>()
                            .with_context(|| format!("invalid start epoch {}", epoch))?,
                    ),
                }),
                [date, time] => Ok(UserCommand::CalibrationStartAt {
                    target_temp_c,
                    date: date.to_string(),
                    time: time.to_string(),
                }),
                _ => Err(anyhow!("too many arguments")),
            }
        }
        ["cancel"] => Ok(UserCommand::CalibrationCancel),
        ["delete", rest @ ..] => {
            let epoch_utc = match rest.first() {
                Some(e) => Some(
                    e.parse::<i64>()
                        .with_context(|| format!("invalid record epoch {}", e))?,
                ),
                None => None,
            };
            Ok(UserCommand::CalibrationDelete {
                epoch_utc,
                confirmed: rest.get(1) == Some(&"yes"),
            })
        }
        ["auto", rest @ ..] => parse_automation(rest).map(UserCommand::CalibrationAutomation),
        _ => Err(anyhow!("unknown calibration command")),
    }
}

pub fn parse_line(line: &str) -> anyhow::Result<Option<Task>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        [] => return Ok(None),
        ["quit"] | ["exit"] => return Ok(Some(Task::Shutdown)),
        ["heater"] => UserCommand::Toggle(ToggleKind::Heater),
        ["deadzone"] => UserCommand::Toggle(ToggleKind::Deadzone),
        ["task"] => UserCommand::Toggle(ToggleKind::HeaterTask),
        ["sync"] => UserCommand::SyncTime,
        ["refresh"] => UserCommand::Refresh,
        ["reboot"] => UserCommand::Reboot,
        ["set", rest @ ..] => UserCommand::ApplySettings(parse_settings(rest)?),
        ["cal", rest @ ..] => parse_calibration(rest)?,
        ["readyby", "clear"] => UserCommand::ReadyByClear,
        ["readyby", date, time, temp] => UserCommand::ReadyBySchedule {
            date: date.to_string(),
            time: time.to_string(),
            target_temp_c: number(Some(*temp), "target temperature")?,
        },
        ["k", "suggest", rest @ ..] => UserCommand::KFactorSuggest {
            ambient: number(rest.first().copied(), "ambient")?,
            target: number(rest.get(1).copied(), "target")?,
            warmup_min: number(rest.get(2).copied(), "warmup minutes")?,
        },
        ["k", "apply", k] => UserCommand::KFactorApply(number(Some(*k), "k")?),
        ["logs", "clear"] => UserCommand::LogsClear,
        _ => return Err(anyhow!("unknown command")),
    };
    Ok(Some(Task::User(command)))
}

/// Reads commands line by line until input ends or the session is gone.
pub async fn read_commands<R>(input: R, sender: UnboundedSender<Task>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("console read failed ({:?})", e);
                break;
            }
        };
        match parse_line(&line) {
            Ok(Some(task)) => {
                if let Err(e) = sender.send(task) {
                    warn!("console task send failed ({:?})", e);
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{:#}: {}", e, line.trim());
                info!("{}", HELP);
            }
        }
    }
    info!("console input closed");
}
