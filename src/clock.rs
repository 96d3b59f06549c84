use chrono::{
    DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Local wall-clock reading of `utc`.
    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime;

    /// UTC instant of a local wall-clock reading.
    /// Returns `None` only when the reading cannot be mapped at all.
    fn from_local(&self, local: NaiveDateTime) -> Option<DateTime<Utc>>;

    /// Signed offset from UTC in minutes, east positive.
    fn utc_offset_minutes(&self, utc: DateTime<Utc>) -> i32 {
        (self.to_local(utc) - utc.naive_utc()).num_minutes() as i32
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&Local).naive_local()
    }

    fn from_local(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        resolve_local(&Local, local)
    }
}

/// Maps a local reading to UTC. A repeated reading (DST fall-back) takes the
/// earlier instant, a skipped reading (DST spring-forward) moves one hour on.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(local + ChronoDuration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn epoch_to_utc(epoch: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(epoch, 0).single()
}

/// `YYYY-MM-DD` and `HH:MM` of `epoch` in the clock's local time.
pub fn local_date_time(clock: &dyn Clock, epoch: i64) -> Option<(String, String)> {
    let local = clock.to_local(epoch_to_utc(epoch)?);
    Some((
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M").to_string(),
    ))
}

/// `YYYY-MM-DD HH:MM` of `epoch` in local time, `–` when unknown.
pub fn local_label(clock: &dyn Clock, epoch: Option<i64>) -> String {
    epoch
        .and_then(|e| local_date_time(clock, e))
        .map(|(d, t)| format!("{} {}", d, t))
        .unwrap_or_else(|| "–".to_string())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// `HH:MM` to minutes past midnight.
pub fn minute_of_day(s: &str) -> Option<u16> {
    use chrono::Timelike;
    parse_hhmm(s).map(|t| (t.hour() * 60 + t.minute()) as u16)
}

pub fn format_minute_of_day(minutes: u16) -> String {
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}

/// UTC epoch seconds of a local `YYYY-MM-DD` + `HH:MM`.
pub fn local_to_epoch(clock: &dyn Clock, date: &str, time: &str) -> Option<i64> {
    let naive = parse_date(date)?.and_time(parse_hhmm(time)?);
    clock.from_local(naive).map(|utc| utc.timestamp())
}

/// Local date of the day after `now`.
pub fn tomorrow(clock: &dyn Clock) -> String {
    let today = clock.to_local(clock.now_utc()).date();
    today
        .succ_opt()
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}
