pub const PLACEHOLDER: &str = "–";

/// Whole-seconds duration: `45s`, `1m 30s`, `1h 5m`.
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return PLACEHOLDER.to_string();
    }
    let total = seconds.round() as u64;
    if total == 0 {
        return PLACEHOLDER.to_string();
    }
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Minute-rounded duration used for warm-up estimates: `30 min`, `1 h`, `1 h 30 min`.
pub fn format_warmup(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return PLACEHOLDER.to_string();
    }
    let mins = (seconds / 60.0).round() as u64;
    if mins == 0 {
        return PLACEHOLDER.to_string();
    }
    if mins < 60 {
        return format!("{} min", mins);
    }
    let h = mins / 60;
    let m = mins % 60;
    if m > 0 {
        format!("{} h {} min", h, m)
    } else {
        format!("{} h", h)
    }
}

pub fn format_temp(value: f64) -> String {
    format!("{:.1}", value)
}

pub fn format_opt_temp(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map(format_temp)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}
