//! Human-readable rendering of common cron shapes.
//!
//! Only a handful of five-field patterns are recognized. Everything else is
//! echoed back untouched; a guessed description that turns out wrong is worse
//! than the raw expression.

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Describe `expr`, or return it unchanged when the shape is not recognized.
pub fn describe_cron(expr: &str) -> String {
    describe(expr).unwrap_or_else(|| expr.to_string())
}

/// `true` when [`describe_cron`] would produce something other than an echo.
pub fn is_recognized(expr: &str) -> bool {
    describe(expr).is_some()
}

fn describe(expr: &str) -> Option<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = fields.as_slice() else {
        return None;
    };
    if *month != "*" {
        return None;
    }

    match (*minute, *hour, *dom, *dow) {
        ("*", "*", "*", "*") => Some("every minute".to_string()),
        (m, "*", "*", "*") => {
            if let Some(step) = step_of(m) {
                return Some(match step {
                    1 => "every minute".to_string(),
                    n => format!("every {n} minutes"),
                });
            }
            let m = number(m, 0, 59)?;
            Some(format!("hourly at minute {m}"))
        }
        (m, h, "*", "*") if h.starts_with("*/") => {
            let m = number(m, 0, 59)?;
            let step = step_of(h).filter(|n| *n <= 23)?;
            let every = match step {
                1 => "every hour".to_string(),
                n => format!("every {n} hours"),
            };
            Some(format!("{every} at minute {m}"))
        }
        (m, h, "*", d) => {
            let at = clock(m, h)?;
            match d {
                "*" => Some(format!("daily at {at}")),
                "1-5" | "mon-fri" | "MON-FRI" => Some(format!("weekdays at {at}")),
                "0,6" | "6,0" | "sat,sun" | "SAT,SUN" | "6-7" => Some(format!("weekends at {at}")),
                single => {
                    let day = weekday(single)?;
                    Some(format!("every {day} at {at}"))
                }
            }
        }
        (m, h, d, "*") => {
            let at = clock(m, h)?;
            let day = number(d, 1, 31)?;
            Some(format!("monthly on day {day} at {at}"))
        }
        _ => None,
    }
}

fn number(field: &str, min: u32, max: u32) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok().filter(|n| (min..=max).contains(n))
}

fn step_of(field: &str) -> Option<u32> {
    let n = field.strip_prefix("*/")?;
    number(n, 1, 59)
}

fn clock(minute: &str, hour: &str) -> Option<String> {
    let m = number(minute, 0, 59)?;
    let h = number(hour, 0, 23)?;
    Some(format!("{h:02}:{m:02}"))
}

fn weekday(field: &str) -> Option<&'static str> {
    if let Some(n) = number(field, 0, 7) {
        // 0 and 7 are both Sunday
        return Some(WEEKDAYS[(n % 7) as usize]);
    }
    let lower = field.to_ascii_lowercase();
    WEEKDAYS
        .iter()
        .find(|name| name.to_ascii_lowercase().starts_with(&lower) && lower.len() == 3)
        .copied()
}
