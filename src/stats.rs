//! Dashboard figures derived from attendance rows.

use crate::backend::{AttendanceStatus, Identity, ProfileRow};
use crate::role::Role;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
    Year,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(serialize_with = "ymd")]
    pub start: NaiveDate,
    #[serde(serialize_with = "ymd")]
    pub end: NaiveDate,
    pub present: u32,
    pub absent: u32,
    pub present_percentage: u32,
    pub absent_percentage: u32,
}

fn ymd<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&d.format("%Y-%m-%d"))
}

fn round_percent(part: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

fn add_months(d: NaiveDate, months: i32) -> NaiveDate {
    let total = d.year() * 12 + d.month0() as i32 + months;
    NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1).unwrap_or(d)
}

/// Empty buckets ending at `today`: 7 days, 8 weeks or 12 months.
pub fn buckets(period: Period, today: NaiveDate) -> Vec<Bucket> {
    let empty = |name: String, start: NaiveDate, end: NaiveDate| Bucket {
        name,
        start,
        end,
        present: 0,
        absent: 0,
        present_percentage: 0,
        absent_percentage: 0,
    };
    match period {
        Period::Week => (0..7)
            .rev()
            .map(|back| {
                let d = today - Duration::days(back);
                empty(d.format("%a").to_string(), d, d)
            })
            .collect(),
        Period::Month => (0..8)
            .rev()
            .map(|back| {
                let end = today - Duration::weeks(back);
                let start = end - Duration::days(6);
                empty(format!("Week {}", 8 - back), start, end)
            })
            .collect(),
        Period::Year => (0..12)
            .rev()
            .map(|back| {
                let start = add_months(month_start(today), -back);
                let end = add_months(start, 1) - Duration::days(1);
                empty(start.format("%b").to_string(), start, end)
            })
            .collect(),
    }
}

/// Late counts as present and excused is left out of both series.
pub fn attendance_series(
    period: Period,
    today: NaiveDate,
    rows: &[(NaiveDate, AttendanceStatus)],
) -> Vec<Bucket> {
    let mut out = buckets(period, today);
    for (date, status) in rows {
        let Some(bucket) = out.iter_mut().find(|b| b.start <= *date && *date <= b.end) else {
            continue;
        };
        match status {
            AttendanceStatus::Present | AttendanceStatus::Late => bucket.present += 1,
            AttendanceStatus::Absent => bucket.absent += 1,
            AttendanceStatus::Excused => {}
        }
    }
    for b in &mut out {
        let total = b.present + b.absent;
        b.present_percentage = round_percent(b.present, total);
        b.absent_percentage = round_percent(b.absent, total);
    }
    out
}

pub fn series_range(period: Period, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let b = buckets(period, today);
    let start = b.first().map(|b| b.start).unwrap_or(today);
    let end = b.last().map(|b| b.end).unwrap_or(today);
    (start, end)
}

pub fn greeting(hour: u32) -> &'static str {
    if hour < 12 {
        "Good morning"
    } else if hour < 18 {
        "Good afternoon"
    } else {
        "Good evening"
    }
}

pub fn dashboard_title(role: Role) -> String {
    format!("{} Dashboard", role.label())
}

pub fn display_name(profile: Option<&ProfileRow>, identity: Option<&Identity>) -> String {
    let first = profile
        .and_then(|p| p.first_name.as_deref())
        .filter(|s| !s.is_empty());
    let last = profile
        .and_then(|p| p.last_name.as_deref())
        .filter(|s| !s.is_empty());
    match (first, last) {
        (Some(f), Some(l)) => format!("{} {}", f, l),
        (Some(f), None) => f.to_string(),
        _ => identity
            .and_then(|i| i.email.split('@').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("User")
            .to_string(),
    }
}
