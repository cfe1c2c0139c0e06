use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Opening hours for one weekday (0 = Sunday .. 6 = Saturday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub business_id: String,
    pub weekday: u8,
    pub open: Option<String>,
    pub close: Option<String>,
    #[serde(default)]
    pub is_closed: bool,
}

impl BusinessHours {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.weekday > 6 {
            anyhow::bail!("weekday must be between 0 and 6, got {}", self.weekday);
        }
        if self.is_closed {
            return Ok(());
        }
        let open = self
            .open
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("open is required unless is_closed"))?;
        let close = self
            .close
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("close is required unless is_closed"))?;
        let open = parse_hhmm(open)?;
        let close = parse_hhmm(close)?;
        if close <= open {
            anyhow::bail!("close must be after open");
        }
        Ok(())
    }

    /// Opening window for the day, `None` when closed or misconfigured.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        if self.is_closed {
            return None;
        }
        let open = parse_hhmm(self.open.as_deref()?).ok()?;
        let close = parse_hhmm(self.close.as_deref()?).ok()?;
        (close > open).then_some((open, close))
    }
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn parse_hhmm(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 || parts[0].len() != 2 || parts[1].len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}

/// A whole-day closure. Without `end_date` only `start_date` is closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Blackout {
    pub id: String,
    pub business_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub reason: String,
}

impl Blackout {
    pub fn last_day(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.last_day()
    }
}
