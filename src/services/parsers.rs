//! Deterministic extractors for booking fields. No model involved: every function
//! here is a pure function of its input text (and `today` for relative dates).

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Service;

static RELATIVE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(today|tomorrow|next week|next (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b").unwrap()
});
static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b").unwrap()
});
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static TIME_MERIDIEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*([ap])\.?m\b\.?").unwrap());
static TIME_24H: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap());
static HOUR_MERIDIEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])\.?m\b\.?").unwrap());

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:my name is|i['’]m|i am|call me|this is)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)")
        .unwrap()
});
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\+?\d{1,4}[\s-]?\(?\d{1,4}\)?[\s-]?\d{1,4}[\s-]?\d{1,4}[\s-]?\d{1,9})").unwrap()
});
static AFFIRMATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(yes|confirm|ok|sure|proceed)\b").unwrap());
static LIST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:number|option|#)?\s*(\d{1,2})\s*[.)]?\s*$").unwrap());

const MIN_PHONE_DIGITS: usize = 7;

pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = RELATIVE_DATE.captures(text) {
        let phrase = caps[1].to_lowercase();
        return match phrase.as_str() {
            "today" => Some(today),
            "tomorrow" => today.succ_opt(),
            "next week" => Some(today + Duration::days(7)),
            other => {
                let weekday: Weekday = other.trim_start_matches("next ").parse().ok()?;
                Some(next_weekday(today, weekday))
            }
        };
    }

    if let Some(caps) = MONTH_DAY.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
        return match this_year {
            Some(date) if date >= today => Some(date),
            _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
        };
    }

    if let Some(caps) = SLASH_DATE.captures(text) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        // Day first, month first when that reading is impossible.
        return NaiveDate::from_ymd_opt(year, second, first)
            .or_else(|| NaiveDate::from_ymd_opt(year, first, second));
    }

    if let Some(caps) = ISO_DATE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_sunday() + 7 - today.weekday().num_days_from_sunday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(ahead as i64)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match &name.to_lowercase()[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = TIME_MERIDIEM.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return to_24h(hour, minute, &caps[3]);
    }

    if let Some(caps) = TIME_24H.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    if let Some(caps) = HOUR_MERIDIEM.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        return to_24h(hour, 0, &caps[2]);
    }

    None
}

fn to_24h(hour: u32, minute: u32, meridiem: &str) -> Option<NaiveTime> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("p");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Customer name after an introduction phrase. Name words must be capitalized.
pub fn parse_name(text: &str) -> Option<String> {
    NAME.captures(text).map(|caps| caps[1].to_string())
}

pub fn parse_phone(text: &str) -> Option<String> {
    let candidate = PHONE.captures(text)?[1].to_string();
    let digits = candidate.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < MIN_PHONE_DIGITS {
        return None;
    }
    Some(candidate.chars().filter(|c| !c.is_whitespace()).collect())
}

pub fn is_affirmative(text: &str) -> bool {
    AFFIRMATIVE.is_match(text)
}

/// A reply that is nothing but a number, as in picking an entry of a numbered list.
pub fn parse_list_number(text: &str) -> Option<usize> {
    LIST_NUMBER.captures(text)?[1].parse().ok()
}

/// Service picked by a reply: a 1-based list number, or a mention of a service name.
/// Longer names win so "Kids Haircut" is not read as "Haircut".
pub fn parse_service_choice<'a>(text: &str, services: &'a [Service]) -> Option<&'a Service> {
    if let Some(number) = parse_list_number(text) {
        return number.checked_sub(1).and_then(|i| services.get(i));
    }

    let lower = text.to_lowercase();
    services
        .iter()
        .filter(|s| !s.name.trim().is_empty() && lower.contains(&s.name.to_lowercase()))
        .max_by_key(|s| s.name.len())
}

/// Service for a name reported by an extractor, which may paraphrase the catalog name.
pub fn match_service_name<'a>(name: &str, services: &'a [Service]) -> Option<&'a Service> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    services
        .iter()
        .find(|s| s.name.to_lowercase() == wanted)
        .or_else(|| parse_service_choice(name, services))
        .or_else(|| {
            services
                .iter()
                .find(|s| s.name.to_lowercase().contains(&wanted))
        })
}
