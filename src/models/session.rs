use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    Service,
    Date,
    Time,
    Name,
    Phone,
    Confirm,
    Complete,
}

impl BookingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStep::Service => "service",
            BookingStep::Date => "date",
            BookingStep::Time => "time",
            BookingStep::Name => "name",
            BookingStep::Phone => "phone",
            BookingStep::Confirm => "confirm",
            BookingStep::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "date" => BookingStep::Date,
            "time" => BookingStep::Time,
            "name" => BookingStep::Name,
            "phone" => BookingStep::Phone,
            "confirm" => BookingStep::Confirm,
            "complete" => BookingStep::Complete,
            _ => BookingStep::Service,
        }
    }

    /// Prompt used when a turn ends on this step without a more specific message.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            BookingStep::Service => "Which service would you like to book?",
            BookingStep::Date => "When would you like to book?",
            BookingStep::Time => "What time would you prefer?",
            BookingStep::Name => "What's your name?",
            BookingStep::Phone => "What's your phone number?",
            BookingStep::Confirm | BookingStep::Complete => {
                "Please provide the required information."
            }
        }
    }
}

/// Booking fields collected so far in a dialog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingSlot {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Requested or chosen time of day, as displayed to the customer.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

type FieldCheck = fn(&BookingSlot) -> bool;

fn has_service(slot: &BookingSlot) -> bool {
    slot.service_id.is_some()
}

fn has_date(slot: &BookingSlot) -> bool {
    slot.date.is_some()
}

fn has_time(slot: &BookingSlot) -> bool {
    slot.start.is_some()
}

fn has_name(slot: &BookingSlot) -> bool {
    slot.customer_name.is_some()
}

fn has_phone(slot: &BookingSlot) -> bool {
    slot.customer_phone.is_some()
}

/// Collection order: the first step whose field is missing is the next step.
const FIELD_LADDER: [(BookingStep, FieldCheck); 5] = [
    (BookingStep::Service, has_service),
    (BookingStep::Date, has_date),
    (BookingStep::Time, has_time),
    (BookingStep::Name, has_name),
    (BookingStep::Phone, has_phone),
];

pub fn next_step(slot: &BookingSlot) -> BookingStep {
    for (step, is_filled) in FIELD_LADDER {
        if !is_filled(slot) {
            return step;
        }
    }
    if slot.confirmed {
        BookingStep::Complete
    } else {
        BookingStep::Confirm
    }
}

impl BookingSlot {
    /// Choosing a different service invalidates the chosen time, whose length depends on it.
    pub fn set_service(&mut self, id: String, name: String) {
        if self.service_id.as_deref() != Some(id.as_str()) {
            self.clear_time();
        }
        self.service_id = Some(id);
        self.service_name = Some(name);
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        if self.date != Some(date) {
            self.clear_time();
        }
        self.date = Some(date);
    }

    pub fn set_time(&mut self, start: NaiveDateTime, end: NaiveDateTime, label: String) {
        self.start = Some(start);
        self.end = Some(end);
        self.time = Some(label);
    }

    pub fn clear_time(&mut self) {
        self.time = None;
        self.start = None;
        self.end = None;
        self.confirmed = false;
    }

    pub fn clear_date(&mut self) {
        self.date = None;
        self.clear_time();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub business_id: String,
    pub thread_id: String,
    pub step: BookingStep,
    pub slot: BookingSlot,
    pub updated_at: NaiveDateTime,
}

impl ConversationSession {
    pub fn new(business_id: &str, thread_id: &str, now: NaiveDateTime) -> Self {
        Self {
            business_id: business_id.to_string(),
            thread_id: thread_id.to_string(),
            step: BookingStep::Service,
            slot: BookingSlot::default(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}
