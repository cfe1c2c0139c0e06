use std::ops::ControlFlow;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    next_step, Booking, BookingSlot, BookingStep, ConversationSession, Customer, ExtractedFields,
    NewBooking, Service, SlotSpan, TimeSlot,
};
use crate::services::ai::extraction::ExtractionContext;
use crate::services::{availability, ledger, parsers};
use crate::state::AppState;

const SLOT_WINDOW_DAYS: i64 = 7;
const MAX_LISTED_SLOTS: usize = 10;
const HOUR_TOLERANCE: i64 = 1;
const MINUTE_TOLERANCE: i64 = 30;

const DATE_PROMPT: &str = "When would you like to book? Please provide a date (e.g., 'tomorrow', 'December 25', or 'next Monday').";
const NO_SERVICES: &str = "Sorry, no services are available at the moment.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub message: String,
    pub step: BookingStep,
    pub requires_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_created: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_slots: Option<Vec<SlotSpan>>,
}

enum Outcome {
    Prompt {
        step: BookingStep,
        message: String,
        slots: Option<Vec<SlotSpan>>,
    },
    Booked(Booking),
}

fn prompt(step: BookingStep, message: impl Into<String>) -> Outcome {
    Outcome::Prompt {
        step,
        message: message.into(),
        slots: None,
    }
}

/// Handlers either resolve their field and let the turn move on, or stop it with a reply.
type StepFlow = ControlFlow<Outcome>;

pub async fn process_turn(
    state: &AppState,
    business_id: &str,
    message: &str,
    thread_id: &str,
) -> Result<TurnResult, AppError> {
    process_turn_at(state, business_id, message, thread_id, Local::now().naive_local()).await
}

/// One customer message against the (business, thread) dialog, evaluated at `now`
/// in the business's local time.
pub async fn process_turn_at(
    state: &AppState,
    business_id: &str,
    message: &str,
    thread_id: &str,
    now: NaiveDateTime,
) -> Result<TurnResult, AppError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("message is required".to_string()));
    }
    if thread_id.trim().is_empty() {
        return Err(AppError::Validation("thread_id is required".to_string()));
    }

    let _turn_lock = state.thread_locks.acquire(business_id, thread_id).await;

    let (mut session, services, history) = {
        let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
        let history =
            queries::get_recent_messages(&db, business_id, thread_id, state.config.history_limit)?;
        record_message(&db, business_id, thread_id, "user", message);
        let session = queries::get_session(&db, business_id, thread_id)?
            .unwrap_or_else(|| ConversationSession::new(business_id, thread_id, now));
        let services = queries::list_services(&db, business_id, true)?;
        (session, services, history)
    };

    let today = now.date();
    let waiting_on = next_step(&session.slot);

    tracing::info!(
        business_id,
        thread_id,
        step = session.step.as_str(),
        waiting_on = waiting_on.as_str(),
        "processing turn"
    );

    let ctx = ExtractionContext {
        message,
        slot: &session.slot,
        step: waiting_on,
        services: &services,
        history: &history,
        today,
    };
    let fields = extract_fields(state, &ctx).await;

    let mut turn = Turn {
        state,
        business_id,
        thread_id,
        message,
        now,
        today,
        services: &services,
        waiting_on,
        resumed_at_confirm: session.step == BookingStep::Confirm,
        requested_time: None,
        notices: vec![],
    };
    turn.merge(&mut session.slot, fields);
    let outcome = turn.advance(&mut session.slot)?;

    match outcome {
        Outcome::Booked(booking) => {
            let reply = format!(
                "Great! Your booking is confirmed. Booking ID: {}. We'll see you on {} at {}.",
                booking.id,
                format_date(booking.start.date()),
                format_time(booking.start.time()),
            );
            {
                let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
                queries::delete_session(&db, business_id, thread_id)?;
                record_message(&db, business_id, thread_id, "assistant", &reply);
            }

            tracing::info!(business_id, thread_id, booking_id = %booking.id, "dialog completed");

            Ok(TurnResult {
                message: reply,
                step: BookingStep::Complete,
                requires_input: false,
                booking_created: Some(true),
                booking_id: Some(booking.id),
                available_slots: None,
            })
        }
        Outcome::Prompt {
            step,
            message: prompt,
            slots,
        } => {
            session.step = step;
            session.updated_at = now;
            let reply = turn.with_notices(prompt);
            {
                let db = state.db.lock().unwrap_or_else(|e| e.into_inner());
                queries::save_session(&db, &session)?;
                record_message(&db, business_id, thread_id, "assistant", &reply);
            }

            tracing::debug!(business_id, thread_id, step = step.as_str(), "awaiting input");

            Ok(TurnResult {
                message: reply,
                step,
                requires_input: true,
                booking_created: None,
                booking_id: None,
                available_slots: slots,
            })
        }
    }
}

/// A failed or slow extraction degrades to "nothing extracted"; the pattern
/// parsers still get a look at the raw message.
async fn extract_fields(state: &AppState, ctx: &ExtractionContext<'_>) -> ExtractedFields {
    let timeout = std::time::Duration::from_millis(state.config.extraction_timeout_ms);
    match tokio::time::timeout(timeout, state.extractor.extract(ctx)).await {
        Ok(Ok(fields)) => {
            let fields = fields.normalized();
            if fields.is_empty() {
                tracing::debug!(step = ctx.step.as_str(), "no booking fields extracted");
            }
            fields
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "field extraction failed, continuing without it");
            ExtractedFields::default()
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.config.extraction_timeout_ms,
                "field extraction timed out, continuing without it"
            );
            ExtractedFields::default()
        }
    }
}

fn record_message(conn: &Connection, business_id: &str, thread_id: &str, role: &str, content: &str) {
    if let Err(e) = queries::insert_message(conn, business_id, thread_id, role, content) {
        tracing::warn!(business_id, thread_id, error = %e, "failed to record message");
    }
}

struct Turn<'a> {
    state: &'a AppState,
    business_id: &'a str,
    thread_id: &'a str,
    message: &'a str,
    now: NaiveDateTime,
    today: NaiveDate,
    services: &'a [Service],
    /// Step the dialog was waiting on when the message arrived.
    waiting_on: BookingStep,
    /// The summary was shown last turn, so an affirmative reply confirms it.
    resumed_at_confirm: bool,
    requested_time: Option<NaiveTime>,
    notices: Vec<String>,
}

impl<'a> Turn<'a> {
    fn notice(&mut self, text: String) {
        if !self.notices.contains(&text) {
            self.notices.push(text);
        }
    }

    fn with_notices(&self, prompt: String) -> String {
        if self.notices.is_empty() {
            prompt
        } else {
            format!("{}\n\n{}", self.notices.join(" "), prompt)
        }
    }

    /// Applies extracted fields. Changing the service or date drops the chosen time.
    fn merge(&mut self, slot: &mut BookingSlot, fields: ExtractedFields) {
        if let Some(id) = slot.service_id.clone() {
            if !self.services.iter().any(|s| s.id == id) {
                tracing::info!(business_id = self.business_id, service_id = %id, "selected service no longer offered");
                slot.service_id = None;
                slot.service_name = None;
                slot.clear_time();
            }
        }

        if let Some(name) = fields.service_name.as_deref() {
            match parsers::match_service_name(name, self.services) {
                Some(service) => slot.set_service(service.id.clone(), service.name.clone()),
                None => tracing::debug!(service = name, "extracted service not in catalog"),
            }
        }

        if let Some(raw) = fields.date.as_deref() {
            match parsers::parse_date(raw, self.today) {
                Some(date) if date < self.today => self.notice(past_date_notice(date)),
                Some(date) => slot.set_date(date),
                None => tracing::debug!(date = raw, "unreadable extracted date"),
            }
        }

        self.requested_time = fields
            .time
            .as_deref()
            .and_then(parsers::parse_time)
            .or_else(|| parsers::parse_time(self.message));
        if let Some(time) = self.requested_time {
            if slot.start.map(|s| s.time()) != Some(time) {
                slot.clear_time();
                slot.time = Some(time.format("%H:%M").to_string());
            }
        }

        if let Some(name) = fields.customer_name {
            slot.customer_name = Some(name);
        }
        if let Some(phone) = fields.customer_phone.as_deref().and_then(parsers::parse_phone) {
            slot.customer_phone = Some(phone);
        }
    }

    fn advance(&mut self, slot: &mut BookingSlot) -> Result<Outcome, AppError> {
        loop {
            let flow = match next_step(slot) {
                BookingStep::Service => self.choose_service(slot),
                BookingStep::Date => self.choose_date(slot),
                BookingStep::Time => self.choose_time(slot)?,
                BookingStep::Name => self.take_name(slot),
                BookingStep::Phone => self.take_phone(slot),
                BookingStep::Confirm => self.confirm(slot)?,
                BookingStep::Complete => return self.complete(slot).map(Outcome::Booked),
            };
            if let ControlFlow::Break(outcome) = flow {
                return Ok(outcome);
            }
        }
    }

    fn choose_service(&mut self, slot: &mut BookingSlot) -> StepFlow {
        let choice = match self.services {
            [] => return ControlFlow::Break(prompt(BookingStep::Service, NO_SERVICES)),
            [only] => Some(only),
            services => parsers::parse_service_choice(self.message, services),
        };

        match choice {
            Some(service) => {
                slot.set_service(service.id.clone(), service.name.clone());
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(prompt(BookingStep::Service, service_menu(self.services))),
        }
    }

    fn choose_date(&mut self, slot: &mut BookingSlot) -> StepFlow {
        match parsers::parse_date(self.message, self.today) {
            Some(date) if date < self.today => {
                self.notice(past_date_notice(date));
                ControlFlow::Break(prompt(BookingStep::Date, DATE_PROMPT))
            }
            Some(date) => {
                slot.set_date(date);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(prompt(BookingStep::Date, DATE_PROMPT)),
        }
    }

    fn choose_time(&mut self, slot: &mut BookingSlot) -> Result<StepFlow, AppError> {
        let Some(date) = slot.date else {
            return Ok(ControlFlow::Break(prompt(BookingStep::Date, DATE_PROMPT)));
        };
        let services = self.services;
        let Some(service) = services
            .iter()
            .find(|s| slot.service_id.as_deref() == Some(s.id.as_str()))
        else {
            slot.service_id = None;
            slot.service_name = None;
            return Ok(ControlFlow::Continue(()));
        };

        let window_end = date + Duration::days(SLOT_WINDOW_DAYS - 1);
        let available: Vec<TimeSlot> = {
            let db = self.state.db.lock().unwrap_or_else(|e| e.into_inner());
            availability::load_slots(&db, service, date, window_end)?
        }
        .into_iter()
        .filter(|s| s.available && s.start > self.now)
        .collect();

        let on_date: Vec<&TimeSlot> = available.iter().filter(|s| s.start.date() == date).collect();
        if on_date.is_empty() {
            slot.clear_date();
            return Ok(ControlFlow::Break(prompt(
                BookingStep::Date,
                format!(
                    "Sorry, there are no available slots on {}. Would you like to choose a different date?",
                    format_date(date)
                ),
            )));
        }

        let listed: Vec<&TimeSlot> = available.iter().take(MAX_LISTED_SLOTS).collect();

        if self.waiting_on == BookingStep::Time {
            if let Some(picked) = parsers::parse_list_number(self.message)
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| listed.get(i))
            {
                slot.set_date(picked.start.date());
                slot.set_time(picked.start, picked.end, format_time(picked.start.time()));
                return Ok(ControlFlow::Continue(()));
            }
        }

        let requested = self
            .requested_time
            .or_else(|| slot.time.as_deref().and_then(parsers::parse_time));
        if let Some(wanted) = requested {
            if let Some(best) = closest_slot(&on_date, wanted) {
                slot.set_time(best.start, best.end, format_time(best.start.time()));
                return Ok(ControlFlow::Continue(()));
            }
            self.notice(format!(
                "Sorry, {} isn't available on {}.",
                format_time(wanted),
                format_date(date)
            ));
            slot.time = None;
            self.requested_time = None;
        }

        Ok(ControlFlow::Break(Outcome::Prompt {
            step: BookingStep::Time,
            message: time_menu(&listed),
            slots: Some(listed.iter().map(|s| s.span()).collect()),
        }))
    }

    fn take_name(&mut self, slot: &mut BookingSlot) -> StepFlow {
        match parsers::parse_name(self.message) {
            Some(name) => {
                slot.customer_name = Some(name);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(prompt(BookingStep::Name, BookingStep::Name.default_prompt())),
        }
    }

    fn take_phone(&mut self, slot: &mut BookingSlot) -> StepFlow {
        // Dates also look like digit groups; only read a phone when one was asked for.
        let phone = (self.waiting_on == BookingStep::Phone)
            .then(|| parsers::parse_phone(self.message))
            .flatten();
        match phone {
            Some(phone) => {
                slot.customer_phone = Some(phone);
                ControlFlow::Continue(())
            }
            None => ControlFlow::Break(prompt(BookingStep::Phone, BookingStep::Phone.default_prompt())),
        }
    }

    fn confirm(&mut self, slot: &mut BookingSlot) -> Result<StepFlow, AppError> {
        let (Some(service_id), Some(start), Some(end)) =
            (slot.service_id.clone(), slot.start, slot.end)
        else {
            slot.clear_time();
            return Ok(ControlFlow::Continue(()));
        };

        if start <= self.now {
            self.notice("Sorry, that time has already passed.".to_string());
            slot.clear_time();
            self.requested_time = None;
            return Ok(ControlFlow::Continue(()));
        }

        if self.resumed_at_confirm && parsers::is_affirmative(self.message) {
            slot.confirmed = true;
            return Ok(ControlFlow::Continue(()));
        }

        let still_free = {
            let db = self.state.db.lock().unwrap_or_else(|e| e.into_inner());
            availability::is_slot_available(&db, self.business_id, &service_id, &start, &end)?
        };
        if !still_free {
            tracing::info!(business_id = self.business_id, start = %start, "chosen slot was taken before confirmation");
            self.notice("Sorry, that time has just been booked by someone else.".to_string());
            slot.clear_time();
            self.requested_time = None;
            return Ok(ControlFlow::Continue(()));
        }

        Ok(ControlFlow::Break(prompt(BookingStep::Confirm, summary(slot))))
    }

    fn complete(&self, slot: &BookingSlot) -> Result<Booking, AppError> {
        let (Some(service_id), Some(start), Some(end), Some(name), Some(phone)) = (
            slot.service_id.clone(),
            slot.start,
            slot.end,
            slot.customer_name.clone(),
            slot.customer_phone.clone(),
        ) else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "booking slot incomplete at completion"
            )));
        };

        let mut db = self.state.db.lock().unwrap_or_else(|e| e.into_inner());
        ledger::create_booking(
            &mut db,
            NewBooking {
                business_id: self.business_id.to_string(),
                service_id,
                start,
                end,
                customer: Customer { name, phone },
                thread_id: Some(self.thread_id.to_string()),
            },
        )
    }
}

/// Closest slot within tolerance of the wanted time; earlier slots win ties.
fn closest_slot<'s>(slots: &[&'s TimeSlot], wanted: NaiveTime) -> Option<&'s TimeSlot> {
    let mut best: Option<(&TimeSlot, i64)> = None;
    for &slot in slots {
        let start = slot.start.time();
        let hour_diff = (start.hour() as i64 - wanted.hour() as i64).abs();
        let minute_diff = (start.minute() as i64 - wanted.minute() as i64).abs();
        if hour_diff > HOUR_TOLERANCE || minute_diff > MINUTE_TOLERANCE {
            continue;
        }
        let distance = (start - wanted).num_minutes().abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((slot, distance));
        }
    }
    best.map(|(slot, _)| slot)
}

fn past_date_notice(date: NaiveDate) -> String {
    format!("{} has already passed.", format_date(date))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

fn format_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

fn service_menu(services: &[Service]) -> String {
    let list = services
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {} ({} minutes)", i + 1, s.name, s.duration_min))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Which service would you like to book?\n\n{list}\n\nPlease reply with the service name or number.")
}

fn time_menu(slots: &[&TimeSlot]) -> String {
    let list = slots
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}. {} at {}",
                i + 1,
                s.start.format("%a, %b %-d"),
                format_time(s.start.time())
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Here are available time slots:\n\n{list}\n\nPlease choose a time.")
}

fn summary(slot: &BookingSlot) -> String {
    let or_blank = |v: &Option<String>| v.clone().unwrap_or_default();
    format!(
        "Please confirm your booking:\n\nService: {}\nDate: {}\nTime: {}\nName: {}\nPhone: {}\n\nReply \"yes\" or \"confirm\" to complete the booking.",
        or_blank(&slot.service_name),
        slot.date.map(format_date).unwrap_or_default(),
        or_blank(&slot.time),
        or_blank(&slot.customer_name),
        or_blank(&slot.customer_phone),
    )
}
