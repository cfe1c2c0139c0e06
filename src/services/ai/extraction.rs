use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{BookingSlot, BookingStep, ConversationMessage, ExtractedFields, Service};
use crate::services::ai::{LlmProvider, Message};
use crate::services::parsers;

/// What an extractor gets to look at for one customer message.
pub struct ExtractionContext<'a> {
    pub message: &'a str,
    pub slot: &'a BookingSlot,
    /// Step the dialog is waiting on before this message is applied.
    pub step: BookingStep,
    pub services: &'a [Service],
    /// Earlier messages of the thread, oldest first, excluding `message`.
    pub history: &'a [ConversationMessage],
    pub today: NaiveDate,
}

/// Turns a free-text message into whichever booking fields it mentions.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> anyhow::Result<ExtractedFields>;
}

const SYSTEM_PROMPT: &str = r#"You extract appointment booking details from a customer's chat message.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "service_name": "service the customer asks for, or null",
  "date": "requested date as YYYY-MM-DD, or null",
  "time": "requested time of day as HH:MM (24-hour), or null",
  "customer_name": "the customer's name, or null",
  "customer_phone": "the customer's phone number, or null"
}

Rules:
- Only fill a field when the latest message states it. Never repeat values from the current booking state.
- Resolve relative dates ("tomorrow", "next Friday") against today's date given below.
- service_name must be one of the offered services when the customer names one.
- If nothing is mentioned, return every field as null.
"#;

pub struct LlmFieldExtractor {
    llm: Box<dyn LlmProvider>,
}

impl LlmFieldExtractor {
    pub fn new(llm: Box<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

fn booking_context(ctx: &ExtractionContext<'_>) -> String {
    let services = ctx
        .services
        .iter()
        .map(|s| format!("- {} ({} minutes)", s.name, s.duration_min))
        .collect::<Vec<_>>()
        .join("\n");
    let state = serde_json::to_string(ctx.slot).unwrap_or_else(|_| "{}".to_string());

    format!(
        "Today's date: {} ({})\nWaiting for: {}\nOffered services:\n{}\nCurrent booking state: {}",
        ctx.today.format("%Y-%m-%d"),
        ctx.today.format("%A"),
        ctx.step.as_str(),
        if services.is_empty() { "- none".to_string() } else { services },
        state,
    )
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> anyhow::Result<ExtractedFields> {
        let mut messages: Vec<Message> = ctx
            .history
            .iter()
            .map(|m| Message {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        messages.push(Message {
            role: "user".to_string(),
            content: ctx.message.to_string(),
        });

        let system = format!("{SYSTEM_PROMPT}\n{}", booking_context(ctx));
        let response = self.llm.chat(&system, &messages).await?;

        parse_fields_response(&response)
    }
}

/// Accepts bare JSON, fenced JSON, or JSON embedded in prose.
pub fn parse_fields_response(response: &str) -> anyhow::Result<ExtractedFields> {
    if let Ok(fields) = serde_json::from_str::<ExtractedFields>(response) {
        return Ok(fields.normalized());
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(fields) = serde_json::from_str::<ExtractedFields>(cleaned) {
        return Ok(fields.normalized());
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(fields) = serde_json::from_str::<ExtractedFields>(&cleaned[start..=end]) {
                return Ok(fields.normalized());
            }
        }
    }

    anyhow::bail!("no booking fields JSON in model response")
}

/// Pattern-only extraction, usable without any model.
pub struct RuleBasedExtractor;

#[async_trait]
impl FieldExtractor for RuleBasedExtractor {
    async fn extract(&self, ctx: &ExtractionContext<'_>) -> anyhow::Result<ExtractedFields> {
        let message = ctx.message;

        let service_name = parsers::parse_service_choice(message, ctx.services).map(|s| s.name.clone());
        let date = parsers::parse_date(message, ctx.today).map(|d| d.format("%Y-%m-%d").to_string());
        let time = parsers::parse_time(message).map(|t| t.format("%H:%M").to_string());
        let customer_name = parsers::parse_name(message);
        // Dates and times also look like digit groups, so phones are only read when asked for.
        let customer_phone = if ctx.step == BookingStep::Phone {
            parsers::parse_phone(message)
        } else {
            None
        };

        Ok(ExtractedFields {
            // A bare list number only means a service while one is being chosen.
            service_name: service_name.filter(|_| {
                ctx.step == BookingStep::Service || !message.trim().chars().all(|c| c.is_ascii_digit())
            }),
            date,
            time,
            customer_name,
            customer_phone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 17).unwrap()
    }

    fn services() -> Vec<Service> {
        vec![Service {
            id: "svc-1".to_string(),
            business_id: "biz".to_string(),
            name: "Haircut".to_string(),
            duration_min: 30,
            buffer_min: 0,
            enabled: true,
        }]
    }

    struct CannedLlm(String);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
            assert!(system_prompt.contains("Today's date: 2030-06-17"));
            assert_eq!(messages.last().map(|m| m.role.as_str()), Some("user"));
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"service_name":"Haircut","date":"2030-06-18","time":"14:00","customer_name":null,"customer_phone":null}"#;
        let fields = parse_fields_response(json).unwrap();
        assert_eq!(fields.service_name.as_deref(), Some("Haircut"));
        assert_eq!(fields.time.as_deref(), Some("14:00"));
        assert!(fields.customer_name.is_none());
    }

    #[test]
    fn test_parse_markdown_fenced_json() {
        let json = "```json\n{\"date\":\"2030-06-18\",\"customer_name\":\"null\"}\n```";
        let fields = parse_fields_response(json).unwrap();
        assert_eq!(fields.date.as_deref(), Some("2030-06-18"));
        assert!(fields.customer_name.is_none());
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let raw = "Sure! Here you go: {\"customerName\": \"Ada\"} Let me know.";
        let fields = parse_fields_response(raw).unwrap();
        assert_eq!(fields.customer_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_parse_garbage_is_an_error() {
        assert!(parse_fields_response("I don't understand").is_err());
    }

    #[tokio::test]
    async fn test_llm_extractor_passes_context_and_parses() {
        let extractor = LlmFieldExtractor::new(Box::new(CannedLlm(
            r#"{"time":"15:30"}"#.to_string(),
        )));
        let slot = BookingSlot::default();
        let services = services();
        let ctx = ExtractionContext {
            message: "half three please",
            slot: &slot,
            step: BookingStep::Time,
            services: &services,
            history: &[],
            today: today(),
        };
        let fields = extractor.extract(&ctx).await.unwrap();
        assert_eq!(fields.time.as_deref(), Some("15:30"));
    }

    #[tokio::test]
    async fn test_rule_based_extractor_reads_patterns() {
        let slot = BookingSlot::default();
        let services = services();
        let ctx = ExtractionContext {
            message: "A haircut tomorrow at 3pm, my name is Ada Lovelace",
            slot: &slot,
            step: BookingStep::Service,
            services: &services,
            history: &[],
            today: today(),
        };
        let fields = RuleBasedExtractor.extract(&ctx).await.unwrap();
        assert_eq!(fields.service_name.as_deref(), Some("Haircut"));
        assert_eq!(fields.date.as_deref(), Some("2030-06-18"));
        assert_eq!(fields.time.as_deref(), Some("15:00"));
        assert_eq!(fields.customer_name.as_deref(), Some("Ada Lovelace"));
        assert!(fields.customer_phone.is_none());
    }

    #[tokio::test]
    async fn test_rule_based_extractor_reads_phone_only_when_asked() {
        let slot = BookingSlot::default();
        let services = services();
        let mut ctx = ExtractionContext {
            message: "555 123 4567",
            slot: &slot,
            step: BookingStep::Name,
            services: &services,
            history: &[],
            today: today(),
        };
        assert!(RuleBasedExtractor.extract(&ctx).await.unwrap().customer_phone.is_none());

        ctx.step = BookingStep::Phone;
        let fields = RuleBasedExtractor.extract(&ctx).await.unwrap();
        assert_eq!(fields.customer_phone.as_deref(), Some("5551234567"));
    }
}
