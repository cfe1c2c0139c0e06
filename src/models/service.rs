use serde::{Deserialize, Serialize};

pub const MIN_DURATION_MIN: i64 = 15;
/// A slot plus its buffer has to fit in one day.
pub const MAX_SLOT_SPAN_MIN: i64 = 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub duration_min: i64,
    pub buffer_min: i64,
    pub enabled: bool,
}

impl Service {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("service name is required");
        }
        if self.duration_min < MIN_DURATION_MIN {
            anyhow::bail!(
                "duration_min must be at least {MIN_DURATION_MIN}, got {}",
                self.duration_min
            );
        }
        if self.buffer_min < 0 {
            anyhow::bail!("buffer_min must not be negative");
        }
        let span = self.duration_min.checked_add(self.buffer_min);
        if span.map_or(true, |span| span > MAX_SLOT_SPAN_MIN) {
            anyhow::bail!(
                "duration_min plus buffer_min must not exceed {MAX_SLOT_SPAN_MIN} minutes"
            );
        }
        Ok(())
    }
}
