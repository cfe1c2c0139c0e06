use serde::{Deserialize, Serialize};

/// Partial booking fields pulled out of one customer message. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFields {
    #[serde(default, alias = "serviceName")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, alias = "customerName")]
    pub customer_name: Option<String>,
    #[serde(default, alias = "customerPhone")]
    pub customer_phone: Option<String>,
}

impl ExtractedFields {
    /// Drops blank strings and the literal "null" some models emit instead of JSON null.
    pub fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        }
        Self {
            service_name: clean(self.service_name),
            date: clean(self.date),
            time: clean(self.time),
            customer_name: clean(self.customer_name),
            customer_phone: clean(self.customer_phone),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.customer_name.is_none()
            && self.customer_phone.is_none()
    }
}
