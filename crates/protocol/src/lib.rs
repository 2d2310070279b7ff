//! Livefeed stream protocol definitions.
//!
//! Every frame on a stream is one JSON object carrying a string `type`
//! discriminant next to free-form data fields:
//!
//! ```text
//! {"type": "price_update", "price_data": {...}}
//! ```
//!
//! The channel layer routes on `type` only; payload shapes belong to the
//! backend that produces them.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

// ── Constants ────────────────────────────────────────────────────────────────

/// Name of the discriminant field.
pub const TYPE_FIELD: &str = "type";
pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MB

// ── Message kinds ────────────────────────────────────────────────────────────

/// Inbound kinds pushed by the price, investment and tracking backends.
pub mod kinds {
    pub const PRICE_DATA: &str = "price_data";
    pub const PRICE_UPDATE: &str = "price_update";
    pub const SUBSCRIPTION_CONFIRMED: &str = "subscription_confirmed";
    pub const INVESTMENT_DATA: &str = "investment_data";
    pub const INVESTMENTS_DATA: &str = "investments_data";
    pub const PORTFOLIO_DATA: &str = "portfolio_data";
    pub const PORTFOLIO_UPDATE: &str = "portfolio_update";
    pub const TRACKING_DATA: &str = "tracking_data";
    pub const LOCATION_UPDATE: &str = "location_update";
    pub const STATUS_UPDATE: &str = "status_update";
    pub const ERROR: &str = "error";
}

/// Outbound request kinds understood by the backends.
pub mod requests {
    pub const GET_PRICES: &str = "get_prices";
    pub const GET_INVESTMENTS: &str = "get_investments";
    pub const GET_PORTFOLIO: &str = "get_portfolio";
    pub const GET_TRACKING_DATA: &str = "get_tracking_data";
    pub const SUBSCRIBE_ASSET: &str = "subscribe_asset";
}

// ── Stream paths ─────────────────────────────────────────────────────────────

/// Server paths of the known streams.
pub mod streams {
    pub const PRICE_FEEDS: &str = "/ws/price-feeds/";
    pub const ADMIN_DELIVERY_MONITORING: &str = "/ws/admin/delivery-monitoring/";

    pub fn investments(user_id: &str) -> String {
        format!("/ws/investments/{user_id}/")
    }

    pub fn portfolio(user_id: &str) -> String {
        format!("/ws/portfolio/{user_id}/")
    }

    pub fn tracking(tracking_number: &str, tracking_secret: &str) -> String {
        format!("/ws/track/{tracking_number}/{tracking_secret}/")
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope must be a JSON object")]
    NotAnObject,

    #[error("envelope is missing the `type` field")]
    MissingType,

    #[error("envelope `type` must be a string")]
    NonStringType,

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    TooLarge(usize),
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// One message exchanged over a stream.
///
/// `data` never contains the `type` key; it lives in `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Map::new(),
        }
    }

    /// Add a data field. A `type` key is ignored.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != TYPE_FIELD {
            self.data.insert(key, value.into());
        }
        self
    }

    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(EnvelopeError::TooLarge(text.len()));
        }
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.to_object()).to_string()
    }

    /// Flat object form, `type` included.
    pub fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::with_capacity(self.data.len() + 1);
        object.insert(TYPE_FIELD.into(), Value::String(self.kind.clone()));
        for (key, value) in &self.data {
            object.insert(key.clone(), value.clone());
        }
        object
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.kind, self.data)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut data) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        match data.remove(TYPE_FIELD) {
            Some(Value::String(kind)) => Ok(Self { kind, data }),
            Some(_) => Err(EnvelopeError::NonStringType),
            None => Err(EnvelopeError::MissingType),
        }
    }
}

// ── Request builders ─────────────────────────────────────────────────────────

pub fn get_prices() -> Envelope {
    Envelope::new(requests::GET_PRICES)
}

pub fn get_investments() -> Envelope {
    Envelope::new(requests::GET_INVESTMENTS)
}

pub fn get_portfolio() -> Envelope {
    Envelope::new(requests::GET_PORTFOLIO)
}

pub fn get_tracking_data() -> Envelope {
    Envelope::new(requests::GET_TRACKING_DATA)
}

/// Ask the price feed to push updates for one asset class.
pub fn subscribe_asset(asset_type: impl Into<String>) -> Envelope {
    Envelope::new(requests::SUBSCRIBE_ASSET).with("asset_type", asset_type.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parse_splits_type_from_data() {
        let env = Envelope::parse(r#"{"type":"x","value":5}"#).unwrap();
        assert_eq!(env.kind, "x");
        assert_eq!(Value::Object(env.data), json!({"value": 5}));
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert!(matches!(
            Envelope::parse("[1,2]"),
            Err(EnvelopeError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::parse("not json"),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn parse_requires_string_type() {
        assert!(matches!(
            Envelope::parse(r#"{"value":1}"#),
            Err(EnvelopeError::MissingType)
        ));
        assert!(matches!(
            Envelope::parse(r#"{"type":7}"#),
            Err(EnvelopeError::NonStringType)
        ));
    }

    #[test]
    fn parse_rejects_oversized_frames() {
        let padding = "a".repeat(MAX_FRAME_BYTES);
        let text = format!(r#"{{"type":"x","pad":"{padding}"}}"#);
        assert!(matches!(
            Envelope::parse(&text),
            Err(EnvelopeError::TooLarge(_))
        ));
    }

    #[test]
    fn subscribe_asset_serializes_flat() {
        let value: Value = serde_json::from_str(&subscribe_asset("crypto").to_json()).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe_asset", "asset_type": "crypto"})
        );
    }

    #[test]
    fn with_ignores_type_key() {
        let env = get_prices().with("type", "other").with("limit", 10);
        assert_eq!(env.kind, "get_prices");
        assert!(env.get("type").is_none());
        assert_eq!(env.get("limit"), Some(&json!(10)));
    }

    #[test]
    fn serde_derive_matches_wire_form() {
        let wire = json!({"type": "status_update", "status": "in_transit"});
        let env: Envelope = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(env.kind, kinds::STATUS_UPDATE);
        assert_eq!(serde_json::to_value(&env).unwrap(), wire);
    }

    #[test]
    fn stream_paths() {
        assert_eq!(streams::investments("42"), "/ws/investments/42/");
        assert_eq!(streams::portfolio("42"), "/ws/portfolio/42/");
        assert_eq!(streams::tracking("TRK1", "s3cr3t"), "/ws/track/TRK1/s3cr3t/");
    }
}
