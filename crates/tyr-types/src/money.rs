use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// An exact fixed-point monetary amount, scale 2.
///
/// Wraps [`rust_decimal::Decimal`] so conversion-value arithmetic never goes
/// through floating point. On the wire (Kafka payloads, HTTP JSON) it
/// serializes as a decimal-formatted string; in Postgres it binds straight
/// to `NUMERIC(10,2)` via sqlx's `rust_decimal` feature.
pub type Money = Decimal;

/// Round a `Decimal` to 2 decimal places, matching the `decimal(10,2)` column.
pub fn normalize_scale(value: Money) -> Money {
    value.round_dp(2)
}

/// Deserialize an optional `value` field that may arrive as a JSON number
/// (the intake API's `POST /api/conversions` body, spec.md §6) or as a
/// decimal-formatted string (the Kafka wire payload and any round-trip
/// through `Money`'s own string-based `Serialize`). Kept separate from
/// `Money`'s derive so the HTTP boundary stays permissive without loosening
/// the broker/DB wire format.
pub fn deserialize_money_opt<'de, D>(deserializer: D) -> Result<Option<Money>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(f64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Str(s)) => Money::from_str(&s)
            .map(normalize_scale)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(Raw::Num(n)) => Money::try_from(n)
            .map(normalize_scale)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
