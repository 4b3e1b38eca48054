use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::errors::DomainError;
use crate::order::{Item, Order};

/// What to do with a `date_created` that is not valid RFC-3339.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateCreatedPolicy {
    /// Substitute the processing time and accept the message.
    #[default]
    ProcessingTime,
    /// Reject the message with a validation error.
    Reject,
}

impl FromStr for DateCreatedPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing_time" | "now" => Ok(DateCreatedPolicy::ProcessingTime),
            "reject" => Ok(DateCreatedPolicy::Reject),
            other => Err(DomainError::ValidationError(format!(
                "unknown date_created policy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DateCreatedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateCreatedPolicy::ProcessingTime => write!(f, "processing_time"),
            DateCreatedPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Order payload as published on the stream.
///
/// Every field except `order_uid` is optional on the wire and decodes to its
/// zero value when absent or `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrderMessage {
    #[validate(length(min = 1, message = "order_uid must not be empty"))]
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery: DeliveryMessage,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: PaymentMessage,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<ItemMessage>,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(deserialize_with = "null_as_default")]
    pub shardkey: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sm_id: i32,
    /// RFC-3339 text.
    #[serde(deserialize_with = "null_as_default")]
    pub date_created: String,
    #[serde(deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentMessage {
    #[serde(deserialize_with = "null_as_default")]
    pub transaction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i32,
    /// Seconds since the Unix epoch.
    #[serde(deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_cost: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub goods_total: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fee: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMessage {
    /// Ignored: items always take their parent's `order_uid`.
    #[serde(deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sale: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i32,
}

/// Decode `null` the same way as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl OrderMessage {
    /// Decode a raw stream payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DomainError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// `date_created` as UTC, if it is valid RFC-3339.
    pub fn parse_date_created(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.date_created.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Translate into the canonical [`Order`] with the default date policy.
    pub fn into_order(self, now: DateTime<Utc>) -> Result<Order, DomainError> {
        self.into_order_with_policy(now, DateCreatedPolicy::default())
    }

    /// Translate into the canonical [`Order`].
    ///
    /// `now` is only used when `date_created` cannot be parsed and the policy
    /// allows substitution.
    pub fn into_order_with_policy(
        self,
        now: DateTime<Utc>,
        policy: DateCreatedPolicy,
    ) -> Result<Order, DomainError> {
        self.validate()?;

        let payment_dt = DateTime::from_timestamp(self.payment.payment_dt, 0).ok_or_else(|| {
            DomainError::ValidationError(format!(
                "payment_dt out of range: {}",
                self.payment.payment_dt
            ))
        })?;

        let date_created = match (self.parse_date_created(), policy) {
            (Some(parsed), _) => parsed,
            (None, DateCreatedPolicy::ProcessingTime) => now,
            (None, DateCreatedPolicy::Reject) => {
                return Err(DomainError::ValidationError(format!(
                    "date_created is not RFC-3339: {:?}",
                    self.date_created
                )))
            }
        };

        let order_uid = self.order_uid;
        let items = self
            .items
            .into_iter()
            .map(|item| Item {
                id: None,
                order_uid: order_uid.clone(),
                chrt_id: item.chrt_id,
                track_number: item.track_number,
                price: item.price,
                rid: item.rid,
                name: item.name,
                sale: item.sale,
                size: item.size,
                total_price: item.total_price,
                nm_id: item.nm_id,
                brand: item.brand,
                status: item.status,
                created_at: None,
            })
            .collect();

        Ok(Order {
            id: None,
            order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery_name: self.delivery.name,
            delivery_phone: self.delivery.phone,
            delivery_zip: self.delivery.zip,
            delivery_city: self.delivery.city,
            delivery_address: self.delivery.address,
            delivery_region: self.delivery.region,
            delivery_email: self.delivery.email,
            payment_transaction: self.payment.transaction,
            payment_request_id: self.payment.request_id,
            payment_currency: self.payment.currency,
            payment_provider: self.payment.provider,
            payment_amount: self.payment.amount,
            payment_dt,
            payment_bank: self.payment.bank,
            delivery_cost: self.payment.delivery_cost,
            goods_total: self.payment.goods_total,
            custom_fee: self.payment.custom_fee,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created,
            oof_shard: self.oof_shard,
            created_at: None,
            updated_at: None,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_payload() -> serde_json::Value {
        json!({
            "order_uid": "A1",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "A1",
                "request_id": "",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1700000000,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [{
                "chrt_id": 1,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }],
            "locale": "en",
            "internal_signature": "",
            "customer_id": "test",
            "delivery_service": "meest",
            "shardkey": "9",
            "sm_id": 99,
            "date_created": "2023-11-15T10:00:00Z",
            "oof_shard": "1"
        })
    }

    fn decode(value: serde_json::Value) -> OrderMessage {
        OrderMessage::from_slice(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_translation_normalizes_timestamps() {
        let now = Utc::now();
        let order = decode(sample_payload()).into_order(now).unwrap();

        assert_eq!(order.order_uid, "A1");
        assert_eq!(order.payment_dt, Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap());
        assert_eq!(order.payment_dt.timestamp(), 1_700_000_000);
        assert_eq!(order.date_created, Utc.with_ymd_and_hms(2023, 11, 15, 10, 0, 0).unwrap());
        assert_eq!(order.delivery_city, "Kiryat Mozkin");
        assert_eq!(order.payment_amount, 1817);
        assert_eq!(order.goods_total, 317);
        assert_eq!(order.sm_id, 99);
        assert!(order.id.is_none());
        assert!(order.created_at.is_none());
    }

    #[test]
    fn test_date_created_with_offset_is_converted_to_utc() {
        let mut payload = sample_payload();
        payload["date_created"] = json!("2021-11-26T09:22:19+03:00");

        let order = decode(payload).into_order(Utc::now()).unwrap();
        assert_eq!(order.date_created, Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap());
    }

    #[test]
    fn test_unparseable_date_created_falls_back_to_now() {
        let mut payload = sample_payload();
        payload["date_created"] = json!("not-a-date");
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).unwrap();

        let message = decode(payload);
        assert!(message.parse_date_created().is_none());

        let order = message.into_order(now).unwrap();
        assert_eq!(order.date_created, now);
    }

    #[test]
    fn test_reject_policy_refuses_unparseable_date() {
        let mut payload = sample_payload();
        payload["date_created"] = json!("yesterday");

        let result = decode(payload).into_order_with_policy(Utc::now(), DateCreatedPolicy::Reject);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_empty_order_uid_is_rejected() {
        let mut payload = sample_payload();
        payload["order_uid"] = json!("");

        let result = decode(payload).into_order(Utc::now());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_missing_order_uid_is_rejected() {
        let mut payload = sample_payload();
        payload.as_object_mut().unwrap().remove("order_uid");

        let result = decode(payload).into_order(Utc::now());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let result = OrderMessage::from_slice(b"{\"order_uid\": ");
        assert!(matches!(result, Err(DomainError::MalformedPayload(_))));
    }

    #[test]
    fn test_items_inherit_parent_order_uid() {
        let mut payload = sample_payload();
        payload["items"][0]["order_uid"] = json!("someone-else");
        payload["items"]
            .as_array_mut()
            .unwrap()
            .push(json!({"chrt_id": 2, "name": "Lipstick"}));

        let order = decode(payload).into_order(Utc::now()).unwrap();
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|item| item.order_uid == "A1"));
        assert_eq!(order.items[1].chrt_id, 2);
        assert_eq!(order.items[1].price, 0);
    }

    #[test]
    fn test_translation_is_deterministic() {
        let now = Utc::now();
        let first = decode(sample_payload()).into_order(now).unwrap();
        let second = decode(sample_payload()).into_order(now).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_payment_dt_out_of_range_is_rejected() {
        let mut payload = sample_payload();
        payload["payment"]["payment_dt"] = json!(i64::MAX);

        let result = decode(payload).into_order(Utc::now());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_date_created_policy_from_str() {
        assert_eq!("processing_time".parse::<DateCreatedPolicy>().unwrap(), DateCreatedPolicy::ProcessingTime);
        assert_eq!("REJECT".parse::<DateCreatedPolicy>().unwrap(), DateCreatedPolicy::Reject);
        assert!("sometimes".parse::<DateCreatedPolicy>().is_err());
    }

    #[test]
    fn test_null_fields_decode_as_zero_values() {
        let mut payload = sample_payload();
        payload["items"] = json!(null);
        payload["internal_signature"] = json!(null);
        payload["sm_id"] = json!(null);
        payload["payment"]["bank"] = json!(null);
        payload["delivery"] = json!(null);

        let message = decode(payload);
        assert!(message.items.is_empty());
        assert_eq!(message.internal_signature, "");
        assert_eq!(message.sm_id, 0);
        assert_eq!(message.payment.bank, "");
        assert_eq!(message.delivery.city, "");

        let order = message.into_order(Utc::now()).unwrap();
        assert_eq!(order.order_uid, "A1");
        assert!(order.items.is_empty());
    }

    #[test]
    fn test_null_order_uid_is_rejected() {
        let mut payload = sample_payload();
        payload["order_uid"] = json!(null);

        let result = decode(payload).into_order(Utc::now());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }
}
