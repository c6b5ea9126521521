use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::repo_types::{Item, Receipt};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// A receipt as the model extracted it, after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptData {
    pub merchant: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub items: Vec<ItemData>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemData {
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub id: Uuid,
    pub filename: String,
    pub merchant: String,
    #[serde(with = "iso_date::option")]
    pub date: Option<Date>,
    pub total: f64,
    pub items: Vec<ItemData>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ReceiptResponse {
    pub fn from_parts(receipt: Receipt, items: Vec<Item>) -> Self {
        Self {
            id: receipt.id,
            filename: receipt.filename,
            merchant: receipt.merchant,
            date: receipt.date,
            total: receipt.total,
            items: items
                .into_iter()
                .map(|i| ItemData {
                    name: i.name,
                    quantity: i.quantity,
                    price: i.price,
                })
                .collect(),
            created_at: receipt.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn receipt_data_uses_iso_dates() {
        let data = ReceiptData {
            merchant: "ACME".into(),
            date: time::macros::date!(2024 - 03 - 09),
            items: vec![ItemData {
                name: "Milk".into(),
                quantity: 2,
                price: 1.25,
            }],
            total: 2.5,
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "merchant": "ACME",
                "date": "2024-03-09",
                "items": [{"name": "Milk", "quantity": 2, "price": 1.25}],
                "total": 2.5
            })
        );
    }

    #[test]
    fn response_nests_items_and_formats_timestamps() {
        let receipt_id = Uuid::new_v4();
        let receipt = Receipt {
            id: receipt_id,
            user_id: Uuid::new_v4(),
            filename: "r.jpg".into(),
            merchant: "ACME".into(),
            date: None,
            total: 3.0,
            raw_ocr_text: "ACME 3.00".into(),
            created_at: time::macros::datetime!(2024-03-09 12:30 UTC),
        };
        let items = vec![Item {
            receipt_id,
            position: 0,
            name: "Bread".into(),
            quantity: 1,
            price: 3.0,
        }];

        let v = serde_json::to_value(ReceiptResponse::from_parts(receipt, items)).unwrap();
        assert_eq!(v["id"], json!(receipt_id.to_string()));
        assert_eq!(v["date"], json!(null));
        assert_eq!(v["created_at"], json!("2024-03-09T12:30:00Z"));
        assert_eq!(v["items"], json!([{"name": "Bread", "quantity": 1, "price": 3.0}]));
        assert!(v.get("raw_ocr_text").is_none());
    }
}
