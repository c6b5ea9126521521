use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Receipt record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub merchant: String,
    pub date: Option<Date>,
    pub total: f64,
    pub raw_ocr_text: String,
    pub created_at: OffsetDateTime,
}

/// Line item belonging to exactly one receipt.
#[derive(Debug, Clone, FromRow)]
pub struct Item {
    pub receipt_id: Uuid,
    pub position: i32, // index in the extracted list
    pub name: String,
    pub quantity: i32,
    pub price: f64,
}
