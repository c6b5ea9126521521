use std::collections::HashMap;

use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::dto::ReceiptData;
use super::repo_types::{Item, Receipt};

/// Insert a receipt and all of its items in one transaction.
pub async fn save_receipt(
    db: &PgPool,
    user_id: Uuid,
    filename: &str,
    data: &ReceiptData,
    raw_ocr_text: &str,
) -> anyhow::Result<Receipt> {
    let mut tx = db.begin().await.context("begin tx")?;

    let receipt = sqlx::query_as::<_, Receipt>(
        r#"
        INSERT INTO receipts (id, user_id, filename, merchant, date, total, raw_ocr_text)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, user_id, filename, merchant, date, total, raw_ocr_text, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(filename)
    .bind(&data.merchant)
    .bind(data.date)
    .bind(data.total)
    .bind(raw_ocr_text)
    .fetch_one(&mut *tx)
    .await
    .context("insert receipt")?;

    for (position, item) in data.items.iter().enumerate() {
        insert_item_tx(&mut tx, receipt.id, position as i32, &item.name, item.quantity, item.price)
            .await?;
    }

    tx.commit().await.context("commit tx")?;
    Ok(receipt)
}

async fn insert_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    receipt_id: Uuid,
    position: i32,
    name: &str,
    quantity: i32,
    price: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO items (id, receipt_id, position, name, quantity, price)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(receipt_id)
    .bind(position)
    .bind(name)
    .bind(quantity)
    .bind(price)
    .execute(&mut **tx)
    .await
    .context("insert item")?;
    Ok(())
}

/// All receipts owned by `user_id`, newest first, each with its items.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
) -> anyhow::Result<Vec<(Receipt, Vec<Item>)>> {
    let receipts = sqlx::query_as::<_, Receipt>(
        r#"
        SELECT id, user_id, filename, merchant, date, total, raw_ocr_text, created_at
          FROM receipts
         WHERE user_id = $1
         ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list receipts by user")?;

    if receipts.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = receipts.iter().map(|r| r.id).collect();
    let items = sqlx::query_as::<_, Item>(
        r#"
        SELECT receipt_id, position, name, quantity, price
          FROM items
         WHERE receipt_id = ANY($1)
         ORDER BY receipt_id, position ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(db)
    .await
    .context("list items for receipts")?;

    Ok(group_items(receipts, items))
}

fn group_items(receipts: Vec<Receipt>, items: Vec<Item>) -> Vec<(Receipt, Vec<Item>)> {
    let mut by_receipt: HashMap<Uuid, Vec<Item>> = HashMap::new();
    for item in items {
        by_receipt.entry(item.receipt_id).or_default().push(item);
    }
    receipts
        .into_iter()
        .map(|r| {
            let mut items = by_receipt.remove(&r.id).unwrap_or_default();
            items.sort_by_key(|i| i.position);
            (r, items)
        })
        .collect()
}

/// Delete a receipt and its items if `user_id` owns it.
/// Returns `false` when the receipt is absent or owned by someone else.
pub async fn delete_for_user(db: &PgPool, receipt_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin tx")?;

    let owned = sqlx::query_scalar::<_, Uuid>(
        r#"SELECT id FROM receipts WHERE id = $1 AND user_id = $2 FOR UPDATE"#,
    )
    .bind(receipt_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .context("lookup receipt")?;

    if owned.is_none() {
        return Ok(false);
    }

    sqlx::query(r#"DELETE FROM items WHERE receipt_id = $1"#)
        .bind(receipt_id)
        .execute(&mut *tx)
        .await
        .context("delete items")?;

    sqlx::query(r#"DELETE FROM receipts WHERE id = $1"#)
        .bind(receipt_id)
        .execute(&mut *tx)
        .await
        .context("delete receipt")?;

    tx.commit().await.context("commit tx")?;
    Ok(true)
}
