use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::ReceiptData;
use super::repo;
use super::validation::{apply_date_fallback, validate};
use crate::error::AppResult;
use crate::ocr::is_pdf;
use crate::state::AppState;

/// An uploaded receipt file, fully read into memory.
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// OCR → model → date fallback → schema check. Writes nothing.
pub async fn analyze_upload(state: &AppState, upload: &Upload) -> AppResult<(ReceiptData, String)> {
    let ocr_text = if is_pdf(&upload.filename, upload.content_type.as_deref()) {
        state.ocr.extract_from_pdf(upload.body.clone()).await?
    } else {
        state.ocr.extract_from_image(upload.body.clone()).await?
    };

    let mut raw = state.extractor.extract(&ocr_text).await?;

    if apply_date_fallback(&mut raw, state.config.fallback_date) {
        warn!(fallback = %state.config.fallback_date, "receipt date missing; using fallback");
    }

    let data = validate(&raw).map_err(|e| {
        warn!(error = %e, "model output did not match receipt schema");
        e
    })?;
    Ok((data, ocr_text))
}

/// Run the whole pipeline and persist the receipt with its items.
pub async fn extract_and_store(
    state: &AppState,
    user_id: Uuid,
    upload: Upload,
) -> AppResult<ReceiptData> {
    let (data, ocr_text) = analyze_upload(state, &upload).await?;
    let receipt = repo::save_receipt(&state.db, user_id, &upload.filename, &data, &ocr_text).await?;
    info!(
        receipt_id = %receipt.id,
        user_id = %receipt.user_id,
        items = data.items.len(),
        ocr_chars = receipt.raw_ocr_text.len(),
        "receipt saved"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::extraction::fakes::CannedLlm;
    use crate::extraction::ExtractionError;
    use crate::ocr::fakes::png_bytes;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use time::macros::date;

    fn image_upload() -> Upload {
        Upload {
            filename: "receipt.png".into(),
            content_type: Some("image/png".into()),
            body: png_bytes(),
        }
    }

    #[tokio::test]
    async fn pdf_uploads_take_the_pdf_path() {
        let llm = Arc::new(CannedLlm::replying(
            r#"{"merchant":"ACME","date":"2024-05-01","items":[],"total":1}"#,
        ));
        let state = AppState::fake_with(llm.clone(), 2);
        let upload = Upload {
            filename: "scan.PDF".into(),
            content_type: None,
            body: Bytes::from_static(b"%PDF-1.4"),
        };
        let (_, text) = analyze_upload(&state, &upload).await.unwrap();
        assert_eq!(text, "page 1\npage 2\n");

        let seen = llm.seen.lock().unwrap();
        assert!(seen[0][1].content.contains("page 1\npage 2"));
    }

    #[tokio::test]
    async fn missing_date_gets_fallback() {
        let llm = Arc::new(CannedLlm::replying(
            r#"Here it is: {"merchant":"ACME","items":[{"name":"Tea","quantity":1,"price":2.0}],"total":2.0}"#,
        ));
        let state = AppState::fake_with(llm, 0);
        let (data, text) = analyze_upload(&state, &image_upload()).await.unwrap();
        assert_eq!(data.date, date!(2025 - 08 - 02));
        assert_eq!(data.merchant, "ACME");
        assert_eq!(text, "page 1");
    }

    #[tokio::test]
    async fn reply_without_json_is_a_defined_failure() {
        let state = AppState::fake_with(Arc::new(CannedLlm::replying("Sorry, unreadable.")), 0);
        let err = analyze_upload(&state, &image_upload()).await.unwrap_err();
        assert!(matches!(err, AppError::Extraction(ExtractionError::NoJsonObject)));
    }

    #[tokio::test]
    async fn schema_mismatch_maps_to_schema_error() {
        let state = AppState::fake_with(
            Arc::new(CannedLlm::replying(r#"{"merchant":"ACME","date":"2024-05-01","total":1}"#)),
            0,
        );
        let err = analyze_upload(&state, &image_upload()).await.unwrap_err();
        match err {
            AppError::Schema(e) => assert_eq!(e.field, "items"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_image_fails_before_the_model_is_called() {
        let llm = Arc::new(CannedLlm::replying("{}"));
        let state = AppState::fake_with(llm.clone(), 0);
        let upload = Upload {
            filename: "receipt.jpg".into(),
            content_type: Some("image/jpeg".into()),
            body: Bytes::from_static(b"nope"),
        };
        let err = analyze_upload(&state, &upload).await.unwrap_err();
        assert!(matches!(err, AppError::Ocr(_)));
        assert!(llm.seen.lock().unwrap().is_empty());
    }
}
