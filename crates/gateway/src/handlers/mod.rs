//! API handlers module

pub mod actions;
pub mod documents;
pub mod export;
pub mod health;
pub mod photos;
pub mod reserves;
pub mod signatures;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use cmr_common::errors::{AppError, Result};

/// Decode a base64 image field, with or without a `data:<mime>;base64,` prefix
pub(crate) fn decode_image(field: &str, encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Validation {
            message: format!("{} is not valid base64: {}", field, e),
            field: Some(field.to_string()),
        })
}
