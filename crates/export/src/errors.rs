//! Export pipeline error types

use cmr_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Image fetch failed for {url}: {message}")]
    ImageFetch { url: String, message: String },

    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("PDF serialization failed: {message}")]
    Pdf { message: String },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        AppError::Export {
            message: e.to_string(),
        }
    }
}
