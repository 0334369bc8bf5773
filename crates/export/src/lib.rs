//! CMR Export Pipeline
//!
//! Turns an [`ExportAggregate`] into a paginated PDF:
//! - header, parties, places and dates, goods
//! - optional pallet, attached documents, instructions and financial blocks
//! - photos, reserves by side, signatures
//! - a footer on every page with the legal notice and page numbering
//!
//! Rendering never fails because of an attachment. Unreachable or
//! undecodable images are replaced by a text placeholder.

pub mod errors;
pub mod fonts;
pub mod format;
pub mod images;
pub mod layout;
pub mod pdf;
mod sections;

pub use errors::ExportError;
pub use images::{HttpImageFetcher, ImageFetcher, PreparedImage};
pub use layout::{DrawOp, Page, PageGeometry, RenderedDocument};
pub use sections::IMAGE_PLACEHOLDER;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use cmr_common::aggregate::ExportAggregate;
use cmr_common::config::ExportConfig;
use cmr_common::db::models::CmrDocument;
use cmr_common::metrics;
use sections::Renderer;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Rendering parameters
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    /// Every printed date is converted to this zone
    pub timezone: Tz,
    pub default_currency: String,
    pub legal_notice: String,
    pub image_max_edge: u32,
    pub image_timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_width: 595.28,
            page_height: 841.89,
            margin: 40.0,
            timezone: chrono_tz::Europe::Paris,
            default_currency: "EUR".to_string(),
            legal_notice: "Lettre de voiture internationale - Convention CMR (Genève, 19 mai 1956)"
                .to_string(),
            image_max_edge: 1024,
            image_timeout: Duration::from_secs(10),
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Result<Self, ExportError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| ExportError::InvalidTimezone(config.timezone.clone()))?;

        Ok(Self {
            page_width: config.page_width,
            page_height: config.page_height,
            margin: config.margin,
            timezone,
            default_currency: config.default_currency.clone(),
            legal_notice: config.legal_notice.clone(),
            image_max_edge: config.image_max_edge_px,
            image_timeout: Duration::from_secs(config.image_timeout_secs),
        })
    }
}

/// Lay out the document without serializing it
///
/// `generated_at` only reaches the page footers.
#[instrument(skip_all, fields(document_id = %aggregate.document.id))]
pub async fn render(
    aggregate: &ExportAggregate,
    fetcher: &dyn ImageFetcher,
    options: &ExportOptions,
    generated_at: DateTime<Utc>,
) -> RenderedDocument {
    let rendered = Renderer::new(fetcher, options)
        .render(aggregate, generated_at)
        .await;
    info!(
        pages = rendered.page_count(),
        images = rendered.images.len(),
        "Document laid out"
    );
    rendered
}

/// Render and serialize to PDF bytes
pub async fn render_to_blob(
    aggregate: &ExportAggregate,
    fetcher: &dyn ImageFetcher,
    options: &ExportOptions,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    let start = Instant::now();
    let result = render(aggregate, fetcher, options, generated_at)
        .await
        .to_pdf_bytes();
    metrics::record_export(start.elapsed().as_secs_f64(), result.is_ok());
    result
}

/// Render and write the PDF into `dir` under its download filename
pub async fn render_and_download(
    aggregate: &ExportAggregate,
    fetcher: &dyn ImageFetcher,
    options: &ExportOptions,
    generated_at: DateTime<Utc>,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let bytes = render_to_blob(aggregate, fetcher, options, generated_at).await?;
    let date = generated_at.with_timezone(&options.timezone).date_naive();
    let path = dir.join(download_filename(&aggregate.document, date));

    tokio::fs::write(&path, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "PDF written");
    Ok(path)
}

/// `CMR_{number}_{YYYY-MM-DD}.pdf`
pub fn download_filename(document: &CmrDocument, date: NaiveDate) -> String {
    let number: String = document
        .display_number()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("CMR_{}_{}.pdf", number, date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{png, StubFetcher};
    use chrono::{FixedOffset, TimeZone};
    use cmr_common::aggregate::{PhotoEntry, ReserveEntry, SignatureEntry};
    use cmr_common::db::blank_document;
    use cmr_common::db::models::{Photo, Reserve, Signature};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 30, 0).unwrap().into()
    }

    fn document() -> CmrDocument {
        let mut doc = blank_document(Uuid::new_v4(), Uuid::new_v4(), at(7));
        doc.cmr_number = Some("FR-2026-0042".into());
        doc.status = "completed_with_reserves".into();
        doc.shipper_name = Some("Laiterie du Val".into());
        doc.consignee_name = Some("Entrepôt Nord".into());
        doc.goods_description = Some("Produits laitiers".into());
        doc.gross_weight_kg = Some(Decimal::new(15205, 1));
        doc
    }

    fn signature(doc: &CmrDocument, party: &str, url: &str) -> SignatureEntry {
        SignatureEntry {
            signature: Signature {
                id: Uuid::new_v4(),
                document_id: doc.id,
                user_id: doc.user_id,
                party: party.into(),
                signer_name: Some(format!("Signataire {}", party)),
                signer_role: None,
                signer_email: None,
                image_path: format!("{}.png", party),
                created_at: at(9),
            },
            image_url: Some(url.into()),
        }
    }

    fn reserve(doc: &CmrDocument, side: &str, kind: &str, comment: &str) -> ReserveEntry {
        ReserveEntry {
            reserve: Reserve {
                id: Uuid::new_v4(),
                document_id: doc.id,
                user_id: doc.user_id,
                side: side.into(),
                reserve_type: kind.into(),
                comment: Some(comment.into()),
                photo_path: None,
                created_at: at(10),
            },
            photo_url: None,
        }
    }

    fn full_aggregate() -> ExportAggregate {
        let doc = document();
        let mut aggregate = ExportAggregate::bare(doc.clone());
        aggregate.shipper_signature = Some(signature(&doc, "shipper", "https://s/shipper"));
        aggregate.consignee_signature = Some(signature(&doc, "consignee", "https://s/consignee"));
        aggregate.reserves = vec![
            reserve(&doc, "delivery", "Palettes mouillées", "Deux palettes"),
            reserve(&doc, "loading", "Emballage abîmé", "Film déchiré"),
        ];
        aggregate.photos = vec![PhotoEntry {
            photo: Photo {
                id: Uuid::new_v4(),
                document_id: doc.id,
                user_id: doc.user_id,
                path: "p.jpg".into(),
                created_at: at(8),
            },
            url: Some("https://s/photo".into()),
        }];
        aggregate
    }

    fn fetcher() -> StubFetcher {
        StubFetcher::default()
            .with("https://s/shipper", png(40, 20, [0, 0, 0, 255]))
            .with("https://s/consignee", png(40, 20, [0, 0, 0, 128]))
            .with("https://s/photo", png(64, 48, [200, 10, 10, 255]))
    }

    fn body_lines(rendered: &RenderedDocument) -> Vec<String> {
        rendered
            .pages
            .iter()
            .flat_map(|p| p.body_text().map(str::to_string))
            .collect()
    }

    fn position(lines: &[String], needle: &str) -> usize {
        lines
            .iter()
            .position(|l| l == needle)
            .unwrap_or_else(|| panic!("'{}' not rendered", needle))
    }

    #[tokio::test]
    async fn test_same_input_same_bytes() {
        let aggregate = full_aggregate();
        let options = ExportOptions::default();
        let generated = Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap();

        let first = render_to_blob(&aggregate, &fetcher(), &options, generated).await.unwrap();
        let second = render_to_blob(&aggregate, &fetcher(), &options, generated).await.unwrap();
        assert_eq!(first, second);

        let later = generated + chrono::Duration::hours(5);
        let a = render(&aggregate, &fetcher(), &options, generated).await;
        let b = render(&aggregate, &fetcher(), &options, later).await;
        assert_eq!(body_lines(&a), body_lines(&b));
        assert_ne!(a.pages[0].footer, b.pages[0].footer);
    }

    #[tokio::test]
    async fn test_sections_in_order() {
        let rendered = render(
            &full_aggregate(),
            &fetcher(),
            &ExportOptions::default(),
            Utc::now(),
        )
        .await;
        let lines = body_lines(&rendered);

        let order = [
            "CMR N° FR-2026-0042",
            "Parties",
            "Chargement et livraison",
            "Marchandises",
            "Photos",
            "Réserves",
            "Au chargement",
            "À la livraison",
            "Signatures",
            "Expéditeur (22)",
            "Destinataire (24)",
        ];
        let positions: Vec<usize> = order.iter().map(|n| position(&lines, n)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);

        assert!(rendered.contains_text("Livré avec réserves"));
        assert!(rendered.contains_text("1 520,5 kg"));
        assert_eq!(rendered.images.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_image_uses_placeholder() {
        let mut aggregate = full_aggregate();
        if let Some(entry) = aggregate.consignee_signature.as_mut() {
            entry.image_url = Some("https://s/expired".into());
        }

        let fetcher = fetcher();
        let bytes = render_to_blob(&aggregate, &fetcher, &ExportOptions::default(), Utc::now())
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let rendered = render(&aggregate, &fetcher, &ExportOptions::default(), Utc::now()).await;
        assert!(rendered.contains_text(IMAGE_PLACEHOLDER));
        assert_eq!(rendered.images.len(), 2);
        assert!(fetcher
            .requested
            .lock()
            .unwrap()
            .contains(&"https://s/expired".to_string()));
    }

    #[tokio::test]
    async fn test_optional_blocks_absent() {
        let aggregate = ExportAggregate::bare(blank_document(Uuid::new_v4(), Uuid::new_v4(), at(7)));
        let rendered = render(
            &aggregate,
            &StubFetcher::default(),
            &ExportOptions::default(),
            Utc::now(),
        )
        .await;

        for heading in [
            "Marchandises dangereuses (ADR)",
            "Température dirigée",
            "Échange de palettes",
            "Documents annexés (5)",
            "Instructions de l'expéditeur (13)",
            "Conditions financières",
            "Photos",
            "Réserves",
        ] {
            assert!(!rendered.contains_text(heading), "{} rendered", heading);
        }
        assert!(rendered.contains_text("Non signé"));
        assert!(rendered.contains_text("Prêt au chargement"));
        assert_eq!(rendered.page_count(), 1);
    }

    #[tokio::test]
    async fn test_long_content_paginates_with_footer() {
        let mut aggregate = full_aggregate();
        let doc = aggregate.document.clone();
        aggregate.document.instructions = Some("Livrer au quai 4 uniquement. ".repeat(150));
        for i in 0..30 {
            aggregate.reserves.push(reserve(
                &doc,
                "delivery",
                &format!("Réserve {}", i),
                "Carton enfoncé sur le coin inférieur gauche",
            ));
        }

        let options = ExportOptions::default();
        let generated = Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap();
        let rendered = render(&aggregate, &fetcher(), &options, generated).await;
        let total = rendered.page_count();
        assert!(total > 2);

        let bottom = rendered.geometry.body_bottom();
        for (i, page) in rendered.pages.iter().enumerate() {
            let footer: Vec<&str> = page.footer_text().collect();
            assert_eq!(footer[0], options.legal_notice);
            assert_eq!(
                footer[1],
                format!("Généré le 15/03/2026 09:00 - page {} sur {}", i + 1, total)
            );
            for op in &page.body {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y <= bottom);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_photo_caption_stays_with_image() {
        let options = ExportOptions::default();
        let generated = Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap();

        // Shift the photo block down one line at a time across a full block height
        for filler in 1..=16 {
            let mut aggregate = full_aggregate();
            let photo = aggregate.photos[0].clone();
            aggregate.photos = vec![photo; 6];
            aggregate.document.instructions = Some(vec!["Quai 4"; filler].join("\n"));

            let rendered = render(&aggregate, &fetcher(), &options, generated).await;
            for page in &rendered.pages {
                for (i, op) in page.body.iter().enumerate() {
                    let DrawOp::Text { text, .. } = op else { continue };
                    if text.starts_with("Photo ") {
                        assert!(
                            matches!(page.body.get(i + 1), Some(DrawOp::Image { .. })),
                            "'{}' separated from its image with {} filler lines",
                            text,
                            filler
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_options_from_config() {
        let options = ExportOptions::from_config(&ExportConfig::default()).unwrap();
        assert_eq!(options.timezone, chrono_tz::Europe::Paris);

        let config = ExportConfig {
            timezone: "Mars/Olympus".into(),
            ..ExportConfig::default()
        };
        assert!(matches!(
            ExportOptions::from_config(&config),
            Err(ExportError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_download_filename() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(download_filename(&document(), date), "CMR_FR-2026-0042_2026-03-15.pdf");

        let mut doc = document();
        doc.cmr_number = Some("A/B 7".into());
        assert_eq!(download_filename(&doc, date), "CMR_A_B_7_2026-03-15.pdf");
    }

    #[tokio::test]
    async fn test_render_and_download_writes_file() {
        let dir = std::env::temp_dir().join(format!("cmr-export-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let generated = Utc.with_ymd_and_hms(2026, 3, 15, 23, 30, 0).unwrap();
        let path = render_and_download(
            &full_aggregate(),
            &fetcher(),
            &ExportOptions::default(),
            generated,
            &dir,
        )
        .await
        .unwrap();

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("CMR_FR-2026-0042_2026-03-16.pdf")
        );
        let written = tokio::fs::read(&path).await.unwrap();
        assert!(written.starts_with(b"%PDF"));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
