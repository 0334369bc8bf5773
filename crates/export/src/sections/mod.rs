//! Section renderers
//!
//! Sections are written in a fixed order. Optional blocks return early when
//! their data is absent so they take no space at all.

mod attachments;
mod consignment;

use crate::fonts::Font;
use crate::format::format_datetime;
use crate::images::{prepare_image, ImageFetcher};
use crate::layout::{Layout, PageGeometry, RenderedDocument, BLOCK_GAP, BODY_SIZE, LINE_HEIGHT};
use crate::ExportOptions;
use chrono::{DateTime, FixedOffset, Utc};
use cmr_common::aggregate::ExportAggregate;
use cmr_common::metrics;
use tracing::warn;

/// Printed instead of an image that could not be fetched or decoded
pub const IMAGE_PLACEHOLDER: &str = "image not available";

/// An image ready to draw, or the placeholder line standing in for it
enum Figure {
    Image { index: usize, width: f32, height: f32 },
    Placeholder,
}

impl Figure {
    /// Vertical space taken once drawn
    fn height(&self) -> f32 {
        match self {
            Figure::Image { height, .. } => height + BLOCK_GAP,
            Figure::Placeholder => LINE_HEIGHT,
        }
    }
}

pub(crate) struct Renderer<'a> {
    layout: Layout,
    fetcher: &'a dyn ImageFetcher,
    options: &'a ExportOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(fetcher: &'a dyn ImageFetcher, options: &'a ExportOptions) -> Self {
        let geometry = PageGeometry {
            width: options.page_width,
            height: options.page_height,
            margin: options.margin,
        };
        Self {
            layout: Layout::new(geometry),
            fetcher,
            options,
        }
    }

    pub async fn render(mut self, aggregate: &ExportAggregate, generated_at: DateTime<Utc>) -> RenderedDocument {
        self.header(aggregate);
        self.parties(aggregate);
        self.places_and_times(aggregate);
        self.goods(aggregate);
        self.pallets(aggregate);
        self.attached_documents(aggregate);
        self.instructions(aggregate);
        self.financials(aggregate);
        self.photos(aggregate).await;
        self.reserves(aggregate).await;
        self.signatures(aggregate).await;

        let generated = format_datetime(&generated_at, self.options.timezone);
        let notice = self.options.legal_notice.clone();
        let title = format!("CMR {}", aggregate.document.display_number());

        self.layout.finish(title, move |page, total| {
            vec![
                notice.clone(),
                format!("Généré le {} - page {} sur {}", generated, page, total),
            ]
        })
    }

    fn datetime(&self, value: Option<&DateTime<FixedOffset>>) -> String {
        value
            .map(|at| format_datetime(at, self.options.timezone))
            .unwrap_or_else(|| "-".to_string())
    }

    /// Fetch and decode one image scaled into a `max_width` x `max_height` box
    ///
    /// Any failure, including a missing URL, yields the placeholder.
    async fn load_figure(&mut self, url: Option<&str>, max_width: f32, max_height: f32) -> Figure {
        let Some(url) = url else {
            return Figure::Placeholder;
        };

        let prepared = match self.fetcher.fetch(url).await {
            Ok(bytes) => prepare_image(&bytes, self.options.image_max_edge),
            Err(e) => Err(e),
        };

        match prepared {
            Ok(image) => {
                let (width, height) = image.fit(max_width, max_height);
                let index = self.layout.add_image(image);
                Figure::Image { index, width, height }
            }
            Err(e) => {
                warn!(error = %e, "Image could not be embedded, using placeholder");
                Figure::Placeholder
            }
        }
    }

    fn draw_figure(&mut self, x_offset: f32, figure: Figure) {
        match figure {
            Figure::Image { index, width, height } => {
                metrics::record_export_image(true);
                self.layout.image(x_offset, index, width, height);
            }
            Figure::Placeholder => self.placeholder(x_offset),
        }
    }

    fn placeholder(&mut self, x_offset: f32) {
        metrics::record_export_image(false);
        self.layout
            .text_line(x_offset, IMAGE_PLACEHOLDER, Font::Regular, BODY_SIZE, LINE_HEIGHT);
    }
}
