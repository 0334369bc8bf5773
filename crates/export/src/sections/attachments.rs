use super::{Figure, Renderer};
use crate::fonts::Font;
use crate::format::format_datetime;
use crate::layout::{
    BLOCK_GAP, BODY_SIZE, LINE_HEIGHT, SMALL_LINE_HEIGHT, SMALL_SIZE, SUBHEADING_HEIGHT,
};
use cmr_common::aggregate::{ExportAggregate, ReserveEntry, SignatureEntry};
use cmr_common::db::models::ReserveSide;

const PHOTO_BOX: (f32, f32) = (220.0, 165.0);
const RESERVE_PHOTO_BOX: (f32, f32) = (160.0, 120.0);
const SIGNATURE_BOX: (f32, f32) = (180.0, 70.0);

impl Renderer<'_> {
    pub(super) async fn photos(&mut self, aggregate: &ExportAggregate) {
        if aggregate.photos.is_empty() {
            return;
        }
        self.layout.heading("Photos");

        for (i, entry) in aggregate.photos.iter().enumerate() {
            let (width, height) = PHOTO_BOX;
            let figure = self.load_figure(entry.url.as_deref(), width, height).await;

            // Caption and image move to the next page together
            self.layout.ensure(LINE_HEIGHT + figure.height());
            self.layout.text_line(
                0.0,
                &format!("Photo {}", i + 1),
                Font::Bold,
                BODY_SIZE,
                LINE_HEIGHT,
            );
            self.draw_figure(0.0, figure);
        }
    }

    pub(super) async fn reserves(&mut self, aggregate: &ExportAggregate) {
        if aggregate.reserves.is_empty() {
            return;
        }
        self.layout.heading("Réserves");

        for (side, title) in [
            (ReserveSide::Loading, "Au chargement"),
            (ReserveSide::Delivery, "À la livraison"),
        ] {
            let entries = aggregate.reserves_on(side);
            if entries.is_empty() {
                continue;
            }
            self.layout.subheading(title);
            for entry in entries {
                self.reserve(entry).await;
            }
        }
    }

    async fn reserve(&mut self, entry: &ReserveEntry) {
        let reserve = &entry.reserve;
        let comment = reserve.comment.as_deref().filter(|c| !c.trim().is_empty());
        let figure = match reserve.photo_path {
            Some(_) => {
                let (width, height) = RESERVE_PHOTO_BOX;
                Some(self.load_figure(entry.photo_url.as_deref(), width, height).await)
            }
            None => None,
        };

        let block = self.layout.paragraph_height(10.0, &reserve.reserve_type, Font::Bold)
            + SMALL_LINE_HEIGHT
            + comment.map_or(0.0, |c| self.layout.paragraph_height(10.0, c, Font::Regular))
            + figure.as_ref().map_or(0.0, Figure::height);
        self.layout.ensure(block);

        self.layout.paragraph(10.0, &reserve.reserve_type, Font::Bold);

        let noted = format!(
            "Constatée le {}",
            format_datetime(&reserve.created_at, self.options.timezone)
        );
        self.layout
            .text_line(10.0, &noted, Font::Regular, SMALL_SIZE, SMALL_LINE_HEIGHT);

        if let Some(comment) = comment {
            self.layout.paragraph(10.0, comment, Font::Regular);
        }
        if let Some(figure) = figure {
            self.draw_figure(10.0, figure);
        }
        self.layout.advance(BLOCK_GAP);
    }

    pub(super) async fn signatures(&mut self, aggregate: &ExportAggregate) {
        self.layout.heading("Signatures");
        self.signature("Expéditeur (22)", aggregate.shipper_signature.as_ref())
            .await;
        self.signature("Destinataire (24)", aggregate.consignee_signature.as_ref())
            .await;
    }

    async fn signature(&mut self, title: &str, entry: Option<&SignatureEntry>) {
        let Some(entry) = entry else {
            self.layout.subheading(title);
            self.layout.paragraph(10.0, "Non signé", Font::Regular);
            self.layout.advance(BLOCK_GAP);
            return;
        };

        let signature = &entry.signature;
        let details: Vec<&str> = [
            signature.signer_name.as_deref(),
            signature.signer_role.as_deref(),
            signature.signer_email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|l| !l.trim().is_empty())
        .collect();

        let (width, height) = SIGNATURE_BOX;
        let figure = self.load_figure(entry.image_url.as_deref(), width, height).await;

        let block = SUBHEADING_HEIGHT
            + details
                .iter()
                .map(|l| self.layout.paragraph_height(10.0, l, Font::Regular))
                .sum::<f32>()
            + SMALL_LINE_HEIGHT
            + figure.height();
        self.layout.ensure(block);

        self.layout.subheading(title);
        for line in details {
            self.layout.paragraph(10.0, line, Font::Regular);
        }

        let signed = format!(
            "Signé le {}",
            format_datetime(&signature.created_at, self.options.timezone)
        );
        self.layout
            .text_line(10.0, &signed, Font::Regular, SMALL_SIZE, SMALL_LINE_HEIGHT);

        self.draw_figure(10.0, figure);
        self.layout.advance(BLOCK_GAP);
    }
}
