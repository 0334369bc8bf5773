use super::Renderer;
use crate::fonts::Font;
use crate::format::{format_amount, format_date, format_temperature, format_weight};
use crate::layout::{BLOCK_GAP, BODY_SIZE, LINE_HEIGHT, TITLE_SIZE};
use cmr_common::aggregate::ExportAggregate;

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Renderer<'_> {
    pub(super) fn header(&mut self, aggregate: &ExportAggregate) {
        let document = &aggregate.document;
        let kind = if document.is_international {
            "LETTRE DE VOITURE INTERNATIONALE"
        } else {
            "LETTRE DE VOITURE NATIONALE"
        };

        self.layout
            .text_line(0.0, kind, Font::Bold, TITLE_SIZE, TITLE_SIZE + 4.0);

        let status = document
            .document_status()
            .map(|s| s.label())
            .unwrap_or("-");
        self.layout.text_right(status, Font::Bold, BODY_SIZE);
        self.layout.text_line(
            0.0,
            &format!("CMR N° {}", document.display_number()),
            Font::Bold,
            BODY_SIZE + 1.0,
            LINE_HEIGHT + 2.0,
        );

        let issued = format_date(&document.created_at, self.options.timezone);
        self.layout.field("Établie le", &issued);
        if document.archived {
            self.layout.field("Archivée", "oui");
        }
        self.layout.advance(BLOCK_GAP);
        self.layout.rule(1.0);
        self.layout.advance(BLOCK_GAP);
    }

    /// Bold label, then one wrapped line per present value
    fn party(&mut self, label: &str, lines: &[Option<&str>]) {
        self.layout
            .text_line(0.0, label, Font::Bold, BODY_SIZE, LINE_HEIGHT);

        let mut printed = false;
        for line in lines.iter().flatten() {
            self.layout.paragraph(10.0, line, Font::Regular);
            printed = true;
        }
        if !printed {
            self.layout.paragraph(10.0, "-", Font::Regular);
        }
        self.layout.advance(BLOCK_GAP);
    }

    pub(super) fn parties(&mut self, aggregate: &ExportAggregate) {
        let document = &aggregate.document;
        self.layout.heading("Parties");

        self.party(
            "Expéditeur (1)",
            &[present(&document.shipper_name), present(&document.shipper_address)],
        );

        let mut carrier: Vec<Option<String>> = Vec::new();
        if let Some(profile) = &aggregate.profile {
            carrier.push(present(&profile.company_name).map(str::to_string));
            carrier.push(present(&profile.contact_name).map(str::to_string));
            carrier.push(present(&profile.address).map(str::to_string));
            carrier.push(profile.locality());
            let contact: Vec<&str> = [present(&profile.phone), present(&profile.email)]
                .into_iter()
                .flatten()
                .collect();
            carrier.push((!contact.is_empty()).then(|| contact.join(" - ")));
            carrier.push(present(&profile.vat_number).map(|vat| format!("TVA : {}", vat)));
        }
        if let Some(vehicle) = &aggregate.vehicle {
            carrier.push(Some(format!("Véhicule : {}", vehicle.registration())));
        }
        let carrier: Vec<Option<&str>> = carrier.iter().map(|l| l.as_deref()).collect();
        self.party("Transporteur (16)", &carrier);

        self.party(
            "Destinataire (2)",
            &[present(&document.consignee_name), present(&document.consignee_address)],
        );

        let principal = [present(&document.principal_name), present(&document.principal_address)];
        if principal.iter().any(Option::is_some) {
            self.party("Donneur d'ordre", &principal);
        }

        let successor = [
            present(&document.delivery_carrier_name),
            present(&document.delivery_carrier_address),
        ];
        if successor.iter().any(Option::is_some) {
            self.party("Transporteur successif (17)", &successor);
        }
    }

    pub(super) fn places_and_times(&mut self, aggregate: &ExportAggregate) {
        let document = &aggregate.document;
        self.layout.heading("Chargement et livraison");

        let rows = [
            ("Lieu de prise en charge (4)", present(&document.loading_place).map(str::to_string)),
            ("Date de chargement", Some(self.datetime(document.loading_date.as_ref()))),
            ("Arrivée au chargement", Some(self.datetime(document.loading_arrival_at.as_ref()))),
            ("Départ du chargement", Some(self.datetime(document.loading_departure_at.as_ref()))),
            ("Lieu de livraison (3)", present(&document.delivery_place).map(str::to_string)),
            ("Livraison demandée", Some(self.datetime(document.requested_delivery_at.as_ref()))),
            ("Arrivée à la livraison", Some(self.datetime(document.delivery_arrival_at.as_ref()))),
            ("Départ de la livraison", Some(self.datetime(document.delivery_departure_at.as_ref()))),
        ];
        for (label, value) in rows {
            self.layout.field(label, value.as_deref().unwrap_or("-"));
        }
    }

    pub(super) fn goods(&mut self, aggregate: &ExportAggregate) {
        let document = &aggregate.document;
        self.layout.heading("Marchandises");

        let count = document.package_count.map(|c| c.to_string());
        let weight = document.gross_weight_kg.map(format_weight);
        self.layout.field("Nature (9)", present(&document.goods_description).unwrap_or("-"));
        self.layout.field("Nombre de colis (7)", count.as_deref().unwrap_or("-"));
        self.layout.field("Emballage (8)", present(&document.packaging_type).unwrap_or("-"));
        self.layout.field("Poids brut (11)", weight.as_deref().unwrap_or("-"));
        self.layout.field("Marques et numéros (6)", present(&document.marks).unwrap_or("-"));

        if let Some(dangerous) = document.dangerous_goods() {
            self.layout.subheading("Marchandises dangereuses (ADR)");
            self.layout.field("Classe", dangerous.class.unwrap_or("-"));
            self.layout.field("Numéro ONU", dangerous.un_number.unwrap_or("-"));
            self.layout.field("Lettre", dangerous.adr_letter.unwrap_or("-"));
        }

        if let Some(range) = document.temperature() {
            self.layout.subheading("Température dirigée");
            let min = range.min.map(format_temperature);
            let max = range.max.map(format_temperature);
            self.layout.field("Minimum", min.as_deref().unwrap_or("-"));
            self.layout.field("Maximum", max.as_deref().unwrap_or("-"));
        }
    }

    pub(super) fn pallets(&mut self, aggregate: &ExportAggregate) {
        let Some(pallets) = aggregate.document.pallets() else {
            return;
        };
        self.layout.heading("Échange de palettes");

        for (label, count) in &pallets.counts {
            self.layout.field(&format!("Palettes {}", label), &count.to_string());
        }
        if let Some(origin) = pallets.origin {
            self.layout.field("Origine", origin);
        }
        for (label, count) in &pallets.exchange {
            self.layout.field(label, &count.to_string());
        }
        if let Some(location) = pallets.deposit_location {
            self.layout.field("Lieu de dépôt", location);
        }
        if let Some(balance) = pallets.balance {
            self.layout.field("Solde", balance);
        }
    }

    pub(super) fn attached_documents(&mut self, aggregate: &ExportAggregate) {
        let Some(text) = aggregate.document.attached_documents_text() else {
            return;
        };
        self.layout.heading("Documents annexés (5)");
        self.layout.paragraph(0.0, text, Font::Regular);
    }

    pub(super) fn instructions(&mut self, aggregate: &ExportAggregate) {
        let document = &aggregate.document;
        let general = document.instructions_text();
        let customs = document.customs_instructions_text();
        if general.is_none() && customs.is_none() {
            return;
        }

        self.layout.heading("Instructions de l'expéditeur (13)");
        if let Some(text) = general {
            self.layout.paragraph(0.0, text, Font::Regular);
        }
        if let Some(text) = customs {
            self.layout.subheading("Instructions douanières");
            self.layout.paragraph(0.0, text, Font::Regular);
        }
    }

    pub(super) fn financials(&mut self, aggregate: &ExportAggregate) {
        let Some(financials) = aggregate.document.financials() else {
            return;
        };
        let currency = self.options.default_currency.as_str();
        self.layout.heading("Conditions financières");

        if let Some(amount) = &financials.cash_on_delivery {
            let text = format_amount(amount.value, amount.currency, currency);
            self.layout.field("Remboursement (15)", &text);
        }
        if let Some(amount) = &financials.freight {
            let text = format_amount(amount.value, amount.currency, currency);
            self.layout.field("Prix du transport", &text);
        }
        if let Some(terms) = financials.freight_terms {
            self.layout.field("Prescriptions d'affranchissement (14)", terms);
        }
    }
}
