//! PDF serialization
//!
//! Output depends only on the rendered document: no creation date, no
//! random file identifier, objects numbered in a fixed order.

use crate::errors::ExportError;
use crate::fonts::{encode_win_ansi, Font};
use crate::layout::{DrawOp, Page, PageGeometry, RenderedDocument};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::fmt::Write as _;

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Content stream operators for one page; y is flipped to PDF space
fn content_stream(page: &Page, geometry: &PageGeometry) -> Vec<u8> {
    let flip = |y: f32| geometry.height - y;
    let mut out = String::new();

    for op in page.body.iter().chain(page.footer.iter()) {
        match op {
            DrawOp::Text {
                x,
                y,
                font,
                size,
                text,
            } => {
                let _ = writeln!(
                    out,
                    "BT /{} {:.2} Tf {:.2} {:.2} Td <{}> Tj ET",
                    font.resource(),
                    size,
                    x,
                    flip(*y),
                    hex(&encode_win_ansi(text))
                );
            }
            DrawOp::Image {
                x,
                y,
                width,
                height,
                image,
            } => {
                let _ = writeln!(
                    out,
                    "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{} Do Q",
                    width,
                    height,
                    x,
                    flip(y + height),
                    image
                );
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                thickness,
            } => {
                let _ = writeln!(
                    out,
                    "{:.2} w {:.2} {:.2} m {:.2} {:.2} l S",
                    thickness,
                    x1,
                    flip(*y1),
                    x2,
                    flip(*y2)
                );
            }
        }
    }
    out.into_bytes()
}

fn font_dictionary(font: Font) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    }
}

impl RenderedDocument {
    /// Serialize to PDF bytes
    pub fn to_pdf_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let regular_id = doc.add_object(font_dictionary(Font::Regular));
        let bold_id = doc.add_object(font_dictionary(Font::Bold));

        let mut xobjects = Dictionary::new();
        for (index, image) in self.images.iter().enumerate() {
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => Object::Integer(image.width as i64),
                    "Height" => Object::Integer(image.height as i64),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => "FlateDecode",
                },
                image.data.clone(),
            );
            let image_id = doc.add_object(stream);
            xobjects.set(format!("Im{}", index), image_id);
        }

        let mut resources = dictionary! {
            "Font" => dictionary! {
                Font::Regular.resource() => regular_id,
                Font::Bold.resource() => bold_id,
            },
        };
        if !self.images.is_empty() {
            resources.set("XObject", xobjects);
        }
        let resources_id = doc.add_object(resources);

        let mut kids = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let content = Stream::new(Dictionary::new(), content_stream(page, &self.geometry));
            let content_id = doc.add_object(content);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(self.geometry.width.into()),
            Object::Real(self.geometry.height.into()),
        ];
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(self.pages.len() as i64),
                "Resources" => resources_id,
                "MediaBox" => media_box,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(self.title.as_str()),
            "Producer" => Object::string_literal("cmr-export"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|e| ExportError::Pdf {
            message: e.to_string(),
        })?;
        Ok(bytes)
    }
}
