//! Paginated layout
//!
//! A single top-down pass with a vertical cursor. Every block asks for the
//! height it needs before drawing; if the current page cannot hold it, a new
//! page starts at the top margin. Coordinates are in points, measured from
//! the top-left corner of the page.

use crate::fonts::{text_width, Font};
use crate::images::PreparedImage;

pub const BODY_SIZE: f32 = 9.0;
pub const LINE_HEIGHT: f32 = 12.0;
pub const SMALL_SIZE: f32 = 7.0;
pub const SMALL_LINE_HEIGHT: f32 = 9.0;
pub const HEADING_SIZE: f32 = 11.0;
pub const HEADING_HEIGHT: f32 = 20.0;
pub const SUBHEADING_HEIGHT: f32 = 14.0;
pub const TITLE_SIZE: f32 = 16.0;
pub const LABEL_WIDTH: f32 = 150.0;
pub const BLOCK_GAP: f32 = 6.0;
/// Space kept above the bottom margin for the footer
pub const FOOTER_HEIGHT: f32 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// `y` is the baseline
    Text {
        x: f32,
        y: f32,
        font: Font,
        size: f32,
        text: String,
    },
    /// `y` is the top edge; `image` indexes [`RenderedDocument::images`]
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image: usize,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        thickness: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub body: Vec<DrawOp>,
    /// Written by the footer pass once the page count is known
    pub footer: Vec<DrawOp>,
}

impl Page {
    /// Text runs of the body, in drawing order
    pub fn body_text(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn footer_text(&self) -> impl Iterator<Item = &str> {
        self.footer.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    /// Lowest y the body may reach
    pub fn body_bottom(&self) -> f32 {
        self.height - self.margin - FOOTER_HEIGHT
    }
}

/// The laid-out document, before serialization
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub geometry: PageGeometry,
    pub pages: Vec<Page>,
    pub images: Vec<PreparedImage>,
    /// Used as the PDF title
    pub title: String,
}

impl RenderedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether any body text run contains `needle`
    pub fn contains_text(&self, needle: &str) -> bool {
        self.pages
            .iter()
            .flat_map(|p| p.body_text())
            .any(|t| t.contains(needle))
    }
}

/// Greedy word wrap to `max_width`
///
/// Explicit newlines are kept; a single word wider than the line is split
/// between characters.
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if text_width(&candidate, font, size) <= max_width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, font, size) <= max_width {
                current = word.to_string();
                continue;
            }
            for c in word.chars() {
                current.push(c);
                if text_width(&current, font, size) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Cursor over the pages being produced
pub(crate) struct Layout {
    geometry: PageGeometry,
    pages: Vec<Page>,
    images: Vec<PreparedImage>,
    y: f32,
}

impl Layout {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![Page::default()],
            images: Vec::new(),
            y: geometry.margin,
        }
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn left(&self) -> f32 {
        self.geometry.margin
    }

    pub fn content_width(&self) -> f32 {
        self.geometry.content_width()
    }

    pub fn cursor(&self) -> (usize, f32) {
        (self.pages.len() - 1, self.y)
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.body.push(op);
        }
    }

    pub fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = self.geometry.margin;
    }

    /// Start a new page unless `height` still fits on this one
    pub fn ensure(&mut self, height: f32) {
        let at_top = self.y <= self.geometry.margin;
        if self.y + height > self.geometry.body_bottom() && !at_top {
            self.new_page();
        }
    }

    pub fn advance(&mut self, dy: f32) {
        self.y += dy;
    }

    pub fn text_line(&mut self, x_offset: f32, text: &str, font: Font, size: f32, line_height: f32) {
        self.ensure(line_height);
        let op = DrawOp::Text {
            x: self.left() + x_offset,
            y: self.y + size,
            font,
            size,
            text: text.to_string(),
        };
        self.push(op);
        self.y += line_height;
    }

    /// Text flush with the right margin, on the current line, without moving the cursor
    pub fn text_right(&mut self, text: &str, font: Font, size: f32) {
        let x = self.left() + self.content_width() - text_width(text, font, size);
        let op = DrawOp::Text {
            x,
            y: self.y + size,
            font,
            size,
            text: text.to_string(),
        };
        self.push(op);
    }

    /// Wrapped body text starting at `x_offset`
    /// Height `paragraph` would take for the same arguments
    pub fn paragraph_height(&self, x_offset: f32, text: &str, font: Font) -> f32 {
        let width = self.content_width() - x_offset;
        wrap_text(text, font, BODY_SIZE, width).len() as f32 * LINE_HEIGHT
    }

    pub fn paragraph(&mut self, x_offset: f32, text: &str, font: Font) {
        let width = self.content_width() - x_offset;
        for line in wrap_text(text, font, BODY_SIZE, width) {
            self.text_line(x_offset, &line, font, BODY_SIZE, LINE_HEIGHT);
        }
    }

    /// Section title with a rule under it, kept on the same page as one line after it
    pub fn heading(&mut self, text: &str) {
        self.ensure(HEADING_HEIGHT + LINE_HEIGHT);
        self.y += 4.0;
        self.text_line(0.0, text, Font::Bold, HEADING_SIZE, HEADING_SIZE + 2.0);
        self.rule(0.5);
        self.y += 2.0;
    }

    pub fn subheading(&mut self, text: &str) {
        self.ensure(SUBHEADING_HEIGHT + LINE_HEIGHT);
        self.y += 2.0;
        self.text_line(0.0, text, Font::Bold, BODY_SIZE + 0.5, SUBHEADING_HEIGHT - 2.0);
    }

    /// Label in the left column, wrapped value in the right one
    pub fn field(&mut self, label: &str, value: &str) {
        let lines = wrap_text(value, Font::Regular, BODY_SIZE, self.content_width() - LABEL_WIDTH);
        let lines = if lines.is_empty() { vec!["-".to_string()] } else { lines };

        for (i, line) in lines.iter().enumerate() {
            self.ensure(LINE_HEIGHT);
            if i == 0 {
                let op = DrawOp::Text {
                    x: self.left(),
                    y: self.y + BODY_SIZE,
                    font: Font::Bold,
                    size: BODY_SIZE,
                    text: label.to_string(),
                };
                self.push(op);
            }
            self.text_line(LABEL_WIDTH, line, Font::Regular, BODY_SIZE, LINE_HEIGHT);
        }
    }

    pub fn rule(&mut self, thickness: f32) {
        let op = DrawOp::Line {
            x1: self.left(),
            y1: self.y,
            x2: self.left() + self.content_width(),
            y2: self.y,
            thickness,
        };
        self.push(op);
    }

    /// Register image data once, returning its index
    pub fn add_image(&mut self, image: PreparedImage) -> usize {
        self.images.push(image);
        self.images.len() - 1
    }

    pub fn image(&mut self, x_offset: f32, index: usize, width: f32, height: f32) {
        self.ensure(height + BLOCK_GAP);
        let op = DrawOp::Image {
            x: self.left() + x_offset,
            y: self.y,
            width,
            height,
            image: index,
        };
        self.push(op);
        self.y += height + BLOCK_GAP;
    }

    /// Second pass: stamp every page once the total is known
    pub fn finish<F>(mut self, title: String, footer: F) -> RenderedDocument
    where
        F: Fn(usize, usize) -> Vec<String>,
    {
        let total = self.pages.len();
        let geometry = self.geometry;

        for (index, page) in self.pages.iter_mut().enumerate() {
            let mut y = geometry.body_bottom() + SMALL_LINE_HEIGHT + 1.0;
            for line in footer(index + 1, total) {
                page.footer.push(DrawOp::Text {
                    x: geometry.margin,
                    y,
                    font: Font::Regular,
                    size: SMALL_SIZE,
                    text: line,
                });
                y += SMALL_LINE_HEIGHT;
            }
        }

        RenderedDocument {
            geometry,
            pages: self.pages,
            images: self.images,
            title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4() -> PageGeometry {
        PageGeometry {
            width: 595.28,
            height: 841.89,
            margin: 40.0,
        }
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "Livraison uniquement sur rendez-vous, quai numéro 4, avant 10h00 le matin";
        let lines = wrap_text(text, Font::Regular, BODY_SIZE, 120.0);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, Font::Regular, BODY_SIZE) <= 120.0);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_keeps_newlines_and_splits_long_words() {
        let lines = wrap_text("ligne un\nligne deux", Font::Regular, BODY_SIZE, 500.0);
        assert_eq!(lines, vec!["ligne un", "ligne deux"]);

        let long = "X".repeat(60);
        let lines = wrap_text(&long, Font::Bold, BODY_SIZE, 100.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), long);
    }

    #[test]
    fn test_page_break_when_block_does_not_fit() {
        let mut layout = Layout::new(a4());
        let usable = a4().body_bottom() - a4().margin;
        let per_page = (usable / LINE_HEIGHT).floor() as usize;

        for i in 0..per_page {
            layout.text_line(0.0, &format!("ligne {}", i), Font::Regular, BODY_SIZE, LINE_HEIGHT);
        }
        assert_eq!(layout.cursor().0, 0);

        layout.text_line(0.0, "suite", Font::Regular, BODY_SIZE, LINE_HEIGHT);
        assert_eq!(layout.cursor(), (1, a4().margin + LINE_HEIGHT));
    }

    #[test]
    fn test_heading_is_not_orphaned() {
        let mut layout = Layout::new(a4());
        layout.advance(a4().body_bottom() - a4().margin - HEADING_HEIGHT);

        layout.heading("Marchandises");
        let doc = layout.finish(String::new(), |_, _| Vec::new());
        assert_eq!(doc.page_count(), 2);
        assert!(doc.pages[0].body_text().next().is_none());
    }

    #[test]
    fn test_footer_pass_numbers_pages() {
        let mut layout = Layout::new(a4());
        layout.text_line(0.0, "a", Font::Regular, BODY_SIZE, LINE_HEIGHT);
        layout.new_page();

        let doc = layout.finish("t".into(), |page, total| vec![format!("{}/{}", page, total)]);
        let footers: Vec<Vec<&str>> = doc.pages.iter().map(|p| p.footer_text().collect()).collect();
        assert_eq!(footers, vec![vec!["1/2"], vec!["2/2"]]);
    }
}
