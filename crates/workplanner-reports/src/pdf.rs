//! Markup to PDF conversion.
//!
//! [`GenPdfConverter`] walks the report body with `scraper` and lays out the
//! elements the report template produces (`h1`-`h3`, `p`, lists, tables and
//! images) with `genpdf`. Anything else is descended into for its children.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use genpdf::elements::{Break, FrameCellDecorator, Image, Paragraph, TableLayout, UnorderedList};
use genpdf::fonts::{self, FontData, FontFamily};
use genpdf::style::Style;
use genpdf::{Alignment, Document, Element as _, SimplePageDecorator};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};

use crate::charts::resolve_reference;
use crate::error::RenderError;

/// Environment override for the font directory.
pub const FONTS_DIR_ENV: &str = "WORKPLANNER_FONTS_DIR";

const FONT_FILES: [&str; 4] = ["Regular", "Bold", "Italic", "BoldItalic"];

/// Renders markup into a document at `output_path`, creating parent directories.
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, markup: &str, output_path: &Path) -> Result<(), RenderError>;
}

// ============================================================================
// Fonts
// ============================================================================

/// Font family shipped in the crate's `assets/fonts`.
pub const BUNDLED_FONT_FAMILY: &str = "DejaVuSans";

/// Directory of the bundled font family.
pub fn bundled_fonts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts")
}

fn has_family(dir: &Path, family: &str) -> bool {
    FONT_FILES
        .iter()
        .all(|style| dir.join(format!("{family}-{style}.ttf")).is_file())
}

/// Directory and family to load: `family` from the environment override or
/// from `configured`, else the bundled family.
pub fn resolve_fonts(configured: &Path, family: &str) -> Option<(PathBuf, String)> {
    let mut candidates = Vec::new();
    if let Ok(dir) = env::var(FONTS_DIR_ENV) {
        if !dir.trim().is_empty() {
            candidates.push(PathBuf::from(dir));
        }
    }
    candidates.push(configured.to_path_buf());

    if let Some(dir) = candidates.into_iter().find(|dir| has_family(dir, family)) {
        return Some((dir, family.to_string()));
    }
    let bundled = bundled_fonts_dir();
    if has_family(&bundled, BUNDLED_FONT_FAMILY) {
        warn!(
            family,
            configured = %configured.display(),
            fallback = BUNDLED_FONT_FAMILY,
            "font family not found, using bundled fonts"
        );
        return Some((bundled, BUNDLED_FONT_FAMILY.to_string()));
    }
    None
}

// ============================================================================
// Converter
// ============================================================================

#[derive(Debug, Clone)]
pub struct GenPdfConverter {
    fonts_dir: PathBuf,
    font_family: String,
    /// Relative image references are resolved against this directory.
    base_dir: PathBuf,
}

impl GenPdfConverter {
    pub fn new(
        fonts_dir: impl Into<PathBuf>,
        font_family: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            font_family: font_family.into(),
            base_dir: base_dir.into(),
        }
    }

    fn load_fonts(&self) -> Result<FontFamily<FontData>, RenderError> {
        let (dir, family) = resolve_fonts(&self.fonts_dir, &self.font_family).ok_or_else(|| {
            RenderError::MissingResource(format!(
                "font family `{}` not found in {} (set {FONTS_DIR_ENV})",
                self.font_family,
                self.fonts_dir.display()
            ))
        })?;
        fonts::from_files(&dir, &family, None).map_err(|e| {
            RenderError::Conversion(format!("loading fonts from {}: {e}", dir.display()))
        })
    }

    fn image_path(&self, src: &str) -> Result<PathBuf, RenderError> {
        let path = resolve_reference(src)
            .ok_or_else(|| RenderError::MissingResource(format!("unsupported image source `{src}`")))?;
        let path = if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(RenderError::MissingResource(path.display().to_string()))
        }
    }
}

impl DocumentConverter for GenPdfConverter {
    fn convert(&self, markup: &str, output_path: &Path) -> Result<(), RenderError> {
        let html = Html::parse_document(markup);
        let body = select_first(&html, "body")
            .ok_or_else(|| RenderError::MalformedMarkup("document has no body".into()))?;

        let mut doc = Document::new(self.load_fonts()?);
        if let Some(title) = select_first(&html, "title") {
            doc.set_title(collapsed_text(title));
        }
        doc.set_minimal_conformance();
        doc.set_font_size(10);
        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(15);
        doc.set_page_decorator(decorator);

        let mut layout = Layout {
            converter: self,
            doc: &mut doc,
            blocks: 0,
        };
        layout.children(body)?;
        if layout.blocks == 0 {
            return Err(RenderError::MalformedMarkup(
                "document body has no renderable content".into(),
            ));
        }
        let blocks = layout.blocks;

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|source| RenderError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        doc.render_to_file(output_path)
            .map_err(|e| RenderError::Conversion(format!("{}: {e}", output_path.display())))?;
        debug!(path = %output_path.display(), blocks, "pdf written");
        Ok(())
    }
}

// ============================================================================
// Layout
// ============================================================================

fn select_first<'a>(html: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    html.select(&selector).next()
}

/// Element text with whitespace runs collapsed to single spaces.
fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn heading_style(level: u8) -> Style {
    let size = match level {
        1 => 20,
        2 => 15,
        _ => 12,
    };
    Style::new().bold().with_font_size(size)
}

/// Images are embedded uncompressed, so wider ones are scaled down first.
pub const MAX_IMAGE_WIDTH: u32 = 800;
/// 800 px at this density spans about 170 mm, the A4 text width.
const IMAGE_DPI: f64 = 120.0;

/// Loads an image as RGB, scaled to at most [`MAX_IMAGE_WIDTH`] pixels wide.
fn embeddable_image(path: &Path) -> Result<DynamicImage, RenderError> {
    let img = image::open(path)
        .map_err(|e| RenderError::Conversion(format!("image {}: {e}", path.display())))?;
    let img = if img.width() > MAX_IMAGE_WIDTH {
        img.resize(MAX_IMAGE_WIDTH, u32::MAX, FilterType::Triangle)
    } else {
        img
    };
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

struct Layout<'c, 'd> {
    converter: &'c GenPdfConverter,
    doc: &'d mut Document,
    blocks: usize,
}

impl Layout<'_, '_> {
    fn children(&mut self, el: ElementRef<'_>) -> Result<(), RenderError> {
        for child in el.children() {
            match child.value() {
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child)?;
                    }
                }
                Node::Text(text) => {
                    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !text.is_empty() {
                        self.paragraph(text, None);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn element(&mut self, el: ElementRef<'_>) -> Result<(), RenderError> {
        match el.value().name() {
            "h1" => self.paragraph(collapsed_text(el), Some(heading_style(1))),
            "h2" => self.paragraph(collapsed_text(el), Some(heading_style(2))),
            "h3" => self.paragraph(collapsed_text(el), Some(heading_style(3))),
            "p" => self.paragraph(collapsed_text(el), None),
            "ul" | "ol" => self.list(el),
            "table" => self.table(el)?,
            "img" => self.image(el)?,
            "script" | "style" | "head" => {}
            _ => self.children(el)?,
        }
        Ok(())
    }

    fn paragraph(&mut self, text: String, style: Option<Style>) {
        if text.is_empty() {
            return;
        }
        match style {
            Some(style) => self.doc.push(Paragraph::new(text).styled(style)),
            None => self.doc.push(Paragraph::new(text)),
        }
        self.doc.push(Break::new(0.5));
        self.blocks += 1;
    }

    fn list(&mut self, el: ElementRef<'_>) {
        let mut list = UnorderedList::new();
        let mut items = 0;
        for item in el.children().filter_map(ElementRef::wrap) {
            if item.value().name() == "li" {
                list.push(Paragraph::new(collapsed_text(item)));
                items += 1;
            }
        }
        if items > 0 {
            self.doc.push(list);
            self.doc.push(Break::new(0.5));
            self.blocks += 1;
        }
    }

    fn table(&mut self, el: ElementRef<'_>) -> Result<(), RenderError> {
        let (Ok(tr), Ok(cell)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
            return Ok(());
        };
        let rows: Vec<Vec<(bool, String)>> = el
            .select(&tr)
            .map(|row| {
                row.select(&cell)
                    .map(|c| (c.value().name() == "th", collapsed_text(c)))
                    .collect()
            })
            .filter(|cells: &Vec<_>| !cells.is_empty())
            .collect();
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return Ok(());
        }

        let mut table = TableLayout::new(vec![1; columns]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        for cells in rows {
            let mut row = table.row();
            for i in 0..columns {
                let (header, text) = cells.get(i).cloned().unwrap_or_default();
                let style = if header { Style::new().bold() } else { Style::new() };
                row = row.element(Paragraph::new(text).styled(style).padded(1));
            }
            row.push()
                .map_err(|e| RenderError::Conversion(format!("table row: {e}")))?;
        }
        self.doc.push(table);
        self.doc.push(Break::new(1.0));
        self.blocks += 1;
        Ok(())
    }

    fn image(&mut self, el: ElementRef<'_>) -> Result<(), RenderError> {
        let src = el
            .value()
            .attr("src")
            .ok_or_else(|| RenderError::MalformedMarkup("<img> without src".into()))?;
        let path = self.converter.image_path(src)?;
        let pixels = embeddable_image(&path)?;
        let image = Image::from_dynamic_image(pixels)
            .map_err(|e| RenderError::Conversion(format!("image {}: {e}", path.display())))?
            .with_dpi(IMAGE_DPI)
            .with_alignment(Alignment::Center);
        self.doc.push(image);
        self.doc.push(Break::new(1.0));
        self.blocks += 1;
        Ok(())
    }
}
