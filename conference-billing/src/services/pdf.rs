//! Invoice and receipt PDFs: a full-page A4 template image with text drawn at
//! fixed positions on top of it.

use crate::models::{Invoice, RegistrationDetails};
use crate::utils::generate_qr_png;
use printpdf::image_crate::GenericImageView;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::path::Path;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const PT_TO_MM: f32 = 0.3528;
const QR_SIZE_MM: f32 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Invoice,
    Receipt,
}

impl DocumentKind {
    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INVOICE",
            DocumentKind::Receipt => "RECEIPT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
    pub align: Align,
}

impl TextStyle {
    pub const BODY: TextStyle = TextStyle {
        size: 10.0,
        bold: false,
        align: Align::Left,
    };
    pub const AMOUNT: TextStyle = TextStyle {
        size: 10.0,
        bold: false,
        align: Align::Right,
    };
    pub const HEADING: TextStyle = TextStyle {
        size: 16.0,
        bold: true,
        align: Align::Left,
    };
    pub const TOTAL: TextStyle = TextStyle {
        size: 11.0,
        bold: true,
        align: Align::Right,
    };
}

/// Drawing surface. Coordinates are millimetres from the top-left corner.
pub trait PdfCanvas {
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle);

    /// Draw an encoded PNG or JPEG scaled to `width` millimetres.
    fn draw_image(&mut self, encoded: &[u8], x: f32, y: f32, width: f32) -> Result<(), AppError>;
}

/// printpdf-backed canvas producing a single A4 page.
pub struct PrintPdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PrintPdfCanvas {
    pub fn new(title: &str) -> Result<Self, AppError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Page 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Font error: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Font error: {}", e)))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
        })
    }

    pub fn finish(self) -> Result<Vec<u8>, AppError> {
        self.doc
            .save_to_bytes()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("PDF write failed: {}", e)))
    }
}

/// Rough Helvetica advance width; builtin fonts carry no metrics here.
fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

impl PdfCanvas for PrintPdfCanvas {
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle) {
        let x = match style.align {
            Align::Left => x,
            Align::Right => x - text_width_mm(text, style.size),
        };
        let font = if style.bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(text, style.size, Mm(x), Mm(PAGE_HEIGHT_MM - y), font);
    }

    fn draw_image(&mut self, encoded: &[u8], x: f32, y: f32, width: f32) -> Result<(), AppError> {
        let decoded = printpdf::image_crate::load_from_memory(encoded)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Image decode failed: {}", e)))?;
        let (px_w, px_h) = decoded.dimensions();
        if px_w == 0 || width <= 0.0 {
            return Ok(());
        }

        let dpi = px_w as f32 * 25.4 / width;
        let height = px_h as f32 * 25.4 / dpi;
        Image::from_dynamic_image(&decoded).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(PAGE_HEIGHT_MM - y - height)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        Ok(())
    }
}

/// Background images for the two document kinds.
#[derive(Debug, Clone, Default)]
pub struct PdfTemplates {
    pub invoice: Option<Vec<u8>>,
    pub receipt: Option<Vec<u8>>,
}

impl PdfTemplates {
    pub async fn load(invoice: Option<&Path>, receipt: Option<&Path>) -> Result<Self, AppError> {
        async fn read(path: Option<&Path>) -> Result<Option<Vec<u8>>, AppError> {
            match path {
                Some(p) => Ok(Some(tokio::fs::read(p).await?)),
                None => Ok(None),
            }
        }
        Ok(Self {
            invoice: read(invoice).await?,
            receipt: read(receipt).await?,
        })
    }
}

pub struct InvoicePdfRenderer {
    templates: PdfTemplates,
}

fn usd(amount: Decimal) -> String {
    format!("{:.2} USD", amount)
}

impl InvoicePdfRenderer {
    pub fn new(templates: PdfTemplates) -> Self {
        Self { templates }
    }

    /// Render to PDF bytes. Synchronous: the printpdf document is not `Send`.
    pub fn render(
        &self,
        kind: DocumentKind,
        invoice: &Invoice,
        details: &RegistrationDetails,
    ) -> Result<Vec<u8>, AppError> {
        let mut canvas =
            PrintPdfCanvas::new(&format!("{} {}", kind.title(), invoice.serial_number))?;
        self.draw(kind, invoice, details, &mut canvas)?;
        canvas.finish()
    }

    pub fn draw(
        &self,
        kind: DocumentKind,
        invoice: &Invoice,
        details: &RegistrationDetails,
        canvas: &mut dyn PdfCanvas,
    ) -> Result<(), AppError> {
        let template = match kind {
            DocumentKind::Invoice => self.templates.invoice.as_deref(),
            DocumentKind::Receipt => self.templates.receipt.as_deref(),
        };
        if let Some(background) = template {
            canvas.draw_image(background, 0.0, 0.0, PAGE_WIDTH_MM)?;
        }

        canvas.draw_text(kind.title(), 20.0, 45.0, TextStyle::HEADING);
        canvas.draw_text(&format!("No. {}", invoice.serial_number), 20.0, 55.0, TextStyle::BODY);
        let date = invoice.paid_at.unwrap_or(invoice.created_utc);
        canvas.draw_text(
            &format!("Date: {}", date.format("%d/%m/%Y")),
            140.0,
            55.0,
            TextStyle::BODY,
        );

        let registration = &details.registration;
        canvas.draw_text(&registration.full_name(), 20.0, 65.0, TextStyle::BODY);
        if let Some(company) = &details.company {
            canvas.draw_text(&company.name, 20.0, 71.0, TextStyle::BODY);
        }

        let mut y = 90.0;
        for (category, line) in invoice.lines.iter() {
            if line.total <= Decimal::ZERO {
                continue;
            }
            if kind == DocumentKind::Receipt && !line.paid {
                continue;
            }
            canvas.draw_text(category.label(), 20.0, y, TextStyle::BODY);
            canvas.draw_text(&usd(line.total), 150.0, y, TextStyle::AMOUNT);
            if line.discount > Decimal::ZERO {
                canvas.draw_text(&format!("-{}", usd(line.discount)), 190.0, y, TextStyle::AMOUNT);
            }
            if let Some(disclosure) = line.disclosure.as_deref().filter(|d| !d.is_empty()) {
                y += 5.0;
                canvas.draw_text(disclosure, 25.0, y, TextStyle { size: 8.0, ..TextStyle::BODY });
            }
            y += 7.0;
        }

        y += 5.0;
        let totals: Vec<(&str, String)> = match kind {
            DocumentKind::Invoice => vec![
                ("Total", usd(invoice.total_fees)),
                ("Discount", usd(invoice.total_discount)),
                ("Net (USD)", usd(invoice.total_value_usd)),
                ("Net (JOD)", format!("{:.2} JOD", invoice.total_value_jd)),
                ("Balance", usd(invoice.balance)),
            ],
            DocumentKind::Receipt => vec![
                ("Amount Paid", usd(invoice.paid_amount)),
                ("Balance", usd(invoice.balance)),
            ],
        };
        for (label, value) in totals {
            canvas.draw_text(label, 120.0, y, TextStyle::BODY);
            canvas.draw_text(&value, 190.0, y, TextStyle::TOTAL);
            y += 7.0;
        }

        let qr_payload = invoice
            .verification_url
            .as_deref()
            .or(invoice.qr_code.as_deref())
            .filter(|q| !q.is_empty());
        if let Some(qr) = qr_payload {
            let png = generate_qr_png(qr)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!("QR render failed: {}", e)))?;
            canvas.draw_image(&png, 20.0, 240.0, QR_SIZE_MM)?;
        }
        if let Some(url) = invoice.verification_url.as_deref() {
            canvas.draw_text(url, 60.0, 260.0, TextStyle { size: 7.0, ..TextStyle::BODY });
        }
        if let Some(number) = invoice.einvoice_number.as_deref() {
            canvas.draw_text(
                &format!("E-Invoice: {}", number),
                60.0,
                252.0,
                TextStyle { size: 8.0, ..TextStyle::BODY },
            );
        }

        Ok(())
    }
}
