use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use tenantry_core::domain::invoice::Invoice;
use tenantry_core::domain::organization::Organization;
use tera::{Context, Tera};

use super::PdfError;

const DOCUMENT_TEMPLATE: &str = "document.html.tera";
const INVOICE_TEMPLATE: &str = "invoice.html.tera";

/// Register custom Tera filters used by document templates.
///
/// - `money`: two-decimal rendering of numbers and decimal strings,
///   e.g. `invoice.total | money`
pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

// rust_decimal serializes as a string, so both shapes are accepted.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| tera::Error::msg(format!("money filter cannot parse `{raw}`: {e}")))?,
        tera::Value::Number(number) => number
            .as_f64()
            .and_then(|n| Decimal::try_from(n).ok())
            .ok_or_else(|| tera::Error::msg("money filter received a non-finite number"))?,
        tera::Value::Null => Decimal::ZERO,
        _ => return Err(tera::Error::msg("money filter expects a number or decimal string")),
    };
    Ok(tera::Value::String(format!("{:.2}", amount.round_dp(2))))
}

pub struct DocumentTemplates {
    tera: Tera,
}

impl DocumentTemplates {
    pub fn new() -> Result<Self, PdfError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html.tera"]);
        register_template_filters(&mut tera);
        tera.add_raw_templates(vec![
            (
                DOCUMENT_TEMPLATE,
                include_str!("../../../../templates/documents/document.html.tera"),
            ),
            (INVOICE_TEMPLATE, include_str!("../../../../templates/documents/invoice.html.tera")),
        ])
        .map_err(|e| PdfError::Template(e.to_string()))?;

        Ok(Self { tera })
    }

    /// Wraps a body fragment in a full HTML document carrying `font_css`.
    pub fn wrap_fragment(&self, content: &str, font_css: &str) -> Result<String, PdfError> {
        let mut context = Context::new();
        context.insert("content", content);
        context.insert("font_css", font_css);
        self.tera
            .render(DOCUMENT_TEMPLATE, &context)
            .map_err(|e| PdfError::Template(e.to_string()))
    }

    pub fn render_invoice(
        &self,
        invoice: &Invoice,
        organization: &Organization,
    ) -> Result<String, PdfError> {
        let mut context = Context::new();
        context.insert("invoice", invoice);
        context.insert("organization", organization);
        context.insert("identifier", invoice.identifier.as_deref().unwrap_or("Draft"));
        context.insert("issued_on", &invoice.created_at.format("%Y-%m-%d").to_string());
        self.tera
            .render(INVOICE_TEMPLATE, &context)
            .map_err(|e| PdfError::Template(e.to_string()))
    }
}

/// Injects `font_css` into `html`.
///
/// Complete documents get a `<style>` element right before `</head>`; bare
/// fragments are wrapped in the document template.
pub fn wrap_with_fonts(html: &str, font_css: &str) -> Result<String, PdfError> {
    match html.to_ascii_lowercase().find("</head>") {
        Some(index) => {
            let mut wrapped = String::with_capacity(html.len() + font_css.len() + 16);
            wrapped.push_str(&html[..index]);
            wrapped.push_str("<style>");
            wrapped.push_str(font_css);
            wrapped.push_str("</style>");
            wrapped.push_str(&html[index..]);
            Ok(wrapped)
        }
        None => DocumentTemplates::new()?.wrap_fragment(html, font_css),
    }
}
