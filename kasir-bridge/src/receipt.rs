//! Receipt payload model and line formatter
//!
//! The payload arrives from the POS as loosely-typed JSON; every field is
//! an optional string and the bridge never computes or validates amounts.
//! Formatting is a pure function from payload to printable lines and must
//! never fail for a structurally valid payload: absent text renders as "-",
//! absent money renders as "0".

use serde::{Deserialize, Serialize};

/// Divider width. Thermal printers typically render 32 columns; the
/// formatter itself never truncates.
const DIVIDER_WIDTH: usize = 32;

/// Label column width for the meta and totals blocks
const LABEL_WIDTH: usize = 9;

const DEFAULT_THANKS: &str = "Terima kasih!";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptPayload {
    #[serde(default)]
    pub header: ReceiptHeader,
    #[serde(default)]
    pub meta: ReceiptMeta,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub totals: ReceiptTotals,
    #[serde(default)]
    pub footer: ReceiptFooter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptHeader {
    pub title: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptMeta {
    pub invoice: Option<String>,
    pub date: Option<String>,
    pub cashier: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: Option<String>,
    pub qty: Option<String>,
    pub price: Option<String>,
    pub subtotal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptTotals {
    pub subtotal: Option<String>,
    pub discount: Option<String>,
    pub total: Option<String>,
    pub paid: Option<String>,
    pub change: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptFooter {
    pub thanks: Option<String>,
    pub note: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn text(value: &Option<String>) -> &str {
    present(value).unwrap_or("-")
}

fn money(value: &Option<String>) -> &str {
    present(value).unwrap_or("0")
}

fn labelled(label: &str, value: &str) -> String {
    format!("{label:<LABEL_WIDTH$}: {value}")
}

/// Render a receipt payload into printable lines, in print order.
///
/// Total: terminates for any payload and always returns at least the
/// header, divider and totals skeleton.
pub fn format_receipt(payload: &ReceiptPayload) -> Vec<String> {
    let divider = "-".repeat(DIVIDER_WIDTH);
    let mut lines = Vec::new();

    // Header
    lines.push(text(&payload.header.title).to_string());
    if let Some(address) = present(&payload.header.address) {
        lines.push(address.to_string());
    }
    if let Some(phone) = present(&payload.header.phone) {
        lines.push(phone.to_string());
    }
    lines.push(divider.clone());

    // Meta
    lines.push(labelled("Invoice", text(&payload.meta.invoice)));
    lines.push(labelled("Tanggal", text(&payload.meta.date)));
    lines.push(labelled("Kasir", text(&payload.meta.cashier)));
    lines.push(divider.clone());

    // Items, in payload order
    for item in &payload.items {
        lines.push(text(&item.name).to_string());
        lines.push(format!(
            "{} x {} = {}",
            money(&item.qty),
            money(&item.price),
            money(&item.subtotal)
        ));
    }
    lines.push(divider.clone());

    // Totals
    lines.push(labelled("Subtotal", money(&payload.totals.subtotal)));
    if let Some(discount) = present(&payload.totals.discount) {
        lines.push(labelled("Diskon", &format!("-{discount}")));
    }
    lines.push(labelled("Total", money(&payload.totals.total)));
    lines.push(labelled(
        text(&payload.meta.payment_method),
        money(&payload.totals.paid),
    ));
    lines.push(labelled("Kembali", money(&payload.totals.change)));
    lines.push(divider);

    // Footer
    lines.push(
        present(&payload.footer.thanks)
            .unwrap_or(DEFAULT_THANKS)
            .to_string(),
    );
    if let Some(note) = present(&payload.footer.note) {
        lines.push(note.to_string());
    }

    lines
}
