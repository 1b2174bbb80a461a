//! Printable HTML invoices. Converting the HTML to PDF is left to whatever
//! tool the operator prefers.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Shop;
use crate::model::Order;

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

impl InvoiceItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceOrder {
    pub doc_id: String,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
    pub total: f64,
    pub shipping: ShippingAddress,
    pub tracking_id: Option<String>,
}

impl InvoiceOrder {
    pub fn file_name(&self) -> String {
        format!("invoice-{}.html", sanitize_file_part(&self.order_number))
    }
}

/// The free-text items field becomes a single line priced at the order
/// amount.
impl From<&Order> for InvoiceOrder {
    fn from(order: &Order) -> Self {
        Self {
            doc_id: order.doc_id.clone(),
            order_number: order.order_id.clone(),
            created_at: order.created_at,
            items: vec![InvoiceItem {
                name: order.items.clone(),
                quantity: 1,
                price: order.amount,
            }],
            total: order.amount,
            shipping: ShippingAddress {
                full_name: order.name.clone(),
                phone: order.phone.clone(),
                address: order.address.clone(),
            },
            tracking_id: order.tracking_code().map(str::to_string),
        }
    }
}

pub fn render_invoice_html(order: &InvoiceOrder, shop: &Shop, generated_at: DateTime<Utc>) -> String {
    let mut rows = String::new();
    for item in &order.items {
        rows.push_str(&format!(
            "          <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&item.name),
            item.quantity,
            money(item.price),
            money(item.line_total()),
        ));
    }
    let tracking = order
        .tracking_id
        .as_deref()
        .map(|t| format!("\n        <p><strong>Tracking ID:</strong> {}</p>", html_escape(t)))
        .unwrap_or_default();
    let shop_name = html_escape(&shop.name);
    let shop_phone = html_escape(&shop.phone);

    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Invoice {number}</title>
    <style>{style}</style>
  </head>
  <body>
  <div class="invoice-container">
    <div class="header">
      <h1>{shop_name}</h1>
      <p>{tagline}</p>
      <p>Phone: {shop_phone}</p>
    </div>
    <div class="invoice-info">
      <div class="invoice-details">
        <p><strong>Order No:</strong> {number}</p>
        <p><strong>Date:</strong> {date}</p>{tracking}
      </div>
      <div class="customer-details">
        <h3>Customer Information</h3>
        <p><strong>Name:</strong> {name}</p>
        <p><strong>Phone:</strong> {phone}</p>
        <p><strong>Address:</strong> {address}</p>
      </div>
    </div>
    <div class="items-table">
      <table>
        <thead>
          <tr><th>Item</th><th>Quantity</th><th>Price</th><th>Total</th></tr>
        </thead>
        <tbody>
{rows}        </tbody>
        <tfoot>
          <tr class="total-row"><td colspan="3" class="text-right"><strong>Total:</strong></td><td>{total}</td></tr>
        </tfoot>
      </table>
    </div>
    <div class="footer">
      <p>Thank you for shopping with {shop_name}!</p>
      <p>Contact us at {shop_phone} for any queries.</p>
      <p class="generated-at">Generated on: {generated}</p>
    </div>
  </div>
  </body>
</html>
"#,
        number = html_escape(&order.order_number),
        style = INVOICE_STYLE,
        tagline = html_escape(&shop.tagline),
        date = order.created_at.format("%B %-d, %Y"),
        name = html_escape(&order.shipping.full_name),
        phone = html_escape(&order.shipping.phone),
        address = html_escape(&order.shipping.address),
        total = money(order.total),
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Write one invoice file per order into `dir`, creating it if needed.
pub async fn write_invoices(orders: &[Order], shop: &Shop, dir: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let generated_at = Utc::now();
    let mut written = Vec::with_capacity(orders.len());
    for order in orders {
        let invoice = InvoiceOrder::from(order);
        let path = dir.join(invoice.file_name());
        let html = render_invoice_html(&invoice, shop, generated_at);
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(order_id = %order.order_id, path = %path.display(), "invoice written");
        written.push(path);
    }
    Ok(written)
}

fn money(v: f64) -> String {
    format!("৳{v:.2}")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn sanitize_file_part(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

const INVOICE_STYLE: &str = r#"
.invoice-container { font-family: 'Helvetica Neue', Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; color: #333; }
.header { text-align: center; margin-bottom: 20px; padding-bottom: 15px; border-bottom: 2px solid #2c3e50; }
.header h1 { color: #2c3e50; margin: 0; font-size: 26px; }
.header p { color: #7f8c8d; margin: 5px 0 0; }
.invoice-info { display: flex; justify-content: space-between; margin-bottom: 20px; gap: 20px; }
.invoice-details, .customer-details { flex: 1; }
.invoice-details p, .customer-details p { margin: 4px 0; font-size: 14px; }
table { width: 100%; border-collapse: collapse; margin: 20px 0; }
th, td { padding: 10px; text-align: left; border-bottom: 1px solid #ddd; font-size: 14px; }
th { background-color: #2c3e50; color: white; }
.text-right { text-align: right; }
.total-row { font-weight: bold; background-color: #f8f9fa; }
.footer { margin-top: 30px; text-align: center; padding-top: 15px; border-top: 1px solid #ddd; color: #7f8c8d; font-size: 12px; }
.generated-at { font-size: 10px; color: #95a5a6; }
@media print { @page { margin: 1.5cm; } .header, th { -webkit-print-color-adjust: exact; print-color-adjust: exact; } }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shop() -> Shop {
        Shop {
            name: "Dreamer Shop".into(),
            tagline: "Your Trusted Online Store".into(),
            phone: "01810-308171".into(),
        }
    }

    fn order() -> Order {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap();
        Order {
            doc_id: "doc-1".into(),
            order_id: "ORD-DR-1001".into(),
            name: "Tom & <Jerry>".into(),
            phone: "01712345678".into(),
            items: "Mug".into(),
            address: "Gulshan, Dhaka".into(),
            amount: 1250.5,
            reference: String::new(),
            status: crate::model::OrderStatus::Confirmed,
            tracking_code: Some("SF123".into()),
            notes: String::new(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn single_line_item_priced_at_amount() {
        let inv = InvoiceOrder::from(&order());
        assert_eq!(inv.items.len(), 1);
        assert_eq!(inv.items[0].quantity, 1);
        assert_eq!(inv.items[0].price, 1250.5);
        assert_eq!(inv.total, 1250.5);
        assert_eq!(inv.tracking_id.as_deref(), Some("SF123"));
        assert_eq!(inv.file_name(), "invoice-ORD-DR-1001.html");
    }

    #[test]
    fn renders_escaped_customer_and_two_decimal_totals() {
        let inv = InvoiceOrder::from(&order());
        let html = render_invoice_html(&inv, &shop(), Utc::now());
        assert!(html.contains("<h1>Dreamer Shop</h1>"));
        assert!(html.contains("Tom &amp; &lt;Jerry&gt;"));
        assert!(!html.contains("<Jerry>"));
        assert!(html.contains("৳1250.50"));
        assert!(html.contains("Tracking ID:</strong> SF123"));
        assert!(html.contains("March 9, 2025"));
    }

    #[test]
    fn omits_tracking_line_without_code() {
        let mut o = order();
        o.tracking_code = None;
        let html = render_invoice_html(&InvoiceOrder::from(&o), &shop(), Utc::now());
        assert!(!html.contains("Tracking ID"));
    }

    #[tokio::test]
    async fn writes_one_file_per_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("invoices");
        let paths = write_invoices(&[order()], &shop(), &out).await.unwrap();
        assert_eq!(paths, vec![out.join("invoice-ORD-DR-1001.html")]);
        let body = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(body.starts_with("<!doctype html>"));
    }
}
