//! UBL 2.1 document builder.
//!
//! Monetary values are carried with nine decimals and written with three.
//! The root element is `Invoice` for every document type; credit notes are
//! told apart by `InvoiceTypeCode` and the billing reference.

use super::{type_code_name, EInvoiceData, EInvoiceItem, ReverseEInvoiceData};
use crate::pricing::{format_fils, round_precise};
use rust_decimal::Decimal;
use service_core::error::AppError;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

const NS_INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
const NS_CAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const NS_CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const NS_EXT: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";

/// Amount currency attribute expected by the gateway.
const AMOUNT_CURRENCY: &str = "JO";

/// Document-level monetary totals.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTotals {
    /// Sum of pre-discount, pre-tax line amounts.
    pub line_extension: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub tax_exclusive: Decimal,
    pub tax_inclusive: Decimal,
    pub payable: Decimal,
}

pub fn document_totals(data: &EInvoiceData) -> DocumentTotals {
    let line_extension = round_precise(data.items.iter().map(EInvoiceItem::line_price_exc).sum());
    let tax_exclusive = line_extension;
    let tax_inclusive = round_precise(tax_exclusive - data.total_discount + data.total_tax);
    DocumentTotals {
        line_extension,
        discount: data.total_discount,
        tax: data.total_tax,
        tax_exclusive,
        tax_inclusive,
        payable: tax_inclusive,
    }
}

fn xml_error(e: xml::writer::Error) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to write e-invoice XML: {}", e))
}

struct UblWriter<'a> {
    inner: EventWriter<&'a mut Vec<u8>>,
}

impl<'a> UblWriter<'a> {
    fn new(buffer: &'a mut Vec<u8>) -> Self {
        let inner = EmitterConfig::new()
            .perform_indent(true)
            .write_document_declaration(true)
            .create_writer(buffer);
        Self { inner }
    }

    fn open(&mut self, name: &str) -> Result<(), AppError> {
        self.inner
            .write(XmlEvent::start_element(name))
            .map_err(xml_error)
    }

    fn open_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), AppError> {
        let mut event = XmlEvent::start_element(name);
        for (key, value) in attrs {
            event = event.attr(*key, value);
        }
        self.inner.write(event).map_err(xml_error)
    }

    fn close(&mut self) -> Result<(), AppError> {
        self.inner
            .write(XmlEvent::end_element())
            .map_err(xml_error)
    }

    fn leaf(&mut self, name: &str, text: &str) -> Result<(), AppError> {
        self.leaf_with(name, &[], text)
    }

    fn leaf_with(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), AppError> {
        self.open_with(name, attrs)?;
        self.inner
            .write(XmlEvent::characters(text))
            .map_err(xml_error)?;
        self.close()
    }

    fn amount(&mut self, name: &str, value: Decimal) -> Result<(), AppError> {
        self.leaf_with(name, &[("currencyID", AMOUNT_CURRENCY)], &format_fils(value))
    }
}

/// Build the XML for an invoice (or a debit note).
pub fn build_invoice_xml(data: &EInvoiceData) -> Result<String, AppError> {
    build(data, None)
}

/// Build the XML for a credit note referencing an earlier submission.
pub fn build_reversal_xml(data: &ReverseEInvoiceData) -> Result<String, AppError> {
    build(&data.invoice, Some(data))
}

fn build(data: &EInvoiceData, reversal: Option<&ReverseEInvoiceData>) -> Result<String, AppError> {
    if data.items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "E-invoice {} has no items",
            data.transaction_number
        )));
    }

    let totals = document_totals(data);
    let mut buffer = Vec::new();
    {
        let mut w = UblWriter::new(&mut buffer);

        w.inner
            .write(
                XmlEvent::start_element("Invoice")
                    .default_ns(NS_INVOICE)
                    .ns("cac", NS_CAC)
                    .ns("cbc", NS_CBC)
                    .ns("ext", NS_EXT),
            )
            .map_err(xml_error)?;

        w.leaf("cbc:ProfileID", "reporting:1.0")?;
        w.leaf("cbc:ID", &data.transaction_number)?;
        w.leaf("cbc:UUID", &data.uuid)?;
        w.leaf("cbc:IssueDate", &data.transaction_date.format("%Y-%m-%d").to_string())?;
        w.leaf_with(
            "cbc:InvoiceTypeCode",
            &[("name", &type_code_name(data.payment_method, data.invoice_kind))],
            data.transaction_type.type_code(),
        )?;
        if let Some(note) = data.note.as_deref().filter(|n| !n.is_empty()) {
            w.leaf("cbc:Note", note)?;
        }
        w.leaf("cbc:DocumentCurrencyCode", &data.currency)?;
        w.leaf("cbc:TaxCurrencyCode", &data.currency)?;

        if let Some(rev) = reversal {
            w.open("cac:BillingReference")?;
            w.open("cac:InvoiceDocumentReference")?;
            w.leaf("cbc:ID", &rev.original_number)?;
            w.leaf("cbc:UUID", &rev.original_uuid)?;
            w.leaf("cbc:DocumentDescription", &format_fils(rev.original_total))?;
            w.close()?;
            w.close()?;
        }

        w.open("cac:AdditionalDocumentReference")?;
        w.leaf("cbc:ID", "ICV")?;
        w.leaf("cbc:UUID", &data.sequence.to_string())?;
        w.close()?;

        write_supplier(&mut w, data)?;
        write_customer(&mut w, data)?;

        w.open("cac:SellerSupplierParty")?;
        w.open("cac:Party")?;
        w.open("cac:PartyIdentification")?;
        w.leaf("cbc:ID", &data.activity_number)?;
        w.close()?;
        w.close()?;
        w.close()?;

        if let Some(rev) = reversal {
            w.open("cac:PaymentMeans")?;
            w.leaf_with("cbc:PaymentMeansCode", &[("listID", "UN/ECE 4461")], "10")?;
            w.leaf("cbc:InstructionNote", &rev.reason)?;
            w.close()?;
        }

        w.open("cac:AllowanceCharge")?;
        w.leaf("cbc:ChargeIndicator", "false")?;
        w.leaf("cbc:AllowanceChargeReason", "discount")?;
        w.amount("cbc:Amount", totals.discount)?;
        w.close()?;

        w.open("cac:TaxTotal")?;
        w.amount("cbc:TaxAmount", totals.tax)?;
        w.close()?;

        w.open("cac:LegalMonetaryTotal")?;
        w.amount("cbc:TaxExclusiveAmount", totals.tax_exclusive)?;
        w.amount("cbc:TaxInclusiveAmount", totals.tax_inclusive)?;
        w.amount("cbc:AllowanceTotalAmount", totals.discount)?;
        w.amount("cbc:PayableAmount", totals.payable)?;
        w.close()?;

        for (index, item) in data.items.iter().enumerate() {
            write_line(&mut w, index + 1, item)?;
        }

        w.close()?;
    }

    String::from_utf8(buffer)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("E-invoice XML is not UTF-8: {}", e)))
}

fn write_supplier(w: &mut UblWriter<'_>, data: &EInvoiceData) -> Result<(), AppError> {
    w.open("cac:AccountingSupplierParty")?;
    w.open("cac:Party")?;
    w.open("cac:PostalAddress")?;
    w.open("cac:Country")?;
    w.leaf("cbc:IdentificationCode", "JO")?;
    w.close()?;
    w.close()?;
    w.open("cac:PartyTaxScheme")?;
    w.leaf("cbc:CompanyID", &data.tax_number)?;
    w.open("cac:TaxScheme")?;
    w.leaf("cbc:ID", "VAT")?;
    w.close()?;
    w.close()?;
    w.open("cac:PartyLegalEntity")?;
    w.leaf("cbc:RegistrationName", &data.client_name)?;
    w.close()?;
    w.close()?;
    w.close()
}

fn write_customer(w: &mut UblWriter<'_>, data: &EInvoiceData) -> Result<(), AppError> {
    w.open("cac:AccountingCustomerParty")?;
    w.open("cac:Party")?;
    if let Some(tax_number) = data.buyer_tax_number.as_deref().filter(|t| !t.is_empty()) {
        w.open("cac:PartyIdentification")?;
        w.leaf_with("cbc:ID", &[("schemeID", "TN")], tax_number)?;
        w.close()?;
    }
    w.open("cac:PostalAddress")?;
    w.leaf("cbc:PostalZone", &data.postal_code)?;
    w.leaf("cbc:CountrySubentityCode", &data.city_code)?;
    w.open("cac:Country")?;
    w.leaf("cbc:IdentificationCode", "JO")?;
    w.close()?;
    w.close()?;
    w.open("cac:PartyTaxScheme")?;
    w.open("cac:TaxScheme")?;
    w.leaf("cbc:ID", "VAT")?;
    w.close()?;
    w.close()?;
    w.open("cac:PartyLegalEntity")?;
    w.leaf("cbc:RegistrationName", &data.buyer_name)?;
    w.close()?;
    w.close()?;
    w.close()
}

fn write_line(w: &mut UblWriter<'_>, id: usize, item: &EInvoiceItem) -> Result<(), AppError> {
    w.open("cac:InvoiceLine")?;
    w.leaf("cbc:ID", &id.to_string())?;
    w.leaf_with(
        "cbc:InvoicedQuantity",
        &[("unitCode", "PCE")],
        &format_fils(item.item_qty),
    )?;
    w.amount("cbc:LineExtensionAmount", item.item_total)?;

    w.open("cac:TaxTotal")?;
    w.amount("cbc:TaxAmount", item.item_tax)?;
    w.amount("cbc:RoundingAmount", item.item_total + item.item_tax)?;
    w.open("cac:TaxSubtotal")?;
    w.amount("cbc:TaxAmount", item.item_tax)?;
    w.open("cac:TaxCategory")?;
    w.leaf_with(
        "cbc:ID",
        &[("schemeAgencyID", "6"), ("schemeID", "UN/ECE 5305")],
        "S",
    )?;
    w.leaf("cbc:Percent", &item.item_tax_rate.normalize().to_string())?;
    w.open("cac:TaxScheme")?;
    w.leaf_with(
        "cbc:ID",
        &[("schemeAgencyID", "6"), ("schemeID", "UN/ECE 5153")],
        "VAT",
    )?;
    w.close()?;
    w.close()?;
    w.close()?;
    w.close()?;

    w.open("cac:Item")?;
    w.leaf("cbc:Name", &item.item_name)?;
    w.close()?;

    w.open("cac:Price")?;
    w.amount("cbc:PriceAmount", item.item_sale_price_exc)?;
    w.open("cac:AllowanceCharge")?;
    w.leaf("cbc:ChargeIndicator", "false")?;
    w.leaf("cbc:AllowanceChargeReason", "DISCOUNT")?;
    w.amount("cbc:Amount", item.item_disc_exc)?;
    w.close()?;
    w.close()?;

    w.close()
}

#[cfg(test)]
mod tests {
    use super::super::{InvoiceKind, PaymentMethod, TransactionType};
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample(items: Vec<EInvoiceItem>) -> EInvoiceData {
        let mut data = EInvoiceData {
            transaction_number: "G260001".into(),
            uuid: "6f1c1f38-3c39-4b8a-9a36-3f0b0b1f2a10".into(),
            transaction_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            transaction_type: TransactionType::Invoice,
            payment_method: PaymentMethod::Cash,
            invoice_kind: InvoiceKind::GeneralSales,
            sequence: 1,
            tax_number: "12345678".into(),
            activity_number: "9876543".into(),
            client_name: "Conference Organizer".into(),
            buyer_name: "Rana & Sami".into(),
            buyer_tax_number: None,
            city_code: "JO-AM".into(),
            postal_code: "11118".into(),
            currency: "JOD".into(),
            total: dec!(500),
            total_discount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            special_tax: Decimal::ZERO,
            note: None,
            items,
        };
        data.sum_items();
        data
    }

    #[test]
    fn test_inclusive_total_round_trips() {
        let item = EInvoiceItem::from_inclusive(
            "Participation Fees",
            Decimal::ONE,
            dec!(500),
            Decimal::ZERO,
            dec!(16),
        );
        let totals = document_totals(&sample(vec![item]));
        assert_eq!(format_fils(totals.tax_exclusive), "431.034");
        assert_eq!(format_fils(totals.tax), "68.966");
        assert_eq!(format_fils(totals.tax_inclusive), "500.000");
        assert_eq!(totals.payable, totals.tax_inclusive);
    }

    #[test]
    fn test_discount_reduces_inclusive_total() {
        let item = EInvoiceItem::from_inclusive(
            "Participation Fees",
            Decimal::ONE,
            dec!(116),
            dec!(11.6),
            dec!(16),
        );
        let totals = document_totals(&sample(vec![item]));
        assert_eq!(totals.tax_exclusive, dec!(110));
        assert_eq!(totals.discount, dec!(10));
        assert_eq!(totals.tax_inclusive, dec!(116));
    }

    #[test]
    fn test_invoice_xml_structure() {
        let item = EInvoiceItem::from_inclusive(
            "Participation Fees",
            Decimal::ONE,
            dec!(500),
            Decimal::ZERO,
            dec!(16),
        );
        let xml = build_invoice_xml(&sample(vec![item])).unwrap();

        assert!(xml.contains("<cbc:ProfileID>reporting:1.0</cbc:ProfileID>"));
        assert!(xml.contains("<cbc:InvoiceTypeCode name=\"012\">388</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cbc:IssueDate>2026-05-04</cbc:IssueDate>"));
        assert!(xml.contains("<cbc:PayableAmount currencyID=\"JO\">500.000</cbc:PayableAmount>"));
        assert!(xml.contains("<cbc:Percent>16</cbc:Percent>"));
        assert!(xml.contains("Rana &amp; Sami"));
        assert!(!xml.contains("BillingReference"));
    }

    #[test]
    fn test_reversal_references_original() {
        let item = EInvoiceItem::from_inclusive(
            "Participation Fees",
            Decimal::ONE,
            dec!(50),
            Decimal::ZERO,
            dec!(16),
        );
        let mut invoice = sample(vec![item]);
        invoice.transaction_type = TransactionType::CreditNote;
        let reversal = ReverseEInvoiceData {
            invoice,
            original_uuid: "orig-uuid".into(),
            original_number: "G260001".into(),
            original_total: dec!(500),
            reason: "Overpayment refund".into(),
        };
        let xml = build_reversal_xml(&reversal).unwrap();

        assert!(xml.contains(">381</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cbc:UUID>orig-uuid</cbc:UUID>"));
        assert!(xml.contains("<cbc:DocumentDescription>500.000</cbc:DocumentDescription>"));
        assert!(xml.contains("<cbc:InstructionNote>Overpayment refund</cbc:InstructionNote>"));
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = build_invoice_xml(&sample(vec![])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
