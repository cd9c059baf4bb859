//! Admin edits, payment status and e-invoice synchronisation.

mod common;

use common::{
    jordanian_company, participation_type, registration_details, trip_booking, with_company,
    RecordingGateway, TestServices, TEST_QR, TEST_VERIFICATION_URL,
};
use conference_billing::models::{
    FawaterkomStatus, FeeCategory, Invoice, PaymentSource, PaymentStatus, TripParticipant,
};
use conference_billing::services::einvoice::{PaymentMethod, TransactionType};
use conference_billing::services::lifecycle::{AdminInvoiceUpdate, LineAdjustment};
use conference_billing::services::outbox::BillingEvent;
use conference_billing::services::BillingStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;

fn paid(category: FeeCategory, paid: bool) -> LineAdjustment {
    LineAdjustment {
        category,
        discount: None,
        disclosure: None,
        paid: Some(paid),
    }
}

fn discount(category: FeeCategory, amount: Decimal) -> LineAdjustment {
    LineAdjustment {
        category,
        discount: Some(amount),
        disclosure: None,
        paid: None,
    }
}

fn update(lines: Vec<LineAdjustment>) -> AdminInvoiceUpdate {
    AdminInvoiceUpdate {
        lines,
        ..AdminInvoiceUpdate::default()
    }
}

/// Issue an invoice for a registration with a participation fee and, when
/// given, a registrant trip.
async fn issue(services: &TestServices, trip: Option<Decimal>) -> Invoice {
    let mut details = registration_details(participation_type(dec!(500)));
    if let Some(price) = trip {
        details
            .trips
            .push(trip_booking(price, "USD", TripParticipant::Registrant));
    }
    let registration_id = services.seed(details).await;
    services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice")
}

async fn registration_payment_status(services: &TestServices, registration_id: Uuid) -> PaymentStatus {
    services
        .store
        .get_registration_details(registration_id)
        .await
        .expect("store")
        .expect("registration")
        .registration
        .payment_status
}

#[tokio::test]
async fn paying_the_only_category_settles_the_invoice() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, None).await;
    assert_eq!(invoice.total_fees, dec!(500));

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save invoice");

    assert!(outcome.success);
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    let saved = &outcome.invoice;
    assert_eq!(saved.paid_amount, dec!(500));
    assert_eq!(saved.balance, Decimal::ZERO);
    assert_eq!(saved.paid_currency.as_deref(), Some("JOD"));
    assert_eq!(saved.payment_source, Some(PaymentSource::System));
    assert!(saved.paid_at.is_some());
    assert_eq!(
        registration_payment_status(&services, invoice.registration_id).await,
        PaymentStatus::Paid
    );

    let result = outcome.fawaterkom_result.expect("submission attempted");
    assert!(result.success);
    assert_eq!(saved.fawaterkom_status, Some(FawaterkomStatus::Submitted));
    assert_eq!(saved.einvoice_number.as_deref(), Some("G260001"));
    assert_eq!(saved.einvoice_total, Some(dec!(355)));
    assert_eq!(saved.einvoice_sequence, 1);
    assert_eq!(saved.qr_code.as_deref(), Some(TEST_QR));
    assert_eq!(saved.verification_url.as_deref(), Some(TEST_VERIFICATION_URL));
    assert!(saved.lines.participation.reported);

    let submissions = services.gateway.submissions();
    assert_eq!(submissions.len(), 1);
    let document = &submissions[0];
    assert_eq!(document.transaction_type, TransactionType::Invoice);
    assert_eq!(document.payment_method, PaymentMethod::Cash);
    assert_eq!(document.currency, "JOD");
    assert_eq!(document.total, dec!(355));
    assert_eq!(document.items.len(), 1);
    assert_eq!(document.items[0].item_name, "Participation Fees");
    assert_eq!(
        saved.fawaterkom_invoice_id.as_deref(),
        Some(format!("gw-{}", document.uuid).as_str())
    );
    assert_eq!(saved.einvoice_uuid.as_deref(), Some(document.uuid.as_str()));
}

#[tokio::test]
async fn paying_part_of_the_invoice_is_partial() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, Some(dec!(120))).await;

    let outcome = services
        .lifecycle
        .admin_save_invoice(invoice.invoice_id, update(vec![paid(FeeCategory::Trip, true)]))
        .await
        .expect("Failed to save invoice");

    assert_eq!(outcome.payment_status, PaymentStatus::Partial);
    assert_eq!(outcome.invoice.paid_amount, dec!(120));
    assert_eq!(outcome.invoice.balance, dec!(500));
    assert_eq!(
        registration_payment_status(&services, invoice.registration_id).await,
        PaymentStatus::Partial
    );

    // Paying the rest reports only the newly paid category.
    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save invoice");
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    assert!(outcome.reversal_result.is_none());

    let submissions = services.gateway.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].transaction_number, "G260001");
    assert_eq!(submissions[0].total, dec!(85.2));
    assert_eq!(submissions[1].transaction_number, "G260001-2");
    assert_eq!(submissions[1].sequence, 2);
    assert_eq!(submissions[1].total, dec!(355));
    assert_eq!(submissions[1].items.len(), 1);
    assert_eq!(outcome.invoice.einvoice_sequence, 2);
}

#[tokio::test]
async fn gateway_failure_does_not_undo_the_payment() {
    let services = TestServices::with_gateway(RecordingGateway::failing());
    let invoice = issue(&services, None).await;

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Save must succeed even when the gateway fails");

    assert!(outcome.success);
    let result = outcome.fawaterkom_result.expect("submission attempted");
    assert!(!result.success);
    assert!(result.error.is_some());

    let stored = services
        .store
        .get_invoice(invoice.invoice_id)
        .await
        .expect("store")
        .expect("invoice");
    assert_eq!(stored.paid_amount, dec!(580));
    assert_eq!(stored.balance, Decimal::ZERO);
    assert_eq!(stored.fawaterkom_status, Some(FawaterkomStatus::Failed));
    assert!(!stored.lines.participation.reported);
    assert_eq!(stored.einvoice_sequence, 0);
    assert_eq!(
        registration_payment_status(&services, invoice.registration_id).await,
        PaymentStatus::Paid
    );

    // A manual resubmission once the gateway recovers.
    services.gateway.set_failing(false);
    let retry = services
        .lifecycle
        .submit_to_fawaterkom(invoice.invoice_id)
        .await
        .expect("Failed to resubmit");
    assert!(retry.result.success);
    assert_eq!(retry.invoice.fawaterkom_status, Some(FawaterkomStatus::Submitted));
    assert!(retry.invoice.lines.participation.reported);
    assert_eq!(retry.invoice.einvoice_number.as_deref(), Some("G260001"));

    let err = services
        .lifecycle
        .submit_to_fawaterkom(invoice.invoice_id)
        .await
        .expect_err("Nothing left to submit");
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn reversal_is_refused_unless_overpaid() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, None).await;
    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save invoice");
    let calls_before = services.gateway.calls().len();

    let outcome = services
        .lifecycle
        .reverse_fawaterkom_invoice(invoice.invoice_id, None)
        .await
        .expect("Reversal check must not error");

    assert!(!outcome.result.success);
    assert_eq!(services.gateway.calls().len(), calls_before);
    assert_eq!(outcome.invoice.fawaterkom_status, Some(FawaterkomStatus::Submitted));
}

#[tokio::test]
async fn overpaid_invoice_is_reversed_with_a_credit_note() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, Some(dec!(120))).await;
    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![
                paid(FeeCategory::Participation, true),
                paid(FeeCategory::Trip, true),
            ]),
        )
        .await
        .expect("Failed to save payment");
    let original = services.gateway.submissions()[0].clone();
    assert_eq!(original.total, dec!(440.2));

    // A discount larger than the trip line leaves the invoice overpaid.
    let outcome = services
        .lifecycle
        .admin_save_invoice(invoice.invoice_id, update(vec![discount(FeeCategory::Trip, dec!(200))]))
        .await
        .expect("Failed to save discount");
    assert_eq!(outcome.invoice.balance, dec!(-80));
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    assert!(outcome.fawaterkom_result.is_none());

    let reversed = services
        .lifecycle
        .reverse_fawaterkom_invoice(invoice.invoice_id, Some("Trip cancelled".to_string()))
        .await
        .expect("Failed to reverse");
    assert!(reversed.result.success);
    assert_eq!(reversed.invoice.fawaterkom_status, Some(FawaterkomStatus::Reversed));
    assert_eq!(reversed.invoice.einvoice_sequence, 2);

    let reversals = services.gateway.reversals();
    assert_eq!(reversals.len(), 1);
    let credit_note = &reversals[0];
    assert_eq!(credit_note.invoice.transaction_type, TransactionType::CreditNote);
    assert_eq!(credit_note.invoice.transaction_number, "G260001-R2");
    assert_eq!(credit_note.invoice.total, dec!(56.8));
    assert_eq!(credit_note.original_uuid, original.uuid);
    assert_eq!(credit_note.original_number, "G260001");
    assert_eq!(credit_note.original_total, dec!(440.2));
    assert_eq!(credit_note.reason, "Trip cancelled");
}

#[tokio::test]
async fn newly_paid_category_after_overpayment_reverses_first() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, Some(dec!(120))).await;
    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save payment");

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![LineAdjustment {
                category: FeeCategory::Trip,
                discount: Some(dec!(200)),
                disclosure: Some("Trip cancelled".to_string()),
                paid: Some(true),
            }]),
        )
        .await
        .expect("Failed to save");

    let reversal = outcome.reversal_result.expect("reversal attempted");
    assert!(reversal.success);
    assert_eq!(services.gateway.reversals().len(), 1);
    // The trip line has nothing left to report once discounted to zero.
    assert!(outcome.fawaterkom_result.is_none());
    assert_eq!(services.gateway.submissions().len(), 1);

    let err = services
        .lifecycle
        .submit_to_fawaterkom(invoice.invoice_id)
        .await
        .expect_err("Nothing to submit");
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(services.gateway.submissions().len(), 1);
}

#[tokio::test]
async fn unpaying_a_line_clears_its_reported_flag() {
    let services = TestServices::untaxed();
    let invoice = issue(&services, None).await;
    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save payment");

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, false)]),
        )
        .await
        .expect("Failed to undo payment");
    assert_eq!(outcome.payment_status, PaymentStatus::Unpaid);
    assert!(!outcome.invoice.lines.participation.reported);
    assert!(outcome.fawaterkom_result.is_none());
    assert!(outcome.invoice.paid_at.is_some(), "paid_at is never cleared");

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save payment again");
    assert!(outcome.fawaterkom_result.expect("resubmitted").success);
    assert_eq!(outcome.invoice.einvoice_number.as_deref(), Some("G260001-2"));
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    let services = TestServices::new();
    let invoice = issue(&services, None).await;

    let err = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            AdminInvoiceUpdate {
                lines: vec![discount(FeeCategory::Participation, dec!(10))],
                expected_revision: Some(invoice.revision + 1),
                notify: false,
            },
        )
        .await
        .expect_err("Expected conflict");
    assert!(err.is_conflict());

    let outcome = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            AdminInvoiceUpdate {
                lines: vec![discount(FeeCategory::Participation, dec!(10))],
                expected_revision: Some(invoice.revision),
                notify: false,
            },
        )
        .await
        .expect("Matching revision should save");
    assert_eq!(outcome.invoice.revision, invoice.revision + 1);
    assert_eq!(outcome.invoice.total_value_usd, dec!(570));
}

#[tokio::test]
async fn invalid_adjustments_are_rejected() {
    let services = TestServices::new();
    let invoice = issue(&services, None).await;

    let err = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![discount(FeeCategory::Participation, dec!(-5))]),
        )
        .await
        .expect_err("Expected negative discount rejection");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![LineAdjustment {
                category: FeeCategory::Participation,
                discount: None,
                disclosure: Some("x".repeat(501)),
                paid: None,
            }]),
        )
        .await
        .expect_err("Expected disclosure length rejection");
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = services
        .lifecycle
        .admin_save_invoice(Uuid::new_v4(), update(Vec::new()))
        .await
        .expect_err("Expected missing invoice");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn notify_queues_a_receipt() {
    let mut services = TestServices::new();
    let invoice = issue(&services, None).await;
    services.drain_events();

    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            AdminInvoiceUpdate {
                lines: vec![paid(FeeCategory::Participation, true)],
                expected_revision: None,
                notify: true,
            },
        )
        .await
        .expect("Failed to save invoice");
    assert_eq!(
        services.drain_events(),
        vec![BillingEvent::ReceiptRequested {
            invoice_id: invoice.invoice_id
        }]
    );

    services
        .lifecycle
        .admin_save_invoice(invoice.invoice_id, update(Vec::new()))
        .await
        .expect("Failed to save invoice");
    assert!(services.drain_events().is_empty());
}

#[tokio::test]
async fn company_credentials_are_used_for_submission() {
    let services = TestServices::new();
    let mut company = jordanian_company();
    company.fawaterkom_client_id = Some("company-client".to_string());
    company.fawaterkom_secret_key = Some("company-secret".to_string());
    let details = with_company(registration_details(participation_type(dec!(500))), company);
    let registration_id = services.seed(details).await;
    let invoice = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice");

    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            update(vec![paid(FeeCategory::Participation, true)]),
        )
        .await
        .expect("Failed to save invoice");

    let calls = services.gateway.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        common::GatewayCall::Submit { data, client_id } => {
            assert_eq!(client_id.as_deref(), Some("company-client"));
            assert_eq!(data.buyer_tax_number.as_deref(), Some("55501234"));
            assert_eq!(data.buyer_name, "Rana Haddad");
        }
        other => panic!("unexpected gateway call: {:?}", other),
    }
}
