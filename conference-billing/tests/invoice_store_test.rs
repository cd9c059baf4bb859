//! Invoice issuing, serial allocation, versions and company invoices.

mod common;

use common::{
    jordanian_company, participation_type, registration_details, spouse, TestServices,
};
use conference_billing::models::{
    CompanyInvoiceStatus, CreateCompanyInvoice, FeeCategory, RegistrationStatus,
};
use conference_billing::services::lifecycle::{AdminInvoiceUpdate, LineAdjustment};
use conference_billing::services::outbox::BillingEvent;
use conference_billing::services::BillingStore;
use rust_decimal_macros::dec;
use service_core::error::AppError;
use uuid::Uuid;

#[tokio::test]
async fn create_invoice_is_idempotent() {
    let mut services = TestServices::new();
    let registration_id = services
        .seed(registration_details(participation_type(dec!(500))))
        .await;

    let first = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice");
    let second = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to re-create invoice");

    assert_eq!(first.invoice_id, second.invoice_id);
    assert_eq!(
        serde_json::to_value(&first).expect("serialize"),
        serde_json::to_value(&second).expect("serialize")
    );
    assert_eq!(services.store.invoices_for(registration_id).await.len(), 1);
    assert_eq!(
        services.drain_events(),
        vec![BillingEvent::InvoiceIssued {
            invoice_id: first.invoice_id
        }]
    );
}

#[tokio::test]
async fn serials_are_allocated_in_order() {
    let services = TestServices::new();
    let mut serials = Vec::new();
    for _ in 0..3 {
        let id = services
            .seed(registration_details(participation_type(dec!(500))))
            .await;
        let invoice = services
            .invoices
            .create_invoice(id)
            .await
            .expect("Failed to create invoice");
        serials.push(invoice.serial_number);
    }

    assert_eq!(serials, vec!["G260001", "G260002", "G260003"]);
}

#[tokio::test]
async fn concurrent_creation_never_reuses_a_serial() {
    let services = TestServices::new();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let id = services
            .seed(registration_details(participation_type(dec!(500))))
            .await;
        let invoices = services.invoices.clone();
        handles.push(tokio::spawn(async move { invoices.create_invoice(id).await }));
    }

    let mut serials = Vec::new();
    for handle in handles {
        let invoice = handle
            .await
            .expect("Task panicked")
            .expect("Failed to create invoice");
        serials.push(invoice.serial_number);
    }
    serials.sort();
    serials.dedup();
    assert_eq!(serials.len(), 8);
}

#[tokio::test]
async fn unknown_registration_is_not_found() {
    let services = TestServices::new();
    let err = services
        .invoices
        .create_invoice(Uuid::new_v4())
        .await
        .expect_err("Expected missing registration");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn versioned_invoice_appends_count_to_first_serial() {
    let services = TestServices::new();
    let mut details = registration_details(participation_type(dec!(500)));
    let registration_id = details.registration.id;
    services.seed(details.clone()).await;

    let original = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice");

    // The registration gains a spouse before the second version.
    details.spouse = Some(spouse());
    services.seed(details).await;

    let second = services
        .invoices
        .create_versioned_invoice(registration_id)
        .await
        .expect("Failed to create version");
    let third = services
        .invoices
        .create_versioned_invoice(registration_id)
        .await
        .expect("Failed to create version");

    assert_eq!(second.serial_number, "G260001/2");
    assert_eq!(second.version, 2);
    assert_eq!(third.serial_number, "G260001/3");
    assert_eq!(second.lines.spouse.total, dec!(232));

    let stored_original = services
        .store
        .get_invoice(original.invoice_id)
        .await
        .expect("store")
        .expect("original kept");
    assert_eq!(stored_original.serial_number, "G260001");
    assert_eq!(stored_original.lines.spouse.total, dec!(0));

    let latest = services
        .invoices
        .latest_invoice(registration_id)
        .await
        .expect("latest");
    assert_eq!(latest.invoice_id, third.invoice_id);

    // Versions do not consume registration serials.
    let other = services
        .seed(registration_details(participation_type(dec!(500))))
        .await;
    let next = services
        .invoices
        .create_invoice(other)
        .await
        .expect("Failed to create invoice");
    assert_eq!(next.serial_number, "G260002");
}

#[tokio::test]
async fn versioned_invoice_without_original_issues_the_first() {
    let services = TestServices::new();
    let registration_id = services
        .seed(registration_details(participation_type(dec!(500))))
        .await;

    let invoice = services
        .invoices
        .create_versioned_invoice(registration_id)
        .await
        .expect("Failed to create invoice");
    assert_eq!(invoice.serial_number, "G260001");
    assert_eq!(invoice.version, 1);
}

#[tokio::test]
async fn confirm_registration_issues_invoice() {
    let services = TestServices::new();
    let registration_id = services
        .seed(registration_details(participation_type(dec!(500))))
        .await;

    let invoice = services
        .invoices
        .confirm_registration(registration_id)
        .await
        .expect("Failed to confirm");
    let details = services
        .store
        .get_registration_details(registration_id)
        .await
        .expect("store")
        .expect("registration");
    assert_eq!(details.registration.status, RegistrationStatus::Confirmed);
    assert_eq!(invoice.total_value_usd, dec!(580));

    let again = services
        .invoices
        .confirm_registration(registration_id)
        .await
        .expect("Confirming twice should succeed");
    assert_eq!(again.invoice_id, invoice.invoice_id);
}

#[tokio::test]
async fn draft_and_cancelled_registrations_cannot_be_confirmed() {
    let services = TestServices::new();
    for status in [RegistrationStatus::Draft, RegistrationStatus::Cancelled] {
        let mut details = registration_details(participation_type(dec!(500)));
        details.registration.status = status;
        let id = services.seed(details).await;

        let err = services
            .invoices
            .confirm_registration(id)
            .await
            .expect_err("Expected rejection");
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(services.store.invoices_for(id).await.is_empty());
    }
}

#[tokio::test]
async fn recalculate_keeps_admin_adjustments() {
    let services = TestServices::new();
    let mut details = registration_details(participation_type(dec!(500)));
    let registration_id = details.registration.id;
    services.seed(details.clone()).await;
    let invoice = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice");

    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            AdminInvoiceUpdate {
                lines: vec![LineAdjustment {
                    category: FeeCategory::Participation,
                    discount: Some(dec!(80)),
                    disclosure: Some("Speaker discount".to_string()),
                    paid: None,
                }],
                ..AdminInvoiceUpdate::default()
            },
        )
        .await
        .expect("Failed to save discount");

    details.spouse = Some(spouse());
    services.seed(details).await;

    let recalculated = services
        .invoices
        .recalculate_invoice(invoice.invoice_id)
        .await
        .expect("Failed to recalculate");
    assert_eq!(recalculated.invoice_id, invoice.invoice_id);
    assert_eq!(recalculated.serial_number, "G260001");
    assert_eq!(recalculated.lines.participation.discount, dec!(80));
    assert_eq!(
        recalculated.lines.participation.disclosure.as_deref(),
        Some("Speaker discount")
    );
    assert_eq!(recalculated.total_fees, dec!(812));
    assert_eq!(recalculated.total_value_usd, dec!(732));
}

#[tokio::test]
async fn paid_invoice_cannot_be_recalculated() {
    let services = TestServices::new();
    let registration_id = services
        .seed(registration_details(participation_type(dec!(500))))
        .await;
    let invoice = services
        .invoices
        .create_invoice(registration_id)
        .await
        .expect("Failed to create invoice");
    services
        .lifecycle
        .admin_save_invoice(
            invoice.invoice_id,
            AdminInvoiceUpdate {
                lines: vec![LineAdjustment {
                    category: FeeCategory::Participation,
                    discount: None,
                    disclosure: None,
                    paid: Some(true),
                }],
                ..AdminInvoiceUpdate::default()
            },
        )
        .await
        .expect("Failed to mark paid");

    let err = services
        .invoices
        .recalculate_invoice(invoice.invoice_id)
        .await
        .expect_err("Expected conflict");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn company_invoice_converts_between_currencies() {
    let services = TestServices::new();
    let company = jordanian_company();
    services.store.insert_company(company.clone()).await;

    let in_dinars = services
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: company.id,
            description: "Sponsorship package".to_string(),
            amount: dec!(100),
            currency: "JD".to_string(),
        })
        .await
        .expect("Failed to create company invoice");
    let in_dollars = services
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: company.id,
            description: "Exhibition booth".to_string(),
            amount: dec!(100),
            currency: "USD".to_string(),
        })
        .await
        .expect("Failed to create company invoice");

    assert_eq!(in_dinars.serial_number, "C260001");
    assert_eq!(in_dinars.amount_jd, dec!(100));
    assert_eq!(in_dinars.amount_usd, dec!(140.85));
    assert_eq!(in_dinars.status, CompanyInvoiceStatus::Pending);

    assert_eq!(in_dollars.serial_number, "C260002");
    assert_eq!(in_dollars.amount_usd, dec!(100));
    assert_eq!(in_dollars.amount_jd, dec!(71));
}

#[tokio::test]
async fn company_invoice_is_paid_once() {
    let services = TestServices::new();
    let company = jordanian_company();
    services.store.insert_company(company.clone()).await;
    let invoice = services
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: company.id,
            description: "Sponsorship package".to_string(),
            amount: dec!(250),
            currency: "USD".to_string(),
        })
        .await
        .expect("Failed to create company invoice");

    let paid = services
        .company_invoices
        .mark_paid(invoice.invoice_id, Some("TRX-1001".to_string()))
        .await
        .expect("Failed to mark paid");
    assert_eq!(paid.status, CompanyInvoiceStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(paid.payment_reference.as_deref(), Some("TRX-1001"));

    let err = services
        .company_invoices
        .mark_paid(invoice.invoice_id, None)
        .await
        .expect_err("Expected conflict");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn company_invoice_validates_input() {
    let services = TestServices::new();
    let err = services
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: Uuid::new_v4(),
            description: "Unknown".to_string(),
            amount: dec!(10),
            currency: "USD".to_string(),
        })
        .await
        .expect_err("Expected missing company");
    assert!(matches!(err, AppError::NotFound(_)));

    let company = jordanian_company();
    services.store.insert_company(company.clone()).await;
    let err = services
        .company_invoices
        .create(CreateCompanyInvoice {
            company_id: company.id,
            description: "Nothing".to_string(),
            amount: dec!(0),
            currency: "USD".to_string(),
        })
        .await
        .expect_err("Expected rejection");
    assert!(matches!(err, AppError::BadRequest(_)));
}
