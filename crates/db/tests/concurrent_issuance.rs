use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;
use tenantry_core::audit::AuditContext;
use tenantry_core::domain::invoice::NewInvoice;
use tenantry_core::domain::organization::{Organization, OrganizationId};
use tenantry_core::invoicing::{InvoiceIdAllocator, InvoiceIssuer};
use tenantry_db::{
    connect_with_settings, migrations, OrganizationRepository, SqlInvoiceRepository,
    SqlOrganizationRepository, SqlSequenceCounter,
};

const WORKERS: usize = 12;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counter_strategy_never_hands_out_duplicates_under_contention() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("issuance.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let organizations = Arc::new(SqlOrganizationRepository::new(pool.clone()));
    organizations.save(Organization::new("org-g", "Google")).await.expect("organization");
    let invoices = Arc::new(SqlInvoiceRepository::new(pool.clone()));
    let allocator = InvoiceIdAllocator::new(organizations, invoices.clone())
        .with_counter(Arc::new(SqlSequenceCounter::new(pool.clone())));
    let issuer = InvoiceIssuer::new(allocator, invoices);

    let mut handles = Vec::with_capacity(WORKERS);
    for worker in 0..WORKERS {
        let issuer = issuer.clone();
        handles.push(tokio::spawn(async move {
            let draft = NewInvoice {
                organization_id: OrganizationId("org-g".to_string()),
                customer_name: format!("Customer {worker}"),
                currency: "USD".to_string(),
                total: Decimal::new(2_500, 2),
            };
            issuer
                .issue(draft, &AuditContext::new(format!("worker-{worker}"), "test"))
                .await
                .expect("issue")
        }));
    }

    let mut identifiers = BTreeSet::new();
    for handle in handles {
        let invoice = handle.await.expect("join");
        identifiers.insert(invoice.identifier.expect("identifier assigned"));
    }

    let expected: BTreeSet<String> =
        (1..=WORKERS).map(|sequence| format!("GOO-{sequence:04}")).collect();
    assert_eq!(identifiers, expected);

    pool.close().await;
}
