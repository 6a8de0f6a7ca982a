use std::sync::Arc;

use tenantry_core::audit::AuditContext;
use tenantry_core::config::LoadOptions;
use tenantry_core::domain::organization::OrganizationId;
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::{InvoiceIdAllocator, SequenceStrategy};
use tenantry_db::connection::connect_with_config;
use tenantry_db::{SqlInvoiceRepository, SqlOrganizationRepository, SqlSequenceCounter};

use crate::commands::{
    current_thread_runtime, load_config, CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_FAILURE,
};

const COMMAND: &str = "next-invoice-id";

/// Prints the identifier the next invoice of `organization` would receive.
///
/// Under the `counter` strategy this consumes a sequence value.
pub fn run(options: LoadOptions, organization: &str) -> CommandResult {
    if organization.trim().is_empty() {
        return CommandResult::failure(
            COMMAND,
            "bad_input",
            "--organization must not be blank",
            EXIT_CONFIG,
        );
    }
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        let organizations = Arc::new(SqlOrganizationRepository::new(pool.clone()));
        let invoices = Arc::new(SqlInvoiceRepository::new(pool.clone()));
        let mut allocator = InvoiceIdAllocator::new(organizations, invoices);
        if config.invoicing.sequence_strategy == SequenceStrategy::Counter {
            allocator = allocator.with_counter(Arc::new(SqlSequenceCounter::new(pool.clone())));
        }

        let allocated = allocator
            .next_identifier(
                &OrganizationId(organization.trim().to_string()),
                &AuditContext::system("cli"),
            )
            .await;
        pool.close().await;

        allocated.map_err(|error| {
            let exit_code = match error {
                ApplicationError::Persistence(_) => EXIT_DATABASE,
                _ => EXIT_FAILURE,
            };
            (error.error_class(), error.to_string(), exit_code)
        })
    });

    match result {
        Ok(allocated) => CommandResult::success(COMMAND, allocated.identifier.to_string()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(COMMAND, error_class, message, exit_code)
        }
    }
}
