use std::sync::Arc;

use chrono::Utc;

use brokerage_core::audit::TracingAuditSink;
use brokerage_core::domain::sale::SaleId;
use brokerage_core::errors::ApplicationError;
use brokerage_db::{RecalculationService, Repositories};

use crate::commands::{build_runtime, load_config, open_database, CommandResult};

pub fn run(sale: String, position: usize) -> CommandResult {
    let config = match load_config("pay") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("pay") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let sale_id = SaleId(sale);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let catalog = config.developments.catalog();
        let service = RecalculationService::new(
            Repositories::sqlite(pool.clone(), catalog.clone()),
            catalog,
            config.commission.calculation_settings(),
            Arc::new(TracingAuditSink),
        );
        let paid = service.mark_distribution_paid(&sale_id, position, Utc::now()).await.map_err(
            |error| {
                let exit_code = match error {
                    ApplicationError::Domain(_) => 7u8,
                    _ => 5u8,
                };
                (error.error_class(), error.to_string(), exit_code)
            },
        );
        pool.close().await;
        paid
    });

    match result {
        Ok(row) => CommandResult::success_with_details(
            "pay",
            format!("marked {} row {position} ({}) as paid", sale_id, row.role.as_str()),
            Some(&row),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("pay", error_class, message, exit_code)
        }
    }
}
