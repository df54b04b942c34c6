use std::sync::Arc;

use brokerage_core::audit::TracingAuditSink;
use brokerage_core::commission::FreezePolicy;
use brokerage_core::domain::sale::SaleId;
use brokerage_db::{BatchRequest, RecalculationService, Repositories};

use crate::commands::{build_runtime, load_config, open_database, CommandResult};

pub fn run(sale_ids: Vec<String>, refresh: bool) -> CommandResult {
    let config = match load_config("recalculate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("recalculate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let request = BatchRequest {
        sale_ids: sale_ids.into_iter().map(SaleId).collect(),
        freeze_policy: if refresh { FreezePolicy::Refresh } else { FreezePolicy::KeepFrozen },
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let catalog = config.developments.catalog();
        let service = RecalculationService::new(
            Repositories::sqlite(pool.clone(), catalog.clone()),
            catalog,
            config.commission.calculation_settings(),
            Arc::new(TracingAuditSink),
        );
        let summary = service
            .recalculate_batch(request)
            .await
            .map_err(|error| (error.error_class(), error.to_string(), 5u8));
        pool.close().await;
        summary
    });

    match result {
        Ok(summary) if !summary.has_failures() => CommandResult::success_with_details(
            "recalculate",
            format!(
                "processed {}, skipped {}, failed {}",
                summary.processed, summary.skipped, summary.failed
            ),
            Some(&summary),
        ),
        Ok(summary) => CommandResult::failure_with_details(
            "recalculate",
            "batch_failures",
            format!(
                "processed {}, skipped {}, failed {}",
                summary.processed, summary.skipped, summary.failed
            ),
            7,
            Some(&summary),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("recalculate", error_class, message, exit_code)
        }
    }
}
