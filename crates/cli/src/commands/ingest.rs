use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use serde_json::{Map, Value};

use brokerage_core::audit::TracingAuditSink;
use brokerage_db::{RecalculationService, Repositories};

use crate::commands::{build_runtime, load_config, open_database, CommandResult};

#[derive(Debug, Default, Serialize)]
struct IngestReport {
    stored: Vec<String>,
    rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Serialize)]
struct RejectedRecord {
    index: usize,
    message: String,
}

/// Accepts a top-level array of records or an object with a `records` array.
pub fn load_records(path: &Path) -> anyhow::Result<Vec<Map<String, Value>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read records file `{}`", path.display()))?;
    let document: Value = serde_json::from_str(&raw)
        .with_context(|| format!("could not parse records file `{}`", path.display()))?;

    let records = match document {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("records") {
            Some(Value::Array(records)) => records,
            _ => bail!("records file `{}` has no `records` array", path.display()),
        },
        _ => bail!("records file `{}` must hold an array of objects", path.display()),
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| match record {
            Value::Object(fields) => Ok(fields),
            other => bail!("record {index} is not an object: {other}"),
        })
        .collect()
}

pub fn run(file: &Path) -> CommandResult {
    let records = match load_records(file) {
        Ok(records) => records,
        Err(error) => {
            return CommandResult::failure("ingest", "input_file", format!("{error:#}"), 6)
        }
    };
    let config = match load_config("ingest") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("ingest") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
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

        let mut report = IngestReport::default();
        for (index, record) in records.iter().enumerate() {
            match service.ingest_record(record).await {
                Ok(sale_id) => report.stored.push(sale_id.0),
                Err(error) => {
                    report.rejected.push(RejectedRecord { index, message: error.to_string() })
                }
            }
        }
        pool.close().await;
        Ok::<IngestReport, super::StepError>(report)
    });

    match result {
        Ok(report) if report.rejected.is_empty() => CommandResult::success_with_details(
            "ingest",
            format!("stored {} sales", report.stored.len()),
            Some(&report),
        ),
        Ok(report) => CommandResult::failure_with_details(
            "ingest",
            "invalid_record",
            format!("stored {} sales, rejected {}", report.stored.len(), report.rejected.len()),
            7,
            Some(&report),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ingest", error_class, message, exit_code)
        }
    }
}
