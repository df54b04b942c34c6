//! `brokerage validate`: checks a commission document and, with `--apply`,
//! stores it.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use brokerage_core::audit::TracingAuditSink;
use brokerage_core::commission::validator::{
    validate_commission_config, ConfigValidationInput, ConfigViolation,
};
use brokerage_core::domain::commission_config::{CommissionConfig, GlobalRoles};
use brokerage_core::domain::partner::ProductPartner;
use brokerage_core::domain::rule::CommissionRule;
use brokerage_db::repositories::{
    ConfigRepository, PartnerRepository, RepositoryError, RuleRepository,
};
use brokerage_db::{RecalculationService, Repositories};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepError};

/// Commission setup as kept in version control.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommissionDocument {
    #[serde(default)]
    pub global_roles: GlobalRoles,
    #[serde(default)]
    pub developments: Vec<CommissionConfig>,
    #[serde(default)]
    pub rules: Vec<CommissionRule>,
    #[serde(default)]
    pub partners: Vec<ProductPartner>,
}

#[derive(Debug, Serialize)]
struct DevelopmentReport {
    development: String,
    valid: bool,
    violations: Vec<ConfigViolation>,
}

pub fn load_document(path: &Path) -> anyhow::Result<CommissionDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read commission document `{}`", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("could not parse commission document `{}`", path.display()))
}

pub fn run(file: &Path, apply: bool) -> CommandResult {
    let document = match load_document(file) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure("validate", "input_file", format!("{error:#}"), 6)
        }
    };

    let reports: Vec<DevelopmentReport> = document
        .developments
        .iter()
        .map(|config| {
            let validation = validate_commission_config(ConfigValidationInput {
                config,
                global_roles: &document.global_roles,
            });
            DevelopmentReport {
                development: config.development.to_string(),
                valid: validation.valid,
                violations: validation.violations,
            }
        })
        .collect();

    let invalid = reports.iter().filter(|report| !report.valid).count();
    if invalid > 0 {
        return CommandResult::failure_with_details(
            "validate",
            "validation",
            format!("{invalid} of {} development configurations are invalid", reports.len()),
            7,
            Some(&reports),
        );
    }

    if !apply {
        return CommandResult::success_with_details(
            "validate",
            format!("{} development configurations are valid", reports.len()),
            Some(&reports),
        );
    }

    let config = match load_config("validate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("validate") {
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
        let applied = apply_document(&service, document).await;
        pool.close().await;
        applied
    });

    match result {
        Ok(()) => CommandResult::success_with_details(
            "validate",
            format!("applied {} development configurations", reports.len()),
            Some(&reports),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("validate", error_class, message, exit_code)
        }
    }
}

async fn apply_document(
    service: &RecalculationService,
    document: CommissionDocument,
) -> Result<(), StepError> {
    let repositories = service.repositories();
    let persistence = |error: RepositoryError| {
        ("persistence", error.to_string(), 5u8)
    };

    repositories.configs.save_global_roles(document.global_roles).await.map_err(persistence)?;
    for config in document.developments {
        service
            .save_config(config)
            .await
            .map_err(|error| (error.error_class(), error.to_string(), 7u8))?;
    }
    for mut rule in document.rules {
        rule.development = service.catalog().canonicalize(rule.development.as_str());
        repositories.rules.save(rule).await.map_err(persistence)?;
    }
    for mut partner in document.partners {
        partner.development = service.catalog().canonicalize(partner.development.as_str());
        repositories.partners.save(partner).await.map_err(persistence)?;
    }
    Ok(())
}
