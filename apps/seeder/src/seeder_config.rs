use std::env;

use rolescope_application::{BatchOptions, FailurePolicy};
use rolescope_core::{AppError, AppResult, OrgId};
use tracing_subscriber::EnvFilter;

/// Backing store selected through `PERMISSION_STORE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeederConfig {
    pub store: StoreConfig,
    pub org_id: OrgId,
    pub users: usize,
    pub resources: usize,
    pub batch: BatchOptions,
}

impl SeederConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let store = match lookup("PERMISSION_STORE")
            .unwrap_or_else(|| "memory".to_owned())
            .trim()
        {
            "memory" => StoreConfig::Memory,
            "postgres" => StoreConfig::Postgres {
                database_url: required_non_empty(&lookup, "DATABASE_URL")?,
            },
            other => {
                return Err(AppError::Validation(format!(
                    "PERMISSION_STORE must be either 'memory' or 'postgres', got '{other}'"
                )));
            }
        };

        let org_id = OrgId::new(parse_or(&lookup, "SEED_ORG_ID", 1_i64)?);
        let users = parse_or(&lookup, "SEED_USERS", 10_usize)?;
        let resources = parse_or(&lookup, "SEED_RESOURCES", 1000_usize)?;
        let workers = parse_or(&lookup, "SEED_WORKERS", 20_usize)?;
        let batch_size = parse_or(&lookup, "SEED_BATCH_SIZE", 1000_usize)?;

        if workers == 0 {
            return Err(AppError::Validation(
                "SEED_WORKERS must be greater than zero".to_owned(),
            ));
        }

        if batch_size == 0 {
            return Err(AppError::Validation(
                "SEED_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }

        let failure_policy = match lookup("SEED_FAILURE_POLICY")
            .unwrap_or_else(|| "drain".to_owned())
            .trim()
        {
            "drain" => FailurePolicy::DrainDispatched,
            "cancel" => FailurePolicy::CancelRemaining,
            other => {
                return Err(AppError::Validation(format!(
                    "SEED_FAILURE_POLICY must be either 'drain' or 'cancel', got '{other}'"
                )));
            }
        };

        Ok(Self {
            store,
            org_id,
            users,
            resources,
            batch: BatchOptions::new(workers, batch_size).with_failure_policy(failure_policy),
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    let value = lookup(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
