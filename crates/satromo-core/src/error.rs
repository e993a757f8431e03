use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SatromoError {
    #[error("not initialized: no satromo.yaml found under {0}")]
    NotInitialized(PathBuf),

    #[error(
        "unrecognized run context: neither the dev secrets file '{secrets_file}' \
         nor the '{secret_env}' environment variable is present"
    )]
    UnrecognizedRunContext {
        secrets_file: String,
        secret_env: String,
    },

    #[error(
        "inconsistent base collection for '{collection}': product '{product}' uses \
         '{found}' but another product uses '{expected}'"
    )]
    InconsistentBaseCollection {
        collection: String,
        product: String,
        expected: String,
        found: String,
    },

    #[error("no collection settings for '{0}'")]
    UnknownCollection(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("malformed record in {path}:{line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed job description '{0}': expected 'P:<product> I:<item>'")]
    MalformedDescription(String),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("compute service request failed: {0}")]
    Service(String),

    #[error("compute service returned {status} for {endpoint}: {body}")]
    ServiceStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("required tool '{0}' not found on PATH")]
    ToolNotFound(String),

    #[error("failed to spawn '{tool}': {reason}")]
    ToolSpawnFailed { tool: String, reason: String },

    #[error("'{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("'{tool}' did not finish within {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("missing partition outputs for '{stem}': {missing}")]
    MissingPartitionOutputs { stem: String, missing: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SatromoError>;
