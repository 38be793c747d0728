use scylla::errors::{DbError, ExecutionError, NewSessionError, PrepareError, RequestAttemptError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CqlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No hosts available: {0}")]
    NoHostsAvailable(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl CqlError {
    /// Errors that a fresh session is likely to get past.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CqlError::NoHostsAvailable(_) | CqlError::Execution(_) | CqlError::Timeout(_)
        )
    }

    /// Short label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CqlError::InvalidArgument(_) => "invalid_argument",
            CqlError::NoHostsAvailable(_) => "no_hosts_available",
            CqlError::Execution(_) => "execution",
            CqlError::Timeout(_) => "timeout",
            CqlError::Syntax(_) => "syntax",
            CqlError::Validation(_) => "validation",
            CqlError::Unauthorized(_) => "unauthorized",
            CqlError::Connection(_) => "connection",
            CqlError::ConfigError(_) => "config",
            CqlError::DatabaseError(_) => "database",
        }
    }
}

fn classify_db_error(db_error: &DbError, message: String) -> CqlError {
    match db_error {
        DbError::Unavailable { .. }
        | DbError::Overloaded
        | DbError::IsBootstrapping
        | DbError::ServerError
        | DbError::ReadFailure { .. }
        | DbError::WriteFailure { .. } => CqlError::Execution(message),
        DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. } => CqlError::Timeout(message),
        DbError::SyntaxError => CqlError::Syntax(message),
        DbError::Invalid | DbError::AlreadyExists { .. } | DbError::ConfigError => {
            CqlError::Validation(message)
        }
        DbError::Unauthorized | DbError::AuthenticationError => CqlError::Unauthorized(message),
        _ => CqlError::DatabaseError(message),
    }
}

fn classify_attempt_error(err: &RequestAttemptError, message: String) -> CqlError {
    match err {
        RequestAttemptError::DbError(db_error, _) => classify_db_error(db_error, message),
        RequestAttemptError::BrokenConnectionError(_) => CqlError::NoHostsAvailable(message),
        _ => CqlError::DatabaseError(message),
    }
}

impl From<ExecutionError> for CqlError {
    fn from(err: ExecutionError) -> Self {
        let message = err.to_string();
        match &err {
            ExecutionError::EmptyPlan | ExecutionError::ConnectionPoolError(_) => {
                CqlError::NoHostsAvailable(message)
            }
            ExecutionError::RequestTimeout(_) => CqlError::Timeout(message),
            ExecutionError::BadQuery(_) => CqlError::InvalidArgument(message),
            ExecutionError::LastAttemptError(attempt) => classify_attempt_error(attempt, message),
            ExecutionError::PrepareError(prepare) => classify_prepare_error(prepare, message),
            _ => CqlError::DatabaseError(message),
        }
    }
}

fn classify_prepare_error(err: &PrepareError, message: String) -> CqlError {
    match err {
        PrepareError::ConnectionPoolError(_) => CqlError::NoHostsAvailable(message),
        PrepareError::AllAttemptsFailed { first_attempt } => {
            classify_attempt_error(first_attempt, message)
        }
        _ => CqlError::DatabaseError(message),
    }
}

impl From<PrepareError> for CqlError {
    fn from(err: PrepareError) -> Self {
        let message = err.to_string();
        classify_prepare_error(&err, message)
    }
}

impl From<NewSessionError> for CqlError {
    fn from(err: NewSessionError) -> Self {
        CqlError::NoHostsAvailable(format!("Failed to establish session: {}", err))
    }
}

impl From<config::ConfigError> for CqlError {
    fn from(err: config::ConfigError) -> Self {
        CqlError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CqlError {
    fn from(err: serde_yaml::Error) -> Self {
        CqlError::ConfigError(err.to_string())
    }
}
