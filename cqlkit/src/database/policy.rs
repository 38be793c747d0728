// cqlkit/src/database/policy.rs
//
// Error policies - Strategy Pattern for transient error handling
// A policy sees every transient error before the executor reconnects and
// retries. Returning an error aborts the retry and that error reaches the
// caller; returning Ok lets the default reconnect-and-retry go ahead.
//

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::CqlError;

/// Error policy strategy trait
#[async_trait]
pub trait ErrorPolicy: Send + Sync {
    async fn handle_error(&self, error: &CqlError, retries_remaining: u32) -> Result<(), CqlError>;
    fn name(&self) -> &str;
}

/// Always lets the retry proceed
pub struct DefaultErrorPolicy;

#[async_trait]
impl ErrorPolicy for DefaultErrorPolicy {
    async fn handle_error(&self, _error: &CqlError, _retries_remaining: u32) -> Result<(), CqlError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "default"
    }
}

/// Never retries: the transient error goes straight to the caller
pub struct FailFastPolicy;

#[async_trait]
impl ErrorPolicy for FailFastPolicy {
    async fn handle_error(&self, error: &CqlError, _retries_remaining: u32) -> Result<(), CqlError> {
        Err(error.clone())
    }

    fn name(&self) -> &str {
        "fail_fast"
    }
}

/// Logs the error, then retries
pub struct LoggingPolicy;

#[async_trait]
impl ErrorPolicy for LoggingPolicy {
    async fn handle_error(&self, error: &CqlError, retries_remaining: u32) -> Result<(), CqlError> {
        warn!(
            kind = error.kind(),
            retries_remaining, "Transient cluster error: {}", error
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Waits before letting the retry proceed, giving an overloaded cluster room
pub struct BackoffPolicy {
    delay: Duration,
}

impl BackoffPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl ErrorPolicy for BackoffPolicy {
    async fn handle_error(&self, error: &CqlError, retries_remaining: u32) -> Result<(), CqlError> {
        if retries_remaining == 0 {
            return Err(error.clone());
        }
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "backoff"
    }
}

pub type PolicyFactory = Arc<dyn Fn() -> Arc<dyn ErrorPolicy> + Send + Sync>;

/// Maps configuration names to error policy constructors
#[derive(Clone)]
pub struct ErrorPolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl ErrorPolicyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("default", || Arc::new(DefaultErrorPolicy));
        registry.register("fail_fast", || Arc::new(FailFastPolicy));
        registry.register("log", || Arc::new(LoggingPolicy));
        registry.register("backoff", || Arc::new(BackoffPolicy::default()));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn ErrorPolicy> + Send + Sync + 'static,
    {
        self.factories.insert(normalize(name), Arc::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ErrorPolicy>, CqlError> {
        let factory = self.factories.get(&normalize(name)).ok_or_else(|| {
            CqlError::ConfigError(format!("Unknown error policy: {}", name))
        })?;
        let policy = factory();
        info!("Resolved error policy: {}", policy.name());
        Ok(policy)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ErrorPolicyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_policies() {
        let transient = CqlError::Timeout("read timeout".into());

        assert!(DefaultErrorPolicy.handle_error(&transient, 1).await.is_ok());
        assert!(LoggingPolicy.handle_error(&transient, 1).await.is_ok());
        assert_eq!(
            FailFastPolicy.handle_error(&transient, 1).await,
            Err(transient.clone())
        );

        let backoff = BackoffPolicy::new(Duration::from_millis(1));
        assert!(backoff.handle_error(&transient, 1).await.is_ok());
        assert!(backoff.handle_error(&transient, 0).await.is_err());
    }

    #[test]
    fn test_registry_resolves_by_name() {
        let registry = ErrorPolicyRegistry::with_builtins();
        assert_eq!(registry.resolve("fail-fast").unwrap().name(), "fail_fast");
        assert_eq!(registry.resolve("LOG").unwrap().name(), "log");
        assert_eq!(registry.names(), vec!["backoff", "default", "fail_fast", "log"]);
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = ErrorPolicyRegistry::with_builtins();
        assert!(matches!(
            registry.resolve("retry_forever"),
            Err(CqlError::ConfigError(_))
        ));
    }

    #[test]
    fn test_registry_custom_policy() {
        struct Custom;

        #[async_trait]
        impl ErrorPolicy for Custom {
            async fn handle_error(&self, _: &CqlError, _: u32) -> Result<(), CqlError> {
                Ok(())
            }

            fn name(&self) -> &str {
                "custom"
            }
        }

        let mut registry = ErrorPolicyRegistry::empty();
        registry.register("custom", || Arc::new(Custom));
        assert_eq!(registry.resolve("custom").unwrap().name(), "custom");
    }
}
