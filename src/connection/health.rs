use async_trait::async_trait;

use crate::error::Result;

/// Trait for health check functionality
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform a health check.
    ///
    /// An unreachable or unhealthy endpoint is `Ok(false)`; errors are
    /// reserved for checks that could not be attempted at all.
    async fn check_health(&self) -> Result<bool>;

    /// Get the name of this health check
    fn name(&self) -> &str;
}
