//! Store call budget
//!
//! Every store call the engine makes is bounded. A call that does not
//! finish in time fails with `StoreUnavailable`, which callers treat as
//! a denial.

use std::future::Future;
use std::time::Duration;

use crate::error::AuthResult;

/// Run a store call within `budget`
pub async fn within<T, F>(budget: Duration, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    tokio::time::timeout(budget, fut).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = within(Duration::from_secs(1), async { Ok::<_, AuthError>(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_is_store_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, AuthError>(())
        };
        let result = within(Duration::from_millis(50), slow).await;
        assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
    }
}
