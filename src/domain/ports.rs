use crate::utils::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One independently executable piece of pipeline work.
#[async_trait]
pub trait Unit: Send + Sync {
    /// Label used in results and logs.
    fn name(&self) -> String;

    /// Runs the unit. Long-running units should observe `cancel`.
    async fn handle(&self, cancel: &CancellationToken) -> Result<String>;
}
