//! A destination that discards everything.

use async_trait::async_trait;
use rockbench_payload::{Document, Patch, now_micros};

use super::{Destination, Error};

pub(crate) const NAME: &str = "null";

/// Lag reported by [`Null::latest_timestamp`], in microseconds.
pub const REPORTED_LAG_MICROS: i64 = 10_000;

/// Accepts every batch and reports a constant small lag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Null;

#[async_trait]
impl Destination for Null {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports_explicit_ids(&self) -> bool {
        true
    }

    fn supports_patches(&self) -> bool {
        true
    }

    async fn send_documents(&self, _docs: &[Document]) -> Result<(), Error> {
        Ok(())
    }

    async fn send_patches(&self, _patches: &[Patch]) -> Result<(), Error> {
        Ok(())
    }

    async fn latest_timestamp(&self) -> Result<i64, Error> {
        Ok(now_micros() - REPORTED_LAG_MICROS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_small_lag() {
        let before = now_micros();
        let latest = Null.latest_timestamp().await.expect("null never fails");
        let after = now_micros();
        assert!(latest >= before - REPORTED_LAG_MICROS);
        assert!(latest <= after - REPORTED_LAG_MICROS);
    }

    #[tokio::test]
    async fn accepts_everything() {
        Null.configure().await.expect("null never fails");
        Null.send_documents(&[Document::new()])
            .await
            .expect("null never fails");
        Null.send_patches(&[]).await.expect("null never fails");
    }
}
