//! Cluster keys for skewed write distributions.
//!
//! When clustering is enabled every document carries a [`FIELD`] whose value
//! is one of `num_clusters` keys. A configured hot-cluster percentage routes
//! that share of documents to [`HOT_KEY`], simulating a hot partition; the
//! remainder spread uniformly over all keys, hot key included.

use rand::Rng;

/// Document field carrying the cluster key.
pub const FIELD: &str = "cluster_key";

/// The designated hot cluster.
pub const HOT_KEY: u32 = 0;

/// Choose a cluster key, or `None` when clustering is disabled.
pub fn key<R>(rng: &mut R, num_clusters: u32, hot_cluster_percentage: Option<u8>) -> Option<u32>
where
    R: Rng + ?Sized,
{
    if num_clusters == 0 {
        return None;
    }

    if let Some(pct) = hot_cluster_percentage.filter(|pct| *pct > 0) {
        if rng.random_range(0..100u8) < pct.min(100) {
            return Some(HOT_KEY);
        }
    }

    Some(rng.random_range(0..num_clusters))
}
