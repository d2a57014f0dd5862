//! The rockbench payloads
//!
//! This library supports document and patch generation for the rockbench
//! project. Everything that decides *what* is written lives here: the id
//! space, the synthetic document shape, the patch template stream and the
//! patch assembler. *When* and *where* it is written is the business of the
//! `rockbench` crate.

#![deny(clippy::cargo)]
#![deny(missing_docs)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::{fmt, str::FromStr};

use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};

pub use document::{Document, Generator};
pub use id_space::{IdSpace, format_id};
pub use patch::{Mutation, Op, Patch, PatchTemplates, generate_patches, sample_unique};

pub mod cluster;
pub mod document;
pub mod id_space;
pub mod patch;
pub(crate) mod words;

/// Errors related to payload generation
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Json payload could not be encoded
    #[error("Json payload could not be encoded: {0}")]
    Json(#[from] serde_json::Error),
    /// A timestamp could not be constructed
    #[error("Timestamp out of range: {0}")]
    TimestampRange(#[from] time::error::ComponentRange),
    /// A timestamp could not be formatted
    #[error("Timestamp could not be formatted: {0}")]
    TimestampFormat(#[from] time::error::Format),
    /// The payload was not a JSON object
    #[error("Generated payload is not a JSON object")]
    NotAnObject,
    /// The id space holds fewer ids than were requested
    #[error("Cannot sample {requested} unique ids from a space of {available}")]
    InsufficientIds {
        /// Number of distinct ids requested
        requested: u64,
        /// Exclusive upper bound of the id space
        available: u64,
    },
}

/// Errors produced when parsing workload modes from strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{value}', expected one of: {expected}")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// The high-level shape of a run.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Insert new documents only
    #[default]
    Add,
    /// Patch previously written documents only
    Patch,
    /// Insert documents until the budget is spent, then patch them
    AddThenPatch,
    /// Each document is either an insert or an update of an existing id
    Mixed,
}

/// How document ids are assigned.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdMode {
    /// Random v4 UUIDs
    #[default]
    Uuid,
    /// Fixed-width decimal ids drawn from the [`IdSpace`] counter
    Sequential,
}

/// The flavor of mutation produced by [`PatchTemplates`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatchStyle {
    /// Replace an existing field with a fresh value of the same type
    #[default]
    Replace,
    /// Introduce new fields or append to arrays
    Add,
}

macro_rules! mode_strings {
    ($ty:ident, $kind:literal, $expected:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ParseModeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ParseModeError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: $expected,
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }
    };
}

mode_strings!(RunMode, "run mode", "add, patch, add_then_patch, mixed", {
    Add => "add",
    Patch => "patch",
    AddThenPatch => "add_then_patch",
    Mixed => "mixed",
});
mode_strings!(IdMode, "id mode", "uuid, sequential", {
    Uuid => "uuid",
    Sequential => "sequential",
});
mode_strings!(PatchStyle, "patch style", "replace, add", {
    Replace => "replace",
    Add => "add",
});

/// The per-run description of what documents look like.
///
/// A `Spec` is fixed for the lifetime of a run. It is shared by every
/// generation call, whether made from the scheduling task or a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    /// Random tag distinguishing this generator from concurrent replicas
    /// writing into the same collection.
    pub generator_identifier: String,
    /// Number of documents per batch
    pub batch_size: usize,
    /// Shape of the run
    pub run_mode: RunMode,
    /// How ids are assigned outside of mixed mode
    pub id_mode: IdMode,
    /// Percentage, 0 to 100, of mixed-mode documents that update an existing id
    pub update_percentage: u8,
    /// Number of distinct cluster keys, zero disables clustering
    pub num_clusters: u32,
    /// Percentage of documents that land in the hot cluster
    pub hot_cluster_percentage: Option<u8>,
    /// Whether the destination accepts caller supplied `_id` values
    pub assign_ids: bool,
}

impl Spec {
    /// Create a `Spec` with clustering disabled and ids assigned.
    #[must_use]
    pub fn new(generator_identifier: impl Into<String>, batch_size: usize) -> Self {
        Self {
            generator_identifier: generator_identifier.into(),
            batch_size,
            run_mode: RunMode::default(),
            id_mode: IdMode::default(),
            update_percentage: 0,
            num_clusters: 0,
            hot_cluster_percentage: None,
            assign_ids: true,
        }
    }
}

/// Generate a random alphanumeric identifier of `len` characters.
pub fn random_identifier<R>(rng: &mut R, len: usize) -> String
where
    R: Rng + ?Sized,
{
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Clocks set before the epoch report zero.
#[must_use]
pub fn now_micros() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_micros()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("ADD_THEN_PATCH".parse::<RunMode>(), Ok(RunMode::AddThenPatch));
        assert_eq!("Sequential".parse::<IdMode>(), Ok(IdMode::Sequential));
        assert_eq!("add".parse::<PatchStyle>(), Ok(PatchStyle::Add));
    }

    #[test]
    fn modes_round_trip_display() {
        for mode in [
            RunMode::Add,
            RunMode::Patch,
            RunMode::AddThenPatch,
            RunMode::Mixed,
        ] {
            assert_eq!(mode.to_string().parse::<RunMode>(), Ok(mode));
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = "upsert".parse::<RunMode>().unwrap_err();
        assert!(err.to_string().contains("upsert"));
    }

    #[test]
    fn identifier_is_alphanumeric_of_requested_length() {
        let mut rng = SmallRng::seed_from_u64(7);
        let id = random_identifier(&mut rng, 10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
