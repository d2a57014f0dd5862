//! The validated description of a run.
//!
//! The binary assembles a [`Config`] from flags and environment variables.
//! [`Config::validate`] rejects every combination that would otherwise fail
//! mid-run, so nothing is dispatched against a configuration that cannot
//! complete.

use std::net::SocketAddr;

use rockbench_payload::{IdMode, RunMode, Spec};

use crate::{
    destination::{self, rockset::CollectionPath},
    latency, scheduler,
};

/// Errors produced by [`Config::validate`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A setting that must be positive was zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    /// A percentage exceeded 100
    #[error("{name} must be between 0 and 100, got {value}")]
    Percentage {
        /// Setting name
        name: &'static str,
        /// Offending value
        value: u8,
    },
    /// The run mode addresses documents by number
    #[error("{0} mode requires sequential ids")]
    RequiresSequentialIds(RunMode),
    /// Patch-only runs need the number of existing documents
    #[error("patch mode requires a positive number of documents to patch against")]
    PatchRequiresDocuments,
    /// Patch batches cannot be drawn from fewer documents than the batch size
    #[error("batch size {batch_size} exceeds the {documents} documents available to patch")]
    PatchBatchTooLarge {
        /// Configured batch size
        batch_size: usize,
        /// Documents available
        documents: u64,
    },
    /// Mixed runs need an existing id range to update
    #[error("mixed mode requires a positive number of existing documents")]
    MixedRequiresExistingDocuments,
    /// The destination cannot apply patches
    #[error("{destination} does not support {mode} mode, patches are unsupported")]
    PatchesUnsupported {
        /// Destination name
        destination: &'static str,
        /// Requested run mode
        mode: RunMode,
    },
    /// The destination assigns its own ids
    #[error("{destination} does not support {mode} mode, ids are assigned by the destination")]
    ExplicitIdsUnsupported {
        /// Destination name
        destination: &'static str,
        /// Requested run mode
        mode: RunMode,
    },
    /// Destination specific configuration was malformed
    #[error(transparent)]
    Destination(#[from] destination::Error),
}

/// How run metrics are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Telemetry {
    /// Metrics are recorded nowhere
    #[default]
    Disabled,
    /// Metrics are served for Prometheus to scrape
    Prometheus {
        /// Listen address of the exporter
        addr: SocketAddr,
    },
}

/// Main configuration struct for this program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// What to generate and how fast
    pub workload: scheduler::Config,
    /// Where to send it
    pub destination: destination::Config,
    /// How to expose metrics
    pub telemetry: Telemetry,
    /// Latency probe settings, no probe if unset
    pub latency: Option<latency::Config>,
}

impl Config {
    /// Check the configuration for combinations that cannot run.
    ///
    /// # Errors
    ///
    /// Function will return the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        let workload = &self.workload;
        let mode = workload.run_mode;

        if workload.batch_size == 0 {
            return Err(Error::Zero("batch size"));
        }
        if matches!(mode, RunMode::Add | RunMode::AddThenPatch | RunMode::Mixed)
            && workload.documents_per_second == 0
        {
            return Err(Error::Zero("documents per second"));
        }
        if matches!(mode, RunMode::Patch | RunMode::AddThenPatch) && workload.patches_per_second == 0
        {
            return Err(Error::Zero("patches per second"));
        }
        if workload.max_in_flight == Some(0) {
            return Err(Error::Zero("max in flight"));
        }
        if workload.update_percentage > 100 {
            return Err(Error::Percentage {
                name: "update percentage",
                value: workload.update_percentage,
            });
        }
        if let Some(value) = workload.hot_cluster_percentage.filter(|pct| *pct > 100) {
            return Err(Error::Percentage {
                name: "hot cluster percentage",
                value,
            });
        }
        if let Some(latency) = self.latency {
            if latency.replicas == 0 {
                return Err(Error::Zero("replicas"));
            }
        }

        match mode {
            RunMode::Add => {}
            RunMode::Patch | RunMode::AddThenPatch => {
                if workload.id_mode != IdMode::Sequential {
                    return Err(Error::RequiresSequentialIds(mode));
                }
                let documents = workload.num_docs.unwrap_or(0);
                if mode == RunMode::Patch && documents == 0 {
                    return Err(Error::PatchRequiresDocuments);
                }
                // An unbounded add phase never reaches its patch phase.
                if workload.num_docs.is_some() && (workload.batch_size as u64) > documents {
                    return Err(Error::PatchBatchTooLarge {
                        batch_size: workload.batch_size,
                        documents,
                    });
                }
                if !self.destination.supports_patches() {
                    return Err(Error::PatchesUnsupported {
                        destination: self.destination.name(),
                        mode,
                    });
                }
            }
            RunMode::Mixed => {
                if workload.id_mode != IdMode::Sequential {
                    return Err(Error::RequiresSequentialIds(mode));
                }
                if workload.existing_docs == 0 {
                    return Err(Error::MixedRequiresExistingDocuments);
                }
            }
        }

        if matches!(mode, RunMode::Patch | RunMode::AddThenPatch | RunMode::Mixed)
            && !self.destination.supports_explicit_ids()
        {
            return Err(Error::ExplicitIdsUnsupported {
                destination: self.destination.name(),
                mode,
            });
        }

        if let destination::Config::Rockset(rockset) = &self.destination {
            rockset.collection_path.parse::<CollectionPath>()?;
        }

        Ok(())
    }

    /// The generation spec for this run.
    #[must_use]
    pub fn spec(&self, generator_identifier: &str) -> Spec {
        self.workload
            .spec(generator_identifier, self.destination.supports_explicit_ids())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::destination::{elastic, rockset};

    fn config(workload: scheduler::Config) -> Config {
        Config {
            workload,
            destination: destination::Config::Null,
            telemetry: Telemetry::Disabled,
            latency: None,
        }
    }

    fn sequential(run_mode: RunMode) -> scheduler::Config {
        scheduler::Config {
            run_mode,
            id_mode: IdMode::Sequential,
            ..scheduler::Config::default()
        }
    }

    fn elastic() -> destination::Config {
        destination::Config::Elastic(elastic::Config {
            url: "http://localhost:9200".to_string(),
            auth: "Basic abc".to_string(),
            index: "bench".to_string(),
        })
    }

    #[test]
    fn default_add_run_is_valid() {
        config(scheduler::Config::default())
            .validate()
            .expect("default is valid");
    }

    #[test]
    fn zero_rates_and_sizes_are_rejected() {
        let zero_batch = scheduler::Config {
            batch_size: 0,
            ..scheduler::Config::default()
        };
        assert!(matches!(
            config(zero_batch).validate(),
            Err(Error::Zero("batch size"))
        ));

        let zero_wps = scheduler::Config {
            documents_per_second: 0,
            ..scheduler::Config::default()
        };
        assert!(matches!(
            config(zero_wps).validate(),
            Err(Error::Zero("documents per second"))
        ));

        // Patch-only runs never issue documents.
        let patch_only = scheduler::Config {
            documents_per_second: 0,
            num_docs: Some(10),
            ..sequential(RunMode::Patch)
        };
        config(patch_only).validate().expect("documents rate unused");
    }

    #[test]
    fn patch_modes_require_sequential_ids() {
        for mode in [RunMode::Patch, RunMode::AddThenPatch, RunMode::Mixed] {
            let workload = scheduler::Config {
                run_mode: mode,
                id_mode: IdMode::Uuid,
                num_docs: Some(10),
                existing_docs: 10,
                ..scheduler::Config::default()
            };
            assert!(matches!(
                config(workload).validate(),
                Err(Error::RequiresSequentialIds(m)) if m == mode
            ));
        }
    }

    #[test]
    fn patch_requires_documents() {
        assert!(matches!(
            config(sequential(RunMode::Patch)).validate(),
            Err(Error::PatchRequiresDocuments)
        ));
        let workload = scheduler::Config {
            num_docs: Some(100),
            ..sequential(RunMode::Patch)
        };
        config(workload).validate().expect("valid patch run");
    }

    #[test]
    fn patch_batch_must_fit_documents() {
        let workload = scheduler::Config {
            num_docs: Some(4),
            batch_size: 5,
            ..sequential(RunMode::AddThenPatch)
        };
        assert!(matches!(
            config(workload).validate(),
            Err(Error::PatchBatchTooLarge {
                batch_size: 5,
                documents: 4
            })
        ));
    }

    #[test]
    fn mixed_requires_existing_documents() {
        assert!(matches!(
            config(sequential(RunMode::Mixed)).validate(),
            Err(Error::MixedRequiresExistingDocuments)
        ));
    }

    #[test]
    fn elastic_rejects_patches_and_explicit_ids() {
        let mut patch = config(scheduler::Config {
            num_docs: Some(10),
            ..sequential(RunMode::Patch)
        });
        patch.destination = elastic();
        assert!(matches!(
            patch.validate(),
            Err(Error::PatchesUnsupported { .. })
        ));

        let mut mixed = config(scheduler::Config {
            existing_docs: 10,
            ..sequential(RunMode::Mixed)
        });
        mixed.destination = elastic();
        assert!(matches!(
            mixed.validate(),
            Err(Error::ExplicitIdsUnsupported { .. })
        ));

        let mut add = config(scheduler::Config::default());
        add.destination = elastic();
        add.validate().expect("elastic accepts adds");
        assert!(!add.spec("abcdefghij").assign_ids);
    }

    #[test]
    fn rockset_collection_path_is_checked() {
        let mut run = config(scheduler::Config::default());
        run.destination = destination::Config::Rockset(rockset::Config {
            api_server: "https://api.rs2.usw2.rockset.com".to_string(),
            api_key: "key".to_string(),
            collection_path: "bench".to_string(),
        });
        assert!(matches!(run.validate(), Err(Error::Destination(_))));
    }

    #[test]
    fn zero_replicas_are_rejected() {
        let mut run = config(scheduler::Config::default());
        run.latency = Some(latency::Config { replicas: 0 });
        assert!(matches!(run.validate(), Err(Error::Zero("replicas"))));
    }

    proptest! {
        #[test]
        fn percentages_above_100_are_rejected(update in 0..=u8::MAX, hot in 0..=u8::MAX) {
            let workload = scheduler::Config {
                update_percentage: update,
                hot_cluster_percentage: Some(hot),
                ..scheduler::Config::default()
            };
            let result = config(workload).validate();
            if update > 100 || hot > 100 {
                let is_percentage_error = matches!(result, Err(Error::Percentage { .. }));
                prop_assert!(is_percentage_error);
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
