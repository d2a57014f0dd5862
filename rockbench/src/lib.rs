//! The rockbench write benchmark.
//!
//! This library supports the rockbench binary found elsewhere in this
//! project. It drives synthetic documents and patches from
//! `rockbench_payload` into a document store at a fixed offered rate and
//! measures how long the store takes to make them visible.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod destination;
pub mod latency;
pub mod scheduler;
pub mod signals;
pub mod telemetry;
