// SPDX-License-Identifier: BSD-3-Clause
//! `tracing` layers for profiling
mod nanos;
pub use nanos::*;
