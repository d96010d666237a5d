// SPDX-License-Identifier: BSD-3-Clause
//! Demand-driven points-to analysis
//!
//! Every set the analysis can compute (the points-to set of a value, the
//! values stored into a region, ...) is an [`AnalysisResult`]: a lazy union
//! of known contents and pending work. Results are memoized per value and
//! [`AlgorithmId`], and only the parts a query actually needs get computed.
//! Cyclic dependencies between sets are resolved by the retry protocol in
//! [`enumeration`].

mod algorithm;
pub use algorithm::*;
mod data;
pub use data::*;
mod dump;
pub mod enumeration;
pub use enumeration::{ElementStep, EnumerationState, Enumerator};
mod query;
pub use query::*;
mod relation;
pub use relation::*;
mod result;
pub use result::*;
mod value;
pub use value::*;
