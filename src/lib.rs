// SPDX-License-Identifier: BSD-3-Clause
pub mod analysis;
mod arc;
pub mod constraints;
pub mod facts;
pub mod layers;

pub use analysis::{Data, Options, PointsToSet, RelationKind, ValueId};
pub use constraints::{CallSiteId, Constraints};
