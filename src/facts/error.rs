// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

use crate::analysis::RelationKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't read fact file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed fact file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Value {0} is declared more than once")]
    DuplicateValue(String),
    #[error("Unknown value {0}")]
    UnknownValue(String),
    #[error("Relation {kind:?} from {src} to {dst} cannot have a call site")]
    UnexpectedSite {
        kind: RelationKind,
        src: String,
        dst: String,
    },
}
