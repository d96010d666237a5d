// SPDX-License-Identifier: BSD-3-Clause
//! Program facts in JSON
//!
//! A fact file declares the values of a program and the relations between
//! them, as a compiler front end would report them:
//!
//! ```json
//! {
//!   "regions": ["a"],
//!   "values": ["p", "q"],
//!   "relations": [
//!     { "kind": "depends-on", "src": "p", "dst": "a" },
//!     { "kind": "argument-to-callee", "src": "p", "dst": "q", "site": "main:1" }
//!   ],
//!   "escaped": ["q"]
//! }
//! ```
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{Data, Options, RelationKind, ValueId};

mod error;
pub use error::*;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Relation {
    pub kind: RelationKind,
    pub src: String,
    pub dst: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Facts {
    /// Addresses of memory regions (allocations, globals, functions)
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Values visible to unanalyzed code
    #[serde(default)]
    pub escaped: Vec<String>,
    /// Values that may hold anything unanalyzed code can reach
    #[serde(default)]
    pub opaque: Vec<String>,
    /// Globals that may be linked against from outside
    #[serde(default)]
    pub linkable: Vec<String>,
}

impl Facts {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Declares every value and adds every relation.
    pub fn build(&self, opts: &Options) -> Result<Data, Error> {
        let mut data = Data::new(opts.clone());
        for (names, region) in [(&self.regions, true), (&self.values, false)] {
            for name in names {
                if data.value(name).is_some() {
                    return Err(Error::DuplicateValue(name.clone()));
                }
                if region {
                    data.create_region(Some(name.as_str()));
                } else {
                    data.create_value(Some(name.as_str()));
                }
            }
        }
        for relation in &self.relations {
            let src = find(&data, &relation.src)?;
            let dst = find(&data, &relation.dst)?;
            let site = match &relation.site {
                Some(site) if relation.kind.takes_site() => Some(data.call_site(site)),
                Some(_) => {
                    return Err(Error::UnexpectedSite {
                        kind: relation.kind,
                        src: relation.src.clone(),
                        dst: relation.dst.clone(),
                    })
                }
                None => None,
            };
            data.handle(relation.kind, src, dst, site);
        }
        for name in &self.escaped {
            let v = find(&data, name)?;
            data.escape(v);
        }
        for name in &self.opaque {
            let v = find(&data, name)?;
            data.opaque(v);
        }
        for name in &self.linkable {
            let v = find(&data, name)?;
            data.link(v);
        }
        debug!(
            values = self.regions.len() + self.values.len(),
            relations = self.relations.len(),
            "loaded facts"
        );
        Ok(data)
    }
}

fn find(data: &Data, name: &str) -> Result<ValueId, Error> {
    data.value(name)
        .ok_or_else(|| Error::UnknownValue(name.to_string()))
}
