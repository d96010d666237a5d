// SPDX-License-Identifier: BSD-3-Clause
//! Human-readable dumps of the analysis database
use std::fmt::{self, Write};

use super::{Content, Data, ResultId, Work};

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Data {
    pub fn result_name(&self, r: ResultId) -> String {
        match self.results[r.index()].owner() {
            Some((v, algorithm)) => format!("{}.{}", self.value_name(v), algorithm),
            None => r.to_string(),
        }
    }

    fn terms(&self, r: ResultId) -> Vec<String> {
        let result = &self.results[r.index()];
        let mut terms = Vec::new();
        let values: Vec<String> = result
            .contents()
            .iter()
            .filter_map(|c| match c {
                Content::Value(v) => Some(self.value_name(*v)),
                Content::Subset(_) => None,
            })
            .collect();
        if !values.is_empty() {
            terms.push(format!("{{{}}}", values.join(", ")));
        }
        for content in result.contents() {
            if let Content::Subset(s) = content {
                terms.push(self.result_name(*s));
            }
        }
        for work in result.pending() {
            match work {
                Work::Subset(s) => terms.push(self.result_name(*s)),
                Work::Transform(t) => {
                    if let Some(apply) = &t.apply {
                        let mut term =
                            format!("⋃{{{apply}(e) | e ∈ {}}}", self.result_name(t.input));
                        if !t.constraints.is_empty() {
                            let under = self.algorithms.describe_constraints(&t.constraints);
                            term.push_str(&format!(" under {under}"));
                        }
                        terms.push(term);
                    }
                }
            }
        }
        terms
    }

    /// One line per result: `name = {e0, e1} ∪ formula ∪ ...`
    pub fn write_equations(&self, out: &mut impl Write) -> fmt::Result {
        for i in 0..self.results.len() {
            let r = ResultId(i as u32);
            let terms = self.terms(r);
            write!(out, "{} = ", self.result_name(r))?;
            if terms.is_empty() {
                write!(out, "∅")?;
            } else {
                write!(out, "{}", terms.join(" ∪ "))?;
            }
            if !self.results[i].is_seeded() {
                write!(out, " (unevaluated)")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Graphviz rendering: solid edges point from subsets to the sets that
    /// include them, dashed edges from transform inputs.
    pub fn write_dot(&self, out: &mut impl Write) -> fmt::Result {
        writeln!(out, "digraph analysis {{")?;
        writeln!(out, "  node [shape=box];")?;
        for (i, result) in self.results.iter().enumerate() {
            let r = ResultId(i as u32);
            let values: Vec<String> = result
                .contents()
                .iter()
                .filter_map(|c| match c {
                    Content::Value(v) => Some(self.value_name(*v)),
                    Content::Subset(_) => None,
                })
                .collect();
            let mut label = escape(&self.result_name(r));
            if !values.is_empty() {
                label.push_str(&format!("\\n{{{}}}", escape(&values.join(", "))));
            }
            writeln!(out, "  r{i} [label=\"{label}\"];")?;
        }
        for (i, result) in self.results.iter().enumerate() {
            for content in result.contents() {
                if let Content::Subset(s) = content {
                    writeln!(out, "  r{} -> r{i};", s.index())?;
                }
            }
            for work in result.pending() {
                match work {
                    Work::Subset(s) => writeln!(out, "  r{} -> r{i};", s.index())?,
                    Work::Transform(t) => {
                        let mut label = match &t.apply {
                            Some(apply) => escape(&apply.to_string()),
                            None => "∅".to_string(),
                        };
                        if !t.constraints.is_empty() {
                            let under = self.algorithms.describe_constraints(&t.constraints);
                            label.push_str(&format!("\\n{}", escape(&under)));
                        }
                        writeln!(
                            out,
                            "  r{} -> r{i} [style=dashed, label=\"{label}\"];",
                            t.input.index(),
                        )?;
                    }
                }
            }
        }
        writeln!(out, "}}")
    }
}
