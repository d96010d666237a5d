// SPDX-License-Identifier: BSD-3-Clause
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpanTime {
    pub entered: u64,
    pub total: Duration,
}

/// Per-span-name totals, shared between a [`SpanTimeLayer`] and whoever
/// reports them.
#[derive(Clone, Debug, Default)]
pub struct SpanTimes(Arc<Mutex<BTreeMap<&'static str, SpanTime>>>);

impl SpanTimes {
    pub fn get(&self, name: &str) -> Option<SpanTime> {
        self.0.lock().ok().and_then(|t| t.get(name).copied())
    }

    pub fn report(&self, out: &mut impl io::Write) -> io::Result<()> {
        let Ok(totals) = self.0.lock() else {
            return Ok(());
        };
        for (name, time) in totals.iter() {
            writeln!(out, "{}: {} x {}ns", name, time.entered, time.total.as_nanos())?;
        }
        Ok(())
    }
}

/// Adds up the time spent inside each span, by span name.
#[derive(Debug, Default)]
pub struct SpanTimeLayer {
    totals: SpanTimes,
}

impl SpanTimeLayer {
    pub fn new() -> (Self, SpanTimes) {
        let layer = SpanTimeLayer::default();
        let totals = layer.totals.clone();
        (layer, totals)
    }
}

impl<S> Layer<S> for SpanTimeLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().replace(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(start) = span.extensions().get::<Instant>() {
                let elapsed = start.elapsed();
                if let Ok(mut totals) = self.totals.0.lock() {
                    let time = totals.entry(span.name()).or_default();
                    time.entered += 1;
                    time.total += elapsed;
                }
            }
        }
    }
}
