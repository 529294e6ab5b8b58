use std::{io::Write, sync::Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::model::NodeStatsSummary;

/// Destination of the per-cycle summaries.
#[async_trait]
pub trait StatsReporter: Send + Sync {
    async fn report(&self, summary: &NodeStatsSummary) -> Result<()>;
}

/// Writes each summary as one JSON document per line.
pub struct JsonLinesReporter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> StatsReporter for JsonLinesReporter<W> {
    async fn report(&self, summary: &NodeStatsSummary) -> Result<()> {
        let line = serde_json::to_string(summary).context("failed to encode stats summary")?;
        let mut out = self.out.lock().expect("reporter output mutex poisoned");
        writeln!(out, "{line}").context("failed to write stats summary")?;
        out.flush().context("failed to flush stats summary")
    }
}
