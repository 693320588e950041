use std::{fs, path::Path};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Counters recorded before this call are lost.
pub fn init() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))
}

/// Write the current metrics in Prometheus text format, for a node-exporter
/// textfile collector. Writes to a temporary sibling first so the collector
/// never sees a half-written file.
pub fn write_textfile(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    write_rendered(&handle.render(), path)
}

fn write_rendered(rendered: &str, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, rendered)?;
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), "metrics textfile written");
    Ok(())
}
