use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;

static HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the Prometheus recorder once per process and returns a handle
/// for rendering the scrape output. Later calls reuse the first handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let mut guard = HANDLE
        .lock()
        .map_err(|_| anyhow::anyhow!("Prometheus handle lock poisoned"))?;

    if let Some(handle) = guard.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    *guard = Some(handle.clone());

    Ok(handle)
}
