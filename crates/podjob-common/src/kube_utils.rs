//! Kubernetes client construction and in-cluster identity discovery

use std::path::Path;
use std::time::Duration;

use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

/// Service account namespace file mounted into every pod
pub const NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Connection timeout for the API server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a kube client from the inferred config (in-cluster first, then kubeconfig)
///
/// Only the connect timeout is set. The read timeout stays at the kube default
/// because watch requests hold the connection open for minutes.
pub async fn create_client() -> Result<Client> {
    let mut config = Config::infer()
        .await
        .map_err(|e| Error::client(format!("failed to infer config: {}", e)))?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);

    debug!(cluster_url = %config.cluster_url, "creating kubernetes client");

    Client::try_from(config).map_err(|e| Error::client(format!("failed to build client: {}", e)))
}

/// Read the namespace this process runs in
///
/// `override_ns` wins when set and non-empty; otherwise the namespace file is
/// read. A missing file is an io error: outside a pod there is no sensible
/// default.
pub fn current_namespace(override_ns: Option<&str>, namespace_file: &Path) -> Result<String> {
    if let Some(ns) = override_ns.map(str::trim).filter(|ns| !ns.is_empty()) {
        return Ok(ns.to_string());
    }

    let contents =
        std::fs::read_to_string(namespace_file).map_err(|e| Error::io(namespace_file, e))?;
    let namespace = contents.trim();
    if namespace.is_empty() {
        return Err(Error::configuration(
            namespace_file.display().to_string(),
            "namespace file is empty",
        ));
    }
    Ok(namespace.to_string())
}
