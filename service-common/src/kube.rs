/// The namespace the operator should manage, if not configured explicitly.
pub fn namespace() -> Option<String> {
    namespace_from_env().or_else(namespace_from_cluster)
}

fn namespace_from_env() -> Option<String> {
    std::env::var_os("NAMESPACE").and_then(|s| s.to_str().map(|s| s.to_string()))
}

/// Try getting the namespace of the service account we are running with
fn namespace_from_cluster() -> Option<String> {
    kube::Config::incluster_env()
        .ok()
        .map(|cfg| cfg.default_namespace)
}

/// Create a client, using the in-cluster configuration or the local kube config.
pub async fn client() -> Result<kube::Client, kube::Error> {
    kube::Client::try_default().await
}
