use std::time::Duration;

#[inline]
pub fn namespace() -> String {
    crate::kube::namespace().unwrap_or_else(|| "default".into())
}

#[inline]
pub fn watch_retry_delay() -> Duration {
    Duration::from_secs(1)
}

#[inline]
pub fn log_filter() -> &'static str {
    "info"
}
