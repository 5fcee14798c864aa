/// Bootstrap a service: read `.env`, init logging, load the configuration and run.
///
/// ```ignore
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     edgeplane_service_common::main!(run(Config::from_env()?).await)
/// }
/// ```
#[macro_export]
macro_rules! main {
    ($run:expr) => {{
        const VERSION: &str = env!("CARGO_PKG_VERSION");
        const NAME: &str = env!("CARGO_PKG_NAME");

        #[allow(unused_imports)]
        use $crate::config::ConfigFromEnv;
        dotenv::dotenv().ok();

        $crate::app::init_logging();

        log::info!(
            "{} {} - {} {}",
            edgeplane_service_api::PROJECT,
            edgeplane_service_api::version::VERSION,
            NAME,
            VERSION
        );

        return $run;
    }};
}

/// Initialize logging, defaulting to `info` when `RUST_LOG` is not set.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or(crate::defaults::log_filter());
    env_logger::Builder::from_env(env).init();
}

/// Wait until the process gets interrupted.
pub async fn interrupted() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    log::info!("Received interrupt, shutting down");
    Ok(())
}
