use edgeplane_deployment_operator::{run, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    edgeplane_service_common::main!(run(Config::from_env()?).await)
}
