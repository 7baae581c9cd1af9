use crate::domain::engine::Engine;

/// Walk every provisionable record and establish registry-side
/// connectivity: host keys (ssh), a connection test, and optionally a
/// state pull for devices that answered.
pub fn run(config_path: Option<&str>, sync_from: bool) -> anyhow::Result<()> {
    let (config, client, registry) = super::connections(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        Engine::new(&client, &registry, &config.target)
            .connect(sync_from)
            .await
    });

    super::finish(report)
}
