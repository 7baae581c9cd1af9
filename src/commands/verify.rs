use crate::domain::engine::Engine;

/// Read-only comparison of the registry against the inventory source.
/// Every discrepancy is listed; nothing is changed.
pub fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let (config, client, registry) = super::connections(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        Engine::new(&client, &registry, &config.target).verify().await
    });

    super::finish(report)
}
