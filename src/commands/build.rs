use crate::domain::engine::Engine;

/// Create or update registry entries for every provisionable inventory
/// record. Without `--commit` the run is a described-only rehearsal.
pub fn run(config_path: Option<&str>, commit: bool) -> anyhow::Result<()> {
    let (config, client, registry) = super::connections(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        Engine::new(&client, &registry, &config.target)
            .build(commit)
            .await
    });

    super::finish(report)
}
