use colored::Colorize;

use crate::domain::engine::Engine;

/// Probe the inventory source and report what is running there.
pub fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let (config, client, registry) = super::connections(config_path)?;

    println!("{}", "netsync check".bold());
    println!("  inventory: {}", config.inventory.url);
    println!("  registry:  {}", config.registry.url);
    println!("  target:    {}", config.target.name);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        Engine::new(&client, &registry, &config.target)
            .verify_status()
            .await
    });

    super::finish(report)
}
