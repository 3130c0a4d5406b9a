use anyhow::Result;
use clap::Parser;
use surveyor_cli::{Cli, Commands, Study, commands};
use surveyor_telemetry::{init_json_telemetry, init_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry =
        if cli.json_logs { init_json_telemetry("surveyor") } else { init_telemetry("surveyor") };
    telemetry.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let report = match cli.command {
        Commands::Validate { study } => commands::validate(Study::load(study)?)?,
        Commands::Plan { study } => commands::plan(Study::load(study)?)?,
        Commands::DryRun { study, config, cache, output } => {
            let study = Study::load(study)?;
            commands::dry_run(study, config.as_deref(), cache.as_deref(), output.as_deref()).await?
        }
        Commands::CacheStats { cache } => commands::cache_stats(&cache).await?,
    };
    println!("{}", report);
    Ok(())
}
