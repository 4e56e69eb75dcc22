use clap::Parser;

use mlm_engine::cli::{Cli, Command};
use mlm_engine::model::node::NetworkType;
use mlm_engine::sim::SimOptions;
use mlm_engine::{example, report, run_period, schema, sim, validate};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Schema => schema::run(),
        Command::Example { network } => example::run(&network),
        Command::Validate { file } => validate::run(&file),
        Command::Simulate {
            out_dir,
            members,
            periods,
            seed,
            network,
        } => {
            let network = match network.as_str() {
                "binary" => NetworkType::Binary,
                "trinity" => NetworkType::Trinity,
                "unilevel" => NetworkType::Unilevel,
                other => anyhow::bail!("unknown network type '{other}'"),
            };
            sim::run(&out_dir, &SimOptions {
                members,
                periods,
                seed,
                network,
            })
        }
        Command::RunPeriod {
            config,
            network,
            db,
            orders,
            period,
            date,
        } => run_period::run(&config, &network, &db, &orders, period.as_deref(), date),
        Command::Stats { network } => report::run_stats(&network),
        Command::Summary {
            db,
            platform,
            period,
        } => report::run_summary(&db, &platform, &period),
        Command::Reconcile { db, platform } => report::run_reconcile(&db, &platform),
    }
}
