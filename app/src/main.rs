use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use common::{config::Config, dataset::Dataset, record::Column};
use console::style;
use eyre::Result;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod run;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false, global = true)]
    no_progress: bool,
    #[arg(short, long, global = true)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the configured plots
    Plot {
        #[arg(short, long, default_value = "plots.yaml")]
        config_file: PathBuf,
        /// Only plot this experiment
        #[arg(short, long)]
        experiment: Option<String>,
    },
    /// List experiments and their plots
    Ls {
        #[arg(short, long, default_value = "plots.yaml")]
        config_file: PathBuf,
    },
    /// Summarise a results file
    Inspect {
        #[arg(short, long)]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("keymix_plots={log_level}"));

    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }

    for module in default_plots::MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    default_plots::init_plots()?;

    match args.command {
        Commands::Plot {
            config_file,
            experiment,
        } => {
            if let Err(err) =
                run::run_plots(&config_file, experiment.as_deref(), args.no_progress).await
            {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Ls { config_file } => list_experiments(&config_file).await?,
        Commands::Inspect { data } => inspect(&data).await?,
    };

    Ok(())
}

async fn list_experiments(config_file: &Path) -> Result<()> {
    let config = Config::load(config_file).await?;
    println!("{}", style(&config.name).bold());
    for experiment in &config.experiments {
        let plots = experiment
            .plots
            .iter()
            .map(|plot| {
                serde_json::to_value(plot).map(|v| v["type"].as_str().unwrap_or("?").to_owned())
            })
            .collect::<Result<Vec<_>, _>>()?;
        println!(
            "{} -> {} [{}]",
            experiment.name,
            experiment.data.display(),
            plots.join(", ")
        );
    }
    Ok(())
}

async fn inspect(path: &Path) -> Result<()> {
    let data = Dataset::load(path).await?;
    println!(
        "{}: {} rows, columns {}",
        style(data.source_name()).bold(),
        data.len(),
        data.headers().join(", ")
    );
    for column in Column::ALL {
        if !data.has_column(column) {
            continue;
        }
        let values = data
            .distinct_sorted(column)
            .iter()
            .map(|v| column.label(v))
            .collect::<Vec<_>>();
        println!(
            "{} ({} distinct): {}",
            style(column).cyan(),
            values.len(),
            values.join(", ")
        );
    }
    Ok(())
}
