use std::path::Path;

use chrono::Local;
use common::{
    config::Config,
    dataset::Dataset,
    plot::{PlotContext, Report, plot},
};
use console::style;
use eyre::{Result, bail};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

pub async fn run_plots(config_file: &Path, only: Option<&str>, no_progress: bool) -> Result<()> {
    let started = Local::now();
    let config = Config::load(config_file).await?;

    let experiments = match only {
        Some(name) => match config.experiment(name) {
            Some(experiment) => vec![experiment],
            None => bail!("No experiment {name} in {}", config_file.display()),
        },
        None => config.experiments.iter().collect(),
    };
    debug!("Plotting {} experiments of {}", experiments.len(), config.name);

    let datasets = join_all(experiments.iter().map(|e| Dataset::load(&e.data))).await;

    let pb = if no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(experiments.len() as u64)
    };
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let report = Report::new();
    let mut written = 0;
    for (experiment, data) in experiments.iter().zip(datasets) {
        let data = data?;
        pb.set_message(experiment.name.clone());
        let plot_path = config.settings.output_dir.join(&experiment.name);
        let ctx = PlotContext {
            experiment: &experiment.name,
            data: &data,
            plot_path: &plot_path,
            settings: &config.settings,
            styles: &config.styles,
            report: &report,
        };
        let files = plot(&experiment.plots, &ctx).await?;
        info!("{}: {} charts in {}", experiment.name, files.len(), plot_path.display());
        written += files.len();
        pb.inc(1);
    }
    pb.finish_and_clear();

    for line in report.take() {
        println!("{line}");
    }

    let elapsed = Local::now() - started;
    println!(
        "{} {written} charts to {} in {:.2}s",
        style("Wrote").green().bold(),
        config.settings.output_dir.display(),
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    Ok(())
}
