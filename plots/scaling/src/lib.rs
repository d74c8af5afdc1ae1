use std::path::PathBuf;

use common::{
    aggregate::{mean, median},
    chart::{Axis, AxisSpec, Chart, LegendPlacement, Point, Scale, Series, Ticks},
    dataset::{Condition, Filter},
    keysize::block_power,
    measure::{Measure, SizeSource, measure_points},
    plot::{Placeholders, Plot, PlotContext, display_value, render_charts},
    record::{Column, FieldValue},
    style::Look,
    units::{SizeUnit, to_mib},
};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Time and speed against the number of internal threads, one chart pair per
/// fanout, at the key size `block_size * fanout^k` just above a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadScaling {
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub filters: Vec<Condition>,
    #[serde(default = "default_target_key_size")]
    pub target_key_size: u64,
    /// Larger thread counts are dropped, ie. SMT results
    #[serde(default = "default_max_threads")]
    pub max_threads: u64,
    /// Thread axis scale, speeds are in GiB/s on a log axis and MiB/s otherwise
    #[serde(default = "default_scale")]
    pub scale: Scale,
    #[serde(default)]
    pub time: AxisSpec,
    #[serde(default)]
    pub speed: AxisSpec,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub legend: LegendPlacement,
    /// Print per thread gains
    #[serde(default = "default_report")]
    pub report: bool,
}

fn default_target_key_size() -> u64 {
    256 * 1024 * 1024
}

fn default_max_threads() -> u64 {
    64
}

fn default_scale() -> Scale {
    Scale::Log
}

fn default_output() -> String {
    "keymix-f{fanout}-threading-{measure}".to_owned()
}

fn default_report() -> bool {
    true
}

impl Default for ThreadScaling {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            target_key_size: default_target_key_size(),
            max_threads: default_max_threads(),
            scale: default_scale(),
            time: AxisSpec::default(),
            speed: AxisSpec::default(),
            output: default_output(),
            legend: LegendPlacement::default(),
            report: default_report(),
        }
    }
}

/// Speed at one thread count relative to the first thread count
#[derive(Debug, Clone, PartialEq)]
pub struct Gain {
    pub threads: u64,
    pub speed: f64,
    /// Percent over the first speed
    pub gain: f64,
    /// `gain / max(1, threads - 1)`
    pub per_thread: f64,
}

pub fn thread_gains(points: &[Point]) -> Vec<Gain> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    points
        .iter()
        .map(|p| {
            let threads = p.x as u64;
            let gain = (p.y - first.y) / first.y * 100.0;
            Gain {
                threads,
                speed: p.y,
                gain,
                per_thread: gain / threads.saturating_sub(1).max(1) as f64,
            }
        })
        .collect()
}

impl ThreadScaling {
    fn speed_unit(&self) -> SizeUnit {
        match self.scale {
            Scale::Log => SizeUnit::Gib,
            Scale::Linear => SizeUnit::Mib,
        }
    }

    fn x_axis(&self) -> Axis {
        let mut axis = Axis::new("Number of threads", self.scale);
        axis.ticks = Ticks::Data;
        axis
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for ThreadScaling {
    fn required_columns(&self) -> Vec<Column> {
        let mut columns = vec![
            Column::Implementation,
            Column::Fanout,
            Column::KeySize,
            Column::InternalThreads,
        ];
        columns.extend(self.filters.iter().map(|c| c.column()));
        columns
    }

    async fn plot(&self, ctx: &PlotContext<'_>) -> Result<Vec<PathBuf>> {
        let filter = Filter::new(&self.filters)?;
        let max_threads = self.max_threads;
        let data = ctx.data.select(&filter).retain(|r| {
            r.internal_threads.is_some_and(|t| t <= max_threads)
        });
        if data.is_empty() {
            warn!("{}: no rows for `{}`", ctx.experiment, self.output);
            return Ok(Vec::new());
        }

        let unit = self.speed_unit();
        let mut jobs = Vec::new();
        let mut contributions = Vec::new();

        for fanout in data.distinct_sorted(Column::Fanout) {
            let Some(fanout_n) = fanout.as_int() else {
                continue;
            };
            let fanout_data = data.where_eq(Column::Fanout, &fanout);
            let mut names = Placeholders::new().with("fanout", fanout.to_string());

            let mut time_chart = Chart::new(
                self.x_axis(),
                self.time.clone().into_axis(&Measure::Time.default_label(unit)),
            );
            let mut speed_chart = Chart::new(
                self.x_axis(),
                self.speed.clone().into_axis(&Measure::Speed.default_label(unit)),
            );
            time_chart.legend = self.legend;
            speed_chart.legend = self.legend;

            if self.report {
                ctx.report.line(format!("--- Fanout {fanout}"));
            }
            let impls = ctx.styles.registry(Column::Implementation);
            for (i, style) in impls.iter().enumerate() {
                let id = FieldValue::from(style.id.as_str());
                let Some(block_size) = style.block_size else {
                    warn!("{} has no block size, skipping thread scaling", style.id);
                    continue;
                };
                let Some(key_size) = block_power(block_size, fanout_n, self.target_key_size) else {
                    debug!("{}: no key size for fanout {fanout}", style.id);
                    continue;
                };
                let line_data = fanout_data
                    .where_eq(Column::Implementation, &id)
                    .where_eq(Column::KeySize, &key_size.into());
                if line_data.is_empty() {
                    continue;
                }

                let context = format!("{}/fanout {fanout}/{}", ctx.experiment, style.id);
                let time = measure_points(
                    &line_data,
                    Column::InternalThreads,
                    None,
                    Measure::Time,
                    SizeSource::X,
                    unit,
                    ctx.settings,
                    &context,
                )?;
                let speed = measure_points(
                    &line_data,
                    Column::InternalThreads,
                    None,
                    Measure::Speed,
                    SizeSource::Fixed(key_size as f64),
                    unit,
                    ctx.settings,
                    &context,
                )?;

                if self.report {
                    ctx.report.line(format!(
                        "=== {} ({:.1} MiB)",
                        style.id,
                        to_mib(key_size as f64)
                    ));
                    for gain in thread_gains(&speed) {
                        ctx.report.line(format!(
                            "Threads = {}\tSpeed = {:.3} {}/s\t+{:>6.2}%\t+{:>6.2}%",
                            gain.threads,
                            gain.speed,
                            unit.label(),
                            gain.gain,
                            gain.per_thread
                        ));
                        if gain.threads > 1 {
                            contributions.push(gain.per_thread);
                        }
                    }
                }

                let look = Look::resolve(Some(style), i)?;
                let label = display_value(ctx.styles, Column::Implementation, &id);
                time_chart.series.push(Series {
                    label: label.clone(),
                    look,
                    points: time,
                });
                speed_chart.series.push(Series {
                    label,
                    look,
                    points: speed,
                });
            }

            for (measure, chart) in [(Measure::Time, time_chart), (Measure::Speed, speed_chart)] {
                names.set("measure", measure.name());
                let stem = names.fill(&self.output)?;
                jobs.push((chart, ctx.plot_path.join(format!("{stem}.svg"))));
            }
        }

        if self.report
            && let (Some(avg), Some(med)) = (mean(&contributions), median(&contributions))
        {
            ctx.report.line("--- Overall");
            ctx.report.line(format!(
                "Additional thread improvement\t+{avg:>6.2} (avg)\t+{med:>6.2} (median)"
            ));
        }

        render_charts(jobs)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use common::{
        config::Settings,
        dataset::Dataset,
        plot::Report,
        style::{SeriesStyle, Styles},
    };

    use super::*;

    // 16 byte blocks reach 64 bytes at fanout 2 and 4
    const THREADS_CSV: &str = "\
implementation,fanout,key_size,internal_threads,time
aes,2,64,1,400
aes,2,64,2,200
aes,2,64,4,125
aes,2,64,128,10
aes,2,32,1,1
aes,4,64,1,100
aes,4,64,8,20
other,2,64,1,10
";

    fn styles(block_size: Option<u64>) -> Styles {
        Styles {
            implementation: vec![SeriesStyle {
                id: "aes".to_owned(),
                name: "AES".to_owned(),
                block_size,
                marker: None,
                line: Default::default(),
                color: Some("royalblue".to_owned()),
            }],
            enc_mode: vec![],
        }
    }

    async fn run(
        plot: &ThreadScaling,
        styles: &Styles,
        dir: &Path,
        report: &Report,
    ) -> Result<Vec<PathBuf>> {
        let data = Dataset::from_reader("threads.csv", THREADS_CSV.as_bytes())?;
        let settings = Settings::default();
        let ctx = PlotContext {
            experiment: "test",
            data: &data,
            plot_path: dir,
            settings: &settings,
            styles,
            report,
        };
        plot.plot(&ctx).await
    }

    fn point(x: f64, y: f64) -> Point {
        Point { x, y, err: 0.0 }
    }

    #[test]
    fn gains_relative_to_first() {
        let gains = thread_gains(&[point(1.0, 2.0), point(2.0, 3.0), point(4.0, 5.0)]);
        assert_eq!(gains[0].gain, 0.0);
        assert_eq!(gains[0].per_thread, 0.0);
        assert!((gains[1].gain - 50.0).abs() < 1e-9);
        assert!((gains[1].per_thread - 50.0).abs() < 1e-9);
        assert!((gains[2].gain - 150.0).abs() < 1e-9);
        assert!((gains[2].per_thread - 50.0).abs() < 1e-9);
        assert!(thread_gains(&[]).is_empty());
    }

    #[tokio::test]
    async fn charts_per_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let plot = ThreadScaling {
            target_key_size: 40,
            scale: Scale::Linear,
            ..Default::default()
        };
        let report = Report::new();
        let written = run(&plot, &styles(Some(16)), dir.path(), &report).await.unwrap();
        let mut names = written
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(|s| s.to_owned()))
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(
            names,
            vec![
                "keymix-f2-threading-speed.svg",
                "keymix-f2-threading-time.svg",
                "keymix-f4-threading-speed.svg",
                "keymix-f4-threading-time.svg",
            ]
        );

        let json = std::fs::read_to_string(
            dir.path().join("plot_data/keymix-f2-threading-speed.json"),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let points = value["series"][0]["points"].as_array().unwrap();
        let xs = points
            .iter()
            .map(|p| p["x"].as_f64().unwrap())
            .collect::<Vec<_>>();
        // 128 threads is above the cap, 32 byte keys are not selected
        assert_eq!(xs, vec![1.0, 2.0, 4.0]);
        // 64 bytes in 0.4 s
        let first = points[0]["y"].as_f64().unwrap();
        assert!((first - to_mib(160.0)).abs() < 1e-12);
        assert_eq!(value["y"]["label"], "Average speed [MiB/s]");

        let report = report.take();
        assert_eq!(report[0], "--- Fanout 2");
        assert!(report[1].starts_with("=== "));
        assert!(report.iter().any(|l| l.starts_with("Threads = 4\t")));
        assert_eq!(report[report.len() - 2], "--- Overall");
        assert!(report[report.len() - 1].starts_with("Additional thread improvement"));
    }

    #[tokio::test]
    async fn missing_block_size_skips_implementation() {
        let dir = tempfile::tempdir().unwrap();
        let plot = ThreadScaling {
            target_key_size: 40,
            report: false,
            ..Default::default()
        };
        let report = Report::new();
        let written = run(&plot, &styles(None), dir.path(), &report).await.unwrap();
        assert!(written.is_empty());
        assert!(report.take().is_empty());
    }

    #[test]
    fn defaults_from_yaml() {
        let plot: Box<dyn Plot> = serde_yml::from_str("type: ThreadScaling\n").unwrap();
        let plot = plot.downcast_ref::<ThreadScaling>().unwrap();
        assert_eq!(plot.max_threads, 64);
        assert_eq!(plot.target_key_size, 256 * 1024 * 1024);
        assert_eq!(plot.speed_unit(), SizeUnit::Gib);
    }
}
