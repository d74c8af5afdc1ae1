use std::path::PathBuf;

use common::{
    chart::{AxisSpec, Chart, LegendPlacement, Series},
    dataset::{Condition, Dataset, Filter},
    keysize::KeySizeSelection,
    measure::{Measure, SizeSource, SpeedSize, measure_points},
    plot::{Placeholders, Plot, PlotContext, display_value, render_charts},
    record::{Column, FieldValue},
    style::{Look, Styles},
    units::SizeUnit,
};
use eyre::{Result, bail};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// X axis column and how it is drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XSpec {
    pub column: Column,
    /// Unit size columns are converted to, raw values when unset
    #[serde(default)]
    pub unit: Option<SizeUnit>,
    #[serde(flatten)]
    pub axis: AxisSpec,
}

impl XSpec {
    fn default_label(&self) -> String {
        let unit = self.unit.map(|u| u.label()).unwrap_or("B");
        match self.column {
            Column::KeySize => format!("Key size [{unit}]"),
            Column::Outsize => format!("File size [{unit}]"),
            Column::InternalThreads => "Number of threads".to_owned(),
            Column::ExternalThreads => "Number of external threads".to_owned(),
            Column::Fanout => "Fanout".to_owned(),
            Column::Implementation => "Implementation".to_owned(),
            Column::EncMode => "Mode".to_owned(),
        }
    }
}

/// One chart per panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub measure: Measure,
    /// Bytes a speed is computed over
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub size: SpeedSize,
    /// Speed unit
    #[serde(default)]
    pub unit: SizeUnit,
    #[serde(default)]
    pub y: AxisSpec,
}

/// Line charts of time or speed against a column, one line per distinct
/// value of another column, one chart set per panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lines {
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub filters: Vec<Condition>,
    #[serde(default)]
    pub panels: Vec<Column>,
    pub lines: Column,
    pub x: XSpec,
    #[serde(default)]
    pub key_size: Option<KeySizeSelection>,
    pub measures: Vec<MeasureSpec>,
    /// File stem template, ie. `keymix-f{fanout}-{measure}`
    pub output: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub legend: LegendPlacement,
    #[serde(default)]
    pub report_max_speed: bool,
}

impl Default for Lines {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            panels: Vec::new(),
            lines: Column::Implementation,
            x: XSpec {
                column: Column::KeySize,
                unit: Some(SizeUnit::Mib),
                axis: AxisSpec::default(),
            },
            key_size: None,
            measures: vec![
                MeasureSpec {
                    measure: Measure::Time,
                    size: SpeedSize::X,
                    unit: SizeUnit::Mib,
                    y: AxisSpec::default(),
                },
                MeasureSpec {
                    measure: Measure::Speed,
                    size: SpeedSize::X,
                    unit: SizeUnit::Mib,
                    y: AxisSpec::default(),
                },
            ],
            output: "{measure}".to_owned(),
            title: None,
            legend: LegendPlacement::default(),
            report_max_speed: false,
        }
    }
}

/// Distinct values of `column`, in registry order for styled columns with a
/// registry and ascending otherwise
pub fn ordered_values(data: &Dataset, styles: &Styles, column: Column) -> Vec<FieldValue> {
    let registry = styles.registry(column);
    if registry.is_empty() {
        return data.distinct_sorted(column);
    }
    let present = data.distinct(column);
    let dropped = present
        .iter()
        .filter(|v| !registry.iter().any(|s| v.as_text() == Some(s.id.as_str())))
        .collect::<Vec<_>>();
    if !dropped.is_empty() {
        debug!("Ignoring unstyled {column} values {dropped:?}");
    }
    registry
        .iter()
        .map(|s| FieldValue::from(s.id.as_str()))
        .filter(|v| present.contains(v))
        .collect()
}

struct MaxSpeed {
    chart: String,
    line: String,
    speed: f64,
    unit: SizeUnit,
}

impl Lines {
    fn panel_values(&self, data: &Dataset, styles: &Styles) -> Vec<Vec<FieldValue>> {
        if self.panels.is_empty() {
            return vec![Vec::new()];
        }
        self.panels
            .iter()
            .map(|c| ordered_values(data, styles, *c))
            .multi_cartesian_product()
            .collect()
    }

    /// Value of `column` for one line: the line or panel value if it is
    /// keyed by `column`, otherwise the single value in `data`
    fn value_of(
        &self,
        column: Column,
        panel: &[FieldValue],
        line: &FieldValue,
        data: &Dataset,
    ) -> Option<FieldValue> {
        if self.lines == column {
            return Some(line.clone());
        }
        if let Some(i) = self.panels.iter().position(|c| *c == column) {
            return panel.get(i).cloned();
        }
        match data.distinct(column).as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        }
    }

    fn select_key_size(
        &self,
        selection: &KeySizeSelection,
        styles: &Styles,
        panel: &[FieldValue],
        line: &FieldValue,
        data: &Dataset,
    ) -> Option<u64> {
        let block_size = self
            .value_of(Column::Implementation, panel, line, data)
            .and_then(|v| {
                v.as_text()
                    .and_then(|id| styles.get(Column::Implementation, id))
                    .and_then(|s| s.block_size)
            });
        let fanout = self
            .value_of(Column::Fanout, panel, line, data)
            .and_then(|v| v.as_int());
        selection.select(data, block_size, fanout)
    }

    fn validate(&self) -> Result<()> {
        if self.measures.is_empty() {
            bail!("Lines `{}` has no measures", self.output);
        }
        if self.panels.contains(&self.lines) || self.panels.contains(&self.x.column) {
            bail!("Lines `{}`: panels overlap lines or x", self.output);
        }
        for spec in &self.measures {
            if spec.measure == Measure::Speed
                && spec.size == SpeedSize::KeySize
                && self.key_size.is_none()
                && self.lines != Column::KeySize
                && !self.panels.contains(&Column::KeySize)
            {
                bail!("Lines `{}`: speed over the key size needs a key size", self.output);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for Lines {
    fn required_columns(&self) -> Vec<Column> {
        let mut columns = vec![self.lines, self.x.column];
        columns.extend(self.panels.iter().copied());
        columns.extend(self.filters.iter().map(|c| c.column()));
        if self.key_size.is_some() {
            columns.push(Column::KeySize);
        }
        columns.into_iter().unique().collect()
    }

    async fn plot(&self, ctx: &PlotContext<'_>) -> Result<Vec<PathBuf>> {
        self.validate()?;
        let filter = Filter::new(&self.filters)?;
        let data = ctx.data.select(&filter);
        if data.is_empty() {
            warn!("{}: no rows for `{}`", ctx.experiment, self.output);
            return Ok(Vec::new());
        }

        let line_values = ordered_values(&data, ctx.styles, self.lines);
        let mut jobs = Vec::new();
        let mut max_speeds = Vec::new();

        for panel in self.panel_values(&data, ctx.styles) {
            let panel_data = self
                .panels
                .iter()
                .zip(&panel)
                .fold(data.clone(), |d, (column, value)| d.where_eq(*column, value));
            if panel_data.is_empty() {
                continue;
            }

            let mut names = Placeholders::new();
            let mut titles = Placeholders::new();
            for (column, value) in self.panels.iter().zip(&panel) {
                names.set(column.name(), value.to_string());
                titles.set(column.name(), display_value(ctx.styles, *column, value));
            }

            for spec in &self.measures {
                names.set("measure", spec.measure.name());
                titles.set("measure", spec.measure.name());
                let stem = names.fill(&self.output)?;

                let mut chart = Chart::new(
                    self.x.axis.clone().into_axis(&self.x.default_label()),
                    spec.y.clone().into_axis(&spec.measure.default_label(spec.unit)),
                );
                chart.legend = self.legend;
                chart.title = self.title.as_ref().map(|t| titles.fill(t)).transpose()?;

                for (i, line) in line_values.iter().enumerate() {
                    let mut line_data = panel_data.where_eq(self.lines, line);
                    if line_data.is_empty() {
                        continue;
                    }

                    let key_size = match &self.key_size {
                        Some(selection) => {
                            let Some(size) =
                                self.select_key_size(selection, ctx.styles, &panel, line, &line_data)
                            else {
                                debug!("{stem}: no key size for {line}");
                                continue;
                            };
                            line_data = line_data.where_eq(Column::KeySize, &size.into());
                            if line_data.is_empty() {
                                debug!("{stem}: no rows for {line} at key size {size}");
                                continue;
                            }
                            Some(size)
                        }
                        None => self
                            .value_of(Column::KeySize, &panel, line, &line_data)
                            .and_then(|v| v.as_int()),
                    };

                    let size = match spec.size {
                        SpeedSize::X => SizeSource::X,
                        SpeedSize::Bytes(bytes) => SizeSource::Fixed(bytes as f64),
                        SpeedSize::KeySize => match key_size {
                            Some(size) => SizeSource::Fixed(size as f64),
                            None => bail!("{stem}: {line} has no single key size"),
                        },
                    };

                    let label = display_value(ctx.styles, self.lines, line);
                    let points = measure_points(
                        &line_data,
                        self.x.column,
                        self.x.unit,
                        spec.measure,
                        size,
                        spec.unit,
                        ctx.settings,
                        &format!("{}/{stem}/{label}", ctx.experiment),
                    )?;
                    if points.is_empty() {
                        continue;
                    }

                    if self.report_max_speed && spec.measure == Measure::Speed {
                        let speed = points.iter().map(|p| p.y).fold(f64::MIN, f64::max);
                        max_speeds.push(MaxSpeed {
                            chart: stem.clone(),
                            line: label.clone(),
                            speed,
                            unit: spec.unit,
                        });
                    }

                    let style = line
                        .as_text()
                        .and_then(|id| ctx.styles.get(self.lines, id));
                    chart.series.push(Series {
                        label,
                        look: Look::resolve(style, i)?,
                        points,
                    });
                }

                jobs.push((chart, ctx.plot_path.join(format!("{stem}.svg"))));
            }
        }

        for (chart, group) in &max_speeds.iter().chunk_by(|m| m.chart.as_str()) {
            ctx.report.line(format!("--- {chart}"));
            for m in group {
                ctx.report.line(format!(
                    "{}\tMax speed = {:.3} {}/s",
                    m.line,
                    m.speed,
                    m.unit.label()
                ));
            }
        }

        render_charts(jobs)
    }
}
