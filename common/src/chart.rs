use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{ContextCompat, Result};
use plotters::{
    coord::{
        Shift,
        ranged1d::{AsRangedCoord, ValueFormatter},
    },
    element::{Drawable, PointCollection},
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use plotters_backend::{BackendCoord, DrawingErrorKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::style::{LineStyle, Look, Marker};

const FONT: &str = "sans-serif";
const FONT_SIZE: u32 = 16;
const MARKER_SIZE: i32 = 5;
const LEGEND_ROW_HEIGHT: u32 = 24;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Linear,
    Log,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ticks {
    #[default]
    Auto,
    /// One tick per distinct x value in the data
    Data,
}

/// Axis as written in the plot configuration
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub scale: Scale,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub ticks: Ticks,
}

impl AxisSpec {
    pub fn into_axis(self, default_label: &str) -> Axis {
        Axis {
            label: self.label.unwrap_or_else(|| default_label.to_owned()),
            scale: self.scale,
            min: self.min,
            max: self.max,
            ticks: self.ticks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub label: String,
    pub scale: Scale,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub ticks: Ticks,
}

impl Axis {
    pub fn new(label: &str, scale: Scale) -> Self {
        Self {
            label: label.to_owned(),
            scale,
            min: None,
            max: None,
            ticks: Ticks::Auto,
        }
    }

    /// Drawn range covering `values`, with configured limits taking precedence
    fn range<I: Iterator<Item = f64>>(&self, values: I) -> (f64, f64) {
        let log = self.scale == Scale::Log;
        let (lo, hi) = values
            .filter(|v| v.is_finite() && (!log || *v > 0.0))
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                None => Some((v, v)),
            })
            .unwrap_or(if log { (1.0, 10.0) } else { (0.0, 1.0) });

        let (mut lo, mut hi) = if log {
            (lo / 1.25, hi * 1.25)
        } else {
            let span = if hi > lo { hi - lo } else { hi.abs().max(1.0) };
            (lo - span * 0.05, hi + span * 0.05)
        };

        if let Some(min) = self.min
            && (!log || min > 0.0)
        {
            lo = min;
        }
        if let Some(max) = self.max {
            hi = max;
        }
        if hi <= lo {
            hi = if log { lo * 10.0 } else { lo + 1.0 };
        }
        (lo, hi)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    UpperLeft,
    #[default]
    UpperRight,
    LowerLeft,
    LowerRight,
}

impl Corner {
    fn position(&self) -> SeriesLabelPosition {
        match self {
            Corner::UpperLeft => SeriesLabelPosition::UpperLeft,
            Corner::UpperRight => SeriesLabelPosition::UpperRight,
            Corner::LowerLeft => SeriesLabelPosition::LowerLeft,
            Corner::LowerRight => SeriesLabelPosition::LowerRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "placement")]
pub enum LegendPlacement {
    /// Above the plot area, outside of it
    Above {
        #[serde(default)]
        columns: Option<usize>,
    },
    Inside {
        #[serde(default)]
        corner: Corner,
    },
    None,
}

impl Default for LegendPlacement {
    fn default() -> Self {
        LegendPlacement::Above { columns: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Half height of the error bar, 0 for none
    pub err: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    #[serde(skip_serializing)]
    pub look: Look,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    #[serde(skip_serializing)]
    pub legend: LegendPlacement,
    #[serde(skip_serializing)]
    pub size: (u32, u32),
    pub series: Vec<Series>,
}

impl Chart {
    pub fn new(x: Axis, y: Axis) -> Self {
        Self {
            title: None,
            x,
            y,
            legend: LegendPlacement::default(),
            size: (640, 480),
            series: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }

    fn legend_columns(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.series.len() / 2).max(1)
    }
}

pub fn format_tick(v: f64) -> String {
    if v == 0.0 {
        return "0".to_owned();
    }
    let abs = v.abs();
    if !(1e-2..1e5).contains(&abs) {
        return format!("{v:.0e}");
    }
    if v.fract() == 0.0 {
        return format!("{v:.0}");
    }
    let s = format!("{v:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Marker or legend sample, in pixel offsets from an anchor point
#[derive(Debug, Clone, PartialEq)]
struct Glyph<C> {
    anchor: C,
    /// Filled outline, drawn last
    fill: Vec<BackendCoord>,
    /// Stroked paths
    paths: Vec<Vec<BackendCoord>>,
    color: RGBColor,
}

/// Regular polygon with `sides` corners on a circle of radius `size`
fn regular_polygon(sides: usize, size: i32, rotation: f64) -> Vec<BackendCoord> {
    (0..sides)
        .map(|i| {
            let angle = rotation + i as f64 * std::f64::consts::TAU / sides as f64;
            (
                (size as f64 * angle.cos()).round() as i32,
                (-size as f64 * angle.sin()).round() as i32,
            )
        })
        .collect()
}

fn marker_outline(marker: Marker, size: i32) -> (Vec<BackendCoord>, Vec<Vec<BackendCoord>>) {
    let up = std::f64::consts::FRAC_PI_2;
    let fill = match marker {
        Marker::Circle => regular_polygon(16, size, 0.0),
        Marker::Square => regular_polygon(4, size, up / 2.0),
        Marker::TriangleUp => regular_polygon(3, size, up),
        Marker::TriangleDown => regular_polygon(3, size, -up),
        Marker::TriangleLeft => regular_polygon(3, size, 2.0 * up),
        Marker::TriangleRight => regular_polygon(3, size, 0.0),
        Marker::Diamond => regular_polygon(4, size, up),
        Marker::Pentagon => regular_polygon(5, size, up),
        Marker::Hexagon => regular_polygon(6, size, up),
        Marker::Octagon => regular_polygon(8, size, up / 4.0),
        Marker::Star => {
            let inner = regular_polygon(5, size * 2 / 5, up + std::f64::consts::PI / 5.0);
            regular_polygon(5, size, up)
                .into_iter()
                .zip(inner)
                .flat_map(|(o, i)| [o, i])
                .collect()
        }
        Marker::Plus => {
            return (
                Vec::new(),
                vec![vec![(-size, 0), (size, 0)], vec![(0, -size), (0, size)]],
            );
        }
        Marker::Cross => {
            return (
                Vec::new(),
                vec![
                    vec![(-size, -size), (size, size)],
                    vec![(-size, size), (size, -size)],
                ],
            );
        }
    };
    (fill, Vec::new())
}

impl<C> Glyph<C> {
    /// A marker shape centred on `anchor`
    fn marker(anchor: C, marker: Marker, size: i32, color: RGBColor) -> Self {
        let (fill, paths) = marker_outline(marker, size);
        Self {
            anchor,
            fill,
            paths,
            color,
        }
    }

    /// Line sample with the marker in its middle, starting at `anchor`
    fn legend(anchor: C, look: Look) -> Self {
        let (fill, marker_paths) = marker_outline(look.marker, MARKER_SIZE);
        let shift = |points: Vec<BackendCoord>| {
            points
                .into_iter()
                .map(|(x, y)| (x + 14, y))
                .collect::<Vec<_>>()
        };
        let segments: &[(i32, i32)] = match look.line {
            LineStyle::Solid => &[(0, 28)],
            LineStyle::Dashed => &[(0, 10), (18, 28)],
            LineStyle::Dotted => &[(0, 3), (12, 15), (24, 27)],
            LineStyle::DashDot => &[(0, 10), (16, 18), (24, 28)],
        };
        let mut paths = segments
            .iter()
            .map(|(from, to)| vec![(*from, 0), (*to, 0)])
            .collect::<Vec<_>>();
        paths.extend(marker_paths.into_iter().map(shift));
        Self {
            anchor,
            fill: shift(fill),
            paths,
            color: look.color,
        }
    }
}

impl<'a, C> PointCollection<'a, C> for &'a Glyph<C> {
    type Point = &'a C;
    type IntoIter = std::iter::Once<&'a C>;

    fn point_iter(self) -> Self::IntoIter {
        std::iter::once(&self.anchor)
    }
}

impl<C, DB: DrawingBackend> Drawable<DB> for Glyph<C> {
    fn draw<I: Iterator<Item = BackendCoord>>(
        &self,
        mut pos: I,
        backend: &mut DB,
        _: (u32, u32),
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        let Some((x0, y0)) = pos.next() else {
            return Ok(());
        };
        let at = |points: &[BackendCoord]| {
            points
                .iter()
                .map(|(x, y)| (x + x0, y + y0))
                .collect::<Vec<_>>()
        };
        let stroke = self.color.stroke_width(2);
        for path in &self.paths {
            backend.draw_path(at(path), &stroke)?;
        }
        if !self.fill.is_empty() {
            backend.fill_polygon(at(&self.fill), &self.color)?;
        }
        Ok(())
    }
}

/// Draws `entries` in a grid of `columns` columns filling `area`
fn draw_legend_grid<DB>(
    area: &DrawingArea<DB, Shift>,
    entries: &[(String, Look)],
    columns: usize,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, _) = area.dim_in_pixel();
    let columns = columns.max(1);
    let cell = (width as usize / columns) as i32;
    let text_style = TextStyle::from((FONT, FONT_SIZE).into_font()).pos(Pos::new(HPos::Left, VPos::Center));
    for (i, (label, look)) in entries.iter().enumerate() {
        let x = (i % columns) as i32 * cell + 8;
        let y = (i / columns) as i32 * LEGEND_ROW_HEIGHT as i32 + LEGEND_ROW_HEIGHT as i32 / 2 + 4;
        area.draw(&Glyph::legend((x, y), *look))?;
        area.draw(&Text::new(label.clone(), (x + 36, y), text_style.clone()))?;
    }
    Ok(())
}

fn legend_height(entries: usize, columns: usize) -> u32 {
    let rows = entries.div_ceil(columns.max(1)) as u32;
    rows * LEGEND_ROW_HEIGHT + 8
}

fn draw_chart<X, Y>(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    chart: &Chart,
    x_spec: X,
    y_spec: Y,
    y_floor: f64,
) -> Result<()>
where
    X: AsRangedCoord<Value = f64>,
    Y: AsRangedCoord<Value = f64>,
    X::CoordDescType: ValueFormatter<f64>,
    Y::CoordDescType: ValueFormatter<f64>,
{
    let mut builder = ChartBuilder::on(area);
    builder
        .margin(12)
        .x_label_area_size(48)
        .y_label_area_size(64);
    if let Some(title) = &chart.title {
        builder.caption(title, (FONT, FONT_SIZE + 2));
    }
    let mut ctx = builder.build_cartesian_2d(x_spec, y_spec)?;

    let data_ticks = chart.x.ticks == Ticks::Data;
    let fmt = |v: &f64| format_tick(*v);
    let no_label = |_: &f64| String::new();
    let mut mesh = ctx.configure_mesh();
    mesh.light_line_style(WHITE)
        .x_desc(chart.x.label.as_str())
        .y_desc(chart.y.label.as_str())
        .axis_desc_style((FONT, FONT_SIZE))
        .label_style((FONT, FONT_SIZE - 2))
        .x_label_formatter(&fmt)
        .y_label_formatter(&fmt);
    if data_ticks {
        // Log axes keep their decade key points even with no labels requested
        mesh.disable_x_mesh()
            .x_labels(0)
            .x_label_formatter(&no_label)
            .set_tick_mark_size(LabelAreaPosition::Bottom, 0);
    }
    mesh.draw()?;

    let inside = match chart.legend {
        LegendPlacement::Inside { corner } => Some(corner),
        _ => None,
    };

    for series in &chart.series {
        if series.points.is_empty() {
            continue;
        }
        let look = series.look;
        let stroke = look.color.stroke_width(2);
        let coords = series.points.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>();

        let anno = match look.line {
            LineStyle::Solid => ctx.draw_series(LineSeries::new(coords.clone(), stroke))?,
            LineStyle::Dashed => {
                ctx.draw_series(DashedLineSeries::new(coords.clone(), 10, 6, stroke))?
            }
            LineStyle::Dotted => {
                ctx.draw_series(DashedLineSeries::new(coords.clone(), 3, 4, stroke))?
            }
            LineStyle::DashDot => {
                ctx.draw_series(DashedLineSeries::new(coords.clone(), 12, 4, stroke))?
            }
        };
        if inside.is_some() {
            anno.label(series.label.as_str())
                .legend(move |coord| Glyph::legend(coord, look));
        }

        ctx.draw_series(
            series
                .points
                .iter()
                .filter(|p| p.err > 0.0)
                .map(|p| {
                    ErrorBar::new_vertical(
                        p.x,
                        (p.y - p.err).max(y_floor),
                        p.y,
                        p.y + p.err,
                        stroke,
                        8,
                    )
                }),
        )?;
        ctx.draw_series(
            coords
                .iter()
                .map(|c| Glyph::marker(*c, look.marker, MARKER_SIZE, look.color)),
        )?;
    }

    if let Some(corner) = inside {
        ctx.configure_series_labels()
            .position(corner.position())
            .label_font((FONT, FONT_SIZE - 2))
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()?;
    }

    if data_ticks {
        let (base_x, base_y) = area.get_base_pixel();
        let y_bottom = ctx.y_range().start;
        let text_style =
            TextStyle::from((FONT, FONT_SIZE - 2).into_font()).pos(Pos::new(HPos::Center, VPos::Top));
        let mut ticks = chart
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.x))
            .collect::<Vec<_>>();
        ticks.sort_by(|a, b| a.total_cmp(b));
        ticks.dedup();
        for tick in ticks {
            let (px, py) = ctx.backend_coord(&(tick, y_bottom));
            let (px, py) = (px - base_x, py - base_y);
            area.draw(&PathElement::new(vec![(px, py), (px, py + 5)], BLACK))?;
            area.draw(&Text::new(format_tick(tick), (px, py + 8), text_style.clone()))?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ChartData<'a> {
    title: &'a Option<String>,
    x: &'a Axis,
    y: &'a Axis,
    series: &'a [Series],
}

/// Writes the drawn series as `plot_data/<stem>.json` next to `filepath`
fn write_plot_data(filepath: &Path, chart: &Chart) -> Result<PathBuf> {
    let dir = filepath
        .parent()
        .context("Chart path has no parent")?
        .join("plot_data");
    fs::create_dir_all(&dir)?;
    let stem = filepath
        .file_stem()
        .and_then(|s| s.to_str())
        .context(format!("Invalid chart path {filepath:?}"))?;
    let data_path = dir.join(format!("{stem}.json"));
    let data = ChartData {
        title: &chart.title,
        x: &chart.x,
        y: &chart.y,
        series: &chart.series,
    };
    fs::write(&data_path, serde_json::to_string_pretty(&data)?)?;
    Ok(data_path)
}

/// Renders `chart` to the SVG file `filepath`.
///
/// Returns `false` without touching the file system when there is nothing to
/// draw.
pub fn render(chart: &Chart, filepath: &Path) -> Result<bool> {
    if chart.is_empty() {
        debug!("Skipping empty chart {}", filepath.display());
        return Ok(false);
    }
    if let Some(parent) = filepath.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }

    let points = || chart.series.iter().flat_map(|s| s.points.iter());
    let (x_lo, x_hi) = chart.x.range(points().map(|p| p.x));
    let (y_lo, y_hi) = chart
        .y
        .range(points().flat_map(|p| [p.y - p.err, p.y, p.y + p.err]));

    let root = SVGBackend::new(filepath, chart.size).into_drawing_area();
    root.fill(&WHITE)?;

    let body = match chart.legend {
        LegendPlacement::Above { columns } => {
            let entries = chart
                .series
                .iter()
                .filter(|s| !s.points.is_empty())
                .map(|s| (s.label.clone(), s.look))
                .collect::<Vec<_>>();
            let columns = chart.legend_columns(columns);
            let (top, body) = root.split_vertically(legend_height(entries.len(), columns));
            draw_legend_grid(&top, &entries, columns)?;
            body
        }
        _ => root.clone(),
    };

    match (chart.x.scale, chart.y.scale) {
        (Scale::Linear, Scale::Linear) => draw_chart(&body, chart, x_lo..x_hi, y_lo..y_hi, y_lo)?,
        (Scale::Log, Scale::Linear) => {
            draw_chart(&body, chart, (x_lo..x_hi).log_scale(), y_lo..y_hi, y_lo)?
        }
        (Scale::Linear, Scale::Log) => {
            draw_chart(&body, chart, x_lo..x_hi, (y_lo..y_hi).log_scale(), y_lo)?
        }
        (Scale::Log, Scale::Log) => draw_chart(
            &body,
            chart,
            (x_lo..x_hi).log_scale(),
            (y_lo..y_hi).log_scale(),
            y_lo,
        )?,
    }

    root.present()?;
    let data_path = write_plot_data(filepath, chart)?;
    debug!(
        "Wrote {} (data {})",
        filepath.display(),
        data_path.display()
    );
    Ok(true)
}

/// Renders only a legend, for sharing one legend between several charts
pub fn render_legend(entries: &[(String, Look)], columns: usize, filepath: &Path) -> Result<bool> {
    if entries.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = filepath.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    let columns = columns.max(1);
    let width = 200 * columns as u32;
    let root =
        SVGBackend::new(filepath, (width, legend_height(entries.len(), columns))).into_drawing_area();
    root.fill(&WHITE)?;
    draw_legend_grid(&root, entries, columns)?;
    root.present()?;
    Ok(true)
}
