use core::fmt::Debug;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::{Result, bail};
use futures::future::join_all;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use regex::{Captures, Regex};
use tokio::fs::create_dir_all;
use tracing::debug;

use crate::{
    chart::{Chart, render},
    config::Settings,
    dataset::Dataset,
    record::{Column, FieldValue},
    style::Styles,
};

/// Everything a plot needs to draw one experiment
#[derive(Debug, Clone, Copy)]
pub struct PlotContext<'a> {
    pub experiment: &'a str,
    pub data: &'a Dataset,
    /// Directory for this experiment's charts, ie. graphs/anthem
    pub plot_path: &'a Path,
    pub settings: &'a Settings,
    pub styles: &'a Styles,
    pub report: &'a Report,
}

/// Text summaries written by plots, printed once all charts are done
#[derive(Debug, Default)]
pub struct Report {
    lines: Mutex<Vec<String>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, line: impl Into<String>) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.into());
    }

    /// Removes and returns the lines written so far
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[typetag::serde(tag = "type")]
#[async_trait::async_trait]
pub trait Plot: Debug + DynClone + Downcast + Send + Sync {
    /// Columns the dataset must have for this plot
    fn required_columns(&self) -> Vec<Column>;
    /// Draws the charts and returns the files that were written
    async fn plot(&self, ctx: &PlotContext<'_>) -> Result<Vec<PathBuf>>;
}
clone_trait_object!(Plot);
impl_downcast!(Plot);

pub async fn ensure_plot_dirs(dirs: &[PathBuf]) -> Result<()> {
    let create_jobs = dirs.iter().map(create_dir_all);
    for res in join_all(create_jobs).await {
        res?;
    }
    Ok(())
}

/// Renders every job in parallel, returning the paths of non-empty charts
pub fn render_charts(jobs: Vec<(Chart, PathBuf)>) -> Result<Vec<PathBuf>> {
    let results = jobs
        .into_par_iter()
        .map(|(chart, filepath)| render(&chart, &filepath).map(|written| (written, filepath)))
        .collect::<Vec<_>>();

    let mut written = Vec::new();
    for res in results {
        let (was_written, filepath) = res?;
        if was_written {
            written.push(filepath);
        }
    }
    Ok(written)
}

/// Values substituted into output and title templates
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(String, String)>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name.to_owned(), value)),
        }
        self
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every `{name}`, failing on names that have no value
    pub fn fill(&self, template: &str) -> Result<String> {
        let placeholder = Regex::new(r"\{([a-z_]+)\}")?;
        let mut missing = Vec::new();
        let filled = placeholder.replace_all(template, |caps: &Captures| match self.get(&caps[1]) {
            Some(value) => value.to_owned(),
            None => {
                missing.push(caps[1].to_owned());
                String::new()
            }
        });
        if !missing.is_empty() {
            bail!("Template `{template}` uses unknown placeholders {missing:?}");
        }
        Ok(filled.into_owned())
    }
}

/// Display name of a panel or line value: registry name for styled columns,
/// `N MiB` for sizes
pub fn display_value(styles: &Styles, column: Column, value: &FieldValue) -> String {
    match value {
        FieldValue::Text(id) => styles
            .get(column, id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.clone()),
        FieldValue::Int(_) => column.label(value),
    }
}

/// Runs each plot on the experiment, in order
pub async fn plot(plots: &[Box<dyn Plot>], ctx: &PlotContext<'_>) -> Result<Vec<PathBuf>> {
    if plots.is_empty() {
        debug!("No plots for {}", ctx.experiment);
        return Ok(Vec::new());
    }

    ensure_plot_dirs(&[ctx.plot_path.to_path_buf()]).await?;
    let mut written = Vec::new();
    for plot in plots {
        ctx.data.require(&plot.required_columns())?;
        let files = plot.plot(ctx).await?;
        debug!("{:?} wrote {} files", plot, files.len());
        written.extend(files);
    }
    Ok(written)
}
