use std::path::PathBuf;

use common::{
    chart::render_legend,
    dataset::{Condition, Filter},
    plot::{Plot, PlotContext, ensure_plot_dirs},
    record::Column,
    style::Look,
};
use eyre::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Legend shared by a set of charts, as its own file.
///
/// Lists the styled values of `column` present in the data, sorted by display
/// name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Legend {
    #[serde(default = "default_column")]
    pub column: Column,
    #[serde(default, with = "serde_yml::with::singleton_map_recursive")]
    pub filters: Vec<Condition>,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_column() -> Column {
    Column::Implementation
}

fn default_columns() -> usize {
    7
}

fn default_output() -> String {
    "legend".to_owned()
}

impl Default for Legend {
    fn default() -> Self {
        Self {
            column: default_column(),
            filters: Vec::new(),
            columns: default_columns(),
            output: default_output(),
        }
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for Legend {
    fn required_columns(&self) -> Vec<Column> {
        let mut columns = vec![self.column];
        columns.extend(self.filters.iter().map(|c| c.column()));
        columns
    }

    async fn plot(&self, ctx: &PlotContext<'_>) -> Result<Vec<PathBuf>> {
        let filter = Filter::new(&self.filters)?;
        let present = ctx.data.select(&filter).distinct(self.column);

        let entries = ctx
            .styles
            .registry(self.column)
            .iter()
            .enumerate()
            .filter(|(_, s)| present.iter().any(|v| v.as_text() == Some(s.id.as_str())))
            .map(|(i, s)| Ok((s.name.clone(), Look::resolve(Some(s), i)?)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .collect::<Vec<_>>();
        if entries.is_empty() {
            debug!("No styled {} values for {}", self.column, ctx.experiment);
            return Ok(Vec::new());
        }

        ensure_plot_dirs(&[ctx.plot_path.to_path_buf()]).await?;
        let filepath = ctx.plot_path.join(format!("{}.svg", self.output));
        if render_legend(&entries, self.columns, &filepath)? {
            Ok(vec![filepath])
        } else {
            Ok(Vec::new())
        }
    }
}
