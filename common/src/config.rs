use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;

use crate::{plot::Plot, style::Styles};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub styles: Styles,
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Charts are written to `<output_dir>/<experiment>/`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Trials expected per group
    #[serde(default)]
    pub repetitions: Option<usize>,
    /// Fail instead of warning on a repetition mismatch
    #[serde(default)]
    pub strict_repetitions: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("graphs")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            repetitions: None,
            strict_repetitions: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    /// CSV file, relative to the configuration file
    pub data: PathBuf,
    #[serde(default)]
    pub plots: Vec<Box<dyn Plot>>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yml::from_str(yaml)?;
        config.styles.validate()?;
        Ok(config)
    }

    /// Loads `path`, resolving dataset and output paths against its directory
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = read_to_string(path)
            .await
            .context(format!("Read config {}", path.display()))?;
        let mut config =
            Self::from_yaml(&yaml).context(format!("Parse config {}", path.display()))?;
        if let Some(base) = path.parent() {
            for experiment in &mut config.experiments {
                experiment.data = base.join(&experiment.data);
            }
            config.settings.output_dir = base.join(&config.settings.output_dir);
        }
        Ok(config)
    }

    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        self.experiments.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: keymix
settings: { repetitions: 5 }
styles:
  implementation:
    - { id: blake3-blake3, name: BLAKE3, block_size: 32, marker: cross, line: dotted, color: brown }
experiments:
  - name: anthem
    data: data/out-anthem.csv
"#;

    #[test]
    fn parses_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.settings.output_dir, PathBuf::from("graphs"));
        assert_eq!(config.settings.repetitions, Some(5));
        assert!(!config.settings.strict_repetitions);
        assert_eq!(config.styles.implementation[0].block_size, Some(32));
        assert!(config.experiment("anthem").unwrap().plots.is_empty());
        assert!(config.experiment("other").is_none());
    }

    #[test]
    fn rejects_bad_styles() {
        let yaml = YAML.replace("brown", "not-a-colour");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[tokio::test]
    async fn load_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots.yaml");
        std::fs::write(&path, YAML).unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.settings.output_dir, dir.path().join("graphs"));
        assert_eq!(
            config.experiments[0].data,
            dir.path().join("data/out-anthem.csv")
        );
    }
}
