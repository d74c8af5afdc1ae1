/// Crates whose log level follows `RUST_LOG` unless overridden with `-l`
pub const MODULES: &[&str] = &["common", "lines", "scaling", "legend"];

/// Links every plot crate so their types are registered with typetag
pub fn init_plots() -> serde_json::Result<()> {
    serde_json::to_string(&lines::Lines::default())?;
    serde_json::to_string(&scaling::ThreadScaling::default())?;
    serde_json::to_string(&legend::Legend::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::{config::Config, measure::SpeedSize, record::Column};

    use super::*;

    #[test]
    fn presets_parse() {
        init_plots().unwrap();
        for (name, yaml) in [
            ("keymix", include_str!("../../../configs/keymix.yaml")),
            ("enc", include_str!("../../../configs/enc.yaml")),
            ("fanout", include_str!("../../../configs/fanout.yaml")),
        ] {
            let config = Config::from_yaml(yaml).unwrap();
            assert_eq!(config.name, name);
            assert!(!config.experiments.is_empty());
            assert!(config.experiments.iter().all(|e| !e.plots.is_empty()));
        }
    }

    #[test]
    fn preset_plot_types() {
        let config = Config::from_yaml(include_str!("../../../configs/keymix.yaml")).unwrap();
        let plots = &config.experiments[0].plots;
        assert!(plots[0].downcast_ref::<legend::Legend>().is_some());
        let lines = plots[1].downcast_ref::<lines::Lines>().unwrap();
        assert_eq!(lines.panels, vec![Column::Fanout]);
        assert_eq!(lines.filters.len(), 1);
        assert_eq!(lines.filters[0].column(), Column::InternalThreads);
        let scaling = plots[2].downcast_ref::<scaling::ThreadScaling>().unwrap();
        assert_eq!(scaling.max_threads, 64);
        assert_eq!(config.settings.repetitions, Some(5));
        assert_eq!(config.styles.implementation.len(), 13);
    }

    #[test]
    fn enc_preset_speed_sizes() {
        init_plots().unwrap();
        let config = Config::from_yaml(include_str!("../../../configs/enc.yaml")).unwrap();
        let lines = config.experiments[0].plots[0]
            .downcast_ref::<lines::Lines>()
            .unwrap();
        assert_eq!(lines.filters.len(), 2);
        assert_eq!(lines.filters[1].column(), Column::Outsize);
        assert_eq!(lines.measures[1].size, SpeedSize::Bytes(107374182400));
    }
}
