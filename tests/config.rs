// Integration tests for loading plotter configuration files

#[cfg(test)]
mod tests {
    use penplot_rs::config::{ConfigError, PlotterConfig};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = PlotterConfig::load(file.path()).unwrap();
        assert_eq!(config, PlotterConfig::default());
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.liveness_timeout(), Duration::from_secs(3));
        assert_eq!(config.homing.timeout(), Duration::from_secs(60));
        assert_eq!(config.executor.pause_poll_every, 10);
    }

    #[test]
    fn test_partial_override() {
        let file = write_config(
            r#"
[serial]
port = "/dev/ttyUSB1"

[pen]
down_height_mm = 4.5

[page]
width_mm = 297.0
height_mm = 420.0
"#,
        );
        let config = PlotterConfig::load(file.path()).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.pen.down_height_mm, 4.5);
        assert_eq!(config.pen.up_height_mm, 0.0);
        assert_eq!(config.page.width_mm, 297.0);
        assert_eq!(config.motion.max_feed, 2500.0);
    }

    #[test]
    fn test_clamp_helpers() {
        let motion = PlotterConfig::default().motion;
        assert_eq!(motion.clamp_x(-5.0), 0.0);
        assert_eq!(motion.clamp_x(500.0), 297.0);
        assert_eq!(motion.clamp_y(-500.0), -420.0);
        assert_eq!(motion.clamp_feed(10.0), 50.0);
        assert_eq!(motion.clamp_feed(1200.0), 1200.0);
    }

    #[test]
    fn test_inverted_pen_heights_rejected() {
        let file = write_config("[pen]\nup_height_mm = 6.0\ndown_height_mm = 2.0\n");
        let err = PlotterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_zero_pause_poll_rejected() {
        let mut config = PlotterConfig::default();
        config.executor.pause_poll_every = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[serial\nport = ");
        let err = PlotterConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "got {:?}", err);
    }

    #[test]
    fn test_missing_file() {
        let err = PlotterConfig::load("/nonexistent/penplot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
