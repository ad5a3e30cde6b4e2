//! Analysis configuration files.
//!
//! The configuration is TOML with every section optional. The catalog
//! directory can also come from `VHE_DATA` (a `.env` file in the working
//! directory is honoured).

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::AnalysisConfig;
use crate::error::AppError;

/// Environment variable naming the default catalog directory.
pub const DATA_DIR_ENV: &str = "VHE_DATA";

/// Read and validate a TOML configuration file.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config '{}': {e}", path.display())))?;
    parse_config(&text).map_err(|e| match e {
        AppError::Config(msg) => AppError::config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parse and validate configuration text.
pub fn parse_config(text: &str) -> Result<AnalysisConfig, AppError> {
    let config: AnalysisConfig = toml::from_str(text).map_err(|e| AppError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Catalog directory: CLI flag, then config file, then `$VHE_DATA`.
pub fn resolve_data_dir(cli: Option<&Path>, config: &AnalysisConfig) -> Result<PathBuf, AppError> {
    if let Some(dir) = cli {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = &config.data.dir {
        return Ok(dir.clone());
    }
    dotenvy::dotenv().ok();
    std::env::var(DATA_DIR_ENV).map(PathBuf::from).map_err(|_| {
        AppError::config(format!(
            "No catalog directory: pass --data-dir, set data.dir, or export {DATA_DIR_ENV}."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitMode, ModelKind};
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
            [selection]
            radius_deg = 3.0

            [fit]
            hypotheses = ["pl", "lp"]
            mode = "joint"
            "#,
        )
        .unwrap();
        assert_eq!(config.selection.radius_deg, 3.0);
        assert_eq!(config.fit.hypotheses, vec![ModelKind::PowerLaw, ModelKind::LogParabola]);
        assert_eq!(config.fit.mode, FitMode::Joint);
        assert_eq!(config.flux_points, AnalysisConfig::default().flux_points);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_config_errors() {
        assert!(matches!(parse_config("[selection]\nradius = 3.0\n"), Err(AppError::Config(_))));
        assert!(matches!(
            parse_config("[fit]\nhypotheses = []\n"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn load_config_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[data]\ndir = \"/tmp/catalog\"").unwrap();
        let config = load_config(file.path()).unwrap();
        let dir = resolve_data_dir(None, &config).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/catalog"));
        let cli = resolve_data_dir(Some(Path::new("/elsewhere")), &config).unwrap();
        assert_eq!(cli, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_config(Path::new("/definitely/not/here.toml")),
            Err(AppError::Io(_))
        ));
    }
}
