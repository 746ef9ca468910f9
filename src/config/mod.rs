//! Configuration loading for qmreport

mod schema;

pub use schema::{Config, DEFAULT_FIELD_ORDER, DEFAULT_IGNORE_FIELDS, DEFAULT_TITLE};

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = ".qmreportrc.json";

/// Find and load config file with extends resolution. Searches current directory then parents.
pub fn load_config(work_dir: &Path, custom_path: Option<&Path>) -> Result<Config> {
    let path = if let Some(p) = custom_path {
        let path = if p.is_absolute() {
            p.to_path_buf()
        } else {
            work_dir.join(p)
        };
        if path.exists() {
            Some(path)
        } else {
            anyhow::bail!("Config file not found: {}", path.display());
        }
    } else {
        find_config_in_parents(work_dir)
    };

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            load_config_with_extends(&path, &mut HashSet::new())
        }
        None => Ok(Config::default()),
    }
}

/// Load a config file and resolve extends chain
fn load_config_with_extends(config_path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Config> {
    let canonical = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    if !visited.insert(canonical) {
        anyhow::bail!(
            "Circular extends detected in config: {}",
            config_path.display()
        );
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
    let mut config: Config = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in config: {}", config_path.display()))?;

    if let Some(extends) = config.extends.take() {
        let base_config = resolve_extends(config_path, &extends, visited)?;
        config.merge_from(base_config);
    }

    Ok(config)
}

/// Resolve an extends reference (relative to the referencing file) to a config
fn resolve_extends(
    config_path: &Path,
    extends: &str,
    visited: &mut HashSet<PathBuf>,
) -> Result<Config> {
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let extends_path = config_dir.join(extends);

    let extends_path = if extends_path.extension().is_none() {
        extends_path.with_extension("json")
    } else {
        extends_path
    };

    if !extends_path.exists() {
        anyhow::bail!(
            "Extended config not found: {} (referenced from {})",
            extends_path.display(),
            config_path.display()
        );
    }

    load_config_with_extends(&extends_path, visited)
}

/// Search for .qmreportrc.json in directory and its parents
pub fn find_config_in_parents(mut dir: &Path) -> Option<PathBuf> {
    loop {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Write the default config into `dir`; refuses to overwrite
pub fn write_default_config(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(CONFIG_FILENAME);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let body = serde_json::to_string_pretty(&Config::template())
        .context("Failed to serialize default config")?;
    fs::write(&path, body + "\n")
        .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Scope;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path(), None).unwrap_or_default();
        assert_eq!(config.title(), DEFAULT_TITLE);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.scope(), Scope::NotPassed);
        assert!(config.ignore_fields().contains(&"qmtest.target".to_string()));
    }

    #[test]
    fn test_custom_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = load_config(dir.path(), Some(Path::new("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_found_in_parent_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), r#"{"title":"Nightly"}"#).unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let config = load_config(&nested, None).unwrap();
        assert_eq!(config.title(), "Nightly");
    }

    #[test]
    fn test_config_extends() {
        let dir = TempDir::new().unwrap();

        let base_path = dir.path().join("base.json");
        let mut base_file = fs::File::create(&base_path).unwrap();
        writeln!(
            base_file,
            r#"{{
                "pollInterval": 30,
                "title": "Base",
                "ignoreFields": ["debug.*"],
                "fieldOrder": ["ExecTest.stdout"]
            }}"#
        )
        .unwrap();

        let child_path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &child_path,
            r#"{
                "extends": "./base",
                "title": "Child",
                "ignoreFields": ["qmtest.target"]
            }"#,
        )
        .unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.title(), "Child");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.field_order(), vec!["ExecTest.stdout".to_string()]);
        assert_eq!(
            config.ignore_fields(),
            vec!["debug.*".to_string(), "qmtest.target".to_string()]
        );
    }

    #[test]
    fn test_circular_extends() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"extends":"./b.json"}"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"extends":"./a.json"}"#).unwrap();
        let err = load_config(dir.path(), Some(Path::new("a.json"))).unwrap_err();
        assert!(err.to_string().contains("Circular extends"));
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "{ nope").unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON in config"));
    }

    #[test]
    fn test_merge_with_cli() {
        let config: Config = serde_json::from_str(r#"{"pollInterval":10,"showAll":false}"#).unwrap();
        let merged = config.merge_with_cli(Some(2), true, Some("CLI"));
        assert_eq!(merged.poll_interval(), Duration::from_secs(2));
        assert_eq!(merged.scope(), Scope::All);
        assert_eq!(merged.title(), "CLI");
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = Config::default().merge_with_cli(Some(0), false, None);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_interval_capped() {
        let config: Config = serde_json::from_str(r#"{"pollInterval":18446744073709551615}"#).unwrap();
        assert_eq!(config.poll_interval(), crate::poll::MAX_POLL_INTERVAL);
    }

    #[test]
    fn test_extends_chain_resolved() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("root.json"), r#"{"title":"Root","pollInterval":60}"#).unwrap();
        fs::write(
            dir.path().join("mid.json"),
            r#"{"extends":"./root.json","showAll":true}"#,
        )
        .unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), r#"{"extends":"./mid.json"}"#).unwrap();

        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config.extends, None);
        assert_eq!(config.title(), "Root");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.scope(), Scope::All);
    }

    #[test]
    fn test_tree_options_from_config() {
        let config: Config = serde_json::from_str(r#"{"ignoreFields":["debug.*"]}"#).unwrap();
        let options = config.tree_options().unwrap();
        assert!(options.is_ignored("debug.env"));
        assert!(!options.is_ignored("qmtest.target"));

        let bad: Config = serde_json::from_str(r#"{"ignoreFields":["a["]}"#).unwrap();
        assert!(bad.tree_options().is_err());
    }

    #[test]
    fn test_write_default_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_default_config(dir.path()).unwrap();
        let config = load_config(dir.path(), None).unwrap();
        assert_eq!(config, Config::template());
        assert!(fs::read_to_string(&path).unwrap().contains("\"pollInterval\": 5"));
        assert!(write_default_config(dir.path()).is_err());
    }
}
