//! Layered application configuration.
//!
//! Sources, later overriding earlier: built-in defaults, the optional TOML
//! file, then `RUCK_`-prefixed environment variables. Nested keys use `__`,
//! e.g. `RUCK_SCORING__VALUE__PER_POINT=4000`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use ruck_core::rules::ScoringConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path: PathBuf,
  pub scoring:    ScoringConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("~/.local/share/ruck/ruck.db"),
      scoring:    ScoringConfig::default(),
    }
  }
}

impl AppConfig {
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix("RUCK")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config from {}", file.display()))?;

    let mut cfg: AppConfig = settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = AppConfig::load(Path::new("/nonexistent/ruck.toml")).unwrap();
    assert_eq!(cfg.scoring, ScoringConfig::default());
    assert!(cfg.store_path.ends_with("ruck.db"));
  }

  #[test]
  fn file_overrides_nested_scoring() {
    let dir = std::env::temp_dir().join(format!("ruck-cfg-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("ruck.toml");
    std::fs::write(
      &file,
      "store_path = \"/tmp/ruck-test.db\"\n[scoring.value]\nper_point = 4000.0\n",
    )
    .unwrap();

    let cfg = AppConfig::load(&file).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/ruck-test.db"));
    assert_eq!(cfg.scoring.value.per_point, 4000.0);
    assert_eq!(cfg.scoring.value.base, 84_000.0);

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn tilde_is_expanded_only_at_start() {
    assert_eq!(expand_tilde(Path::new("/a/~/b")), PathBuf::from("/a/~/b"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    }
  }
}
