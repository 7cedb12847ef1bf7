use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::access::Role;

const CONFIG_FILE: &str =
  "followup.toml";
const CONFIG_ENV_VAR: &str =
  "FOLLOWUP_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "FOLLOWUP_TIMEZONE";
const DEFAULT_DATA_DIR: &str =
  ".followup";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub data:         DataSection,
  pub timezone:     Option<String>,
  pub color:        bool,
  pub access:       AccessSection,
  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

#[derive(
  Debug, Clone, Default, Deserialize,
)]
#[serde(default)]
pub struct DataSection {
  pub location: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessSection {
  pub roles: Vec<Role>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data:         DataSection::default(),
      timezone:     None,
      color:        true,
      access:       AccessSection::default(),
      loaded_files: vec![]
    }
  }
}

impl Default for AccessSection {
  fn default() -> Self {
    Self {
      roles: vec![Role::Admin]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let explicit =
      config_override.is_some();
    let Some(path) = resolve_config_path(
      config_override
    ) else {
      warn!(
        "no config location; using \
         defaults"
      );
      return Ok(Self::default());
    };

    if !path.exists() {
      if explicit {
        return Err(anyhow!(
          "config file does not \
           exist: {}",
          path.display()
        ));
      }
      info!(
        file = %path.display(),
        "config file not found; using defaults"
      );
      return Ok(Self::default());
    }

    let raw = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let mut cfg =
      Self::from_toml_str(&raw)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    info!(file = %path.display(), "loaded config");
    cfg.loaded_files.push(path);
    Ok(cfg)
  }

  pub fn from_toml_str(
    raw: &str
  ) -> anyhow::Result<Self> {
    toml::from_str::<Self>(raw)
      .context("invalid followup config")
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .trim()
        .to_string();
      let value = v.trim().to_string();
      debug!(key = %key, value = %value, "applying override");

      match key.as_str() {
        | "data.location" => {
          self.data.location =
            Some(value);
        }
        | "timezone" => {
          self.timezone = Some(value);
        }
        | "color" => {
          self.color = parse_bool(&value);
        }
        | "access.roles" => {
          self.access.roles = value
            .split(',')
            .map(str::trim)
            .filter(|role| {
              !role.is_empty()
            })
            .map(str::parse::<Role>)
            .collect::<anyhow::Result<
              Vec<_>
            >>()
            .with_context(|| {
              format!(
                "invalid override \
                 {key}={value}"
              )
            })?;
        }
        | other => {
          warn!(
            key = other,
            "ignoring unknown config override"
          );
        }
      }
    }
    Ok(())
  }

  /// `FOLLOWUP_TIMEZONE` wins over the
  /// config file; UTC is the fallback.
  pub fn resolve_timezone(&self) -> Tz {
    let env =
      std::env::var(TIMEZONE_ENV_VAR)
        .ok();
    pick_timezone(
      env.as_deref(),
      self.timezone.as_deref()
    )
  }
}

pub fn pick_timezone(
  env: Option<&str>,
  configured: Option<&str>
) -> Tz {
  if let Some(raw) = env
    && let Some(tz) =
      parse_timezone(raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, CONFIG_FILE)
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      info!(
        source,
        timezone = %trimmed,
        "configured viewer timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.data.location.as_deref()
  {
    expand_tilde(Path::new(cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_tilde(path));
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(expand_tilde(
        Path::new(trimmed)
      ));
    }
  }

  dirs::config_dir().map(|dir| {
    dir.join("followup").join(CONFIG_FILE)
  })
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(DEFAULT_DATA_DIR))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn parses_sections_and_defaults() {
    let cfg = Config::from_toml_str(
      r#"
        timezone = "America/Mexico_City"

        [data]
        location = "/srv/followup"

        [access]
        roles = ["staff"]
      "#
    )
    .expect("parse config");

    assert_eq!(
      cfg.data.location.as_deref(),
      Some("/srv/followup")
    );
    assert!(cfg.color);
    assert_eq!(
      cfg.access.roles,
      vec![Role::Staff]
    );

    let empty = Config::from_toml_str("")
      .expect("empty config");
    assert_eq!(
      empty.access.roles,
      vec![Role::Admin]
    );
  }

  #[test]
  fn overrides_replace_known_keys() {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![
        (
          "rc.color".to_string(),
          "off".to_string()
        ),
        (
          "access.roles".to_string(),
          "admin, staff".to_string()
        ),
        (
          "unknown.key".to_string(),
          "1".to_string()
        ),
      ])
      .expect("apply overrides");

    assert!(!cfg.color);
    assert_eq!(
      cfg.access.roles,
      vec![Role::Admin, Role::Staff]
    );

    let bad = cfg.apply_overrides(vec![(
      "access.roles".to_string(),
      "owner".to_string()
    )]);
    assert!(bad.is_err());
  }

  #[test]
  fn timezone_prefers_env_then_config() {
    assert_eq!(
      pick_timezone(
        Some("Europe/Madrid"),
        Some("America/Mexico_City")
      ),
      chrono_tz::Europe::Madrid
    );
    assert_eq!(
      pick_timezone(
        Some("Not/AZone"),
        Some("America/Mexico_City")
      ),
      chrono_tz::America::Mexico_City
    );
    assert_eq!(
      pick_timezone(None, Some("")),
      chrono_tz::UTC
    );
  }

  #[test]
  fn explicit_missing_config_is_an_error() {
    let temp = tempdir().expect("tempdir");
    let missing =
      temp.path().join("absent.toml");
    assert!(
      Config::load(Some(&missing))
        .is_err()
    );

    let present =
      temp.path().join("followup.toml");
    fs::write(&present, "color = false\n")
      .expect("write config");
    let cfg = Config::load(Some(&present))
      .expect("load config");
    assert!(!cfg.color);
    assert_eq!(
      cfg.loaded_files,
      vec![present]
    );
  }
}
