use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_SERVICE_URL: &str =
  "http://localhost:3001";
const RC_ENV_VAR: &str = "TALLYRC";
const RC_FILE_NAME: &str = ".tallyrc";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "service.url".to_string(),
      DEFAULT_SERVICE_URL.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "default.path".to_string(),
      "/".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn service_url(&self) -> String {
    self
      .get("service.url")
      .unwrap_or_else(|| {
        DEFAULT_SERVICE_URL.to_string()
      })
  }

  /// `service.timeout` in seconds.
  /// Unset, empty or `0` means no
  /// timeout.
  pub fn service_timeout(
    &self
  ) -> anyhow::Result<Option<Duration>> {
    let Some(raw) =
      self.get("service.timeout")
    else {
      return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
      return Ok(None);
    }
    let secs: u64 =
      raw.parse().with_context(|| {
        format!(
          "invalid service.timeout: \
           {raw}"
        )
      })?;
    Ok(
      (secs > 0)
        .then(|| Duration::from_secs(secs))
    )
  }

  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| "on".to_string());
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => Err(anyhow!(
        "invalid color setting: {other}"
      ))
    }
  }

  pub fn default_path(&self) -> String {
    self
      .get("default.path")
      .filter(|p| !p.trim().is_empty())
      .unwrap_or_else(|| "/".to_string())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::{
    Config,
    DEFAULT_SERVICE_URL
  };

  #[test]
  fn defaults_point_at_local_service() {
    let cfg = Config::default();
    assert_eq!(
      cfg.service_url(),
      DEFAULT_SERVICE_URL
    );
    assert_eq!(cfg.default_path(), "/");
    assert!(
      cfg
        .color_enabled()
        .expect("color")
    );
    assert_eq!(
      cfg
        .service_timeout()
        .expect("timeout"),
      None
    );
  }

  #[test]
  fn loads_file_with_comments_and_includes()
  {
    let dir = tempdir().expect("tempdir");
    fs::write(
      dir.path().join("extra.rc"),
      "service.timeout = 5\n"
    )
    .expect("write include");
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "# tally settings\n\
       service.url = http://example.test:9000 # remote\n\
       include extra.rc\n\
       include missing.rc\n\
       color = off\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(rc.as_path()))
      .expect("load config");
    assert_eq!(
      cfg.service_url(),
      "http://example.test:9000"
    );
    assert_eq!(
      cfg
        .service_timeout()
        .expect("timeout"),
      Some(Duration::from_secs(5))
    );
    assert!(
      !cfg
        .color_enabled()
        .expect("color")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn rejects_lines_without_equals() {
    let dir = tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "service.url\n")
      .expect("write rc");
    assert!(
      Config::load(Some(rc.as_path())).is_err()
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "rc.default.path".to_string(),
        "/lists/2".to_string()
      ),
      (
        "color".to_string(),
        "bogus".to_string()
      ),
    ]);
    assert_eq!(
      cfg.default_path(),
      "/lists/2"
    );
    assert!(cfg.color_enabled().is_err());
  }
}
