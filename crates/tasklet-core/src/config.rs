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

use crate::controller::DEFAULT_DELETE_DELAY;

/// Settings read from a taskletrc file and `rc.<key>=<value>` overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// `data.location`, before `~` expansion.
  pub data_location: PathBuf,
  /// `color`
  pub color: bool,
  /// `delete.delay`, given in milliseconds.
  pub delete_delay: Duration,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location: PathBuf::from(
        "~/.tasklet"
      ),
      color: true,
      delete_delay:
        DEFAULT_DELETE_DELAY,
      loaded_files: vec![]
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Setting {
  DataLocation,
  Color,
  DeleteDelay
}

impl Setting {
  fn from_key(
    key: &str
  ) -> Option<Self> {
    match key {
      "data.location" => {
        Some(Setting::DataLocation)
      }
      "color" => Some(Setting::Color),
      "delete.delay" => {
        Some(Setting::DeleteDelay)
      }
      _ => None
    }
  }
}

/// One meaningful line of a taskletrc.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Assign(&'a str, &'a str)
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      Some(path) => {
        info!(rc = %path.display(), "loading taskletrc");
        cfg.read_rc(&path)?;
      }
      None => {
        debug!(
          "no taskletrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Applies `rc.`-prefixed (or
  /// bare) key/value pairs on top of
  /// what the rc file set.
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
      let key =
        k.strip_prefix("rc.").unwrap_or(&k);
      debug!(key, value = %v, "applying override");
      self.set(key, &v).with_context(
        || format!("invalid override rc.{key}")
      )?;
    }
    Ok(())
  }

  fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let Some(setting) =
      Setting::from_key(key)
    else {
      warn!(key, "unknown config key; ignoring");
      return Ok(());
    };

    match setting {
      Setting::DataLocation => {
        if value.is_empty() {
          return Err(anyhow!(
            "data.location cannot be \
             empty"
          ));
        }
        self.data_location =
          PathBuf::from(value);
      }
      Setting::Color => {
        self.color = parse_bool(value)?;
      }
      Setting::DeleteDelay => {
        let millis = value
          .parse::<u64>()
          .with_context(|| {
            format!(
              "delete.delay must be a \
               whole number of \
               milliseconds, got \
               {value}"
            )
          })?;
        self.delete_delay =
          Duration::from_millis(millis);
      }
    }
    trace!(key, value, "config key set");
    Ok(())
  }

  #[tracing::instrument(skip(self))]
  fn read_rc(
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
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };
      match parse_rc_line(raw_line)
        .with_context(at)?
      {
        None => {}
        Some(RcLine::Include(
          include
        )) => {
          let target = base_dir
            .join(expand_tilde(
              Path::new(include)
            ));
          if target.exists() {
            self.read_rc(&target)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
        Some(RcLine::Assign(
          key,
          value
        )) => {
          self
            .set(key, value)
            .with_context(at)?;
        }
      }
    }

    Ok(())
  }
}

/// Strips a `#` comment and
/// classifies what is left. Blank
/// lines yield `None`.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(include) =
    line.strip_prefix("include ")
  {
    let include = include.trim();
    if include.is_empty() {
      return Err(anyhow!(
        "include path cannot be empty"
      ));
    }
    return Ok(Some(RcLine::Include(
      include
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected key = value, got: \
         {raw}"
      )
    })?;
  Ok(Some(RcLine::Assign(
    key.trim(),
    value.trim()
  )))
}

/// The `--data` flag wins over
/// `data.location`. The directory is
/// created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    Some(path) => path.to_path_buf(),
    None => {
      expand_tilde(&cfg.data_location)
    }
  };
  if dir.starts_with("~") {
    return Err(anyhow!(
      "cannot determine home \
       directory for {}",
      dir.display()
    ));
  }

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

/// `--taskletrc`, then `TASKLETRC`
/// (`/dev/null` disables it), then
/// `~/.taskletrc` when present.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var("TASKLETRC")
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping taskletrc"
    );
    return None;
  };
  Some(home.join(".taskletrc"))
    .filter(|candidate| {
      candidate.exists()
    })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  if let Ok(rest) =
    path.strip_prefix("~")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

/// The single boolean syntax for
/// every on/off setting.
pub fn parse_bool(
  value: &str
) -> anyhow::Result<bool> {
  match value
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    "1" | "y" | "yes" | "on" | "true" => {
      Ok(true)
    }
    "0" | "n" | "no" | "off" | "false" => {
      Ok(false)
    }
    other => Err(anyhow!(
      "expected on or off, got \
       {other}"
    ))
  }
}
