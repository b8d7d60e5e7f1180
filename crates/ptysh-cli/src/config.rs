//! Configuration at `~/.ptysh/config.toml`.
//!
//! Provides default session settings. CLI flags always override config
//! file values.

use anyhow::{Context, Result};
use ptysh_core::{PtySize, SpawnOptions, TargetIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
}

/// `[session]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `TERM` for the child; inherited when unset.
    #[serde(default)]
    pub term: Option<String>,

    /// User to run as, by name or numeric uid.
    #[serde(default)]
    pub user: Option<String>,

    /// Program and arguments; empty means the default shell.
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub rows: Option<u16>,

    #[serde(default)]
    pub cols: Option<u16>,
}

/// Session settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub argv: Vec<String>,
    pub user: Option<String>,
    pub term: Option<String>,
    pub rows: Option<u16>,
    pub cols: Option<u16>,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `~/.ptysh/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".ptysh")
            .join("config.toml")
    }

    /// Merge CLI overrides over this config.
    ///
    /// `fallback_size` is used when neither side names both dimensions.
    pub fn spawn_options(&self, cli: Overrides, fallback_size: PtySize) -> SpawnOptions {
        let argv = if cli.argv.is_empty() {
            self.session.command.clone()
        } else {
            cli.argv
        };
        let user = cli
            .user
            .or_else(|| self.session.user.clone())
            .map(|u| TargetIdentity::parse(&u));
        let term = cli.term.or_else(|| self.session.term.clone());
        let size = PtySize {
            rows: cli.rows.or(self.session.rows).unwrap_or(fallback_size.rows),
            cols: cli.cols.or(self.session.cols).unwrap_or(fallback_size.cols),
            ..fallback_size
        };

        SpawnOptions {
            argv,
            term,
            user,
            size: Some(size),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert!(cfg.session.term.is_none());
        assert!(cfg.session.user.is_none());
        assert!(cfg.session.command.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[session]
term = "xterm-256color"
user = "1000"
command = ["/bin/bash", "-l"]
rows = 40
cols = 120
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.session.term.as_deref(), Some("xterm-256color"));
        assert_eq!(cfg.session.command, ["/bin/bash", "-l"]);

        let opts = cfg.spawn_options(Overrides::default(), PtySize::default());
        assert_eq!(opts.user, Some(TargetIdentity::Uid(1000)));
        assert_eq!(opts.argv, ["/bin/bash", "-l"]);
        let size = opts.size.unwrap();
        assert_eq!((size.rows, size.cols), (40, 120));
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: Config = toml::from_str("[session]\nuser = \"nobody\"\n").unwrap();
        assert_eq!(cfg.session.user.as_deref(), Some("nobody"));
        assert!(cfg.session.command.is_empty());
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.session.user.is_none());
    }

    #[test]
    fn cli_overrides_config() {
        let cfg: Config = toml::from_str(
            "[session]\nuser = \"nobody\"\nterm = \"vt100\"\ncommand = [\"/bin/zsh\"]\nrows = 10\n",
        )
        .unwrap();
        let opts = cfg.spawn_options(
            Overrides {
                argv: vec!["/bin/sh".into()],
                user: Some("root".into()),
                term: None,
                rows: None,
                cols: Some(99),
            },
            PtySize::default(),
        );
        assert_eq!(opts.argv, ["/bin/sh"]);
        assert_eq!(opts.user, Some(TargetIdentity::Name("root".into())));
        assert_eq!(opts.term.as_deref(), Some("vt100"));
        let size = opts.size.unwrap();
        assert_eq!((size.rows, size.cols), (10, 99));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.session.command.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tilde("/etc/ptysh.toml"), PathBuf::from("/etc/ptysh.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x.toml"), home.join("x.toml"));
        }
    }
}
