//! `config`
//!
//! Runtime configuration, read from the environment.

use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::TOOL_NAME;

/// Address the server listens on when none is configured.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:2121";

/// Environment variables naming the drawing tool command, in priority order.
const TOOL_COMMAND_VARS: [&str; 2] = ["PLOTTERSTUDIO_NEXTDRAW", "NEXTDRAW_CLI"];
/// Environment variables naming the default plotter model, in priority order.
const MODEL_VARS: [&str; 2] = ["PLOTTERSTUDIO_MODEL", "PLOTTERSTUDIO_MODEL_NAME"];

/// Where things live and which external programs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The drawing tool program followed by any fixed arguments.
    pub tool_command: Vec<String>,
    /// The page centering utility, `None` to skip centering.
    pub centering_command: Option<String>,
    /// Base directory for the studio's files.
    pub home_dir: PathBuf,
    /// Directory holding uploaded designs.
    pub data_dir: PathBuf,
    /// Log commands instead of running them.
    pub offline: bool,
    /// Plotter model used when neither the request nor the current job names one.
    pub default_model: Option<String>,
    /// Address the server listens on.
    pub listen_address: String,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = default_home_dir();
        Config {
            tool_command: vec![TOOL_NAME.to_string()],
            centering_command: Some("vpype".to_string()),
            data_dir: home_dir.join("uploads"),
            home_dir,
            offline: false,
            default_model: None,
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `PLOTTERSTUDIO_NEXTDRAW` (or `NEXTDRAW_CLI`) | drawing tool command |
    /// | `PLOTTERSTUDIO_HOME` | base directory, default `~/plotter-studio` |
    /// | `PLOTTERSTUDIO_DATA_DIR` | uploads, default `<home>/uploads` |
    /// | `PLOTTERSTUDIO_OFFLINE` | `1`/`true`/`yes`/`on` to log commands only |
    /// | `PLOTTERSTUDIO_MODEL` (or `PLOTTERSTUDIO_MODEL_NAME`) | default plotter model |
    /// | `PLOTTERSTUDIO_VPYPE` | page centering utility, empty to disable |
    /// | `PLOTTERSTUDIO_ADDR` | listen address |
    pub fn from_env() -> Self {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
        };

        let home_dir = lookup("PLOTTERSTUDIO_HOME")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(default_home_dir, |value| expand_home(&value));
        let data_dir = lookup("PLOTTERSTUDIO_DATA_DIR")
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| home_dir.join("uploads"), |value| expand_home(&value));

        let tool_command = first(&TOOL_COMMAND_VARS).map_or_else(
            || installed_tool(&home_dir),
            |value| split_command(&expand_home(&value).to_string_lossy()),
        );

        let centering_command = match lookup("PLOTTERSTUDIO_VPYPE") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_string()),
            None => Some("vpype".to_string()),
        };

        Config {
            tool_command,
            centering_command,
            home_dir,
            data_dir,
            offline: lookup("PLOTTERSTUDIO_OFFLINE").is_some_and(|value| is_truthy(&value)),
            default_model: first(&MODEL_VARS),
            listen_address: lookup("PLOTTERSTUDIO_ADDR")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
        }
    }

    /// The listen address, falling back to the default if the configured one is invalid.
    pub fn socket_address(&self) -> SocketAddr {
        self.listen_address.parse().unwrap_or_else(|_| {
            log::warn!(
                "Invalid listen address '{}', using {DEFAULT_LISTEN_ADDRESS}",
                self.listen_address
            );
            SocketAddr::from(([0, 0, 0, 0], 2121))
        })
    }
}

/// `~/plotter-studio`, or `./plotter-studio` if there is no home directory.
fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plotter-studio")
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(value: &str) -> PathBuf {
    let value = value.trim();
    match (value.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(value),
    }
}

/// The tool installed in the studio's virtualenv, if any, otherwise the tool on `PATH`.
fn installed_tool(home_dir: &Path) -> Vec<String> {
    let candidate = home_dir.join("venv").join("bin").join(TOOL_NAME);
    if candidate.exists() {
        vec![candidate.to_string_lossy().into_owned()]
    } else {
        vec![TOOL_NAME.to_string()]
    }
}

/// Splits a configured command on whitespace.
fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Interprets boolean-ish environment values.
fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("PLOTTERSTUDIO_HOME", "/srv/studio")]);
        assert_eq!(config.home_dir, PathBuf::from("/srv/studio"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/studio/uploads"));
        assert_eq!(config.tool_command, vec!["nextdraw".to_string()]);
        assert_eq!(config.centering_command.as_deref(), Some("vpype"));
        assert!(!config.offline);
        assert_eq!(config.default_model, None);
        assert_eq!(config.listen_address, DEFAULT_LISTEN_ADDRESS);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PLOTTERSTUDIO_HOME", "/srv/studio"),
            ("PLOTTERSTUDIO_DATA_DIR", "/data/svg"),
            ("NEXTDRAW_CLI", "/opt/python/bin/python -m nextdraw"),
            ("PLOTTERSTUDIO_OFFLINE", "Yes"),
            ("PLOTTERSTUDIO_MODEL_NAME", "AxiDraw MiniKit"),
            ("PLOTTERSTUDIO_VPYPE", ""),
            ("PLOTTERSTUDIO_ADDR", "127.0.0.1:9000"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/data/svg"));
        assert_eq!(
            config.tool_command,
            ["/opt/python/bin/python", "-m", "nextdraw"]
        );
        assert!(config.offline);
        assert_eq!(config.default_model.as_deref(), Some("AxiDraw MiniKit"));
        assert_eq!(config.centering_command, None);
        assert_eq!(config.socket_address(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_primary_variable_wins() {
        let config = config_from(&[
            ("PLOTTERSTUDIO_NEXTDRAW", "/usr/local/bin/nextdraw"),
            ("NEXTDRAW_CLI", "/ignored"),
        ]);
        assert_eq!(config.tool_command, ["/usr/local/bin/nextdraw"]);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(" on "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("nope"));
    }
}
