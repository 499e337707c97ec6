//! Configuration types and loading.
//!
//! Routes are loaded once from a YAML file (default `./config.yml`, or `CAS_CONFIG_PATH`)
//! mapping each URL path to a [`CommandSpec`]. Server bind/port come from the CLI.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::command::CommandSpec;

pub const DEFAULT_PORT: u16 = 1307;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Top-level gateway config: listener settings and the route table.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub routes: RouteTable,
}

/// Listener bind address and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind.trim(), self.port)
    }
}

/// Immutable path -> command mapping. Lookups are exact on the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<String, CommandSpec>,
}

impl RouteTable {
    /// Build a table, rejecting paths without a leading `/` and entries without a command.
    pub fn new(routes: BTreeMap<String, CommandSpec>) -> Result<Self> {
        for (path, spec) in &routes {
            if !path.starts_with('/') {
                anyhow::bail!("route {:?}: path must start with '/'", path);
            }
            if spec.command.trim().is_empty() {
                anyhow::bail!("route {}: command is empty", path);
            }
        }
        Ok(Self { routes })
    }

    pub fn get(&self, path: &str) -> Option<&CommandSpec> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CommandSpec)> {
        self.routes.iter()
    }
}

/// Parse a YAML route file. An empty document yields an empty table.
pub fn parse_routes(yaml: &str) -> Result<RouteTable> {
    if yaml.trim().is_empty() {
        return Ok(RouteTable::default());
    }
    let routes: Option<BTreeMap<String, CommandSpec>> =
        serde_yaml::from_str(yaml).context("parsing routes")?;
    RouteTable::new(routes.unwrap_or_default())
}

/// Resolve config path from env or default (`./config.yml`).
pub fn default_config_path() -> PathBuf {
    std::env::var("CAS_CONFIG_PATH")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load routes from `path` (or the default path). A missing file is an error.
/// Returns the table and the path that was used.
pub fn load_routes(path: Option<PathBuf>) -> Result<(RouteTable, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        anyhow::bail!(
            "config file not found: {} (run `cas init` to create one)",
            path.display()
        );
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let routes =
        parse_routes(&s).with_context(|| format!("parsing config from {}", path.display()))?;
    log::debug!("loaded {} route(s) from {}", routes.len(), path.display());
    Ok((routes, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Field;

    #[test]
    fn default_server_port_and_bind() {
        let s = ServerConfig::default();
        assert_eq!(s.port, 1307);
        assert_eq!(s.bind_addr(), "0.0.0.0:1307");
    }

    #[test]
    fn parse_full_route() {
        let table = parse_routes(
            r#"
/hello:
  command: echo
  args: [hello]
  envs: ["LANG=C"]
  dir: /tmp
  stdin: input
  allow: [args, callback]
/ls:
  command: ls
"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        let hello = table.get("/hello").unwrap();
        assert_eq!(hello.command, "echo");
        assert_eq!(hello.args, vec!["hello"]);
        assert_eq!(hello.envs, vec!["LANG=C"]);
        assert_eq!(hello.dir, "/tmp");
        assert_eq!(hello.stdin, "input");
        assert_eq!(hello.allow, vec![Field::Args, Field::Callback]);
        let ls = table.get("/ls").unwrap();
        assert!(ls.args.is_empty());
        assert!(ls.allow.is_empty());
        assert!(table.get("/missing").is_none());
    }

    #[test]
    fn empty_document_is_empty_table() {
        assert!(parse_routes("").unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_routes() {
        assert!(parse_routes("hello:\n  command: echo\n").is_err());
        assert!(parse_routes("/hello:\n  command: \"\"\n").is_err());
        assert!(parse_routes("/hello:\n  args: [x]\n").is_err());
        assert!(parse_routes("/hello:\n  command: echo\n  allow: [everything]\n").is_err());
        assert!(parse_routes("/hello:\n  command: echo\n  shell: true\n").is_err());
    }

    #[test]
    fn load_missing_file_fails() {
        let path = std::env::temp_dir().join(format!("cas-missing-{}.yml", uuid::Uuid::new_v4()));
        let err = load_routes(Some(path)).unwrap_err();
        assert!(err.to_string().contains("cas init"));
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("cas-config-{}.yml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "/date:\n  command: date\n").unwrap();
        let (table, used) = load_routes(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(table.get("/date").unwrap().command, "date");
        let _ = std::fs::remove_file(path);
    }
}
