//! Command templates and per-request overrides.
//!
//! A route is bound to a [`CommandSpec`] loaded once at startup. Callers may send a
//! [`RequestParam`] to extend or override parts of it; only fields named in the
//! spec's allow-list are accepted. [`authorize`] enforces that and [`merge`] builds
//! the [`EffectiveCommand`] that is actually run.

use serde::Deserialize;
use std::fmt;

/// Request field that a route may allow callers to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Args,
    Envs,
    Stdin,
    Dir,
    Callback,
}

impl Field {
    /// Order in which request fields are checked; the first disallowed one is reported.
    pub const CHECK_ORDER: [Field; 5] = [
        Field::Args,
        Field::Envs,
        Field::Stdin,
        Field::Dir,
        Field::Callback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Args => "args",
            Field::Envs => "envs",
            Field::Stdin => "stdin",
            Field::Dir => "dir",
            Field::Callback => "callback",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command template bound to one route path. Immutable once the route table is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    /// Program to run (looked up on PATH when not a path).
    pub command: String,
    /// Default arguments; request args are appended after these.
    #[serde(default)]
    pub args: Vec<String>,
    /// Default environment as `KEY=VAL` entries. This is the whole environment of the child.
    #[serde(default)]
    pub envs: Vec<String>,
    /// Default working directory; empty means the gateway's own.
    #[serde(default)]
    pub dir: String,
    /// Default standard input; empty means no input.
    #[serde(default)]
    pub stdin: String,
    /// Request fields callers may supply for this route.
    #[serde(default)]
    pub allow: Vec<Field>,
}

impl CommandSpec {
    pub fn is_allowed(&self, field: Field) -> bool {
        self.allow.contains(&field)
    }
}

/// Optional overrides sent as the JSON request body. Absent, `null` and empty values are all equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestParam {
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub envs: Option<Vec<String>>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
}

impl RequestParam {
    /// Parse a request body. An empty (or whitespace-only) body and a JSON `null` yield the empty param.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let param: Option<Self> = serde_json::from_slice(body)?;
        Ok(param.unwrap_or_default())
    }

    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or(&[])
    }

    pub fn envs(&self) -> &[String] {
        self.envs.as_deref().unwrap_or(&[])
    }

    pub fn stdin(&self) -> &str {
        self.stdin.as_deref().unwrap_or("")
    }

    pub fn dir(&self) -> &str {
        self.dir.as_deref().unwrap_or("")
    }

    /// Callback URL when one was supplied (non-empty).
    pub fn callback(&self) -> Option<&str> {
        self.callback.as_deref().filter(|s| !s.is_empty())
    }

    /// True if the request supplies a non-empty value for `field`.
    pub fn supplies(&self, field: Field) -> bool {
        match field {
            Field::Args => !self.args().is_empty(),
            Field::Envs => !self.envs().is_empty(),
            Field::Stdin => !self.stdin().is_empty(),
            Field::Dir => !self.dir().is_empty(),
            Field::Callback => self.callback().is_some(),
        }
    }
}

/// Check request overrides against the route's allow-list.
/// Returns the first field (in [`Field::CHECK_ORDER`]) that is supplied but not allowed.
pub fn authorize(spec: &CommandSpec, param: &RequestParam) -> Result<(), Field> {
    match Field::CHECK_ORDER
        .into_iter()
        .find(|&f| param.supplies(f) && !spec.is_allowed(f))
    {
        Some(field) => Err(field),
        None => Ok(()),
    }
}

/// Execution-ready command for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveCommand {
    pub command: String,
    pub args: Vec<String>,
    pub envs: Vec<String>,
    pub dir: String,
    pub stdin: String,
}

/// Combine spec defaults with request overrides. Args and envs are appended after the
/// spec's; dir and stdin are replaced only by non-empty request values.
/// Callers must [`authorize`] first.
pub fn merge(spec: &CommandSpec, param: &RequestParam) -> EffectiveCommand {
    let pick = |req: &str, default: &str| {
        if req.is_empty() {
            default.to_string()
        } else {
            req.to_string()
        }
    };
    EffectiveCommand {
        command: spec.command.clone(),
        args: spec.args.iter().chain(param.args()).cloned().collect(),
        envs: spec.envs.iter().chain(param.envs()).cloned().collect(),
        dir: pick(param.dir(), &spec.dir),
        stdin: pick(param.stdin(), &spec.stdin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(allow: Vec<Field>) -> CommandSpec {
        CommandSpec {
            command: "echo".to_string(),
            args: vec!["hello".to_string()],
            envs: vec!["FOO=BAR".to_string()],
            dir: "/tmp".to_string(),
            stdin: "default".to_string(),
            allow,
        }
    }

    #[test]
    fn empty_body_is_empty_param() {
        assert_eq!(RequestParam::from_body(b"").unwrap(), RequestParam::default());
        assert_eq!(RequestParam::from_body(b" \n").unwrap(), RequestParam::default());
        assert_eq!(RequestParam::from_body(b"null").unwrap(), RequestParam::default());
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(RequestParam::from_body(b"{x}").is_err());
        assert!(RequestParam::from_body(br#"{"args": "not-a-list"}"#).is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let p = RequestParam::from_body(br#"{"args": ["a"], "extra": 1}"#).unwrap();
        assert_eq!(p.args(), ["a".to_string()]);
    }

    #[test]
    fn empty_values_do_not_need_permission() {
        let p = RequestParam::from_body(br#"{"args": [], "stdin": "", "dir": null}"#).unwrap();
        assert_eq!(authorize(&spec(vec![]), &p), Ok(()));
    }

    #[test]
    fn first_disallowed_field_wins() {
        let p = RequestParam {
            envs: Some(vec!["A=B".into()]),
            dir: Some("/".into()),
            callback: Some("http://example.invalid/".into()),
            ..Default::default()
        };
        assert_eq!(authorize(&spec(vec![]), &p), Err(Field::Envs));
        assert_eq!(authorize(&spec(vec![Field::Envs]), &p), Err(Field::Dir));
        assert_eq!(
            authorize(&spec(vec![Field::Envs, Field::Dir]), &p),
            Err(Field::Callback)
        );
        assert_eq!(
            authorize(&spec(vec![Field::Envs, Field::Dir, Field::Callback]), &p),
            Ok(())
        );
    }

    #[test]
    fn merge_appends_args_and_envs() {
        let p = RequestParam {
            args: Some(vec!["world".into()]),
            envs: Some(vec!["BAR=BAZ".into()]),
            ..Default::default()
        };
        let cmd = merge(&spec(vec![Field::Args, Field::Envs]), &p);
        assert_eq!(cmd.command, "echo");
        assert_eq!(cmd.args, vec!["hello", "world"]);
        assert_eq!(cmd.envs, vec!["FOO=BAR", "BAR=BAZ"]);
        assert_eq!(cmd.dir, "/tmp");
        assert_eq!(cmd.stdin, "default");
    }

    #[test]
    fn merge_replaces_dir_and_stdin_only_when_non_empty() {
        let s = spec(vec![Field::Dir, Field::Stdin]);
        let p = RequestParam {
            dir: Some("/var".into()),
            stdin: Some(String::new()),
            ..Default::default()
        };
        let cmd = merge(&s, &p);
        assert_eq!(cmd.dir, "/var");
        assert_eq!(cmd.stdin, "default");
    }

    #[test]
    fn allow_list_parses_from_yaml_names() {
        let s: CommandSpec =
            serde_yaml::from_str("command: ls\nallow: [args, callback]\n").unwrap();
        assert!(s.is_allowed(Field::Args));
        assert!(s.is_allowed(Field::Callback));
        assert!(!s.is_allowed(Field::Dir));
        assert!(serde_yaml::from_str::<CommandSpec>("command: ls\nallow: [shell]\n").is_err());
    }
}
