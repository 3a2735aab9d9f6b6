use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Row, Value};

/// Driver key of the built-in in-memory backend.
pub const DEFAULT_DRIVER: &str = "memory";
/// Instance name used for top-level `[search]` settings.
pub const DEFAULT_INSTANCE: &str = "default";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_in(Path::new("."))
    }

    /// Like [`Config::load`], reading the TOML files from `dir`.
    pub fn load_in(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[search]` section; empty settings when the section is absent.
    pub fn search_settings(&self) -> anyhow::Result<SearchSettings> {
        if !self.figment.contains("search") {
            return Ok(SearchSettings::default());
        }
        let section: Row = self.get("search")?;
        Ok(SearchSettings::from_row(&section))
    }
}

/// One backend connection as configured.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    pub driver: String,
    /// Share of the hash ring. Values `<= 0` count as 1 when the module opens.
    pub weight: i64,
    /// Prepended to index names sent to this instance.
    pub prefix: String,
    /// Carried for backends; the in-memory driver ignores it.
    pub timeout: Duration,
    pub setting: Row,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            weight: 1,
            prefix: String::new(),
            timeout: Duration::ZERO,
            setting: Row::new(),
        }
    }
}

impl InstanceConfig {
    /// Reads `{driver, weight, prefix, timeout, setting}`. Missing keys keep
    /// their zero value so the module can fill defaults at open.
    pub fn from_row(row: &Row) -> Self {
        Self {
            driver: row.get("driver").and_then(Value::as_str).unwrap_or_default().to_string(),
            weight: row.get("weight").and_then(Value::as_i64).unwrap_or(0),
            prefix: row.get("prefix").and_then(Value::as_str).unwrap_or_default().to_string(),
            timeout: row.get("timeout").map(parse_timeout).unwrap_or_default(),
            setting: row.get("setting").and_then(Value::as_map).cloned().unwrap_or_default(),
        }
    }

    fn is_blank(&self) -> bool {
        self.driver.is_empty()
            && self.weight == 0
            && self.prefix.is_empty()
            && self.timeout.is_zero()
            && self.setting.is_empty()
    }
}

/// Parsed `[search]` section: top-level keys describe the default instance,
/// every table-valued key is a named instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSettings {
    pub instances: BTreeMap<String, InstanceConfig>,
}

const INSTANCE_KEYS: [&str; 5] = ["driver", "weight", "prefix", "timeout", "setting"];

impl SearchSettings {
    pub fn from_row(section: &Row) -> Self {
        let mut instances = BTreeMap::new();
        let defaults = InstanceConfig::from_row(section);
        if !defaults.is_blank() {
            instances.insert(DEFAULT_INSTANCE.to_string(), defaults);
        }
        for (name, value) in section {
            if INSTANCE_KEYS.contains(&name.as_str()) {
                continue;
            }
            if let Value::Map(one) = value {
                instances.insert(name.clone(), InstanceConfig::from_row(one));
            }
        }
        Self { instances }
    }
}

/// Integer or float seconds, or a duration string such as `"1m30s"`.
/// Anything else is zero.
pub fn parse_timeout(v: &Value) -> Duration {
    match v {
        Value::Int(n) => Duration::from_secs(u64::try_from(*n).unwrap_or(0)),
        Value::Float(f) => Duration::try_from_secs_f64(*f).unwrap_or_default(),
        Value::Str(s) => parse_duration(s).unwrap_or_default(),
        _ => Duration::ZERO,
    }
}

/// Parses a sequence of `<number><unit>` pairs with units `ns`, `us`/`µs`,
/// `ms`, `s`, `m`, `h`. A bare `"0"` is accepted; negative durations are not.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }
    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let amount: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        total += amount * nanos_per_unit;
        rest = &rest[unit_len..];
    }
    Some(Duration::from_nanos(total.round() as u64))
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from_json;
    use serde_json::json;

    #[test]
    fn duration_strings() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("5 parsecs"), None);
    }

    #[test]
    fn timeout_accepts_numbers_and_strings() {
        assert_eq!(parse_timeout(&Value::from(3)), Duration::from_secs(3));
        assert_eq!(parse_timeout(&Value::from(0.5)), Duration::from_millis(500));
        assert_eq!(parse_timeout(&Value::from("2s")), Duration::from_secs(2));
        assert_eq!(parse_timeout(&Value::from("soon")), Duration::ZERO);
        assert_eq!(parse_timeout(&Value::from(-1)), Duration::ZERO);
    }

    #[test]
    fn settings_split_default_and_named_instances() {
        let section = row_from_json(json!({
            "driver": "memory",
            "timeout": "5s",
            "replica": {"driver": "memory", "weight": 3, "prefix": "r_"},
            "ignored": 7
        }))
        .expect("object");
        let settings = SearchSettings::from_row(&section);
        assert_eq!(settings.instances.len(), 2);
        let default = &settings.instances[DEFAULT_INSTANCE];
        assert_eq!(default.timeout, Duration::from_secs(5));
        assert_eq!(default.weight, 0);
        let replica = &settings.instances["replica"];
        assert_eq!(replica.weight, 3);
        assert_eq!(replica.prefix, "r_");
    }

    #[test]
    fn blank_top_level_adds_no_default_instance() {
        let section = row_from_json(json!({"a": {"weight": 2}})).expect("object");
        let settings = SearchSettings::from_row(&section);
        assert_eq!(settings.instances.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(settings.instances["a"].driver, "");
    }
}
