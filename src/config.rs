//! Configuration of the bridge: a toml file, overlaid with `BAMBULAB_*`
//! environment variables.

use std::{collections::BTreeMap, path::Path, time::Duration};

use parse_display::{Display, FromStr};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::ConnectTiming;

const ENV_PRINTERS: &str = "BAMBULAB_PRINTERS";
const ENV_SERIALS: &str = "BAMBULAB_SERIALS";
const ENV_LAN_KEYS: &str = "BAMBULAB_LAN_KEYS";
const ENV_TYPES: &str = "BAMBULAB_TYPES";
const ENV_REGION: &str = "BAMBULAB_REGION";
const ENV_AUTOCONNECT: &str = "BAMBULAB_AUTOCONNECT";
const ENV_CONNECT_INTERVAL: &str = "BAMBULAB_CONNECT_INTERVAL";
const ENV_CONNECT_TIMEOUT: &str = "BAMBULAB_CONNECT_TIMEOUT";
const ENV_API_KEY: &str = "BAMBULAB_API_KEY";
const ENV_ALLOW_ORIGINS: &str = "BAMBULAB_ALLOW_ORIGINS";

const DEFAULT_CONNECT_INTERVAL: f64 = 0.1;
const DEFAULT_CONNECT_TIMEOUT: f64 = 5.0;
const DEFAULT_REGION: &str = "US";
const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost", "http://127.0.0.1"];

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The same key appears twice in one environment variable.
    #[error("Duplicate {env} entry for '{key}'")]
    Duplicate {
        /// The variable.
        env: &'static str,
        /// The repeated key.
        key: String,
    },

    /// A printer is named in one variable but missing from another.
    #[error("Printer configuration incomplete: {}", .0.join("; "))]
    Incomplete(Vec<String>),

    /// A printer type we don't know.
    #[error("Unknown printer type '{value}' for '{name}'")]
    UnknownVariant {
        /// The printer.
        name: String,
        /// The rejected type.
        value: String,
    },

    /// The config file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The config file is not valid toml for this schema.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// The configuration of the application.
#[derive(Default, Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server-wide settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// The printers to bridge.
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
}

/// Server-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Connect every printer at startup instead of on first request.
    pub autoconnect: bool,

    /// Seconds between readiness polls while connecting.
    pub connect_interval: f64,

    /// Seconds to wait for a printer to report ready.
    pub connect_timeout: f64,

    /// Shared secret expected in the `X-API-Key` header. Unset disables
    /// the check.
    pub api_key: Option<String>,

    /// Origins allowed to call the API from a browser.
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            autoconnect: false,
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            api_key: None,
            allow_origins: vec![],
        }
    }
}

impl ServerConfig {
    /// Poll interval and deadline for connecting. Non-positive values fall
    /// back to the defaults.
    pub fn timing(&self) -> ConnectTiming {
        ConnectTiming {
            poll_interval: Duration::from_secs_f64(positive_or(
                "connect_interval",
                self.connect_interval,
                DEFAULT_CONNECT_INTERVAL,
            )),
            timeout: Duration::from_secs_f64(positive_or(
                "connect_timeout",
                self.connect_timeout,
                DEFAULT_CONNECT_TIMEOUT,
            )),
        }
    }

    /// The configured origins that are well formed, deduplicated in order,
    /// or the local defaults when none are.
    pub fn origins(&self) -> Vec<String> {
        valid_origins(&self.allow_origins)
    }
}

fn positive_or(field: &str, value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::error!(field, value, default, "connect timing must be positive; using default");
        default
    }
}

/// Which client implementation drives a printer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, Display, FromStr)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum Backend {
    /// A Bambu Lab printer in LAN mode.
    #[default]
    Bambu,

    /// A printer that accepts everything and does nothing.
    Noop,
}

/// Bambu Lab printer models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema, Display, FromStr)]
pub enum BambuVariant {
    /// X1 Carbon.
    #[default]
    #[serde(rename = "X1C")]
    #[display("X1C")]
    X1Carbon,
    /// X1E.
    X1E,
    /// X1.
    X1,
    /// P1P.
    P1P,
    /// P1S.
    P1S,
    /// A1.
    A1,
    /// A1 mini.
    #[serde(rename = "A1MINI")]
    #[display("A1MINI")]
    A1Mini,
}

impl BambuVariant {
    /// Parse a model name as written in `BAMBULAB_TYPES`, ignoring case.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().to_ascii_uppercase().replace(['-', ' '], "").parse().ok()
    }

    /// Whether the printer serves the TLS JPEG camera on port 6000. The X1
    /// family streams RTSPS instead.
    pub fn has_jpeg_camera(&self) -> bool {
        matches!(self, Self::P1P | Self::P1S | Self::A1 | Self::A1Mini)
    }
}

/// Identity and connection parameters for one printer. Immutable after
/// load.
#[derive(Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    /// Unique, case-sensitive name used in API paths.
    pub name: String,

    /// Hostname or IP address on the LAN.
    pub host: String,

    /// Serial number.
    #[serde(default)]
    pub serial: String,

    /// LAN access code shown on the printer's screen.
    #[serde(default)]
    pub access_code: String,

    /// Printer model.
    #[serde(default)]
    pub variant: BambuVariant,

    /// Region hint.
    #[serde(default = "default_region")]
    pub region: String,

    /// Client implementation.
    #[serde(default)]
    pub backend: Backend,
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

impl PrinterConfig {
    /// A printer driven by the no-op backend.
    pub fn noop(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            host: "localhost".to_owned(),
            serial: String::new(),
            access_code: String::new(),
            variant: BambuVariant::default(),
            region: default_region(),
            backend: Backend::Noop,
        }
    }
}

impl std::fmt::Debug for PrinterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("serial", &self.serial)
            .field("access_code", &"<redacted>")
            .field("variant", &self.variant)
            .field("region", &self.region)
            .field("backend", &self.backend)
            .finish()
    }
}

impl Config {
    /// Parse a configuration from a toml file.
    pub fn from_file(file: &Path) -> Result<Self, Error> {
        let config = std::fs::read_to_string(file)?;
        Self::from_str(&config)
    }

    /// Parse a configuration from a toml string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(config: &str) -> Result<Self, Error> {
        Ok(toml::from_str(config)?)
    }

    /// Overlay `BAMBULAB_*` variables, read through `env`. Printers from the
    /// environment are appended after the ones from the file.
    pub fn apply_env<F>(&mut self, env: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| env(key).unwrap_or_default();

        self.printers.extend(printers_from_env(
            &read(ENV_PRINTERS),
            &read(ENV_SERIALS),
            &read(ENV_LAN_KEYS),
            &read(ENV_TYPES),
            env(ENV_REGION).as_deref().unwrap_or(DEFAULT_REGION),
        )?);

        if let Some(raw) = env(ENV_AUTOCONNECT) {
            self.server.autoconnect = is_truthy(&raw);
        }
        if let Some(raw) = env(ENV_CONNECT_INTERVAL) {
            self.server.connect_interval = parse_seconds(ENV_CONNECT_INTERVAL, &raw, DEFAULT_CONNECT_INTERVAL);
        }
        if let Some(raw) = env(ENV_CONNECT_TIMEOUT) {
            self.server.connect_timeout = parse_seconds(ENV_CONNECT_TIMEOUT, &raw, DEFAULT_CONNECT_TIMEOUT);
        }
        if let Some(key) = env(ENV_API_KEY).filter(|key| !key.is_empty()) {
            self.server.api_key = Some(key);
        }
        if let Some(raw) = env(ENV_ALLOW_ORIGINS) {
            self.server.allow_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect();
        }

        Ok(())
    }
}

/// Build printers from the four identity variables. Every name must appear
/// in the printers, serials and access codes; a missing type defaults to
/// X1C.
pub fn printers_from_env(
    printers: &str,
    serials: &str,
    lan_keys: &str,
    types: &str,
    region: &str,
) -> Result<Vec<PrinterConfig>, Error> {
    let hosts = parse_pairs(ENV_PRINTERS, printers)?;
    let serials = parse_kv(ENV_SERIALS, serials)?;
    let lan_keys = parse_kv(ENV_LAN_KEYS, lan_keys)?;
    let types = parse_kv(ENV_TYPES, types)?;

    let mut names: Vec<&String> = hosts.keys().chain(serials.keys()).chain(lan_keys.keys()).chain(types.keys()).collect();
    names.sort();
    names.dedup();

    let mut missing = vec![];
    for name in &names {
        for (env, set) in [(ENV_PRINTERS, &hosts), (ENV_SERIALS, &serials), (ENV_LAN_KEYS, &lan_keys)] {
            if !set.contains_key(*name) {
                tracing::error!(printer = name.as_str(), "missing {} entry", env);
                missing.push(format!("Missing {} for {}", env, name));
            }
        }
    }
    if !missing.is_empty() {
        return Err(Error::Incomplete(missing));
    }

    names
        .into_iter()
        .map(|name| {
            let variant = match types.get(name) {
                Some(raw) => BambuVariant::parse(raw).ok_or_else(|| Error::UnknownVariant {
                    name: name.clone(),
                    value: raw.clone(),
                })?,
                None => {
                    tracing::warn!(printer = name.as_str(), "missing {}; defaulting to X1C", ENV_TYPES);
                    BambuVariant::default()
                }
            };

            Ok(PrinterConfig {
                name: name.clone(),
                host: hosts[name].clone(),
                serial: serials[name].clone(),
                access_code: lan_keys[name].clone(),
                variant,
                region: region.to_owned(),
                backend: Backend::Bambu,
            })
        })
        .collect()
}

/// Parse `name@host;other@host2`.
pub fn parse_pairs(env: &'static str, raw: &str) -> Result<BTreeMap<String, String>, Error> {
    parse_segments(env, raw, '@')
}

/// Parse `name=value;other=value2`.
pub fn parse_kv(env: &'static str, raw: &str) -> Result<BTreeMap<String, String>, Error> {
    parse_segments(env, raw, '=')
}

fn parse_segments(env: &'static str, raw: &str, sep: char) -> Result<BTreeMap<String, String>, Error> {
    let mut out = BTreeMap::new();
    for part in raw.split(';').filter(|part| !part.is_empty()) {
        let Some((key, value)) = part.split_once(sep) else {
            tracing::warn!(env, segment = part, "ignoring invalid segment");
            continue;
        };

        let key = key.trim().to_owned();
        if out.contains_key(&key) {
            return Err(Error::Duplicate { env, key });
        }
        out.insert(key, value.trim().to_owned());
    }
    Ok(out)
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_seconds(env: &str, raw: &str, default: f64) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        _ => {
            tracing::error!(env, value = raw, default, "invalid duration; using default");
            default
        }
    }
}

/// Keep origins with an http(s) scheme, a host, and no query or fragment;
/// deduplicate in order; fall back to the local defaults.
pub fn valid_origins(raw: &[String]) -> Vec<String> {
    let mut origins: Vec<String> = vec![];
    for origin in raw.iter().map(|origin| origin.trim()) {
        let valid = url::Url::parse(origin)
            .map(|url| {
                matches!(url.scheme(), "http" | "https")
                    && url.host_str().is_some_and(|host| !host.is_empty())
                    && url.query().is_none()
                    && url.fragment().is_none()
            })
            .unwrap_or(false);

        if !valid {
            tracing::warn!(origin, "ignoring invalid origin");
            continue;
        }
        if !origins.iter().any(|known| known == origin) {
            origins.push(origin.to_owned());
        }
    }

    if origins.is_empty() {
        DEFAULT_ORIGINS.iter().map(|origin| (*origin).to_owned()).collect()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_from_str() {
        let config = Config::from_str(
            r#"
            [server]
            autoconnect = true
            connect_timeout = 2.5
            api_key = "hunter2"

            [[printers]]
            name = "ender"
            host = "192.168.1.66"
            serial = "00M00A000000000"
            access_code = "12345678"
            variant = "P1S"

            [[printers]]
            name = "bench"
            host = "localhost"
            backend = "noop"
        "#,
        )
        .unwrap();

        assert!(config.server.autoconnect);
        assert_eq!(config.server.connect_interval, 0.1);
        assert_eq!(config.server.connect_timeout, 2.5);
        assert_eq!(config.server.api_key.as_deref(), Some("hunter2"));
        assert_eq!(config.printers.len(), 2);
        assert_eq!(config.printers[0].variant, BambuVariant::P1S);
        assert_eq!(config.printers[0].region, "US");
        assert_eq!(config.printers[0].backend, Backend::Bambu);
        assert_eq!(config.printers[1].backend, Backend::Noop);
        assert_eq!(config.printers[1].variant, BambuVariant::X1Carbon);
    }

    #[test]
    fn test_config_empty() {
        let config = Config::from_str("").unwrap();
        assert!(!config.server.autoconnect);
        assert!(config.printers.is_empty());
        assert_eq!(
            config.server.timing(),
            ConnectTiming {
                poll_interval: Duration::from_millis(100),
                timeout: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_parse_pairs_skips_invalid_segments() {
        let pairs = parse_pairs(ENV_PRINTERS, "babu@192.168.1.66; nope ;other@ 10.0.0.2 ;;").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["babu"], "192.168.1.66");
        assert_eq!(pairs["other"], "10.0.0.2");
    }

    #[test]
    fn test_parse_kv_splits_on_first_separator() {
        let kv = parse_kv(ENV_LAN_KEYS, "babu=abc=def").unwrap();
        assert_eq!(kv["babu"], "abc=def");
    }

    #[test]
    fn test_duplicate_entry_is_an_error() {
        let err = parse_kv(ENV_SERIALS, "a=1;a=2").unwrap_err();
        assert_eq!(err.to_string(), "Duplicate BAMBULAB_SERIALS entry for 'a'");
    }

    #[test]
    fn test_printers_from_env() {
        let printers = printers_from_env(
            "babu@192.168.1.66;other@192.168.1.77",
            "babu=SERIAL1;other=SERIAL2",
            "babu=CODE1;other=CODE2",
            "other=p1s",
            "EU",
        )
        .unwrap();

        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "babu");
        assert_eq!(printers[0].variant, BambuVariant::X1Carbon);
        assert_eq!(printers[1].name, "other");
        assert_eq!(printers[1].host, "192.168.1.77");
        assert_eq!(printers[1].serial, "SERIAL2");
        assert_eq!(printers[1].access_code, "CODE2");
        assert_eq!(printers[1].variant, BambuVariant::P1S);
        assert_eq!(printers[1].region, "EU");
    }

    #[test]
    fn test_printers_from_env_reports_every_missing_entry() {
        let err = printers_from_env("p1@host", "p2=SERIAL", "p1=CODE", "", "US").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Printer configuration incomplete: Missing BAMBULAB_SERIALS for p1; \
             Missing BAMBULAB_PRINTERS for p2; Missing BAMBULAB_LAN_KEYS for p2"
        );
    }

    #[test]
    fn test_unknown_variant() {
        let err = printers_from_env("p1@host", "p1=S", "p1=C", "p1=Z9", "US").unwrap_err();
        assert!(matches!(err, Error::UnknownVariant { .. }));
    }

    #[test]
    fn test_apply_env_overlays_file() {
        let mut config = Config::from_str(
            r#"
            [server]
            connect_interval = 0.5

            [[printers]]
            name = "bench"
            host = "localhost"
            backend = "noop"
        "#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                (ENV_PRINTERS, "ender@10.0.0.9"),
                (ENV_SERIALS, "ender=S1"),
                (ENV_LAN_KEYS, "ender=K1"),
                (ENV_AUTOCONNECT, "Yes"),
                (ENV_CONNECT_TIMEOUT, "not-a-number"),
                (ENV_API_KEY, "secret"),
                (ENV_ALLOW_ORIGINS, "https://dash.local, ftp://nope, https://dash.local"),
            ]))
            .unwrap();

        assert_eq!(
            config.printers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["bench", "ender"]
        );
        assert!(config.server.autoconnect);
        assert_eq!(config.server.connect_interval, 0.5);
        assert_eq!(config.server.connect_timeout, 5.0);
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.origins(), vec!["https://dash.local".to_owned()]);
    }

    #[test]
    fn test_apply_env_without_variables_is_a_no_op() {
        let mut config = Config::default();
        config.apply_env(env(&[])).unwrap();
        assert!(config.printers.is_empty());
        assert!(config.server.api_key.is_none());
    }

    #[test]
    fn test_truthy_values() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(is_truthy(raw), "{raw}");
        }
        for raw in ["0", "false", "", "enabled"] {
            assert!(!is_truthy(raw), "{raw}");
        }
    }

    #[test]
    fn test_non_positive_timing_falls_back() {
        let server = ServerConfig {
            connect_interval: 0.0,
            connect_timeout: -1.0,
            ..Default::default()
        };
        assert_eq!(server.timing(), ConnectTiming::default());
        assert_eq!(parse_seconds(ENV_CONNECT_INTERVAL, "-3", 0.1), 0.1);
        assert_eq!(parse_seconds(ENV_CONNECT_INTERVAL, " 0.25 ", 0.1), 0.25);
    }

    #[test]
    fn test_origins() {
        let raw = vec![
            "http://localhost:3000".to_owned(),
            "https://dash.local/?q=1".to_owned(),
            "https://dash.local#frag".to_owned(),
            "file:///etc".to_owned(),
            "http://localhost:3000".to_owned(),
        ];
        assert_eq!(valid_origins(&raw), vec!["http://localhost:3000".to_owned()]);
        assert_eq!(
            valid_origins(&["garbage".to_owned()]),
            vec!["http://localhost".to_owned(), "http://127.0.0.1".to_owned()]
        );
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(BambuVariant::parse("x1c"), Some(BambuVariant::X1Carbon));
        assert_eq!(BambuVariant::parse("A1 mini"), Some(BambuVariant::A1Mini));
        assert_eq!(BambuVariant::X1Carbon.to_string(), "X1C");
        assert!(BambuVariant::P1S.has_jpeg_camera());
        assert!(!BambuVariant::X1E.has_jpeg_camera());
    }

    #[test]
    fn test_access_code_is_redacted() {
        let mut printer = PrinterConfig::noop("bench");
        printer.access_code = "12345678".to_owned();
        assert!(!format!("{:?}", printer).contains("12345678"));
    }
}
