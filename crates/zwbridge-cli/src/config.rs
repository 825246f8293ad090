//! Bridge configuration – reads/writes `~/.zwbridge/config.toml`.
//!
//! ```toml
//! base_path = "sys/zwave"
//! device = "/dev/ttyACM0"
//! broker_host = "localhost"
//! broker_port = 1883
//! keepalive_secs = 10
//! client_id = "Qth-Zwave-Bridge"
//!
//! [[sim_nodes]]
//! node_id = 2
//! product_name = "Wall Plug"
//! neighbours = [1]
//!
//! [[sim_nodes.values]]
//! value_id = 72057594076463104
//! label = "Switch"
//! data = false
//! ```
//!
//! `device`, `broker_host`, `broker_port`, `keepalive_secs` and `client_id`
//! describe a serial controller and a network broker.  The binary currently
//! runs the simulated network over the in-process bus, so these settings are
//! reserved: they are persisted and validated but nothing connects with them.
//! [`Config::reserved_overrides`] reports the ones set to non-default values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use zwbridge_hal::{SimNode, SimTopology};
use zwbridge_runtime::BridgeConfig;
use zwbridge_types::{HomeId, NodeId, ValueId};

/// Persisted configuration stored in `~/.zwbridge/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the published tree.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Serial device of the network controller.  Reserved.
    #[serde(default = "default_device")]
    pub device: String,

    /// Host of the pub/sub broker.  Reserved.
    #[serde(default = "default_broker_host")]
    pub broker_host: String,

    /// Port of the pub/sub broker.  Reserved.
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// Broker keepalive interval in seconds.  Reserved.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Client name announced to the broker.  Reserved.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Home id reported by the simulated network.
    #[serde(default)]
    pub sim_home_id: HomeId,

    /// Nodes of the simulated network the CLI boots with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sim_nodes: Vec<SimNodeConfig>,
}

/// One simulated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimNodeConfig {
    pub node_id: NodeId,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub manufacturer_name: String,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub neighbours: Vec<NodeId>,
    #[serde(default)]
    pub values: Vec<SimValueConfig>,
}

/// One value of a simulated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimValueConfig {
    pub value_id: ValueId,
    pub label: String,
    pub data: serde_json::Value,
}

fn default_base_path() -> String {
    BridgeConfig::default().base_path
}
fn default_device() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_broker_host() -> String {
    "localhost".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_keepalive_secs() -> u64 {
    10
}
fn default_client_id() -> String {
    "Qth-Zwave-Bridge".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            device: default_device(),
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            keepalive_secs: default_keepalive_secs(),
            client_id: default_client_id(),
            sim_home_id: 0,
            sim_nodes: Vec::new(),
        }
    }
}

impl Config {
    /// Engine configuration derived from this file.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            base_path: self.base_path.clone(),
        }
    }

    /// Names of the reserved settings that differ from their defaults.
    pub fn reserved_overrides(&self) -> Vec<&'static str> {
        let defaults = Config::default();
        [
            ("device", self.device != defaults.device),
            ("broker_host", self.broker_host != defaults.broker_host),
            ("broker_port", self.broker_port != defaults.broker_port),
            ("keepalive_secs", self.keepalive_secs != defaults.keepalive_secs),
            ("client_id", self.client_id != defaults.client_id),
        ]
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect()
    }

    /// Build the simulated network described by `sim_nodes`.
    pub fn sim_topology(&self) -> SimTopology {
        let mut builder = SimTopology::builder().home_id(self.sim_home_id);
        for node in &self.sim_nodes {
            let mut sim = SimNode::new(node.node_id)
                .with_product(node.product_name.clone())
                .with_manufacturer("", node.manufacturer_name.clone())
                .with_neighbours(node.neighbours.clone());
            if node.failed {
                sim = sim.failed();
            }
            builder = builder.with_node(sim);
            for value in &node.values {
                builder = builder.with_value(
                    node.node_id,
                    value.value_id,
                    value.label.clone(),
                    value.data.clone(),
                );
            }
        }
        builder.build()
    }
}

/// Return the path to `~/.zwbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".zwbridge").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ZWBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ZWBRIDGE_BASE_PATH` | `base_path` |
/// | `ZWBRIDGE_DEVICE` | `device` (reserved) |
/// | `ZWBRIDGE_BROKER_HOST` | `broker_host` (reserved) |
/// | `ZWBRIDGE_BROKER_PORT` | `broker_port` (reserved; ignored unless a valid port) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ZWBRIDGE_BASE_PATH") {
        cfg.base_path = v;
    }
    if let Ok(v) = std::env::var("ZWBRIDGE_DEVICE") {
        cfg.device = v;
    }
    if let Ok(v) = std::env::var("ZWBRIDGE_BROKER_HOST") {
        cfg.broker_host = v;
    }
    if let Ok(v) = std::env::var("ZWBRIDGE_BROKER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.broker_port = port;
    }
}

/// Save the config to disk, creating `~/.zwbridge/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path with owner-only permissions on Unix.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zwbridge_hal::Topology;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.base_path, "sys/zwave");
        assert_eq!(cfg.device, "/dev/ttyACM0");
        assert_eq!(cfg.broker_host, "localhost");
        assert_eq!(cfg.broker_port, 1883);
        assert_eq!(cfg.keepalive_secs, 10);
        assert_eq!(cfg.client_id, "Qth-Zwave-Bridge");
        assert!(cfg.sim_nodes.is_empty());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("broker_port = 1999\n").expect("parse");
        assert_eq!(cfg.broker_port, 1999);
        assert_eq!(cfg.base_path, "sys/zwave");
        assert_eq!(cfg.client_id, "Qth-Zwave-Bridge");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode =
            std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.keepalive_secs, 10);
        assert_eq!(loaded.client_id, "Qth-Zwave-Bridge");
        assert_eq!(loaded.sim_home_id, 0);
    }

    #[test]
    fn reserved_overrides_lists_only_changed_settings() {
        assert!(Config::default().reserved_overrides().is_empty());

        let cfg = Config {
            broker_host: "broker.lan".to_string(),
            keepalive_secs: 30,
            base_path: "home/zw".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.reserved_overrides(), vec!["broker_host", "keepalive_secs"]);
    }

    #[test]
    fn config_path_points_to_zwbridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".zwbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "broker_port = \"not a number\"\n").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn sim_nodes_build_the_simulated_network() {
        let raw = r#"
            sim_home_id = 3735928559

            [[sim_nodes]]
            node_id = 2
            product_name = "Wall Plug"
            neighbours = [1]

            [[sim_nodes.values]]
            value_id = 7
            label = "Switch"
            data = false

            [[sim_nodes]]
            node_id = 5
            failed = true
        "#;
        let cfg: Config = toml::from_str(raw).expect("parse");
        let topology = cfg.sim_topology();

        assert_eq!(topology.home_id(), 0xdead_beef);
        assert_eq!(topology.node_ids().into_iter().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(topology.value_label(2, 7).unwrap(), "Switch");
        assert_eq!(topology.value_data(2, 7).unwrap(), json!(false));
        assert!(topology.is_failed(5).unwrap());
    }

    #[test]
    fn env_overrides_replace_strings() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("ZWBRIDGE_BASE_PATH", "home/zw");
            std::env::set_var("ZWBRIDGE_DEVICE", "/dev/ttyUSB1");
            std::env::set_var("ZWBRIDGE_BROKER_HOST", "broker.lan");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.base_path, "home/zw");
        assert_eq!(cfg.device, "/dev/ttyUSB1");
        assert_eq!(cfg.broker_host, "broker.lan");
        assert_eq!(cfg.bridge_config().base_path, "home/zw");
        unsafe {
            std::env::remove_var("ZWBRIDGE_BASE_PATH");
            std::env::remove_var("ZWBRIDGE_DEVICE");
            std::env::remove_var("ZWBRIDGE_BROKER_HOST");
        }
    }

    #[test]
    fn env_override_broker_port_requires_a_valid_port() {
        // Both cases share one test so they never race on the variable.
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ZWBRIDGE_BROKER_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker_port, 1883);

        unsafe { std::env::set_var("ZWBRIDGE_BROKER_PORT", "8883") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker_port, 8883);
        unsafe { std::env::remove_var("ZWBRIDGE_BROKER_PORT") };
    }
}
