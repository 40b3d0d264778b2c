//! Parses spec.md §6's environment variables (`debug`, `hci`, `gatt`,
//! `l2cap`, `mgmt`, each a comma-separated `k=v` list) into typed config
//! structs, in the teacher's `XxxConfig { ..: Option<T> }` +
//! `unwrap_or(DEFAULT)` pattern (`nxzr_device::session::SessionConfig`).
//! Small enough that a config-parsing crate would be unjustified
//! ceremony -- the teacher never reaches for one either.
use std::collections::HashMap;
use std::time::Duration;

fn parse_kv_list(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn duration_ms(map: &HashMap<String, String>, key: &str) -> Option<Duration> {
    map.get(key).and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis)
}

fn count(map: &HashMap<String, String>, key: &str) -> Option<usize> {
    map.get(key).and_then(|v| v.parse::<usize>().ok())
}

const DEFAULT_HCI_CMD_COMPLETE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HCI_CMD_STATUS_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_HCI_RINGSIZE: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct HciConfig {
    pub cmd_complete_timeout: Option<Duration>,
    pub cmd_status_timeout: Option<Duration>,
    pub ringsize: Option<usize>,
}

impl HciConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let map = parse_kv_list(raw);
        Self {
            cmd_complete_timeout: duration_ms(&map, "cmd.complete.timeout"),
            cmd_status_timeout: duration_ms(&map, "cmd.status.timeout"),
            ringsize: count(&map, "ringsize"),
        }
    }

    pub fn cmd_complete_timeout(&self) -> Duration {
        self.cmd_complete_timeout.unwrap_or(DEFAULT_HCI_CMD_COMPLETE_TIMEOUT)
    }

    pub fn cmd_status_timeout(&self) -> Duration {
        self.cmd_status_timeout.unwrap_or(DEFAULT_HCI_CMD_STATUS_TIMEOUT)
    }

    pub fn ringsize(&self) -> usize {
        self.ringsize.unwrap_or(DEFAULT_HCI_RINGSIZE)
    }
}

const DEFAULT_GATT_READ_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_GATT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_GATT_INIT_TIMEOUT: Duration = Duration::from_millis(2500);
const DEFAULT_GATT_RINGSIZE: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct GattConfig {
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub init_timeout: Option<Duration>,
    pub ringsize: Option<usize>,
}

impl GattConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let map = parse_kv_list(raw);
        Self {
            read_timeout: duration_ms(&map, "cmd.read.timeout"),
            write_timeout: duration_ms(&map, "cmd.write.timeout"),
            init_timeout: duration_ms(&map, "cmd.init.timeout"),
            ringsize: count(&map, "ringsize"),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout.unwrap_or(DEFAULT_GATT_READ_TIMEOUT)
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout.unwrap_or(DEFAULT_GATT_WRITE_TIMEOUT)
    }

    pub fn init_timeout(&self) -> Duration {
        self.init_timeout.unwrap_or(DEFAULT_GATT_INIT_TIMEOUT)
    }

    pub fn ringsize(&self) -> usize {
        self.ringsize.unwrap_or(DEFAULT_GATT_RINGSIZE)
    }
}

const DEFAULT_L2CAP_READER_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_L2CAP_RESTART_COUNT: usize = 0;

#[derive(Debug, Clone, Default)]
pub struct L2capConfig {
    pub reader_timeout: Option<Duration>,
    pub restart_count: Option<usize>,
}

impl L2capConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let map = parse_kv_list(raw);
        Self { reader_timeout: duration_ms(&map, "reader.timeout"), restart_count: count(&map, "restart.count") }
    }

    pub fn reader_timeout(&self) -> Duration {
        self.reader_timeout.unwrap_or(DEFAULT_L2CAP_READER_TIMEOUT)
    }

    pub fn restart_count(&self) -> usize {
        self.restart_count.unwrap_or(DEFAULT_L2CAP_RESTART_COUNT)
    }
}

const DEFAULT_MGMT_CMD_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MGMT_RINGSIZE: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct MgmtConfig {
    pub cmd_timeout: Option<Duration>,
    pub ringsize: Option<usize>,
}

impl MgmtConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let map = parse_kv_list(raw);
        Self { cmd_timeout: duration_ms(&map, "cmd.timeout"), ringsize: count(&map, "ringsize") }
    }

    pub fn cmd_timeout(&self) -> Duration {
        self.cmd_timeout.unwrap_or(DEFAULT_MGMT_CMD_TIMEOUT)
    }

    pub fn ringsize(&self) -> usize {
        self.ringsize.unwrap_or(DEFAULT_MGMT_RINGSIZE)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub debug: bool,
    pub hci: HciConfig,
    pub gatt: GattConfig,
    pub l2cap: L2capConfig,
    pub mgmt: MgmtConfig,
}

impl Config {
    /// Reads `debug`/`hci`/`gatt`/`l2cap`/`mgmt` from the process
    /// environment; any variable absent or empty falls back to its
    /// per-field defaults.
    pub fn from_env() -> Self {
        Self {
            debug: std::env::var("debug").map(|v| !v.is_empty()).unwrap_or(false),
            hci: std::env::var("hci").map(|v| HciConfig::from_env_value(&v)).unwrap_or_default(),
            gatt: std::env::var("gatt").map(|v| GattConfig::from_env_value(&v)).unwrap_or_default(),
            l2cap: std::env::var("l2cap").map(|v| L2capConfig::from_env_value(&v)).unwrap_or_default(),
            mgmt: std::env::var("mgmt").map(|v| MgmtConfig::from_env_value(&v)).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hci_config_parses_kv_list_and_falls_back_to_defaults() {
        let cfg = HciConfig::from_env_value("cmd.complete.timeout=5000,ringsize=128");
        assert_eq!(cfg.cmd_complete_timeout(), Duration::from_millis(5000));
        assert_eq!(cfg.ringsize(), 128);
        assert_eq!(cfg.cmd_status_timeout(), DEFAULT_HCI_CMD_STATUS_TIMEOUT);
    }

    #[test]
    fn empty_value_yields_all_defaults() {
        let cfg = GattConfig::from_env_value("");
        assert_eq!(cfg.read_timeout(), DEFAULT_GATT_READ_TIMEOUT);
        assert_eq!(cfg.init_timeout(), DEFAULT_GATT_INIT_TIMEOUT);
    }

    #[test]
    fn malformed_entries_are_ignored_not_fatal() {
        let cfg = L2capConfig::from_env_value("reader.timeout=notanumber,restart.count=3");
        assert_eq!(cfg.reader_timeout(), DEFAULT_L2CAP_READER_TIMEOUT);
        assert_eq!(cfg.restart_count(), 3);
    }
}
