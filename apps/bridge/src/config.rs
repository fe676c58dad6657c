//! 配置文件
//!
//! 优先级：命令行 > 配置文件 > 缺省值。缺省路径为
//! `<config_dir>/isara-bridge/config.toml`，文件不存在时使用缺省值。

use anyhow::{Context, Result, anyhow};
use isara_driver::{DEFAULT_POSITIONS_BASE, DriverConfig, PollConfig, ProcessorConfig, UnmatchedPolicy};
use isara_link::LinkConfig;
use isara_protocol::{DEFAULT_COMMAND_PORT, DEFAULT_POSITION_TOLERANCE, DEFAULT_STATUS_PORT};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 缺省配置文件路径
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("isara-bridge").join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub host: String,
    pub command_port: u16,
    pub status_port: u16,
    /// 秒
    pub backoff_initial: f64,
    /// 秒
    pub backoff_max: f64,
    pub backoff_factor: f64,
    /// 毫秒
    pub read_timeout_ms: u64,
    /// 毫秒
    pub connect_timeout_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            host: "127.0.0.1".to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            status_port: DEFAULT_STATUS_PORT,
            backoff_initial: link.backoff_initial.as_secs_f64(),
            backoff_max: link.backoff_max.as_secs_f64(),
            backoff_factor: link.backoff_factor,
            read_timeout_ms: link.read_timeout.as_millis() as u64,
            connect_timeout_ms: link.connect_timeout.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollSection {
    pub tick_ms: u64,
    pub ticks_per_request: u32,
}

impl Default for PollSection {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            tick_ms: poll.tick.as_millis() as u64,
            ticks_per_request: poll.ticks_per_request,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FaultSection {
    /// `clear` 或 `retain`
    pub unmatched_fault_line: String,
}

impl Default for FaultSection {
    fn default() -> Self {
        Self {
            unmatched_fault_line: UnmatchedPolicy::default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PositionSection {
    pub directory: PathBuf,
    pub base: String,
    pub tolerance: f64,
}

impl Default for PositionSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            base: DEFAULT_POSITIONS_BASE.to_string(),
            tolerance: DEFAULT_POSITION_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InventorySection {
    /// 忽略检测位，视为所有槽位都有样品盘
    pub assume_all_pucks: bool,
}

/// 桥接程序配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub link: LinkSection,
    pub poll: PollSection,
    pub faults: FaultSection,
    pub positions: PositionSection,
    pub inventory: InventorySection,
}

impl BridgeConfig {
    /// 加载配置
    ///
    /// 显式指定的文件必须存在；缺省路径上的文件可以不存在。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_file() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 转换为驱动配置
    pub fn driver_config(&self) -> Result<DriverConfig> {
        let link = &self.link;
        if link.backoff_factor < 1.0 {
            return Err(anyhow!("backoff_factor must be >= 1.0, got {}", link.backoff_factor));
        }
        let unmatched_fault_line: UnmatchedPolicy = self
            .faults
            .unmatched_fault_line
            .parse()
            .map_err(|e: String| anyhow!(e))?;

        Ok(DriverConfig {
            host: link.host.clone(),
            command_port: link.command_port,
            status_port: link.status_port,
            link: LinkConfig {
                connect_timeout: Duration::from_millis(link.connect_timeout_ms),
                read_timeout: Duration::from_millis(link.read_timeout_ms),
                backoff_initial: seconds("backoff_initial", link.backoff_initial)?,
                backoff_max: seconds("backoff_max", link.backoff_max)?,
                backoff_factor: link.backoff_factor,
            },
            poll: PollConfig {
                tick: Duration::from_millis(self.poll.tick_ms.max(1)),
                ticks_per_request: self.poll.ticks_per_request.max(1),
            },
            processor: ProcessorConfig {
                unmatched_fault_line,
                assume_all_pucks: self.inventory.assume_all_pucks,
            },
            positions_dir: self.positions.directory.clone(),
            positions_base: self.positions.base.clone(),
        })
    }
}

/// 秒数转换为 `Duration`，负数、NaN 与无穷大都视为配置错误
fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| anyhow!("{key} = {value}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = BridgeConfig::parse("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        let driver = config.driver_config().unwrap();
        assert_eq!(driver.command_port, 10000);
        assert_eq!(driver.status_port, 1000);
        assert_eq!(driver.link.backoff_max, Duration::from_secs(60));
        assert_eq!(driver.poll.tick, Duration::from_millis(100));
    }

    #[test]
    fn test_sections() {
        let config = BridgeConfig::parse(
            r#"
            [link]
            host = "10.1.2.3"
            command_port = 11000
            backoff_max = 30.0

            [poll]
            tick_ms = 50

            [faults]
            unmatched_fault_line = "retain"

            [positions]
            directory = "/var/lib/isara"
            base = "cats"
            tolerance = 0.25

            [inventory]
            assume_all_pucks = true
            "#,
        )
        .unwrap();

        let driver = config.driver_config().unwrap();
        assert_eq!(driver.host, "10.1.2.3");
        assert_eq!(driver.command_port, 11000);
        assert_eq!(driver.status_port, 1000);
        assert_eq!(driver.link.backoff_max, Duration::from_secs(30));
        assert_eq!(driver.poll.tick, Duration::from_millis(50));
        assert_eq!(driver.poll.ticks_per_request, 10);
        assert_eq!(driver.processor.unmatched_fault_line, UnmatchedPolicy::Retain);
        assert!(driver.processor.assume_all_pucks);
        assert_eq!(driver.positions_base, "cats");
        assert_eq!(config.positions.tolerance, 0.25);
    }

    #[test]
    fn test_invalid_values() {
        let config = BridgeConfig::parse("[faults]\nunmatched_fault_line = \"ignore\"\n").unwrap();
        assert!(config.driver_config().is_err());

        let config = BridgeConfig::parse("[link]\nbackoff_factor = 0.5\n").unwrap();
        assert!(config.driver_config().is_err());

        assert!(BridgeConfig::parse("[link]\ncommand_port = \"x\"\n").is_err());

        for bad in ["inf", "nan", "-1.0"] {
            let config = BridgeConfig::parse(&format!("[link]\nbackoff_max = {bad}\n")).unwrap();
            let err = config.driver_config().unwrap_err();
            assert!(err.to_string().starts_with("backoff_max"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "[link]\nhost = \"robot\"\n").unwrap();
        assert_eq!(BridgeConfig::load(Some(&path)).unwrap().link.host, "robot");
        assert!(BridgeConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
