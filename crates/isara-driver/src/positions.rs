//! 命名位置跟踪
//!
//! 位置表是"名字 → 笛卡尔坐标 + 容差"的 JSON 对象，启动时从目录中最新的
//! `<base>*.dat` 文件加载；保存时写入 `<base>-<YYYYMMDD>.dat`。
//!
//! 匹配只比较 XYZ 三个分量的欧氏距离。

use crate::error::DriverError;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info};

/// 6 自由度位姿
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self { x, y, z, rx, ry, rz }
    }

    /// 按 position 帧的顺序（X, Y, Z, RX, RY, RZ）访问分量
    pub fn component_mut(&mut self, index: usize) -> Option<&mut f64> {
        match index {
            0 => Some(&mut self.x),
            1 => Some(&mut self.y),
            2 => Some(&mut self.z),
            3 => Some(&mut self.rx),
            4 => Some(&mut self.ry),
            5 => Some(&mut self.rz),
            _ => None,
        }
    }

    pub fn components(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.rx, self.ry, self.rz]
    }
}

/// 一个命名位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionDefinition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub tol: f64,
}

impl PositionDefinition {
    pub fn from_pose(pose: &Pose, tol: f64) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            rx: pose.rx,
            ry: pose.ry,
            rz: pose.rz,
            tol,
        }
    }

    /// XYZ 欧氏距离
    pub fn distance(&self, pose: &Pose) -> f64 {
        let dx = pose.x - self.x;
        let dy = pose.y - self.y;
        let dz = pose.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn contains(&self, pose: &Pose) -> bool {
        self.distance(pose) <= self.tol
    }
}

/// 位置表（按名字排序）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionTable(BTreeMap<String, PositionDefinition>);

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PositionDefinition> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: PositionDefinition) {
        self.0.insert(name.into(), definition);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// 查找包含该位姿的位置
    ///
    /// 多个位置重叠时，表顺序（按名字）中第一个命中者胜出。
    pub fn locate(&self, pose: &Pose) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, def)| def.contains(pose))
            .map(|(name, _)| name.as_str())
    }
}

/// 位置文件存储
#[derive(Debug, Clone)]
pub struct PositionStore {
    dir: PathBuf,
    base: String,
}

impl PositionStore {
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 目录中最新（按修改时间）的 `<base>*.dat`
    pub fn latest_file(&self) -> Result<Option<PathBuf>, DriverError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&self.base) || !name.ends_with(".dat") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
                latest = Some((modified, entry.path()));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }

    /// 加载最新的位置表，没有文件时返回空表
    pub fn load_latest(&self) -> Result<PositionTable, DriverError> {
        let Some(path) = self.latest_file()? else {
            debug!("No position file matching {}*.dat in {}", self.base, self.dir.display());
            return Ok(PositionTable::new());
        };
        info!("Using Position File: {}", path.display());
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 当天的文件路径 `<base>-<YYYYMMDD>.dat`
    pub fn dated_path(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y%m%d");
        self.dir.join(format!("{}-{}.dat", self.base, date))
    }

    /// 以 2 空格缩进的 JSON 写入整张表
    pub fn save(&self, table: &PositionTable) -> Result<PathBuf, DriverError> {
        let path = self.dated_path();
        let text = serde_json::to_string_pretty(table)?;
        fs::write(&path, text)?;
        debug!("Saved {} positions to {}", table.len(), path.display());
        Ok(path)
    }
}

/// 保存位置的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// 已写入文件
    Saved(PathBuf),
    /// 名字已存在且未允许覆盖
    Exists(String),
    /// 空名字
    Ignored,
}

/// 规范化位置名：去首尾空白，内部空格替换为 `_`
pub fn normalize_position_name(name: &str) -> String {
    name.trim().replace(' ', "_")
}

/// 位置表 + 存储
///
/// 表只被"保存位置"修改；读取（匹配）发生在接收线程。
#[derive(Debug)]
pub struct PositionBook {
    store: PositionStore,
    table: RwLock<PositionTable>,
}

impl PositionBook {
    /// 加载位置表；文件损坏时记录错误并使用空表
    pub fn open(store: PositionStore) -> Self {
        let table = store.load_latest().unwrap_or_else(|e| {
            error!("Failed to load positions from {}: {}", store.dir().display(), e);
            PositionTable::new()
        });
        Self::with_table(store, table)
    }

    pub fn with_table(store: PositionStore, table: PositionTable) -> Self {
        Self {
            store,
            table: RwLock::new(table),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    pub fn table(&self) -> PositionTable {
        self.table.read().clone()
    }

    pub fn locate(&self, pose: &Pose) -> Option<String> {
        self.table.read().locate(pose).map(str::to_string)
    }

    /// 以当前位姿保存命名位置
    ///
    /// 名字已存在且 `overwrite` 为 false 时不做任何修改。
    pub fn save(
        &self,
        name: &str,
        tolerance: f64,
        overwrite: bool,
        pose: &Pose,
    ) -> Result<SaveOutcome, DriverError> {
        let name = normalize_position_name(name);
        if name.is_empty() {
            return Ok(SaveOutcome::Ignored);
        }

        // 写文件期间接收线程仍可匹配；写入成功后才更新内存中的表
        let table = self.table.upgradable_read();
        if table.contains(&name) && !overwrite {
            return Ok(SaveOutcome::Exists(name));
        }
        let mut updated = (*table).clone();
        updated.insert(name.clone(), PositionDefinition::from_pose(pose, tolerance));
        let path = self.store.save(&updated)?;
        *RwLockUpgradableReadGuard::upgrade(table) = updated;
        info!("Position {} saved", name);
        Ok(SaveOutcome::Saved(path))
    }
}
