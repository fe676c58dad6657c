//! 命名通道
//!
//! 控制系统侧以"通道"的形式暴露状态与参数：每个通道有一个名字和一个值，
//! 支持 `get` / `put` / `subscribe`，值发生变化时同步调用订阅回调。
//!
//! 驱动层只通过 [`ChannelSink`] 发布数据；[`ChannelBoard`] 是进程内的默认实现。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 通道值
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ChannelValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ChannelValue::Int(v) => Some(*v),
            ChannelValue::Float(v) => Some(*v as i64),
            ChannelValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ChannelValue::Int(v) => Some(*v as f64),
            ChannelValue::Float(v) => Some(*v),
            ChannelValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            ChannelValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// 非零 / 非空
    pub fn is_set(&self) -> bool {
        match self {
            ChannelValue::Int(v) => *v != 0,
            ChannelValue::Float(v) => *v != 0.0,
            ChannelValue::Text(s) => !s.trim().is_empty(),
        }
    }

    /// 按控制台输入解析：整数 → 浮点 → 文本
    pub fn parse_loose(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            ChannelValue::Int(v)
        } else if let Ok(v) = trimmed.parse::<f64>() {
            ChannelValue::Float(v)
        } else {
            ChannelValue::Text(text.to_string())
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Int(v) => write!(f, "{v}"),
            ChannelValue::Float(v) => write!(f, "{v}"),
            ChannelValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ChannelValue {
    fn from(v: bool) -> Self {
        ChannelValue::Int(v as i64)
    }
}

impl From<i64> for ChannelValue {
    fn from(v: i64) -> Self {
        ChannelValue::Int(v)
    }
}

impl From<u8> for ChannelValue {
    fn from(v: u8) -> Self {
        ChannelValue::Int(v as i64)
    }
}

impl From<u16> for ChannelValue {
    fn from(v: u16) -> Self {
        ChannelValue::Int(v as i64)
    }
}

impl From<u32> for ChannelValue {
    fn from(v: u32) -> Self {
        ChannelValue::Int(v as i64)
    }
}

impl From<f64> for ChannelValue {
    fn from(v: f64) -> Self {
        ChannelValue::Float(v)
    }
}

impl From<&str> for ChannelValue {
    fn from(v: &str) -> Self {
        ChannelValue::Text(v.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(v: String) -> Self {
        ChannelValue::Text(v)
    }
}

/// 发布端抽象
pub trait ChannelSink: Send + Sync {
    fn publish(&self, name: &str, value: ChannelValue);
}

/// 丢弃所有发布（无控制系统时使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ChannelSink for NullSink {
    fn publish(&self, _name: &str, _value: ChannelValue) {}
}

/// 订阅回调：（通道名, 新值）
pub type ChannelCallback = Arc<dyn Fn(&str, &ChannelValue) + Send + Sync>;

/// 进程内通道表
///
/// 回调在写入者线程上同步执行，执行时不持有任何内部锁，
/// 因此回调内部可以再次 `put`。
#[derive(Default)]
pub struct ChannelBoard {
    values: RwLock<HashMap<String, ChannelValue>>,
    callbacks: RwLock<HashMap<String, Vec<ChannelCallback>>>,
}

impl ChannelBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置初始值（不触发回调）
    pub fn define(&self, name: &str, initial: impl Into<ChannelValue>) {
        self.values.write().insert(name.to_string(), initial.into());
    }

    pub fn get(&self, name: &str) -> Option<ChannelValue> {
        self.values.read().get(name).cloned()
    }

    /// 写入通道，值改变时触发回调
    ///
    /// 返回值是否发生了变化。
    pub fn put(&self, name: &str, value: impl Into<ChannelValue>) -> bool {
        let value = value.into();
        {
            let mut values = self.values.write();
            if values.get(name) == Some(&value) {
                return false;
            }
            values.insert(name.to_string(), value.clone());
        }

        let callbacks = self.callbacks.read().get(name).cloned().unwrap_or_default();
        for callback in callbacks {
            callback(name, &value);
        }
        true
    }

    pub fn subscribe(&self, name: &str, callback: ChannelCallback) {
        self.callbacks
            .write()
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }

    /// 所有已知通道名（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ChannelSink for ChannelBoard {
    fn publish(&self, name: &str, value: ChannelValue) {
        self.put(name, value);
    }
}

impl fmt::Debug for ChannelBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBoard")
            .field("channels", &self.values.read().len())
            .field("subscriptions", &self.callbacks.read().len())
            .finish()
    }
}

/// 通道名
pub mod names {
    pub const STATUS: &str = "STATUS";
    pub const HEALTH: &str = "HEALTH";
    pub const WARNING: &str = "WARNING";
    pub const HELP: &str = "HELP";
    pub const MESSAGE: &str = "MESSAGE";
    pub const LOG: &str = "LOG";
    pub const CONNECTED: &str = "CONNECTED";
    pub const ENABLED: &str = "ENABLED";

    // 数字量输入输出
    pub const INPUTS: [&str; 4] = ["STATE:INP0", "STATE:INP1", "STATE:INP2", "STATE:INP3"];
    pub const OUTPUTS: [&str; 4] = ["STATE:OUT0", "STATE:OUT1", "STATE:OUT2", "STATE:OUT3"];
    pub const INP_EMERGENCY: &str = "INP:emerg";
    pub const INP_COLLISION: &str = "INP:colSensor";
    pub const INP_CRYO_LEVEL: &str = "INP:cryoLevel";
    pub const INP_GONIO_READY: &str = "INP:gonioRdy";
    pub const INP_SAMPLE_ON_GONIO: &str = "INP:smplOnGonio";
    pub const INP_CRYOJET: &str = "INP:cryojet";

    // 状态反馈
    pub const STATE_POWER: &str = "STATE:power";
    pub const STATE_MODE: &str = "STATE:mode";
    pub const STATE_FAULT: &str = "STATE:fault";
    pub const STATE_ERROR: &str = "STATE:error";
    pub const STATE_TOOL: &str = "STATE:tool";
    pub const STATE_POS: &str = "STATE:pos";
    pub const STATE_DEVICE_POS: &str = "STATE:devPos";
    pub const STATE_PATH: &str = "STATE:path";
    pub const STATE_GRIPPER_TOOL: &str = "STATE:gripperTool";
    pub const STATE_GRIPPER_TOOLB: &str = "STATE:gripperToolb";
    pub const STATE_TOOL_PUCK: &str = "STATE:toolPuck";
    pub const STATE_TOOL_SAMPLE: &str = "STATE:toolSmpl";
    pub const STATE_TOOLB_PUCK: &str = "STATE:toolbPuck";
    pub const STATE_TOOLB_SAMPLE: &str = "STATE:toolbSmpl";
    pub const STATE_DIFF_PUCK: &str = "STATE:diffPuck";
    pub const STATE_DIFF_SAMPLE: &str = "STATE:diffSmpl";
    pub const STATE_PLATE: &str = "STATE:plate";
    pub const STATE_BARCODE: &str = "STATE:barcode";
    pub const STATE_RUNNING: &str = "STATE:running";
    pub const STATE_SPEED: &str = "STATE:speed";
    pub const STATE_AUTOFILL: &str = "STATE:autofill";
    pub const STATE_SOAK_COUNT: &str = "STATE:soakCount";
    pub const STATE_CURRENT_LN2: &str = "STATE:currLN2";
    pub const STATE_HIGH_LN2: &str = "STATE:setHighLN2";
    pub const STATE_LOW_LN2: &str = "STATE:setLowLN2";
    pub const STATE_DRYING: &str = "STATE:drying";
    pub const STATE_TRAJECTORY: &str = "STATE:traj";
    pub const STATE_TOOL_OPEN: &str = "STATE:toolOpen";
    pub const STATE_TOOLB_OPEN: &str = "STATE:toolbOpen";
    pub const STATE_APPROACH: &str = "STATE:approach";
    pub const STATE_MAGNET: &str = "STATE:magnet";
    pub const STATE_HEATER: &str = "STATE:heater";
    pub const STATE_REMOTE_SPEED: &str = "STATE:remSpeed";
    pub const STATE_PUCKS: &str = "STATE:pucks";
    pub const STATE_PUCKS_BIT0: &str = "STATE:pucks:bit0";
    pub const STATE_PUCKS_BIT1: &str = "STATE:pucks:bit1";
    pub const STATE_POSE: [&str; 6] = [
        "STATE:posX",
        "STATE:posY",
        "STATE:posZ",
        "STATE:posRX",
        "STATE:posRY",
        "STATE:posRZ",
    ];
    pub const STATE_ON_DIFF: &str = "STATE:onDiff";
    pub const STATE_ON_TOOL: &str = "STATE:onTool";

    // 操作员参数
    pub const PAR_NEXT_PORT: &str = "PAR:nextPort";
    pub const PAR_NEXT_AFTER_PORT: &str = "PAR:nextAfterPort";
    pub const PAR_BARCODE: &str = "PAR:barcode";
    pub const PAR_TOOL: &str = "PAR:tool";
    pub const PAR_PUCK: &str = "PAR:puck";
    pub const PAR_SAMPLE: &str = "PAR:smpl";
    pub const PAR_NEXT_PUCK: &str = "PAR:nextPuck";
    pub const PAR_NEXT_SAMPLE: &str = "PAR:nextSmpl";
    pub const PAR_PLATE: &str = "PAR:plate";
    pub const PAR_SAMPLE_TYPE: &str = "PAR:smplType";
    pub const PAR_NEXT_SAMPLE_TYPE: &str = "PAR:nextSmplType";
    pub const PAR_DATAMATRIX_SCAN: &str = "PAR:dataMatScan";
    pub const PAR_JAW: &str = "PAR:jaw";
    pub const PAR_POS_NAME: &str = "PAR:posName";
    pub const PAR_POS_FORCE: &str = "PAR:posForce";
    pub const PAR_POS_TOLERANCE: &str = "PAR:posTol";
    pub const PAR_MAX_SOAK_TIME: &str = "PAR:setMaxSoakTime";
    pub const PAR_MAX_SOAK_NB: &str = "PAR:setMaxSoakNB";
    pub const PAR_AUTO_CLOSE_LID_TIMER: &str = "PAR:setAutoCloseLidTimer";
    pub const PAR_AUTO_DRY_TIMER: &str = "PAR:setAutoDryTimer";
    pub const PAR_HIGH_LN2: &str = "PAR:setHighLN2";
    pub const PAR_LOW_LN2: &str = "PAR:setLowLN2";

    // 命令
    pub const CMD_POWER: &str = "CMD:power";
    pub const CMD_REBOOT: &str = "CMD:reboot";
    pub const CMD_PANIC: &str = "CMD:panic";
    pub const CMD_ABORT: &str = "CMD:abort";
    pub const CMD_PAUSE: &str = "CMD:pause";
    pub const CMD_RESET: &str = "CMD:reset";
    pub const CMD_RESTART: &str = "CMD:restart";
    pub const CMD_CLEAR_BARCODE: &str = "CMD:clrBarcode";
    pub const CMD_LID: &str = "CMD:lid";
    pub const CMD_TOOL: &str = "CMD:tool";
    pub const CMD_TOOLB: &str = "CMD:toolb";
    pub const CMD_FASTER: &str = "CMD:faster";
    pub const CMD_SLOWER: &str = "CMD:slower";
    pub const CMD_MAGNET: &str = "CMD:magnet";
    pub const CMD_HEATER: &str = "CMD:heater";
    pub const CMD_SPEED: &str = "CMD:speed";
    pub const CMD_APPROACH: &str = "CMD:approach";
    pub const CMD_RUNNING: &str = "CMD:running";
    pub const CMD_AUTOFILL: &str = "CMD:autofill";
    pub const CMD_HOME: &str = "CMD:home";
    pub const CMD_RECOVER: &str = "CMD:recover";
    pub const CMD_SAFE: &str = "CMD:safe";
    pub const CMD_PUT: &str = "CMD:put";
    pub const CMD_GET: &str = "CMD:get";
    pub const CMD_GETPUT: &str = "CMD:getPut";
    pub const CMD_BARCODE: &str = "CMD:barcode";
    pub const CMD_BACK: &str = "CMD:back";
    pub const CMD_SOAK: &str = "CMD:soak";
    pub const CMD_DRY: &str = "CMD:dry";
    pub const CMD_PICK: &str = "CMD:pick";
    pub const CMD_CHANGE_TOOL: &str = "CMD:chgTool";
    pub const CMD_TOOL_CAL: &str = "CMD:toolCal";
    pub const CMD_TEACH_GONIO: &str = "CMD:teachGonio";
    pub const CMD_TEACH_PUCK: &str = "CMD:teachPuck";
    pub const CMD_TEACH_DEWAR: &str = "CMD:teachDewar";
    pub const CMD_CLEAR: &str = "CMD:clear";
    pub const CMD_SET_DIFF_SAMPLE: &str = "CMD:setDiffSmpl";
    pub const CMD_SET_TOOL_SAMPLE: &str = "CMD:setToolSmpl";
    pub const CMD_SET_TOOLB_SAMPLE: &str = "CMD:setToolbSmpl";
    pub const CMD_RESET_PARAMS: &str = "CMD:resetParams";
    pub const CMD_RESET_MOTION: &str = "CMD:resetMotion";
    pub const CMD_SAVE_POSITION: &str = "CMD:savePos";
    pub const CMD_MOUNT: &str = "CMD:mount";
    pub const CMD_DISMOUNT: &str = "CMD:dismount";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_value_conversions() {
        assert_eq!(ChannelValue::from(true), ChannelValue::Int(1));
        assert_eq!(ChannelValue::Text(" 42 ".into()).as_int(), Some(42));
        assert_eq!(ChannelValue::Float(0.25).as_float(), Some(0.25));
        assert_eq!(ChannelValue::Int(3).as_text(), "3");
        assert!(!ChannelValue::Int(0).is_set());
        assert!(!ChannelValue::Text("  ".into()).is_set());
        assert!(ChannelValue::Text("1A16".into()).is_set());
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(ChannelValue::parse_loose("1"), ChannelValue::Int(1));
        assert_eq!(ChannelValue::parse_loose("0.5"), ChannelValue::Float(0.5));
        assert_eq!(ChannelValue::parse_loose("1A16"), ChannelValue::Text("1A16".into()));
    }

    #[test]
    fn test_board_put_only_fires_on_change() {
        let board = ChannelBoard::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        board.subscribe(
            names::STATUS,
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(board.put(names::STATUS, 2i64));
        assert!(!board.put(names::STATUS, 2i64));
        assert!(board.put(names::STATUS, 0i64));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(board.get(names::STATUS), Some(ChannelValue::Int(0)));
    }

    #[test]
    fn test_define_does_not_fire() {
        let board = ChannelBoard::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        board.subscribe(
            names::ENABLED,
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        board.define(names::ENABLED, 1i64);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(board.names(), vec![names::ENABLED.to_string()]);
    }

    #[test]
    fn test_callback_may_reenter_board() {
        let board = Arc::new(ChannelBoard::new());
        let inner = Arc::downgrade(&board);
        board.subscribe(
            names::CMD_RESET,
            Arc::new(move |name, value| {
                if value.is_set()
                    && let Some(board) = inner.upgrade()
                {
                    board.put(name, 0i64);
                }
            }),
        );
        board.put(names::CMD_RESET, 1i64);
        assert_eq!(board.get(names::CMD_RESET), Some(ChannelValue::Int(0)));
    }
}
