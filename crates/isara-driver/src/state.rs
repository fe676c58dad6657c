//! 状态结构定义
//!
//! - [`RobotState`]：由接收线程独占写入，通过 `ArcSwap` 发布快照，读者无锁
//! - [`OperationFlags`]：跨线程的操作标志（装载互斥、中止、故障、待机）
//! - [`IsaraContext`]：所有线程共享的上下文

use crate::channels::{ChannelSink, ChannelValue, names};
use crate::metrics::BridgeMetrics;
use crate::positions::{Pose, PositionBook};
use arc_swap::ArcSwap;
use isara_protocol::{
    CryoLevel, FaultRegister, Health, ModeType, SlotBits, StatusContext, StatusType, ToolType,
    UNDEFINED_POSITION,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

/// 机器人状态模型
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    // === state 帧 ===
    pub power: bool,
    pub mode: ModeType,
    /// 控制器上报的故障标志
    pub fault: bool,
    pub tool: ToolType,
    /// 控制器上报的位置名（state 第 4 个字段）
    pub device_position: String,
    pub path: String,
    pub gripper_a: i64,
    pub gripper_b: i64,
    pub puck_a: i64,
    pub sample_a: i64,
    pub puck_b: i64,
    pub sample_b: i64,
    pub puck_diff: i64,
    pub sample_diff: i64,
    /// 夹具上的样品板（0 = 无）
    pub plate: i64,
    pub barcode: String,
    pub running: bool,
    /// 速度比例（%）
    pub speed: f64,
    pub autofill: bool,
    pub soak_count: i64,
    pub ln2_current: f64,
    pub ln2_high: f64,
    pub ln2_low: f64,
    /// 干燥阶段（0 = 未干燥）
    pub drying: i64,

    // === position 帧 ===
    pub pose: Pose,

    // === di / do 帧 ===
    pub inputs: [u16; 4],
    pub outputs: [u16; 4],
    pub trajectory: bool,
    pub tool_open: bool,
    pub toolb_open: bool,
    pub emergency_ok: bool,
    pub collision_ok: bool,
    pub sample_detected: bool,
    pub cryo_level: CryoLevel,
    pub gonio_ready: bool,
    pub cryojet: bool,
    pub magnet: bool,
    pub approach: bool,
    pub pucks: SlotBits,

    // === 派生视图 ===
    pub status: StatusType,
    pub health: Health,
    pub errors: FaultRegister,
    /// 匹配到的命名位置（未匹配时为 `Undefined`）
    pub position: String,
    /// 衍射仪上的样品端口
    pub mounted: String,
    /// 爪 A 上的样品端口
    pub on_tool: String,
    /// 最近一条面向操作员的自由文本
    pub message: String,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            power: false,
            mode: ModeType::default(),
            fault: false,
            tool: ToolType::default(),
            device_position: String::new(),
            path: String::new(),
            gripper_a: -1,
            gripper_b: -1,
            puck_a: -1,
            sample_a: -1,
            puck_b: -1,
            sample_b: -1,
            puck_diff: -1,
            sample_diff: -1,
            plate: 0,
            barcode: String::new(),
            running: false,
            speed: 0.0,
            autofill: false,
            soak_count: 0,
            ln2_current: 0.0,
            ln2_high: 0.0,
            ln2_low: 0.0,
            drying: 0,
            pose: Pose::default(),
            inputs: [0; 4],
            outputs: [0; 4],
            trajectory: false,
            tool_open: false,
            toolb_open: false,
            emergency_ok: false,
            collision_ok: false,
            sample_detected: false,
            cryo_level: CryoLevel::default(),
            gonio_ready: false,
            cryojet: false,
            magnet: false,
            approach: false,
            pucks: SlotBits::default(),
            status: StatusType::default(),
            health: Health::default(),
            errors: FaultRegister::default(),
            position: UNDEFINED_POSITION.to_string(),
            mounted: String::new(),
            on_tool: String::new(),
            message: String::new(),
        }
    }
}

impl RobotState {
    /// 爪 A 上是否有样品
    pub fn has_sample_on_tool(&self) -> bool {
        !self.on_tool.trim().is_empty()
    }

    pub fn has_sample_mounted(&self) -> bool {
        !self.mounted.trim().is_empty()
    }
}

/// 跨线程操作标志
#[derive(Debug, Default)]
pub struct OperationFlags {
    mounting: AtomicBool,
    aborted: AtomicBool,
    fault_active: AtomicBool,
    standby_active: AtomicBool,
}

impl OperationFlags {
    /// 尝试占用装载互斥，已被占用时返回 false
    pub fn try_begin_mounting(&self) -> bool {
        self.mounting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_mounting(&self) {
        self.mounting.store(false, Ordering::Release);
    }

    pub fn is_mounting(&self) -> bool {
        self.mounting.load(Ordering::Acquire)
    }

    pub fn set_aborted(&self, aborted: bool) {
        self.aborted.store(aborted, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn set_fault_active(&self, active: bool) {
        self.fault_active.store(active, Ordering::Release);
    }

    pub fn is_fault_active(&self) -> bool {
        self.fault_active.load(Ordering::Acquire)
    }

    /// 读取并复位故障标志（每个 state 帧调用一次）
    pub fn take_fault_active(&self) -> bool {
        self.fault_active.swap(false, Ordering::AcqRel)
    }

    pub fn set_standby(&self, active: bool) {
        self.standby_active.store(active, Ordering::Release);
    }

    pub fn is_standby(&self) -> bool {
        self.standby_active.load(Ordering::Acquire)
    }
}

const NO_REPLY: u8 = u8::MAX;

/// 共享上下文
pub struct IsaraContext {
    /// 机器人状态快照（接收线程写入）
    pub robot: ArcSwap<RobotState>,
    pub flags: OperationFlags,
    pub positions: PositionBook,
    pub metrics: Arc<BridgeMetrics>,
    sink: Arc<dyn ChannelSink>,
    warning: RwLock<String>,
    help: RwLock<String>,
    faults: AtomicU32,
    ready: AtomicBool,
    connected: AtomicBool,
    enabled: AtomicBool,
    last_reply: AtomicU8,
}

impl IsaraContext {
    pub fn new(sink: Arc<dyn ChannelSink>, positions: PositionBook) -> Self {
        Self {
            robot: ArcSwap::from_pointee(RobotState::default()),
            flags: OperationFlags::default(),
            positions,
            metrics: Arc::new(BridgeMetrics::new()),
            sink,
            warning: RwLock::new(String::new()),
            help: RwLock::new(String::new()),
            faults: AtomicU32::new(0),
            ready: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            last_reply: AtomicU8::new(NO_REPLY),
        }
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> Arc<RobotState> {
        self.robot.load_full()
    }

    pub fn publish(&self, name: &str, value: impl Into<ChannelValue>) {
        self.sink.publish(name, value.into());
    }

    // === 警告 / 帮助 ===

    /// 设置带时间戳的警告（覆盖上一条）
    pub fn warn(&self, message: &str) {
        let text = format!("{} {}", chrono::Local::now().format("%b/%d %H:%M:%S"), message);
        *self.warning.write() = text.clone();
        self.publish(names::WARNING, text);
    }

    pub fn clear_warning(&self) {
        self.warning.write().clear();
        self.publish(names::WARNING, "");
    }

    pub fn set_help(&self, help: &str) {
        *self.help.write() = help.to_string();
        self.publish(names::HELP, help);
    }

    pub fn clear_help(&self) {
        self.set_help("");
    }

    pub fn warning(&self) -> String {
        self.warning.read().clone()
    }

    pub fn help(&self) -> String {
        self.help.read().clone()
    }

    // === 故障寄存器 ===

    pub fn faults(&self) -> FaultRegister {
        FaultRegister::from_raw(self.faults.load(Ordering::Acquire))
    }

    /// 写入故障寄存器，变化时发布并刷新警告/帮助
    pub fn apply_faults(&self, register: FaultRegister) -> bool {
        let previous = self.faults.swap(register.raw(), Ordering::AcqRel);
        if previous == register.raw() {
            return false;
        }
        self.publish(names::STATE_ERROR, register.raw());

        if register.is_empty() {
            self.clear_help();
        } else {
            let warning = register.warning_text();
            if !warning.is_empty() {
                self.warn(&warning);
            }
            let help = register.help_text();
            if !help.is_empty() {
                self.set_help(&help);
            }
        }
        true
    }

    /// 清空故障寄存器、警告和帮助（reset）
    pub fn clear_faults(&self) {
        self.faults.store(0, Ordering::Release);
        self.publish(names::STATE_ERROR, 0i64);
        self.clear_help();
        self.clear_warning();
    }

    // === 连接状态 ===

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        self.publish(names::CONNECTED, connected);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// 是否可以下发命令
    pub fn ready_for_commands(&self) -> bool {
        self.is_ready() && self.is_enabled() && self.is_connected()
    }

    // === 轮询应答 ===

    pub fn mark_reply(&self, context: StatusContext) {
        self.last_reply.store(context.into(), Ordering::Release);
    }

    pub fn clear_reply(&self) {
        self.last_reply.store(NO_REPLY, Ordering::Release);
    }

    pub fn last_reply(&self) -> Option<StatusContext> {
        StatusContext::try_from(self.last_reply.load(Ordering::Acquire)).ok()
    }
}

impl std::fmt::Debug for IsaraContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsaraContext")
            .field("ready", &self.is_ready())
            .field("connected", &self.is_connected())
            .field("enabled", &self.is_enabled())
            .field("faults", &self.faults())
            .finish_non_exhaustive()
    }
}
