//! 操作员意图 → 设备命令
//!
//! 每个意图依次检查就绪、装载互斥、所在位置与当前工具。检查失败时设置带时间戳
//! 的警告（和帮助），不产生任何 IO，返回 [`Outcome::Rejected`]。

use crate::params::OperatorParams;
use crate::preconditions::{self, Rejection};
use isara_driver::channels::names;
use isara_driver::{CommandQueue, IsaraContext, RobotState, SaveOutcome};
use isara_protocol::{
    Command, PortArgs, ToolType, TransferArgs, UNDEFINED_POSITION, port_to_args,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// 可执行传输轨迹的工具
const TRANSFER_TOOLS: [ToolType; 4] = [
    ToolType::Unipuck,
    ToolType::Rotating,
    ToolType::Double,
    ToolType::Plate,
];

/// 可浸泡 / 干燥的工具
const SOAK_TOOLS: [ToolType; 3] = [ToolType::Double, ToolType::Unipuck, ToolType::Rotating];

/// 意图执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 命令已进入发件箱（或本地操作已完成）
    Sent,
    /// 前置检查失败，附带警告文本
    Rejected(String),
    /// 装载互斥已被占用
    Busy,
    /// 控制器未就绪，命令被丢弃
    NotReady,
    /// 参数为空或为 0，不做任何事
    Skipped,
}

impl Outcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Outcome::Sent)
    }
}

/// 控制器设置项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    MaxSoakTime,
    MaxSoakNb,
    AutoCloseLidTimer,
    AutoDryTimer,
    HighLn2,
    LowLn2,
}

impl Setter {
    pub fn keyword(self) -> &'static str {
        match self {
            Setter::MaxSoakTime => "setmaxsoaktime",
            Setter::MaxSoakNb => "setmaxsoaknb",
            Setter::AutoCloseLidTimer => "setautocloselidtimer",
            Setter::AutoDryTimer => "setautodrytimer",
            Setter::HighLn2 => "sethighln2",
            Setter::LowLn2 => "setlowln2",
        }
    }
}

// 前置检查失败时直接返回
macro_rules! check {
    ($e:expr) => {
        if let Err(outcome) = $e {
            return outcome;
        }
    };
}

/// 意图分发器
pub struct Dispatcher {
    ctx: Arc<IsaraContext>,
    queue: CommandQueue,
    params: RwLock<OperatorParams>,
    // 控制器不上报这两项，按最后一次下发的命令锁存
    heater: AtomicBool,
    remote_speed: AtomicBool,
}

impl Dispatcher {
    pub fn new(queue: CommandQueue) -> Self {
        Self {
            ctx: queue.context().clone(),
            queue,
            params: RwLock::new(OperatorParams::default()),
            heater: AtomicBool::new(false),
            remote_speed: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<IsaraContext> {
        &self.ctx
    }

    /// 当前参数（副本）
    pub fn params(&self) -> OperatorParams {
        self.params.read().clone()
    }

    /// 修改参数
    pub fn update_params(&self, f: impl FnOnce(&mut OperatorParams)) {
        f(&mut self.params.write());
    }

    // === 内部工具 ===

    fn robot(&self) -> Arc<RobotState> {
        self.ctx.snapshot()
    }

    fn tool_code(&self) -> u8 {
        self.robot().tool.code()
    }

    fn send(&self, command: Command) -> Outcome {
        if self.queue.submit(command) {
            Outcome::Sent
        } else {
            Outcome::NotReady
        }
    }

    fn traj<I, T>(&self, name: &str, args: I) -> Outcome
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.send(Command::trajectory(name).args(args))
    }

    fn reject(&self, rejection: Rejection) -> Outcome {
        debug!("Command rejected: {}", rejection.warning);
        self.ctx.warn(&rejection.warning);
        if let Some(help) = &rejection.help {
            self.ctx.set_help(help);
        }
        Outcome::Rejected(rejection.warning)
    }

    fn require_position(&self, allowed: &[&str]) -> Result<(), Outcome> {
        let current = self.robot().position.clone();
        preconditions::require_position(self.ctx.positions.is_empty(), &current, allowed)
            .map_err(|r| self.reject(r))
    }

    fn require_tool(&self, allowed: &[ToolType]) -> Result<(), Outcome> {
        preconditions::require_tool(self.robot().tool, allowed).map_err(|r| self.reject(r))
    }

    fn require_ready(&self) -> Result<(), Outcome> {
        if self.ctx.ready_for_commands() {
            Ok(())
        } else {
            Err(Outcome::NotReady)
        }
    }

    /// 占用装载互斥；失败时返回 `Busy`
    fn begin_mounting(&self) -> Result<(), Outcome> {
        if self.ctx.flags.try_begin_mounting() {
            Ok(())
        } else {
            debug!("Mount/dismount already in progress");
            Err(Outcome::Busy)
        }
    }

    /// 命令没有发出时释放装载互斥
    fn settle_mounting(&self, outcome: Outcome) -> Outcome {
        if !outcome.is_sent() {
            self.ctx.flags.end_mounting();
        }
        outcome
    }

    /// 按端口设置工具与样品参数，并同步到 `PAR:*` 通道
    fn apply_port(&self, args: PortArgs) {
        {
            let mut params = self.params.write();
            params.tool = args.tool();
            match args {
                PortArgs::Puck { puck, sample, .. } => {
                    params.puck = puck;
                    params.sample = sample;
                },
                PortArgs::Plate { plate, .. } => params.plate = plate,
            }
        }
        self.ctx.publish(names::PAR_TOOL, args.tool().code());
        match args {
            PortArgs::Puck { puck, sample, .. } => {
                self.ctx.publish(names::PAR_PUCK, puck);
                self.ctx.publish(names::PAR_SAMPLE, sample);
            },
            PortArgs::Plate { plate, .. } => self.ctx.publish(names::PAR_PLATE, plate),
        }
    }

    // === 装载 / 卸载 ===

    /// 装载 `next_port` 指定的样品
    ///
    /// 衍射仪上没有样品时发 `put`，否则发 `getput`。
    pub fn mount(&self) -> Outcome {
        check!(self.require_ready());
        check!(self.require_position(&["SOAK"]));
        check!(self.begin_mounting());

        let port = self.params.read().next_port.trim().to_string();
        let Some(args) = port_to_args(&port).filter(PortArgs::is_complete) else {
            self.ctx.flags.end_mounting();
            return self.reject(Rejection::new(format!("Invalid Port for mounting: {port}")));
        };
        self.apply_port(args);

        info!("Mounting {}", port);
        let outcome = if self.robot().has_sample_mounted() {
            self.getput()
        } else {
            self.put()
        };
        self.settle_mounting(outcome)
    }

    /// 卸载衍射仪上的样品
    pub fn dismount(&self) -> Outcome {
        check!(self.require_ready());
        check!(self.require_position(&["SOAK"]));
        check!(self.begin_mounting());

        let mounted = self.robot().mounted.trim().to_string();
        let Some(args) = port_to_args(&mounted).filter(PortArgs::is_complete) else {
            self.ctx.flags.end_mounting();
            return self.reject(Rejection::new("Invalid port or sample not mounted"));
        };
        self.update_params(|p| p.tool = args.tool());
        self.ctx.publish(names::PAR_TOOL, args.tool().code());

        info!("Dismounting {}", mounted);
        let outcome = self.get();
        self.settle_mounting(outcome)
    }

    // === 传输轨迹 ===

    pub fn put(&self) -> Outcome {
        check!(self.require_position(&["SOAK"]));
        check!(self.require_tool(&TRANSFER_TOOLS));
        let params = self.params();
        if self.robot().tool.is_puck_tool() {
            self.traj("put", params.transfer_args().to_args())
        } else {
            self.traj("putplate", [params.tool.code() as i64, params.plate])
        }
    }

    pub fn get(&self) -> Outcome {
        check!(self.require_position(&["SOAK"]));
        check!(self.require_tool(&TRANSFER_TOOLS));
        let params = self.params();
        if self.robot().tool.is_puck_tool() {
            let args = TransferArgs {
                tool: params.tool,
                datamatrix_scan: params.datamatrix_scan,
                ..Default::default()
            };
            self.traj("get", args.to_args())
        } else {
            self.traj("getplate", [params.tool.code()])
        }
    }

    pub fn getput(&self) -> Outcome {
        check!(self.require_position(&["SOAK"]));
        check!(self.require_tool(&TRANSFER_TOOLS));
        let params = self.params();
        if self.robot().tool.is_puck_tool() {
            self.traj("getput", params.transfer_args().to_args())
        } else {
            self.traj("getplate", [params.tool.code()])
        }
    }

    // === 简单命令 ===

    pub fn power(&self) -> Outcome {
        let command = if self.robot().power { "off" } else { "on" };
        self.send(Command::new(command))
    }

    pub fn reboot(&self) -> Outcome {
        self.send(Command::new("resetprogram"))
    }

    pub fn panic(&self) -> Outcome {
        self.send(Command::new("panic"))
    }

    /// 中止当前轨迹并释放装载互斥
    pub fn abort(&self) -> Outcome {
        let outcome = self.send(Command::new("abort"));
        self.ctx.flags.set_aborted(true);
        self.ctx.flags.end_mounting();
        outcome
    }

    pub fn pause(&self) -> Outcome {
        self.send(Command::new("pause"))
    }

    /// 复位控制器，清空故障寄存器、警告与帮助
    pub fn reset(&self) -> Outcome {
        let outcome = self.send(Command::new("reset"));
        self.ctx.clear_faults();
        self.ctx.flags.end_mounting();
        outcome
    }

    pub fn restart(&self) -> Outcome {
        self.send(Command::new("restart"))
    }

    pub fn clear_barcode(&self) -> Outcome {
        self.send(Command::new("clearbcrd"))
    }

    pub fn lid(&self, open: bool) -> Outcome {
        self.send(Command::new(if open { "openlid" } else { "closelid" }))
    }

    pub fn tool(&self, open: bool) -> Outcome {
        self.send(Command::new(if open { "opentool" } else { "closetool" }))
    }

    pub fn toolb(&self, open: bool) -> Outcome {
        self.send(Command::new(if open { "opentoolb" } else { "closetoolb" }))
    }

    pub fn faster(&self) -> Outcome {
        self.send(Command::new("speedup"))
    }

    pub fn slower(&self) -> Outcome {
        self.send(Command::new("speeddown"))
    }

    // === 开关 ===

    pub fn magnet(&self) -> Outcome {
        let command = if self.robot().magnet { "magnetoff" } else { "magneton" };
        self.send(Command::new(command))
    }

    pub fn heater(&self) -> Outcome {
        self.toggle_latched(&self.heater, "heateroff", "heateron", names::STATE_HEATER)
    }

    pub fn remote_speed(&self) -> Outcome {
        self.toggle_latched(
            &self.remote_speed,
            "remotespeedoff",
            "remotespeedon",
            names::STATE_REMOTE_SPEED,
        )
    }

    fn toggle_latched(&self, latch: &AtomicBool, off: &str, on: &str, channel: &str) -> Outcome {
        let active = latch.load(Ordering::Acquire);
        let outcome = self.send(Command::new(if active { off } else { on }));
        if outcome.is_sent() {
            latch.store(!active, Ordering::Release);
            self.ctx.publish(channel, !active);
        }
        outcome
    }

    pub fn approach(&self) -> Outcome {
        let robot = self.robot();
        let command = if robot.approach { "cryoOFF" } else { "cryoON" };
        self.send(Command::new(command).arg(robot.tool.code()))
    }

    pub fn running(&self) -> Outcome {
        let robot = self.robot();
        let command = if robot.running { "trajOFF" } else { "trajON" };
        self.send(Command::new(command).arg(robot.tool.code()))
    }

    pub fn autofill(&self) -> Outcome {
        let command = if self.robot().autofill { "reguloff" } else { "regulon" };
        self.send(Command::new(command))
    }

    // === 运动 ===

    pub fn home(&self) -> Outcome {
        check!(self.require_position(&["SOAK", "HOME", UNDEFINED_POSITION]));
        self.traj("home", [self.tool_code()])
    }

    pub fn recover(&self) -> Outcome {
        self.traj("recover", [self.tool_code()])
    }

    pub fn safe(&self) -> Outcome {
        self.send(Command::new("safe").arg(self.tool_code()))
    }

    pub fn change_tool(&self) -> Outcome {
        check!(self.require_position(&["HOME"]));
        let requested = self.params.read().tool;
        if requested == self.robot().tool {
            return self.reject(Rejection::new(
                "Requested tool already present, command ignored",
            ));
        }
        self.traj("changetool", [requested.code()])
    }

    pub fn barcode(&self) -> Outcome {
        check!(self.require_position(&["SOAK"]));
        let p = self.params();
        self.traj(
            "datamatrix",
            [p.tool.code() as i64, p.puck, p.sample, 0, 0, 0, p.sample_type.code() as i64],
        )
    }

    pub fn back(&self) -> Outcome {
        check!(self.require_position(&["SOAK"]));
        if !self.robot().has_sample_on_tool() {
            return self.reject(Rejection::new("No sample on tool, command ignored"));
        }
        self.traj("back", [self.tool_code()])
    }

    pub fn soak(&self) -> Outcome {
        check!(self.require_position(&["HOME"]));
        check!(self.require_tool(&SOAK_TOOLS));
        self.traj("soak", [self.tool_code()])
    }

    pub fn dry(&self) -> Outcome {
        check!(self.require_position(&["SOAK", "HOME"]));
        check!(self.require_tool(&SOAK_TOOLS));
        self.traj("dry", [self.tool_code()])
    }

    pub fn pick(&self) -> Outcome {
        check!(self.require_tool(&[ToolType::Double]));
        let p = self.params();
        self.traj(
            "pick",
            [
                p.tool.code() as i64,
                p.puck,
                p.sample,
                p.datamatrix_scan.code() as i64,
                0,
                0,
                p.sample_type.code() as i64,
            ],
        )
    }

    // === 标定 ===

    pub fn calibrate(&self) -> Outcome {
        check!(self.require_position(&["HOME"]));
        check!(self.require_tool(&[ToolType::Laser, ToolType::Double]));
        self.traj("toolcal", [self.tool_code()])
    }

    pub fn teach_gonio(&self) -> Outcome {
        check!(self.require_position(&["HOME"]));
        check!(self.require_tool(&[ToolType::Laser]));
        self.traj("teachgonio", [ToolType::Laser.code()])
    }

    pub fn teach_puck(&self) -> Outcome {
        check!(self.require_tool(&[ToolType::Laser]));
        check!(self.require_position(&["HOME"]));
        let puck = self.params.read().puck;
        if puck == 0 {
            return self.reject(Rejection::new("Please select a puck number"));
        }
        self.traj("teachpuck", [ToolType::Laser.code() as i64, puck])
    }

    pub fn teach_dewar(&self) -> Outcome {
        check!(self.require_tool(&[ToolType::Laser]));
        check!(self.require_position(&["HOME"]));
        let puck = self.params.read().puck;
        self.traj("teachdewar", [ToolType::Laser.code() as i64, puck])
    }

    // === 样品记录修正 ===

    /// 解析 `next_port` 为样品盘地址
    fn next_sample_port(&self) -> Result<(i64, i64), Outcome> {
        let port = self.params.read().next_port.trim().to_string();
        if port.is_empty() {
            return Err(self.reject(Rejection::new("No Sample specified")));
        }
        match port_to_args(&port) {
            Some(PortArgs::Puck { puck, sample, .. }) => Ok((puck, sample)),
            _ => Err(self.reject(Rejection::new(format!("Invalid port: {port}")))),
        }
    }

    pub fn set_diff_sample(&self) -> Outcome {
        let (puck, sample) = match self.next_sample_port() {
            Ok(port) => port,
            Err(outcome) => return outcome,
        };
        let sample_type = self.params.read().sample_type;
        self.send(Command::new("setdiffr").args([puck, sample, sample_type.code() as i64]))
    }

    pub fn set_tool_sample(&self) -> Outcome {
        let (puck, sample) = match self.next_sample_port() {
            Ok(port) => port,
            Err(outcome) => return outcome,
        };
        check!(self.require_tool(&[ToolType::Double]));
        let p = self.params();
        self.send(Command::new("settool").args([
            puck,
            sample,
            p.sample_type.code() as i64,
            p.jaw.code() as i64,
        ]))
    }

    pub fn set_toolb_sample(&self) -> Outcome {
        check!(self.require_tool(&[ToolType::Double]));
        let (puck, sample) = match self.next_sample_port() {
            Ok(port) => port,
            Err(outcome) => return outcome,
        };
        let sample_type = self.params.read().sample_type;
        self.send(Command::new("settool2").args([puck, sample, sample_type.code() as i64]))
    }

    // === 设置 ===

    /// 记录设置值并下发；值为 0 时只记录
    pub fn set(&self, setter: Setter, value: i64) -> Outcome {
        self.update_params(|p| match setter {
            Setter::MaxSoakTime => p.max_soak_time = value,
            Setter::MaxSoakNb => p.max_soak_nb = value,
            Setter::AutoCloseLidTimer => p.auto_close_lid_timer = value,
            Setter::AutoDryTimer => p.auto_dry_timer = value,
            Setter::HighLn2 => p.high_ln2 = value,
            Setter::LowLn2 => p.low_ln2 = value,
        });
        if value == 0 {
            return Outcome::Skipped;
        }
        self.send(Command::new(setter.keyword()).arg(value))
    }

    pub fn clear_memory(&self) -> Outcome {
        self.send(Command::new("clearmemory"))
    }

    pub fn reset_params(&self) -> Outcome {
        self.send(Command::new("reset parameters"))
    }

    pub fn reset_motion(&self) -> Outcome {
        self.send(Command::new("resetMotion"))
    }

    // === 位置 ===

    /// 以当前位姿保存 `pos_name`
    ///
    /// 无论结果如何，名字与覆盖标志都会被复位。
    pub fn save_position(&self) -> Outcome {
        let params = self.params();
        let pose = self.robot().pose;
        let result = self.ctx.positions.save(
            &params.pos_name,
            params.pos_tolerance,
            params.pos_force,
            &pose,
        );

        self.update_params(|p| {
            p.pos_name.clear();
            p.pos_force = false;
        });
        self.ctx.publish(names::PAR_POS_FORCE, false);
        self.ctx.publish(names::PAR_POS_NAME, "");

        match result {
            Ok(SaveOutcome::Saved(path)) => {
                info!("Position file updated: {}", path.display());
                Outcome::Sent
            },
            Ok(SaveOutcome::Exists(name)) => {
                debug!("Position {} exists, not overwritten", name);
                Outcome::Skipped
            },
            Ok(SaveOutcome::Ignored) => Outcome::Skipped,
            Err(e) => {
                error!("Failed to save position: {}", e);
                self.reject(Rejection::new(format!("Unable to save position: {e}")))
            },
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("params", &*self.params.read())
            .field("heater", &self.heater.load(Ordering::Relaxed))
            .field("remote_speed", &self.remote_speed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
