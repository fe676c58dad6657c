//! 状态解析与状态机
//!
//! 接收线程把收件箱中的每条消息交给 [`StatusProcessor`]。处理器持有
//! [`RobotState`] 的唯一可写副本，处理完一条消息后整体发布到 `ArcSwap`。
//!
//! 通道发布经过一层缓存：值没有变化时不重复发布。

use crate::channels::{ChannelValue, names};
use crate::faults::{ErrorDecoder, UnmatchedPolicy};
use crate::inventory::PuckInventory;
use crate::queue::CommandQueue;
use crate::state::{IsaraContext, RobotState};
use isara_link::{InboundMessage, MessageKind};
use isara_protocol::{
    Command, DigitalInputs, DigitalOutputs, ProtocolError, SlotBits, StateField, StatusContext,
    StatusLine, StatusType, ToolType, UNDEFINED_POSITION, args_to_port, minus_int, parse_float,
    parse_int, plate_to_port,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, trace, warn};

const PUCK_REMOVED_WARNING: &str =
    "Target puck removed while mounting. Aborting! Manual recovery required.";

/// 处理器配置
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorConfig {
    /// 未匹配目录的故障行处理方式
    pub unmatched_fault_line: UnmatchedPolicy,
    /// 控制器不上报样品盘检测时，视为 29 个槽位全部在位
    pub assume_all_pucks: bool,
}

/// 根据状态帧计算对外状态
///
/// 优先级：故障 > 待机 > 忙 > 空闲 > 保持；干燥优先于以上全部。
pub fn derive_status(robot: &RobotState, fault_active: bool, standby: bool) -> StatusType {
    let next = if fault_active {
        StatusType::Fault
    } else if robot.running && standby {
        StatusType::Standby
    } else if robot.running && robot.trajectory {
        StatusType::Busy
    } else if !robot.running {
        StatusType::Idle
    } else {
        robot.status
    };

    if robot.drying > 0 { StatusType::Drying } else { next }
}

/// 状态处理器
pub struct StatusProcessor {
    ctx: Arc<IsaraContext>,
    queue: CommandQueue,
    decoder: ErrorDecoder,
    inventory: PuckInventory,
    assume_all_pucks: bool,
    state: RobotState,
    published: HashMap<&'static str, ChannelValue>,
}

impl StatusProcessor {
    pub fn new(ctx: Arc<IsaraContext>, queue: CommandQueue, config: ProcessorConfig) -> Self {
        let state = (*ctx.snapshot()).clone();
        Self {
            ctx,
            queue,
            decoder: ErrorDecoder::new(config.unmatched_fault_line),
            inventory: PuckInventory::new(),
            assume_all_pucks: config.assume_all_pucks,
            state,
            published: HashMap::new(),
        }
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    pub fn inventory(&self) -> &PuckInventory {
        &self.inventory
    }

    /// 处理一条入站消息并发布新的状态快照
    pub fn process(&mut self, message: &InboundMessage) {
        match message.kind {
            MessageKind::Response => self.ctx.publish(names::LOG, message.line.as_str()),
            MessageKind::Status => self.process_status(&message.line),
        }
        self.state.errors = self.ctx.faults();
        self.ctx.robot.store(Arc::new(self.state.clone()));
    }

    fn process_status(&mut self, line: &str) {
        match StatusLine::parse(line) {
            StatusLine::Framed { context, payload } => {
                trace!("{}: {}", context, payload);
                match context {
                    StatusContext::State => self.apply_state(payload),
                    StatusContext::Position => self.apply_position(payload),
                    StatusContext::Di => self.apply_inputs(payload),
                    StatusContext::Do => self.apply_outputs(payload),
                    StatusContext::Message => self.ctx.publish(names::LOG, payload),
                }
                self.ctx.mark_reply(context);
            },
            StatusLine::Unknown { context, .. } => {
                debug!("Ignoring unknown status context: {}", context);
            },
            StatusLine::FreeText(text) => {
                self.apply_free_text(text);
                self.ctx.mark_reply(StatusContext::Message);
            },
        }
    }

    /// 仅在值变化时发布
    fn emit(&mut self, name: &'static str, value: impl Into<ChannelValue>) {
        let value = value.into();
        if self.published.get(name) == Some(&value) {
            return;
        }
        self.published.insert(name, value.clone());
        self.ctx.publish(name, value);
    }

    fn parse_error(&self, what: &str, line: &str, err: &ProtocolError) {
        warn!("Unable to parse {}: {} ({})", what, line, err);
        self.ctx.metrics.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    // === state ===

    fn apply_state(&mut self, payload: &str) {
        for (index, raw) in payload.split(',').enumerate() {
            let Some((field, _)) = StateField::at(index) else {
                continue;
            };
            if let Err(e) = self.apply_state_field(field, raw.trim()) {
                self.parse_error("state", payload, &e);
            }
        }

        self.publish_state_fields();
        self.update_sample_labels();
        self.update_status();
    }

    fn apply_state_field(&mut self, field: StateField, raw: &str) -> Result<(), ProtocolError> {
        let s = &mut self.state;
        match field {
            StateField::Power => s.power = parse_int(raw)? != 0,
            StateField::Mode => s.mode = isara_protocol::ModeType::from_code(parse_int(raw)?)?,
            StateField::Fault => s.fault = parse_int(raw)? != 0,
            StateField::Tool => s.tool = ToolType::from_name(raw),
            StateField::Position => s.device_position = raw.to_string(),
            StateField::Path => s.path = raw.to_string(),
            StateField::GripperTool => s.gripper_a = minus_int(raw),
            StateField::GripperToolB => s.gripper_b = minus_int(raw),
            StateField::PuckTool => s.puck_a = minus_int(raw),
            StateField::SampleTool => s.sample_a = minus_int(raw),
            StateField::PuckToolB => s.puck_b = minus_int(raw),
            StateField::SampleToolB => s.sample_b = minus_int(raw),
            StateField::PuckDiff => s.puck_diff = minus_int(raw),
            StateField::SampleDiff => s.sample_diff = minus_int(raw),
            StateField::Plate => s.plate = minus_int(raw),
            StateField::Barcode => s.barcode = raw.to_string(),
            StateField::Running => s.running = parse_int(raw)? != 0,
            StateField::Speed => s.speed = parse_float(raw)?,
            StateField::Autofill => s.autofill = parse_int(raw)? != 0,
            StateField::SoakCount => s.soak_count = parse_int(raw)?,
            StateField::CurrentLn2 => s.ln2_current = parse_float(raw)?,
            StateField::HighLn2 => s.ln2_high = parse_float(raw)?,
            StateField::LowLn2 => s.ln2_low = parse_float(raw)?,
            StateField::Drying => s.drying = parse_int(raw)?,
        }
        Ok(())
    }

    fn publish_state_fields(&mut self) {
        let s = self.state.clone();
        self.emit(names::STATE_POWER, s.power);
        self.emit(names::STATE_MODE, s.mode.code());
        self.emit(names::STATE_FAULT, s.fault);
        self.emit(names::STATE_TOOL, s.tool.code());
        self.emit(names::STATE_DEVICE_POS, s.device_position);
        self.emit(names::STATE_PATH, s.path);
        self.emit(names::STATE_GRIPPER_TOOL, s.gripper_a);
        self.emit(names::STATE_GRIPPER_TOOLB, s.gripper_b);
        self.emit(names::STATE_TOOL_PUCK, s.puck_a);
        self.emit(names::STATE_TOOL_SAMPLE, s.sample_a);
        self.emit(names::STATE_TOOLB_PUCK, s.puck_b);
        self.emit(names::STATE_TOOLB_SAMPLE, s.sample_b);
        self.emit(names::STATE_DIFF_PUCK, s.puck_diff);
        self.emit(names::STATE_DIFF_SAMPLE, s.sample_diff);
        self.emit(names::STATE_PLATE, s.plate);
        self.emit(names::STATE_BARCODE, s.barcode);
        self.emit(names::STATE_RUNNING, s.running);
        self.emit(names::STATE_SPEED, s.speed);
        self.emit(names::STATE_AUTOFILL, s.autofill);
        self.emit(names::STATE_SOAK_COUNT, s.soak_count);
        self.emit(names::STATE_CURRENT_LN2, s.ln2_current);
        self.emit(names::STATE_HIGH_LN2, s.ln2_high);
        self.emit(names::STATE_LOW_LN2, s.ln2_low);
        self.emit(names::STATE_DRYING, s.drying);
    }

    /// 衍射仪 / 夹具上的样品端口
    ///
    /// 夹具持有样品板时，夹具端口取样品板编号。
    fn update_sample_labels(&mut self) {
        let mounted = args_to_port(self.state.puck_diff, self.state.sample_diff);
        if mounted != self.state.mounted {
            debug!("Mounted sample changed: {:?} -> {:?}", self.state.mounted, mounted);
            self.state.mounted = mounted.clone();
            self.emit(names::STATE_ON_DIFF, mounted);
            // 已装载的样品变化后，待装载端口作废
            self.ctx.publish(names::PAR_NEXT_PORT, "");
        }

        let on_tool = if self.state.plate > 0 {
            plate_to_port(self.state.plate)
        } else {
            args_to_port(self.state.puck_a, self.state.sample_a)
        };
        if on_tool != self.state.on_tool {
            self.state.on_tool = on_tool.clone();
            self.emit(names::STATE_ON_TOOL, on_tool);
        }
    }

    fn update_status(&mut self) {
        let fault_active = self.ctx.flags.take_fault_active();
        let standby = self.ctx.flags.is_standby();
        let next = derive_status(&self.state, fault_active, standby);

        let entered = next != self.state.status;
        if entered {
            debug!("Status {:?} -> {:?}", self.state.status, next);
            self.state.status = next;
            self.emit(names::STATUS, next.code());
        }

        if next == StatusType::Idle {
            self.ctx.flags.end_mounting();
            if entered && !self.ctx.faults().is_empty() {
                info!("Robot idle with active errors, issuing reset");
                self.queue.submit(Command::new("reset"));
                self.ctx.clear_faults();
            }
        }
    }

    // === position ===

    fn apply_position(&mut self, payload: &str) {
        for (index, raw) in payload.split(',').take(6).enumerate() {
            match parse_float(raw) {
                Ok(value) => {
                    if let Some(component) = self.state.pose.component_mut(index) {
                        *component = value;
                    }
                },
                Err(e) => self.parse_error("position", payload, &e),
            }
        }

        let components = self.state.pose.components();
        for (name, value) in names::STATE_POSE.into_iter().zip(components) {
            self.emit(name, value);
        }
        self.track_position();
    }

    fn track_position(&mut self) {
        match self.ctx.positions.locate(&self.state.pose) {
            Some(name) => {
                if name != self.state.position {
                    // 进入干燥位置后保持待机，直到下一条命令
                    if name.contains("DRY") {
                        self.ctx.flags.set_standby(true);
                    }
                    self.state.position = name.clone();
                    self.emit(names::STATE_POS, name);
                }
            },
            None => {
                if self.state.position != UNDEFINED_POSITION {
                    self.state.position = UNDEFINED_POSITION.to_string();
                    self.emit(names::STATE_POS, UNDEFINED_POSITION);
                }
            },
        }
    }

    // === di / do ===

    fn apply_inputs(&mut self, payload: &str) {
        let inputs = match DigitalInputs::parse(payload) {
            Ok(inputs) => inputs,
            Err(e) => return self.parse_error("inputs", payload, &e),
        };

        let s = &mut self.state;
        s.inputs = inputs.bits().words();
        s.trajectory = inputs.trajectory_running();
        s.tool_open = inputs.tool_open();
        s.toolb_open = inputs.toolb_open();
        s.emergency_ok = inputs.emergency_ok();
        s.collision_ok = inputs.collision_ok();
        s.sample_detected = inputs.sample_detected();
        s.cryo_level = inputs.cryo_level();

        let s = self.state.clone();
        for (name, word) in names::INPUTS.into_iter().zip(s.inputs) {
            self.emit(name, word);
        }
        self.emit(names::STATE_TRAJECTORY, s.trajectory);
        self.emit(names::STATE_TOOL_OPEN, s.tool_open);
        self.emit(names::STATE_TOOLB_OPEN, s.toolb_open);
        self.emit(names::INP_EMERGENCY, s.emergency_ok);
        self.emit(names::INP_COLLISION, s.collision_ok);
        self.emit(names::INP_SAMPLE_ON_GONIO, s.sample_detected);
        self.emit(names::INP_CRYO_LEVEL, s.cryo_level.code());
    }

    fn apply_outputs(&mut self, payload: &str) {
        let outputs = match DigitalOutputs::parse(payload) {
            Ok(outputs) => outputs,
            Err(e) => return self.parse_error("outputs", payload, &e),
        };

        let s = &mut self.state;
        s.outputs = outputs.bits().words();
        s.gonio_ready = outputs.gonio_ready();
        s.cryojet = outputs.cryojet();
        s.magnet = outputs.magnet();
        s.approach = outputs.approach();

        let s = self.state.clone();
        for (name, word) in names::OUTPUTS.into_iter().zip(s.outputs) {
            self.emit(name, word);
        }
        self.emit(names::INP_GONIO_READY, s.gonio_ready);
        self.emit(names::INP_CRYOJET, s.cryojet);
        self.emit(names::STATE_MAGNET, s.magnet);
        self.emit(names::STATE_APPROACH, s.approach);

        let slots = if self.assume_all_pucks {
            SlotBits::ALL
        } else {
            outputs.pucks()
        };
        self.update_pucks(slots);
    }

    fn update_pucks(&mut self, slots: SlotBits) {
        self.state.pucks = slots;
        self.emit(names::STATE_PUCKS, slots.to_string());
        self.emit(names::STATE_PUCKS_BIT0, slots.low_word());
        self.emit(names::STATE_PUCKS_BIT1, slots.high_word());

        let diff = self.inventory.update(slots);
        if diff.is_empty() || self.state.status != StatusType::Busy {
            return;
        }
        let on_tool = self.state.on_tool.trim();
        if let Some(label) = on_tool.get(..2)
            && diff.was_removed(label)
        {
            error!("{}", PUCK_REMOVED_WARNING);
            self.ctx.warn(PUCK_REMOVED_WARNING);
            self.queue.submit(Command::new("abort"));
        }
    }

    // === 自由文本 ===

    fn apply_free_text(&mut self, line: &str) {
        let decision = self.decoder.decode(self.ctx.faults(), line);
        if let Some(index) = decision.matched {
            debug!("Fault line matched catalog entry {}: {}", index, line.trim());
        }
        if let Some(health) = decision.health {
            self.state.health = health;
            self.emit(names::HEALTH, health.code());
        }
        if let Some(active) = decision.fault_active {
            self.ctx.flags.set_fault_active(active);
        }
        self.ctx.apply_faults(decision.register);

        let text = line.trim().split('\0').next().unwrap_or_default();
        if text != self.state.message {
            self.state.message = text.to_string();
            self.emit(names::MESSAGE, text.to_string());
        }
    }
}
