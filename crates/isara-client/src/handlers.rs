//! 通道路由表
//!
//! 每个 `CMD:*` / `PAR:*` 通道名对应一个处理函数。
//!
//! - 触发型命令：写入非零值时执行一次，执行后通道被复位为 0
//! - 取值型命令：按写入值决定动作（开/关盖、开/关夹具）
//! - 参数：更新 [`OperatorParams`]

use crate::dispatcher::{Dispatcher, Outcome, Setter};
use crate::params::OperatorParams;
use isara_driver::ChannelValue;
use isara_driver::channels::names::*;
use isara_protocol::{DataMatrixScan, Jaw, SampleType, ToolType};
use tracing::warn;

/// 路由处理方式
#[derive(Clone, Copy)]
pub enum Route {
    /// 非零写入时执行，之后复位为 0
    Trigger(fn(&Dispatcher) -> Outcome),
    /// 每次写入都执行
    Value(fn(&Dispatcher, &ChannelValue) -> Outcome),
    /// 更新操作员参数
    Param(fn(&mut OperatorParams, &ChannelValue)),
}

impl Route {
    /// 执行后是否需要把通道复位为 0
    pub fn resets(&self) -> bool {
        matches!(self, Route::Trigger(_))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Route::Trigger(_) => "Trigger",
            Route::Value(_) => "Value",
            Route::Param(_) => "Param",
        })
    }
}

fn int(value: &ChannelValue) -> i64 {
    value.as_int().unwrap_or(0)
}

/// 枚举参数：无效的整数值记录警告并忽略
fn coded<T>(value: &ChannelValue, name: &str, decode: fn(i64) -> Result<T, isara_protocol::ProtocolError>) -> Option<T> {
    match decode(int(value)) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {} = {}: {}", name, value, e);
            None
        },
    }
}

/// 全部路由
pub static ROUTES: &[(&str, Route)] = &[
    // 装载 / 卸载
    (CMD_MOUNT, Route::Trigger(Dispatcher::mount)),
    (CMD_DISMOUNT, Route::Trigger(Dispatcher::dismount)),
    (CMD_PUT, Route::Trigger(Dispatcher::put)),
    (CMD_GET, Route::Trigger(Dispatcher::get)),
    (CMD_GETPUT, Route::Trigger(Dispatcher::getput)),
    // 简单命令
    (CMD_POWER, Route::Trigger(Dispatcher::power)),
    (CMD_REBOOT, Route::Trigger(Dispatcher::reboot)),
    (CMD_PANIC, Route::Trigger(Dispatcher::panic)),
    (CMD_ABORT, Route::Trigger(Dispatcher::abort)),
    (CMD_PAUSE, Route::Trigger(Dispatcher::pause)),
    (CMD_RESET, Route::Trigger(Dispatcher::reset)),
    (CMD_RESTART, Route::Trigger(Dispatcher::restart)),
    (CMD_CLEAR_BARCODE, Route::Trigger(Dispatcher::clear_barcode)),
    (CMD_FASTER, Route::Trigger(Dispatcher::faster)),
    (CMD_SLOWER, Route::Trigger(Dispatcher::slower)),
    (CMD_LID, Route::Value(|d, v| d.lid(v.is_set()))),
    (CMD_TOOL, Route::Value(|d, v| d.tool(v.is_set()))),
    (CMD_TOOLB, Route::Value(|d, v| d.toolb(v.is_set()))),
    // 开关
    (CMD_MAGNET, Route::Trigger(Dispatcher::magnet)),
    (CMD_HEATER, Route::Trigger(Dispatcher::heater)),
    (CMD_SPEED, Route::Trigger(Dispatcher::remote_speed)),
    (CMD_APPROACH, Route::Trigger(Dispatcher::approach)),
    (CMD_RUNNING, Route::Trigger(Dispatcher::running)),
    (CMD_AUTOFILL, Route::Trigger(Dispatcher::autofill)),
    // 运动
    (CMD_HOME, Route::Trigger(Dispatcher::home)),
    (CMD_RECOVER, Route::Trigger(Dispatcher::recover)),
    (CMD_SAFE, Route::Trigger(Dispatcher::safe)),
    (CMD_BARCODE, Route::Trigger(Dispatcher::barcode)),
    (CMD_BACK, Route::Trigger(Dispatcher::back)),
    (CMD_SOAK, Route::Trigger(Dispatcher::soak)),
    (CMD_DRY, Route::Trigger(Dispatcher::dry)),
    (CMD_PICK, Route::Trigger(Dispatcher::pick)),
    (CMD_CHANGE_TOOL, Route::Trigger(Dispatcher::change_tool)),
    // 标定
    (CMD_TOOL_CAL, Route::Trigger(Dispatcher::calibrate)),
    (CMD_TEACH_GONIO, Route::Trigger(Dispatcher::teach_gonio)),
    (CMD_TEACH_PUCK, Route::Trigger(Dispatcher::teach_puck)),
    (CMD_TEACH_DEWAR, Route::Trigger(Dispatcher::teach_dewar)),
    // 样品记录与维护
    (CMD_SET_DIFF_SAMPLE, Route::Trigger(Dispatcher::set_diff_sample)),
    (CMD_SET_TOOL_SAMPLE, Route::Trigger(Dispatcher::set_tool_sample)),
    (CMD_SET_TOOLB_SAMPLE, Route::Trigger(Dispatcher::set_toolb_sample)),
    (CMD_CLEAR, Route::Trigger(Dispatcher::clear_memory)),
    (CMD_RESET_PARAMS, Route::Trigger(Dispatcher::reset_params)),
    (CMD_RESET_MOTION, Route::Trigger(Dispatcher::reset_motion)),
    (CMD_SAVE_POSITION, Route::Trigger(Dispatcher::save_position)),
    // 使能
    (
        ENABLED,
        Route::Value(|d, v| {
            d.context().set_enabled(v.is_set());
            Outcome::Sent
        }),
    ),
    // 控制器设置
    (PAR_MAX_SOAK_TIME, Route::Value(|d, v| d.set(Setter::MaxSoakTime, int(v)))),
    (PAR_MAX_SOAK_NB, Route::Value(|d, v| d.set(Setter::MaxSoakNb, int(v)))),
    (
        PAR_AUTO_CLOSE_LID_TIMER,
        Route::Value(|d, v| d.set(Setter::AutoCloseLidTimer, int(v))),
    ),
    (PAR_AUTO_DRY_TIMER, Route::Value(|d, v| d.set(Setter::AutoDryTimer, int(v)))),
    (PAR_HIGH_LN2, Route::Value(|d, v| d.set(Setter::HighLn2, int(v)))),
    (PAR_LOW_LN2, Route::Value(|d, v| d.set(Setter::LowLn2, int(v)))),
    // 操作员参数
    (PAR_NEXT_PORT, Route::Param(|p, v| p.next_port = v.as_text().trim().to_string())),
    (
        PAR_NEXT_AFTER_PORT,
        Route::Param(|p, v| p.next_after_port = v.as_text().trim().to_string()),
    ),
    (PAR_BARCODE, Route::Param(|p, v| p.barcode = v.is_set())),
    (
        PAR_TOOL,
        Route::Param(|p, v| {
            if let Some(tool) = coded(v, PAR_TOOL, ToolType::from_code) {
                p.tool = tool;
            }
        }),
    ),
    (PAR_PUCK, Route::Param(|p, v| p.puck = int(v))),
    (PAR_SAMPLE, Route::Param(|p, v| p.sample = int(v))),
    (PAR_NEXT_PUCK, Route::Param(|p, v| p.next_puck = int(v))),
    (PAR_NEXT_SAMPLE, Route::Param(|p, v| p.next_sample = int(v))),
    (PAR_PLATE, Route::Param(|p, v| p.plate = int(v))),
    (
        PAR_SAMPLE_TYPE,
        Route::Param(|p, v| {
            if let Some(t) = coded(v, PAR_SAMPLE_TYPE, SampleType::from_code) {
                p.sample_type = t;
            }
        }),
    ),
    (
        PAR_NEXT_SAMPLE_TYPE,
        Route::Param(|p, v| {
            if let Some(t) = coded(v, PAR_NEXT_SAMPLE_TYPE, SampleType::from_code) {
                p.next_sample_type = t;
            }
        }),
    ),
    (
        PAR_DATAMATRIX_SCAN,
        Route::Param(|p, v| {
            if let Some(scan) = coded(v, PAR_DATAMATRIX_SCAN, DataMatrixScan::from_code) {
                p.datamatrix_scan = scan;
            }
        }),
    ),
    (
        PAR_JAW,
        Route::Param(|p, v| {
            if let Some(jaw) = coded(v, PAR_JAW, Jaw::from_code) {
                p.jaw = jaw;
            }
        }),
    ),
    (PAR_POS_NAME, Route::Param(|p, v| p.pos_name = v.as_text())),
    (PAR_POS_FORCE, Route::Param(|p, v| p.pos_force = v.is_set())),
    (
        PAR_POS_TOLERANCE,
        Route::Param(|p, v| {
            if let Some(tol) = v.as_float().filter(|t| *t >= 0.0) {
                p.pos_tolerance = tol;
            }
        }),
    ),
];

/// 查找通道对应的路由
pub fn route(name: &str) -> Option<Route> {
    ROUTES.iter().find(|(n, _)| *n == name).map(|(_, r)| *r)
}

/// 执行一次通道写入
///
/// 触发型命令在写入 0 时不执行，返回 `None`；参数写入返回 `Skipped`。
pub fn dispatch(dispatcher: &Dispatcher, route: Route, value: &ChannelValue) -> Option<Outcome> {
    match route {
        Route::Trigger(handler) => value.is_set().then(|| handler(dispatcher)),
        Route::Value(handler) => Some(handler(dispatcher, value)),
        Route::Param(apply) => {
            dispatcher.update_params(|p| apply(p, value));
            Some(Outcome::Skipped)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_routes_are_unique() {
        let mut seen = HashSet::new();
        for (name, _) in ROUTES {
            assert!(seen.insert(*name), "duplicate route {name}");
        }
    }

    #[test]
    fn test_route_kinds() {
        assert!(route(CMD_MOUNT).is_some_and(|r| r.resets()));
        assert!(matches!(route(CMD_LID), Some(Route::Value(_))));
        assert!(matches!(route(PAR_NEXT_PORT), Some(Route::Param(_))));
        assert!(matches!(route(ENABLED), Some(Route::Value(_))));
        assert!(route(STATE_POS).is_none());
        assert!(route("CMD:unknown").is_none());
    }

    #[test]
    fn test_every_command_channel_routed() {
        let commands = [
            CMD_POWER, CMD_REBOOT, CMD_PANIC, CMD_ABORT, CMD_PAUSE, CMD_RESET, CMD_RESTART,
            CMD_CLEAR_BARCODE, CMD_LID, CMD_TOOL, CMD_TOOLB, CMD_FASTER, CMD_SLOWER, CMD_MAGNET,
            CMD_HEATER, CMD_SPEED, CMD_APPROACH, CMD_RUNNING, CMD_AUTOFILL, CMD_HOME,
            CMD_RECOVER, CMD_SAFE, CMD_PUT, CMD_GET, CMD_GETPUT, CMD_BARCODE, CMD_BACK,
            CMD_SOAK, CMD_DRY, CMD_PICK, CMD_CHANGE_TOOL, CMD_TOOL_CAL, CMD_TEACH_GONIO,
            CMD_TEACH_PUCK, CMD_TEACH_DEWAR, CMD_CLEAR, CMD_SET_DIFF_SAMPLE,
            CMD_SET_TOOL_SAMPLE, CMD_SET_TOOLB_SAMPLE, CMD_RESET_PARAMS, CMD_RESET_MOTION,
            CMD_SAVE_POSITION, CMD_MOUNT, CMD_DISMOUNT,
        ];
        for name in commands {
            assert!(route(name).is_some(), "{name} has no route");
        }
    }

    #[test]
    fn test_param_parsing() {
        let mut params = OperatorParams::default();
        let apply = |params: &mut OperatorParams, name: &str, value: ChannelValue| {
            if let Some(Route::Param(f)) = route(name) {
                f(params, &value);
            }
        };

        apply(&mut params, PAR_NEXT_PORT, " 1A16 ".into());
        apply(&mut params, PAR_TOOL, 3i64.into());
        apply(&mut params, PAR_JAW, 1i64.into());
        apply(&mut params, PAR_SAMPLE_TYPE, 9i64.into());
        apply(&mut params, PAR_POS_TOLERANCE, ChannelValue::Float(0.5));
        apply(&mut params, PAR_POS_FORCE, 1i64.into());

        assert_eq!(params.next_port, "1A16");
        assert_eq!(params.tool, ToolType::Double);
        assert_eq!(params.jaw, Jaw::B);
        assert_eq!(params.sample_type, SampleType::Spine);
        assert_eq!(params.pos_tolerance, 0.5);
        assert!(params.pos_force);
    }
}
