//! # ISARA Client
//!
//! 面向操作员的接口层：
//!
//! - [`Dispatcher`]: 操作员意图 → 设备命令（带前置检查与装载互斥）
//! - [`handlers`]: `CMD:*` / `PAR:*` 通道路由表
//! - [`wait`]: 位置 / 状态等待
//! - [`IsaraClient`]: 驱动 + 通道表 + 分发器的组合
//!
//! # Example
//!
//! ```no_run
//! use isara_client::IsaraClient;
//! use isara_driver::{ChannelBoard, IsaraBuilder};
//! use std::sync::Arc;
//!
//! let board = Arc::new(ChannelBoard::new());
//! let client = IsaraClient::connect(IsaraBuilder::new("10.0.0.5"), board.clone())?;
//!
//! board.put("PAR:nextPort", "1A16");
//! board.put("CMD:mount", 1i64);
//! # Ok::<(), isara_driver::DriverError>(())
//! ```

pub mod dispatcher;
pub mod handlers;
pub mod params;
pub mod preconditions;
pub mod wait;

pub use dispatcher::{Dispatcher, Outcome, Setter};
pub use handlers::{ROUTES, Route};
pub use params::OperatorParams;
pub use preconditions::{Rejection, position_matches};
pub use wait::{DEFAULT_WAIT_TIMEOUT, wait_for_position, wait_for_state, wait_in_state};

use isara_driver::channels::names;
use isara_driver::{
    ChannelBoard, ChannelValue, DriverError, Isara, IsaraBuilder, IsaraContext, RobotState,
};
use isara_link::LineSender;
use isara_protocol::StatusType;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// 驱动、通道表与分发器
pub struct IsaraClient {
    isara: Isara,
    board: Arc<ChannelBoard>,
    dispatcher: Arc<Dispatcher>,
}

impl IsaraClient {
    /// 连接真实控制器，并把 `board` 作为发布端与命令入口
    pub fn connect(builder: IsaraBuilder, board: Arc<ChannelBoard>) -> Result<Self, DriverError> {
        let isara = builder.sink(board.clone()).build()?;
        Ok(Self::attach(isara, board))
    }

    /// 使用外部提供的链路
    pub fn connect_with_links(
        builder: IsaraBuilder,
        board: Arc<ChannelBoard>,
        command: Arc<dyn LineSender>,
        status: Arc<dyn LineSender>,
    ) -> Result<Self, DriverError> {
        let isara = builder.sink(board.clone()).build_with_links(command, status)?;
        Ok(Self::attach(isara, board))
    }

    fn attach(isara: Isara, board: Arc<ChannelBoard>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(isara.queue().clone()));
        define_channels(&board, &dispatcher.params());
        install_routes(&board, &dispatcher);
        Self {
            isara,
            board,
            dispatcher,
        }
    }

    pub fn board(&self) -> &Arc<ChannelBoard> {
        &self.board
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn driver(&self) -> &Isara {
        &self.isara
    }

    pub fn context(&self) -> &Arc<IsaraContext> {
        self.isara.context()
    }

    pub fn snapshot(&self) -> Arc<RobotState> {
        self.isara.snapshot()
    }

    /// 写入通道（等价于控制系统侧的 `put`）
    pub fn put(&self, name: &str, value: impl Into<ChannelValue>) -> bool {
        self.board.put(name, value)
    }

    pub fn wait_for_ready(&self, timeout: Duration) -> Result<(), DriverError> {
        self.isara.wait_for_ready(timeout)
    }

    pub fn wait_for_position(&self, positions: &[&str], timeout: Duration) -> bool {
        wait_for_position(self.context(), positions, timeout)
    }

    pub fn wait_for_state(&self, states: &[StatusType], timeout: Duration) -> bool {
        wait_for_state(self.context(), states, timeout)
    }

    pub fn wait_in_state(&self, state: StatusType, timeout: Duration) -> bool {
        wait_in_state(self.context(), state, timeout)
    }
}

impl std::fmt::Debug for IsaraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsaraClient")
            .field("board", &self.board)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// 初始通道值：命令为 0，参数为缺省值，使能为 1
fn define_channels(board: &ChannelBoard, params: &OperatorParams) {
    for (name, route) in ROUTES {
        if route.resets() {
            board.define(name, 0i64);
        }
    }
    board.define(names::CMD_LID, 0i64);
    board.define(names::CMD_TOOL, 0i64);
    board.define(names::CMD_TOOLB, 0i64);
    board.define(names::ENABLED, 1i64);

    board.define(names::PAR_NEXT_PORT, params.next_port.as_str());
    board.define(names::PAR_NEXT_AFTER_PORT, params.next_after_port.as_str());
    board.define(names::PAR_BARCODE, params.barcode);
    board.define(names::PAR_TOOL, params.tool.code());
    board.define(names::PAR_PUCK, params.puck);
    board.define(names::PAR_SAMPLE, params.sample);
    board.define(names::PAR_NEXT_PUCK, params.next_puck);
    board.define(names::PAR_NEXT_SAMPLE, params.next_sample);
    board.define(names::PAR_PLATE, params.plate);
    board.define(names::PAR_SAMPLE_TYPE, params.sample_type.code());
    board.define(names::PAR_NEXT_SAMPLE_TYPE, params.next_sample_type.code());
    board.define(names::PAR_DATAMATRIX_SCAN, params.datamatrix_scan.code());
    board.define(names::PAR_JAW, params.jaw.code());
    board.define(names::PAR_POS_NAME, params.pos_name.as_str());
    board.define(names::PAR_POS_FORCE, params.pos_force);
    board.define(names::PAR_POS_TOLERANCE, params.pos_tolerance);
    board.define(names::PAR_MAX_SOAK_TIME, params.max_soak_time);
    board.define(names::PAR_MAX_SOAK_NB, params.max_soak_nb);
    board.define(names::PAR_AUTO_CLOSE_LID_TIMER, params.auto_close_lid_timer);
    board.define(names::PAR_AUTO_DRY_TIMER, params.auto_dry_timer);
    board.define(names::PAR_HIGH_LN2, params.high_ln2);
    board.define(names::PAR_LOW_LN2, params.low_ln2);
}

/// 为路由表中的每个通道注册回调
///
/// 回调只持有弱引用，客户端释放后回调变为空操作。
fn install_routes(board: &Arc<ChannelBoard>, dispatcher: &Arc<Dispatcher>) {
    for (name, route) in ROUTES {
        let route = *route;
        let weak_board: Weak<ChannelBoard> = Arc::downgrade(board);
        let weak_dispatcher: Weak<Dispatcher> = Arc::downgrade(dispatcher);
        board.subscribe(
            name,
            Arc::new(move |name: &str, value: &ChannelValue| {
                let Some(dispatcher) = weak_dispatcher.upgrade() else {
                    return;
                };
                if let Some(outcome) = handlers::dispatch(&dispatcher, route, value) {
                    debug!("{} = {} -> {:?}", name, value, outcome);
                    if route.resets()
                        && let Some(board) = weak_board.upgrade()
                    {
                        board.put(name, 0i64);
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isara_link::MockLink;

    #[test]
    fn test_channels_defined_and_routed() {
        let dir = tempfile::tempdir().unwrap();
        let board = Arc::new(ChannelBoard::new());
        let client = IsaraClient::connect_with_links(
            IsaraBuilder::new("mock").positions(dir.path(), "t"),
            board.clone(),
            Arc::new(MockLink::command()),
            Arc::new(MockLink::status()),
        )
        .unwrap();

        assert_eq!(board.get(names::CMD_MOUNT), Some(ChannelValue::Int(0)));
        assert_eq!(board.get(names::PAR_MAX_SOAK_NB), Some(ChannelValue::Int(6)));
        assert_eq!(board.get(names::ENABLED), Some(ChannelValue::Int(1)));

        client.put(names::PAR_NEXT_PORT, "2B3");
        assert_eq!(client.dispatcher().params().next_port, "2B3");

        client.put(names::ENABLED, 0i64);
        assert!(!client.context().is_enabled());
    }
}
