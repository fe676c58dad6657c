//! 操作员参数
//!
//! 对应 `PAR:*` 通道。参数只在客户端内部保存，意图执行时读取。

use isara_protocol::{DataMatrixScan, Jaw, SampleType, ToolType, TransferArgs};

/// 缺省位置容差
pub const DEFAULT_TOLERANCE: f64 = isara_protocol::DEFAULT_POSITION_TOLERANCE;

/// 操作员参数集合
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorParams {
    /// 待装载端口
    pub next_port: String,
    /// 装载之后的下一个端口
    pub next_after_port: String,
    pub barcode: bool,
    pub tool: ToolType,
    pub puck: i64,
    pub sample: i64,
    pub next_puck: i64,
    pub next_sample: i64,
    pub plate: i64,
    pub sample_type: SampleType,
    pub next_sample_type: SampleType,
    pub datamatrix_scan: DataMatrixScan,
    pub jaw: Jaw,

    // 位置保存
    pub pos_name: String,
    pub pos_force: bool,
    pub pos_tolerance: f64,

    // 控制器设置
    pub max_soak_time: i64,
    pub max_soak_nb: i64,
    pub auto_close_lid_timer: i64,
    pub auto_dry_timer: i64,
    pub high_ln2: i64,
    pub low_ln2: i64,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            next_port: String::new(),
            next_after_port: String::new(),
            barcode: false,
            tool: ToolType::Cryotong,
            puck: 0,
            sample: 0,
            next_puck: 0,
            next_sample: 0,
            plate: 0,
            sample_type: SampleType::Spine,
            next_sample_type: SampleType::Spine,
            datamatrix_scan: DataMatrixScan::NoRead,
            jaw: Jaw::A,
            pos_name: String::new(),
            pos_force: false,
            pos_tolerance: DEFAULT_TOLERANCE,
            max_soak_time: 1,
            max_soak_nb: 6,
            auto_close_lid_timer: 0,
            auto_dry_timer: 0,
            high_ln2: 80,
            low_ln2: 70,
        }
    }
}

impl OperatorParams {
    /// 当前参数组成的传输轨迹参数
    pub fn transfer_args(&self) -> TransferArgs {
        TransferArgs {
            tool: self.tool,
            puck: self.puck,
            sample: self.sample,
            datamatrix_scan: self.datamatrix_scan,
            next_puck: self.next_puck,
            next_sample: self.next_sample,
            sample_type: self.sample_type,
            next_sample_type: self.next_sample_type,
            ..Default::default()
        }
    }
}
