//! 协议枚举类型
//!
//! 线上以整数传输的枚举在内部全部使用带标签的枚举，整数编解码只发生在边界
//! （`IntoPrimitive` / `TryFromPrimitive`）。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 将 i64 转换为 `#[repr(u8)]` 枚举
fn enum_from_i64<T>(value: i64, kind: &'static str) -> Result<T, ProtocolError>
where
    T: TryFromPrimitive<Primitive = u8>,
{
    u8::try_from(value)
        .ok()
        .and_then(|v| T::try_from_primitive(v).ok())
        .ok_or(ProtocolError::InvalidEnumValue { kind, value })
}

/// 末端工具类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ToolType {
    /// 换刀器
    Changer = 0,
    /// 冷冻钳（未知工具名的缺省值）
    #[default]
    Cryotong = 1,
    Unipuck = 2,
    /// 双爪夹具
    Double = 3,
    Minispine = 4,
    Rotating = 5,
    /// 样品板工具
    Plate = 6,
    None = 7,
    /// 激光标定工具
    Laser = 8,
}

impl ToolType {
    /// 将设备上报的工具名映射为工具类型（大小写不敏感）
    ///
    /// 未识别的名称一律视为 `Cryotong`。
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "toolchanger" => ToolType::Changer,
            "doublegripper" => ToolType::Double,
            "lasertool" => ToolType::Laser,
            _ => ToolType::Cryotong,
        }
    }

    /// 线上整数值
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "ToolType")
    }

    /// 是否为样品盘类工具
    pub fn is_puck_tool(self) -> bool {
        matches!(self, ToolType::Unipuck | ToolType::Rotating | ToolType::Double)
    }
}

/// 机器人对外状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StatusType {
    #[default]
    Idle = 0,
    Waiting = 1,
    Busy = 2,
    Standby = 3,
    Fault = 4,
    Drying = 5,
}

impl StatusType {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "StatusType")
    }
}

/// 健康度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Health {
    #[default]
    Ok = 0,
    Waiting = 1,
    Warning = 2,
    Error = 3,
}

impl Health {
    pub fn code(self) -> u8 {
        self.into()
    }
}

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ModeType {
    #[default]
    Manual = 0,
    Auto = 1,
}

impl ModeType {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "ModeType")
    }
}

/// 杜瓦罐液氮液位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CryoLevel {
    #[default]
    Unknown = 0,
    TooLow = 1,
    Normal = 2,
    Low = 3,
    High = 4,
    TooHigh = 5,
}

impl CryoLevel {
    pub fn code(self) -> u8 {
        self.into()
    }
}

/// 样品类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SampleType {
    #[default]
    Spine = 0,
    CopperCap = 1,
}

impl SampleType {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "SampleType")
    }
}

/// 是否扫描 DataMatrix 条码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DataMatrixScan {
    #[default]
    NoRead = 0,
    Read = 1,
}

impl DataMatrixScan {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "DataMatrixScan")
    }
}

/// 双爪夹具的爪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Jaw {
    #[default]
    A = 0,
    B = 1,
}

impl Jaw {
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn from_code(value: i64) -> Result<Self, ProtocolError> {
        enum_from_i64(value, "Jaw")
    }
}
