//! 数字量位串解析
//!
//! `di` / `do` 状态帧的载荷是一串 `0`/`1`（可能带逗号分隔），字符串中的第 *i*
//! 个字符即第 *i* 号通道。这里用定长位集代替字符串切片。

use crate::constants::{NUM_PUCKS, PUCK_LIST};
use crate::types::CryoLevel;
use crate::ProtocolError;
use bilge::prelude::*;
use std::fmt;

/// `di`/`do` 的标准宽度（不足时在末尾补 0）
pub const IO_WIDTH: usize = 64;

/// 位集容量（`do` 的样品盘检测位位于 56..85，超出 64）
pub const IO_CAPACITY: usize = 128;

/// 数字量位集
///
/// 第 *i* 个字符存储在第 *i* 位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoBits {
    bits: u128,
    len: usize,
}

impl IoBits {
    /// 从状态帧载荷解析
    ///
    /// 逗号与空白被忽略；长度不足 64 时视为末尾补 0。
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let mut bits = 0u128;
        let mut len = 0usize;
        for c in payload.chars().filter(|c| *c != ',' && !c.is_whitespace()) {
            let set = match c {
                '0' => false,
                '1' => true,
                _ => return Err(ProtocolError::InvalidBits(payload.to_string())),
            };
            if len >= IO_CAPACITY {
                return Err(ProtocolError::BitsTooLong {
                    len: len + 1,
                    max: IO_CAPACITY,
                });
            }
            if set {
                bits |= 1u128 << len;
            }
            len += 1;
        }
        Ok(Self {
            bits,
            len: len.max(IO_WIDTH),
        })
    }

    /// 有效长度（至少 64）
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// 读取第 `index` 位（越界读为 0）
    pub fn bit(&self, index: usize) -> bool {
        index < IO_CAPACITY && (self.bits >> index) & 1 == 1
    }

    /// 第 `n` 个 16 位反馈字
    ///
    /// 每 16 个字符为一组，组内第一个字符是最高位。
    pub fn word(&self, n: usize) -> u16 {
        (0..16).fold(0u16, |acc, i| (acc << 1) | self.bit(n * 16 + i) as u16)
    }

    /// 前 64 位对应的四个反馈字
    pub fn words(&self) -> [u16; 4] {
        [self.word(0), self.word(1), self.word(2), self.word(3)]
    }

    /// 取从 `start` 开始的连续 `count` 位（`count <= 32`）
    pub fn range(&self, start: usize, count: usize) -> u32 {
        (0..count.min(32)).fold(0u32, |acc, i| acc | ((self.bit(start + i) as u32) << i))
    }
}

impl fmt::Display for IoBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// 液氮液位开关（di 第 3..6 位）
///
/// 四个开关均为常闭逻辑：`hihi`/`lolo` 为 0 表示越限。
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct LevelSwitches {
    pub hihi: bool, // Bit 0: 超高限（0 = 触发）
    pub hi: bool,   // Bit 1: 高液位
    pub lo: bool,   // Bit 2: 低液位
    pub lolo: bool, // Bit 3: 超低限（0 = 触发）
    pub reserved: u4,
}

impl LevelSwitches {
    /// 按优先级推导液位：超高 > 超低 > 高 > 低 > 正常
    pub fn cryo_level(&self) -> CryoLevel {
        if !self.hihi() {
            CryoLevel::TooHigh
        } else if !self.lolo() {
            CryoLevel::TooLow
        } else if self.hi() {
            CryoLevel::High
        } else if self.lo() {
            CryoLevel::Low
        } else {
            CryoLevel::Normal
        }
    }
}

/// 数字量输入（`di` 帧）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalInputs(pub IoBits);

impl DigitalInputs {
    pub const TRAJECTORY: usize = 2;
    pub const LEVEL_SWITCHES: usize = 3;
    pub const EMERGENCY: usize = 4;
    pub const COLLISION: usize = 12;
    pub const TOOL_OPEN: usize = 17;
    pub const TOOLB_OPEN: usize = 19;
    pub const SAMPLE_ON_GONIO: usize = 24;

    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        IoBits::parse(payload).map(Self)
    }

    pub fn bits(&self) -> &IoBits {
        &self.0
    }

    pub fn trajectory_running(&self) -> bool {
        self.0.bit(Self::TRAJECTORY)
    }

    pub fn tool_open(&self) -> bool {
        self.0.bit(Self::TOOL_OPEN)
    }

    pub fn toolb_open(&self) -> bool {
        self.0.bit(Self::TOOLB_OPEN)
    }

    // 以下三个通道低电平有效
    pub fn emergency_ok(&self) -> bool {
        !self.0.bit(Self::EMERGENCY)
    }

    pub fn collision_ok(&self) -> bool {
        !self.0.bit(Self::COLLISION)
    }

    pub fn sample_detected(&self) -> bool {
        !self.0.bit(Self::SAMPLE_ON_GONIO)
    }

    pub fn level_switches(&self) -> LevelSwitches {
        let raw = self.0.range(Self::LEVEL_SWITCHES, 4) as u8;
        LevelSwitches::from(u8::new(raw))
    }

    pub fn cryo_level(&self) -> CryoLevel {
        self.level_switches().cryo_level()
    }
}

/// 数字量输出（`do` 帧）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalOutputs(pub IoBits);

impl DigitalOutputs {
    pub const GONIO_READY: usize = 26;
    pub const CRYOJET: usize = 27;
    pub const MAGNET: usize = 40;
    pub const APPROACH: usize = 41;
    /// 样品盘检测位起始位置（共 29 位）
    pub const PUCK_DETECTION: usize = 56;

    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        IoBits::parse(payload).map(Self)
    }

    pub fn bits(&self) -> &IoBits {
        &self.0
    }

    pub fn gonio_ready(&self) -> bool {
        self.0.bit(Self::GONIO_READY)
    }

    pub fn cryojet(&self) -> bool {
        self.0.bit(Self::CRYOJET)
    }

    pub fn magnet(&self) -> bool {
        self.0.bit(Self::MAGNET)
    }

    pub fn approach(&self) -> bool {
        self.0.bit(Self::APPROACH)
    }

    pub fn pucks(&self) -> SlotBits {
        SlotBits(self.0.range(Self::PUCK_DETECTION, NUM_PUCKS))
    }
}

/// 样品盘槽位占用位集（29 位，第 *i* 位对应 `PUCK_LIST[i]`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotBits(u32);

impl SlotBits {
    const MASK: u32 = (1 << NUM_PUCKS) - 1;

    /// 所有槽位均占用
    pub const ALL: SlotBits = SlotBits(Self::MASK);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// 解析 29 个字符的 `0`/`1` 串
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let actual = text.chars().count();
        if actual != NUM_PUCKS {
            return Err(ProtocolError::InvalidLength {
                expected: NUM_PUCKS,
                actual,
            });
        }
        let mut raw = 0u32;
        for (i, c) in text.chars().enumerate() {
            match c {
                '1' => raw |= 1 << i,
                '0' => {},
                _ => return Err(ProtocolError::InvalidBits(text.to_string())),
            }
        }
        Ok(Self(raw))
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        slot < NUM_PUCKS && (self.0 >> slot) & 1 == 1
    }

    /// 已占用槽位的标签（按槽位顺序）
    pub fn occupied(&self) -> impl Iterator<Item = &'static str> + '_ {
        PUCK_LIST
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_occupied(*i))
            .map(|(_, label)| *label)
    }

    /// 槽位 0..15 组成的字（槽位 0 为最低位）
    pub fn low_word(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// 槽位 16..28 组成的字（槽位 16 为最低位）
    pub fn high_word(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl fmt::Display for SlotBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..NUM_PUCKS {
            f.write_str(if self.is_occupied(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_string(ones: &[usize], len: usize) -> String {
        (0..len).map(|i| if ones.contains(&i) { '1' } else { '0' }).collect()
    }

    #[test]
    fn test_io_bits_parse_with_commas() {
        let bits = IoBits::parse("1,0,1,1").unwrap();
        assert_eq!(bits.len(), 64);
        assert!(bits.bit(0));
        assert!(!bits.bit(1));
        assert!(bits.bit(2));
        assert!(bits.bit(3));
        assert!(!bits.bit(63));
    }

    #[test]
    fn test_io_bits_rejects_garbage() {
        assert!(matches!(IoBits::parse("10x1"), Err(ProtocolError::InvalidBits(_))));
        let too_long = "1".repeat(IO_CAPACITY + 1);
        assert!(matches!(IoBits::parse(&too_long), Err(ProtocolError::BitsTooLong { .. })));
    }

    #[test]
    fn test_words_msb_first() {
        // 第 0 个字符是第一个字的最高位
        let bits = IoBits::parse(&bit_string(&[0, 15, 16, 63], 64)).unwrap();
        assert_eq!(bits.word(0), 0x8001);
        assert_eq!(bits.word(1), 0x8000);
        assert_eq!(bits.word(2), 0);
        assert_eq!(bits.word(3), 0x0001);
    }

    #[test]
    fn test_display_pads_to_64() {
        let bits = IoBits::parse("101").unwrap();
        let text = bits.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.starts_with("101000"));
    }

    #[test]
    fn test_digital_inputs_named_bits() {
        // trajectory, tool open, emergency (active low) 置位
        let inputs = DigitalInputs::parse(&bit_string(&[2, 4, 17], 64)).unwrap();
        assert!(inputs.trajectory_running());
        assert!(inputs.tool_open());
        assert!(!inputs.toolb_open());
        assert!(!inputs.emergency_ok());
        assert!(inputs.collision_ok());
        assert!(inputs.sample_detected());
    }

    #[test]
    fn test_cryo_level_priority() {
        // hihi=3, hi=4, lo=5, lolo=6
        let level = |ones: &[usize]| {
            DigitalInputs::parse(&bit_string(ones, 64)).unwrap().cryo_level()
        };
        assert_eq!(level(&[]), CryoLevel::TooHigh);
        assert_eq!(level(&[6]), CryoLevel::TooHigh);
        assert_eq!(level(&[3]), CryoLevel::TooLow);
        assert_eq!(level(&[3, 6]), CryoLevel::Normal);
        assert_eq!(level(&[3, 4, 6]), CryoLevel::High);
        assert_eq!(level(&[3, 5, 6]), CryoLevel::Low);
        assert_eq!(level(&[3, 4, 5, 6]), CryoLevel::High);
    }

    #[test]
    fn test_level_switches_bitfield() {
        let switches = LevelSwitches::from(u8::new(0b1001));
        assert!(switches.hihi());
        assert!(!switches.hi());
        assert!(!switches.lo());
        assert!(switches.lolo());
        assert_eq!(switches.cryo_level(), CryoLevel::Normal);
    }

    #[test]
    fn test_digital_outputs_and_pucks() {
        let outputs = DigitalOutputs::parse(&bit_string(&[26, 40, 56, 58, 84], 85)).unwrap();
        assert!(outputs.gonio_ready());
        assert!(!outputs.cryojet());
        assert!(outputs.magnet());
        assert!(!outputs.approach());

        let pucks = outputs.pucks();
        let labels: Vec<_> = pucks.occupied().collect();
        assert_eq!(labels, vec!["1A", "3A", "2F"]);
    }

    #[test]
    fn test_slot_bits_parse_and_words() {
        let text = "1100000000000000100000000000".to_string() + "1";
        let slots = SlotBits::parse(&text).unwrap();
        assert_eq!(slots.low_word(), 0b11);
        assert_eq!(slots.high_word(), 0b1_0000_0000_0001);
        assert_eq!(slots.to_string(), text);
        assert_eq!(SlotBits::ALL.occupied().count(), 29);
    }

    #[test]
    fn test_slot_bits_wrong_length() {
        assert_eq!(
            SlotBits::parse("111"),
            Err(ProtocolError::InvalidLength {
                expected: 29,
                actual: 3
            })
        );
    }
}
