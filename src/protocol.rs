//! WHB04B-6 wire protocol
//!
//! The pendant's USB receiver sends a fixed 8-byte input report for every
//! wheel or key change and accepts a 24-byte display feature report, which
//! has to be pushed as three 8-byte packets each carrying report ID 0x06.
//!
//! SPDX-License-Identifier: GPL-3.0

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// XHC vendor ID
pub const XHC_VENDOR_ID: u16 = 0x10CE;

/// WHB04B-6 receiver product ID
pub const WHB04B6_PRODUCT_ID: u16 = 0xEB93;

/// Report ID of the input report
pub const INPUT_REPORT_ID: u8 = 0x04;

/// Input report length in bytes
pub const INPUT_REPORT_LEN: usize = 8;

/// Report ID carried by every display packet
pub const DISPLAY_REPORT_ID: u8 = 0x06;

/// Length of a single display packet
pub const DISPLAY_PACKET_LEN: usize = 8;

/// Number of packets per display report
pub const DISPLAY_PACKET_COUNT: usize = 3;

/// Full display report length
pub const DISPLAY_REPORT_LEN: usize = DISPLAY_PACKET_LEN * DISPLAY_PACKET_COUNT;

/// Checksum seed, also echoed in the display report header
pub const SEED: u8 = 0xFE;

/// Display indicator bits (payload byte 3)
pub mod indicator {
    /// Jog mode field
    pub const MODE_MASK: u8 = 0x03;
    /// Continuous jog mode
    pub const MODE_CONTINUOUS: u8 = 0x00;
    /// Step jog mode
    pub const MODE_STEP: u8 = 0x01;
    /// Work (relative) coordinates are shown instead of machine coordinates
    pub const WORK_COORDINATES: u8 = 0x80;
}

/// Raw key codes as sent in keycode1/keycode2
pub mod keycode {
    pub const RESET: u8 = 0x01;
    pub const STOP: u8 = 0x02;
    pub const START_PAUSE: u8 = 0x03;
    pub const M1_FEED_PLUS: u8 = 0x04;
    pub const M2_FEED_MINUS: u8 = 0x05;
    pub const M3_SPINDLE_PLUS: u8 = 0x06;
    pub const M4_SPINDLE_MINUS: u8 = 0x07;
    pub const M5_MACHINE_HOME: u8 = 0x08;
    pub const M6_SAFE_Z: u8 = 0x09;
    pub const M7_WORK_HOME: u8 = 0x0A;
    pub const M8_SPINDLE_ON_OFF: u8 = 0x0B;
    pub const FN: u8 = 0x0C;
    pub const M9_PROBE_Z: u8 = 0x0D;
    pub const CONTINUOUS: u8 = 0x0E;
    pub const STEP: u8 = 0x0F;
    pub const M10: u8 = 0x10;
}

// ============================================================================
// Keys and selectors
// ============================================================================

/// A pendant key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Reset,
    Stop,
    StartPause,
    M1FeedPlus,
    M2FeedMinus,
    M3SpindlePlus,
    M4SpindleMinus,
    M5MachineHome,
    M6SafeZ,
    M7WorkHome,
    M8SpindleOnOff,
    Fn,
    M9ProbeZ,
    Continuous,
    Step,
    M10,
    /// Code outside the documented key set
    Unknown(u8),
}

impl KeyCode {
    /// Decode a raw key code, `0` meaning "no key"
    pub fn from_raw(code: u8) -> Option<Self> {
        let key = match code {
            0 => return None,
            keycode::RESET => KeyCode::Reset,
            keycode::STOP => KeyCode::Stop,
            keycode::START_PAUSE => KeyCode::StartPause,
            keycode::M1_FEED_PLUS => KeyCode::M1FeedPlus,
            keycode::M2_FEED_MINUS => KeyCode::M2FeedMinus,
            keycode::M3_SPINDLE_PLUS => KeyCode::M3SpindlePlus,
            keycode::M4_SPINDLE_MINUS => KeyCode::M4SpindleMinus,
            keycode::M5_MACHINE_HOME => KeyCode::M5MachineHome,
            keycode::M6_SAFE_Z => KeyCode::M6SafeZ,
            keycode::M7_WORK_HOME => KeyCode::M7WorkHome,
            keycode::M8_SPINDLE_ON_OFF => KeyCode::M8SpindleOnOff,
            keycode::FN => KeyCode::Fn,
            keycode::M9_PROBE_Z => KeyCode::M9ProbeZ,
            keycode::CONTINUOUS => KeyCode::Continuous,
            keycode::STEP => KeyCode::Step,
            keycode::M10 => KeyCode::M10,
            other => KeyCode::Unknown(other),
        };
        Some(key)
    }

    /// Raw key code
    pub fn raw(self) -> u8 {
        match self {
            KeyCode::Reset => keycode::RESET,
            KeyCode::Stop => keycode::STOP,
            KeyCode::StartPause => keycode::START_PAUSE,
            KeyCode::M1FeedPlus => keycode::M1_FEED_PLUS,
            KeyCode::M2FeedMinus => keycode::M2_FEED_MINUS,
            KeyCode::M3SpindlePlus => keycode::M3_SPINDLE_PLUS,
            KeyCode::M4SpindleMinus => keycode::M4_SPINDLE_MINUS,
            KeyCode::M5MachineHome => keycode::M5_MACHINE_HOME,
            KeyCode::M6SafeZ => keycode::M6_SAFE_Z,
            KeyCode::M7WorkHome => keycode::M7_WORK_HOME,
            KeyCode::M8SpindleOnOff => keycode::M8_SPINDLE_ON_OFF,
            KeyCode::Fn => keycode::FN,
            KeyCode::M9ProbeZ => keycode::M9_PROBE_Z,
            KeyCode::Continuous => keycode::CONTINUOUS,
            KeyCode::Step => keycode::STEP,
            KeyCode::M10 => keycode::M10,
            KeyCode::Unknown(code) => code,
        }
    }

    /// Macro number printed on a macro key (M1-M10)
    pub fn macro_number(self) -> Option<u8> {
        match self {
            KeyCode::M1FeedPlus => Some(1),
            KeyCode::M2FeedMinus => Some(2),
            KeyCode::M3SpindlePlus => Some(3),
            KeyCode::M4SpindleMinus => Some(4),
            KeyCode::M5MachineHome => Some(5),
            KeyCode::M6SafeZ => Some(6),
            KeyCode::M7WorkHome => Some(7),
            KeyCode::M8SpindleOnOff => Some(8),
            KeyCode::M9ProbeZ => Some(9),
            KeyCode::M10 => Some(10),
            _ => None,
        }
    }
}

/// Machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
    A,
    B,
    C,
}

/// Number of axes the pendant can address
pub const AXIS_COUNT: usize = 6;

impl Axis {
    /// All axes in controller order
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// Decode the axis rotary switch; "off" and unknown positions select nothing
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x11 => Some(Axis::X),
            0x12 => Some(Axis::Y),
            0x13 => Some(Axis::Z),
            0x14 => Some(Axis::A),
            0x15 => Some(Axis::B),
            0x16 => Some(Axis::C),
            _ => None,
        }
    }

    /// Index into per-axis tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// G-code axis letter
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Position of the feed/step rotary switch
///
/// The first four positions double as step sizes in step mode and as
/// feed percentages in continuous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSelection {
    /// 0.001 step / 2 %
    Step0_001,
    /// 0.01 step / 5 %
    Step0_01,
    /// 0.1 step / 10 %
    Step0_1,
    /// 1.0 step / 30 %
    Step1,
    /// 60 %
    Percent60,
    /// 100 %
    Percent100,
    /// Lead
    Lead,
}

impl FeedSelection {
    /// Decode the feed rotary switch; unknown positions select nothing
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0x0D => Some(FeedSelection::Step0_001),
            0x0E => Some(FeedSelection::Step0_01),
            0x0F => Some(FeedSelection::Step0_1),
            0x10 => Some(FeedSelection::Step1),
            0x1A => Some(FeedSelection::Percent60),
            0x1B => Some(FeedSelection::Percent100),
            0x1C => Some(FeedSelection::Lead),
            _ => None,
        }
    }

    /// Distance per wheel detent in step mode
    pub fn step_size(self) -> Option<f64> {
        match self {
            FeedSelection::Step0_001 => Some(0.001),
            FeedSelection::Step0_01 => Some(0.01),
            FeedSelection::Step0_1 => Some(0.1),
            FeedSelection::Step1 => Some(1.0),
            _ => None,
        }
    }

    /// Share of the axis feed rate used in continuous mode
    pub fn continuous_percent(self) -> Option<u32> {
        match self {
            FeedSelection::Step0_001 => Some(2),
            FeedSelection::Step0_01 => Some(5),
            FeedSelection::Step0_1 => Some(10),
            FeedSelection::Step1 => Some(30),
            FeedSelection::Percent60 => Some(60),
            FeedSelection::Percent100 => Some(100),
            FeedSelection::Lead => None,
        }
    }
}

// ============================================================================
// Input report
// ============================================================================

/// Why an input report was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    /// Report is not exactly 8 bytes
    WrongLength(usize),
    /// First byte is not the input report ID
    WrongReportId(u8),
    /// Transmitted checksum does not match the seed-derived value
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::WrongLength(len) => write!(f, "wrong report length {}", len),
            ReportError::WrongReportId(id) => write!(f, "wrong report id 0x{:02X}", id),
            ReportError::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch (expected 0x{:02X}, got 0x{:02X})",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for ReportError {}

/// Decoded 8-byte input report
///
/// Layout: report id, random seed, keycode1, keycode2, feed selector,
/// axis selector, signed jog delta, checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputReport {
    pub random: u8,
    pub keycode1: u8,
    pub keycode2: u8,
    pub feed_selector: u8,
    pub axis_selector: u8,
    pub jog_delta: i8,
    pub checksum: u8,
}

impl InputReport {
    /// Build a report with a valid checksum
    pub fn new(
        random: u8,
        keycode1: u8,
        keycode2: u8,
        feed_selector: u8,
        axis_selector: u8,
        jog_delta: i8,
    ) -> Self {
        Self {
            random,
            keycode1,
            keycode2,
            feed_selector,
            axis_selector,
            jog_delta,
            checksum: Self::expected_checksum(random, keycode1),
        }
    }

    /// Checksum the pendant computes for a given seed byte and first key
    pub fn expected_checksum(random: u8, keycode1: u8) -> u8 {
        if keycode1 != 0 {
            random.wrapping_sub(keycode1 ^ (!SEED & random))
        } else {
            random & SEED
        }
    }

    /// Parse and validate a raw report
    pub fn parse(bytes: &[u8]) -> Result<Self, ReportError> {
        if bytes.len() != INPUT_REPORT_LEN {
            return Err(ReportError::WrongLength(bytes.len()));
        }
        if bytes[0] != INPUT_REPORT_ID {
            return Err(ReportError::WrongReportId(bytes[0]));
        }

        let report = Self {
            random: bytes[1],
            keycode1: bytes[2],
            keycode2: bytes[3],
            feed_selector: bytes[4],
            axis_selector: bytes[5],
            jog_delta: bytes[6] as i8,
            checksum: bytes[7],
        };

        let expected = Self::expected_checksum(report.random, report.keycode1);
        if expected != report.checksum {
            return Err(ReportError::ChecksumMismatch {
                expected,
                actual: report.checksum,
            });
        }

        Ok(report)
    }

    /// Convert to bytes as sent by the pendant
    pub fn to_bytes(&self) -> [u8; INPUT_REPORT_LEN] {
        [
            INPUT_REPORT_ID,
            self.random,
            self.keycode1,
            self.keycode2,
            self.feed_selector,
            self.axis_selector,
            self.jog_delta as u8,
            self.checksum,
        ]
    }

    /// Keys held in this report, keycode1 first
    pub fn keys(&self) -> impl Iterator<Item = KeyCode> {
        [self.keycode1, self.keycode2]
            .into_iter()
            .filter_map(KeyCode::from_raw)
    }

    /// Whether a given key is held in this report
    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys().any(|k| k == key)
    }

    /// Selected axis, if any
    pub fn axis(&self) -> Option<Axis> {
        Axis::from_selector(self.axis_selector)
    }

    /// Selected feed/step position, if any
    pub fn feed(&self) -> Option<FeedSelection> {
        FeedSelection::from_selector(self.feed_selector)
    }
}

// ============================================================================
// Display report
// ============================================================================

/// Encode a coordinate as sign + 16-bit integer + 15-bit fraction (x10000)
///
/// Returns `[int lo, int hi, frac lo, frac hi | sign]`. The integer part
/// saturates at 65535.
pub fn encode_coordinate(value: f64) -> [u8; 4] {
    let negative = value < 0.0;
    let magnitude = value.abs();
    let whole = magnitude.trunc();
    let int_part = whole.min(u16::MAX as f64) as u16;
    let fraction = (((magnitude - whole) * 10000.0) as u16) & 0x7FFF;

    let mut frac_hi = ((fraction & 0x7F00) >> 8) as u8;
    if negative {
        frac_hi |= 0x80;
    }

    [
        (int_part & 0xFF) as u8,
        (int_part >> 8) as u8,
        (fraction & 0xFF) as u8,
        frac_hi,
    ]
}

/// Decode a coordinate field written by [`encode_coordinate`]
pub fn decode_coordinate(bytes: [u8; 4]) -> f64 {
    let int_part = u16::from_le_bytes([bytes[0], bytes[1]]) as f64;
    let fraction = u16::from_le_bytes([bytes[2], bytes[3] & 0x7F]) as f64;
    let magnitude = int_part + fraction / 10000.0;
    if bytes[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Payload offsets of the display report fields
pub mod display_field {
    pub const HEADER_LO: usize = 0;
    pub const HEADER_HI: usize = 1;
    pub const SEED: usize = 2;
    pub const INDICATOR: usize = 3;
    /// First of the three 4-byte coordinate fields
    pub const COORDINATES: usize = 4;
    pub const FEED_RATE: usize = 16;
    pub const SPINDLE_SPEED: usize = 18;
}

/// The 24-byte display report buffer
///
/// Every packet starts with the report ID, so the 21 payload bytes are
/// spread over the buffer skipping bytes 0, 8 and 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayReport {
    bytes: [u8; DISPLAY_REPORT_LEN],
}

impl Default for DisplayReport {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayReport {
    /// Fresh report with header, seed and step mode + work coordinates set
    pub fn new() -> Self {
        let mut report = Self {
            bytes: [0; DISPLAY_REPORT_LEN],
        };
        for packet in 0..DISPLAY_PACKET_COUNT {
            report.bytes[packet * DISPLAY_PACKET_LEN] = DISPLAY_REPORT_ID;
        }
        report.set_payload(display_field::HEADER_LO, 0xFE);
        report.set_payload(display_field::HEADER_HI, 0xFD);
        report.set_payload(display_field::SEED, SEED);
        report.set_payload(
            display_field::INDICATOR,
            indicator::MODE_STEP | indicator::WORK_COORDINATES,
        );
        report
    }

    /// Buffer index of a payload byte
    pub fn buffer_index(payload_index: usize) -> usize {
        payload_index + 1 + payload_index / (DISPLAY_PACKET_LEN - 1)
    }

    fn set_payload(&mut self, payload_index: usize, value: u8) {
        self.bytes[Self::buffer_index(payload_index)] = value;
    }

    fn payload(&self, payload_index: usize) -> u8 {
        self.bytes[Self::buffer_index(payload_index)]
    }

    fn set_u16(&mut self, payload_index: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.set_payload(payload_index, lo);
        self.set_payload(payload_index + 1, hi);
    }

    /// Write one of the three visible coordinates (slot 0-2)
    pub fn set_coordinate(&mut self, slot: usize, value: f64) {
        let base = display_field::COORDINATES + slot * 4;
        for (i, byte) in encode_coordinate(value).into_iter().enumerate() {
            self.set_payload(base + i, byte);
        }
    }

    /// Read back one of the three visible coordinates
    pub fn coordinate(&self, slot: usize) -> f64 {
        let base = display_field::COORDINATES + slot * 4;
        decode_coordinate([
            self.payload(base),
            self.payload(base + 1),
            self.payload(base + 2),
            self.payload(base + 3),
        ])
    }

    /// Replace the jog-mode bits of the indicator
    pub fn set_mode(&mut self, mode_bits: u8) {
        let current = self.payload(display_field::INDICATOR);
        self.set_payload(
            display_field::INDICATOR,
            (current & !indicator::MODE_MASK) | (mode_bits & indicator::MODE_MASK),
        );
    }

    /// Set or clear the work-coordinate indicator bit
    pub fn set_work_coordinates(&mut self, enabled: bool) {
        let current = self.payload(display_field::INDICATOR);
        let value = if enabled {
            current | indicator::WORK_COORDINATES
        } else {
            current & !indicator::WORK_COORDINATES
        };
        self.set_payload(display_field::INDICATOR, value);
    }

    /// Indicator byte
    pub fn indicator(&self) -> u8 {
        self.payload(display_field::INDICATOR)
    }

    pub fn set_feed_rate(&mut self, feed_rate: u16) {
        self.set_u16(display_field::FEED_RATE, feed_rate);
    }

    pub fn set_spindle_speed(&mut self, speed: u16) {
        self.set_u16(display_field::SPINDLE_SPEED, speed);
    }

    /// One 8-byte packet of the report
    pub fn packet(&self, index: usize) -> Option<[u8; DISPLAY_PACKET_LEN]> {
        if index >= DISPLAY_PACKET_COUNT {
            return None;
        }
        let start = index * DISPLAY_PACKET_LEN;
        let mut packet = [0u8; DISPLAY_PACKET_LEN];
        packet.copy_from_slice(&self.bytes[start..start + DISPLAY_PACKET_LEN]);
        Some(packet)
    }

    /// Raw report bytes
    pub fn as_bytes(&self) -> &[u8; DISPLAY_REPORT_LEN] {
        &self.bytes
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_without_key() {
        assert_eq!(InputReport::expected_checksum(0x5B, 0), 0x5B & SEED);
        assert_eq!(InputReport::expected_checksum(0xFF, 0), 0xFE);
    }

    #[test]
    fn test_checksum_with_key() {
        // 0x37 - (0x01 ^ (0x01 & 0x37)) = 0x37 - 0x00
        assert_eq!(InputReport::expected_checksum(0x37, keycode::RESET), 0x37);
        // 0x20 - (0x03 ^ (0x01 & 0x20)) = 0x20 - 0x03
        assert_eq!(InputReport::expected_checksum(0x20, keycode::START_PAUSE), 0x1D);
        // wraps below zero
        assert_eq!(InputReport::expected_checksum(0x00, keycode::M10), 0xF0);
    }

    #[test]
    fn test_parse_valid_report() {
        let bytes = InputReport::new(0x42, keycode::STOP, 0, 0x0D, 0x11, -3).to_bytes();
        let report = InputReport::parse(&bytes).unwrap();

        assert_eq!(report.keycode1, keycode::STOP);
        assert_eq!(report.jog_delta, -3);
        assert_eq!(report.axis(), Some(Axis::X));
        assert_eq!(report.feed(), Some(FeedSelection::Step0_001));
        assert_eq!(report.keys().collect::<Vec<_>>(), vec![KeyCode::Stop]);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let bytes = InputReport::new(0x42, 0, 0, 0x0D, 0x11, 0).to_bytes();
        assert_eq!(InputReport::parse(&bytes[..7]), Err(ReportError::WrongLength(7)));
        assert_eq!(InputReport::parse(&[]), Err(ReportError::WrongLength(0)));

        let mut long = bytes.to_vec();
        long.push(0);
        assert_eq!(InputReport::parse(&long), Err(ReportError::WrongLength(9)));
    }

    #[test]
    fn test_parse_rejects_wrong_id() {
        let mut bytes = InputReport::new(0x42, 0, 0, 0x0D, 0x11, 0).to_bytes();
        bytes[0] = 0x06;
        assert_eq!(InputReport::parse(&bytes), Err(ReportError::WrongReportId(0x06)));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        for random in 0..=255u8 {
            let mut bytes = InputReport::new(random, keycode::M1_FEED_PLUS, 0, 0x0E, 0x12, 1).to_bytes();
            bytes[7] = bytes[7].wrapping_add(1);
            assert!(matches!(
                InputReport::parse(&bytes),
                Err(ReportError::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_out_of_range_selectors_select_nothing() {
        assert_eq!(Axis::from_selector(0x06), None);
        assert_eq!(Axis::from_selector(0x17), None);
        assert_eq!(Axis::from_selector(0x00), None);
        assert_eq!(FeedSelection::from_selector(0x00), None);
        assert_eq!(FeedSelection::from_selector(0x11), None);
        assert_eq!(FeedSelection::from_selector(0xFF), None);
    }

    #[test]
    fn test_feed_tables() {
        assert_eq!(FeedSelection::Step0_01.step_size(), Some(0.01));
        assert_eq!(FeedSelection::Step1.step_size(), Some(1.0));
        assert_eq!(FeedSelection::Percent60.step_size(), None);
        assert_eq!(FeedSelection::Step0_001.continuous_percent(), Some(2));
        assert_eq!(FeedSelection::Percent100.continuous_percent(), Some(100));
        assert_eq!(FeedSelection::Lead.continuous_percent(), None);
    }

    #[test]
    fn test_keycode_roundtrip_and_unknown() {
        for code in 1..=0x10u8 {
            let key = KeyCode::from_raw(code).unwrap();
            assert!(!matches!(key, KeyCode::Unknown(_)));
            assert_eq!(key.raw(), code);
        }
        assert_eq!(KeyCode::from_raw(0), None);
        assert_eq!(KeyCode::from_raw(0x42), Some(KeyCode::Unknown(0x42)));
    }

    #[test]
    fn test_macro_numbers() {
        assert_eq!(KeyCode::M1FeedPlus.macro_number(), Some(1));
        assert_eq!(KeyCode::M8SpindleOnOff.macro_number(), Some(8));
        assert_eq!(KeyCode::M9ProbeZ.macro_number(), Some(9));
        assert_eq!(KeyCode::M10.macro_number(), Some(10));
        assert_eq!(KeyCode::Fn.macro_number(), None);
        assert_eq!(KeyCode::Reset.macro_number(), None);
    }

    #[test]
    fn test_coordinate_roundtrip_negative() {
        let bytes = encode_coordinate(-965.2345678);
        assert_eq!(bytes[3] & 0x80, 0x80);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 965);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3] & 0x7F]), 2345);

        let decoded = decode_coordinate(bytes);
        assert!(decoded < 0.0);
        assert!((decoded - -965.2345678).abs() < 1e-4);
    }

    #[test]
    fn test_coordinate_positive_and_saturation() {
        let decoded = decode_coordinate(encode_coordinate(1155.841333));
        assert!((decoded - 1155.841333).abs() < 1e-4);
        assert_eq!(encode_coordinate(12.5)[3] & 0x80, 0);

        let saturated = encode_coordinate(70000.0);
        assert_eq!(u16::from_le_bytes([saturated[0], saturated[1]]), u16::MAX);
    }

    #[test]
    fn test_buffer_index_skips_report_ids() {
        assert_eq!(DisplayReport::buffer_index(0), 1);
        assert_eq!(DisplayReport::buffer_index(6), 7);
        assert_eq!(DisplayReport::buffer_index(7), 9);
        assert_eq!(DisplayReport::buffer_index(13), 15);
        assert_eq!(DisplayReport::buffer_index(14), 17);
        assert_eq!(DisplayReport::buffer_index(20), 23);
    }

    #[test]
    fn test_initial_display_report() {
        let report = DisplayReport::new();
        let bytes = report.as_bytes();
        assert_eq!(&bytes[..8], &[0x06, 0xFE, 0xFD, SEED, 0x81, 0, 0, 0]);
        assert_eq!(bytes[8], DISPLAY_REPORT_ID);
        assert_eq!(bytes[16], DISPLAY_REPORT_ID);
    }

    #[test]
    fn test_display_fields() {
        let mut report = DisplayReport::new();
        report.set_coordinate(1, -44.8365);
        report.set_mode(indicator::MODE_CONTINUOUS);
        report.set_work_coordinates(false);
        report.set_feed_rate(6000);
        report.set_spindle_speed(12000);

        assert!((report.coordinate(1) - -44.8365).abs() < 1e-4);
        assert_eq!(report.indicator(), 0x00);
        assert_eq!(report.coordinate(0), 0.0);

        // feed rate lands on payload 16-17 -> buffer 19-20
        let bytes = report.as_bytes();
        assert_eq!(u16::from_le_bytes([bytes[19], bytes[20]]), 6000);
        assert_eq!(u16::from_le_bytes([bytes[21], bytes[22]]), 12000);
    }

    #[test]
    fn test_packets() {
        let report = DisplayReport::new();
        let first = report.packet(0).unwrap();
        assert_eq!(first[0], DISPLAY_REPORT_ID);
        assert!(report.packet(2).is_some());
        assert!(report.packet(3).is_none());
    }
}
