pub mod ps3;
pub mod ps4;
pub mod stick;

/// Which wire format a physical pad speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Ps3,
    Ps4,
}

impl DeviceKind {
    /// Size of one input report in bytes
    pub fn report_len(self) -> usize {
        match self {
            Self::Ps3 => ps3::REPORT_LEN,
            Self::Ps4 => ps4::REPORT_LEN,
        }
    }

    /// Interrupt IN endpoint the pad sends its reports on
    pub fn input_endpoint(self) -> u8 {
        match self {
            Self::Ps3 => ps3::ENDPOINT_IN,
            Self::Ps4 => ps4::ENDPOINT_IN,
        }
    }

    /// The PS3 pad stays silent until it is switched to operational mode
    pub fn needs_activation(self) -> bool {
        matches!(self, Self::Ps3)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ps3 => f.write_str("PS3"),
            Self::Ps4 => f.write_str("PS4"),
        }
    }
}

/// Xbox style controller snapshot decoded from one report.
///
/// Stick axes still carry the raw PlayStation byte (0..=255, centre 128);
/// they are translated to the Xbox range by the emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    /// Left stick X axis (raw)
    pub left_stick_x: u8,
    /// Left stick Y axis (raw)
    pub left_stick_y: u8,
    /// Right stick X axis (raw)
    pub right_stick_x: u8,
    /// Right stick Y axis (raw)
    pub right_stick_y: u8,
    /// Left trigger (0 to 255)
    pub left_trigger: u8,
    /// Right trigger (0 to 255)
    pub right_trigger: u8,
    /// D-pad horizontal axis (-1, 0 or 1)
    pub dpad_x: i8,
    /// D-pad vertical axis (-1, 0 or 1, up is negative)
    pub dpad_y: i8,
    /// Button states
    pub buttons: XboxButtons,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XboxButtons {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub back: bool,
    pub start: bool,
    pub guide: bool,
    pub left_thumb: bool,
    pub right_thumb: bool,
}

/// Decode one input report.
///
/// Returns `None` when `report` is not exactly `kind.report_len()` bytes.
pub fn decode(kind: DeviceKind, report: &[u8]) -> Option<ControllerState> {
    match kind {
        DeviceKind::Ps3 => ps3::decode(report),
        DeviceKind::Ps4 => ps4::decode(report),
    }
}

/// Battery level carried in the report, if the wire format has one
pub fn battery_level(kind: DeviceKind, report: &[u8]) -> Option<u8> {
    match kind {
        DeviceKind::Ps3 => None,
        DeviceKind::Ps4 => ps4::battery_level(report),
    }
}

#[inline]
pub(crate) fn bit(byte: u8, n: u8) -> bool {
    byte & (1 << n) != 0
}
