//! DualShock 4 over USB.

use super::{bit, ControllerState, XboxButtons};
use crate::usb::{ControlSetup, HidReportType};

pub const REPORT_LEN: usize = 64;
pub const ENDPOINT_IN: u8 = 0x84;

const RUMBLE_REPORT_ID: u8 = 0x05;
const RUMBLE_REPORT_LEN: usize = 32;
const RUMBLE_FLAGS: u8 = 0xff;

const LEFT_X: usize = 1;
const LEFT_Y: usize = 2;
const RIGHT_X: usize = 3;
const RIGHT_Y: usize = 4;
const HAT_AND_FACE: usize = 5;
const BUTTONS_1: usize = 6;
const BUTTONS_2: usize = 7;
const L2_ANALOG: usize = 8;
const R2_ANALOG: usize = 9;
const BATTERY: usize = 12;

/// Hat switch positions, clockwise from up
const HAT_TABLE: [(i8, i8); 8] = [
    (0, -1),  // up
    (1, -1),  // up-right
    (1, 0),   // right
    (1, 1),   // down-right
    (0, 1),   // down
    (-1, 1),  // down-left
    (-1, 0),  // left
    (-1, -1), // up-left
];

/// Map the 4 bit hat value to (x, y). 8 means released.
pub fn hat_to_axes(hat: u8) -> (i8, i8) {
    HAT_TABLE.get(hat as usize).copied().unwrap_or((0, 0))
}

pub fn decode(report: &[u8]) -> Option<ControllerState> {
    let report: &[u8; REPORT_LEN] = report.try_into().ok()?;

    let b0 = report[HAT_AND_FACE];
    let b1 = report[BUTTONS_1];
    let b2 = report[BUTTONS_2];

    let (dpad_x, dpad_y) = hat_to_axes(b0 & 0x0f);

    Some(ControllerState {
        left_stick_x: report[LEFT_X],
        left_stick_y: report[LEFT_Y],
        right_stick_x: report[RIGHT_X],
        right_stick_y: report[RIGHT_Y],
        left_trigger: report[L2_ANALOG],
        right_trigger: report[R2_ANALOG],
        dpad_x,
        dpad_y,
        buttons: XboxButtons {
            x: bit(b0, 4),           // square
            a: bit(b0, 5),           // cross
            b: bit(b0, 6),           // circle
            y: bit(b0, 7),           // triangle
            left_bumper: bit(b1, 0), // L1
            right_bumper: bit(b1, 1),
            back: bit(b1, 4),        // share
            start: bit(b1, 5),       // options
            left_thumb: bit(b1, 6),
            right_thumb: bit(b1, 7),
            guide: bit(b2, 0),
        },
    })
}

pub fn battery_level(report: &[u8]) -> Option<u8> {
    (report.len() == REPORT_LEN).then(|| report[BATTERY])
}

/// Output report 0x05 with both motor speeds. The flags byte also enables
/// the light bar and flash fields, which stay zero, so the light bar goes dark.
pub fn rumble_report(strong: u16, weak: u16) -> (ControlSetup, Vec<u8>) {
    let mut report = vec![0u8; RUMBLE_REPORT_LEN];
    report[0] = RUMBLE_REPORT_ID;
    report[1] = RUMBLE_FLAGS;
    report[4] = (weak >> 8) as u8;
    report[5] = (strong >> 8) as u8;

    (
        ControlSetup::hid_set_report(HidReportType::Output, RUMBLE_REPORT_ID),
        report,
    )
}
