//! Sixaxis / DualShock 3 over USB.

use super::{bit, ControllerState, XboxButtons};
use crate::usb::{ControlSetup, HidReportType};

pub const REPORT_LEN: usize = 49;
pub const ENDPOINT_IN: u8 = 0x81;

/// Feature report that switches the pad into operational mode
pub const OPERATIONAL_REPORT_ID: u8 = 0xf2;
pub const OPERATIONAL_REPORT_LEN: usize = 17;

const RUMBLE_REPORT_ID: u8 = 0x01;
const RUMBLE_DURATION: u8 = 0xfe;

// Byte offsets into the input report
const BUTTONS_0: usize = 2;
const BUTTONS_1: usize = 3;
const BUTTONS_2: usize = 4;
const LEFT_X: usize = 6;
const LEFT_Y: usize = 7;
const RIGHT_X: usize = 8;
const RIGHT_Y: usize = 9;
const L2_ANALOG: usize = 18;
const R2_ANALOG: usize = 19;

/// GET_REPORT request that enables input reports
pub fn operational_request() -> ControlSetup {
    ControlSetup::hid_get_report(HidReportType::Feature, OPERATIONAL_REPORT_ID)
}

pub fn decode(report: &[u8]) -> Option<ControllerState> {
    let report: &[u8; REPORT_LEN] = report.try_into().ok()?;

    let b0 = report[BUTTONS_0];
    let b1 = report[BUTTONS_1];
    let b2 = report[BUTTONS_2];

    let (select, l3, r3, start) = (bit(b0, 0), bit(b0, 1), bit(b0, 2), bit(b0, 3));
    let (up, right, down, left) = (bit(b0, 4), bit(b0, 5), bit(b0, 6), bit(b0, 7));
    let (l1, r1) = (bit(b1, 2), bit(b1, 3));
    let (triangle, circle, cross, square) = (bit(b1, 4), bit(b1, 5), bit(b1, 6), bit(b1, 7));
    let playstation = bit(b2, 0);

    // Down beats up and right beats left when both are held
    let dpad_y = if down {
        1
    } else if up {
        -1
    } else {
        0
    };
    let dpad_x = if right {
        1
    } else if left {
        -1
    } else {
        0
    };

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
            a: cross,
            b: circle,
            x: square,
            y: triangle,
            left_bumper: l1,
            right_bumper: r1,
            back: select,
            start,
            guide: playstation,
            left_thumb: l3,
            right_thumb: r3,
        },
    })
}

/// Output report driving both motors.
///
/// The small motor only knows on and off; the large one takes the upper
/// byte of the strong magnitude.
pub fn rumble_report(strong: u16, weak: u16, led_mask: u8) -> (ControlSetup, Vec<u8>) {
    let small = u8::from(weak != 0);
    let large = (strong >> 8) as u8;

    #[rustfmt::skip]
    let report = vec![
        0x00, RUMBLE_DURATION, small, RUMBLE_DURATION, large,
        0x00, 0x00, 0x00, 0x00, led_mask,
        0xff, 0x27, 0x10, 0x00, 0x32, // LED 4
        0xff, 0x27, 0x10, 0x00, 0x32, // LED 3
        0xff, 0x27, 0x10, 0x00, 0x32, // LED 2
        0xff, 0x27, 0x10, 0x00, 0x32, // LED 1
        0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    (
        ControlSetup::hid_set_report(HidReportType::Output, RUMBLE_REPORT_ID),
        report,
    )
}
