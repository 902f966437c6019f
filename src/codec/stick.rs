//! PlayStation stick byte to Xbox stick axis.

/// Xbox 360 stick range
pub const XPAD_STICK_MIN: i32 = -32768;
pub const XPAD_STICK_MAX: i32 = 32767;
pub const XPAD_FUZZ: i32 = 16;
pub const XPAD_FLAT: i32 = 128;

/// PlayStation stick range around its centre of 128
const PS_CENTER: i32 = 128;
const PS_NEG_SPAN: i32 = 128;
const PS_POS_SPAN: i32 = 127;
const PS_FLAT: i32 = 15;

const H_PS_FLAT: i32 = PS_FLAT / 2;
const H_XPAD_FLAT: i32 = XPAD_FLAT / 2;

/// Translate a raw stick byte into the Xbox axis range.
///
/// Values within half the PS flat zone of centre give 0. Outside of it the
/// remaining travel is scaled linearly so the first step lands just past
/// half the Xbox flat zone and the extremes land on the Xbox extremes.
pub fn translate(raw: u8) -> i32 {
    let value = raw as i32 - PS_CENTER;

    if (-H_PS_FLAT..=H_PS_FLAT).contains(&value) {
        0
    } else if value < 0 {
        (value + H_PS_FLAT) * (-XPAD_STICK_MIN - H_XPAD_FLAT) / (PS_NEG_SPAN - H_PS_FLAT)
            - H_XPAD_FLAT
    } else {
        (value - H_PS_FLAT) * (XPAD_STICK_MAX - H_XPAD_FLAT) / (PS_POS_SPAN - H_PS_FLAT)
            + H_XPAD_FLAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_is_zero() {
        assert_eq!(translate(128), 0);
    }

    #[test]
    fn dead_zone_band() {
        for raw in 121..=135 {
            assert_eq!(translate(raw), 0, "raw {raw}");
        }
        assert!(translate(120) < 0);
        assert!(translate(136) > 0);
    }

    #[test]
    fn extremes() {
        assert_eq!(translate(0), XPAD_STICK_MIN);
        assert_eq!(translate(255), XPAD_STICK_MAX);
    }

    #[test]
    fn first_step_leaves_output_flat_zone() {
        assert!(translate(136) > H_XPAD_FLAT);
        assert!(translate(120) < -H_XPAD_FLAT);
    }

    #[test]
    fn monotonic_and_in_range() {
        let mut previous = translate(0);
        for raw in 1..=u8::MAX {
            let value = translate(raw);
            assert!(value >= previous, "raw {raw}: {value} < {previous}");
            assert!((XPAD_STICK_MIN..=XPAD_STICK_MAX).contains(&value));
            previous = value;
        }
    }
}
