// Copyright (c) 2017-2019 Rene van der Meer
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Bidirectional mapping between integer bit rates and platform speed
//! codes (`libc::speed_t`/`B*` constants).
//!
//! `speed_to_code` rounds defensively downward: any rate that falls
//! between two supported platform rates resolves to the lower one, so a
//! caller can never end up driving the line faster than requested.

use libc::speed_t;
use libc::{B0, B115200, B19200, B230400, B300, B38400, B4800, B57600, B9600};
use libc::{B1200, B2400};

#[cfg(target_os = "linux")]
use libc::{B1000000, B1152000, B1500000, B2000000, B2500000, B3000000, B3500000, B4000000};
#[cfg(target_os = "linux")]
use libc::{B460800, B500000, B576000, B921600};

/// Converts a requested bit rate into the platform speed code immediately
/// below or equal to it. Inputs below 1200 map to 300 Bd; unrecognized
/// (absurdly large) inputs map to 9600 Bd.
pub fn speed_to_code(rate: u32) -> speed_t {
    if rate < 1200 {
        B300
    } else if rate < 2400 {
        B1200
    } else if rate < 4800 {
        B2400
    } else if rate < 9600 {
        B4800
    } else if rate < 19200 {
        B9600
    } else if rate < 38400 {
        B19200
    } else if rate < 57600 {
        B38400
    } else if rate < 115200 {
        B57600
    } else if rate < 230400 {
        B115200
    } else {
        #[cfg(target_os = "linux")]
        {
            if rate < 460800 {
                B230400
            } else if rate < 500000 {
                B460800
            } else if rate < 576000 {
                B500000
            } else if rate < 921600 {
                B576000
            } else if rate < 1_000_000 {
                B921600
            } else if rate < 1_152_000 {
                B1000000
            } else if rate < 1_500_000 {
                B1152000
            } else if rate < 2_000_000 {
                B1500000
            } else if rate < 2_500_000 {
                B2000000
            } else if rate < 3_000_000 {
                B2500000
            } else if rate < 3_500_000 {
                B3000000
            } else if rate < 4_000_000 {
                B3500000
            } else {
                B4000000
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            B230400
        }
    }
}

/// Converts a platform speed code back into a bit rate. Unknown codes
/// (including `B0`, which is the "leave speed untouched" sentinel, not a
/// real rate) return `0`.
pub fn code_to_speed(code: speed_t) -> u32 {
    #[allow(unreachable_patterns)]
    match code {
        B300 => 300,
        B1200 => 1_200,
        B2400 => 2_400,
        B4800 => 4_800,
        B9600 => 9_600,
        B19200 => 19_200,
        B38400 => 38_400,
        B57600 => 57_600,
        B115200 => 115_200,
        B230400 => 230_400,
        #[cfg(target_os = "linux")]
        B460800 => 460_800,
        #[cfg(target_os = "linux")]
        B500000 => 500_000,
        #[cfg(target_os = "linux")]
        B576000 => 576_000,
        #[cfg(target_os = "linux")]
        B921600 => 921_600,
        #[cfg(target_os = "linux")]
        B1000000 => 1_000_000,
        #[cfg(target_os = "linux")]
        B1152000 => 1_152_000,
        #[cfg(target_os = "linux")]
        B1500000 => 1_500_000,
        #[cfg(target_os = "linux")]
        B2000000 => 2_000_000,
        #[cfg(target_os = "linux")]
        B2500000 => 2_500_000,
        #[cfg(target_os = "linux")]
        B3000000 => 3_000_000,
        #[cfg(target_os = "linux")]
        B3500000 => 3_500_000,
        #[cfg(target_os = "linux")]
        B4000000 => 4_000_000,
        B0 => 0,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staircase_rounds_down() {
        assert_eq!(code_to_speed(speed_to_code(300)), 300);
        assert_eq!(code_to_speed(speed_to_code(1199)), 300);
        assert_eq!(code_to_speed(speed_to_code(1200)), 1_200);
        assert_eq!(code_to_speed(speed_to_code(2399)), 1_200);
        assert_eq!(code_to_speed(speed_to_code(19_199)), 9_600);
        assert_eq!(code_to_speed(speed_to_code(115_199)), 57_600);
    }

    #[test]
    fn below_minimum_maps_to_300() {
        assert_eq!(speed_to_code(0), B300);
        assert_eq!(speed_to_code(110), B300);
    }

    #[test]
    fn unknown_code_maps_to_zero() {
        assert_eq!(code_to_speed(0xffff), 0);
    }

    #[test]
    fn monotone_non_decreasing() {
        let mut prev = code_to_speed(speed_to_code(0));
        for rate in (0..2_000_000u32).step_by(997) {
            let decoded = code_to_speed(speed_to_code(rate));
            assert!(decoded >= prev);
            prev = decoded;
        }
    }

    proptest::proptest! {
        #[test]
        fn code_to_speed_never_exceeds_input(rate in 300u32..4_000_000u32) {
            let decoded = code_to_speed(speed_to_code(rate));
            proptest::prop_assert!(decoded <= rate);
        }
    }
}
