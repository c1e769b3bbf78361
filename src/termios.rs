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

//! Raw termios plumbing and the `set_speed`/`set_raw` contract.
//!
//! The 200ms settle in [`set_speed`] is a hard contract, not advice: flush
//! followed by a 200-millisecond delay followed by another flush has been
//! found to work reliably on USB-serial bridges like the pl2303, where a
//! shorter delay (100ms) allows occasional failure to lock. Do not shorten
//! it without re-validating against real hardware.

use std::io;
use std::os::unix::io::RawFd;
use std::thread::sleep;
use std::time::{Duration, Instant};

use libc::{c_int, termios};
use libc::{TCIOFLUSH, TCSANOW};
use libc::{CS7, CS8, CSIZE, CSTOPB, INPCK, PARENB, PARMRK, PARODD};

use crate::context::Context;
use crate::driver::DriverTable;
use crate::session::Session;

fn check(retval: c_int) -> io::Result<c_int> {
    if retval == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(retval)
    }
}

/// `tcgetattr(3)`.
pub fn get_attributes(fd: RawFd) -> io::Result<termios> {
    let mut attr: termios = unsafe { std::mem::zeroed() };
    check(unsafe { libc::tcgetattr(fd, &mut attr) })?;
    Ok(attr)
}

/// `tcsetattr(fd, TCSANOW, …)`.
pub fn set_attributes(fd: RawFd, attr: &termios) -> io::Result<()> {
    check(unsafe { libc::tcsetattr(fd, TCSANOW, attr) })?;
    Ok(())
}

/// `tcflush(fd, TCIOFLUSH)` — discards both pending input and output.
pub fn flush(fd: RawFd) -> io::Result<()> {
    check(unsafe { libc::tcflush(fd, TCIOFLUSH) })?;
    Ok(())
}

/// `tcdrain(3)` — blocks until all queued output has been transmitted.
pub fn drain(fd: RawFd) -> io::Result<()> {
    check(unsafe { libc::tcdrain(fd) })?;
    Ok(())
}

/// Normalizes a caller-supplied parity byte to exactly one of `b'E'`,
/// `b'O'`, `b'N'` — the backward-compatibility mapping also accepts the
/// numeric codes `2` (even), `1` (odd), `0` (none).
pub fn normalize_parity(parity: u8) -> u8 {
    match parity {
        b'E' | 2 => b'E',
        b'O' | 1 => b'O',
        _ => b'N',
    }
}

/// Programs speed/parity/stop-bits on `session`'s descriptor, following
/// the contract in full:
///
/// 1. A fixed context speed/framing overrides the requested values.
/// 2. Parity is normalized to `E`/`O`/`N`.
/// 3. `speed::speed_to_code` converts the rate; `B0` means "leave the
///    speed untouched" (used to preserve the saved rate across an
///    open/close cycle).
/// 4. The change is skipped entirely if the resulting triple matches the
///    session's current one, to avoid spurious FIFO flushes while hunting.
/// 5. `INPCK` is enabled iff parity is `E`/`O`; control flags select
///    `CS7|CSTOPB` for two stop bits, `CS8` otherwise.
/// 6. After `tcsetattr`, flush, sleep 200ms, flush again — see the module
///    doc comment.
pub fn set_speed(
    session: &mut Session,
    ctx: &Context,
    drivers: &mut DriverTable,
    speed: u32,
    parity: u8,
    stop_bits: u32,
) {
    let speed = if ctx.fixed_port_speed > 0 {
        ctx.fixed_port_speed
    } else {
        speed
    };
    let (parity, stop_bits) = match (ctx.fixed_parity(), ctx.fixed_stop_bits()) {
        (Some(p), Some(s)) => (p, s),
        _ => (parity, stop_bits),
    };
    let parity = normalize_parity(parity);

    let rate = crate::speed::speed_to_code(speed);

    let current_rate = unsafe { libc::cfgetispeed(&session.ttyset_current) };
    let unchanged =
        rate == current_rate && parity == session.parity && stop_bits == session.stop_bits;

    if !unchanged {
        if rate == libc::B0 {
            log::trace!(
                "SER: keeping old speed {}",
                crate::speed::code_to_speed(current_rate)
            );
        } else {
            unsafe {
                libc::cfsetispeed(&mut session.ttyset_current, rate);
                libc::cfsetospeed(&mut session.ttyset_current, rate);
            }
            log::trace!("SER: set speed {}({})", speed, rate);
        }

        session.ttyset_current.c_iflag &= !(PARMRK | INPCK);
        session.ttyset_current.c_cflag &= !(CSIZE | CSTOPB | PARENB | PARODD);
        session.ttyset_current.c_cflag |= if stop_bits == 2 { CS7 | CSTOPB } else { CS8 };
        match parity {
            b'E' => {
                session.ttyset_current.c_iflag |= INPCK;
                session.ttyset_current.c_cflag |= PARENB;
            }
            b'O' => {
                session.ttyset_current.c_iflag |= INPCK;
                session.ttyset_current.c_cflag |= PARENB | PARODD;
            }
            _ => {}
        }

        if let Err(err) = set_attributes(session.fd, &session.ttyset_current) {
            // Strangely this fails on non-serial ports, but if we don't
            // try, we get other failures. Tolerated, as upstream always
            // has, until it can be nailed down.
            log::debug!(
                "SER: error setting port attributes: {} (sourcetype {:?})",
                err,
                session.source_type
            );
        }

        // Serious black magic: see the module doc comment. Don't shorten
        // the 200ms delay.
        let _ = flush(session.fd);
        sleep(Duration::from_millis(200));
        let _ = flush(session.fd);
    }

    log::info!(
        "SER: current speed {}, {}{}{}",
        crate::speed::code_to_speed(unsafe { libc::cfgetispeed(&session.ttyset_current) }),
        9 - stop_bits,
        parity as char,
        stop_bits
    );

    session.parity = parity;
    session.stop_bits = stop_bits;

    wakeup_if_applicable(session, ctx, drivers);

    session.lexer.reset();
    session.ts_start_current_baud = Instant::now();
}

fn wakeup_if_applicable(session: &mut Session, ctx: &Context, drivers: &mut DriverTable) {
    use crate::classify::SourceType;

    if ctx.readonly {
        return;
    }
    if session.source_type == SourceType::Usb || session.source_type == SourceType::Bluetooth {
        return;
    }
    if unsafe { libc::isatty(session.fd) } == 0 {
        return;
    }
    drivers.wakeup(session);
}

/// Configures the descriptor for canonical-off, echo-off, 8-bit,
/// no-parity, minimally processed raw I/O (gpsd's `cfmakeraw`
/// equivalent), applied immediately via `TCSANOW`.
pub fn set_raw(session: &mut Session) -> io::Result<()> {
    use libc::{BRKINT, ICRNL, IGNBRK, IGNCR, INLCR, ISTRIP, IXON, OPOST};
    use libc::{ECHO, ECHONL, ICANON, IEXTEN, ISIG};

    let mut attr = session.ttyset_current;
    attr.c_iflag &= !(IGNBRK | BRKINT | PARMRK | ISTRIP | INLCR | IGNCR | ICRNL | IXON);
    attr.c_oflag &= !OPOST;
    attr.c_lflag &= !(ECHO | ECHONL | ICANON | ISIG | IEXTEN);
    attr.c_cflag &= !(CSIZE | PARENB);
    attr.c_cflag |= CS8;

    set_attributes(session.fd, &attr)?;
    session.ttyset_current = attr;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_normalization_covers_every_input() {
        for input in [b'E', 2, b'O', 1, b'N', 0, 255] {
            let normalized = normalize_parity(input);
            assert!(normalized == b'E' || normalized == b'O' || normalized == b'N');
        }
    }

    proptest::proptest! {
        #[test]
        fn parity_normalization_is_total(byte: u8) {
            let normalized = normalize_parity(byte);
            proptest::prop_assert!(matches!(normalized, b'E' | b'O' | b'N'));
        }
    }

    fn fixture() -> (Session, Context, DriverTable, RawFd) {
        let (master, slave) = crate::test_support::open_pty();
        let mut session = Session::new("/dev/pts/test");
        session.source_type = crate::classify::SourceType::Pty;
        session.fd = slave;
        session.ttyset_current = get_attributes(slave).unwrap();
        session.ttyset_saved = session.ttyset_current;
        (session, Context::new(), DriverTable::new(), master)
    }

    #[test]
    fn set_speed_is_idempotent_when_unchanged() {
        let (mut session, ctx, mut drivers, master) = fixture();

        set_speed(&mut session, &ctx, &mut drivers, 9600, b'N', 1);
        let after_first = session.ttyset_current;

        // Second call with the identical triple must skip the 200ms
        // settle entirely (no flush/sleep/tcsetattr) — we can't observe
        // the sleep directly, but we can confirm the line state is
        // unchanged and the call returns promptly.
        let start = Instant::now();
        set_speed(&mut session, &ctx, &mut drivers, 9600, b'N', 1);
        let elapsed = start.elapsed();

        assert_eq!(session.ttyset_current.c_cflag, after_first.c_cflag);
        assert!(elapsed < Duration::from_millis(50), "unchanged triple must not pay the 200ms settle");

        unsafe { libc::close(master) };
    }

    #[test]
    fn set_speed_changed_triple_pays_the_settle() {
        let (mut session, ctx, mut drivers, master) = fixture();

        set_speed(&mut session, &ctx, &mut drivers, 9600, b'N', 1);
        let start = Instant::now();
        set_speed(&mut session, &ctx, &mut drivers, 19200, b'N', 1);
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert_eq!(
            crate::speed::code_to_speed(unsafe { libc::cfgetispeed(&session.ttyset_current) }),
            19200
        );

        unsafe { libc::close(master) };
    }
}
