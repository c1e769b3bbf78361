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

//! Drives the speed/framing search until packet sync or exhaustion.
//!
//! This constant controls how many characters the packet sniffer will
//! spend looking for a packet leader before it gives up. It must be
//! larger than the largest packet we expect or we risk never syncing up
//! at all. Large values produce annoying startup lag.

use std::time::Instant;

use crate::classify::SourceType;
use crate::context::Context;
use crate::driver::DriverTable;
use crate::session::Session;

/// Every rate we're likely to see on a GNSS receiver. Element 0 is a
/// "keep current" slot used only on first entry into the hunt loop.
const HUNT_RATES: [u32; 10] = [0, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// `MAX_PACKET_LENGTH + 128`; must exceed the largest packet we expect.
const MAX_PACKET_LENGTH: u32 = 512;
const SNIFF_RETRIES: u32 = MAX_PACKET_LENGTH + 128;

/// Advances the hunt cursor. Returns `true` to keep hunting, `false` to
/// give up (the outer read loop should then treat the session as
/// unsyncable and typically `close` it).
pub fn next_hunt_setting(session: &mut Session, ctx: &Context, drivers: &mut DriverTable) -> bool {
    if unsafe { libc::isatty(session.fd) } == 0 {
        return false;
    }
    if session.source_type == SourceType::Pps {
        return false;
    }

    let elapsed = Instant::now().duration_since(session.ts_start_current_baud);

    session.lexer.retry_counter += 1;
    if session.lexer.retry_counter <= SNIFF_RETRIES && elapsed.as_secs() <= 3 {
        return true;
    }

    // The current cell is exhausted.
    if ctx.fixed_port_speed > 0 {
        return false;
    }

    session.baud_index += 1;
    if session.baud_index >= HUNT_RATES.len() {
        session.baud_index = 0;
        if !ctx.fixed_port_framing.is_empty() {
            return false;
        }
        session.stop_bits += 1;
        if session.stop_bits > 2 {
            return false;
        }
    }

    let (parity, stop_bits) = match (ctx.fixed_parity(), ctx.fixed_stop_bits()) {
        (Some(p), Some(s)) => (p, s),
        _ => (session.parity, session.stop_bits),
    };

    crate::termios::set_speed(
        session,
        ctx,
        drivers,
        HUNT_RATES[session.baud_index],
        parity,
        stop_bits,
    );
    session.lexer.retry_counter = 0;

    true
}

/// Called by the higher layer on first successful packet. Memorizes the
/// current input speed (if none was remembered yet) so a subsequent open
/// of the same path converges instantly.
pub fn assert_sync(session: &mut Session) {
    if session.saved_baud == -1 {
        let code = unsafe { libc::cfgetispeed(&session.ttyset_current) };
        session.saved_baud = i64::from(crate::speed::code_to_speed(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Session, Context, DriverTable) {
        let mut session = Session::new("/dev/ttyUSB0");
        session.source_type = SourceType::Rs232;
        session.fd = -1; // not a tty in this unit test environment
        (session, Context::new(), DriverTable::new())
    }

    #[test]
    fn non_tty_never_hunts() {
        let (mut session, ctx, mut drivers) = fixture();
        assert!(!next_hunt_setting(&mut session, &ctx, &mut drivers));
    }

    #[test]
    fn pps_never_hunts() {
        let (mut session, ctx, mut drivers) = fixture();
        session.source_type = SourceType::Pps;
        assert!(!next_hunt_setting(&mut session, &ctx, &mut drivers));
    }

    #[test]
    fn assert_sync_only_sets_once() {
        let mut session = Session::new("/dev/ttyUSB0");
        unsafe {
            libc::cfsetispeed(&mut session.ttyset_current, libc::B9600);
        }
        assert_sync(&mut session);
        assert_eq!(session.saved_baud, 9600);

        unsafe {
            libc::cfsetispeed(&mut session.ttyset_current, libc::B4800);
        }
        assert_sync(&mut session);
        assert_eq!(session.saved_baud, 9600, "assert_sync must not overwrite an existing lock");
    }

    #[test]
    fn hunt_rate_table_has_ten_entries() {
        assert_eq!(HUNT_RATES.len(), 10);
    }

    fn pty_fixture() -> (Session, Context, DriverTable, libc::c_int) {
        let (master, slave) = crate::test_support::open_pty();
        let mut session = Session::new("/dev/pts/test");
        session.source_type = SourceType::Pty;
        session.fd = slave;
        session.ttyset_current = crate::termios::get_attributes(slave).unwrap();
        session.ttyset_saved = session.ttyset_current;
        (session, Context::new(), DriverTable::new(), master)
    }

    /// S3: a remembered `saved_baud` converges on the very first cell and
    /// never needs to advance within the 3-second deadline.
    #[test]
    fn saved_baud_converges_without_advancing() {
        let (mut session, ctx, mut drivers, master) = pty_fixture();
        session.saved_baud = 9600; // seeded by the opener before hunting starts

        assert!(next_hunt_setting(&mut session, &ctx, &mut drivers));
        assert_eq!(session.baud_index, 0, "must not have advanced off the remembered rate");

        unsafe { libc::close(master) };
    }

    /// S4: with free speed search and fixed 8N1 framing, exhausting every
    /// cell at the current stop-bit setting walks through all nine
    /// non-zero rates and then gives up.
    #[test]
    fn exhausts_every_rate_then_gives_up() {
        let (mut session, ctx, mut drivers, master) = pty_fixture();

        let mut advances = 0;
        loop {
            session.lexer.retry_counter = SNIFF_RETRIES + 1;
            session.ts_start_current_baud = Instant::now() - std::time::Duration::from_secs(4);
            if !next_hunt_setting(&mut session, &ctx, &mut drivers) {
                break;
            }
            advances += 1;
            assert!(advances <= HUNT_RATES.len() * 3, "hunt loop failed to terminate");
        }

        // One full lap through 9 non-zero rates per stop-bit setting,
        // across stop_bits 1 and 2 (3 exhausts the search).
        assert!(advances >= HUNT_RATES.len() - 1);

        unsafe { libc::close(master) };
    }
}
