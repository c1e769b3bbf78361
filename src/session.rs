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

//! The central [`Session`] entity and its `Lexer`/`PdsState` sub-records.

use std::mem;
use std::os::unix::io::RawFd;
use std::time::Instant;

use crate::classify::SourceType;
use crate::fd::UNALLOCATED_FD;

/// What kind of GNSS-adjacent service a session provides. The
/// device-acquisition core only ever produces `Sensor` sessions; other
/// service types belong to the higher layers this core doesn't define.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ServiceType {
    Sensor,
}

/// Tags the contents of the lexer's output buffer.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PacketType {
    /// No packet recognized yet, or the previous attempt didn't sync.
    BadPacket,
    /// `output_buffer[..output_len]` holds a raw NMEA sentence.
    NmeaPacket,
}

/// Scratch state for whatever lexer deposits bytes into this session's
/// output buffer. The core never interprets these bytes; it only manages
/// the buffer and the retry counter the hunt controller reads.
pub struct Lexer {
    pub input_buffer: Vec<u8>,
    pub output_buffer: Vec<u8>,
    pub output_len: usize,
    pub packet_type: PacketType,
    pub retry_counter: u32,
}

impl Lexer {
    fn new() -> Lexer {
        Lexer {
            input_buffer: vec![0u8; 4096],
            output_buffer: vec![0u8; 4096],
            output_len: 0,
            packet_type: PacketType::BadPacket,
            retry_counter: 0,
        }
    }

    /// Called by `termios::set_speed` every time the line configuration
    /// changes, so a garbled in-flight packet from the old baud rate never
    /// leaks into the new one.
    pub fn reset(&mut self) {
        self.output_len = 0;
        self.packet_type = PacketType::BadPacket;
        self.retry_counter = 0;
    }
}

/// Per-session state for the Qualcomm QRTR/PDS driver (C6). Irrelevant to
/// every other source type.
#[derive(Debug, Default, Copy, Clone)]
pub struct PdsState {
    pub ready: bool,
    /// `-1` matches any node; otherwise the specific node id requested in
    /// the `qrtr:<id>` path.
    pub host_id: i32,
    pub node: u32,
    pub port: u32,
}

/// The central session entity: one GNSS device attachment, its
/// classification, its current termios/hunt state, and (if applicable)
/// its QRTR/PDS driver state.
pub struct Session {
    pub path: String,
    pub source_type: SourceType,
    pub service_type: ServiceType,
    pub fd: RawFd,

    pub ttyset_current: libc::termios,
    pub ttyset_saved: libc::termios,

    pub baud_index: usize,
    pub stop_bits: u32,
    pub parity: u8,
    /// Last rate at which a packet lock was achieved on this path. `-1`
    /// means never.
    pub saved_baud: i64,
    pub ts_start_current_baud: Instant,

    pub lexer: Lexer,
    pub pds: PdsState,

    pub msg_buf: Vec<u8>,
}

impl Session {
    /// Allocates a session for `path`, not yet opened (`fd ==
    /// UNALLOCATED_FD`).
    pub fn new<S: Into<String>>(path: S) -> Session {
        Session {
            path: path.into(),
            source_type: SourceType::Unknown,
            service_type: ServiceType::Sensor,
            fd: UNALLOCATED_FD,
            ttyset_current: zeroed_termios(),
            ttyset_saved: zeroed_termios(),
            baud_index: 0,
            stop_bits: 1,
            parity: b'N',
            saved_baud: -1,
            ts_start_current_baud: Instant::now(),
            lexer: Lexer::new(),
            pds: PdsState { host_id: -1, ..PdsState::default() },
            msg_buf: Vec::new(),
        }
    }

    /// `true` once `open` has allocated a real descriptor (not one of the
    /// sentinels).
    pub fn is_open(&self) -> bool {
        self.fd >= 0
    }

    /// Writes `buf` to the device (C7). Returns `0` without writing if
    /// `ctx` is readonly; otherwise writes, `tcdrain`s, and returns the
    /// `write(2)` result (`-1` on error, with `errno` set). A short write
    /// is only logged, not retried here — the caller owns retry policy.
    pub fn write(&mut self, ctx: &crate::context::Context, buf: &[u8]) -> isize {
        if ctx.readonly {
            return 0;
        }

        let written = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if written < 0 {
            log::error!("SER: write to {} failed: {}", self.path, std::io::Error::last_os_error());
        } else if (written as usize) < buf.len() {
            log::warn!("SER: short write to {}: {} of {} bytes", self.path, written, buf.len());
        }

        // tcdrain runs unconditionally, win or lose, matching the
        // original's (void)tcdrain(fd) after write().
        let _ = crate::termios::drain(self.fd);
        written as isize
    }

    /// Drains pending output, restores the line to its pre-open state
    /// (forcing a hangup via `B0` first, for devices that ignore
    /// `HUPCL`), closes the descriptor, and invalidates `fd` (C7).
    pub fn close(&mut self, ctx: &crate::context::Context) {
        if self.fd < 0 {
            return;
        }

        if !ctx.readonly {
            let _ = crate::termios::drain(self.fd);
        }

        if unsafe { libc::isatty(self.fd) } != 0 {
            if let Ok(saved) = crate::termios::get_attributes(self.fd) {
                self.ttyset_saved = saved;
            }

            let mut hangup = self.ttyset_saved;
            unsafe {
                libc::cfsetispeed(&mut hangup, libc::B0);
                libc::cfsetospeed(&mut hangup, libc::B0);
            }
            let _ = crate::termios::set_attributes(self.fd, &hangup);

            let mut restored = self.ttyset_saved;
            restored.c_cflag |= libc::HUPCL;
            let _ = crate::termios::set_attributes(self.fd, &restored);
        }

        unsafe { libc::close(self.fd) };
        self.fd = UNALLOCATED_FD;
        log::trace!("SER: closed {}", self.path);
    }
}

fn zeroed_termios() -> libc::termios {
    unsafe { mem::zeroed() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_unallocated() {
        let s = Session::new("/dev/ttyUSB0");
        assert_eq!(s.fd, UNALLOCATED_FD);
        assert_eq!(s.saved_baud, -1);
        assert!(!s.is_open());
    }

    #[test]
    fn lexer_reset_clears_retry_state() {
        let mut lexer = Lexer::new();
        lexer.retry_counter = 5;
        lexer.output_len = 10;
        lexer.packet_type = PacketType::NmeaPacket;
        lexer.reset();
        assert_eq!(lexer.retry_counter, 0);
        assert_eq!(lexer.output_len, 0);
        assert_eq!(lexer.packet_type, PacketType::BadPacket);
    }

    #[test]
    fn write_is_a_noop_when_readonly() {
        let (master, slave) = crate::test_support::open_pty();
        let mut session = Session::new("/dev/pts/test");
        session.fd = slave;

        let ctx = crate::context::Context::new().with_readonly(true);
        let n = session.write(&ctx, b"hello");
        assert_eq!(n, 0);

        unsafe {
            libc::close(master);
            libc::close(slave);
        }
    }

    #[test]
    fn write_sends_bytes_when_not_readonly() {
        let (master, slave) = crate::test_support::open_pty();
        let mut session = Session::new("/dev/pts/test");
        session.fd = slave;

        let ctx = crate::context::Context::new();
        let n = session.write(&ctx, b"hello");
        assert_eq!(n, 5);

        let mut buf = [0u8; 5];
        let read = unsafe { libc::read(master, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        assert_eq!(read, 5);
        assert_eq!(&buf, b"hello");

        unsafe {
            libc::close(master);
            libc::close(slave);
        }
    }

    #[test]
    fn write_drains_even_when_the_write_itself_fails() {
        // An already-closed fd makes write(2) fail with EBADF; tcdrain on
        // the same fd would also fail, but it must still be *attempted*
        // (and not panic) on this path.
        let (master, slave) = crate::test_support::open_pty();
        unsafe { libc::close(slave) };

        let mut session = Session::new("/dev/pts/test");
        session.fd = slave;

        let ctx = crate::context::Context::new();
        let n = session.write(&ctx, b"hello");
        assert!(n < 0);

        unsafe { libc::close(master) };
    }

    #[test]
    fn close_invalidates_fd() {
        let (master, slave) = crate::test_support::open_pty();
        let mut session = Session::new("/dev/pts/test");
        session.fd = slave;
        session.ttyset_saved = crate::termios::get_attributes(slave).unwrap();

        let ctx = crate::context::Context::new();
        session.close(&ctx);

        assert_eq!(session.fd, UNALLOCATED_FD);
        unsafe { libc::close(master) };
    }
}
