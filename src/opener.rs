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

//! Orchestrates classify → open/connect → exclusion-lock → termios
//! bootstrap for every source type.

use std::ffi::CString;
use std::fs;
use std::os::unix::io::RawFd;
use std::time::Instant;

use libc::{c_int, CLOCAL, CREAD, CRTSCTS, CSTOPB, PARENB, PARODD};

use crate::classify::{self, SourceType};
use crate::context::Context;
use crate::driver::DriverTable;
use crate::fd::{PLACEHOLDING_FD, UNALLOCATED_FD};
use crate::session::Session;
use crate::termios;

/// Opens `session.path`, classifying it first.
///
/// Returns the resulting descriptor (possibly one of the
/// [`PLACEHOLDING_FD`]/[`UNALLOCATED_FD`] sentinels). On success,
/// `session.fd` is also updated; the caller doesn't need to propagate the
/// return value separately, but it's returned for parity with the
/// original sentinel-based contract described in the crate docs.
pub fn open(session: &mut Session, ctx: &Context, drivers: &mut DriverTable) -> RawFd {
    session.source_type = classify::classify(&session.path);
    log::info!(
        "SER: classified '{}' as {:?}",
        session.path,
        session.source_type
    );

    if session.source_type == SourceType::Unknown {
        session.fd = UNALLOCATED_FD;
        return UNALLOCATED_FD;
    }

    if session.source_type == SourceType::Pps {
        // We may need to hold on to this slot without opening the device.
        session.fd = PLACEHOLDING_FD;
        return PLACEHOLDING_FD;
    }

    if session.source_type == SourceType::Qrtr {
        // QRTR sessions bypass the generic open/termios pipeline entirely;
        // callers must use `qrtr::PdsDriver::open` instead, which also
        // needs `&mut Context` for the path registry that this function
        // doesn't take.
        log::error!("SER: {} is a qrtr: path, use qrtr::PdsDriver::open", session.path);
        session.fd = UNALLOCATED_FD;
        return UNALLOCATED_FD;
    }

    let readonly = ctx.readonly || session.source_type <= SourceType::BlockDev;

    let fd = if session.source_type == SourceType::Bluetooth {
        match open_bluetooth(&session.path, readonly) {
            Ok(fd) => fd,
            Err(_) => {
                session.fd = UNALLOCATED_FD;
                return UNALLOCATED_FD;
            }
        }
    } else {
        match open_device(&session.path, readonly) {
            Ok(fd) => fd,
            Err(_) => {
                session.fd = UNALLOCATED_FD;
                return UNALLOCATED_FD;
            }
        }
    };

    if session.source_type != SourceType::Pty && session.source_type != SourceType::Bluetooth {
        unsafe {
            // Best-effort exclusion lock; does nothing against a
            // privileged opener.
            libc::ioctl(fd, libc::TIOCEXCL);
        }

        if fusercount(&session.path) > 1 {
            log::error!("SER: {} already opened by another process", session.path);
            unsafe { libc::close(fd) };
            session.fd = UNALLOCATED_FD;
            return UNALLOCATED_FD;
        }
    }

    session.fd = fd;
    session.lexer.packet_type = crate::session::PacketType::BadPacket;

    if unsafe { libc::isatty(fd) } == 0 {
        log::trace!("SER: open({}) -> {}, not a tty", session.path, fd);
        return fd;
    }

    let saved = match termios::get_attributes(fd) {
        Ok(attr) => attr,
        Err(_) => {
            session.fd = UNALLOCATED_FD;
            return UNALLOCATED_FD;
        }
    };
    session.ttyset_saved = saved;
    session.ttyset_current = saved;

    if ctx.fixed_port_speed > 0 {
        session.saved_baud = i64::from(ctx.fixed_port_speed);
    }

    if session.saved_baud != -1 {
        let rate = crate::speed::speed_to_code(session.saved_baud as u32);
        unsafe {
            libc::cfsetispeed(&mut session.ttyset_current, rate);
            libc::cfsetospeed(&mut session.ttyset_current, rate);
        }
        if let Err(err) = termios::set_attributes(fd, &session.ttyset_current) {
            log::error!("SER: error setting port attributes: {err}");
        }
        let _ = termios::flush(fd);
    }

    session.ttyset_current.c_cc = [0u8; 32];
    session.ttyset_current.c_cflag &= !(PARENB | PARODD | CRTSCTS | CSTOPB);
    session.ttyset_current.c_cflag |= CREAD | CLOCAL;
    session.ttyset_current.c_iflag = 0;
    session.ttyset_current.c_oflag = 0;
    session.ttyset_current.c_lflag = 0;

    session.baud_index = 0;
    let new_speed = if ctx.fixed_port_speed > 0 {
        ctx.fixed_port_speed
    } else {
        crate::speed::code_to_speed(unsafe { libc::cfgetispeed(&saved) })
    };
    let (new_parity, new_stop) = match (ctx.fixed_parity(), ctx.fixed_stop_bits()) {
        (Some(p), Some(s)) => (p, s),
        _ => (b'N', 1),
    };

    termios::set_speed(session, ctx, drivers, new_speed, new_parity, new_stop);

    if session.source_type <= SourceType::BlockDev {
        session.parity = b'N';
        session.stop_bits = 1;
    }

    session.ts_start_current_baud = Instant::now();
    log::trace!("SER: open({}) -> {}", session.path, fd);
    fd
}

fn open_device(path: &str, readonly: bool) -> std::io::Result<RawFd> {
    let c_path = CString::new(path).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let mode = if readonly { libc::O_RDONLY } else { libc::O_RDWR };
    let flags = mode | libc::O_NONBLOCK | libc::O_NOCTTY;

    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
    if fd >= 0 {
        return Ok(fd);
    }

    log::error!(
        "SER: device open of {} failed: {} - retrying read-only",
        path,
        std::io::Error::last_os_error()
    );
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK | libc::O_NOCTTY) };
    if fd >= 0 {
        Ok(fd)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Returns `true` if `path` looks like a colon-separated Bluetooth MAC
/// address (`bachk`-style validation: six colon-separated hex octets).
pub fn is_bd_address(path: &str) -> bool {
    let parts: Vec<&str> = path.split(':').collect();
    parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn open_bluetooth(path: &str, readonly: bool) -> std::io::Result<RawFd> {
    if !is_bd_address(path) {
        return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
    }

    // AF_BLUETOOTH / BTPROTO_RFCOMM aren't exposed by `libc` on non-Linux
    // targets; the address family constant below matches Linux's
    // `bluetooth.h`.
    #[cfg(target_os = "linux")]
    {
        const AF_BLUETOOTH: c_int = 31;
        const BTPROTO_RFCOMM: c_int = 3;

        let sock = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_STREAM, BTPROTO_RFCOMM) };
        if sock < 0 {
            return Err(std::io::Error::last_os_error());
        }

        // sockaddr_rc { rc_family: u16, rc_bdaddr: [u8; 6], rc_channel: u8 }
        #[repr(C)]
        struct SockaddrRc {
            rc_family: libc::sa_family_t,
            rc_bdaddr: [u8; 6],
            rc_channel: u8,
        }

        let mut bdaddr = [0u8; 6];
        for (i, octet) in path.split(':').rev().enumerate().take(6) {
            bdaddr[i] = u8::from_str_radix(octet, 16).unwrap_or(0);
        }

        let addr = SockaddrRc {
            rc_family: AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: 1,
        };

        let ret = unsafe {
            libc::connect(
                sock,
                &addr as *const SockaddrRc as *const libc::sockaddr,
                std::mem::size_of::<SockaddrRc>() as u32,
            )
        };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            let errno = err.raw_os_error().unwrap_or(0);
            if errno != libc::EINPROGRESS && errno != libc::EAGAIN {
                unsafe { libc::close(sock) };
                return Err(err);
            }
            log::error!("SER: bluetooth connect in progress or EAGAIN: {err}");
        }

        let mode = if readonly { libc::O_RDONLY } else { libc::O_RDWR };
        unsafe {
            libc::fcntl(sock, libc::F_SETFL, mode);
        }
        Ok(sock)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = readonly;
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}

/// Counts how many processes (including this one) currently hold `path`
/// open, by scanning `/proc/*/fd/*` symlinks. Linux-only; other platforms
/// report `0` (no exclusion check is performed there).
#[cfg(target_os = "linux")]
fn fusercount(path: &str) -> i32 {
    let mut count = 0;
    let proc_entries = match fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return -1,
    };

    for proc_entry in proc_entries.flatten() {
        let name = proc_entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if !name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }

        let fd_dir = proc_entry.path().join("fd");
        let fd_entries = match fs::read_dir(&fd_dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for fd_entry in fd_entries.flatten() {
            if let Ok(link) = fs::read_link(fd_entry.path()) {
                if link.to_str() == Some(path) {
                    count += 1;
                }
            }
        }
    }

    count
}

#[cfg(not(target_os = "linux"))]
fn fusercount(_path: &str) -> i32 {
    0
}
