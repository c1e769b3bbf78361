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

//! Qualcomm QRTR/PDS driver (C6): service-lookup handshake over an
//! `AF_QIPCRTR` datagram socket, then QMI request/indication handling to
//! pull NMEA payload out of PDS events.
//!
//! QMI frames and QRTR control packets are encoded/decoded as explicit
//! little-endian byte streams (`to_le_bytes`/`from_le_bytes`), never as
//! `#[repr(packed)]` structs laid directly over the wire — nothing here is
//! naturally aligned, and packed-struct field access is its own footgun.

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use crate::context::Context;
use crate::driver::{DriverTable, EventHook};
use crate::error::{Error, Result};
use crate::session::{PacketType, Session};

/// Position Determination Service.
const PDS_SERVICE: u32 = 0x10;
const PDS_INSTANCE: u32 = 0x02;

/// QRTR control-plane port every `NEW_LOOKUP`/`NEW_SERVER` exchange uses.
pub const QRTR_PORT_CTRL: u32 = 0xffff_ffff;

const CTRL_CMD_NEW_LOOKUP: u32 = 9;
const CTRL_CMD_NEW_SERVER: u32 = 3;

const QMI_TYPE_REQUEST: u8 = 0;
const QMI_TYPE_INDICATION: u8 = 4;

const MSG_REG_EVENTS: u16 = 0x21;
const MSG_START: u16 = 0x22;
const MSG_STOP: u16 = 0x23;
const MSG_EVENT_NMEA: u16 = 0x26;

const TLV_KEY_EVENT_MASK: u8 = 1;
const TLV_KEY_SESSION_ID: u8 = 1;
const TLV_KEY_NMEA: u8 = 1;
const EVENT_MASK_NMEA: u64 = 0x04;

/// Size of the encoded header: `type(1) + txn(2) + msg(2) + len(2)`.
const HEADER_LEN: usize = 7;
/// Per-TLV framing overhead: `key(1) + len(2)`.
const TLV_OVERHEAD: usize = 3;

/// A decoded QMI header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct QmiHeader {
    pub kind: u8,
    pub txn: u16,
    pub msg: u16,
    pub len: u16,
}

impl QmiHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.kind;
        buf[1..3].copy_from_slice(&self.txn.to_le_bytes());
        buf[3..5].copy_from_slice(&self.msg.to_le_bytes());
        buf[5..7].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8]) -> Option<QmiHeader> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(QmiHeader {
            kind: buf[0],
            txn: u16::from_le_bytes([buf[1], buf[2]]),
            msg: u16::from_le_bytes([buf[3], buf[4]]),
            len: u16::from_le_bytes([buf[5], buf[6]]),
        })
    }
}

/// A decoded TLV entry.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Tlv {
    pub key: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    fn encoded_len(&self) -> usize {
        TLV_OVERHEAD + self.value.len()
    }

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.key);
        buf.extend_from_slice(&(self.value.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.value);
    }
}

/// Assembles `header || tlvs` into a single frame. `header.len` is
/// recomputed from the TLVs, matching property 9's size identity
/// (`7 + sum(3 + tlv.len)`).
fn build_frame(kind: u8, txn: u16, msg: u16, tlvs: &[Tlv]) -> Vec<u8> {
    let body_len: usize = tlvs.iter().map(Tlv::encoded_len).sum();
    let header = QmiHeader { kind, txn, msg, len: body_len as u16 };

    let mut buf = Vec::with_capacity(HEADER_LEN + body_len);
    buf.extend_from_slice(&header.to_bytes());
    for tlv in tlvs {
        tlv.write_to(&mut buf);
    }
    buf
}

/// Parses a whole frame back into its header and TLV list, using the
/// *correct* advance (`sizeof(tlv) + tlv.len`). Used for round-tripping
/// our own assembled requests; [`extract_nmea`] below deliberately does
/// not use this — see its doc comment.
#[cfg(test)]
fn parse_frame(buf: &[u8]) -> Option<(QmiHeader, Vec<Tlv>)> {
    let header = QmiHeader::from_bytes(buf)?;
    let mut tlvs = Vec::new();
    let mut offset = HEADER_LEN;
    while offset + TLV_OVERHEAD <= buf.len() {
        let key = buf[offset];
        let len = u16::from_le_bytes([buf[offset + 1], buf[offset + 2]]) as usize;
        let value_start = offset + TLV_OVERHEAD;
        if value_start + len > buf.len() {
            break;
        }
        tlvs.push(Tlv { key, value: buf[value_start..value_start + len].to_vec() });
        offset = value_start + len;
    }
    Some((header, tlvs))
}

/// Walks TLVs starting at `sizeof(header)` looking for the first
/// `key = 1 (NMEA)` entry, per the original's as-written advance step:
/// the cursor moves forward by `tlv.len` only, not `sizeof(tlv) +
/// tlv.len`. For a single-TLV indication (the only shape ever observed
/// in the wild) this is harmless; a second TLV would have its key/length
/// bytes misread out of the first TLV's value. Reproduced intentionally
/// — see the design notes on the TLV-walk open question. Returns `None`
/// on truncation or if no NMEA TLV is found.
fn extract_nmea(buf: &[u8]) -> Option<&[u8]> {
    let mut offset = HEADER_LEN;
    while offset + TLV_OVERHEAD <= buf.len() {
        let key = buf[offset];
        let len = u16::from_le_bytes([buf[offset + 1], buf[offset + 2]]) as usize;
        let value_start = offset + TLV_OVERHEAD;
        if value_start + len > buf.len() {
            break;
        }
        if key == TLV_KEY_NMEA {
            return Some(&buf[value_start..value_start + len]);
        }
        offset += len;
    }
    None
}

fn reg_events_request(txn: u16) -> Vec<u8> {
    build_frame(
        QMI_TYPE_REQUEST,
        txn,
        MSG_REG_EVENTS,
        &[Tlv { key: TLV_KEY_EVENT_MASK, value: EVENT_MASK_NMEA.to_le_bytes().to_vec() }],
    )
}

fn start_request(txn: u16) -> Vec<u8> {
    build_frame(QMI_TYPE_REQUEST, txn, MSG_START, &[Tlv { key: TLV_KEY_SESSION_ID, value: vec![0x01] }])
}

fn stop_request(txn: u16) -> Vec<u8> {
    build_frame(QMI_TYPE_REQUEST, txn, MSG_STOP, &[Tlv { key: TLV_KEY_SESSION_ID, value: vec![0x01] }])
}

fn new_lookup_packet() -> [u8; 20] {
    let mut buf = [0u8; 20];
    buf[0..4].copy_from_slice(&CTRL_CMD_NEW_LOOKUP.to_le_bytes());
    buf[4..8].copy_from_slice(&PDS_SERVICE.to_le_bytes());
    buf[8..12].copy_from_slice(&PDS_INSTANCE.to_le_bytes());
    buf
}

/// A decoded `NEW_SERVER` control-plane advertisement.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
struct NewServer {
    service: u32,
    instance: u32,
    node: u32,
    port: u32,
}

impl NewServer {
    fn is_all_zero(&self) -> bool {
        self.service == 0 && self.instance == 0 && self.node == 0 && self.port == 0
    }
}

fn parse_ctrl_packet(buf: &[u8]) -> Option<NewServer> {
    if buf.len() < 20 {
        return None;
    }
    let cmd = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if cmd != CTRL_CMD_NEW_SERVER {
        return None;
    }
    Some(NewServer {
        service: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        instance: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        node: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        port: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
    })
}

/// Outcome of handling one received control-plane datagram.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum Discovery {
    /// Not a `NEW_SERVER`, or for a different host; keep waiting.
    KeepWaiting,
    /// All-zero terminator: no PDS on this bus.
    NotFound,
    /// Resolved peer to connect to.
    Found { node: u32, port: u32 },
}

fn handle_ctrl_packet(buf: &[u8], host_id_filter: i32) -> Discovery {
    let server = match parse_ctrl_packet(buf) {
        Some(s) => s,
        None => return Discovery::KeepWaiting,
    };
    if server.is_all_zero() {
        return Discovery::NotFound;
    }
    if host_id_filter >= 0 && server.node != host_id_filter as u32 {
        return Discovery::KeepWaiting;
    }
    Discovery::Found { node: server.node, port: server.port }
}

/// Parses the `qrtr:<hostid>` path grammar: a fixed 6-character minimum
/// (`"qrtr:"` plus at least one hostid character), `<hostid>` either the
/// literal `any` or a decimal node id.
fn parse_path(path: &str) -> Result<i32> {
    if path.len() < 6 || !path.starts_with("qrtr:") {
        return Err(Error::InvalidPdsPath);
    }
    let hostid = &path[5..];
    if hostid == "any" {
        return Ok(-1);
    }
    hostid.parse::<u32>().map(|n| n as i32).map_err(|_| Error::InvalidPdsPath)
}

/// Driver-side state for a QRTR/PDS session: the socket descriptor, the
/// per-driver monotonic QMI transaction counter, and the host filter
/// parsed from the path.
pub struct PdsDriver {
    fd: RawFd,
    host_id_filter: i32,
    txn: u16,
    readonly: bool,
}

impl PdsDriver {
    /// Opens `session.path` (a `qrtr:<hostid>` path), registers it with
    /// `ctx`, creates the datagram socket, and sends the initial
    /// `NEW_LOOKUP`. Binds the new driver into `drivers` as the session's
    /// exclusive event-hook target (spec.md §4.3 step 7: once a driver is
    /// bound, `WAKEUP` goes to it alone, not the probe cascade). Returns
    /// the driver handle and the socket fd, or an error — QRTR open
    /// failure is fatal, unlike serial's retry-as-readonly policy.
    pub fn open(
        session: &mut Session,
        ctx: &mut Context,
        drivers: &mut DriverTable,
    ) -> Result<(Rc<RefCell<PdsDriver>>, RawFd)> {
        let host_id_filter = parse_path(&session.path)?;
        ctx.register_qrtr_path(&session.path)?;

        let fd = match create_socket() {
            Ok(fd) => fd,
            Err(err) => {
                ctx.unregister_qrtr_path(&session.path);
                return Err(err.into());
            }
        };

        let mut driver = PdsDriver { fd, host_id_filter, txn: 0, readonly: ctx.readonly };

        let packet = new_lookup_packet();
        if driver.control_send(&packet).is_err() {
            unsafe { libc::close(fd) };
            ctx.unregister_qrtr_path(&session.path);
            return Err(Error::QrtrLookupFailed);
        }

        session.pds.host_id = host_id_filter;
        log::info!("PDS: opened {} (host filter {})", session.path, host_id_filter);

        let handle = Rc::new(RefCell::new(driver));
        drivers.bind(Box::new(Rc::clone(&handle)));
        Ok((handle, fd))
    }

    /// Sends `buf` to the control port. Reproduces the original's
    /// `qmi_control_send` quirk: in a readonly context the write is
    /// skipped entirely, but the call still reports success (`1`) rather
    /// than a byte count or an error, so discovery/control-plane traffic
    /// (which isn't user payload) keeps working even when the session as
    /// a whole is opened readonly.
    fn control_send(&mut self, buf: &[u8]) -> std::io::Result<i64> {
        if self.readonly {
            return Ok(1);
        }
        send_ctrl(self.fd, buf)
    }

    /// Runs one discovery step. Called repeatedly (from the outer read
    /// loop) until it returns a value other than `1`. `1` means "call me
    /// again"; `-1` is fatal (lookup exhausted or a socket error);
    /// otherwise discovery completed and `session.pds.ready` is now set.
    pub fn discover(&mut self, session: &mut Session) -> i64 {
        let mut buf = [0u8; 64];
        let (n, from_port) = match recv_ctrl(self.fd, &mut buf) {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return 1,
            Err(_) => return -1,
        };

        if from_port != QRTR_PORT_CTRL {
            return 1;
        }

        match handle_ctrl_packet(&buf[..n], self.host_id_filter) {
            Discovery::KeepWaiting => 1,
            Discovery::NotFound => {
                log::error!("PDS: lookup exhausted, no PDS service found");
                -1
            }
            Discovery::Found { node, port } => {
                if connect_ctrl(self.fd, node, port).is_err() {
                    return -1;
                }
                session.pds.node = node;
                session.pds.port = port;
                session.pds.ready = true;
                log::info!("PDS: resolved to node {} port {}", node, port);
                self.reactivate(session);
                0
            }
        }
    }

    /// Reads one QMI indication into `session.lexer.output_buffer`.
    /// `EAGAIN` reports "no packet yet" (`1`, empty output); any other
    /// recv error is fatal (`-1`). A non-`EVENT_NMEA` indication is
    /// silently discarded (property: "protocol mismatch").
    pub fn get_packet(&mut self, session: &mut Session) -> i64 {
        let mut buf = [0u8; 2048];
        let n = match recv_ctrl(self.fd, &mut buf) {
            Ok((n, _)) => n,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return 1,
            Err(_) => return -1,
        };

        let header = match QmiHeader::from_bytes(&buf[..n]) {
            Some(h) => h,
            None => return n as i64,
        };
        if header.kind != QMI_TYPE_INDICATION || header.msg != MSG_EVENT_NMEA {
            return n as i64;
        }

        match extract_nmea(&buf[..n]) {
            Some(nmea) => {
                let out = &mut session.lexer.output_buffer;
                out.clear();
                out.extend_from_slice(nmea);
                out.push(0);
                session.lexer.output_len = nmea.len();
                session.lexer.packet_type = PacketType::NmeaPacket;
                session.lexer.output_len as i64
            }
            None => n as i64,
        }
    }

    /// Closes the QRTR handle (if live), removes `session.path` from the
    /// registry, and releases the bound driver slot so a later session on
    /// this path falls back to the probe cascade until it binds again.
    pub fn close(&mut self, session: &mut Session, ctx: &mut Context, drivers: &mut DriverTable) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = crate::fd::UNALLOCATED_FD;
        }
        ctx.unregister_qrtr_path(&session.path);
        drivers.unbind();
    }

    fn next_txn(&mut self) -> u16 {
        self.txn = self.txn.wrapping_add(1);
        self.txn
    }
}

impl EventHook for PdsDriver {
    fn name(&self) -> &'static str {
        "Qualcomm PDS"
    }

    fn reactivate(&mut self, _session: &mut Session) {
        let txn = self.next_txn();
        let _ = self.control_send(&reg_events_request(txn));
        let txn = self.next_txn();
        let _ = self.control_send(&start_request(txn));
    }

    fn deactivate(&mut self, _session: &mut Session) {
        let txn = self.next_txn();
        let _ = self.control_send(&stop_request(txn));
    }
}

/// Lets a shared handle sit in `DriverTable`'s bound slot while the
/// embedding application keeps its own `Rc` for the QRTR-specific calls
/// (`discover`/`get_packet`/`close`) that aren't part of `EventHook`.
impl EventHook for Rc<RefCell<PdsDriver>> {
    fn name(&self) -> &'static str {
        "Qualcomm PDS"
    }

    fn wakeup(&mut self, session: &mut Session) {
        self.borrow_mut().wakeup(session);
    }

    fn reactivate(&mut self, session: &mut Session) {
        self.borrow_mut().reactivate(session);
    }

    fn deactivate(&mut self, session: &mut Session) {
        self.borrow_mut().deactivate(session);
    }
}

#[cfg(target_os = "linux")]
fn create_socket() -> std::io::Result<RawFd> {
    const AF_QIPCRTR: libc::c_int = 42;
    let fd = unsafe { libc::socket(AF_QIPCRTR, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    unsafe {
        libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
    }

    if let Err(err) = validate_local_address(fd) {
        unsafe { libc::close(fd) };
        return Err(err);
    }

    Ok(fd)
}

/// Reads back the locally assigned `sockaddr_qrtr` via `getsockname` and
/// checks its family/size, per spec.md §4.6 "Open" step 2.
#[cfg(target_os = "linux")]
fn validate_local_address(fd: RawFd) -> std::io::Result<()> {
    const AF_QIPCRTR: libc::sa_family_t = 42;

    let mut addr: SockaddrQrtr = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<SockaddrQrtr>() as libc::socklen_t;
    let ret = unsafe { libc::getsockname(fd, &mut addr as *mut SockaddrQrtr as *mut libc::sockaddr, &mut len) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if addr.sq_family != AF_QIPCRTR || len as usize != std::mem::size_of::<SockaddrQrtr>() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "getsockname returned an unexpected qrtr address family/size",
        ));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn create_socket() -> std::io::Result<RawFd> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// `AF_QIPCRTR`/`sockaddr_qrtr` aren't in the `libc` crate, so they're
/// declared locally, matching how `opener.rs` declares the Bluetooth RFCOMM
/// constants `libc` doesn't cover.
#[cfg(target_os = "linux")]
#[repr(C)]
struct SockaddrQrtr {
    sq_family: libc::sa_family_t,
    sq_node: u32,
    sq_port: u32,
}

#[cfg(target_os = "linux")]
fn send_ctrl(fd: RawFd, buf: &[u8]) -> std::io::Result<i64> {
    let ret = unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ret as i64)
    }
}

#[cfg(not(target_os = "linux"))]
fn send_ctrl(_fd: RawFd, _buf: &[u8]) -> std::io::Result<i64> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(target_os = "linux")]
fn recv_ctrl(fd: RawFd, buf: &mut [u8]) -> std::io::Result<(usize, u32)> {
    let mut addr: SockaddrQrtr = unsafe { std::mem::zeroed() };
    let mut addr_len = std::mem::size_of::<SockaddrQrtr>() as libc::socklen_t;
    let ret = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            &mut addr as *mut SockaddrQrtr as *mut libc::sockaddr,
            &mut addr_len,
        )
    };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // The real sender port, so `discover`'s `from_port != QRTR_PORT_CTRL`
    // filter actually discriminates rather than vacuously passing.
    Ok((ret as usize, addr.sq_port))
}

#[cfg(not(target_os = "linux"))]
fn recv_ctrl(_fd: RawFd, _buf: &mut [u8]) -> std::io::Result<(usize, u32)> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(target_os = "linux")]
fn connect_ctrl(fd: RawFd, node: u32, port: u32) -> std::io::Result<()> {
    const AF_QIPCRTR: libc::sa_family_t = 42;

    let addr = SockaddrQrtr { sq_family: AF_QIPCRTR, sq_node: node, sq_port: port };
    let ret = unsafe {
        libc::connect(
            fd,
            &addr as *const SockaddrQrtr as *const libc::sockaddr,
            std::mem::size_of::<SockaddrQrtr>() as u32,
        )
    };
    if ret < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
fn connect_ctrl(_fd: RawFd, _node: u32, _port: u32) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let tlvs = vec![
            Tlv { key: 1, value: vec![0x04, 0, 0, 0, 0, 0, 0, 0] },
            Tlv { key: 2, value: vec![0xaa] },
        ];
        let frame = build_frame(QMI_TYPE_REQUEST, 7, MSG_REG_EVENTS, &tlvs);

        assert_eq!(frame.len(), HEADER_LEN + tlvs.iter().map(Tlv::encoded_len).sum::<usize>());

        let (header, parsed) = parse_frame(&frame).unwrap();
        assert_eq!(header.kind, QMI_TYPE_REQUEST);
        assert_eq!(header.txn, 7);
        assert_eq!(header.msg, MSG_REG_EVENTS);
        assert_eq!(parsed, tlvs);
    }

    proptest::proptest! {
        #[test]
        fn frame_length_identity(txn: u16, a in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16),
                                  b in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16)) {
            let tlvs = vec![Tlv { key: 1, value: a }, Tlv { key: 2, value: b }];
            let frame = build_frame(QMI_TYPE_REQUEST, txn, MSG_START, &tlvs);
            let expected_len = HEADER_LEN + tlvs.iter().map(Tlv::encoded_len).sum::<usize>();
            proptest::prop_assert_eq!(frame.len(), expected_len);

            let (header, parsed) = parse_frame(&frame).unwrap();
            proptest::prop_assert_eq!(header.len as usize, expected_len - HEADER_LEN);
            proptest::prop_assert_eq!(parsed, tlvs);
        }
    }

    #[test]
    fn extracts_single_tlv_nmea_indication() {
        let frame = build_frame(
            QMI_TYPE_INDICATION,
            1,
            MSG_EVENT_NMEA,
            &[Tlv { key: TLV_KEY_NMEA, value: b"$GPGGA,".to_vec() }],
        );
        assert_eq!(extract_nmea(&frame), Some(&b"$GPGGA,"[..]));
    }

    #[test]
    fn parse_path_accepts_any_and_decimal() {
        assert_eq!(parse_path("qrtr:any").unwrap(), -1);
        assert_eq!(parse_path("qrtr:7").unwrap(), 7);
        assert!(parse_path("qrtr:").is_err());
        assert!(parse_path("qrtr:nope").is_err());
        assert!(matches!(parse_path("qrtr:").unwrap_err(), Error::InvalidPdsPath));
    }

    #[test]
    fn new_server_terminates_on_all_zero() {
        let zero = [0u8; 20];
        let mut buf = zero;
        buf[0..4].copy_from_slice(&CTRL_CMD_NEW_SERVER.to_le_bytes());
        assert_eq!(handle_ctrl_packet(&buf, -1), Discovery::NotFound);
    }

    #[test]
    fn new_server_resolves_matching_host() {
        let mut buf = [0u8; 20];
        buf[0..4].copy_from_slice(&CTRL_CMD_NEW_SERVER.to_le_bytes());
        buf[4..8].copy_from_slice(&PDS_SERVICE.to_le_bytes());
        buf[8..12].copy_from_slice(&PDS_INSTANCE.to_le_bytes());
        buf[12..16].copy_from_slice(&1u32.to_le_bytes());
        buf[16..20].copy_from_slice(&17u32.to_le_bytes());

        assert_eq!(handle_ctrl_packet(&buf, -1), Discovery::Found { node: 1, port: 17 });
        assert_eq!(handle_ctrl_packet(&buf, 1), Discovery::Found { node: 1, port: 17 });
        assert_eq!(handle_ctrl_packet(&buf, 2), Discovery::KeepWaiting);
    }

    #[test]
    fn non_new_server_command_is_ignored() {
        let mut buf = [0u8; 20];
        buf[0..4].copy_from_slice(&CTRL_CMD_NEW_LOOKUP.to_le_bytes());
        assert_eq!(handle_ctrl_packet(&buf, -1), Discovery::KeepWaiting);
    }
}
