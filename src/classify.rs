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

//! Classifies a device path into a [`SourceType`] by inspecting `stat(2)`
//! output, without opening the path.

use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// The kind of source backing a [`Session`](crate::session::Session).
///
/// Ordering matters: the opener treats `SourceType::BlockDev` as a
/// threshold (anything `<= BlockDev` opens read-only). `RegularFile` is
/// part of the type but is never produced by [`classify`] itself — actual
/// regular files classify as `BlockDev`, matching the upstream protocol
/// this subsystem was modeled on.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub enum SourceType {
    Unknown,
    BlockDev,
    RegularFile,
    Pipe,
    Tcp,
    Pty,
    Pps,
    Rs232,
    Usb,
    Acm,
    Bluetooth,
    Qrtr,
}

/// Classifies `path` by `stat(2)`-ing it and inspecting its file type (and,
/// on Linux, its character-device major/minor numbers). Returns
/// `SourceType::Unknown` if `stat` fails.
pub fn classify<P: AsRef<Path>>(path: P) -> SourceType {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    // qrtr:<hostid> and Bluetooth BD addresses aren't filesystem paths;
    // recognize them before stat(2) ever gets a chance to fail on them.
    if path_str.len() >= 6 && path_str.starts_with("qrtr:") {
        return SourceType::Qrtr;
    }
    if crate::opener::is_bd_address(&path_str) {
        return SourceType::Bluetooth;
    }

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return SourceType::Unknown,
    };
    let file_type = meta.file_type();

    if file_type.is_file() {
        return SourceType::BlockDev;
    }

    // Assumes there's no such thing as a filesystem UDP socket.
    if file_type.is_socket() {
        return SourceType::Tcp;
    }

    if path_str.starts_with("/dev/pts/") {
        return SourceType::Pty;
    }

    if path_str.starts_with("/dev/pps") {
        return SourceType::Pps;
    }

    if file_type.is_fifo() {
        return SourceType::Pipe;
    }

    if file_type.is_char_device() {
        return classify_char_device(&meta, &path_str);
    }

    SourceType::Unknown
}

#[cfg(target_os = "linux")]
fn classify_char_device(meta: &std::fs::Metadata, path_str: &str) -> SourceType {
    use std::os::unix::fs::MetadataExt;

    let rdev = meta.rdev();
    let devmajor = libc::major(rdev);
    let devminor = libc::minor(rdev);

    let _ = path_str;
    match devmajor {
        3 | 136..=143 => SourceType::Pty,
        4 | 204 | 207 => SourceType::Rs232,
        10 if devminor == 223 => SourceType::Pps,
        166 => SourceType::Acm,
        188 => SourceType::Usb,
        216 | 217 => SourceType::Bluetooth,
        _ => SourceType::Rs232,
    }
}

#[cfg(not(target_os = "linux"))]
fn classify_char_device(_meta: &std::fs::Metadata, path_str: &str) -> SourceType {
    // BSD kernels don't expose stable major/minor semantics the way Linux
    // does; fall back to path-prefix heuristics, then default to RS232.
    if path_str.starts_with("/dev/ttyp") || path_str.starts_with("/dev/ttyq") {
        SourceType::Pty
    } else if path_str.starts_with("/dev/ttyU") || path_str.starts_with("/dev/dtyU") {
        SourceType::Usb
    } else {
        SourceType::Rs232
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_is_unknown() {
        assert_eq!(classify("/nonexistent/path/for/testing"), SourceType::Unknown);
    }

    #[test]
    fn regular_file_is_blockdev() {
        let file = std::env::temp_dir().join("gnss-session-classify-test");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(classify(&file), SourceType::BlockDev);
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn qrtr_path_is_recognized() {
        assert_eq!(classify("qrtr:1"), SourceType::Qrtr);
        assert_eq!(classify("qrtr:any"), SourceType::Qrtr);
        assert_eq!(classify("qrtr:"), SourceType::Unknown, "too short to carry a hostid");
    }

    #[test]
    fn bd_address_is_bluetooth() {
        assert_eq!(classify("00:11:22:33:44:55"), SourceType::Bluetooth);
    }

    #[test]
    fn ordering_places_blockdev_above_unknown() {
        assert!(SourceType::BlockDev > SourceType::Unknown);
        assert!(SourceType::RegularFile > SourceType::BlockDev);
    }
}
