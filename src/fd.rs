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

//! Sentinel file descriptor values distinguished by callers from any real
//! descriptor returned by `open(2)`/`socket(2)`.

use std::os::unix::io::RawFd;

/// The device failed to open, or its path couldn't be classified.
pub const UNALLOCATED_FD: RawFd = -1;

/// A `/dev/pps*` path was accepted but never opened; no I/O is ever
/// performed on a placeholding session.
pub const PLACEHOLDING_FD: RawFd = -2;

/// Returns `true` if `fd` is one of the two sentinels above rather than a
/// real, owned descriptor.
pub fn is_sentinel(fd: RawFd) -> bool {
    fd == UNALLOCATED_FD || fd == PLACEHOLDING_FD
}
