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

//! Errors shared by the device-acquisition and framing subsystem.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// Errors that can occur while classifying, opening, or driving a GNSS
/// device session.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(io::Error),
    /// `stat(2)` could not identify the source at the given path.
    Classification,
    /// The path is already held open by another process (`fusercount`).
    Exclusion,
    /// A Bluetooth RFCOMM socket operation failed.
    Bluetooth,
    /// The `qrtr:<path>` is shorter than the fixed prefix, or the node id
    /// isn't `any` or a decimal integer.
    InvalidPdsPath,
    /// The same QRTR path is already registered to a live session.
    QrtrDuplicatePath,
    /// The process-wide QRTR registry (capacity 16) is full.
    QrtrRegistryFull,
    /// The PDS lookup terminated with an all-zero `NEW_SERVER` record.
    QrtrLookupFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::Classification => write!(f, "unable to classify device path"),
            Error::Exclusion => write!(f, "device path already opened by another process"),
            Error::Bluetooth => write!(f, "bluetooth RFCOMM connect failed"),
            Error::InvalidPdsPath => write!(f, "invalid qrtr: path"),
            Error::QrtrDuplicatePath => write!(f, "qrtr: path already registered"),
            Error::QrtrRegistryFull => write!(f, "qrtr registry is full"),
            Error::QrtrLookupFailed => write!(f, "no PDS service found"),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `error::Error`s.
pub type Result<T> = result::Result<T, Error>;
