// Copyright (c) 2017 Rene van der Meer
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

//! Device-acquisition and framing subsystem for GNSS receivers.
//!
//! Attaches a GNSS receiver exposed as a character/serial device, a
//! pseudo-tty, a regular file, a named pipe, a socket, a Bluetooth RFCOMM
//! endpoint, or a Qualcomm QRTR PDS peer, and turns it into a [`session`]
//! that yields raw NMEA packet bytes to higher layers. Three pieces do the
//! work: [`classify`] + [`opener`] (what is this path, and how do I open
//! it), [`termios`] + [`speed`] + [`hunt`] (serial framing and the
//! auto-baud search), and [`qrtr`] (the Qualcomm PDS driver). NMEA
//! sentence parsing, a client/daemon control plane, and PPS
//! time-stamping are out of scope — this crate only gets bytes flowing.

pub mod classify;
pub mod context;
pub mod driver;
pub mod error;
pub mod fd;
pub mod hunt;
pub mod opener;
pub mod qrtr;
pub mod session;
pub mod speed;
pub mod termios;

#[cfg(test)]
mod test_support;
