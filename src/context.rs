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

//! Shared, process-wide configuration and registries.
//!
//! `Context` is constructed programmatically by the embedding
//! application — this crate doesn't load configuration files or
//! environment variables (that's the host daemon's job).

/// Capacity of the process-wide QRTR path registry.
pub const QRTR_REGISTRY_CAPACITY: usize = 16;

/// State shared by every session opened through the same daemon/process.
#[derive(Debug, Default)]
pub struct Context {
    /// When set, no writes are permitted to any session's device.
    pub readonly: bool,
    /// Overrides the hunt loop's speed search: `0` means unset.
    pub fixed_port_speed: u32,
    /// Overrides the hunt loop's framing search, as a 3-character
    /// `"<len><parity><stop>"` string (e.g. `"8N1"`); empty means unset.
    pub fixed_port_framing: String,

    qrtr_registry: Vec<String>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn with_readonly(mut self, readonly: bool) -> Context {
        self.readonly = readonly;
        self
    }

    pub fn with_fixed_speed(mut self, speed: u32) -> Context {
        self.fixed_port_speed = speed;
        self
    }

    pub fn with_fixed_framing<S: Into<String>>(mut self, framing: S) -> Context {
        self.fixed_port_framing = framing.into();
        self
    }

    /// Parity character fixed by `fixed_port_framing` (position 1),
    /// if framing is fixed.
    pub fn fixed_parity(&self) -> Option<u8> {
        self.fixed_port_framing.as_bytes().get(1).copied()
    }

    /// Stop bits fixed by `fixed_port_framing` (position 2, as a digit),
    /// if framing is fixed.
    pub fn fixed_stop_bits(&self) -> Option<u32> {
        self.fixed_port_framing
            .as_bytes()
            .get(2)
            .map(|&b| u32::from(b - b'0'))
    }

    /// Registers `path` in the QRTR registry. Fails if the path is
    /// already registered or the registry (capacity 16) is full.
    pub fn register_qrtr_path(&mut self, path: &str) -> Result<(), crate::error::Error> {
        if self.qrtr_registry.iter().any(|p| p == path) {
            return Err(crate::error::Error::QrtrDuplicatePath);
        }
        if self.qrtr_registry.len() >= QRTR_REGISTRY_CAPACITY {
            return Err(crate::error::Error::QrtrRegistryFull);
        }
        self.qrtr_registry.push(path.to_owned());
        Ok(())
    }

    /// Removes `path` from the QRTR registry, if present.
    pub fn unregister_qrtr_path(&mut self, path: &str) {
        self.qrtr_registry.retain(|p| p != path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_qrtr_path_is_refused() {
        let mut ctx = Context::new();
        ctx.register_qrtr_path("qrtr:1").unwrap();
        assert!(matches!(
            ctx.register_qrtr_path("qrtr:1"),
            Err(crate::error::Error::QrtrDuplicatePath)
        ));
    }

    #[test]
    fn registry_enforces_capacity() {
        let mut ctx = Context::new();
        for i in 0..QRTR_REGISTRY_CAPACITY {
            ctx.register_qrtr_path(&format!("qrtr:{i}")).unwrap();
        }
        assert!(matches!(
            ctx.register_qrtr_path("qrtr:overflow"),
            Err(crate::error::Error::QrtrRegistryFull)
        ));
    }

    #[test]
    fn unregister_frees_a_slot() {
        let mut ctx = Context::new();
        ctx.register_qrtr_path("qrtr:1").unwrap();
        ctx.unregister_qrtr_path("qrtr:1");
        ctx.register_qrtr_path("qrtr:1").unwrap();
    }

    #[test]
    fn fixed_framing_decodes_parity_and_stop() {
        let ctx = Context::new().with_fixed_framing("7E2");
        assert_eq!(ctx.fixed_parity(), Some(b'E'));
        assert_eq!(ctx.fixed_stop_bits(), Some(2));
    }
}
