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

//! The polymorphic event-hook contract bound drivers implement, and the
//! table `termios::set_speed` dispatches through: wake only the bound
//! driver if one is bound, otherwise probe every registered driver (the
//! "probe cascade").

use crate::session::Session;

/// Hooks a bound driver may act on when the line configuration changes.
///
/// Default implementations are no-ops, so a driver only needs to
/// implement the events it cares about.
pub trait EventHook {
    /// A unique, human-readable driver name (`"PPS"`, `"Qualcomm PDS"`, …).
    fn name(&self) -> &'static str;

    /// Called after `set_speed` completes a (re)configuration, for any
    /// driver variant that wants to kick the device awake (send a probe
    /// string, toggle a control line, …).
    fn wakeup(&mut self, _session: &mut Session) {}

    /// Called once a transport-level handshake completes (e.g. the QRTR
    /// PDS lookup resolving to a peer), before any data flows.
    fn reactivate(&mut self, _session: &mut Session) {}

    /// Called when the session is about to close or otherwise stop
    /// receiving data, so the driver can ask the device to quiesce.
    fn deactivate(&mut self, _session: &mut Session) {}
}

/// A registry of candidate drivers (probed by the cascade when nothing
/// is bound yet) plus, once a transport-level handshake has picked a
/// winner, a single bound driver that gets every event exclusively.
#[derive(Default)]
pub struct DriverTable {
    drivers: Vec<Box<dyn EventHook>>,
    bound: Option<Box<dyn EventHook>>,
}

impl DriverTable {
    pub fn new() -> DriverTable {
        DriverTable { drivers: Vec::new(), bound: None }
    }

    /// Adds `driver` to the probe cascade.
    pub fn register(&mut self, driver: Box<dyn EventHook>) {
        self.drivers.push(driver);
    }

    /// Binds `driver` as the session's sole active driver. Once bound,
    /// [`wakeup`](DriverTable::wakeup) dispatches to it exclusively
    /// instead of probing the cascade.
    pub fn bind(&mut self, driver: Box<dyn EventHook>) {
        self.bound = Some(driver);
    }

    /// Releases the bound driver, if any, reverting to the probe cascade.
    pub fn unbind(&mut self) -> Option<Box<dyn EventHook>> {
        self.bound.take()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Invokes `wakeup` on every registered driver. Used when a session
    /// has no driver bound yet and we want to probe all of them in hopes
    /// one responds.
    pub fn wakeup_all(&mut self, session: &mut Session) {
        for driver in &mut self.drivers {
            driver.wakeup(session);
        }
    }

    /// Dispatches the `WAKEUP` event per the "invoke the hook on the
    /// bound driver; if none is bound, probe cascade" contract: call
    /// only the bound driver if one exists, otherwise probe every
    /// registered driver.
    pub fn wakeup(&mut self, session: &mut Session) {
        if let Some(driver) = self.bound.as_mut() {
            driver.wakeup(session);
        } else {
            self.wakeup_all(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    impl EventHook for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }
        fn wakeup(&mut self, _session: &mut Session) {
            self.0 += 1;
        }
    }

    #[test]
    fn wakeup_all_probes_every_registered_driver() {
        // Exercised indirectly through termios::set_speed's probe cascade;
        // here we just confirm the table dispatches to every entry.
        let mut table = DriverTable::new();
        table.register(Box::new(Counter(0)));
        table.register(Box::new(Counter(0)));
        assert_eq!(table.drivers.len(), 2);
    }

    #[test]
    fn wakeup_cascades_when_nothing_is_bound() {
        use crate::session::Session;

        let mut table = DriverTable::new();
        table.register(Box::new(Counter(0)));
        table.register(Box::new(Counter(0)));
        assert!(!table.is_bound());

        let mut session = Session::new("/dev/ttyUSB0");
        table.wakeup(&mut session); // must not panic; cascades to both
    }

    #[test]
    fn wakeup_calls_only_the_bound_driver() {
        use crate::session::Session;
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Tracking(Rc<RefCell<u32>>);
        impl EventHook for Tracking {
            fn name(&self) -> &'static str {
                "tracking"
            }
            fn wakeup(&mut self, _session: &mut Session) {
                *self.0.borrow_mut() += 1;
            }
        }

        let bound_calls = Rc::new(RefCell::new(0));
        let cascade_calls = Rc::new(RefCell::new(0));

        let mut table = DriverTable::new();
        table.register(Box::new(Tracking(Rc::clone(&cascade_calls))));
        table.bind(Box::new(Tracking(Rc::clone(&bound_calls))));
        assert!(table.is_bound());

        let mut session = Session::new("/dev/ttyUSB0");
        table.wakeup(&mut session);

        assert_eq!(*bound_calls.borrow(), 1);
        assert_eq!(*cascade_calls.borrow(), 0, "cascade must not run once a driver is bound");

        table.unbind();
        assert!(!table.is_bound());
        table.wakeup(&mut session);
        assert_eq!(*cascade_calls.borrow(), 1, "cascade resumes once unbound");
    }
}
