//! Switch edge counting shared with interrupt context
//!
//! The interrupt handler is the single writer and only ever increments; the
//! main loop is the single reader and drains the count with [`EdgeCounter::take`].
//! Both sides touch the value inside a minimal critical section.
//!
//! Edges are coalesced on purpose: the sensor sends one report per drain,
//! not one per physical edge, so toggles that happen while the radio is busy
//! collapse into the next report of the current switch level.

use core::cell::Cell;
use critical_section::Mutex;

/// Interrupt-safe edge counter
pub struct EdgeCounter {
    count: Mutex<Cell<u32>>,
}

impl EdgeCounter {
    /// Create a counter holding `initial` pending edges.
    ///
    /// The sensor starts at one: it only runs after the switch woke it.
    pub const fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(Cell::new(initial)),
        }
    }

    /// Record one edge (interrupt context)
    pub fn record(&self) {
        critical_section::with(|cs| {
            let cell = self.count.borrow(cs);
            cell.set(cell.get().saturating_add(1));
        });
    }

    /// Read and clear the pending count (main loop)
    pub fn take(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).replace(0))
    }

    /// Pending count without clearing it
    pub fn pending(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }
}

/// Interrupt dispatch table built at startup
///
/// Maps an interrupt line to the one counter its handler increments, so the
/// handler never holds a reference to anything but that counter.
pub struct EdgeDispatch<const N: usize> {
    routes: [(u8, &'static EdgeCounter); N],
}

impl<const N: usize> EdgeDispatch<N> {
    pub const fn new(routes: [(u8, &'static EdgeCounter); N]) -> Self {
        Self { routes }
    }

    /// Record an edge on `line`; returns false for unrouted lines
    pub fn dispatch(&self, line: u8) -> bool {
        match self.routes.iter().find(|(routed, _)| *routed == line) {
            Some((_, counter)) => {
                counter.record();
                true
            }
            None => false,
        }
    }
}
