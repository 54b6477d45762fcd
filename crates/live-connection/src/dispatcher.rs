//! Deferred delivery of link events to host callbacks.
//!
//! Pumps run on the tokio runtime and never call host code directly. They
//! push [`LinkEvent`]s into a queue; the host drains it from its own main
//! loop with [`Dispatcher::dispatch_pending`], where touching UI or
//! application state is safe. Nothing is dropped while the dispatcher is
//! alive: events simply wait for the next drain.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use fleetops_protocol::types::{ActiveShift, UserLocation};

use crate::types::LinkEvent;

type PresenceCallback = Box<dyn FnMut(Vec<UserLocation>)>;
type ShiftsCallback = Box<dyn FnMut(Vec<ActiveShift>)>;
type LinkCallback = Box<dyn FnMut(&LinkEvent)>;

/// Creates a connected delivery handle and dispatcher.
pub fn channel() -> (DeliveryHandle, Dispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DeliveryHandle { tx },
        Dispatcher {
            rx,
            on_presence: None,
            on_shifts: None,
            on_link: None,
        },
    )
}

/// Producer side, cloned into the connection manager and its pumps.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl DeliveryHandle {
    /// Queues an event for the next drain.
    pub fn deliver(&self, event: LinkEvent) {
        if self.tx.send(event).is_err() {
            debug!("dispatcher gone, discarding link event");
        }
    }
}

/// Consumer side, owned by the host's main loop.
///
/// Callbacks are not required to be `Send`; they only ever run on the
/// thread that calls [`dispatch_pending`](Self::dispatch_pending).
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    on_presence: Option<PresenceCallback>,
    on_shifts: Option<ShiftsCallback>,
    on_link: Option<LinkCallback>,
}

impl Dispatcher {
    /// Sets the callback for presence updates.
    pub fn on_presence(&mut self, cb: impl FnMut(Vec<UserLocation>) + 'static) {
        self.on_presence = Some(Box::new(cb));
    }

    /// Sets the callback for active shift updates.
    pub fn on_shifts(&mut self, cb: impl FnMut(Vec<ActiveShift>) + 'static) {
        self.on_shifts = Some(Box::new(cb));
    }

    /// Sets the callback for connection lifecycle events
    /// (state changes, reconnect scheduling, give-up).
    pub fn on_link_event(&mut self, cb: impl FnMut(&LinkEvent) + 'static) {
        self.on_link = Some(Box::new(cb));
    }

    /// Delivers every queued event. Returns how many were processed.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// Waits for the next queued event without dispatching it.
    ///
    /// Returns `None` once every [`DeliveryHandle`] is gone.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Routes one event to its callback.
    pub fn dispatch(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Presence(users) => match self.on_presence.as_mut() {
                Some(cb) => cb(users),
                None => trace!(count = users.len(), "no presence callback set"),
            },
            LinkEvent::Shifts(shifts) => match self.on_shifts.as_mut() {
                Some(cb) => cb(shifts),
                None => trace!(count = shifts.len(), "no shifts callback set"),
            },
            other => {
                if let Some(cb) = self.on_link.as_mut() {
                    cb(&other);
                }
            }
        }
    }
}
