//! Packet dispatch table keyed by first byte (§2: "demultiplexed by first
//! byte into one of ~30 handlers").

use std::collections::HashMap;
use std::net::SocketAddr;

/// A registered handler for one packet tag. Handlers run synchronously from
/// the receive loop (§5: "callbacks ... invoked on the driver thread ...
/// dispatched synchronously from UDP/TCP receive").
pub trait PacketHandler: Send + Sync {
    fn handle(&self, tag: u8, body: &[u8], from: SocketAddr);
}

/// Maps a packet tag byte to its handler. An unregistered tag is dropped
/// silently (§7: "any unexpected protocol byte is dropped without retry or
/// reply — by design, to avoid amplification").
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u8, Box<dyn PacketHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: u8, handler: Box<dyn PacketHandler>) {
        self.handlers.insert(tag, handler);
    }

    /// Dispatch one received UDP datagram. `packet` must be non-empty;
    /// empty datagrams are dropped.
    pub fn dispatch(&self, packet: &[u8], from: SocketAddr) {
        let Some((&tag, body)) = packet.split_first() else {
            return;
        };
        if let Some(handler) = self.handlers.get(&tag) {
            handler.handle(tag, body, from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler(Arc<AtomicUsize>);

    impl PacketHandler for CountingHandler {
        fn handle(&self, _tag: u8, _body: &[u8], _from: SocketAddr) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_routes_by_first_byte() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(0x00, Box::new(CountingHandler(counter.clone())));

        let from: SocketAddr = "127.0.0.1:1".parse().unwrap();
        dispatcher.dispatch(&[0x00, 1, 2, 3], from);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        dispatcher.dispatch(&[0x01, 1, 2, 3], from);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_ignores_empty_packet() {
        let dispatcher = Dispatcher::new();
        let from: SocketAddr = "127.0.0.1:1".parse().unwrap();
        dispatcher.dispatch(&[], from);
    }
}
