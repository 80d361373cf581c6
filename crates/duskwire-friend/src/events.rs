//! Outward notifications and the group-chat hand-off boundary.
//!
//! The protocol describes friend connections driving a forest of per-slot
//! callbacks (messenger, group chat) directly. Collapsed here into one
//! tagged-variant [`FriendEvent`] drained from [`crate::manager::FriendConnections::step`]
//! and [`crate::manager::FriendConnections::handle_packet`]: subscribers match
//! on the variant rather than registering closures.

use duskwire_types::friend::FriendCallbackSlot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FriendEvent {
    StatusChanged {
        friend_pk: [u8; 32],
        connected: bool,
    },
    LosslessData {
        friend_pk: [u8; 32],
        slot: FriendCallbackSlot,
        payload: Vec<u8>,
    },
    LossyData {
        friend_pk: [u8; 32],
        slot: FriendCallbackSlot,
        payload: Vec<u8>,
    },
    RelaysReceived {
        friend_pk: [u8; 32],
        relays: Vec<[u8; 32]>,
    },
    /// A friend-layer payload is ready to send over `friend_pk`'s confirmed
    /// net-crypto session; the caller owns actually handing it to that
    /// session's lossless channel.
    OutgoingPacket {
        friend_pk: [u8; 32],
        payload: Vec<u8>,
    },
}

/// Boundary contract for handing a confirmed friend connection off to a
/// group-chat session. This crate does not implement group-chat transport;
/// it only guarantees a lossless, fragment-reassembled byte channel keyed by
/// `group_id`. A higher layer implements this trait over its own session
/// state and registers itself in the [`FriendCallbackSlot::GroupChat`] slot.
pub trait GroupChannel {
    /// A reassembled, in-order payload addressed to a group conversation
    /// arrived from `friend_pk`.
    fn on_group_payload(&mut self, friend_pk: [u8; 32], group_id: u32, payload: &[u8]);

    /// The friend connection carrying this group's traffic changed state.
    fn on_friend_status_changed(&mut self, friend_pk: [u8; 32], connected: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        statuses: Vec<([u8; 32], bool)>,
    }

    impl GroupChannel for Recorder {
        fn on_group_payload(&mut self, _friend_pk: [u8; 32], _group_id: u32, _payload: &[u8]) {}

        fn on_friend_status_changed(&mut self, friend_pk: [u8; 32], connected: bool) {
            self.statuses.push((friend_pk, connected));
        }
    }

    #[test]
    fn group_channel_trait_is_object_usable() {
        let mut rec = Recorder { statuses: Vec::new() };
        let channel: &mut dyn GroupChannel = &mut rec;
        channel.on_friend_status_changed([9u8; 32], true);
        assert_eq!(rec.statuses, vec![([9u8; 32], true)]);
    }
}
