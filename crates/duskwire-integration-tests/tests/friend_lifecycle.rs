//! Friend connection arena lifecycle: `lock_count` reaching zero is what
//! eventually tears a connection down, and a net-crypto session reaching
//! `Confirmed` is what the friend layer reports onward as "connected".

use duskwire_friend::{FriendConnections, FriendEvent};
use duskwire_types::friend::FriendCallbackSlot;

/// Two independent callers (e.g. the messenger layer and a group-chat
/// hand-off) both hold a lock on the same friend. The connection survives
/// until both release it — `lock_count == 0` is what actually drops the
/// slot, not the first `kill`.
#[test]
fn connection_survives_until_every_holder_releases_it() {
    let mut friends = FriendConnections::new();
    let friend_pk = [0x11u8; 32];

    let messenger_slot = friends.new_friend_connection(friend_pk);
    let group_chat_slot = friends.new_friend_connection(friend_pk);
    assert_eq!(messenger_slot, group_chat_slot, "both holders share the one arena slot");
    assert_eq!(friends.len(), 1);

    friends.kill_friend_connection(friend_pk).expect("first release");
    assert!(friends.get(&friend_pk).is_some(), "still held by the second caller");

    friends.kill_friend_connection(friend_pk).expect("second release");
    assert!(friends.get(&friend_pk).is_none(), "dropped once every holder released it");
}

/// A net-crypto session reaching `Confirmed` is reported through
/// [`FriendEvent::StatusChanged`] with `connected: true`; losing that
/// session (e.g. the underlying transport died) reports `connected: false`
/// without tearing down the arena slot itself.
#[test]
fn session_confirmation_and_loss_surface_as_status_events() {
    let mut friends = FriendConnections::new();
    let friend_pk = [0x22u8; 32];
    friends.new_friend_connection(friend_pk);

    let confirmed_events = friends.on_session_confirmed(friend_pk, 7, 1_000);
    assert_eq!(
        confirmed_events,
        vec![FriendEvent::StatusChanged {
            friend_pk,
            connected: true
        }]
    );

    let lost_events = friends.on_session_lost(friend_pk);
    assert_eq!(
        lost_events,
        vec![FriendEvent::StatusChanged {
            friend_pk,
            connected: false
        }]
    );
    // The slot itself is untouched by a lost session; only an explicit kill
    // removes it, since some other layer may still hold a lock.
    assert!(friends.get(&friend_pk).is_some());
}

/// A relay list shared by a friend over the wire is decoded, remembered, and
/// surfaced as a [`FriendEvent::RelaysReceived`], ready for a TCP-relay pool
/// manager to act on.
#[test]
fn shared_relays_are_decoded_and_surfaced_as_an_event() {
    use duskwire_friend::FriendConnection;
    let _ = FriendConnection::new([0u8; 32]); // constructible from outside the crate

    let mut friends = FriendConnections::new();
    let friend_pk = [0x33u8; 32];
    friends.new_friend_connection(friend_pk);

    let relay_a = [0xAAu8; 32];
    let relay_b = [0xBBu8; 32];
    let payload = duskwire_friend::packet::encode(&duskwire_friend::packet::FriendPacket::ShareRelays(vec![
        relay_a, relay_b,
    ]));

    let events = friends
        .handle_payload(friend_pk, FriendCallbackSlot::Messenger, &payload)
        .expect("decode share-relays payload");

    assert_eq!(
        events,
        vec![FriendEvent::RelaysReceived {
            friend_pk,
            relays: vec![relay_a, relay_b]
        }]
    );
    assert_eq!(
        friends.get(&friend_pk).expect("connection exists").stored_relays(),
        &[relay_a, relay_b]
    );
}
