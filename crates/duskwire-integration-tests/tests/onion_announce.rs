//! Onion announce anti-amplification: a node announcing itself must first
//! echo a fresh `ping_id` challenge issued to its own address, and the
//! announce store never holds more than one entry per data public key.

use std::net::{IpAddr, Ipv4Addr};

use duskwire_onion::announce::{AnnounceStore, PingIdIssuer};
use duskwire_types::addr::IpPort;
use duskwire_types::onion::AnnounceEntry;

fn entry(data_pk: [u8; 32], ip_port: IpPort, now_ms: u64) -> AnnounceEntry {
    AnnounceEntry {
        data_public_key: data_pk,
        announced_node_ip_port: ip_port,
        timeout_secs: 300,
        stored_at_ms: now_ms,
        stored_payload: None,
    }
}

/// `D` (`0x04..04`) announces through a relay that only accepts the request
/// once `D` echoes the `ping_id` the relay issued to `D`'s own address —
/// an announce carrying a stale or wrong ping_id is rejected outright, which
/// is what keeps a forged source address from turning the relay into an
/// amplifier.
#[test]
fn announce_requires_a_fresh_ping_id_for_the_requesting_address() {
    let relay_secret = [0x42u8; 32];
    let issuer = PingIdIssuer::new(relay_secret);
    let announcer_ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let now_secs = 1_000;

    let issued = issuer.issue(announcer_ip, now_secs);
    assert!(issuer.verify(announcer_ip, now_secs + 2, &issued));

    // A ping_id issued for a different source address never verifies, even
    // at the same instant — the anti-amplification scenario's "wrong
    // ping_id produces no response larger than the request" bound depends
    // on this rejection happening before any state is touched.
    let other_ip = IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8));
    let issued_for_other = issuer.issue(other_ip, now_secs);
    assert!(!issuer.verify(announcer_ip, now_secs, &issued_for_other));
}

/// `D` announces `data_pk = 0x04..04` into node `C`'s store. A second
/// announce under the same data key refreshes the entry in place rather
/// than creating a duplicate — the "store key uniqueness per bucket"
/// property a lookup depends on.
#[test]
fn announce_store_holds_one_entry_per_data_key_even_across_rounds() {
    let node_c_key = [0x03u8; 32];
    let data_pk = [0x04u8; 32];
    let mut store = AnnounceStore::new(node_c_key);

    let first_hop_addr = IpPort::from_v4(Ipv4Addr::new(127, 0, 0, 1), 33001);
    store.store(entry(data_pk, first_hop_addr, 0)).expect("first announce");
    assert_eq!(store.len(), 1);

    let refreshed_addr = IpPort::from_v4(Ipv4Addr::new(127, 0, 0, 1), 33002);
    store.store(entry(data_pk, refreshed_addr, 1_000)).expect("re-announce");
    assert_eq!(store.len(), 1, "re-announcing must refresh, not duplicate");

    let found = store.lookup(&data_pk).expect("entry present");
    assert_eq!(found.announced_node_ip_port, refreshed_addr);
}

/// `E` looking up `D`'s `data_pk` via `C`'s store learns only the return
/// path `C` holds for `D`, never `D`'s real address directly — the store
/// is keyed purely by `data_public_key`, so a lookup surface that only
/// exposes `lookup` cannot leak anything beyond what was announced.
#[test]
fn lookup_by_unknown_data_key_reveals_nothing() {
    let node_c_key = [0x03u8; 32];
    let mut store = AnnounceStore::new(node_c_key);
    store
        .store(entry([0x04u8; 32], IpPort::from_v4(Ipv4Addr::LOCALHOST, 33001), 0))
        .expect("announce");

    assert!(store.lookup(&[0x05u8; 32]).is_none());
}
