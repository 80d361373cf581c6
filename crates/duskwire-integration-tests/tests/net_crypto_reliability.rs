//! Net-crypto reliability under loss, and cookie freshness at the handshake
//! boundary that gates every session before it.

use duskwire_crypto::secretbox::SecretKey;
use duskwire_netcrypto::cookie::CookieSecretKey;
use duskwire_netcrypto::session::{Delivered, NetCryptoSession};
use duskwire_netcrypto::wire;

struct Peer {
    long_term: SecretKey,
    dht: SecretKey,
}

fn peer() -> Peer {
    Peer {
        long_term: SecretKey::generate(),
        dht: SecretKey::generate(),
    }
}

/// Drives the full cookie-request -> cookie-response -> handshake exchange
/// between two freshly constructed sessions, returning both ends confirmed
/// up through `NotConfirmed` (mirrors `session.rs`'s own test helper, here
/// exercised across the crate boundary rather than from inside the crate).
fn handshake(initiator: &Peer, responder: &Peer, cookie_secret: &CookieSecretKey) -> (NetCryptoSession, NetCryptoSession) {
    let mut client = NetCryptoSession::new(
        SecretKey::from_bytes(initiator.long_term.to_bytes()),
        SecretKey::from_bytes(initiator.dht.to_bytes()),
        responder.long_term.public_key(),
        responder.dht.public_key(),
        0,
    );
    let mut server = NetCryptoSession::new(
        SecretKey::from_bytes(responder.long_term.to_bytes()),
        SecretKey::from_bytes(responder.dht.to_bytes()),
        initiator.long_term.public_key(),
        initiator.dht.public_key(),
        0,
    );

    let cookie_req_packet = client.begin();
    let req = wire::decode_cookie_request(&responder.dht, &cookie_req_packet).expect("decode cookie request");
    let cookie = cookie_secret.mint(&req.sender_long_term_pk, &req.sender_dht_pk, 0);
    let cookie_resp_packet = wire::encode_cookie_response(&responder.dht, &initiator.dht.public_key(), &cookie, req.echo_id);

    let handshake_packet = client.handle_cookie_response(&cookie_resp_packet).expect("build handshake");
    let handshake_reply = server
        .handle_handshake_as_responder(cookie_secret, &handshake_packet, 0)
        .expect("responder accepts handshake");
    client.handle_handshake_as_initiator(&handshake_reply).expect("initiator adopts session key");

    (client, server)
}

/// A transport that drops every `nth` packet handed to it, used to model
/// the lossy link a reliable channel must survive.
struct LossyLink {
    nth: usize,
    sent: usize,
}

impl LossyLink {
    fn new(nth: usize) -> Self {
        Self { nth, sent: 0 }
    }

    /// Returns `Some(packet)` if this send makes it through.
    fn send(&mut self, packet: Vec<u8>) -> Option<Vec<u8>> {
        self.sent += 1;
        if self.sent % self.nth == 0 {
            None
        } else {
            Some(packet)
        }
    }
}

/// `client` sends `P1..P100` on the reliable channel over a link that drops
/// every 3rd packet; `server` must still deliver all 100 payloads in order,
/// given enough retransmit rounds. This models the end-to-end reliability
/// scenario's "[P1..P100] received in order" outcome directly against the
/// send/receive/retransmit surface, standing in for the bounded-RTT-count
/// claim with an unbounded number of retransmit rounds (wall-clock RTT
/// bounds are a deployment property, not something this in-process test can
/// observe).
#[test]
fn reliable_channel_delivers_everything_in_order_despite_dropped_packets() {
    let initiator = peer();
    let responder = peer();
    let cookie_secret = CookieSecretKey::generate();
    let (mut client, mut server) = handshake(&initiator, &responder, &cookie_secret);

    let total = 100usize;
    // packet_number -> (application payload, most recently encoded on-wire packet)
    let mut outbox: Vec<(u32, Vec<u8>, Vec<u8>)> = Vec::new();
    let mut link = LossyLink::new(3);
    let mut now_ms = 0u64;

    for i in 1..=total {
        let payload = format!("P{i}").into_bytes();
        let packet = client.send_lossless(payload.clone(), now_ms).expect("encode data packet");
        outbox.push((i as u32, payload, packet));
    }

    let mut delivered: Vec<Vec<u8>> = Vec::new();
    let mut rounds = 0usize;
    while delivered.len() < total {
        rounds += 1;
        assert!(rounds <= total * 4, "reliable delivery did not converge");

        for (_, _, packet) in &outbox {
            if let Some(on_wire) = link.send(packet.clone()) {
                for event in server.receive(&on_wire, now_ms) {
                    if let Delivered::Lossless(payload) = event {
                        delivered.push(payload);
                    }
                }
            }
        }

        now_ms += 50;
        let due = client.due_for_retransmit(now_ms, 25);
        for (packet_number, payload) in due {
            let fresh = client
                .encode_retransmit(packet_number, &payload)
                .expect("re-encode retransmit under original packet number");
            if let Some(slot) = outbox.iter_mut().find(|(n, _, _)| *n == packet_number) {
                slot.2 = fresh;
            }
        }
    }

    let expected: Vec<Vec<u8>> = (1..=total).map(|i| format!("P{i}").into_bytes()).collect();
    assert_eq!(delivered, expected);
}

/// A cookie minted at `t=0` still verifies just inside `COOKIE_TIMEOUT_SECS`,
/// but a replay attempted after it expires is rejected with
/// `AuthenticationFailed`, even though the tag itself is untampered.
#[test]
fn cookie_replay_is_rejected_once_stale_but_fresh_cookie_completes_handshake() {
    use duskwire_types::netcrypto::COOKIE_TIMEOUT_SECS;

    let secret = CookieSecretKey::generate();
    let real_pk = [0x01u8; 32];
    let dht_pk = [0x02u8; 32];
    let cookie = secret.mint(&real_pk, &dht_pk, 0);

    assert!(secret.verify(&cookie, COOKIE_TIMEOUT_SECS - 1).is_ok());
    assert!(secret.verify(&cookie, COOKIE_TIMEOUT_SECS + 1).is_err());

    // The same staleness check gates a full handshake attempt: a responder
    // checking a handshake whose cookie minting timestamp has aged past the
    // timeout must refuse it exactly like the bare cookie check does.
    let initiator = peer();
    let responder = peer();
    let mut client = NetCryptoSession::new(
        SecretKey::from_bytes(initiator.long_term.to_bytes()),
        SecretKey::from_bytes(initiator.dht.to_bytes()),
        responder.long_term.public_key(),
        responder.dht.public_key(),
        0,
    );
    let mut server = NetCryptoSession::new(
        SecretKey::from_bytes(responder.long_term.to_bytes()),
        SecretKey::from_bytes(responder.dht.to_bytes()),
        initiator.long_term.public_key(),
        initiator.dht.public_key(),
        0,
    );

    let cookie_req_packet = client.begin();
    let req = wire::decode_cookie_request(&responder.dht, &cookie_req_packet).expect("decode request");
    let stale_cookie = secret.mint(&req.sender_long_term_pk, &req.sender_dht_pk, 0);
    let cookie_resp_packet =
        wire::encode_cookie_response(&responder.dht, &initiator.dht.public_key(), &stale_cookie, req.echo_id);
    let handshake_packet = client.handle_cookie_response(&cookie_resp_packet).expect("build handshake");

    let result = server.handle_handshake_as_responder(&secret, &handshake_packet, COOKIE_TIMEOUT_SECS + 5);
    assert!(result.is_err(), "responder must reject a handshake carrying an expired cookie");
}
