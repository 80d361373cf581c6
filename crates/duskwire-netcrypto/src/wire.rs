//! Cookie-request/response and handshake packet encoding (§4.5, §6).
//!
//! Cookie request/response travel under the DHT keypair — the long-term
//! identity isn't trusted to be reachable yet, so the outer encryption rides
//! on the same precomputed-DHT-key machinery as ping/nodes packets. The
//! handshake, once a cookie is in hand, is encrypted under the long-term
//! keypair instead: decrypting it successfully *is* the authentication, the
//! same role a signature would play if identity keys could sign.

use duskwire_crypto::secretbox::{self, PublicKey, SecretKey};
use duskwire_types::packet::{COOKIE_REQUEST, COOKIE_RESPONSE, CRYPTO_HANDSHAKE};

use crate::cookie::COOKIE_SIZE;
use crate::{NetCryptoError, Result};

const NONCE_SIZE: usize = duskwire_crypto::nonce::NONCE_SIZE;

/// `[0x18][sender_long_term_pk:32][sender_dht_pk:32][nonce:24][encrypted{echo_id:8}]` (§6).
pub struct CookieRequest {
    pub sender_long_term_pk: [u8; 32],
    pub sender_dht_pk: [u8; 32],
    pub echo_id: u64,
}

pub fn encode_cookie_request(
    our_dht_secret: &SecretKey,
    peer_dht_pk: &PublicKey,
    req: &CookieRequest,
) -> Vec<u8> {
    let nonce = secretbox::generate_nonce();
    let ciphertext = secretbox::encrypt(our_dht_secret, peer_dht_pk, &nonce, &req.echo_id.to_be_bytes())
        .expect("encryption of a fixed-size plaintext cannot fail");

    let mut out = Vec::with_capacity(1 + 32 + 32 + NONCE_SIZE + ciphertext.len());
    out.push(COOKIE_REQUEST);
    out.extend_from_slice(&req.sender_long_term_pk);
    out.extend_from_slice(&req.sender_dht_pk);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

pub fn decode_cookie_request(our_dht_secret: &SecretKey, data: &[u8]) -> Result<CookieRequest> {
    if data.first() != Some(&COOKIE_REQUEST) {
        return Err(NetCryptoError::InvalidArgument("not a cookie request".into()));
    }
    if data.len() < 1 + 32 + 32 + NONCE_SIZE {
        return Err(NetCryptoError::InvalidArgument("cookie request too short".into()));
    }
    let sender_long_term_pk: [u8; 32] = data[1..33].try_into().expect("slice is 32 bytes");
    let sender_dht_pk: [u8; 32] = data[33..65].try_into().expect("slice is 32 bytes");
    let nonce: [u8; NONCE_SIZE] = data[65..65 + NONCE_SIZE]
        .try_into()
        .expect("slice is NONCE_SIZE bytes");
    let ciphertext = &data[65 + NONCE_SIZE..];

    let plaintext = secretbox::decrypt(
        our_dht_secret,
        &PublicKey::from_bytes(sender_dht_pk),
        &nonce,
        ciphertext,
    )
    .map_err(|_| NetCryptoError::AuthenticationFailed)?;
    if plaintext.len() != 8 {
        return Err(NetCryptoError::InvalidArgument("malformed cookie request body".into()));
    }
    let echo_id = u64::from_be_bytes(plaintext.try_into().expect("checked length above"));

    Ok(CookieRequest {
        sender_long_term_pk,
        sender_dht_pk,
        echo_id,
    })
}

/// `[0x19][nonce:24][encrypted{cookie:104, echo_id:8}]`.
pub fn encode_cookie_response(
    our_dht_secret: &SecretKey,
    requester_dht_pk: &PublicKey,
    cookie: &[u8; COOKIE_SIZE],
    echo_id: u64,
) -> Vec<u8> {
    let nonce = secretbox::generate_nonce();
    let mut plain = Vec::with_capacity(COOKIE_SIZE + 8);
    plain.extend_from_slice(cookie);
    plain.extend_from_slice(&echo_id.to_be_bytes());
    let ciphertext =
        secretbox::encrypt(our_dht_secret, requester_dht_pk, &nonce, &plain).expect("fixed-size plaintext");

    let mut out = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    out.push(COOKIE_RESPONSE);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

pub fn decode_cookie_response(
    our_dht_secret: &SecretKey,
    responder_dht_pk: &PublicKey,
    data: &[u8],
) -> Result<([u8; COOKIE_SIZE], u64)> {
    if data.first() != Some(&COOKIE_RESPONSE) {
        return Err(NetCryptoError::InvalidArgument("not a cookie response".into()));
    }
    if data.len() < 1 + NONCE_SIZE {
        return Err(NetCryptoError::InvalidArgument("cookie response too short".into()));
    }
    let nonce: [u8; NONCE_SIZE] = data[1..1 + NONCE_SIZE].try_into().expect("slice is NONCE_SIZE bytes");
    let ciphertext = &data[1 + NONCE_SIZE..];
    let plaintext = secretbox::decrypt(our_dht_secret, responder_dht_pk, &nonce, ciphertext)
        .map_err(|_| NetCryptoError::AuthenticationFailed)?;
    if plaintext.len() != COOKIE_SIZE + 8 {
        return Err(NetCryptoError::InvalidArgument("malformed cookie response body".into()));
    }
    let cookie: [u8; COOKIE_SIZE] = plaintext[..COOKIE_SIZE].try_into().expect("checked length above");
    let echo_id = u64::from_be_bytes(plaintext[COOKIE_SIZE..].try_into().expect("checked length above"));
    Ok((cookie, echo_id))
}

/// `[0x1a][sender_long_term_pk:32][nonce:24][encrypted{cookie:104, session_pk:32, base_nonce:24}]`.
pub struct HandshakePayload {
    pub cookie: [u8; COOKIE_SIZE],
    pub session_pk: [u8; 32],
    pub base_nonce: [u8; NONCE_SIZE],
}

pub fn encode_handshake(
    our_long_term_secret: &SecretKey,
    peer_long_term_pk: &PublicKey,
    sender_long_term_pk: &[u8; 32],
    payload: &HandshakePayload,
) -> Vec<u8> {
    let nonce = secretbox::generate_nonce();
    let mut plain = Vec::with_capacity(COOKIE_SIZE + 32 + NONCE_SIZE);
    plain.extend_from_slice(&payload.cookie);
    plain.extend_from_slice(&payload.session_pk);
    plain.extend_from_slice(&payload.base_nonce);
    let ciphertext =
        secretbox::encrypt(our_long_term_secret, peer_long_term_pk, &nonce, &plain).expect("fixed-size plaintext");

    let mut out = Vec::with_capacity(1 + 32 + NONCE_SIZE + ciphertext.len());
    out.push(CRYPTO_HANDSHAKE);
    out.extend_from_slice(sender_long_term_pk);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

pub fn decode_handshake(
    our_long_term_secret: &SecretKey,
    data: &[u8],
) -> Result<([u8; 32], HandshakePayload)> {
    if data.first() != Some(&CRYPTO_HANDSHAKE) {
        return Err(NetCryptoError::InvalidArgument("not a handshake packet".into()));
    }
    if data.len() < 1 + 32 + NONCE_SIZE {
        return Err(NetCryptoError::InvalidArgument("handshake too short".into()));
    }
    let sender_long_term_pk: [u8; 32] = data[1..33].try_into().expect("slice is 32 bytes");
    let nonce: [u8; NONCE_SIZE] = data[33..33 + NONCE_SIZE]
        .try_into()
        .expect("slice is NONCE_SIZE bytes");
    let ciphertext = &data[33 + NONCE_SIZE..];

    let plaintext = secretbox::decrypt(
        our_long_term_secret,
        &PublicKey::from_bytes(sender_long_term_pk),
        &nonce,
        ciphertext,
    )
    .map_err(|_| NetCryptoError::AuthenticationFailed)?;
    if plaintext.len() != COOKIE_SIZE + 32 + NONCE_SIZE {
        return Err(NetCryptoError::InvalidArgument("malformed handshake body".into()));
    }
    let cookie: [u8; COOKIE_SIZE] = plaintext[..COOKIE_SIZE].try_into().expect("checked length above");
    let session_pk: [u8; 32] = plaintext[COOKIE_SIZE..COOKIE_SIZE + 32]
        .try_into()
        .expect("checked length above");
    let base_nonce: [u8; NONCE_SIZE] = plaintext[COOKIE_SIZE + 32..]
        .try_into()
        .expect("checked length above");

    Ok((
        sender_long_term_pk,
        HandshakePayload {
            cookie,
            session_pk,
            base_nonce,
        },
    ))
}
