//! HMAC-signed share-link access tokens. Only verification of tokens issued elsewhere is
//! in scope here — bearer-token issuance and login flows are a front-end concern (§1).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CoreError, CoreResult};
use crate::id::SessionId;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a share token: which session it grants access to, who minted it, and
/// when it expires. Serialized as `<payload_b64>.<signature_hex>` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub session_id: SessionId,
    pub issuer: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

fn payload_bytes(claims: &TokenClaims) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}",
        claims.session_id, claims.issuer, claims.issued_at, claims.expires_at
    )
    .into_bytes()
}

fn sign(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Mint a token string for `claims`, signed with `secret` (raw bytes, not hex).
pub fn issue(secret: &[u8], claims: &TokenClaims) -> String {
    let payload = payload_bytes(claims);
    let signature = sign(secret, &payload);
    format!(
        "{}.{}",
        base64_url_encode(&payload),
        hex::encode(signature)
    )
}

/// Verify `token` against `secret`, requiring `expected_issuer` and that `now` is before
/// expiry. Returns the recovered claims on success.
pub fn verify(
    secret: &[u8],
    token: &str,
    expected_issuer: &str,
    now: i64,
) -> CoreResult<TokenClaims> {
    let (payload_part, sig_part) = token
        .split_once('.')
        .ok_or(CoreError::TokenMalformed("missing '.' separator"))?;

    let payload = base64_url_decode(payload_part)
        .ok_or(CoreError::TokenMalformed("payload is not valid base64url"))?;
    let claimed_sig =
        hex::decode(sig_part).map_err(|_| CoreError::TokenMalformed("signature is not valid hex"))?;

    let expected_sig = sign(secret, &payload);
    if !constant_time_eq(&expected_sig, &claimed_sig) {
        return Err(CoreError::TokenSignatureMismatch);
    }

    let text = String::from_utf8(payload).map_err(|_| CoreError::TokenMalformed("payload is not UTF-8"))?;
    let mut parts = text.split('|');
    let session_id = parts
        .next()
        .and_then(SessionId::parse)
        .ok_or(CoreError::TokenMalformed("missing or invalid session id"))?;
    let issuer = parts
        .next()
        .ok_or(CoreError::TokenMalformed("missing issuer"))?
        .to_string();
    let issued_at: i64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(CoreError::TokenMalformed("missing or invalid issued_at"))?;
    let expires_at: i64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(CoreError::TokenMalformed("missing or invalid expires_at"))?;

    if issuer != expected_issuer {
        return Err(CoreError::TokenIssuerMismatch {
            expected: expected_issuer.to_string(),
            found: issuer,
        });
    }
    if now >= expires_at {
        return Err(CoreError::TokenExpired { expiry: expires_at });
    }

    Ok(TokenClaims {
        session_id,
        issuer,
        issued_at,
        expires_at,
    })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

const B64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

fn base64_url_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = (b0 as u32) << 16 | (b1 as u32) << 8 | b2 as u32;
        out.push(B64_ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(B64_ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        if chunk.len() > 1 {
            out.push(B64_ALPHABET[(n >> 6 & 0x3f) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(B64_ALPHABET[(n & 0x3f) as usize] as char);
        }
    }
    out
}

fn base64_url_decode(s: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u32> {
        B64_ALPHABET.iter().position(|&b| b == c).map(|p| p as u32)
    }

    let chars: Vec<u8> = s.bytes().collect();
    let mut out = Vec::with_capacity(chars.len() * 3 / 4);
    for chunk in chars.chunks(4) {
        let v: Vec<u32> = chunk.iter().map(|&c| value(c)).collect::<Option<Vec<_>>>()?;
        match v.len() {
            4 => {
                let n = v[0] << 18 | v[1] << 12 | v[2] << 6 | v[3];
                out.push((n >> 16) as u8);
                out.push((n >> 8) as u8);
                out.push(n as u8);
            }
            3 => {
                let n = v[0] << 18 | v[1] << 12 | v[2] << 6;
                out.push((n >> 16) as u8);
                out.push((n >> 8) as u8);
            }
            2 => {
                let n = v[0] << 18 | v[1] << 12;
                out.push((n >> 16) as u8);
            }
            _ => return None,
        }
    }
    Some(out)
}
