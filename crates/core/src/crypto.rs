//! Message encryption.
//!
//! AES-256-CBC with PKCS7 padding over a fixed process-wide key. Each message
//! gets a fresh random 128-bit IV, prepended to the ciphertext before hex
//! encoding, so equal plaintexts never produce equal ciphertexts. Decryption
//! also understands the legacy layout (a fixed IV and no prefix) that older
//! seeded histories were written with.
//!
//! The fixed key is a reproducibility placeholder, not security. Key
//! management is explicitly out of scope.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK: usize = 16;

/// Fixed IV used by the legacy single-IV layout.
const LEGACY_IV: [u8; BLOCK] = *b"abcdef0123456789";

/// Symmetric cipher for message history entries.
#[derive(Clone)]
pub struct MessageCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypts a plaintext message, returning `hex(IV || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; BLOCK];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut framed = Vec::with_capacity(BLOCK + ciphertext.len());
        framed.extend_from_slice(&iv);
        framed.extend_from_slice(&ciphertext);
        encode_hex(&framed)
    }

    /// Attempts to decrypt a stored hex value.
    ///
    /// Returns `None` for anything that is not valid ciphertext under either
    /// supported layout — malformed hex, bad padding, non-UTF-8 plaintext.
    /// Callers treat `None` as "pass the stored value through unchanged".
    pub fn decrypt(&self, ciphertext_hex: &str) -> Option<String> {
        let bytes = decode_hex(ciphertext_hex)?;
        if bytes.is_empty() || bytes.len() % BLOCK != 0 {
            return None;
        }

        // Framed layout: leading IV, at least one ciphertext block after it.
        if bytes.len() >= 2 * BLOCK {
            let (iv, ciphertext) = bytes.split_at(BLOCK);
            let iv: [u8; BLOCK] = iv.try_into().expect("split_at yields a full block");
            if let Some(plaintext) = self.decrypt_raw(&iv, ciphertext) {
                return Some(plaintext);
            }
        }

        // Legacy layout: the whole buffer is ciphertext under the fixed IV.
        self.decrypt_raw(&LEGACY_IV, &bytes)
    }

    fn decrypt_raw(&self, iv: &[u8; BLOCK], ciphertext: &[u8]) -> Option<String> {
        let plaintext = Aes256CbcDec::new(&self.key.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub(crate) fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(input.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MESSAGE_KEY;

    fn cipher() -> MessageCipher {
        MessageCipher::new(DEFAULT_MESSAGE_KEY)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let ciphertext = cipher.encrypt("hello");
        assert_ne!(ciphertext, "hello");
        assert_eq!(cipher.decrypt(&ciphertext).as_deref(), Some("hello"));
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let cipher = cipher();
        let first = cipher.encrypt("same plaintext");
        let second = cipher.encrypt("same plaintext");
        assert_ne!(first, second, "equal plaintexts must not repeat ciphertext");
    }

    #[test]
    fn test_decrypts_legacy_fixed_iv_layout() {
        let cipher = cipher();

        // Build a legacy-layout ciphertext by hand: fixed IV, no prefix.
        let ciphertext = Aes256CbcEnc::new(&DEFAULT_MESSAGE_KEY.into(), &LEGACY_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(b"Shush yo mouth Chopper D. Plug");
        let stored = encode_hex(&ciphertext);

        assert_eq!(
            cipher.decrypt(&stored).as_deref(),
            Some("Shush yo mouth Chopper D. Plug")
        );
    }

    #[test]
    fn test_garbage_decrypts_to_none() {
        let cipher = cipher();
        assert_eq!(cipher.decrypt("not hex at all"), None);
        assert_eq!(cipher.decrypt("abcd"), None); // valid hex, not block-sized
        assert_eq!(cipher.decrypt(""), None);
    }

    #[test]
    fn test_hex_codec_roundtrip() {
        let bytes = [0x00, 0x0f, 0xa5, 0xff];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "000fa5ff");
        assert_eq!(decode_hex(&hex).as_deref(), Some(&bytes[..]));
        assert_eq!(decode_hex("0g"), None);
    }
}
