use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to generate a nonce")]
    Nonce,
    #[error("payload too short to carry a nonce")]
    Truncated,
    #[error("payload failed authentication")]
    Integrity,
}

/// AES-256-GCM content cipher.
///
/// The key is derived from the configured passphrase with SHA-256. Sealed
/// payloads are self-describing: a fresh 12-byte nonce followed by the
/// ciphertext and its authentication tag, so decryption needs nothing but the
/// key, and any altered byte fails authentication instead of decoding.
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Cipher {
    pub fn new(passphrase: &str) -> Self {
        let key = digest(&SHA256, passphrase.as_bytes());
        let key = UnboundKey::new(&AES_256_GCM, key.as_ref())
            .expect("a SHA-256 digest is a valid AES-256 key");

        Self {
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Nonce)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::Integrity)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| CryptoError::Truncated)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Integrity)?
            .len();

        in_out.truncate(plaintext_len);
        Ok(in_out)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_should_round_trip() {
        let cipher = Cipher::new("correct horse battery staple");
        let sealed = cipher.encrypt(b"secret").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"secret");
    }

    #[test]
    fn test_should_use_a_fresh_nonce_per_payload() {
        let cipher = Cipher::new("key");
        let a = cipher.encrypt(b"same bytes").unwrap();
        let b = cipher.encrypt(b"same bytes").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_should_fail_authentication_on_tampering() {
        let cipher = Cipher::new("key");
        let mut sealed = cipher.encrypt(b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&sealed),
            Err(CryptoError::Integrity)
        ));
    }

    #[test]
    fn test_should_reject_other_keys() {
        let sealed = Cipher::new("key a").encrypt(b"secret").unwrap();
        assert!(matches!(
            Cipher::new("key b").decrypt(&sealed),
            Err(CryptoError::Integrity)
        ));
    }

    #[test]
    fn test_should_reject_truncated_payloads() {
        let cipher = Cipher::new("key");
        assert!(matches!(
            cipher.decrypt(b"short"),
            Err(CryptoError::Truncated)
        ));
    }
}
