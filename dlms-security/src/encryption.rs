//! AES-GCM primitives as used by DLMS security suite 0

use crate::error::{DlmsError, DlmsResult};
use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::aead::consts::U12;
use aes_gcm::{AesGcm, Nonce, Tag};
use std::fmt;

/// Length of the truncated GCM authentication tag
pub const TAG_LENGTH: usize = 12;
/// System title plus invocation counter
pub const NONCE_LENGTH: usize = 12;

/// AES-128-GCM with the 12-byte tag DLMS transmits
type DlmsAesGcm = AesGcm<Aes128, U12, U12>;

/// AES-GCM encryption context bound to one key
pub struct GcmCipher {
    aead: DlmsAesGcm,
    block: Aes128,
}

impl GcmCipher {
    /// Create a new AES-GCM context
    pub fn new(key: &[u8]) -> DlmsResult<Self> {
        if key.len() != 16 {
            return Err(DlmsError::Security(format!(
                "Invalid AES-128 key length: expected 16 bytes, got {}",
                key.len()
            )));
        }
        let aead = DlmsAesGcm::new_from_slice(key)
            .map_err(|e| DlmsError::Security(format!("Invalid AES-128 key: {}", e)))?;
        let block = Aes128::new(GenericArray::from_slice(key));
        Ok(Self { aead, block })
    }

    /// Encrypt and authenticate, returning ciphertext and tag
    pub fn encrypt(
        &self,
        nonce: &[u8; NONCE_LENGTH],
        aad: &[u8],
        plaintext: &[u8],
    ) -> DlmsResult<(Vec<u8>, [u8; TAG_LENGTH])> {
        let mut buffer = plaintext.to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(Nonce::<U12>::from_slice(nonce), aad, &mut buffer)
            .map_err(|e| DlmsError::Security(format!("Encryption failed: {}", e)))?;
        let mut out = [0u8; TAG_LENGTH];
        out.copy_from_slice(&tag);
        Ok((buffer, out))
    }

    /// Verify the tag and decrypt
    ///
    /// # Errors
    /// `DlmsError::AuthenticationFailed` if the tag does not verify
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_LENGTH],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> DlmsResult<Vec<u8>> {
        if tag.len() != TAG_LENGTH {
            return Err(DlmsError::Security(format!(
                "Invalid tag length: expected {} bytes, got {}",
                TAG_LENGTH,
                tag.len()
            )));
        }
        let mut buffer = ciphertext.to_vec();
        self.aead
            .decrypt_in_place_detached(
                Nonce::<U12>::from_slice(nonce),
                aad,
                &mut buffer,
                Tag::<U12>::from_slice(tag),
            )
            .map_err(|_| {
                DlmsError::AuthenticationFailed(
                    "GCM tag mismatch, check the configured keys".to_string(),
                )
            })?;
        Ok(buffer)
    }

    /// GMAC over `aad` alone
    pub fn gmac(&self, nonce: &[u8; NONCE_LENGTH], aad: &[u8]) -> DlmsResult<[u8; TAG_LENGTH]> {
        let (_, tag) = self.encrypt(nonce, aad, &[])?;
        Ok(tag)
    }

    /// Apply the GCM keystream without authentication (encryption-only telegrams)
    ///
    /// The counter starts at 2: block 1 is reserved for the tag.
    pub fn apply_keystream(&self, nonce: &[u8; NONCE_LENGTH], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (i, chunk) in data.chunks(16).enumerate() {
            let mut counter = [0u8; 16];
            counter[..NONCE_LENGTH].copy_from_slice(nonce);
            counter[NONCE_LENGTH..].copy_from_slice(&(i as u32).wrapping_add(2).to_be_bytes());
            let mut block = GenericArray::clone_from_slice(&counter);
            self.block.encrypt_block(&mut block);
            out.extend(chunk.iter().zip(block.iter()).map(|(d, k)| d ^ k));
        }
        out
    }
}

impl fmt::Debug for GcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcmCipher").finish_non_exhaustive()
    }
}

/// Security control byte for DLMS APDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    byte: u8,
}

impl SecurityControl {
    const AUTHENTICATED: u8 = 0x10;
    const ENCRYPTED: u8 = 0x20;
    const KEY_SET: u8 = 0x40;
    const COMPRESSED: u8 = 0x80;

    /// Create a new security control byte
    pub fn new(
        security_suite_id: u8,
        authenticated: bool,
        encrypted: bool,
        key_set: bool,
    ) -> Self {
        let mut byte = security_suite_id & 0x0F;
        if authenticated {
            byte |= Self::AUTHENTICATED;
        }
        if encrypted {
            byte |= Self::ENCRYPTED;
        }
        if key_set {
            byte |= Self::KEY_SET;
        }
        Self { byte }
    }

    /// Decode from byte
    pub fn from_byte(byte: u8) -> Self {
        Self { byte }
    }

    /// Get the byte value
    pub fn to_byte(&self) -> u8 {
        self.byte
    }

    /// Get security suite ID
    pub fn security_suite_id(&self) -> u8 {
        self.byte & 0x0F
    }

    /// Check if authenticated
    pub fn is_authenticated(&self) -> bool {
        (self.byte & Self::AUTHENTICATED) != 0
    }

    /// Check if encrypted
    pub fn is_encrypted(&self) -> bool {
        (self.byte & Self::ENCRYPTED) != 0
    }

    /// Check if key set (broadcast key instead of unicast)
    pub fn is_key_set(&self) -> bool {
        (self.byte & Self::KEY_SET) != 0
    }

    /// Check if the payload is compressed
    pub fn is_compressed(&self) -> bool {
        (self.byte & Self::COMPRESSED) != 0
    }
}

impl fmt::Display for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SC 0x{:02X} (suite {}{}{})",
            self.byte,
            self.security_suite_id(),
            if self.is_authenticated() { ", authenticated" } else { "" },
            if self.is_encrypted() { ", encrypted" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];
    const NONCE: [u8; 12] = [0x4D, 0x4D, 0x4D, 0x00, 0x00, 0xBC, 0x61, 0x4E, 0x01, 0x23, 0x45, 0x67];

    #[test]
    fn test_aes_gcm_encrypt_decrypt() {
        let cipher = GcmCipher::new(&KEY).unwrap();
        let plaintext = b"Hello, World!";
        let aad = [0x30, 0xD0, 0xD1];

        let (ciphertext, tag) = cipher.encrypt(&NONCE, &aad, plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext);
        let decrypted = cipher.decrypt(&NONCE, &aad, &ciphertext, &tag).unwrap();
        assert_eq!(plaintext, decrypted.as_slice());
    }

    #[test]
    fn test_tag_mismatch_is_authentication_failure() {
        let cipher = GcmCipher::new(&KEY).unwrap();
        let (ciphertext, mut tag) = cipher.encrypt(&NONCE, &[0x30], b"payload").unwrap();
        tag[0] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&NONCE, &[0x30], &ciphertext, &tag),
            Err(DlmsError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_keystream_matches_gcm_ciphertext() {
        use aes_gcm::aead::Aead;

        let cipher = GcmCipher::new(&KEY).unwrap();
        // two full blocks and a partial one
        let plaintext: Vec<u8> = (0..40).collect();
        let reference = aes_gcm::Aes128Gcm::new_from_slice(&KEY).unwrap();
        let mut sealed = reference
            .encrypt(Nonce::<U12>::from_slice(&NONCE), plaintext.as_slice())
            .unwrap();
        sealed.truncate(plaintext.len());

        assert_eq!(cipher.apply_keystream(&NONCE, &plaintext), sealed);
        assert_eq!(cipher.apply_keystream(&NONCE, &sealed), plaintext);
        let (ciphertext, _) = cipher.encrypt(&NONCE, &[], &plaintext).unwrap();
        assert_eq!(ciphertext, sealed);
    }

    #[test]
    fn test_keystream_known_answer() {
        let cipher = GcmCipher::new(&KEY).unwrap();
        let plaintext: Vec<u8> = (0..20).collect();
        assert_eq!(
            cipher.apply_keystream(&NONCE, &plaintext),
            hex::decode("811310fc9f5f4150602e316eb01390f71f725d17").unwrap()
        );
    }

    #[test]
    fn test_gmac_depends_on_data() {
        let cipher = GcmCipher::new(&KEY).unwrap();
        let a = cipher.gmac(&NONCE, &[0x10, 0x01]).unwrap();
        let b = cipher.gmac(&NONCE, &[0x10, 0x02]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(GcmCipher::new(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_security_control() {
        let ctrl = SecurityControl::new(0, true, true, false);
        assert_eq!(ctrl.to_byte(), 0x30);
        assert!(ctrl.is_authenticated());
        assert!(ctrl.is_encrypted());
        assert!(!ctrl.is_key_set());
        assert!(!ctrl.is_compressed());
        assert!(SecurityControl::from_byte(0x81).is_compressed());
        assert_eq!(SecurityControl::from_byte(0x31).security_suite_id(), 1);
    }
}
