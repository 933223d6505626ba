// title/crypto.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the common crypto functions required to handle Wii content encryption.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::cipher::block_padding::NoPadding;
use thiserror::Error;
use crate::title::ErrorClass;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("plaintext must be padded to a multiple of 16 bytes before encryption (was {0} bytes)")]
    UnalignedPlaintext(usize),
    #[error("AES-CBC operation failed on {0} bytes of data")]
    Cipher(usize),
}

impl CryptoError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CryptoError::UnalignedPlaintext(_) => ErrorClass::MalformedInput,
            CryptoError::Cipher(_) => ErrorClass::CryptoMismatch,
        }
    }
}

// Convert a Title ID into the format required for use as the Title Key decryption IV.
fn title_id_to_iv(title_id: [u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id);
    iv
}

// Convert a content index into the format required for use as the content IV.
fn content_index_to_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Decrypts a Title Key using the selected common key and the corresponding Title ID.
pub fn decrypt_title_key(title_key_enc: [u8; 16], common_key: [u8; 16], title_id: [u8; 8]) -> [u8; 16] {
    let iv = title_id_to_iv(title_id);
    let mut block = aes::Block::from(title_key_enc);
    Aes128CbcDec::new(&common_key.into(), &iv.into()).decrypt_block_mut(&mut block);
    let mut title_key = [0u8; 16];
    title_key.copy_from_slice(&block);
    title_key
}

/// Encrypts a Title Key using the selected common key and the corresponding Title ID.
pub fn encrypt_title_key(title_key_dec: [u8; 16], common_key: [u8; 16], title_id: [u8; 8]) -> [u8; 16] {
    let iv = title_id_to_iv(title_id);
    let mut block = aes::Block::from(title_key_dec);
    Aes128CbcEnc::new(&common_key.into(), &iv.into()).encrypt_block_mut(&mut block);
    let mut title_key = [0u8; 16];
    title_key.copy_from_slice(&block);
    title_key
}

/// Decrypt content using the corresponding Title Key and content index. Ciphertext that isn't a
/// multiple of 16 bytes long is zero-padded first, so the output may be longer than the input.
pub fn decrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Result<Vec<u8>, CryptoError> {
    let iv = content_index_to_iv(index);
    let mut buf = data.to_owned();
    buf.resize((buf.len() + 15) & !15, 0);
    let len = buf.len();
    Aes128CbcDec::new(&title_key.into(), &iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::Cipher(len))?;
    Ok(buf)
}

/// Encrypt content using the corresponding Title Key and content index. The content must already
/// be padded to a multiple of 16 bytes.
pub fn encrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Result<Vec<u8>, CryptoError> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::UnalignedPlaintext(data.len()));
    }
    let iv = content_index_to_iv(index);
    let mut buf = data.to_owned();
    let len = buf.len();
    Aes128CbcEnc::new(&title_key.into(), &iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .map_err(|_| CryptoError::Cipher(len))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TITLE_KEY: [u8; 16] = [0x47, 0x5a, 0x49, 0x73, 0x4c, 0x6f, 0x6e, 0x67, 0x4b, 0x65, 0x79, 0x21, 0x00, 0x01, 0x02, 0x03];
    const COMMON_KEY: [u8; 16] = [0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7];

    #[test]
    fn test_title_key_round_trip() {
        let title_id = [0x00, 0x01, 0x00, 0x01, 0x48, 0x41, 0x43, 0x41];
        let enc = encrypt_title_key(TITLE_KEY, COMMON_KEY, title_id);
        assert_ne!(enc, TITLE_KEY);
        assert_eq!(decrypt_title_key(enc, COMMON_KEY, title_id), TITLE_KEY);
        // The Title ID is the IV, so a different one gives a different key.
        assert_ne!(decrypt_title_key(enc, COMMON_KEY, [0; 8]), TITLE_KEY);
    }

    #[test]
    fn test_title_key_is_single_block_cbc() {
        // CBC over one block is ECB of (plaintext XOR IV).
        let title_id = [0x00, 0x01, 0x00, 0x01, 0x48, 0x41, 0x43, 0x41];
        let mut expected = TITLE_KEY;
        for (b, iv) in expected.iter_mut().zip(title_id.iter()) {
            *b ^= iv;
        }
        let via_content = encrypt_content(&expected, COMMON_KEY, 0).unwrap();
        assert_eq!(encrypt_title_key(TITLE_KEY, COMMON_KEY, title_id).to_vec(), via_content);
    }

    #[test]
    fn test_content_iv_depends_on_index() {
        let data = [0x11u8; 32];
        let a = encrypt_content(&data, TITLE_KEY, 0).unwrap();
        let b = encrypt_content(&data, TITLE_KEY, 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt_content(&a, TITLE_KEY, 0).unwrap(), data);
    }

    #[test]
    fn test_encrypt_unaligned() {
        assert!(matches!(encrypt_content(&[0u8; 17], TITLE_KEY, 0), Err(CryptoError::UnalignedPlaintext(17))));
    }

    #[test]
    fn test_decrypt_pads_unaligned() {
        let plain = [0x42u8; 32];
        let enc = encrypt_content(&plain, TITLE_KEY, 3).unwrap();
        // Dropping the tail of the last block still decrypts the whole first block.
        let dec = decrypt_content(&enc[..20], TITLE_KEY, 3).unwrap();
        assert_eq!(dec.len(), 32);
        assert_eq!(&dec[..16], &plain[..16]);
    }

    proptest! {
        #[test]
        fn prop_content_round_trip(blocks in proptest::collection::vec(any::<[u8; 16]>(), 0..16), key: [u8; 16], index: u16) {
            let plain: Vec<u8> = blocks.concat();
            let enc = encrypt_content(&plain, key, index).unwrap();
            prop_assert_eq!(enc.len(), plain.len());
            prop_assert_eq!(decrypt_content(&enc, key, index).unwrap(), plain);
        }
    }
}
