//! Decryption of encrypted feature payloads.
//!
//! The endpoint serves encrypted payloads as `<base64 iv>.<base64 ciphertext>`, AES-CBC with
//! PKCS7 padding. The configured decryption key is base64 for a 128- or 256-bit AES key.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::DecryptionError;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const AES_BLOCK_SIZE: usize = 16;

/// Decrypt an `<iv>.<ciphertext>` payload into its UTF-8 plaintext.
pub(crate) fn decrypt_features(payload: &str, key: &str) -> Result<String, DecryptionError> {
    let key = BASE64
        .decode(key)
        .map_err(|_| DecryptionError::InvalidBase64)?;
    let (iv, ciphertext) = payload
        .split_once('.')
        .ok_or(DecryptionError::MalformedPayload)?;
    let iv = BASE64
        .decode(iv)
        .map_err(|_| DecryptionError::InvalidBase64)?;
    let ciphertext = BASE64
        .decode(ciphertext)
        .map_err(|_| DecryptionError::InvalidBase64)?;

    if iv.len() != AES_BLOCK_SIZE {
        return Err(DecryptionError::InvalidIv);
    }

    let plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(&key, &iv)
            .map_err(|_| DecryptionError::InvalidIv)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| DecryptionError::InvalidCiphertext)?,
        32 => Aes256CbcDec::new_from_slices(&key, &iv)
            .map_err(|_| DecryptionError::InvalidIv)?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| DecryptionError::InvalidCiphertext)?,
        n => return Err(DecryptionError::InvalidKeyLength(n)),
    };

    String::from_utf8(plaintext).map_err(|_| DecryptionError::InvalidUtf8)
}

/// Encrypt `plaintext` into the wire payload format. Test-only counterpart of
/// [`decrypt_features`].
#[cfg(test)]
pub(crate) fn encrypt_features(plaintext: &str, key: &str, iv: &[u8; 16]) -> String {
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    let key = BASE64.decode(key).unwrap();
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(&key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        32 => Aes256CbcEnc::new_from_slices(&key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes()),
        n => panic!("unsupported test key length {n}"),
    };

    format!("{}.{}", BASE64.encode(iv), BASE64.encode(ciphertext))
}
