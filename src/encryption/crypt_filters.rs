use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest as _, Md5};
use rand::Rng as _;

use super::DecryptionError;
use super::rc4::Rc4;
use crate::ObjectId;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// A crypt filter method as named by the `/CFM` entry of a crypt filter dictionary.
pub trait CryptFilter: std::fmt::Debug + Send + Sync {
    fn method(&self) -> &[u8];
    fn compute_key(&self, key: &[u8], obj_id: ObjectId) -> Result<Vec<u8>, DecryptionError>;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError>;
}

#[derive(Clone, Copy, Debug)]
pub struct IdentityCryptFilter;

impl CryptFilter for IdentityCryptFilter {
    fn method(&self) -> &[u8] {
        b"None"
    }

    fn compute_key(&self, key: &[u8], _obj_id: ObjectId) -> Result<Vec<u8>, DecryptionError> {
        Ok(key.to_vec())
    }

    fn encrypt(&self, _key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(ciphertext.to_vec())
    }
}

/// Algorithm 1: the n-byte file key extended by the low-order 3 bytes of the object number and
/// the low-order 2 bytes of the generation, then hashed with MD5.
fn object_key(key: &[u8], obj_id: ObjectId, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(&obj_id.0.to_le_bytes()[..3]);
    hasher.update(obj_id.1.to_le_bytes());
    hasher.update(salt);

    let key_len = (key.len() + 5).min(16);
    hasher.finalize()[..key_len].to_vec()
}

#[derive(Clone, Copy, Debug)]
pub struct Rc4CryptFilter;

impl CryptFilter for Rc4CryptFilter {
    fn method(&self) -> &[u8] {
        b"V2"
    }

    fn compute_key(&self, key: &[u8], obj_id: ObjectId) -> Result<Vec<u8>, DecryptionError> {
        Ok(object_key(key, obj_id, b""))
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(Rc4::new(key).apply(plaintext))
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        Ok(Rc4::new(key).apply(ciphertext))
    }
}

fn random_iv() -> [u8; 16] {
    let mut iv = [0u8; 16];
    rand::rng().fill(&mut iv);
    iv
}

/// Output layout shared by AESV2 and AESV3: a random 16-byte IV followed by the CBC ciphertext
/// of the PKCS#7-padded plaintext.
fn padded_buffer(plaintext: &[u8]) -> (Vec<u8>, [u8; 16]) {
    let iv = random_iv();
    let padded_len = (plaintext.len() / 16 + 1) * 16;
    let mut buffer = Vec::with_capacity(16 + padded_len);
    buffer.extend_from_slice(&iv);
    buffer.extend_from_slice(plaintext);
    buffer.resize(16 + padded_len, 0);
    (buffer, iv)
}

fn split_iv(ciphertext: &[u8]) -> Result<Option<([u8; 16], Vec<u8>)>, DecryptionError> {
    if ciphertext.len() % 16 != 0 {
        return Err(DecryptionError::InvalidCipherTextLength);
    }
    // Nothing to decrypt if the ciphertext is empty or only holds the IV.
    if ciphertext.len() <= 16 {
        return Ok(None);
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&ciphertext[..16]);
    Ok(Some((iv, ciphertext[16..].to_vec())))
}

#[derive(Clone, Copy, Debug)]
pub struct Aes128CryptFilter;

impl CryptFilter for Aes128CryptFilter {
    fn method(&self) -> &[u8] {
        b"AESV2"
    }

    fn compute_key(&self, key: &[u8], obj_id: ObjectId) -> Result<Vec<u8>, DecryptionError> {
        Ok(object_key(key, obj_id, b"sAlT"))
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if key.len() != 16 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let (mut buffer, iv) = padded_buffer(plaintext);
        Aes128CbcEnc::new(key.into(), &iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buffer[16..], plaintext.len())
            .map_err(|_| DecryptionError::Padding)?;
        Ok(buffer)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if key.len() != 16 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let Some((iv, mut data)) = split_iv(ciphertext)? else {
            return Ok(vec![]);
        };
        let plaintext = Aes128CbcDec::new(key.into(), &iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut data)
            .map_err(|_| DecryptionError::Padding)?;
        Ok(plaintext.to_vec())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Aes256CryptFilter;

impl CryptFilter for Aes256CryptFilter {
    fn method(&self) -> &[u8] {
        b"AESV3"
    }

    fn compute_key(&self, key: &[u8], _obj_id: ObjectId) -> Result<Vec<u8>, DecryptionError> {
        // The 32-byte file key is used directly.
        Ok(key.to_vec())
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if key.len() != 32 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let (mut buffer, iv) = padded_buffer(plaintext);
        Aes256CbcEnc::new(key.into(), &iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buffer[16..], plaintext.len())
            .map_err(|_| DecryptionError::Padding)?;
        Ok(buffer)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if key.len() != 32 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let Some((iv, mut data)) = split_iv(ciphertext)? else {
            return Ok(vec![]);
        };
        let plaintext = Aes256CbcDec::new(key.into(), &iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut data)
            .map_err(|_| DecryptionError::Padding)?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_filters_round_trip() {
        let filter = Aes128CryptFilter;
        let key = filter.compute_key(&[7u8; 16], (12, 0)).unwrap();
        assert_eq!(key.len(), 16);
        for plaintext in [&b""[..], b"exactly sixteen!", b"BT (Hello) Tj ET"] {
            let ciphertext = filter.encrypt(&key, plaintext).unwrap();
            assert_eq!(ciphertext.len() % 16, 0);
            assert_eq!(filter.decrypt(&key, &ciphertext).unwrap(), plaintext);
        }

        let filter = Aes256CryptFilter;
        let key = [3u8; 32];
        let ciphertext = filter.encrypt(&key, b"payload").unwrap();
        assert_eq!(filter.decrypt(&key, &ciphertext).unwrap(), b"payload");
    }

    #[test]
    fn object_keys_depend_on_object_id() {
        let filter = Rc4CryptFilter;
        let file_key = [1u8, 2, 3, 4, 5];
        let a = filter.compute_key(&file_key, (1, 0)).unwrap();
        let b = filter.compute_key(&file_key, (2, 0)).unwrap();
        assert_eq!(a.len(), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn truncated_aes_ciphertext_is_rejected() {
        let filter = Aes128CryptFilter;
        assert!(matches!(
            filter.decrypt(&[0u8; 16], &[0u8; 20]),
            Err(DecryptionError::InvalidCipherTextLength)
        ));
    }
}
