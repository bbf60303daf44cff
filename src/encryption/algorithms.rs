use aes::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyInit as _, KeyIvInit as _};
use md5::{Digest as _, Md5};
use rand::Rng as _;
use sha2::{Sha256, Sha384, Sha512};

use super::rc4::Rc4;
use super::{DecryptionError, Permissions};
use crate::{Dictionary, Object};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256EcbEnc = ecb::Encryptor<aes::Aes256>;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256EcbDec = ecb::Decryptor<aes::Aes256>;

// Passwords shorter than 32 bytes are padded from the start of this string.
const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00,
    0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Password-related values of a standard security handler.
#[derive(Clone, Debug, Default)]
pub struct PasswordAlgorithm {
    pub(crate) encrypt_metadata: bool,
    /// Key length in bits.
    pub(crate) length: Option<usize>,
    pub(crate) version: i64,
    pub(crate) revision: i64,
    pub(crate) owner_value: Vec<u8>,
    pub(crate) owner_encrypted: Vec<u8>,
    pub(crate) user_value: Vec<u8>,
    pub(crate) user_encrypted: Vec<u8>,
    pub(crate) permissions: Permissions,
    pub(crate) permission_encrypted: Vec<u8>,
    /// First element of the trailer `/ID` array.
    pub(crate) file_id: Vec<u8>,
}

fn string_entry(dict: &Dictionary, key: &[u8]) -> Option<Vec<u8>> {
    dict.get(key).and_then(Object::as_str).ok().map(<[u8]>::to_vec)
}

impl PasswordAlgorithm {
    /// Read the handler parameters from an `/Encrypt` dictionary.
    pub fn from_dictionary(encrypted: &Dictionary, file_id: &[u8]) -> Result<Self, DecryptionError> {
        let encrypt_metadata = match encrypted.get(b"EncryptMetadata") {
            Ok(value) => value.as_bool().map_err(|_| DecryptionError::InvalidType)?,
            Err(_) => true,
        };

        let length = match encrypted.get(b"Length") {
            Ok(value) => {
                let bits = value.as_i64().map_err(|_| DecryptionError::InvalidType)?;
                Some(usize::try_from(bits).map_err(|_| DecryptionError::InvalidKeyLength)?)
            }
            Err(_) => None,
        };

        let version = encrypted
            .get(b"V")
            .and_then(Object::as_i64)
            .unwrap_or(0);

        match version {
            1 | 2 | 4 | 5 => {}
            _ => return Err(DecryptionError::UnsupportedEncryption),
        }

        if let Some(length) = length {
            let valid = match version {
                // Optional for V1 but some writers emit the default.
                1 => length == 40,
                2 => length % 8 == 0 && (40..=128).contains(&length),
                4 => length == 128,
                _ => length == 256,
            };
            if !valid {
                return Err(DecryptionError::InvalidKeyLength);
            }
        }

        let revision = encrypted
            .get(b"R")
            .map_err(|_| DecryptionError::MissingRevision)?
            .as_i64()
            .map_err(|_| DecryptionError::InvalidType)?;
        if !(2..=6).contains(&revision) {
            return Err(DecryptionError::UnsupportedRevision);
        }

        let hash_len = if revision <= 4 { 32 } else { 48 };

        let owner_value = string_entry(encrypted, b"O").ok_or(DecryptionError::MissingOwnerPassword)?;
        let user_value = string_entry(encrypted, b"U").ok_or(DecryptionError::MissingUserPassword)?;
        // Some writers pad O and U with trailing zeros; only the prefix matters.
        if owner_value.len() < hash_len || user_value.len() < hash_len {
            return Err(DecryptionError::InvalidHashLength);
        }

        let owner_encrypted = string_entry(encrypted, b"OE").unwrap_or_default();
        let user_encrypted = string_entry(encrypted, b"UE").unwrap_or_default();
        let permission_encrypted = string_entry(encrypted, b"Perms").unwrap_or_default();
        if revision >= 5
            && (owner_encrypted.len() != 32 || user_encrypted.len() != 32 || permission_encrypted.len() != 16)
        {
            return Err(DecryptionError::InvalidCipherTextLength);
        }

        let permission_value = encrypted
            .get(b"P")
            .map_err(|_| DecryptionError::MissingPermissions)?
            .as_i64()
            .map_err(|_| DecryptionError::InvalidType)?;
        // P is a signed 32-bit field; the upper half of the 64-bit value is all ones.
        let permissions = Permissions::from_bits_retain(u64::from(permission_value as u32) | (0xffff_ffff << 32));

        Ok(Self {
            encrypt_metadata,
            length,
            version,
            revision,
            owner_value: owner_value[..hash_len].to_vec(),
            owner_encrypted,
            user_value: user_value[..hash_len].to_vec(),
            user_encrypted,
            permissions,
            permission_encrypted,
            file_id: file_id.to_vec(),
        })
    }

    /// Key length in bytes for revisions 2 to 4.
    fn key_length_r4(&self) -> Result<usize, DecryptionError> {
        let n = if self.revision >= 3 { self.length.unwrap_or(40) / 8 } else { 5 };
        // MD5 limits the key to 16 bytes.
        if !(5..=16).contains(&n) {
            return Err(DecryptionError::InvalidKeyLength);
        }
        Ok(n)
    }

    /// Revision 4 and earlier passwords are Latin-1 text; other characters cannot be typed.
    pub(crate) fn sanitize_password_r4(&self, password: &str) -> Vec<u8> {
        password
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect()
    }

    /// Algorithm 2: derive the file key from a user password (revision 4 and earlier).
    pub(crate) fn compute_file_encryption_key_r4<P>(&self, password: P) -> Result<Vec<u8>, DecryptionError>
    where
        P: AsRef<[u8]>,
    {
        let password = password.as_ref();
        let len = password.len().min(32);

        let mut hasher = Md5::new();
        hasher.update(&password[..len]);
        hasher.update(&PAD_BYTES[..32 - len]);
        hasher.update(&self.owner_value);
        // P as a 32-bit unsigned value, low-order byte first.
        hasher.update((self.permissions.bits() as u32).to_le_bytes());
        hasher.update(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            hasher.update(b"\xff\xff\xff\xff");
        }
        let mut hash = hasher.finalize();

        let n = self.key_length_r4()?;
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(&hash[..n]);
            }
        }

        Ok(hash[..n].to_vec())
    }

    /// RC4 key derived from the owner password, used by algorithms 3 and 7.
    fn owner_key_r4(&self, owner_password: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let len = owner_password.len().min(32);

        let mut hasher = Md5::new();
        hasher.update(&owner_password[..len]);
        hasher.update(&PAD_BYTES[..32 - len]);
        let mut hash = hasher.finalize();

        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(hash);
            }
        }

        let n = self.key_length_r4()?;
        Ok(hash[..n].to_vec())
    }

    /// Algorithm 3: the `/O` value (revision 4 and earlier). Without an owner password the user
    /// password is used.
    pub(crate) fn compute_hashed_owner_password_r4<O, U>(
        &self,
        owner_password: Option<O>,
        user_password: U,
    ) -> Result<Vec<u8>, DecryptionError>
    where
        O: AsRef<[u8]>,
        U: AsRef<[u8]>,
    {
        let user_password = user_password.as_ref();
        let owner_password = owner_password.as_ref().map(|p| p.as_ref()).unwrap_or(user_password);
        let key = self.owner_key_r4(owner_password)?;

        let len = user_password.len().min(32);
        let mut padded = [0u8; 32];
        padded[..len].copy_from_slice(&user_password[..len]);
        padded[len..].copy_from_slice(&PAD_BYTES[..32 - len]);

        let mut result = Rc4::new(&key).apply(padded);
        if self.revision >= 3 {
            let mut round_key = vec![0u8; key.len()];
            for i in 1..=19 {
                for (out_byte, in_byte) in round_key.iter_mut().zip(&key) {
                    *out_byte = in_byte ^ i;
                }
                result = Rc4::new(&round_key).apply(&result);
            }
        }
        Ok(result)
    }

    /// Algorithm 4: the `/U` value for revision 2.
    pub(crate) fn compute_hashed_user_password_r2<U>(&self, user_password: U) -> Result<Vec<u8>, DecryptionError>
    where
        U: AsRef<[u8]>,
    {
        let file_encryption_key = self.compute_file_encryption_key_r4(user_password)?;
        Ok(Rc4::new(&file_encryption_key).apply(PAD_BYTES))
    }

    /// Algorithm 5: the `/U` value for revisions 3 and 4. Only the first 16 bytes are
    /// significant; the rest is random padding.
    pub(crate) fn compute_hashed_user_password_r3_r4<U>(&self, user_password: U) -> Result<Vec<u8>, DecryptionError>
    where
        U: AsRef<[u8]>,
    {
        let file_encryption_key = self.compute_file_encryption_key_r4(user_password)?;

        let mut hasher = Md5::new();
        hasher.update(PAD_BYTES);
        hasher.update(&self.file_id);
        let hash = hasher.finalize();

        let mut result = Rc4::new(&file_encryption_key).apply(hash);
        let mut round_key = vec![0u8; file_encryption_key.len()];
        for i in 1..=19 {
            for (out_byte, in_byte) in round_key.iter_mut().zip(&file_encryption_key) {
                *out_byte = in_byte ^ i;
            }
            result = Rc4::new(&round_key).apply(&result);
        }

        result.resize(32, 0);
        rand::rng().fill(&mut result[16..]);
        Ok(result)
    }

    /// Algorithm 6: check a user password (revision 4 and earlier).
    fn authenticate_user_password_r4<U>(&self, user_password: U) -> Result<(), DecryptionError>
    where
        U: AsRef<[u8]>,
    {
        let (hashed, len) = match self.revision {
            2 => (self.compute_hashed_user_password_r2(user_password)?, 32),
            3 | 4 => (self.compute_hashed_user_password_r3_r4(user_password)?, 16),
            _ => return Err(DecryptionError::InvalidRevision),
        };
        if hashed[..len] != self.user_value[..len] {
            return Err(DecryptionError::IncorrectPassword);
        }
        Ok(())
    }

    /// Algorithm 7, first part: decrypt `/O` with the owner password, yielding what purports
    /// to be the padded user password.
    fn recover_user_password_r4(&self, owner_password: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let key = self.owner_key_r4(owner_password)?;
        let mut result = self.owner_value.clone();

        if self.revision >= 3 {
            let mut round_key = vec![0u8; key.len()];
            for i in (1..=19).rev() {
                for (out_byte, in_byte) in round_key.iter_mut().zip(&key) {
                    *out_byte = in_byte ^ i;
                }
                result = Rc4::new(&round_key).apply(&result);
            }
        }
        Ok(Rc4::new(&key).apply(&result))
    }

    /// Algorithm 7: check an owner password (revision 4 and earlier). Returns the recovered
    /// user password, from which the file key is derived.
    fn authenticate_owner_password_r4(&self, owner_password: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let user_password = self.recover_user_password_r4(owner_password)?;
        self.authenticate_user_password_r4(&user_password)?;
        Ok(user_password)
    }

    /// Revision 6 passwords are SASLprep-processed UTF-8, at most 127 bytes.
    pub(crate) fn sanitize_password_r6(&self, password: &str) -> Result<Vec<u8>, DecryptionError> {
        let mut bytes = stringprep::saslprep(password)?.as_bytes().to_vec();
        bytes.truncate(127);
        Ok(bytes)
    }

    fn aes256_cbc_no_iv(key: &[u8], data: &[u8], encrypt: bool) -> Vec<u8> {
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&key[..32]);
        let iv = [0u8; 16];
        let mut output = data.to_vec();
        if encrypt {
            let mut encryptor = Aes256CbcEnc::new(&key_bytes.into(), &iv.into());
            for block in output.chunks_exact_mut(16) {
                encryptor.encrypt_block_mut(block.into());
            }
        } else {
            let mut decryptor = Aes256CbcDec::new(&key_bytes.into(), &iv.into());
            for block in output.chunks_exact_mut(16) {
                decryptor.decrypt_block_mut(block.into());
            }
        }
        output
    }

    /// Algorithm 2.A: derive the file key from either password (revisions 5 and 6).
    fn compute_file_encryption_key_r6(&self, password: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let owner_validation_salt = &self.owner_value[32..40];
        let owner_key_salt = &self.owner_value[40..48];
        let user_validation_salt = &self.user_value[32..40];
        let user_key_salt = &self.user_value[40..48];

        if self.compute_hash(password, owner_validation_salt, Some(&self.user_value))? == self.owner_value[..32] {
            let key = self.compute_hash(password, owner_key_salt, Some(&self.user_value))?;
            return Ok(Self::aes256_cbc_no_iv(&key, &self.owner_encrypted, false));
        }

        if self.compute_hash(password, user_validation_salt, None)? == self.user_value[..32] {
            let key = self.compute_hash(password, user_key_salt, None)?;
            let file_encryption_key = Self::aes256_cbc_no_iv(&key, &self.user_encrypted, false);
            self.validate_permissions(&file_encryption_key)?;
            return Ok(file_encryption_key);
        }

        Err(DecryptionError::IncorrectPassword)
    }

    /// Algorithm 2.B: the iterated hash of revision 6. Revision 5 uses plain SHA-256.
    fn compute_hash(&self, password: &[u8], salt: &[u8], user_key: Option<&[u8]>) -> Result<Vec<u8>, DecryptionError> {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        if let Some(user_key) = user_key {
            hasher.update(user_key);
        }
        let mut k = hasher.finalize().to_vec();

        if self.revision == 5 {
            return Ok(k);
        }

        let user_key = user_key.unwrap_or_default();
        let mut k1 = Vec::with_capacity(64 * (password.len() + 64 + user_key.len()));

        for round in 1_u32.. {
            k1.clear();
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                k1.extend_from_slice(user_key);
            }

            // K1 is 64 repetitions, so it is a whole number of AES blocks.
            let mut encryptor = Aes128CbcEnc::new(k[..16].into(), k[16..32].into());
            for block in k1.chunks_exact_mut(16) {
                encryptor.encrypt_block_mut(block.into());
            }
            let e = &k1;

            // The first 16 bytes of E as a big-endian integer modulo 3. Since 256 is 1 modulo 3
            // that equals the byte sum modulo 3.
            k = match e[..16].iter().map(|v| u32::from(*v)).sum::<u32>() % 3 {
                0 => Sha256::digest(e).to_vec(),
                1 => Sha384::digest(e).to_vec(),
                _ => Sha512::digest(e).to_vec(),
            };

            if round >= 64 && u32::from(e.last().copied().unwrap_or(0)) <= round - 32 {
                break;
            }
        }

        k.truncate(32);
        Ok(k)
    }

    /// Algorithm 8: the `/U` and `/UE` values (revision 6).
    pub(crate) fn compute_hashed_user_password_r6(
        &self,
        file_encryption_key: &[u8],
        user_password: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), DecryptionError> {
        let mut user_value = [0u8; 48];
        rand::rng().fill(&mut user_value[32..]);

        let hashed = self.compute_hash(user_password, &user_value[32..40], None)?;
        user_value[..32].copy_from_slice(&hashed);

        let key = self.compute_hash(user_password, &user_value[40..48], None)?;
        let user_encrypted = Self::aes256_cbc_no_iv(&key, file_encryption_key, true);

        Ok((user_value.to_vec(), user_encrypted))
    }

    /// Algorithm 9: the `/O` and `/OE` values (revision 6). Requires `user_value` to be set.
    pub(crate) fn compute_hashed_owner_password_r6(
        &self,
        file_encryption_key: &[u8],
        owner_password: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), DecryptionError> {
        let mut owner_value = [0u8; 48];
        rand::rng().fill(&mut owner_value[32..]);

        let hashed = self.compute_hash(owner_password, &owner_value[32..40], Some(&self.user_value))?;
        owner_value[..32].copy_from_slice(&hashed);

        let key = self.compute_hash(owner_password, &owner_value[40..48], Some(&self.user_value))?;
        let owner_encrypted = Self::aes256_cbc_no_iv(&key, file_encryption_key, true);

        Ok((owner_value.to_vec(), owner_encrypted))
    }

    /// Algorithm 10: the `/Perms` value (revision 6).
    pub(crate) fn compute_permissions(&self, file_encryption_key: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if file_encryption_key.len() != 32 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.permissions.bits().to_le_bytes());
        bytes[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        bytes[9..12].copy_from_slice(b"adb");
        rand::rng().fill(&mut bytes[12..]);

        let mut encryptor = Aes256EcbEnc::new(file_encryption_key.into());
        for block in bytes.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(block.into());
        }
        Ok(bytes.to_vec())
    }

    /// Algorithm 13: check `/Perms` against `/P` and `/EncryptMetadata`.
    fn validate_permissions(&self, file_encryption_key: &[u8]) -> Result<(), DecryptionError> {
        if file_encryption_key.len() != 32 || self.permission_encrypted.len() != 16 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.permission_encrypted);

        let mut decryptor = Aes256EcbDec::new(file_encryption_key.into());
        for block in bytes.chunks_exact_mut(16) {
            decryptor.decrypt_block_mut(block.into());
        }

        if &bytes[9..12] != b"adb" {
            return Err(DecryptionError::IncorrectPassword);
        }
        if bytes[..4] != self.permissions.bits().to_le_bytes()[..4] {
            return Err(DecryptionError::IncorrectPassword);
        }
        if bytes[8] != if self.encrypt_metadata { b'T' } else { b'F' } {
            return Err(DecryptionError::IncorrectPassword);
        }
        Ok(())
    }

    /// Authenticate `password` as the user password, then as the owner password, and derive
    /// the file encryption key.
    pub fn file_encryption_key(&self, password: &str) -> Result<Vec<u8>, DecryptionError> {
        match self.revision {
            2..=4 => {
                let password = self.sanitize_password_r4(password);
                match self.authenticate_user_password_r4(&password) {
                    Ok(()) => self.compute_file_encryption_key_r4(&password),
                    Err(DecryptionError::IncorrectPassword) => {
                        let user_password = self.authenticate_owner_password_r4(&password)?;
                        self.compute_file_encryption_key_r4(user_password)
                    }
                    Err(err) => Err(err),
                }
            }
            5 | 6 => {
                let password = self.sanitize_password_r6(password)?;
                self.compute_file_encryption_key_r6(&password)
            }
            _ => Err(DecryptionError::UnsupportedRevision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r4_algorithm(revision: i64, length: Option<usize>) -> PasswordAlgorithm {
        PasswordAlgorithm {
            encrypt_metadata: true,
            length,
            version: if revision == 2 { 1 } else { 2 },
            revision,
            permissions: Permissions::all(),
            file_id: b"0123456789abcdef".to_vec(),
            ..Default::default()
        }
    }

    fn fill_r4(algorithm: &mut PasswordAlgorithm, owner: &str, user: &str) {
        let owner = algorithm.sanitize_password_r4(owner);
        let user = algorithm.sanitize_password_r4(user);
        algorithm.owner_value = algorithm.compute_hashed_owner_password_r4(Some(&owner), &user).unwrap();
        algorithm.user_value = match algorithm.revision {
            2 => algorithm.compute_hashed_user_password_r2(&user).unwrap(),
            _ => algorithm.compute_hashed_user_password_r3_r4(&user).unwrap(),
        };
    }

    #[test]
    fn authenticate_password_r2_r3() {
        for (revision, length) in [(2, None), (3, Some(128))] {
            let mut algorithm = r4_algorithm(revision, length);
            fill_r4(&mut algorithm, "owner", "user");

            let user_key = algorithm.file_encryption_key("user").unwrap();
            let owner_key = algorithm.file_encryption_key("owner").unwrap();
            assert_eq!(user_key, owner_key);
            assert_eq!(user_key.len(), length.unwrap_or(40) / 8);

            assert!(matches!(
                algorithm.file_encryption_key("wrong"),
                Err(DecryptionError::IncorrectPassword)
            ));
        }
    }

    #[test]
    fn empty_user_password_opens_without_password() {
        let mut algorithm = r4_algorithm(3, Some(128));
        fill_r4(&mut algorithm, "owner", "");
        assert!(algorithm.file_encryption_key("").is_ok());
    }

    #[test]
    fn authenticate_password_r6() {
        let mut algorithm = PasswordAlgorithm {
            encrypt_metadata: true,
            version: 5,
            revision: 6,
            permissions: Permissions::all(),
            ..Default::default()
        };

        let owner_password = algorithm.sanitize_password_r6("owner").unwrap();
        let user_password = algorithm.sanitize_password_r6("user").unwrap();

        let mut file_encryption_key = [0u8; 32];
        rand::rng().fill(&mut file_encryption_key);

        let (user_value, user_encrypted) =
            algorithm.compute_hashed_user_password_r6(&file_encryption_key, &user_password).unwrap();
        algorithm.user_value = user_value;
        algorithm.user_encrypted = user_encrypted;

        let (owner_value, owner_encrypted) =
            algorithm.compute_hashed_owner_password_r6(&file_encryption_key, &owner_password).unwrap();
        algorithm.owner_value = owner_value;
        algorithm.owner_encrypted = owner_encrypted;
        algorithm.permission_encrypted = algorithm.compute_permissions(&file_encryption_key).unwrap();

        assert_eq!(algorithm.file_encryption_key("owner").unwrap(), file_encryption_key);
        assert_eq!(algorithm.file_encryption_key("user").unwrap(), file_encryption_key);
        assert!(algorithm.file_encryption_key("").is_err());
    }
}
