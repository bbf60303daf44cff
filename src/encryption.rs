mod algorithms;
pub mod crypt_filters;
mod rc4;

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use log::warn;
use rand::Rng as _;
use thiserror::Error;

use crate::{Dictionary, Object, ObjectId, StringFormat, dictionary};
use crypt_filters::*;

pub use algorithms::PasswordAlgorithm;

#[derive(Error, Debug)]
pub enum DecryptionError {
    #[error("the /Encrypt dictionary is missing")]
    MissingEncryptDictionary,
    #[error("missing encryption revision")]
    MissingRevision,
    #[error("missing the owner password (/O)")]
    MissingOwnerPassword,
    #[error("missing the user password (/U)")]
    MissingUserPassword,
    #[error("missing the permissions field (/P)")]
    MissingPermissions,

    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid hash length")]
    InvalidHashLength,
    #[error("invalid ciphertext length")]
    InvalidCipherTextLength,
    #[error("invalid revision")]
    InvalidRevision,
    #[error("unexpected type in the encryption dictionary")]
    InvalidType,
    #[error("invalid padding")]
    Padding,

    #[error("the supplied password is incorrect")]
    IncorrectPassword,

    #[error("the document uses an encryption scheme that is not implemented")]
    UnsupportedEncryption,
    #[error("the encryption revision is not implemented")]
    UnsupportedRevision,

    #[error(transparent)]
    StringPrep(#[from] stringprep::Error),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct Permissions: u64 {
        /// Print the document (possibly in degraded quality without
        /// [`Permissions::PRINTABLE_IN_HIGH_QUALITY`]).
        const PRINTABLE = 1 << 2;
        /// Modify the contents by operations other than annotating, filling and assembling.
        const MODIFIABLE = 1 << 3;
        /// Copy or otherwise extract text and graphics.
        const COPYABLE = 1 << 4;
        /// Add or modify annotations and fill in form fields.
        const ANNOTABLE = 1 << 5;
        /// Fill in existing form fields even if [`Permissions::ANNOTABLE`] is clear.
        const FILLABLE = 1 << 8;
        /// Extract text and graphics for accessibility. Always set since PDF 2.0.
        const COPYABLE_FOR_ACCESSIBILITY = 1 << 9;
        /// Insert, rotate or delete pages and create outline items or thumbnails.
        const ASSEMBLABLE = 1 << 10;
        /// Print at the highest quality.
        const PRINTABLE_IN_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// Permission bits with the reserved bits set as the standard requires, extended to 64 bits.
    /// Bit positions count from 1 at the low-order end, so bit 3 (print) is `1 << 2`.
    pub fn p_value(&self) -> u64 {
        self.bits()
            // 7-8: reserved, must be 1.
            | (0b11 << 6)
            // 13-32: reserved, must be 1.
            | (0xfffff << 12)
            | (0xffff_ffff << 32)
    }

    /// The `/P` integer as written in the encryption dictionary.
    pub fn p_integer(&self) -> i64 {
        i64::from(self.p_value() as u32 as i32)
    }
}

/// Everything needed to decrypt or encrypt the strings and streams of a document.
#[derive(Clone, Debug)]
pub struct EncryptionState {
    pub crypt_filters: BTreeMap<Vec<u8>, Arc<dyn CryptFilter>>,
    pub file_encryption_key: Vec<u8>,
    pub stream_filter: Option<Vec<u8>>,
    pub string_filter: Option<Vec<u8>>,
    pub version: i64,
    pub encrypt_metadata: bool,
    pub permissions: Permissions,
}

fn crypt_filter_for_method(method: &[u8]) -> Option<Arc<dyn CryptFilter>> {
    match method {
        b"None" => Some(Arc::new(IdentityCryptFilter)),
        b"V2" => Some(Arc::new(Rc4CryptFilter)),
        b"AESV2" => Some(Arc::new(Aes128CryptFilter)),
        b"AESV3" => Some(Arc::new(Aes256CryptFilter)),
        _ => None,
    }
}

fn crypt_filters(encrypted: &Dictionary) -> BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> {
    let mut filters: BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> = BTreeMap::new();
    if let Ok(cf) = encrypted.get(b"CF").and_then(Object::as_dict) {
        for (name, filter) in cf {
            let method = filter
                .as_dict()
                .and_then(|dict| dict.get(b"CFM"))
                .and_then(Object::as_name)
                .unwrap_or(b"None");
            match crypt_filter_for_method(method) {
                Some(filter) => {
                    filters.insert(name.clone(), filter);
                }
                None => warn!(
                    "ignoring crypt filter {} with unknown method {}",
                    String::from_utf8_lossy(name),
                    String::from_utf8_lossy(method)
                ),
            }
        }
    }
    filters.insert(b"Identity".to_vec(), Arc::new(IdentityCryptFilter));
    filters
}

impl EncryptionState {
    /// Authenticate `password` against the `/Encrypt` dictionary and derive the decryption state.
    pub fn decode(encrypted: &Dictionary, file_id: &[u8], password: &str) -> crate::Result<Self> {
        let filter = encrypted
            .get(b"Filter")
            .and_then(Object::as_name)
            .map_err(|_| crate::Error::DictKey("Filter".to_string()))?;
        if filter != b"Standard" {
            return Err(crate::Error::UnsupportedSecurityHandler(filter.to_vec()));
        }

        let algorithm = PasswordAlgorithm::from_dictionary(encrypted, file_id)?;
        let file_encryption_key = algorithm.file_encryption_key(password)?;

        let name = |key: &[u8]| {
            encrypted
                .get(key)
                .and_then(Object::as_name)
                .ok()
                .map(<[u8]>::to_vec)
        };

        Ok(Self {
            crypt_filters: crypt_filters(encrypted),
            file_encryption_key,
            stream_filter: name(b"StmF"),
            string_filter: name(b"StrF"),
            version: algorithm.version,
            encrypt_metadata: algorithm.encrypt_metadata,
            permissions: algorithm.permissions,
        })
    }

    fn default_filter(&self, name: &Option<Vec<u8>>) -> Arc<dyn CryptFilter> {
        if self.version < 4 {
            return Arc::new(Rc4CryptFilter);
        }
        // With crypt filters, an absent StmF or StrF means Identity.
        name.as_ref()
            .and_then(|name| self.crypt_filters.get(name).cloned())
            .unwrap_or_else(|| Arc::new(IdentityCryptFilter))
    }

    pub fn get_stream_filter(&self) -> Arc<dyn CryptFilter> {
        self.default_filter(&self.stream_filter)
    }

    pub fn get_string_filter(&self) -> Arc<dyn CryptFilter> {
        self.default_filter(&self.string_filter)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Decrypts every string and stream inside `obj`.
pub fn decrypt_object(state: &EncryptionState, obj_id: ObjectId, obj: &mut Object) -> Result<(), DecryptionError> {
    transform_object(state, obj_id, obj, Direction::Decrypt)
}

/// Encrypts every string and stream inside `obj`.
pub fn encrypt_object(state: &EncryptionState, obj_id: ObjectId, obj: &mut Object) -> Result<(), DecryptionError> {
    transform_object(state, obj_id, obj, Direction::Encrypt)
}

fn transform_object(
    state: &EncryptionState, obj_id: ObjectId, obj: &mut Object, direction: Direction,
) -> Result<(), DecryptionError> {
    let crypt_filter = match obj {
        Object::Array(objects) => {
            for obj in objects {
                transform_object(state, obj_id, obj, direction)?;
            }
            return Ok(());
        }
        Object::Dictionary(dict) => {
            for (_, obj) in dict.iter_mut() {
                transform_object(state, obj_id, obj, direction)?;
            }
            return Ok(());
        }
        Object::String(..) => state.get_string_filter(),
        Object::Stream(stream) => {
            // Cross-reference streams are never encrypted, nor are strings in their dictionary.
            if stream.dict.has_type(b"XRef") {
                return Ok(());
            }
            if !state.encrypt_metadata && stream.dict.has_type(b"Metadata") {
                return Ok(());
            }
            for (_, value) in stream.dict.iter_mut() {
                transform_object(state, obj_id, value, direction)?;
            }
            stream_crypt_filter(state, stream).unwrap_or_else(|| state.get_stream_filter())
        }
        _ => return Ok(()),
    };

    let key = crypt_filter.compute_key(&state.file_encryption_key, obj_id)?;
    match obj {
        Object::String(content, _) => {
            *content = match direction {
                Direction::Encrypt => crypt_filter.encrypt(&key, content)?,
                Direction::Decrypt => crypt_filter.decrypt(&key, content)?,
            };
        }
        Object::Stream(stream) => {
            let content = match direction {
                Direction::Encrypt => crypt_filter.encrypt(&key, &stream.content)?,
                Direction::Decrypt => crypt_filter.decrypt(&key, &stream.content)?,
            };
            stream.set_content(content);
        }
        _ => {}
    }
    Ok(())
}

/// A stream may name its own crypt filter through a `/Crypt` entry in its filter chain.
fn stream_crypt_filter(state: &EncryptionState, stream: &crate::Stream) -> Option<Arc<dyn CryptFilter>> {
    let filters = stream.filters().ok()?;
    let position = filters.iter().position(|name| *name == b"Crypt")?;
    let name = stream
        .decode_params()
        .get(position)
        .copied()
        .flatten()
        .and_then(|params| params.get(b"Name").and_then(Object::as_name).ok())
        .unwrap_or(b"Identity");
    Some(
        state
            .crypt_filters
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(IdentityCryptFilter)),
    )
}

/// Algorithm used when a cleaned document is encrypted again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncryptionAlgorithm {
    /// RC4 with a 128-bit key (V2, R3).
    #[cfg_attr(feature = "serde", serde(rename = "rc4-128"))]
    Rc4_128,
    /// AES-128 through the `AESV2` crypt filter (V4, R4).
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "aes-128"))]
    Aes128,
    /// AES-256 through the `AESV3` crypt filter (V5, R6).
    #[cfg_attr(feature = "serde", serde(rename = "aes-256"))]
    Aes256,
}

impl EncryptionAlgorithm {
    /// The lowest PDF version that can express this algorithm.
    pub fn min_version(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Rc4_128 => "1.4",
            EncryptionAlgorithm::Aes128 => "1.6",
            EncryptionAlgorithm::Aes256 => "1.7",
        }
    }
}

/// Parameters for re-encrypting the output document.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncryptionSpec {
    pub user_password: String,
    /// Defaults to the user password.
    pub owner_password: Option<String>,
    pub permissions: Permissions,
    pub algorithm: EncryptionAlgorithm,
}

impl EncryptionSpec {
    pub fn new<S: Into<String>>(user_password: S, algorithm: EncryptionAlgorithm) -> Self {
        EncryptionSpec {
            user_password: user_password.into(),
            owner_password: None,
            permissions: Permissions::all(),
            algorithm,
        }
    }

    pub fn with_owner_password<S: Into<String>>(mut self, owner_password: S) -> Self {
        self.owner_password = Some(owner_password.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    fn owner_password(&self) -> &str {
        self.owner_password.as_deref().unwrap_or(&self.user_password)
    }

    /// Build the `/Encrypt` dictionary and the matching encryption state for a document whose
    /// first `/ID` element is `file_id`.
    pub fn build(&self, file_id: &[u8]) -> crate::Result<(Dictionary, EncryptionState)> {
        let mut algorithm = PasswordAlgorithm {
            encrypt_metadata: true,
            permissions: Permissions::from_bits_retain(self.permissions.p_value()),
            file_id: file_id.to_vec(),
            ..Default::default()
        };

        let (mut dict, crypt_filter, file_encryption_key) = match self.algorithm {
            EncryptionAlgorithm::Rc4_128 | EncryptionAlgorithm::Aes128 => {
                let aes = self.algorithm == EncryptionAlgorithm::Aes128;
                algorithm.version = if aes { 4 } else { 2 };
                algorithm.revision = if aes { 4 } else { 3 };
                algorithm.length = Some(128);

                let user = algorithm.sanitize_password_r4(&self.user_password);
                let owner = algorithm.sanitize_password_r4(self.owner_password());
                algorithm.owner_value = algorithm.compute_hashed_owner_password_r4(Some(&owner), &user)?;
                algorithm.user_value = algorithm.compute_hashed_user_password_r3_r4(&user)?;
                let key = algorithm.compute_file_encryption_key_r4(&user)?;

                let dict = dictionary! {
                    "Filter" => "Standard",
                    "V" => algorithm.version,
                    "R" => algorithm.revision,
                    "Length" => 128,
                    "O" => Object::String(algorithm.owner_value.clone(), StringFormat::Hexadecimal),
                    "U" => Object::String(algorithm.user_value.clone(), StringFormat::Hexadecimal),
                    "P" => self.permissions.p_integer(),
                };
                let filter: Arc<dyn CryptFilter> = if aes {
                    Arc::new(Aes128CryptFilter)
                } else {
                    Arc::new(Rc4CryptFilter)
                };
                (dict, filter, key)
            }
            EncryptionAlgorithm::Aes256 => {
                algorithm.version = 5;
                algorithm.revision = 6;
                algorithm.length = Some(256);

                let mut key = vec![0u8; 32];
                rand::rng().fill(&mut key[..]);

                let user = algorithm.sanitize_password_r6(&self.user_password)?;
                let owner = algorithm.sanitize_password_r6(self.owner_password())?;
                let (user_value, user_encrypted) = algorithm.compute_hashed_user_password_r6(&key, &user)?;
                algorithm.user_value = user_value;
                algorithm.user_encrypted = user_encrypted;
                let (owner_value, owner_encrypted) = algorithm.compute_hashed_owner_password_r6(&key, &owner)?;
                algorithm.owner_value = owner_value;
                algorithm.owner_encrypted = owner_encrypted;
                algorithm.permission_encrypted = algorithm.compute_permissions(&key)?;

                let hex = |bytes: &[u8]| Object::String(bytes.to_vec(), StringFormat::Hexadecimal);
                let dict = dictionary! {
                    "Filter" => "Standard",
                    "V" => 5,
                    "R" => 6,
                    "Length" => 256,
                    "O" => hex(&algorithm.owner_value),
                    "U" => hex(&algorithm.user_value),
                    "OE" => hex(&algorithm.owner_encrypted),
                    "UE" => hex(&algorithm.user_encrypted),
                    "Perms" => hex(&algorithm.permission_encrypted),
                    "P" => self.permissions.p_integer(),
                };
                (dict, Arc::new(Aes256CryptFilter) as Arc<dyn CryptFilter>, key)
            }
        };

        let mut filters: BTreeMap<Vec<u8>, Arc<dyn CryptFilter>> = BTreeMap::new();
        filters.insert(b"Identity".to_vec(), Arc::new(IdentityCryptFilter));
        let mut stream_filter = None;
        if algorithm.version >= 4 {
            let key_bytes = file_encryption_key.len() as i64;
            dict.set(
                "CF",
                dictionary! {
                    "StdCF" => dictionary! {
                        "Type" => "CryptFilter",
                        "CFM" => Object::Name(crypt_filter.method().to_vec()),
                        "AuthEvent" => "DocOpen",
                        "Length" => key_bytes,
                    },
                },
            );
            dict.set("StmF", "StdCF");
            dict.set("StrF", "StdCF");
            filters.insert(b"StdCF".to_vec(), crypt_filter);
            stream_filter = Some(b"StdCF".to_vec());
        }

        let state = EncryptionState {
            crypt_filters: filters,
            file_encryption_key,
            string_filter: stream_filter.clone(),
            stream_filter,
            version: algorithm.version,
            encrypt_metadata: true,
            permissions: self.permissions,
        };
        Ok((dict, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stream;

    const FILE_ID: &[u8] = b"\x01\x23\x45\x67\x89\xab\xcd\xef\x01\x23\x45\x67\x89\xab\xcd\xef";

    #[test]
    fn built_dictionaries_authenticate() {
        for algorithm in [
            EncryptionAlgorithm::Rc4_128,
            EncryptionAlgorithm::Aes128,
            EncryptionAlgorithm::Aes256,
        ] {
            let spec = EncryptionSpec::new("user", algorithm).with_owner_password("owner");
            let (dict, built) = spec.build(FILE_ID).unwrap();

            let from_user = EncryptionState::decode(&dict, FILE_ID, "user").unwrap();
            let from_owner = EncryptionState::decode(&dict, FILE_ID, "owner").unwrap();
            assert_eq!(from_user.file_encryption_key, built.file_encryption_key);
            assert_eq!(from_owner.file_encryption_key, built.file_encryption_key);

            let err = EncryptionState::decode(&dict, FILE_ID, "").unwrap_err();
            assert!(matches!(err, crate::Error::Decryption(DecryptionError::IncorrectPassword)));
        }
    }

    #[test]
    fn objects_round_trip_through_each_algorithm() {
        for algorithm in [
            EncryptionAlgorithm::Rc4_128,
            EncryptionAlgorithm::Aes128,
            EncryptionAlgorithm::Aes256,
        ] {
            let (dict, state) = EncryptionSpec::new("", algorithm).build(FILE_ID).unwrap();
            let original = Object::Dictionary(dictionary! {
                "Title" => Object::string_literal("Quarterly report"),
                "Kids" => vec![Object::string_literal("nested")],
            });
            let mut object = original.clone();
            encrypt_object(&state, (5, 0), &mut object).unwrap();
            assert_ne!(object, original);

            let reader_state = EncryptionState::decode(&dict, FILE_ID, "").unwrap();
            decrypt_object(&reader_state, (5, 0), &mut object).unwrap();
            assert_eq!(object, original);
        }
    }

    #[test]
    fn xref_streams_are_left_alone() {
        let (_, state) = EncryptionSpec::new("", EncryptionAlgorithm::Rc4_128).build(FILE_ID).unwrap();
        let stream = Stream::new(dictionary! { "Type" => "XRef" }, b"\x01\x00\x0f".to_vec());
        let mut object = Object::Stream(stream.clone());
        encrypt_object(&state, (9, 0), &mut object).unwrap();
        assert_eq!(object, Object::Stream(stream));
    }

    #[test]
    fn non_standard_handler_is_unsupported() {
        let dict = dictionary! { "Filter" => "Adobe.PubSec", "V" => 4, "R" => 4 };
        let err = EncryptionState::decode(&dict, FILE_ID, "").unwrap_err();
        assert!(matches!(err, crate::Error::UnsupportedSecurityHandler(_)));
    }

    #[test]
    fn p_integer_is_negative_with_reserved_bits() {
        let p = Permissions::PRINTABLE.p_integer();
        assert!(p < 0);
        assert_eq!(p as u32 & 0xff, 0b1100_0100);
    }
}
