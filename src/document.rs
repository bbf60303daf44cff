use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::budget::MemoryBudget;
use crate::encryption::EncryptionState;
use crate::error::ParseError;
use crate::reader::Reader;
use crate::xref::{Xref, XrefType};
use crate::{Dictionary, Error, Object, ObjectId, Result};

/// A parsed PDF document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The version of the PDF specification to which the file conforms.
    pub version: String,

    /// The bytes of the binary comment line following the header, if the file had one.
    pub binary_mark: Vec<u8>,

    /// The trailer gives the location of the catalog and of certain special objects.
    pub trailer: Dictionary,

    /// The merged cross-reference table the objects were loaded through.
    pub reference_table: Xref,

    /// The objects that make up the document.
    pub objects: BTreeMap<ObjectId, Object>,

    /// Highest object number in use.
    pub max_id: u32,

    /// Set when the input was encrypted and has been decrypted.
    pub encryption_state: Option<EncryptionState>,

    /// Streams whose payload could not be delimited, with the offset of their object.
    pub unreadable_streams: BTreeMap<ObjectId, usize>,

    /// Byte accounting shared by every phase of the operation that loaded this document.
    pub budget: Arc<MemoryBudget>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Document {
        Document {
            version: "1.4".to_string(),
            binary_mark: b"\xe2\xe3\xcf\xd3".to_vec(),
            trailer: Dictionary::new(),
            reference_table: Xref::new(0, XrefType::CrossReferenceTable),
            objects: BTreeMap::new(),
            max_id: 0,
            encryption_state: None,
            unreadable_streams: BTreeMap::new(),
            budget: Arc::new(MemoryBudget::unlimited()),
        }
    }

    /// Create an empty document with the given header version.
    pub fn with_version<S: Into<String>>(version: S) -> Document {
        Document {
            version: version.into(),
            ..Document::new()
        }
    }

    /// Load a document from a file, trying the empty password if it is encrypted.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Document> {
        let buffer = fs::read(path)?;
        Self::load_mem(&buffer)
    }

    /// Load a document from a memory slice, trying the empty password if it is encrypted.
    pub fn load_mem(buffer: &[u8]) -> Result<Document> {
        Self::load_mem_with_password(buffer, "")
    }

    /// Load a document from a memory slice, authenticating with `password` if it is encrypted.
    pub fn load_mem_with_password(buffer: &[u8], password: &str) -> Result<Document> {
        Self::load_mem_with_budget(buffer, password, Arc::new(MemoryBudget::unlimited()))
    }

    /// Load a document whose materialized payloads are charged against `budget`.
    pub fn load_mem_with_budget(buffer: &[u8], password: &str, budget: Arc<MemoryBudget>) -> Result<Document> {
        Reader::new(buffer, password, budget).read()
    }

    /// Resolve `id` to the identifier it is stored under.
    ///
    /// The exact (number, generation) pair is preferred; otherwise the only definition with the
    /// same number is used, since a document keeps one generation per number.
    pub fn resolve_id(&self, id: ObjectId) -> Option<ObjectId> {
        if self.objects.contains_key(&id) {
            return Some(id);
        }
        self.objects
            .range((id.0, 0)..=(id.0, u16::MAX))
            .next()
            .map(|(found, _)| *found)
    }

    /// Get an object by identifier, following the lenient generation rule of [`Document::resolve_id`].
    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        self.resolve_id(id)
            .and_then(|id| self.objects.get(&id))
            .ok_or(Error::ObjectNotFound(id))
    }

    /// Follow `object` if it is a reference.
    pub fn dereference<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        match object {
            Object::Reference(id) => self.get_object(*id),
            _ => Ok(object),
        }
    }

    /// The document catalog named by the trailer's `/Root`.
    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self
            .trailer
            .get(b"Root")
            .map_err(|_| ParseError::MissingCatalog)?;
        self.dereference(root)
            .and_then(Object::as_dict)
            .map_err(|_| ParseError::MissingCatalog.into())
    }

    /// Whether the document was decrypted while loading.
    pub fn was_encrypted(&self) -> bool {
        self.encryption_state.is_some()
    }

    /// Recompute `max_id` from the objects present.
    pub fn adjust_max_id(&mut self) {
        self.max_id = self.objects.keys().next_back().map(|id| id.0).unwrap_or(0);
    }
}
