#![doc = include_str!("../README.md")]

mod object;
pub use object::{Dictionary, Object, ObjectId, Stream, StringFormat};

mod document;
pub use document::Document;

mod error;
pub use error::{CleanError, DecompressError, Error, ParseError, Result, XrefError};

pub mod analyzer;
pub use analyzer::{LiveSet, RetainSet};

mod budget;
pub use budget::MemoryBudget;

mod clean;
pub use clean::{Phase, clean, clean_file};

pub mod encryption;
pub use encryption::{EncryptionAlgorithm, EncryptionSpec, Permissions};

pub mod filters;
mod object_stream;
mod options;
pub use options::{CleanOptions, CleanOptionsBuilder, StreamPolicy};

mod parser;
mod reader;
pub mod rewriter;
mod verify;
mod writer;
pub use writer::{WriteSummary, Writer};

pub mod xref;
