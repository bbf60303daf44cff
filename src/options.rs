use crate::encryption::EncryptionSpec;

/// Options for cleaning PDF documents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CleanOptions {
    /// Decode every stream and re-encode it with FlateDecode when that makes it smaller.
    pub compress_streams: bool,

    /// Store every decodable stream without filters. Ignored when `compress_streams` is set.
    pub decompress_streams: bool,

    /// Write a cross-reference stream instead of a classic table.
    pub use_xref_streams: bool,

    /// Encrypt the output. Without it the output is unencrypted.
    pub reencrypt: Option<EncryptionSpec>,

    /// Ceiling in bytes for materialized stream payloads.
    pub memory_limit: Option<usize>,

    /// Re-parse the serialized output and compare it with the cleaned document before flushing.
    pub verify_reparse: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        CleanOptions {
            compress_streams: false,
            decompress_streams: false,
            use_xref_streams: false,
            reencrypt: None,
            memory_limit: None,
            verify_reparse: true,
        }
    }
}

/// What the rewriter does with stream payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPolicy {
    Compress,
    Decompress,
    Passthrough,
}

impl CleanOptions {
    /// Create a builder for CleanOptions
    pub fn builder() -> CleanOptionsBuilder {
        CleanOptionsBuilder::default()
    }

    pub fn stream_policy(&self) -> StreamPolicy {
        if self.compress_streams {
            StreamPolicy::Compress
        } else if self.decompress_streams {
            StreamPolicy::Decompress
        } else {
            StreamPolicy::Passthrough
        }
    }
}

/// Builder for CleanOptions
#[derive(Debug, Default)]
pub struct CleanOptionsBuilder {
    options: CleanOptions,
}

impl CleanOptionsBuilder {
    pub fn compress_streams(mut self, value: bool) -> Self {
        self.options.compress_streams = value;
        self
    }

    pub fn decompress_streams(mut self, value: bool) -> Self {
        self.options.decompress_streams = value;
        self
    }

    /// Enable or disable cross-reference streams
    pub fn use_xref_streams(mut self, value: bool) -> Self {
        self.options.use_xref_streams = value;
        self
    }

    pub fn reencrypt(mut self, spec: EncryptionSpec) -> Self {
        self.options.reencrypt = Some(spec);
        self
    }

    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.options.memory_limit = Some(bytes);
        self
    }

    /// Skip the re-parse step of output verification. Offsets are still checked.
    pub fn verify_reparse(mut self, value: bool) -> Self {
        self.options.verify_reparse = value;
        self
    }

    pub fn build(self) -> CleanOptions {
        self.options
    }
}
