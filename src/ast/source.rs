// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Source files as loaded at scan time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{LoadError, ParseError};

use super::tree::{parse, SyntaxTree};

/// A Python file: path, the original bytes and the tree parsed from them.
///
/// The original text is never modified. After a commit the pipeline builds a
/// new `SourceFile` from the committed text with [`SourceFile::rebuild`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    original: Arc<str>,
    hash: String,
    tree: SyntaxTree,
}

impl SourceFile {
    /// Read and parse a file from disk.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| LoadError::Io(e.to_string()))?;
        Self::from_bytes(path, bytes).map_err(LoadError::Parse)
    }

    /// Build from raw bytes. Non-UTF-8 input is rejected.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, ParseError> {
        let path = path.into();
        let text = String::from_utf8(bytes)
            .map_err(|e| ParseError::InvalidUtf8(format!("{}: {}", path.display(), e)))?;
        Self::from_text(path, &text)
    }

    /// Build from text already in memory.
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Result<Self, ParseError> {
        let tree = parse(text)?;
        Ok(Self {
            path: path.into(),
            original: Arc::from(text),
            hash: content_hash(text.as_bytes()),
            tree,
        })
    }

    /// A fresh `SourceFile` for the same path holding `text`.
    pub fn rebuild(&self, text: &str) -> Result<Self, ParseError> {
        Self::from_text(self.path.clone(), text)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The text as it was read.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// SHA-256 of the original bytes, lowercase hex.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Parse snapshot of the original text.
    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
