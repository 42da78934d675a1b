//! Artifact bundle assembly and content-addressing.
//!
//! A bundle is an ordered set of named files. The bundle hash covers every
//! file except `metadata.json` (which records the hash itself plus a
//! creation timestamp), so compiling identical inputs twice yields identical
//! hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OdlError, Result};
use crate::hash;

pub const SEMANTIC_MODEL_FILE: &str = "semantic_model.yaml";
pub const VERIFY_FILE: &str = "verify.sql";
pub const DEPLOY_FILE: &str = "deploy.sql";
pub const ROLLBACK_FILE: &str = "rollback.sql";
pub const ROLLBACK_MODEL_FILE: &str = "rollback_semantic_model.yaml";
pub const METADATA_FILE: &str = "metadata.json";
pub const INSTRUCTIONS_FILE: &str = "instructions.md";
pub const ROLLBACK_DOC_FILE: &str = "rollback.md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub content: String,
}

impl ArtifactFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub source_ontology: String,
    pub version_number: i32,
    /// Content hash of the compiled ontology version.
    pub content_hash: String,
    /// Content hash of the bundle files (excluding metadata.json).
    pub bundle_hash: String,
    pub created_at: DateTime<Utc>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<String>,
    pub objects_count: usize,
    pub relationships_count: usize,
    pub metrics_count: usize,
    pub dimensions_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub files: Vec<ArtifactFile>,
    /// Hash over all files except metadata.json, sorted by path.
    pub content_hash: String,
}

impl ArtifactBundle {
    /// Assemble a bundle: hash the files, record the hash in the metadata,
    /// and append `metadata.json`.
    pub fn assemble(mut files: Vec<ArtifactFile>, mut metadata: BundleMetadata) -> Result<Self> {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let content_hash =
            hash::files_hash(files.iter().map(|f| (f.path.as_str(), f.content.as_str())));
        metadata.bundle_hash = content_hash.clone();

        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| OdlError::CompileFailed(format!("metadata serialization failed: {e}")))?;
        files.push(ArtifactFile::new(METADATA_FILE, format!("{metadata_json}\n")));

        Ok(Self {
            files,
            content_hash,
        })
    }

    pub fn file(&self, path: &str) -> Option<&ArtifactFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    pub fn metadata(&self) -> Result<BundleMetadata> {
        let file = self
            .file(METADATA_FILE)
            .ok_or_else(|| OdlError::CompileFailed("bundle has no metadata.json".into()))?;
        serde_json::from_str(&file.content)
            .map_err(|e| OdlError::CompileFailed(format!("invalid metadata.json: {e}")))
    }

    /// Insert or replace a file. Used by the deployer to record the captured
    /// rollback model; the compile-time hash is not recomputed.
    pub fn upsert_file(&mut self, path: &str, content: String) {
        if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
            existing.content = content;
        } else {
            self.files.push(ArtifactFile::new(path, content));
            self.files.sort_by(|a, b| a.path.cmp(&b.path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> BundleMetadata {
        BundleMetadata {
            source_ontology: "retail".into(),
            version_number: 1,
            content_hash: "abc".into(),
            bundle_hash: String::new(),
            created_at: Utc::now(),
            target: "SNOWFLAKE".into(),
            environments: vec![],
            objects_count: 2,
            relationships_count: 1,
            metrics_count: 1,
            dimensions_count: 0,
        }
    }

    #[test]
    fn test_assemble_appends_metadata_with_hash() {
        let bundle = ArtifactBundle::assemble(
            vec![
                ArtifactFile::new(VERIFY_FILE, "CALL verify;"),
                ArtifactFile::new(SEMANTIC_MODEL_FILE, "semantic_model: {}"),
            ],
            metadata(),
        )
        .unwrap();
        let parsed = bundle.metadata().unwrap();
        assert_eq!(parsed.bundle_hash, bundle.content_hash);
        assert_eq!(bundle.files.last().unwrap().path, METADATA_FILE);
    }

    #[test]
    fn test_hash_excludes_metadata_timestamp() {
        let files = vec![
            ArtifactFile::new(SEMANTIC_MODEL_FILE, "semantic_model: {}"),
            ArtifactFile::new(DEPLOY_FILE, "CALL deploy;"),
        ];
        let a = ArtifactBundle::assemble(files.clone(), metadata()).unwrap();
        let mut later = metadata();
        later.created_at = Utc::now() + chrono::Duration::seconds(90);
        let b = ArtifactBundle::assemble(files, later).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_hash_independent_of_file_order() {
        let a = ArtifactBundle::assemble(
            vec![
                ArtifactFile::new(VERIFY_FILE, "v"),
                ArtifactFile::new(DEPLOY_FILE, "d"),
            ],
            metadata(),
        )
        .unwrap();
        let b = ArtifactBundle::assemble(
            vec![
                ArtifactFile::new(DEPLOY_FILE, "d"),
                ArtifactFile::new(VERIFY_FILE, "v"),
            ],
            metadata(),
        )
        .unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_upsert_file() {
        let mut bundle = ArtifactBundle::assemble(
            vec![ArtifactFile::new(ROLLBACK_FILE, "DROP;")],
            metadata(),
        )
        .unwrap();
        assert!(!bundle.has_file(ROLLBACK_MODEL_FILE));
        bundle.upsert_file(ROLLBACK_MODEL_FILE, "semantic_model: {}".into());
        assert!(bundle.has_file(ROLLBACK_MODEL_FILE));
        bundle.upsert_file(ROLLBACK_FILE, "DROP; CREATE;".into());
        assert_eq!(bundle.file(ROLLBACK_FILE).unwrap().content, "DROP; CREATE;");
    }
}
