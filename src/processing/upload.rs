//! Staging uploaded bytes on local disk for the document parser.

use crate::processing::types::Document;
use std::io::{self, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

const UPLOAD_PREFIX: &str = "docrag-upload-";
const MAX_EXTENSION_LEN: usize = 16;

/// Write the document to a uniquely named temporary file.
///
/// Only a short alphanumeric extension survives from the uploader's filename. The file is removed
/// when the returned handle is dropped.
pub(crate) async fn stage_upload(document: Document) -> io::Result<NamedTempFile> {
    tokio::task::spawn_blocking(move || {
        let suffix = upload_suffix(&document.filename);
        let mut file = Builder::new()
            .prefix(UPLOAD_PREFIX)
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&document.bytes)?;
        file.flush()?;
        Ok::<_, io::Error>(file)
    })
    .await
    .map_err(io::Error::other)?
}

fn upload_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_keeps_safe_extensions_only() {
        assert_eq!(upload_suffix("Report.PDF"), ".pdf");
        assert_eq!(upload_suffix("notes.md"), ".md");
        assert_eq!(upload_suffix("../../etc/passwd"), "");
        assert_eq!(upload_suffix("archive.tar.gz"), ".gz");
        assert_eq!(upload_suffix("weird.p/df"), "");
        assert_eq!(upload_suffix("no_extension"), "");
        assert_eq!(upload_suffix("x.a-b"), "");
    }

    #[tokio::test]
    async fn staged_file_holds_bytes_and_is_removed_on_drop() {
        let staged = stage_upload(Document::new("guide.md", b"# Title\nBody".to_vec()))
            .await
            .expect("stage");
        let path = staged.path().to_path_buf();

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("md"));
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(UPLOAD_PREFIX))
        );
        assert_eq!(std::fs::read(&path).expect("read"), b"# Title\nBody");

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_uploads_get_distinct_files() {
        let a = stage_upload(Document::new("a.txt", b"a".to_vec())).await.expect("a");
        let b = stage_upload(Document::new("a.txt", b"b".to_vec())).await.expect("b");
        assert_ne!(a.path(), b.path());
    }
}
