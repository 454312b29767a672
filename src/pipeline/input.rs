//! Input loading: resolve a path or URL to validated PDF bytes.
//!
//! The whole document is held in memory because it is sent inline to the
//! API. Validation happens in three steps, cheapest first: non-empty, `%PDF`
//! magic, then a full lopdf parse that also yields the page count and the
//! Info dictionary for the report header.

use crate::error::ReviewError;
use crate::output::{DocumentKind, DocumentMetadata};
use lopdf::{Dictionary, Document, Object};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF magic bytes.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A validated document ready for the request builder.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub bytes: Vec<u8>,
    pub metadata: DocumentMetadata,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to validated PDF bytes.
///
/// URLs are downloaded; anything else is treated as a local path.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedDocument, ReviewError> {
    if input.trim().is_empty() {
        return Err(ReviewError::InvalidInput {
            input: input.to_string(),
        });
    }
    let (source, bytes) = if is_url(input) {
        (file_name_from_url(input), download_url(input, timeout_secs).await?)
    } else {
        let path = PathBuf::from(input);
        let bytes = read_local(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.to_string());
        (name, bytes)
    };

    tokio::task::spawn_blocking(move || load_bytes(&source, bytes))
        .await
        .map_err(|e| ReviewError::Internal(format!("PDF parse task panicked: {e}")))?
}

/// Validate in-memory bytes and extract metadata.
pub fn load_bytes(source: &str, bytes: Vec<u8>) -> Result<LoadedDocument, ReviewError> {
    check_magic(source, &bytes)?;

    let doc = Document::load_mem(&bytes).map_err(|e| ReviewError::CorruptPdf {
        source_name: source.to_string(),
        detail: e.to_string(),
    })?;

    let page_count = doc.get_pages().len();
    if page_count == 0 {
        return Err(ReviewError::CorruptPdf {
            source_name: source.to_string(),
            detail: "document has no pages".into(),
        });
    }

    let info = info_dictionary(&doc);
    let text_field = |key: &[u8]| -> Option<String> {
        info.and_then(|d| d.get(key).ok())
            .and_then(|o| match o {
                Object::String(raw, _) => Some(decode_pdf_text(raw)),
                _ => None,
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let metadata = DocumentMetadata {
        source: source.to_string(),
        size_bytes: bytes.len(),
        page_count,
        pdf_version: doc.version.clone(),
        title: text_field(b"Title"),
        author: text_field(b"Author"),
        is_encrypted: doc.trailer.get(b"Encrypt").is_ok(),
        kind: DocumentKind::from_file_name(source),
    };

    info!(
        "Loaded '{}': {} pages, {} bytes, PDF {}",
        source, page_count, metadata.size_bytes, metadata.pdf_version
    );

    Ok(LoadedDocument { bytes, metadata })
}

/// Fail unless the bytes are non-empty and start with `%PDF`.
pub fn check_magic(source: &str, bytes: &[u8]) -> Result<(), ReviewError> {
    if bytes.is_empty() {
        return Err(ReviewError::EmptyDocument {
            source_name: source.to_string(),
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ReviewError::NotAPdf {
            source_name: source.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Read a local file, mapping I/O failures to input errors.
async fn read_local(path: &Path) -> Result<Vec<u8>, ReviewError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReviewError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ReviewError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(ReviewError::InvalidInput {
            input: format!("{}: {e}", path.display()),
        }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ReviewError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ReviewError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReviewError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ReviewError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ReviewError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReviewError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Extract a reasonable file name from the URL path.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// The trailer's Info dictionary, inline or referenced.
fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with a BOM, else PDFDocEncoding
/// (treated as Latin-1, which matches it for printable characters).
fn decode_pdf_text(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        raw.iter().map(|&b| b as char).collect()
    }
}
