use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codegate_core::ContentEncoding;
use codegate_ingest::UploadRequest;

/// How to present a local file as an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub organisation: String,
    pub project: String,
    /// Overrides the stored file name; defaults to the path's file name without any
    /// compression suffix.
    pub file_name: Option<String>,
    /// Overrides the content type guessed from the file name.
    pub content_type: Option<String>,
    /// Overrides the encoding detected from a `.br`/`.gz` suffix.
    pub encoding: Option<String>,
    /// `KEY=VALUE` pairs.
    pub metadata: Vec<String>,
}

/// Split a compression suffix off a file name.
pub fn detect_encoding(file_name: &str) -> (ContentEncoding, &str) {
    if let Some(stem) = file_name.strip_suffix(".br") {
        (ContentEncoding::Brotli, stem)
    } else if let Some(stem) = file_name.strip_suffix(".gz") {
        (ContentEncoding::Gzip, stem)
    } else {
        (ContentEncoding::Identity, file_name)
    }
}

pub fn guess_content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("json") | Some("sarif") => "application/json",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("csv") => "text/csv",
        Some("txt") | Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn parse_metadata(pairs: &[String]) -> anyhow::Result<Option<BTreeMap<String, String>>> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut metadata = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid metadata {:?}: expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid metadata {:?}: empty key", pair);
        }
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(Some(metadata))
}

/// Open a local file as an upload request. The declared length is the on-disk
/// (possibly compressed) size.
pub async fn open_upload(path: &Path, options: &UploadOptions) -> anyhow::Result<UploadRequest> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;

    let (detected, stem) = detect_encoding(name);
    let encoding = match options.encoding.as_deref() {
        Some(encoding) => encoding.parse()?,
        None => detected,
    };
    let file_name = options.file_name.clone().unwrap_or_else(|| stem.to_string());
    let content_type = options
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&file_name).to_string());

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let length = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();

    let mut request = UploadRequest::new(
        options.organisation.clone(),
        options.project.clone(),
        file_name,
        content_type,
        length,
        Box::pin(file),
    )
    .with_encoding(encoding);

    if let Some(metadata) = parse_metadata(&options.metadata)? {
        request = request.with_metadata(metadata);
    }

    Ok(request)
}

/// Expand directories one level into the files they contain, sorted by name.
pub async fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if !metadata.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut entries = tokio::fs::read_dir(path).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                found.push(entry.path());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}
