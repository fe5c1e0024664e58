use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const WORKBOOK_ENTRY: &str = "workbook/attendance.xlsx";
const META_SOURCE_ENTRY: &str = "meta/source.json";
pub const BUNDLE_FORMAT_V1: &str = "rollcall-workbook-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

pub fn export_workbook_bundle(
    workbook_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if !workbook_path.is_file() {
        return Err(anyhow!(
            "workbook not found: {}",
            workbook_path.to_string_lossy()
        ));
    }
    let workbook_bytes = std::fs::read(workbook_path).with_context(|| {
        format!(
            "failed to read workbook {}",
            workbook_path.to_string_lossy()
        )
    })?;
    let sha256 = sha256_hex(&workbook_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "sha256": sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(WORKBOOK_ENTRY, opts)
        .context("failed to start workbook entry")?;
    zip.write_all(&workbook_bytes)
        .context("failed to write workbook entry")?;

    let source_meta = json!({
        "sourceWorkbook": workbook_path.to_string_lossy(),
    });
    zip.start_file(META_SOURCE_ENTRY, opts)
        .context("failed to start source metadata entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&source_meta)
            .context("failed to serialize source metadata")?
            .as_bytes(),
    )
    .context("failed to write source metadata entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        sha256,
    })
}

pub fn import_workbook_bundle(
    in_path: &Path,
    workbook_path: &Path,
) -> anyhow::Result<ImportSummary> {
    if let Some(parent) = workbook_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    // A bare .xlsx is itself a zip archive, so bundle vs legacy backup is
    // told apart by the manifest entry, not by file signature.
    let Some(manifest_text) = read_manifest(in_path)? else {
        std::fs::copy(in_path, workbook_path).with_context(|| {
            format!(
                "failed to copy legacy workbook backup from {} to {}",
                in_path.to_string_lossy(),
                workbook_path.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: "legacy-xlsx".to_string(),
        });
    };

    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha256 = manifest
        .get("sha256")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;
    let mut workbook_bytes = Vec::new();
    archive
        .by_name(WORKBOOK_ENTRY)
        .context("bundle missing workbook entry")?
        .read_to_end(&mut workbook_bytes)
        .context("failed to read workbook entry")?;

    let actual_sha256 = sha256_hex(&workbook_bytes);
    if !expected_sha256.is_empty() && actual_sha256 != expected_sha256 {
        return Err(anyhow!(
            "workbook checksum mismatch: manifest {} != content {}",
            expected_sha256,
            actual_sha256
        ));
    }

    let tmp_dst = workbook_path.with_extension("xlsx.importing");
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    std::fs::write(&tmp_dst, &workbook_bytes).with_context(|| {
        format!(
            "failed to write temp workbook {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    if workbook_path.exists() {
        std::fs::remove_file(workbook_path).with_context(|| {
            format!(
                "failed to remove existing workbook {}",
                workbook_path.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, workbook_path).with_context(|| {
        format!(
            "failed to move extracted workbook to {}",
            workbook_path.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

fn read_manifest(path: &Path) -> anyhow::Result<Option<String>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|_| anyhow!("input is neither a bundle nor an xlsx workbook"))?;
    let mut text = String::new();
    match archive.by_name(MANIFEST_ENTRY) {
        Ok(mut entry) => {
            entry
                .read_to_string(&mut text)
                .context("failed to read manifest.json")?;
            Ok(Some(text))
        }
        Err(_) => Ok(None),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
