//! Result bundle writer.
//!
//! Lays a finished run out on disk:
//! ```text
//! <out>/<run_id>/
//! ├── manifest.json     (run summary + sha256 per file)
//! ├── buyer_group.json
//! ├── cohesion.json
//! ├── costs.json
//! └── report.md
//! ```
//! Every file is written to a dot-prefixed temp file and renamed into place.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use buyergroup_shared::{BuyerGroupError, PipelineReport, Result, RunId};

pub const BUNDLE_SCHEMA_VERSION: u32 = 1;

/// Checksum entry for one bundle file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// `manifest.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub identifier: String,
    pub company: String,
    pub members: usize,
    pub cohesion_score: f64,
    pub total_cost: u64,
    pub tool_version: String,
    pub written_at: DateTime<Utc>,
    pub files: Vec<FileMeta>,
}

/// Where a bundle landed.
#[derive(Debug, Clone)]
pub struct BundleResult {
    pub path: PathBuf,
    pub manifest: BundleManifest,
}

/// Write the bundle for `report` under `out_dir/<run_id>/`.
#[instrument(skip_all, fields(run_id = %report.run_id, out = %out_dir.display()))]
pub fn write_bundle(report: &PipelineReport, narrative: &str, out_dir: &Path) -> Result<BundleResult> {
    let dir = out_dir.join(report.run_id.to_string());
    std::fs::create_dir_all(&dir).map_err(|e| BuyerGroupError::io(&dir, e))?;

    let files: [(&str, String); 4] = [
        ("buyer_group.json", to_json(&report.buyer_group)?),
        ("cohesion.json", to_json(&report.cohesion)?),
        ("costs.json", to_json(&report.costs)?),
        ("report.md", narrative.to_string()),
    ];

    let mut metas = Vec::with_capacity(files.len());
    for (filename, content) in &files {
        write_atomic(&dir, filename, content)?;
        metas.push(FileMeta {
            filename: (*filename).to_string(),
            sha256: sha256_hex(content),
            size_bytes: content.len(),
        });
        debug!(file = %filename, size = content.len(), "wrote bundle file");
    }

    let manifest = BundleManifest {
        schema_version: BUNDLE_SCHEMA_VERSION,
        run_id: report.run_id.clone(),
        identifier: report.identifier.clone(),
        company: report.intelligence.name.clone(),
        members: report.buyer_group.len(),
        cohesion_score: report.cohesion.score,
        total_cost: report.costs.total(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        written_at: Utc::now(),
        files: metas,
    };
    write_atomic(&dir, "manifest.json", &to_json(&manifest)?)?;

    info!(path = %dir.display(), files = manifest.files.len(), "bundle written");

    Ok(BundleResult {
        path: dir,
        manifest,
    })
}

/// Check that every file listed in the manifest exists and matches its checksum.
pub fn verify_bundle(dir: &Path) -> Result<BundleManifest> {
    let manifest_path = dir.join("manifest.json");
    let content =
        std::fs::read_to_string(&manifest_path).map_err(|e| BuyerGroupError::io(&manifest_path, e))?;
    let manifest: BundleManifest = serde_json::from_str(&content)
        .map_err(|e| BuyerGroupError::validation(format!("invalid manifest.json: {e}")))?;

    if manifest.schema_version != BUNDLE_SCHEMA_VERSION {
        return Err(BuyerGroupError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, BUNDLE_SCHEMA_VERSION
        )));
    }

    for file in &manifest.files {
        let path = dir.join(&file.filename);
        let body = std::fs::read_to_string(&path).map_err(|e| BuyerGroupError::io(&path, e))?;
        if sha256_hex(&body) != file.sha256 {
            return Err(BuyerGroupError::validation(format!(
                "checksum mismatch for {}",
                file.filename
            )));
        }
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| BuyerGroupError::validation(format!("JSON serialization failed: {e}")))
}

fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<()> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));
    std::fs::write(&temp, content).map_err(|e| BuyerGroupError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| BuyerGroupError::io(&target, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::tests::sample_report;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bg-assembler-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bundle_has_expected_layout() {
        let tmp = temp_dir();
        let report = sample_report();
        let result = write_bundle(&report, "# brief\n", &tmp).unwrap();

        assert_eq!(result.path, tmp.join(report.run_id.to_string()));
        for name in ["manifest.json", "buyer_group.json", "cohesion.json", "costs.json", "report.md"] {
            assert!(result.path.join(name).exists(), "missing {name}");
        }
        assert_eq!(result.manifest.members, 1);
        assert_eq!(result.manifest.total_cost, 11);
        assert_eq!(result.manifest.files.len(), 4);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn manifest_checksums_verify() {
        let tmp = temp_dir();
        let result = write_bundle(&sample_report(), "# brief\n", &tmp).unwrap();

        let manifest = verify_bundle(&result.path).unwrap();
        let report_md = manifest.files.iter().find(|f| f.filename == "report.md").unwrap();
        assert_eq!(
            report_md.sha256,
            "e97f4b00c2adea6196e192f025116d6b6bcb213175cd65c656d236d1a3163db8"
        );

        std::fs::write(result.path.join("report.md"), "tampered").unwrap();
        assert!(verify_bundle(&result.path).is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn bundle_round_trips_members() {
        let tmp = temp_dir();
        let report = sample_report();
        let result = write_bundle(&report, "", &tmp).unwrap();

        let body = std::fs::read_to_string(result.path.join("buyer_group.json")).unwrap();
        let members: Vec<buyergroup_shared::EnrichedMember> = serde_json::from_str(&body).unwrap();
        assert_eq!(members, report.buyer_group);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = temp_dir();
        let result = write_bundle(&sample_report(), "x", &tmp).unwrap();
        for entry in std::fs::read_dir(&result.path).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
