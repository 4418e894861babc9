use std::path::{Path, PathBuf};

use crate::capture::CaptureRecord;
use crate::error::ProxyError;

const MAX_SANITIZED_PATH_LEN: usize = 50;

/// Builds the export filename for one record: `{method}_{path}_{epoch_ms}.json`.
pub fn filename_for(record: &CaptureRecord, epoch_ms: u128) -> String {
    let method = record.request.method.to_ascii_lowercase();
    let path = path_of(&record.request.url);
    let sanitized = sanitize_path(&path);
    format!("{method}_{sanitized}_{epoch_ms}.json")
}

fn path_of(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return "/".to_string();
    };
    let after_scheme = &url[scheme_end + 3..];
    match after_scheme.find('/') {
        Some(slash) => after_scheme[slash..].to_string(),
        None => "/".to_string(),
    }
}

fn sanitize_path(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    sanitized.chars().take(MAX_SANITIZED_PATH_LEN).collect()
}

/// Writes a single record as a pretty-printed JSON document under `dir`.
pub fn export_record(dir: &Path, record: &CaptureRecord, epoch_ms: u128) -> Result<PathBuf, ProxyError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename_for(record, epoch_ms));
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| ProxyError::CaGenerate(format!("serializing capture record: {e}")))?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Writes every record in the buffer as a single JSON array document.
pub fn export_all(dir: &Path, records: &[CaptureRecord], epoch_ms: u128) -> Result<PathBuf, ProxyError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("captures_{epoch_ms}.json"));
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| ProxyError::CaGenerate(format!("serializing capture records: {e}")))?;
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::record::{CapturedRequest, CapturedResponse};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn record() -> CaptureRecord {
        CaptureRecord {
            ordinal: 1,
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
            request: CapturedRequest {
                url: "http://upstream.test/a/b?x=1".into(),
                method: "GET".into(),
                headers: BTreeMap::new(),
                body: Value::Null,
            },
            response: CapturedResponse {
                status_code: 200,
                headers: BTreeMap::new(),
                body: Value::Null,
            },
        }
    }

    #[test]
    fn builds_expected_filename() {
        let name = filename_for(&record(), 1000);
        assert_eq!(name, "get__a_b_x_1_1000.json");
    }

    #[test]
    fn truncates_long_paths() {
        let mut r = record();
        r.request.url = format!("http://upstream.test/{}", "x".repeat(100));
        let name = filename_for(&r, 1000);
        let stem = name.strip_suffix("_1000.json").unwrap();
        assert!(stem.len() <= MAX_SANITIZED_PATH_LEN + "get_".len());
    }
}
