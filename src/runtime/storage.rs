//! Config persistence and atomic write operations
//!
//! Configs are written through a temp file that is synced and renamed into
//! place, so a crash never leaves a half-written config behind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::EngineConfig;
use super::error::{StorageError, StorageResult};

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = path.with_extension("tmp");
    let failed = |detail: String| StorageError::AtomicWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut file = File::create(&temp_path)
        .map_err(|err| failed(format!("create {}: {err}", temp_path.display())))?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|err| failed(format!("rename from {}: {err}", temp_path.display())))?;

    // Sync parent directory
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new().read(true).open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}

/// Write engine configuration as pretty JSON
pub fn write_config(path: &Path, config: &EngineConfig) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &json)
}

/// Load engine configuration
pub fn load_config(path: &Path) -> StorageResult<EngineConfig> {
    if !path.exists() {
        return Err(StorageError::PathNotFound(path.to_path_buf()));
    }
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fanout::Peer;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/choreo.json");

        let config = EngineConfig {
            robot_name: "misty-3".into(),
            stop_on_failed_command: true,
            peers: vec![Peer::new("misty-1", "10.0.0.1")],
            ..EngineConfig::default()
        };

        write_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_config() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StorageError::PathNotFound(_)));
    }

    #[test]
    fn test_atomic_write() {
        let temp = TempDir::new().unwrap();
        let test_file = temp.path().join("test.dat");

        write_atomic(&test_file, b"first").unwrap();
        write_atomic(&test_file, b"Hello, world!").unwrap();

        let read_data = fs::read(&test_file).unwrap();
        assert_eq!(b"Hello, world!", &read_data[..]);
    }
}
