//! Debug shader dumping.
//!
//! When enabled, every shader that passes through the pipeline is written
//! to a directory together with a JSON manifest, so binaries captured from
//! a live title can be replayed through the CLI offline. Disabled by
//! default; dumping is a debugging aid, not part of the translation path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::binary::{PsslKey, ShaderStage};

/// Dump configuration, owned by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct DumpConfig {
    /// Target directory; `None` disables dumping entirely.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DumpRecord {
    file: String,
    stage: &'static str,
    crc32: u32,
    hash: u64,
    code_bytes: usize,
}

/// Writes raw shader binaries plus a manifest describing them.
#[derive(Debug)]
pub struct ShaderDumper {
    directory: PathBuf,
    records: Vec<DumpRecord>,
}

impl ShaderDumper {
    /// Returns `None` when dumping is disabled by the config.
    pub fn from_config(config: &DumpConfig) -> Option<Self> {
        config.directory.as_ref().map(|dir| Self {
            directory: dir.clone(),
            records: Vec::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write one shader's raw code words. Failures are logged and
    /// swallowed: a broken dump directory must never take down
    /// translation.
    pub fn dump_shader(&mut self, stage: ShaderStage, key: PsslKey, code: &[u32]) {
        let file = format!("{}_{:08x}_{:016x}.bin", stage.name(), key.crc32, key.hash);
        let path = self.directory.join(&file);
        let bytes: &[u8] = bytemuck::cast_slice(code);
        if let Err(err) = fs::create_dir_all(&self.directory).and_then(|_| fs::write(&path, bytes))
        {
            log::warn!("failed to dump shader to {}: {err}", path.display());
            return;
        }
        self.records.push(DumpRecord {
            file,
            stage: stage.name(),
            crc32: key.crc32,
            hash: key.hash,
            code_bytes: bytes.len(),
        });
    }

    /// Write the manifest for everything dumped so far.
    pub fn write_manifest(&self) -> std::io::Result<()> {
        let path = self.directory.join("manifest.json");
        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = fs::File::create(path)?;
        file.write_all(json.as_bytes())
    }
}
