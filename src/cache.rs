use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Diagnostic, Diagnostics};
use crate::models::Library;

const MAGIC: &[u8; 4] = b"VMCB";
const VERSION: u16 = 1;

/// Content-addressed two-file store under a caller-chosen directory
/// (typically the process working directory) (§4.4).
pub struct Cache {
    dir: PathBuf,
}

/// Result of a successful `Cache::load`.
pub struct CacheLoad {
    pub library: Library,
    /// Whether the fast snapshot is within the configured max age, i.e. the
    /// caller may skip re-validating every Volume's `(size, mtime)`.
    pub fresh: bool,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn fast_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("fast_{key:016x}.bin"))
    }

    fn durable_path(&self, key: u64) -> PathBuf {
        self.dir.join(format!("durable_{key:016x}.json"))
    }

    /// 64-bit key for a library root path (§4.4 "Key").
    pub fn key_for(root: &Path) -> u64 {
        xxh3_64(normalize_root(root).as_bytes())
    }

    /// Load the cache record for `root`, preferring the binary snapshot and
    /// falling back to the durable JSON on any incompatibility. Returns
    /// `None` if neither file is usable, or if the recorded root does not
    /// match `root`. Non-fatal problems are appended to `diagnostics`
    /// (`CacheRead`, §7) rather than returned as an error.
    pub fn load(&self, root: &Path, max_age_secs: u64, diagnostics: &mut Diagnostics) -> Option<CacheLoad> {
        let key = Self::key_for(root);
        let normalized_root = normalize_root(root);

        match self.load_fast(key, diagnostics) {
            Ok(Some((library, written_at_ms))) => {
                if normalize_root(&library.root) != normalized_root {
                    return None;
                }
                let fresh = is_fresh(written_at_ms, max_age_secs);
                return Some(CacheLoad { library, fresh });
            }
            Ok(None) => {}
            Err(message) => diagnostics.push(Diagnostic::CacheRead { message }),
        }

        match self.load_durable(key) {
            Ok(Some(library)) => {
                if normalize_root(&library.root) != normalized_root {
                    return None;
                }
                Some(CacheLoad { library, fresh: false })
            }
            Ok(None) => None,
            Err(message) => {
                diagnostics.push(Diagnostic::CacheRead { message });
                None
            }
        }
    }

    /// `Ok(None)` means the file is simply absent, which is not a failure
    /// (§4.4 "The binary snapshot may be absent; readers must tolerate
    /// this").
    fn load_fast(&self, key: u64, _diagnostics: &mut Diagnostics) -> Result<Option<(Library, u64)>, String> {
        let path = self.fast_path(key);
        let mut bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(format!("reading {}: {err}", path.display())),
        };

        if bytes.len() < 4 + 2 + 8 + 8 + 8 {
            return Err("fast snapshot truncated header".to_string());
        }
        let payload = bytes.split_off(4 + 2 + 8 + 8 + 8);
        let header = bytes;

        if &header[0..4] != MAGIC {
            return Err("fast snapshot bad magic".to_string());
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(format!("fast snapshot version {version} unsupported (expected {VERSION})"));
        }
        let _root_hash = u64::from_be_bytes(header[6..14].try_into().unwrap());
        let written_at_ms = u64::from_be_bytes(header[14..22].try_into().unwrap());
        let payload_len = u64::from_be_bytes(header[22..30].try_into().unwrap()) as usize;
        if payload_len != payload.len() {
            return Err("fast snapshot payload length mismatch".to_string());
        }

        let library: Library =
            bincode::deserialize(&payload).map_err(|err| format!("decoding fast snapshot: {err}"))?;
        Ok(Some((library, written_at_ms)))
    }

    fn load_durable(&self, key: u64) -> Result<Option<Library>, String> {
        let path = self.durable_path(key);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(format!("reading {}: {err}", path.display())),
        };
        let library = serde_json::from_str(&text).map_err(|err| format!("decoding durable cache: {err}"))?;
        Ok(Some(library))
    }

    /// Atomically rewrite both files. A library marked incomplete (§4.5,
    /// §5 "no partial writes to cache occur on cancellation") is never
    /// stored. Failures are reported via `CacheWrite`, never returned as a
    /// fatal error (§7).
    pub fn store(&self, library: &Library, diagnostics: &mut Diagnostics) {
        if !library.complete {
            return;
        }
        let key = Self::key_for(&library.root);

        if let Err(message) = self.write_durable(key, library) {
            diagnostics.push(Diagnostic::CacheWrite { message });
        }
        if let Err(message) = self.write_fast(key, library) {
            diagnostics.push(Diagnostic::CacheWrite { message });
        }
    }

    fn write_durable(&self, key: u64, library: &Library) -> Result<(), String> {
        let json = serde_json::to_vec(library).map_err(|err| format!("encoding durable cache: {err}"))?;
        atomic_write(&self.durable_path(key), &json)
    }

    fn write_fast(&self, key: u64, library: &Library) -> Result<(), String> {
        let payload = bincode::serialize(library).map_err(|err| format!("encoding fast snapshot: {err}"))?;
        let written_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut framed = Vec::with_capacity(4 + 2 + 8 + 8 + 8 + payload.len());
        framed.extend_from_slice(MAGIC);
        framed.extend_from_slice(&VERSION.to_be_bytes());
        framed.extend_from_slice(&key.to_be_bytes());
        framed.extend_from_slice(&written_at_ms.to_be_bytes());
        framed.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        framed.extend_from_slice(&payload);

        atomic_write(&self.fast_path(key), &framed)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), String> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|err| format!("creating {}: {err}", dir.display()))?;

    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    {
        let mut file = File::create(&tmp_path).map_err(|err| format!("creating {}: {err}", tmp_path.display()))?;
        file.write_all(bytes).map_err(|err| format!("writing {}: {err}", tmp_path.display()))?;
    }
    if fs::rename(&tmp_path, path).is_err() {
        fs::copy(&tmp_path, path).map_err(|err| format!("copying {} to {}: {err}", tmp_path.display(), path.display()))?;
        let _ = fs::remove_file(&tmp_path);
    }
    Ok(())
}

fn normalize_root(root: &Path) -> String {
    let s = root.to_string_lossy();
    s.trim_end_matches(['/', '\\']).to_string()
}

fn is_fresh(written_at_ms: u64, max_age_secs: u64) -> bool {
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
    now_ms.saturating_sub(written_at_ms) <= max_age_secs.saturating_mul(1000)
}
