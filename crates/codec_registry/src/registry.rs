use crate::codec_map::{is_remote, split_location, CodecMap, BUILTIN_SCHEME};
use crate::decoder::Decoder;
use crate::error::{CodecError, CodecResult};
use crate::git::{sanitize_cache_key, GitCliFetcher, RepoFetcher};
use crate::wasm::WasmDecoder;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{clean_string, Measurement};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

/// Text encoding of the raw payload carried by an uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Hex,
    Base64,
}

/// Decode payload text into raw bytes
pub fn decode_payload_text(text: &str, encoding: PayloadEncoding) -> CodecResult<Vec<u8>> {
    match encoding {
        PayloadEncoding::Hex => {
            hex::decode(text).map_err(|e| CodecError::PayloadDecode(e.to_string()))
        }
        PayloadEncoding::Base64 => STANDARD
            .decode(text)
            .map_err(|e| CodecError::PayloadDecode(e.to_string())),
    }
}

/// Trait for instantiating a decoder from a resolved codec directory
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait DecoderLoader: Send + Sync {
    fn load(&self, dir: &Path) -> CodecResult<Arc<dyn Decoder>>;
}

/// Loader for directories carrying a `codec.wasm` entry module
pub struct WasmDecoderLoader;

impl DecoderLoader for WasmDecoderLoader {
    fn load(&self, dir: &Path) -> CodecResult<Arc<dyn Decoder>> {
        Ok(Arc::new(WasmDecoder::from_dir(dir)?))
    }
}

fn default_builtins() -> HashMap<String, Arc<dyn Decoder>> {
    let mut builtins: HashMap<String, Arc<dyn Decoder>> = HashMap::new();
    builtins.insert(
        "cayenne_lpp".to_string(),
        Arc::new(crate::cayenne_lpp::CayenneLppDecoder),
    );
    builtins
}

/// Resolves device names to decoders and runs them against payloads.
///
/// Resolution results and decoder instances are cached for the process
/// lifetime. Failed resolutions are cached too, so an unreachable
/// repository is attempted once rather than per uplink. One mutex
/// guards the populate path of both caches; lookups on the hot path
/// take only a read lock.
pub struct CodecRegistry {
    map: CodecMap,
    cache_dir: PathBuf,
    fetcher: Arc<dyn RepoFetcher>,
    loader: Arc<dyn DecoderLoader>,
    builtins: HashMap<String, Arc<dyn Decoder>>,
    resolved_dirs: RwLock<HashMap<String, Option<PathBuf>>>,
    instances: RwLock<HashMap<PathBuf, Arc<dyn Decoder>>>,
    populate_lock: Mutex<()>,
}

impl CodecRegistry {
    pub fn new(
        map: CodecMap,
        cache_dir: PathBuf,
        fetcher: Arc<dyn RepoFetcher>,
        loader: Arc<dyn DecoderLoader>,
    ) -> Self {
        Self {
            map,
            cache_dir,
            fetcher,
            loader,
            builtins: default_builtins(),
            resolved_dirs: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            populate_lock: Mutex::new(()),
        }
    }

    /// Registry backed by the `git` CLI and the wasm module loader
    pub fn with_defaults(map: CodecMap, cache_dir: PathBuf) -> Self {
        Self::new(
            map,
            cache_dir,
            Arc::new(GitCliFetcher::new()),
            Arc::new(WasmDecoderLoader),
        )
    }

    /// Resolve and load every mapped codec ahead of the first uplink.
    ///
    /// Failures are logged and skipped; a bad entry must not block the
    /// rest of the map.
    #[instrument(skip(self))]
    pub async fn warm_cache(&self) {
        for location in self.map.distinct_locations() {
            if let Some(name) = location.strip_prefix(BUILTIN_SCHEME) {
                if !self.builtins.contains_key(name) {
                    warn!(codec = %name, "codec map references unknown builtin codec");
                }
                continue;
            }

            if let Some(dir) = self.resolve_directory(location).await {
                let _ = self.load_decoder(&dir).await;
            }
        }
    }

    /// Decode a payload for a device.
    ///
    /// Returns `None` when no codec is mapped or any stage fails; the
    /// caller treats that as "no measurements from fallback".
    #[instrument(skip(self, payload_text))]
    pub async fn decode(
        &self,
        device_name: &str,
        payload_text: &str,
        encoding: PayloadEncoding,
    ) -> Option<Vec<Measurement>> {
        let Some(location) = self.map.resolve(device_name) else {
            debug!(device = %device_name, "no codec mapped for device");
            return None;
        };

        let decoder = self.decoder_for(location).await?;

        let bytes = match decode_payload_text(payload_text, encoding) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(device = %device_name, error = %e, "could not decode payload text");
                return None;
            }
        };

        let fields = match decoder.decode(&bytes) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(device = %device_name, codec = %location, error = %e, "codec execution failed");
                return None;
            }
        };

        let measurements: Vec<Measurement> = fields
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| Measurement::new(clean_string(&name), value))
            .collect();

        if measurements.is_empty() {
            debug!(device = %device_name, "codec produced no measurements");
            return None;
        }

        Some(measurements)
    }

    async fn decoder_for(&self, location: &str) -> Option<Arc<dyn Decoder>> {
        if let Some(name) = location.strip_prefix(BUILTIN_SCHEME) {
            let decoder = self.builtins.get(name).cloned();
            if decoder.is_none() {
                warn!(codec = %name, "unknown builtin codec");
            }
            return decoder;
        }

        let dir = self.resolve_directory(location).await?;
        self.load_decoder(&dir).await
    }

    async fn resolve_directory(&self, location: &str) -> Option<PathBuf> {
        {
            let cache = self.resolved_dirs.read().await;
            if let Some(resolved) = cache.get(location) {
                return resolved.clone();
            }
        }

        let _guard = self.populate_lock.lock().await;
        {
            let cache = self.resolved_dirs.read().await;
            if let Some(resolved) = cache.get(location) {
                return resolved.clone();
            }
        }

        let resolved = self.resolve_uncached(location).await;
        self.resolved_dirs
            .write()
            .await
            .insert(location.to_string(), resolved.clone());
        resolved
    }

    async fn resolve_uncached(&self, location: &str) -> Option<PathBuf> {
        let (base, subpath) = split_location(location);

        let base_dir = if is_remote(base) {
            let dest = self.cache_dir.join(sanitize_cache_key(base));
            if dest.is_dir() {
                // A stale checkout is still usable
                if let Err(e) = self.fetcher.update_repo(&dest).await {
                    warn!(repository = %base, error = %e, "codec repository refresh failed, using cached checkout");
                }
            } else {
                if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
                    warn!(error = %e, "failed to create codec cache directory");
                    return None;
                }
                if let Err(e) = self.fetcher.clone_repo(base, &dest).await {
                    warn!(repository = %base, error = %e, "codec repository clone failed");
                    return None;
                }
            }
            dest
        } else {
            PathBuf::from(base)
        };

        let dir = match subpath {
            Some(subpath) => base_dir.join(subpath),
            None => base_dir,
        };

        if dir.is_dir() {
            Some(dir)
        } else {
            warn!(location = %location, directory = %dir.display(), "resolved codec directory does not exist");
            None
        }
    }

    async fn load_decoder(&self, dir: &Path) -> Option<Arc<dyn Decoder>> {
        {
            let cache = self.instances.read().await;
            if let Some(decoder) = cache.get(dir) {
                return Some(decoder.clone());
            }
        }

        let _guard = self.populate_lock.lock().await;
        {
            let cache = self.instances.read().await;
            if let Some(decoder) = cache.get(dir) {
                return Some(decoder.clone());
            }
        }

        match self.loader.load(dir) {
            Ok(decoder) => {
                self.instances
                    .write()
                    .await
                    .insert(dir.to_path_buf(), decoder.clone());
                Some(decoder)
            }
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "failed to load codec module");
                None
            }
        }
    }
}
