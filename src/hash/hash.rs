// Hash computation module
// Provides the algorithm registry and per-file digest computation

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use super::error::HashUtilityError;

/// Length in bytes of a keyed-hash key.
pub const KEY_LEN: usize = 32;

/// Default read chunk for streaming providers.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

// Files at or above this size are streamed instead of mapped
const MMAP_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024; // 2GB

// BLAKE3 switches to multithreaded hashing above this input size
const BLAKE3_RAYON_THRESHOLD: usize = 128 * 1024;

/// Streaming digest state
pub trait Hasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize the hash and return the result
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

/// Fresh state handed out by a provider for one file.
pub enum HashState {
    Streaming(Box<dyn Hasher>),
    /// The algorithm needs the whole input; call [`HashProvider::digest`].
    OneShot,
}

/// A digest algorithm selected once per run and shared by every worker.
pub trait HashProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Digest length in bytes
    fn digest_len(&self) -> usize;

    /// Preferred read size for streaming
    fn chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }

    fn init(&self) -> HashState;

    /// Digest a complete input in one call.
    fn digest(&self, data: &[u8]) -> Vec<u8>;
}

type HasherFactory = Box<dyn Fn() -> Box<dyn Hasher> + Send + Sync>;

/// Provider backed by an init/update/finalize hasher
pub struct StreamingProvider {
    name: &'static str,
    digest_len: usize,
    factory: HasherFactory,
}

impl StreamingProvider {
    pub fn new<F>(name: &'static str, digest_len: usize, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Hasher> + Send + Sync + 'static,
    {
        Self {
            name,
            digest_len,
            factory: Box::new(factory),
        }
    }
}

impl HashProvider for StreamingProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn digest_len(&self) -> usize {
        self.digest_len
    }

    fn init(&self) -> HashState {
        HashState::Streaming((self.factory)())
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = (self.factory)();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Provider for algorithms that only expose a whole-buffer digest
pub struct OneShotProvider {
    name: &'static str,
    digest_len: usize,
    digest: fn(&[u8]) -> Vec<u8>,
}

impl HashProvider for OneShotProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn digest_len(&self) -> usize {
        self.digest_len
    }

    fn init(&self) -> HashState {
        HashState::OneShot
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        (self.digest)(data)
    }
}

// Any RustCrypto digest (sha1, sha2, blake2)
struct DigestWrapper<D>(D);

impl<D> Hasher for DigestWrapper<D>
where
    D: sha2::Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        sha2::Digest::finalize(self.0).to_vec()
    }
}

// BLAKE3 wrapper
//
// Large inputs (a whole mapped file) go through update_rayon so a single big
// file still uses every core.
struct Blake3Wrapper(blake3::Hasher);

impl Hasher for Blake3Wrapper {
    fn update(&mut self, data: &[u8]) {
        if data.len() > BLAKE3_RAYON_THRESHOLD {
            self.0.update_rayon(data);
        } else {
            self.0.update(data);
        }
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().as_bytes().to_vec()
    }
}

use xxhash_rust::xxh3::Xxh3;
use xxhash_rust::xxh64::Xxh64;

// xxHash digests are written in canonical (big-endian) order, as xxhsum does
struct Xxh64Wrapper(Xxh64);

impl Hasher for Xxh64Wrapper {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.digest().to_be_bytes().to_vec()
    }
}

struct Xxh3Wrapper(Xxh3);

impl Hasher for Xxh3Wrapper {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.digest().to_be_bytes().to_vec()
    }
}

struct Xxh128Wrapper(Xxh3);

impl Hasher for Xxh128Wrapper {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.digest128().to_be_bytes().to_vec()
    }
}

fn xxh32_digest(data: &[u8]) -> Vec<u8> {
    xxhash_rust::xxh32::xxh32(data, 0).to_be_bytes().to_vec()
}

// Canonical names, in listing order
const ALGORITHMS: &[&str] = &[
    "sha1", "sha256", "sha512", "blake2b", "blake3", "xxh64", "xxh3", "xxh128", "xxh32",
];

/// Registry for hash algorithms
pub struct HashRegistry;

impl HashRegistry {
    /// Canonical algorithm names, in listing order
    pub fn names() -> Vec<&'static str> {
        ALGORITHMS.to_vec()
    }

    /// Build the provider for `algorithm`, optionally keyed with a hex key.
    pub fn resolve(
        algorithm: &str,
        key: Option<&str>,
    ) -> Result<Arc<dyn HashProvider>, HashUtilityError> {
        let alg_lower = algorithm.to_lowercase();

        let key = match key {
            Some(hex_key) => Some(parse_key(hex_key)?),
            None => None,
        };

        let provider: Arc<dyn HashProvider> = match alg_lower.as_str() {
            "blake3" => match key {
                Some(key) => Arc::new(StreamingProvider::new("blake3", 32, move || {
                    Box::new(Blake3Wrapper(blake3::Hasher::new_keyed(&key)))
                })),
                None => Arc::new(StreamingProvider::new("blake3", 32, || {
                    Box::new(Blake3Wrapper(blake3::Hasher::new()))
                })),
            },
            _ if key.is_some() => {
                return Err(HashUtilityError::KeyNotSupported {
                    algorithm: algorithm.to_string(),
                })
            }
            "sha1" | "sha-1" => Arc::new(StreamingProvider::new("sha1", 20, || {
                Box::new(DigestWrapper(<sha1::Sha1 as sha2::Digest>::new()))
            })),
            "sha256" | "sha-256" => Arc::new(StreamingProvider::new("sha256", 32, || {
                Box::new(DigestWrapper(<sha2::Sha256 as sha2::Digest>::new()))
            })),
            "sha512" | "sha-512" => Arc::new(StreamingProvider::new("sha512", 64, || {
                Box::new(DigestWrapper(<sha2::Sha512 as sha2::Digest>::new()))
            })),
            "blake2b" | "blake2b-512" => Arc::new(StreamingProvider::new("blake2b", 64, || {
                Box::new(DigestWrapper(<blake2::Blake2b512 as sha2::Digest>::new()))
            })),
            "xxh64" => Arc::new(StreamingProvider::new("xxh64", 8, || {
                Box::new(Xxh64Wrapper(Xxh64::new(0)))
            })),
            "xxh3" | "xxh3-64" => Arc::new(StreamingProvider::new("xxh3", 8, || {
                Box::new(Xxh3Wrapper(Xxh3::new()))
            })),
            "xxh128" | "xxh3-128" => Arc::new(StreamingProvider::new("xxh128", 16, || {
                Box::new(Xxh128Wrapper(Xxh3::new()))
            })),
            "xxh32" => Arc::new(OneShotProvider {
                name: "xxh32",
                digest_len: 4,
                digest: xxh32_digest,
            }),
            _ => {
                return Err(HashUtilityError::UnsupportedAlgorithm {
                    algorithm: algorithm.to_string(),
                })
            }
        };

        Ok(provider)
    }
}

/// Decode a hex-encoded keyed-hash key
pub fn parse_key(hex_key: &str) -> Result<[u8; KEY_LEN], HashUtilityError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| HashUtilityError::InvalidKey {
        reason: e.to_string(),
    })?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| HashUtilityError::InvalidKey {
        reason: format!("expected {} bytes, got {}", KEY_LEN, bytes.len()),
    })
}

/// Result of a hash computation
#[derive(Debug, Clone)]
pub struct HashResult {
    pub hash: String, // hex-encoded
    pub bytes: u64,
}

/// Hash computer with streaming or memory-mapped I/O
#[derive(Clone)]
pub struct HashComputer {
    provider: Arc<dyn HashProvider>,
}

impl HashComputer {
    pub fn new(provider: Arc<dyn HashProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn HashProvider {
        self.provider.as_ref()
    }

    /// Digest an in-memory buffer and hex-encode it
    pub fn compute_bytes(&self, data: &[u8]) -> String {
        hex::encode(self.provider.digest(data))
    }

    /// Compute the digest of one file.
    ///
    /// Files smaller than 2GB are memory-mapped; larger or empty files, and
    /// any file the kernel refuses to map, are read in provider-sized chunks.
    ///
    /// # Safety
    ///
    /// Memory mapping assumes the file is not truncated by another process
    /// while it is being hashed.
    pub fn compute_hash(&self, path: &Path) -> Result<HashResult, HashUtilityError> {
        let file = File::open(path).map_err(|e| {
            HashUtilityError::from_io_error(e, "reading", Some(path.to_path_buf()))
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| {
                HashUtilityError::from_io_error(e, "reading metadata of", Some(path.to_path_buf()))
            })?
            .len();

        let digest = if file_size > 0 && file_size < MMAP_THRESHOLD {
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => self.provider.digest(&mmap[..]),
                Err(_) => self.digest_buffered(file, path)?,
            }
        } else {
            self.digest_buffered(file, path)?
        };

        Ok(HashResult {
            hash: hex::encode(digest),
            bytes: file_size,
        })
    }

    fn digest_buffered(&self, mut file: File, path: &Path) -> Result<Vec<u8>, HashUtilityError> {
        let read_err =
            |e| HashUtilityError::from_io_error(e, "reading", Some(path.to_path_buf()));

        match self.provider.init() {
            HashState::Streaming(mut hasher) => {
                let mut buffer = vec![0u8; self.provider.chunk_size()];
                loop {
                    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
                    if bytes_read == 0 {
                        break;
                    }
                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(hasher.finalize())
            }
            HashState::OneShot => {
                let mut data = Vec::new();
                file.read_to_end(&mut data).map_err(read_err)?;
                Ok(self.provider.digest(&data))
            }
        }
    }
}
