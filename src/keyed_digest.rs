//! Keyed MD5 digest with a lazily generated, process-wide secret.
//!
//! The secret is 128 bits derived once per process from the wall clock, a
//! best-effort non-blocking read of the OS entropy pool, the process id and
//! the user id. [`keyed_digest`] computes `MD5(MD5(msg) XOR secret)`, which an
//! adversary that does not know the secret cannot steer into chosen buckets.

use log::{debug, warn};
use once_cell::sync::OnceCell;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DIGEST_LEN: usize = 16;

/// Number of 32-bit words gathered before digesting into the secret.
const POOL_WORDS: usize = 16;

static SHARED_SECRET: OnceCell<[u8; DIGEST_LEN]> = OnceCell::new();

/// Plain MD5 of `bytes`.
pub fn hash_md5(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    md5::compute(bytes).0
}

/// Lowercase hex rendering of a digest.
pub fn digest_to_hex(digest: &[u8; DIGEST_LEN]) -> String {
    format!("{:x}", md5::Digest(*digest))
}

/// Returns the process secret, generating it on first use.
pub fn shared_secret() -> &'static [u8; DIGEST_LEN] {
    SHARED_SECRET.get_or_init(|| {
        let secret = generate_secret();
        debug!("keyed digest secret initialized");
        secret
    })
}

pub fn is_secret_initialized() -> bool {
    SHARED_SECRET.get().is_some()
}

/// `MD5(MD5(bytes) XOR secret)`.
pub fn keyed_digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let secret = shared_secret();
    let mut digest = hash_md5(bytes);
    for (d, s) in digest.iter_mut().zip(secret.iter()) {
        *d ^= s;
    }
    hash_md5(&digest)
}

/// Words collected for the secret, and how many of them came from real
/// entropy sources.
#[derive(Clone)]
struct EntropyPool {
    words: [u32; POOL_WORDS],
    filled: usize,
}

impl EntropyPool {
    fn new() -> Self {
        Self {
            words: [0; POOL_WORDS],
            filled: 0,
        }
    }

    fn push(&mut self, word: u32) -> bool {
        if self.filled == POOL_WORDS {
            return false;
        }
        self.words[self.filled] = word;
        self.filled += 1;
        true
    }

    fn remaining(&self) -> usize {
        POOL_WORDS - self.filled
    }

    /// XOR + rotate fold of the gathered words.
    fn seed(&self) -> u32 {
        self.words[..self.filled]
            .iter()
            .fold(0u32, |acc, w| (acc ^ w).rotate_left(1))
    }

    fn to_bytes(&self) -> [u8; POOL_WORDS * 4] {
        let mut out = [0u8; POOL_WORDS * 4];
        for (chunk, w) in out.chunks_exact_mut(4).zip(self.words.iter()) {
            chunk.copy_from_slice(&w.to_ne_bytes());
        }
        out
    }
}

fn generate_secret() -> [u8; DIGEST_LEN] {
    build_secret(gather_entropy(read_os_entropy))
}

/// Fills the pool from the wall clock, `read_os` (handed the pool and the
/// number of bytes still wanted, returning how many it supplied), the
/// process id and the user id.
fn gather_entropy<F>(read_os: F) -> EntropyPool
where
    F: FnOnce(&mut EntropyPool, usize) -> usize,
{
    let mut pool = EntropyPool::new();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    pool.push(secs as u32);
    pool.push((secs >> 32) as u32);
    pool.push(now.subsec_micros());
    pool.push(now.subsec_nanos());

    let want = pool.remaining() * 4;
    if read_os(&mut pool, want) == 0 {
        warn!("no OS entropy available; keyed digest secret falls back to time/pid/uid");
    }

    pool.push(std::process::id());
    if let Some(uid) = current_uid() {
        pool.push(uid);
    }
    pool
}

/// Pads the unfilled tail from a PRNG seeded with the fold, then digests
/// the whole pool.
fn build_secret(mut pool: EntropyPool) -> [u8; DIGEST_LEN] {
    let mut rng = StdRng::seed_from_u64(u64::from(pool.seed()));
    while pool.push(rng.next_u32()) {}
    hash_md5(&pool.to_bytes())
}

/// Reads up to `want` bytes from `/dev/random` without blocking, pushing
/// whole words into the pool. Returns the number of bytes read.
#[cfg(unix)]
fn read_os_entropy(pool: &mut EntropyPool, want: usize) -> usize {
    use std::fs::OpenOptions;
    use std::io::Read;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open("/dev/random")
    {
        Ok(f) => f,
        Err(e) => {
            debug!("cannot open /dev/random: {}", e);
            return 0;
        }
    };

    let mut buf = [0u8; POOL_WORDS * 4];
    let want = want.min(buf.len());
    let amt = match file.read(&mut buf[..want]) {
        Ok(n) => n,
        Err(e) => {
            debug!("non-blocking read of /dev/random failed: {}", e);
            0
        }
    };
    for chunk in buf[..amt].chunks_exact(4) {
        pool.push(u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    amt
}

#[cfg(not(unix))]
fn read_os_entropy(_pool: &mut EntropyPool, _want: usize) -> usize {
    0
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    // SAFETY: getuid has no preconditions and cannot fail.
    Some(unsafe { libc::getuid() })
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}
