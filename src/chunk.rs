//! Test payload generation.
//!
//! Every chunk is a run of alphanumeric bytes whose first four bytes are
//! overwritten with a little-endian sequence number. The header makes chunks
//! easy to spot on a logic analyzer trace and keeps reused payloads distinct.

use crate::config::PayloadMode;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of the sequence header at the start of every chunk.
pub const HEADER_LEN: usize = 4;

/// One unit of transmitted test data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence: u32,
    pub bytes: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builds a chunk of `length` random alphanumeric bytes stamped with `sequence`.
///
/// If `length` is shorter than the header only the leading header bytes fit.
///
/// # Examples
///
/// ```
/// use uartperf::chunk::generate;
///
/// let mut rng = rand::thread_rng();
/// let chunk = generate(&mut rng, 16, 7);
/// assert_eq!(chunk.len(), 16);
/// assert_eq!(&chunk.as_bytes()[..4], &7u32.to_le_bytes());
/// assert!(chunk.as_bytes()[4..].iter().all(u8::is_ascii_alphanumeric));
/// ```
pub fn generate<R: Rng + ?Sized>(rng: &mut R, length: usize, sequence: u32) -> Chunk {
    let mut bytes: Vec<u8> = rng.sample_iter(Alphanumeric).take(length).collect();
    stamp(&mut bytes, sequence);
    Chunk { sequence, bytes }
}

fn stamp(bytes: &mut [u8], sequence: u32) {
    let header = sequence.to_le_bytes();
    let n = bytes.len().min(HEADER_LEN);
    bytes[..n].copy_from_slice(&header[..n]);
}

/// Produces consecutive chunks with a wrapping sequence counter.
#[derive(Debug)]
pub struct ChunkGenerator {
    length: usize,
    mode: PayloadMode,
    rng: StdRng,
    template: Option<Vec<u8>>,
    next_sequence: u32,
}

impl ChunkGenerator {
    pub fn new(length: usize, mode: PayloadMode, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            length,
            mode,
            rng,
            template: None,
            next_sequence: 0,
        }
    }

    pub fn chunk_len(&self) -> usize {
        self.length
    }

    /// Number of chunks handed out so far (modulo 2^32).
    pub fn sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn next_chunk(&mut self) -> Chunk {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        match self.mode {
            PayloadMode::Fresh => generate(&mut self.rng, self.length, sequence),
            PayloadMode::Reuse => {
                let length = self.length;
                let rng = &mut self.rng;
                let template = self
                    .template
                    .get_or_insert_with(|| generate(rng, length, 0).bytes);
                let mut bytes = template.clone();
                stamp(&mut bytes, sequence);
                Chunk { sequence, bytes }
            }
        }
    }
}
