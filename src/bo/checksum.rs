use xxhash_rust::xxh3::Xxh3;

use crate::bo::memory::MappedMemory;

/// Number of pseudo-randomly chosen bytes folded into one checksum.
pub(crate) const RANDOM_SAMPLES_COUNT: usize = 64;

const LCG_MUL: u32 = 1_103_515_245;
const LCG_INC: u32 = 12_345;

/// Deterministic sample positions inside a buffer of `size` bytes, driven by `seed`.
///
/// Two LCG steps per sample: the high half of the first and the high half of the second (shifted
/// down) form a 32-bit index.
pub(crate) fn sample_offsets(seed: u32, size: usize) -> impl Iterator<Item = usize> {
    let mut state = seed;
    (0..RANDOM_SAMPLES_COUNT).map(move |_| {
        state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        let hi = state & 0xFFFF_0000;
        state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        let lo = state >> 16;
        (hi | lo) as usize % size
    })
}

/// Hash of [`RANDOM_SAMPLES_COUNT`] bytes sampled from `memory[offset..offset + size]`.
///
/// Cheap enough to run every frame; detects a redraw of a buffer with high probability, never a
/// single changed pixel. Samples past the end of the mapping read as zero.
pub(crate) fn sample_checksum(memory: &MappedMemory, offset: usize, size: usize, seed: u32) -> u64 {
    if size == 0 {
        return 0;
    }
    let mut h = Xxh3::with_seed(u64::from(seed));
    memory.with_bytes(|bytes| {
        for idx in sample_offsets(seed, size) {
            let b = offset
                .checked_add(idx)
                .and_then(|at| bytes.get(at))
                .copied()
                .unwrap_or(0);
            h.update(&[b]);
        }
    });
    h.digest()
}

#[cfg(test)]
#[path = "../../tests/unit/bo/checksum.rs"]
mod tests;
