//! Deterministic PCG32 generator.
//!
//! PCG-XSH-RR with 64-bit state and a fixed odd increment: the reference
//! 32-bit output member of the PCG family. Identical seeds produce
//! identical sequences across every operation, which is what makes whole
//! scenario runs reproducible from one `u64`.

/// The PCG default multiplier.
const MULTIPLIER: u64 = 6364136223846793005;

/// The PCG default stream; shifted odd per the reference seeding.
const DEFAULT_STREAM: u64 = 1442695040888963407;

/// 32-bit PCG generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    increment: u64,
}

impl Pcg32 {
    /// Seed with the reference PCG initialization sequence.
    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: 0,
            increment: (DEFAULT_STREAM << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(seed);
        rng.next_u32();
        rng
    }

    /// Next 32-bit output (XSH-RR permutation of the old state).
    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(MULTIPLIER).wrapping_add(self.increment);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Two 32-bit draws; the first fills the high word.
    pub fn next_u64(&mut self) -> u64 {
        let high = self.next_u32() as u64;
        let low = self.next_u32() as u64;
        (high << 32) | low
    }

    /// Uniform-ish draw in `[min, max]` inclusive (modulo reduction).
    pub fn next_range(&mut self, min: u64, max: u64) -> u64 {
        assert!(min <= max, "inverted range [{min}, {max}]");
        match (max - min).checked_add(1) {
            Some(span) => min + self.next_u64() % span,
            // Full u64 range: every draw is already in range.
            None => self.next_u64(),
        }
    }

    /// Bernoulli draw by thresholding one 32-bit output against
    /// `⌊probability · 2³²⌋`.
    pub fn next_bool(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability {probability} outside [0, 1]"
        );
        let threshold = (probability * 4_294_967_296.0) as u64;
        (self.next_u32() as u64) < threshold
    }

    /// Fill a byte slice from successive 32-bit draws (little-endian).
    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    /// Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_range(0, i as u64) as usize;
            items.swap(i, j);
        }
    }
}
