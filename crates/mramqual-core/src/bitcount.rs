//! Failed bit counting against error budgets

use crate::device::EccMode;
use crate::error::{Error, Result};

/// Failed bit tolerance for one pattern pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    /// Failed bits allowed in a single word
    pub per_word_max: u32,
    /// Cumulative failed bits allowed over the pass
    pub per_region_max: u32,
}

impl ErrorBudget {
    /// Zero tolerance, used whenever ECC is enabled
    pub const ZERO: Self = Self {
        per_word_max: 0,
        per_region_max: 0,
    };

    /// Default main array budget
    pub const MAIN: Self = Self {
        per_word_max: 1,
        per_region_max: 101,
    };

    /// Default NVR budget
    pub const NVR: Self = Self {
        per_word_max: 1,
        per_region_max: 2,
    };

    /// Create a budget
    pub const fn new(per_word_max: u32, per_region_max: u32) -> Self {
        Self {
            per_word_max,
            per_region_max,
        }
    }
}

/// Failed bits per byte position: `popcount(received ^ expected)`
pub fn failed_bits_per_byte<'a>(
    received: &'a [u8],
    expected: &'a [u8],
) -> impl Iterator<Item = u32> + 'a {
    received
        .iter()
        .zip(expected)
        .map(|(r, e)| (r ^ e).count_ones())
}

/// Total failed bits between two buffers (symmetric)
pub fn failed_bits(a: &[u8], b: &[u8]) -> u32 {
    failed_bits_per_byte(a, b).sum()
}

/// Running failed bit counter for one pattern pass
#[derive(Debug, Clone)]
pub struct BitErrorCounter {
    budget: ErrorBudget,
    total: u32,
    words: u32,
}

impl BitErrorCounter {
    /// Create a counter with the given budget and a zero total
    pub fn new(budget: ErrorBudget) -> Self {
        Self {
            budget,
            total: 0,
            words: 0,
        }
    }

    /// Create a counter for a pass run with the given ECC mode
    ///
    /// With ECC on the device already corrects single-bit errors, so any
    /// remaining failed bit is fatal.
    pub fn for_ecc(budget: ErrorBudget, ecc: EccMode) -> Self {
        if ecc.is_on() {
            Self::new(ErrorBudget::ZERO)
        } else {
            Self::new(budget)
        }
    }

    /// Budget this counter enforces
    pub fn budget(&self) -> ErrorBudget {
        self.budget
    }

    /// Failed bits counted so far
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Words checked so far
    pub fn words(&self) -> u32 {
        self.words
    }

    /// Count one word and enforce both budgets
    ///
    /// The per-word limit is checked before the cumulative one.
    pub fn check_word(&mut self, received: &[u8], expected: &[u8]) -> Result<u32> {
        let bits = failed_bits(received, expected);
        let word = self.words;
        self.words += 1;
        self.total = self.total.saturating_add(bits);

        if bits > self.budget.per_word_max {
            return Err(Error::WordBudgetExceeded {
                word,
                failed_bits: bits,
            });
        }
        if self.total > self.budget.per_region_max {
            return Err(Error::RegionBudgetExceeded {
                failed_bits: self.total,
                budget: self.budget.per_region_max,
            });
        }
        Ok(bits)
    }

    /// Check a buffer word by word, stopping at the first violation
    ///
    /// Returns the failed bits found in this buffer.
    pub fn check_region(
        &mut self,
        received: &[u8],
        expected: &[u8],
        word_size: usize,
    ) -> Result<u32> {
        let mut bits = 0;
        for (r, e) in received
            .chunks(word_size)
            .zip(expected.chunks(word_size))
        {
            bits += self.check_word(r, e)?;
        }
        Ok(bits)
    }

    /// Accumulate failed bits without enforcing any budget
    pub fn count_region(&mut self, received: &[u8], expected: &[u8]) -> u32 {
        let bits = failed_bits(received, expected);
        self.total = self.total.saturating_add(bits);
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expected/received pair for `words` 16-byte words with one flipped
    /// bit in each of the first `errors` words
    fn single_bit_errors(words: usize, errors: usize) -> ([u8; 4096], [u8; 4096]) {
        let expected = [0x55u8; 4096];
        let mut received = expected;
        for w in 0..errors.min(words) {
            received[w * 16 + 3] ^= 0x08;
        }
        (received, expected)
    }

    #[test]
    fn test_failed_bits_symmetric() {
        let a = [0x00u8, 0xFF, 0x0F, 0x81];
        let b = [0x01u8, 0x00, 0xF0, 0x81];
        assert_eq!(failed_bits(&a, &b), 1 + 8 + 8);
        assert_eq!(failed_bits(&a, &b), failed_bits(&b, &a));
        assert_eq!(failed_bits(&a, &a), 0);
    }

    #[test]
    fn test_failed_bits_per_byte() {
        let counts: heapless::Vec<u32, 4> =
            failed_bits_per_byte(&[0xFF, 0x00, 0xAA], &[0x00, 0x00, 0x55]).collect();
        assert_eq!(&counts[..], &[8, 0, 8]);
    }

    #[test]
    fn test_region_budget_edge() {
        // 101 single-bit words pass
        let (received, expected) = single_bit_errors(256, 101);
        let mut counter = BitErrorCounter::new(ErrorBudget::MAIN);
        assert_eq!(counter.check_region(&received, &expected, 16), Ok(101));
        assert_eq!(counter.total(), 101);

        // 102 fail on the word that pushes the total over
        let (received, expected) = single_bit_errors(256, 102);
        let mut counter = BitErrorCounter::new(ErrorBudget::MAIN);
        assert_eq!(
            counter.check_region(&received, &expected, 16),
            Err(Error::RegionBudgetExceeded {
                failed_bits: 102,
                budget: 101
            })
        );
        assert_eq!(counter.words(), 102);
    }

    #[test]
    fn test_word_budget_checked_first() {
        let expected = [0xFFu8; 32];
        let mut received = expected;
        received[20] = 0xFC;
        // Region budget of 1 would also trip; the word error wins
        let mut counter = BitErrorCounter::new(ErrorBudget::new(1, 1));
        assert_eq!(
            counter.check_region(&received, &expected, 16),
            Err(Error::WordBudgetExceeded {
                word: 1,
                failed_bits: 2
            })
        );
    }

    #[test]
    fn test_total_accumulates_across_regions() {
        let (received, expected) = single_bit_errors(256, 2);
        let mut counter = BitErrorCounter::new(ErrorBudget::NVR);
        assert_eq!(counter.check_region(&received, &expected, 16), Ok(2));
        assert!(matches!(
            counter.check_region(&received, &expected, 16),
            Err(Error::RegionBudgetExceeded { failed_bits: 3, .. })
        ));
    }

    #[test]
    fn test_ecc_forces_zero_budget() {
        let counter = BitErrorCounter::for_ecc(ErrorBudget::MAIN, EccMode::On);
        assert_eq!(counter.budget(), ErrorBudget::ZERO);
        let counter = BitErrorCounter::for_ecc(ErrorBudget::MAIN, EccMode::Off);
        assert_eq!(counter.budget(), ErrorBudget::MAIN);

        let mut counter = BitErrorCounter::for_ecc(ErrorBudget::MAIN, EccMode::On);
        let (received, expected) = single_bit_errors(256, 1);
        assert!(counter.check_region(&received, &expected, 16).is_err());
    }

    #[test]
    fn test_count_region_never_fails() {
        let received = [0x00u8; 64];
        let expected = [0xFFu8; 64];
        let mut counter = BitErrorCounter::new(ErrorBudget::ZERO);
        assert_eq!(counter.count_region(&received, &expected), 512);
        assert_eq!(counter.count_region(&received, &expected), 512);
        assert_eq!(counter.total(), 1024);
    }
}
