use rand_core::{OsRng, RngCore};

use crate::error::{AccountError, AccountResult};

/// Identifier symbols: `a-z A-Z 0-9` without the easily confused `0 O l I 1`.
pub const ID_ALPHABET: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const ID_ALPHABET_LEN: usize = ID_ALPHABET.len();

/// Identifier length used when the environment does not set one.
/// 57^5 is roughly 6e8 identifiers.
pub const DEFAULT_ID_LENGTH: usize = 5;

/// Random bytes at or above this value are rejected so every symbol is
/// equally likely.
const ACCEPT_BELOW: u16 = 256 - (256 % ID_ALPHABET_LEN as u16);

/// Mints random account identifiers from the OS CSPRNG.
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    length: usize,
}

impl IdGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// A fresh identifier. Uniqueness is the caller's job.
    ///
    /// Fails with [`AccountError::RandomSource`] if the OS random source is
    /// unavailable; that is fatal and must not be retried.
    pub fn generate(&self) -> AccountResult<String> {
        self.generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + ?Sized>(&self, rng: &mut R) -> AccountResult<String> {
        let mut id = String::with_capacity(self.length);
        let mut buf = [0u8; 64];

        while id.len() < self.length {
            rng.try_fill_bytes(&mut buf)
                .map_err(|e| AccountError::RandomSource(e.to_string()))?;

            for &b in &buf {
                if id.len() == self.length {
                    break;
                }
                if u16::from(b) < ACCEPT_BELOW {
                    id.push(ID_ALPHABET[usize::from(b) % ID_ALPHABET_LEN] as char);
                }
            }
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::num::NonZeroU32;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
            Err(NonZeroU32::new(rand_core::Error::CUSTOM_START).unwrap().into())
        }
    }

    /// Yields every byte value in turn, so rejected bytes show up.
    struct CountingRng(u8);

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            u32::from(self.next_byte())
        }

        fn next_u64(&mut self) -> u64 {
            u64::from(self.next_byte())
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = self.next_byte();
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    impl CountingRng {
        fn next_byte(&mut self) -> u8 {
            let b = self.0;
            self.0 = self.0.wrapping_add(1);
            b
        }
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_symbols() {
        assert_eq!(ID_ALPHABET_LEN, 57);
        for c in [b'0', b'O', b'l', b'I', b'1'] {
            assert!(!ID_ALPHABET.contains(&c), "{} must be excluded", c as char);
        }
        let unique: HashSet<_> = ID_ALPHABET.iter().collect();
        assert_eq!(unique.len(), ID_ALPHABET_LEN);
    }

    #[test]
    fn test_generated_ids_use_alphabet_only() {
        let ids = IdGenerator::new(32);
        for _ in 0..200 {
            let id = ids.generate().unwrap();
            assert_eq!(id.len(), 32);
            assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)), "bad id {id}");
        }
    }

    #[test]
    fn test_rejection_sampling_is_uniform_over_a_full_cycle() {
        // One pass over 0..=255 accepts exactly ACCEPT_BELOW bytes, which
        // covers every symbol the same number of times.
        let ids = IdGenerator::new(ACCEPT_BELOW as usize);
        let id = ids.generate_with(&mut CountingRng(0)).unwrap();

        let mut counts = [0usize; 256];
        for b in id.bytes() {
            counts[usize::from(b)] += 1;
        }
        let per_symbol = ACCEPT_BELOW as usize / ID_ALPHABET_LEN;
        for &c in ID_ALPHABET {
            assert_eq!(counts[usize::from(c)], per_symbol);
        }
    }

    #[test]
    fn test_random_source_failure_is_fatal() {
        let err = IdGenerator::new(8).generate_with(&mut BrokenRng).unwrap_err();
        assert!(matches!(err, AccountError::RandomSource(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_zero_length_is_empty() {
        assert_eq!(IdGenerator::new(0).generate().unwrap(), "");
    }
}
