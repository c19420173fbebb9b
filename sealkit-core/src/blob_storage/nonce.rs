//! Sealed-mode nonce slot and its manager.
//!
//! Every sealed encryption must use a nonce that never repeats under the
//! device's sealing key, across the device's entire lifetime. The slot
//! persists two 12-byte values: `base`, drawn randomly on the first sealed
//! write and never rewritten, and `counter`, advanced before every
//! subsequent write. When the counter has traversed the full 2^96 cycle
//! back to or through `base`, the slot latches exhausted and sealing is
//! permanently refused; the latch is durable across restarts.
//!
//! The counter is treated as a 96-bit big-endian unsigned integer. The
//! advance step is 1, or 2 when a single payload spans at least 2^32
//! cipher blocks: GCM's internal block counter is 32 bits wide, so a
//! double step keeps adjacent encryptions from overlapping counter space.

use std::sync::{Arc, Mutex, PoisonError};

use super::crypto;
use super::envelope::NONCE_SIZE;
use super::platform::SecretStore;
use super::{StorageError, StorageResult};

/// Encoded size of the persistent slot: base(12) + counter(12) + flag(1).
pub const NONCE_SLOT_SIZE: usize = 2 * NONCE_SIZE + 1;

const COUNTER_MASK: u128 = (1 << 96) - 1;

/// Persistent sealed-mode nonce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSlot {
    /// First nonce ever emitted; the rollover fence. Never rewritten.
    pub base: [u8; NONCE_SIZE],
    /// Most recently emitted nonce.
    pub counter: [u8; NONCE_SIZE],
    /// Whether the counter has traversed its full cycle.
    pub exhausted: bool,
}

pub(crate) enum Advance {
    /// The advanced slot; its `counter` is the nonce to use.
    Next(NonceSlot),
    /// The slot with the exhausted latch set; must be persisted.
    Exhausted(NonceSlot),
}

impl NonceSlot {
    /// Creates a fresh slot from a random base nonce.
    ///
    /// The base doubles as the first emitted nonce, so a new slot starts
    /// with `counter == base`.
    #[must_use]
    pub fn initialize() -> Self {
        let mut base = [0u8; NONCE_SIZE];
        crypto::fill_random(&mut base);
        Self {
            base,
            counter: base,
            exhausted: false,
        }
    }

    /// Encodes the slot for persistence.
    #[must_use]
    pub fn encode(&self) -> [u8; NONCE_SLOT_SIZE] {
        let mut buf = [0u8; NONCE_SLOT_SIZE];
        buf[..NONCE_SIZE].copy_from_slice(&self.base);
        buf[NONCE_SIZE..2 * NONCE_SIZE].copy_from_slice(&self.counter);
        buf[2 * NONCE_SIZE] = u8::from(self.exhausted);
        buf
    }

    /// Decodes a persisted slot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Malformed`] if the record is not exactly
    /// [`NONCE_SLOT_SIZE`] bytes or carries an unknown flag value.
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != NONCE_SLOT_SIZE {
            return Err(StorageError::malformed(format!(
                "nonce slot is {} bytes, expected {NONCE_SLOT_SIZE}",
                bytes.len()
            )));
        }

        let exhausted = match bytes[2 * NONCE_SIZE] {
            0 => false,
            1 => true,
            flag => {
                return Err(StorageError::malformed(format!(
                    "nonce slot carries unknown exhaustion flag {flag:#04x}"
                )))
            }
        };

        let mut base = [0u8; NONCE_SIZE];
        base.copy_from_slice(&bytes[..NONCE_SIZE]);
        let mut counter = [0u8; NONCE_SIZE];
        counter.copy_from_slice(&bytes[NONCE_SIZE..2 * NONCE_SIZE]);

        Ok(Self {
            base,
            counter,
            exhausted,
        })
    }

    /// Computes the slot state after consuming a nonce for `payload_len`
    /// bytes of plaintext.
    pub(crate) fn advance(&self, payload_len: u64) -> Advance {
        let base = counter_to_u128(&self.base);
        let counter = counter_to_u128(&self.counter);

        // Nonces consumed since the base; wraps modulo 2^96.
        let used = counter.wrapping_sub(base) & COUNTER_MASK;
        let step = advance_step(payload_len);

        if used + step > COUNTER_MASK {
            Advance::Exhausted(Self {
                exhausted: true,
                ..*self
            })
        } else {
            Advance::Next(Self {
                counter: counter_from_u128((counter + step) & COUNTER_MASK),
                ..*self
            })
        }
    }
}

/// Serializes all sealed-mode nonce allocation for one device.
///
/// Holds an exclusive lock spanning read-slot, compute, persist, and emit,
/// so no two sealed writes can draw the same nonce. The advanced slot is
/// persisted durably before the nonce is handed out: a crash between the
/// slot write and the frame write only wastes a nonce, it can never reuse
/// one.
pub struct NonceManager<S: SecretStore> {
    secrets: Arc<S>,
    guard: Mutex<()>,
}

impl<S: SecretStore> NonceManager<S> {
    /// Creates a manager over the platform secret store.
    pub fn new(secrets: Arc<S>) -> Self {
        Self {
            secrets,
            guard: Mutex::new(()),
        }
    }

    /// Allocates a fresh nonce for a sealed write of `payload_len` bytes.
    ///
    /// The first allocation of a device's lifetime draws a random base and
    /// emits it; every later allocation advances the persistent counter
    /// and emits the advanced value.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NonceExhausted`] once the counter has traversed
    ///   its full cycle; terminal across restarts.
    /// - Secret store errors from reading or persisting the slot.
    pub fn next_nonce(&self, payload_len: u64) -> StorageResult<[u8; NONCE_SIZE]> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(slot) = self.secrets.read_nonce_slot()? else {
            let slot = NonceSlot::initialize();
            self.secrets.write_nonce_slot(&slot)?;
            return Ok(slot.counter);
        };

        if slot.exhausted {
            return Err(StorageError::NonceExhausted);
        }

        match slot.advance(payload_len) {
            Advance::Next(next) => {
                self.secrets.write_nonce_slot(&next)?;
                Ok(next.counter)
            }
            Advance::Exhausted(latched) => {
                log::warn!("sealed-write nonce counter exhausted; latching slot");
                self.secrets.write_nonce_slot(&latched)?;
                Err(StorageError::NonceExhausted)
            }
        }
    }
}

fn counter_to_u128(bytes: &[u8; NONCE_SIZE]) -> u128 {
    let mut wide = [0u8; 16];
    wide[4..].copy_from_slice(bytes);
    u128::from_be_bytes(wide)
}

fn counter_from_u128(value: u128) -> [u8; NONCE_SIZE] {
    let wide = value.to_be_bytes();
    let mut out = [0u8; NONCE_SIZE];
    out.copy_from_slice(&wide[4..]);
    out
}

fn advance_step(payload_len: u64) -> u128 {
    let blocks = u128::from(payload_len).div_ceil(16);
    if blocks < 1 << 32 {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::super::platform::MemorySecretStore;
    use super::*;

    fn slot(base: [u8; 12], counter: [u8; 12]) -> NonceSlot {
        NonceSlot {
            base,
            counter,
            exhausted: false,
        }
    }

    fn next(slot: &NonceSlot, payload_len: u64) -> NonceSlot {
        match slot.advance(payload_len) {
            Advance::Next(next) => next,
            Advance::Exhausted(_) => panic!("unexpected exhaustion"),
        }
    }

    #[test]
    fn test_counter_conversion_is_big_endian() {
        let mut bytes = [0u8; 12];
        bytes[10] = 0x01;
        bytes[11] = 0x02;
        assert_eq!(counter_to_u128(&bytes), 0x0102);
        assert_eq!(counter_from_u128(0x0102), bytes);
    }

    #[test]
    fn test_advance_step_rule() {
        assert_eq!(advance_step(1), 1);
        assert_eq!(advance_step(16), 1);
        assert_eq!(advance_step(17), 1);
        // 2^36 bytes spans exactly 2^32 blocks
        assert_eq!(advance_step(1 << 36), 2);
        assert_eq!(advance_step((1 << 36) - 16), 1);
        assert_eq!(advance_step(u64::MAX), 2);
    }

    #[test]
    fn test_advance_increments_with_carry() {
        let mut counter = [0u8; 12];
        counter[11] = 0xFF;
        let advanced = next(&slot([0u8; 12], counter), 16);

        let mut expected = [0u8; 12];
        expected[10] = 0x01;
        assert_eq!(advanced.counter, expected);
        assert_eq!(advanced.base, [0u8; 12]);
    }

    #[test]
    fn test_advance_detects_rollover_at_cycle_end() {
        let mut counter = [0xFF; 12];
        counter[11] = 0xFE;
        let s = slot([0u8; 12], counter);

        // One nonce left in the cycle.
        let advanced = next(&s, 16);
        assert_eq!(advanced.counter, [0xFF; 12]);

        // The cycle is spent.
        match advanced.advance(16) {
            Advance::Exhausted(latched) => {
                assert!(latched.exhausted);
                assert_eq!(latched.counter, [0xFF; 12]);
            }
            Advance::Next(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn test_double_step_can_exhaust_from_penultimate_nonce() {
        let mut counter = [0xFF; 12];
        counter[11] = 0xFE;
        // A payload of 2^36 bytes steps by 2, which would land on the base.
        match slot([0u8; 12], counter).advance(1 << 36) {
            Advance::Exhausted(latched) => assert!(latched.exhausted),
            Advance::Next(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn test_advance_with_counter_wrapped_below_base() {
        // Counter numerically below base: most of the cycle is spent.
        let mut base = [0u8; 12];
        base[11] = 0x05;
        let mut counter = [0u8; 12];
        counter[11] = 0x03;
        let advanced = next(&slot(base, counter), 16);
        assert_eq!(advanced.counter[11], 0x04);

        // One more step reaches the base: exhausted.
        match advanced.advance(16) {
            Advance::Exhausted(latched) => assert!(latched.exhausted),
            Advance::Next(_) => panic!("expected exhaustion"),
        }
    }

    #[test]
    fn test_slot_encode_decode_roundtrip() {
        let mut s = NonceSlot::initialize();
        s.exhausted = true;
        assert_eq!(NonceSlot::decode(&s.encode()).unwrap(), s);

        let s = NonceSlot::initialize();
        let encoded = s.encode();
        assert_eq!(&encoded[..12], &s.base);
        assert_eq!(&encoded[12..24], &s.counter);
        assert_eq!(encoded[24], 0);
    }

    #[test]
    fn test_slot_decode_rejects_bad_records() {
        assert!(matches!(
            NonceSlot::decode(&[0u8; NONCE_SLOT_SIZE - 1]),
            Err(StorageError::Malformed { .. })
        ));
        let mut encoded = NonceSlot::initialize().encode();
        encoded[24] = 7;
        assert!(matches!(
            NonceSlot::decode(&encoded),
            Err(StorageError::Malformed { .. })
        ));
    }

    #[test]
    fn test_manager_initializes_slot_on_first_use() {
        let secrets = Arc::new(MemorySecretStore::new());
        let manager = NonceManager::new(Arc::clone(&secrets));

        let nonce = manager.next_nonce(16).unwrap();
        let slot = secrets.read_nonce_slot().unwrap().unwrap();
        assert_eq!(slot.base, nonce);
        assert_eq!(slot.counter, nonce);
        assert!(!slot.exhausted);
    }

    #[test]
    fn test_manager_advances_monotonically() {
        let secrets = Arc::new(MemorySecretStore::new());
        let manager = NonceManager::new(Arc::clone(&secrets));

        let first = manager.next_nonce(16).unwrap();
        let second = manager.next_nonce(32).unwrap();
        assert_eq!(counter_to_u128(&second), counter_to_u128(&first) + 1);

        let slot = secrets.read_nonce_slot().unwrap().unwrap();
        assert_eq!(slot.counter, second);
        assert_eq!(slot.base, first);
    }

    #[test]
    fn test_manager_emits_pairwise_distinct_nonces() {
        let secrets = Arc::new(MemorySecretStore::new());
        let manager = NonceManager::new(secrets);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(manager.next_nonce(1024).unwrap()));
        }
    }

    #[test]
    fn test_manager_latches_exhaustion_durably() {
        let secrets = Arc::new(MemorySecretStore::new());
        let mut counter = [0xFF; 12];
        counter[11] = 0xFE;
        secrets
            .write_nonce_slot(&slot([0u8; 12], counter))
            .unwrap();

        let manager = NonceManager::new(Arc::clone(&secrets));
        assert_eq!(manager.next_nonce(16).unwrap(), [0xFF; 12]);
        assert!(matches!(
            manager.next_nonce(16),
            Err(StorageError::NonceExhausted)
        ));

        // The latch is in the persistent slot, not in memory.
        assert!(secrets.read_nonce_slot().unwrap().unwrap().exhausted);
        let fresh_manager = NonceManager::new(secrets);
        assert!(matches!(
            fresh_manager.next_nonce(16),
            Err(StorageError::NonceExhausted)
        ));
    }
}
