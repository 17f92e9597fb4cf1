//! Chronologically ordered unique keys for append-only collections.
//!
//! A push id is 20 characters: 8 characters of millisecond timestamp followed
//! by 12 random characters, both drawn from an alphabet whose ASCII order
//! matches its numeric order. Ids therefore sort by creation time. Ids
//! minted within the same millisecond reuse the previous random part plus
//! one, so they still sort in creation order and never collide within one
//! generator.
use std::sync::{Mutex, PoisonError};

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Length of every generated id.
pub const PUSH_ID_LEN: usize = TIME_CHARS + RANDOM_CHARS;

#[derive(Debug, Default)]
struct State {
    last_ms: i64,
    last_random: [u8; RANDOM_CHARS],
}

/// Thread-safe push id generator.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<State>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints an id for the current wall-clock time.
    pub fn next_id(&self) -> String {
        self.next_id_at(chrono::Utc::now().timestamp_millis())
    }

    /// Mints an id for `now_ms`. A clock that steps backwards is clamped to
    /// the last time seen so ids stay ordered.
    pub fn next_id_at(&self, now_ms: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut now = now_ms.max(state.last_ms);
        if now == state.last_ms && state.last_ms != 0 {
            if !increment(&mut state.last_random) {
                // Random part wrapped around; move to the next millisecond.
                now += 1;
                state.last_random = random_part();
            }
        } else {
            state.last_random = random_part();
        }
        state.last_ms = now;

        let mut id = String::with_capacity(PUSH_ID_LEN);
        let mut time_chars = [0u8; TIME_CHARS];
        let mut ts = now.max(0) as u64;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(ts % 64) as usize];
            ts /= 64;
        }
        id.extend(time_chars.iter().map(|&b| char::from(b)));
        id.extend(
            state
                .last_random
                .iter()
                .map(|&i| char::from(PUSH_CHARS[usize::from(i)])),
        );
        id
    }
}

fn random_part() -> [u8; RANDOM_CHARS] {
    let mut out = [0u8; RANDOM_CHARS];
    for slot in &mut out {
        *slot = fastrand::u8(0..64);
    }
    out
}

/// Adds one to the base-64 number in `digits`. Returns false on overflow.
fn increment(digits: &mut [u8; RANDOM_CHARS]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_have_fixed_length_and_alphabet() {
        let gen = PushIdGenerator::new();
        let id = gen.next_id();
        assert_eq!(id.len(), PUSH_ID_LEN);
        assert!(id.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn ids_in_same_millisecond_are_ordered_and_unique() {
        let gen = PushIdGenerator::new();
        let ids: Vec<String> = (0..500).map(|_| gen.next_id_at(1_700_000_000_000)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn later_time_sorts_after() {
        let gen = PushIdGenerator::new();
        let a = gen.next_id_at(1_000);
        let b = gen.next_id_at(2_000);
        assert!(a < b);
    }

    #[test]
    fn backwards_clock_keeps_order() {
        let gen = PushIdGenerator::new();
        let a = gen.next_id_at(5_000);
        let b = gen.next_id_at(4_000);
        assert!(a < b);
    }

    #[test]
    fn increment_carries() {
        let mut digits = [0u8; RANDOM_CHARS];
        digits[RANDOM_CHARS - 1] = 63;
        assert!(increment(&mut digits));
        assert_eq!(digits[RANDOM_CHARS - 1], 0);
        assert_eq!(digits[RANDOM_CHARS - 2], 1);

        let mut full = [63u8; RANDOM_CHARS];
        assert!(!increment(&mut full));
    }
}
