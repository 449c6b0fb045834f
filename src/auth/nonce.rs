use chrono::Utc;
use std::fmt;
use std::sync::Mutex;

const COUNTER_MODULUS: u32 = 10_000;

/// Single-use request token: wall-clock millis followed by a 5-digit rolling counter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nonce(String);

impl Nonce {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct NonceState {
    last_millis: i64,
    counter: u32,
}

/// Produces strictly increasing nonces for one API key.
///
/// Every nonce has the same width for a given millisecond digit count, so string
/// order and numeric order agree. Calls within the same millisecond are told apart
/// by the counter; a clock stepping backwards reuses the last seen millisecond.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    state: Mutex<NonceState>,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Nonce {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_millis: i64) -> Nonce {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.counter = (state.counter + 1) % COUNTER_MODULUS;
        state.last_millis = state.last_millis.max(now_millis);
        Nonce(format!("{}{:05}", state.last_millis, state.counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nonce_format() {
        let generator = NonceGenerator::new();
        let nonce = generator.next_at(1_700_000_000_123);
        assert_eq!(nonce.as_str(), "170000000012300001");
    }

    #[test]
    fn test_same_millisecond_nonces_are_distinct_and_increasing() {
        let generator = NonceGenerator::new();
        let nonces: Vec<Nonce> = (0..5000).map(|_| generator.next_at(1_700_000_000_000)).collect();

        let unique: HashSet<&Nonce> = nonces.iter().collect();
        assert_eq!(unique.len(), nonces.len());
        assert!(nonces.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_counter_wraps() {
        let generator = NonceGenerator::new();
        let mut last = generator.next_at(1);
        for _ in 0..COUNTER_MODULUS - 1 {
            last = generator.next_at(2);
        }
        assert_eq!(last.as_str(), "200000");
    }

    #[test]
    fn test_clock_going_backwards_stays_non_decreasing() {
        let generator = NonceGenerator::new();
        let first = generator.next_at(1_700_000_000_500);
        let second = generator.next_at(1_700_000_000_100);
        assert!(second > first);
        assert!(second.as_str().starts_with("1700000000500"));
    }

    #[test]
    fn test_live_clock_nonces_are_distinct() {
        let generator = NonceGenerator::new();
        let nonces: HashSet<Nonce> = (0..2000).map(|_| generator.next()).collect();
        assert_eq!(nonces.len(), 2000);
    }
}
