use rand::Rng;

/// Symbols used for room codes and admin secrets.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const ROOM_CODE_LEN: usize = 4;
pub const ADMIN_SECRET_LEN: usize = 6;

/// Draw `len` symbols uniformly from [`CODE_ALPHABET`].
///
/// `rand::rng()` is a thread-local CSPRNG seeded from the OS, so the
/// output is suitable for the admin secret as well as the public code.
fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a 4-character room code. Uniqueness is the caller's job.
pub fn generate_room_code() -> String {
    random_code(ROOM_CODE_LEN)
}

/// Generate a room code that `taken` rejects, retrying on collision.
pub fn generate_unique_room_code(taken: impl Fn(&str) -> bool) -> String {
    loop {
        let code = generate_room_code();
        if !taken(&code) {
            return code;
        }
        tracing::debug!(code = %code, "Room code collision, retrying");
    }
}

/// Generate a 6-character admin secret. Never checked for collision.
pub fn generate_admin_secret() -> String {
    random_code(ADMIN_SECRET_LEN)
}

/// Compare two secrets without short-circuiting on the first mismatching
/// byte. Lengths are not hidden.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn has_code_shape(code: &str) -> bool {
        code.len() == ROOM_CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
    }

    #[test]
    fn room_code_format() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert!(has_code_shape(&code), "Invalid room code: {code}");
        }
    }

    #[test]
    fn admin_secret_format() {
        let secret = generate_admin_secret();
        assert_eq!(secret.len(), ADMIN_SECRET_LEN);
        assert!(secret.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"K3X9QZ", b"K3X9QZ"));
        assert!(!constant_time_eq(b"K3X9QZ", b"K3X9QA"));
        assert!(!constant_time_eq(b"K3X9QZ", b"K3X9Q"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn unique_code_skips_taken() {
        let mut taken = HashSet::new();
        for _ in 0..500 {
            let code = generate_unique_room_code(|c| taken.contains(c));
            assert!(taken.insert(code));
        }
        assert_eq!(taken.len(), 500);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn generated_codes_pairwise_distinct(n in 1usize..300) {
                let mut live: HashSet<String> = HashSet::new();
                for _ in 0..n {
                    let code = generate_unique_room_code(|c| live.contains(c));
                    prop_assert!(has_code_shape(&code));
                    prop_assert!(live.insert(code));
                }
                prop_assert_eq!(live.len(), n);
            }
        }
    }
}
