pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 512;

/// hkdf info used to derive the token signing key from the master key
pub const TOKENS_KEY_INFO: &[u8; 6] = b"tokens";

pub fn password_valid(given: &str) -> bool {
    let mut char_count = 0;

    for ch in given.chars() {
        if ch.is_control() {
            return false;
        }

        char_count += 1;

        if char_count > MAX_PASSWORD_CHARS {
            return false;
        }
    }

    char_count >= MIN_PASSWORD_CHARS
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_validation() {
        let valid = vec![
            String::from("Secret123"),
            String::from("Sharper Snowboard Equinox Faucet Monoxide0"),
            String::from("ünïcødé-pässwörd"),
        ];

        for test in valid {
            assert!(password_valid(&test), "valid string failed {:?}", test);
        }

        let invalid = vec![
            String::from("   test  \u{0000} other stuff"),
            crate::string_to_len(MIN_PASSWORD_CHARS - 1),
            crate::string_to_len(MAX_PASSWORD_CHARS + 1),
        ];

        for test in invalid {
            assert!(!password_valid(&test), "invalid string failed {:?}", test);
        }
    }
}
