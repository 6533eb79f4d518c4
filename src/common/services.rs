use rand::Rng;
use rand::distr::Alphanumeric;

/// Generates an alphanumeric string of the given length from a
/// cryptographically secure RNG. Used for instance passwords, admin
/// tokens, and other secrets minted at runtime rather than configured.
pub(crate) fn generate_string_csprng(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_requested_length() {
        assert_eq!(generate_string_csprng(40).len(), 40);
    }

    #[test]
    fn is_alphanumeric() {
        let s = generate_string_csprng(64);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn is_not_constant() {
        assert_ne!(generate_string_csprng(32), generate_string_csprng(32));
    }
}
