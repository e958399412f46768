/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photon_counts_are_grouped() {
        assert_eq!(group_digits(10_000_000_u64), "10,000,000");
        assert_eq!(group_digits(999), "999");
    }
}
