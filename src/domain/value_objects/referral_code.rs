//! Referral code value object
//!
//! Codes look like `REF-<NAME>-<DIGITS>` where `<NAME>` is up to six uppercased
//! alphanumeric characters taken from the customer's display name and
//! `<DIGITS>` is four random decimal digits, e.g. `REF-ALICE-0427`.

use rand::Rng;

pub const CODE_PREFIX: &str = "REF";
const NAME_PART_MAX_LEN: usize = 6;
const RANDOM_DIGITS: usize = 4;
/// Used in place of a blank display name
const BLANK_NAME: &str = "CLIENT";
/// Used when the display name has no alphanumeric character at all
const UNKNOWN_NAME_PART: &str = "UNK";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Derive the name segment of a code from a display name
    pub fn name_part(display_name: &str) -> String {
        let name = if display_name.is_empty() {
            BLANK_NAME
        } else {
            display_name
        };

        let part: String = name
            .to_uppercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .take(NAME_PART_MAX_LEN)
            .collect();

        if part.is_empty() {
            UNKNOWN_NAME_PART.to_string()
        } else {
            part
        }
    }

    /// Build a candidate code; uniqueness is the caller's concern
    pub fn generate<R: Rng>(display_name: &str, rng: &mut R) -> Self {
        let digits: u32 = rng.gen_range(0..10u32.pow(RANDOM_DIGITS as u32));
        ReferralCode(format!(
            "{}-{}-{:0width$}",
            CODE_PREFIX,
            Self::name_part(display_name),
            digits,
            width = RANDOM_DIGITS
        ))
    }

    /// Parse and validate a code typed in by a user
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 3 || parts[0] != CODE_PREFIX {
            return Err(format!("Referral code must look like REF-NAME-0000: {}", value));
        }

        let name_len = parts[1].chars().count();
        if name_len == 0
            || name_len > NAME_PART_MAX_LEN
            || !parts[1].chars().all(char::is_alphanumeric)
        {
            return Err(format!("Invalid name segment in referral code: {}", value));
        }

        if parts[2].len() != RANDOM_DIGITS || !parts[2].chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid digit segment in referral code: {}", value));
        }

        Ok(ReferralCode(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_name_part_truncates_and_uppercases() {
        assert_eq!(ReferralCode::name_part("Alice"), "ALICE");
        assert_eq!(ReferralCode::name_part("Jean-Pierre Dupont"), "JEANPI");
        assert_eq!(ReferralCode::name_part("o'neil 42"), "ONEIL4");
    }

    #[test]
    fn test_name_part_fallbacks() {
        assert_eq!(ReferralCode::name_part(""), "CLIENT");
        assert_eq!(ReferralCode::name_part("!!! ---"), "UNK");
        assert_eq!(ReferralCode::name_part("   "), "UNK");
    }

    #[test]
    fn test_generated_codes_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        for name in ["Alice", "", "***", "Zoë Kravitz", "Bob 2"] {
            let code = ReferralCode::generate(name, &mut rng);
            assert!(
                ReferralCode::parse(code.as_str()).is_ok(),
                "generated code {} should be valid",
                code
            );
        }
    }

    #[test]
    fn test_generated_code_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        let code = ReferralCode::generate("Alice", &mut rng);
        assert!(code.as_str().starts_with("REF-ALICE-"));
        assert_eq!(code.as_str().len(), "REF-ALICE-".len() + 4);
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        assert!(ReferralCode::parse("REF-ALICE-12345").is_err());
        assert!(ReferralCode::parse("REF-ALICE-12a4").is_err());
        assert!(ReferralCode::parse("REF--1234").is_err());
        assert!(ReferralCode::parse("REF-TOOLONGNAME-1234").is_err());
        assert!(ReferralCode::parse("PROMO-ALICE-1234").is_err());
        assert!(ReferralCode::parse("REF-AL-ICE-1234").is_err());
    }
}
