use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const CODE_LENGTH: usize = 3;

/// Short uppercase prefix derived from an organization's display name.
///
/// Recomputed on every request and never persisted. Two organizations may
/// derive the same code; sequence scans are scoped by organization id, so
/// that does not cause cross-tenant collisions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationCode(String);

impl OrganizationCode {
    /// Single-word names contribute their first three characters; longer
    /// names contribute the initials of their first three words.
    pub fn derive(name: &str) -> Result<Self, DomainError> {
        let words: Vec<&str> = name.split_whitespace().collect();

        let raw: String = match words.as_slice() {
            [] => return Err(DomainError::MissingOrganizationName),
            [word] => word.chars().take(CODE_LENGTH).collect(),
            many => many.iter().take(CODE_LENGTH).filter_map(|word| word.chars().next()).collect(),
        };

        Ok(Self(raw.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrganizationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::OrganizationCode;
    use crate::errors::DomainError;

    fn code(name: &str) -> String {
        OrganizationCode::derive(name).expect("code should derive").as_str().to_string()
    }

    #[test]
    fn single_word_uses_first_three_characters() {
        assert_eq!(code("Google"), "GOO");
        assert_eq!(code("acme"), "ACM");
    }

    #[test]
    fn short_single_word_is_not_padded() {
        assert_eq!(code("Hp"), "HP");
        assert_eq!(code("x"), "X");
    }

    #[test]
    fn multi_word_uses_initials_of_first_three_words() {
        assert_eq!(code("Thunder Client Limited"), "TCL");
        assert_eq!(code("One Two Three Four"), "OTT");
    }

    #[test]
    fn two_words_yield_two_letter_code() {
        assert_eq!(code("Blue Ocean"), "BO");
    }

    #[test]
    fn repeated_and_surrounding_whitespace_is_collapsed() {
        assert_eq!(code("   thunder \t  client\n limited  "), "TCL");
        assert_eq!(code("  google  "), "GOO");
    }

    #[test]
    fn non_alphabetic_leading_characters_pass_through() {
        assert_eq!(code("3M Company"), "3C");
        assert_eq!(code("#hash"), "#HA");
    }

    #[test]
    fn multibyte_characters_are_counted_as_characters() {
        assert_eq!(code("Ñandú"), "ÑAN");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(OrganizationCode::derive(""), Err(DomainError::MissingOrganizationName));
        assert_eq!(OrganizationCode::derive("   \t "), Err(DomainError::MissingOrganizationName));
    }
}
