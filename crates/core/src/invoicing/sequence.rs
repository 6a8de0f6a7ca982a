use regex::{Regex, RegexBuilder};

use crate::domain::invoice::InvoiceIdentifier;
use crate::errors::DomainError;
use crate::invoicing::code::OrganizationCode;

const MIN_SEQUENCE_WIDTH: usize = 4;

/// Matches `<CODE>-<DIGITS>` for one organization code, case-insensitively
/// and anchored at both ends.
#[derive(Clone, Debug)]
pub struct IdentifierPattern {
    regex: Regex,
}

impl IdentifierPattern {
    pub fn for_code(code: &OrganizationCode) -> Result<Self, DomainError> {
        let pattern = format!("^{}-([0-9]+)$", regex::escape(code.as_str()));
        let regex = RegexBuilder::new(&pattern).case_insensitive(true).build().map_err(|error| {
            DomainError::InvariantViolation(format!(
                "identifier pattern for code `{code}` failed to compile: {error}"
            ))
        })?;
        Ok(Self { regex })
    }

    /// Ignore-non-conforming-identifiers policy: anything that is not exactly
    /// `<CODE>-<DIGITS>`, or whose digits do not fit a `u64`, yields `None`.
    /// Renamed organizations leave such identifiers behind; they are skipped,
    /// never treated as errors.
    pub fn sequence_of(&self, identifier: &str) -> Option<u64> {
        let captures = self.regex.captures(identifier)?;
        captures.get(1)?.as_str().parse::<u64>().ok()
    }
}

/// Highest sequence among conforming identifiers, 0 when none conform.
pub fn max_issued_sequence<'a, I>(pattern: &IdentifierPattern, identifiers: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    identifiers
        .into_iter()
        .filter_map(|identifier| pattern.sequence_of(identifier))
        .max()
        .unwrap_or(0)
}

/// `{code}-{sequence}` with the sequence zero-padded to at least four digits.
pub fn format_identifier(code: &OrganizationCode, sequence: u64) -> InvoiceIdentifier {
    InvoiceIdentifier(format!("{}-{:0width$}", code, sequence, width = MIN_SEQUENCE_WIDTH))
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::{format_identifier, max_issued_sequence, IdentifierPattern};
    use crate::invoicing::code::OrganizationCode;

    proptest! {
        #[test]
        fn next_sequence_below_ten_thousand_is_four_digits(previous in 0_u64..9_999) {
            let code = OrganizationCode::derive("Google").expect("code");
            let next = previous + 1;
            let rendered = format_identifier(&code, next);

            prop_assert_eq!(rendered.as_str(), format!("GOO-{next:04}"));
            prop_assert_eq!(rendered.as_str().len(), "GOO-".len() + 4);
        }

        #[test]
        fn wide_sequences_render_their_exact_decimal(previous in 9_999_u64..u64::MAX - 1) {
            let code = OrganizationCode::derive("Thunder Client Limited").expect("code");
            let next = previous + 1;

            let rendered = format_identifier(&code, next);

            prop_assert_eq!(rendered.as_str(), format!("TCL-{next}"));
        }

        #[test]
        fn formatted_identifiers_scan_back_to_their_sequence(sequence in 1_u64..u64::MAX) {
            let code = OrganizationCode::derive("Google").expect("code");
            let pattern = IdentifierPattern::for_code(&code).expect("pattern");
            let rendered = format_identifier(&code, sequence);

            prop_assert_eq!(pattern.sequence_of(rendered.as_str()), Some(sequence));
        }

        #[test]
        fn max_is_the_largest_conforming_sequence(
            sequences in prop::collection::vec(1_u64..100_000, 0..20),
            foreign in prop::collection::vec(1_u64..100_000, 0..5),
        ) {
            let goo = OrganizationCode::derive("Google").expect("code");
            let alp = OrganizationCode::derive("Alpha").expect("code");
            let pattern = IdentifierPattern::for_code(&goo).expect("pattern");

            let identifiers: Vec<String> = sequences
                .iter()
                .map(|sequence| format_identifier(&goo, *sequence).0)
                .chain(foreign.iter().map(|sequence| format_identifier(&alp, *sequence).0))
                .collect();

            let max = max_issued_sequence(&pattern, identifiers.iter().map(String::as_str));
            prop_assert_eq!(max, sequences.iter().copied().max().unwrap_or(0));
        }
    }
}
