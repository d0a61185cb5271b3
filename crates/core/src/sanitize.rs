//! Masking of sensitive substrings in free-text descriptions.
//!
//! [`sanitize`] is the only way to obtain a [`SanitizedText`], and the external
//! classifier only accepts that type, so raw descriptions cannot reach it.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL]";
pub const NATIONAL_ID_PLACEHOLDER: &str = "[NATIONAL_ID]";
pub const CARD_PLACEHOLDER: &str = "[CARD]";
pub const ACCOUNT_PLACEHOLDER: &str = "[ACCOUNT]";

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_email,
    r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}");
re!(re_national_id,
    r"\b\d{3}-\d{2}-\d{4}\b");
re!(re_masked_card,
    r"(?:[Xx*#]{4}[ \-]?){1,3}\d{4}");
re!(re_digit_run,
    r"\d(?:[ \-]?\d){6,}");
re!(re_iso_date,
    r"^\d{4}-\d{2}-\d{2}$");

/// Description text with sensitive spans replaced by placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizedText(String);

impl SanitizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Masks email addresses, national-ID-like numbers, card numbers and other
/// long digit runs. Text outside the matched spans is left untouched.
pub fn sanitize(text: &str) -> SanitizedText {
    let out = re_email().replace_all(text, EMAIL_PLACEHOLDER);
    let out = replace_cow(out, re_national_id(), |_| NATIONAL_ID_PLACEHOLDER);
    let out = replace_cow(out, re_masked_card(), |_| CARD_PLACEHOLDER);
    let out = replace_cow(out, re_digit_run(), |m| classify_digit_run(m));
    SanitizedText(out.into_owned())
}

fn replace_cow<'a>(
    input: Cow<'a, str>,
    re: &Regex,
    placeholder: impl Fn(&str) -> &'static str,
) -> Cow<'a, str> {
    let replaced = match re.replace_all(&input, |caps: &Captures| {
        let m = &caps[0];
        let token = placeholder(m);
        if token.is_empty() {
            m.to_string()
        } else {
            token.to_string()
        }
    }) {
        Cow::Owned(s) => Some(s),
        Cow::Borrowed(_) => None,
    };
    match replaced {
        Some(s) => Cow::Owned(s),
        None => input,
    }
}

/// Placeholder for a run of 7+ digits, or "" to keep it verbatim.
fn classify_digit_run(run: &str) -> &'static str {
    if re_iso_date().is_match(run) {
        return "";
    }
    let digits: Vec<u32> = run.chars().filter_map(|c| c.to_digit(10)).collect();
    if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
        CARD_PLACEHOLDER
    } else {
        ACCOUNT_PLACEHOLDER
    }
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
