//! Parser and formatter for block sizes as understood by `gluster-block` (like `"1GiB"`)
//!
//! Meant for command line argument parsing as well as for normalizing the sizes reported by
//! `gluster-block info`.

use anyhow::{Result, anyhow};
use regex::Regex;
use std::sync::LazyLock;

static REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d{1,9}))? *(?:([kKmMgGtTpPeE])(?:i?[bB])?|[bB])?$")
        .expect("Regex must be valid")
});

const EXPECT_STR: &str = "a positive number representing a size in bytes or a string \
     containing a positive number with an appended binary unit in the form \
     \"<number>[b|K|M|G|T|P|E][i][B]\"";

/// Units used by `gluster-block info` when printing a size, indexed by the power of 1024.
const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Parses a string in the form `<number>[KMGTPE][i][B]` into a byte count.
///
/// All prefixes are binary and case insensitive (`1K`, `1kb` and `1KiB` all become 1024), which
/// is what `gluster-block create` does with its size argument. A bare number or a number followed
/// by `b` is taken as bytes. The number may have a fractional part (`"1.5G"`), the result is
/// rounded down to whole bytes.
pub fn parse_optional(input: &str) -> Option<u64> {
    let captures = REGEX.captures(input.trim())?;
    let whole: u128 = captures.get(1)?.as_str().parse().ok()?;

    let exp = match captures.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 0,
        Some(p) => match p.as_str() {
            "k" => 1,
            "m" => 2,
            "g" => 3,
            "t" => 4,
            "p" => 5,
            "e" => 6,
            _ => return None,
        },
    };
    let multiplier = 1024u128.pow(exp);

    let mut bytes = whole.checked_mul(multiplier)?;
    if let Some(frac) = captures.get(2) {
        let digits = frac.as_str();
        let numerator: u128 = digits.parse().ok()?;
        bytes += numerator * multiplier / 10u128.pow(digits.len() as u32);
    }

    bytes.try_into().ok()
}

/// Parses a string in the form `<number>[KMGTPE][i][B]` into a byte count.
///
/// See [parse_optional()].
pub fn parse(input: &str) -> Result<u64> {
    parse_optional(input).ok_or_else(|| anyhow!("Invalid size {input:?}, expected {EXPECT_STR}"))
}

/// Formats a byte count the way `gluster-block info` reports it (`1024` becomes `"1.0 KiB"`).
///
/// The value is divided by 1024 as long as it stays at or above 1024. The remainder of the last
/// division becomes the fraction, printed with one decimal digit.
pub fn format(bytes: u64) -> String {
    let mut value = bytes;
    let mut rem = 0;
    let mut exp = 0;

    while value >= 1024 {
        rem = value % 1024;
        value /= 1024;
        exp += 1;
    }

    format!("{:.1} {}", value as f64 + rem as f64 / 1024.0, UNITS[exp])
}

/// Normalizes any accepted size notation into the reported form (`"1K"` becomes `"1.0 KiB"`).
pub fn normalize(input: &str) -> Result<String> {
    Ok(format(parse(input)?))
}
