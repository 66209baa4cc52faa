//! Whole-gigabyte memory sizes
//!
//! Every memory quantity in a group spec is a whole number of gigabytes
//! written as `"<int>G"`. The literal `"0"` is accepted as an empty size so
//! that specs may leave the key out or zero it either way. Anything else
//! (other units, fractions) is a validation failure.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error for malformed size strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("supports only sizes in gigabytes, example: 2G")]
pub struct ParseSizeError;

/// A memory size in whole gigabytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GigaSize(pub u64);

impl GigaSize {
    pub const ZERO: GigaSize = GigaSize(0);

    /// True when the size is zero (no memory region)
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two sizes
    pub fn add(self, other: GigaSize) -> GigaSize {
        GigaSize(self.0 + other.0)
    }

    /// Difference of two sizes, clamped at zero
    pub fn sub(self, other: GigaSize) -> GigaSize {
        GigaSize(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for GigaSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}G", self.0)
    }
}

impl FromStr for GigaSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(GigaSize(0));
        }
        let digits = s
            .strip_suffix('G')
            .or_else(|| s.strip_suffix('g'))
            .ok_or(ParseSizeError)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseSizeError);
        }
        digits.parse::<u64>().map(GigaSize).map_err(|_| ParseSizeError)
    }
}

/// Round a node size reported by `numactl -H` to three significant digits.
///
/// The input is an integer size plus its unit (`kB`, `MB`, `GB` or `TB`).
/// Sizes below one gigabyte render as `"<int>M"`, larger ones as `"<int>G"`,
/// so `1007 MB` becomes `"1G"` and `1951 MB` becomes `"2G"`.
pub fn round_mb(size: u64, unit: &str) -> Result<String, ParseSizeError> {
    let size_mb: f64 = match unit {
        "kB" => size as f64 / 1024.0,
        "MB" => size as f64,
        "GB" => size as f64 * 1024.0,
        "TB" => size as f64 * 1024.0 * 1024.0,
        _ => return Err(ParseSizeError),
    };
    if size_mb == 0.0 {
        return Ok("0G".to_string());
    }
    let size_mul = 10f64.powi(size_mb.log10() as i32);
    let rounded = (size_mb * 100.0 / size_mul).round_ties_even() * size_mul / 100.0;
    if size_mul < 1000.0 {
        Ok(format!("{rounded:.0}M"))
    } else {
        Ok(format!("{:.0}G", rounded / 1000.0))
    }
}

/// Round a megabyte quantity to a whole-gigabyte label (`"<int>G"`).
///
/// Used for memory leaves in the topology tree, where node sizes arrive as
/// fractional megabytes.
pub fn mb_to_gig_label(size_mb: f64) -> String {
    format!("{}G", (size_mb / 1024.0).round_ties_even() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_gigabytes() {
        assert_eq!("2G".parse::<GigaSize>().unwrap(), GigaSize(2));
        assert_eq!("128G".parse::<GigaSize>().unwrap(), GigaSize(128));
        assert_eq!("0G".parse::<GigaSize>().unwrap(), GigaSize(0));
        assert_eq!("8g".parse::<GigaSize>().unwrap(), GigaSize(8));
    }

    #[test]
    fn test_parse_bare_zero() {
        assert_eq!("0".parse::<GigaSize>().unwrap(), GigaSize(0));
    }

    #[test]
    fn test_parse_rejects_other_units() {
        assert!("2M".parse::<GigaSize>().is_err());
        assert!("2GB".parse::<GigaSize>().is_err());
        assert!("2".parse::<GigaSize>().is_err());
        assert!("2.5G".parse::<GigaSize>().is_err());
        assert!("G".parse::<GigaSize>().is_err());
        assert!("".parse::<GigaSize>().is_err());
        assert!("-1G".parse::<GigaSize>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(GigaSize(5).to_string(), "5G");
        assert_eq!("5G".parse::<GigaSize>().unwrap().to_string(), "5G");
    }

    #[test]
    fn test_add_sub() {
        assert_eq!(GigaSize(2).add(GigaSize(3)), GigaSize(5));
        assert_eq!(GigaSize(5).sub(GigaSize(3)), GigaSize(2));
        assert_eq!(GigaSize(1).sub(GigaSize(3)), GigaSize(0));
    }

    #[test]
    fn test_round_mb_near_gigabyte() {
        assert_eq!(round_mb(1007, "MB").unwrap(), "1G");
        assert_eq!(round_mb(1951, "MB").unwrap(), "2G");
        assert_eq!(round_mb(4030, "MB").unwrap(), "4G");
        assert_eq!(round_mb(8039, "MB").unwrap(), "8G");
    }

    #[test]
    fn test_round_mb_large() {
        assert_eq!(round_mb(128000, "MB").unwrap(), "128G");
        assert_eq!(round_mb(2, "TB").unwrap(), "2100G");
    }

    #[test]
    fn test_round_mb_small_stays_megabytes() {
        assert_eq!(round_mb(784, "MB").unwrap(), "784M");
        assert_eq!(round_mb(524288, "kB").unwrap(), "512M");
    }

    #[test]
    fn test_round_mb_zero() {
        assert_eq!(round_mb(0, "MB").unwrap(), "0G");
    }

    #[test]
    fn test_round_mb_unknown_unit() {
        assert!(round_mb(10, "PB").is_err());
        assert!(round_mb(10, "mb").is_err());
    }

    #[test]
    fn test_mb_to_gig_label() {
        assert_eq!(mb_to_gig_label(8063.83), "8G");
        assert_eq!(mb_to_gig_label(1007.0), "1G");
        assert_eq!(mb_to_gig_label(0.0), "0G");
    }
}
