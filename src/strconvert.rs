//! Argument parsing helpers (spec §4.F/§4.G). Grounded on
//! `original_source/.../util/strconvert.c` and `.../bool-map.c` for the
//! exact accepted literal sets and time grammar.

use crate::error::{ClimpError, Result};

const TRUE_LITERALS: &[&str] = &["true", "yes", "on", "y", "1"];
const FALSE_LITERALS: &[&str] = &["false", "no", "off", "n", "0"];

/// `1` and `0` are matched case-sensitively (they have no case), the
/// rest case-insensitively, matching `bool-map.c`'s `strcasecmp`.
pub fn str_to_bool(s: &str) -> Result<bool> {
    if TRUE_LITERALS.iter().any(|lit| lit.eq_ignore_ascii_case(s)) {
        return Ok(true);
    }
    if FALSE_LITERALS.iter().any(|lit| lit.eq_ignore_ascii_case(s)) {
        return Ok(false);
    }
    Err(ClimpError::InvalidArgument(s.to_string()))
}

pub fn str_to_float(s: &str) -> Result<f32> {
    s.parse()
        .map_err(|_| ClimpError::InvalidArgument(s.to_string()))
}

pub fn str_to_int(s: &str) -> Result<i32> {
    s.parse()
        .map_err(|_| ClimpError::InvalidArgument(s.to_string()))
}

/// `seek`'s time grammar: an optional leading minutes field, then one
/// of `:`, `.`, `,`, or a space, then a seconds field — anything else
/// is a parse error. Bare digits are plain seconds.
pub fn str_to_sec(s: &str) -> Result<i64> {
    let bad = || ClimpError::InvalidArgument(s.to_string());

    let sep_pos = s.find([':', '.', ',', ' ']);
    let Some(pos) = sep_pos else {
        return s.parse::<i64>().map_err(|_| bad());
    };

    let (minutes, rest) = s.split_at(pos);
    let minutes: i64 = minutes.parse().map_err(|_| bad())?;
    let seconds: i64 = rest[1..].parse().map_err(|_| bad())?;
    Ok(minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_literals_cover_the_exact_original_set() {
        for lit in ["true", "YES", "On", "y", "1"] {
            assert_eq!(str_to_bool(lit).unwrap(), true);
        }
        for lit in ["false", "NO", "Off", "n", "0"] {
            assert_eq!(str_to_bool(lit).unwrap(), false);
        }
        assert!(str_to_bool("maybe").is_err());
    }

    #[test]
    fn sec_parses_plain_seconds() {
        assert_eq!(str_to_sec("90").unwrap(), 90);
    }

    #[test]
    fn sec_parses_minute_colon_second() {
        assert_eq!(str_to_sec("1:30").unwrap(), 90);
    }

    #[test]
    fn sec_accepts_dot_comma_and_space_separators() {
        assert_eq!(str_to_sec("1.30").unwrap(), 90);
        assert_eq!(str_to_sec("1,30").unwrap(), 90);
        assert_eq!(str_to_sec("1 30").unwrap(), 90);
    }

    #[test]
    fn sec_rejects_unknown_separator() {
        assert!(str_to_sec("1x30").is_err());
    }
}
