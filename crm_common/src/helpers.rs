/// Parse a boolean flag from a string value, or return the given default value otherwise.
///
/// Flags are tri-state: `true`, `false`, or unset. An unset (or unparseable) flag always resolves
/// to the caller-supplied default rather than being inferred from comparison quirks.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unset_flags_resolve_to_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("bogus".into()), true));
    }

    #[test]
    fn explicit_values_win() {
        assert!(parse_boolean_flag(Some("1".into()), false));
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(!parse_boolean_flag(Some(" FALSE ".into()), true));
    }
}
