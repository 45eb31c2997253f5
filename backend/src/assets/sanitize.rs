//! Filename sanitization (§4.4), grounded on `modules/CleanPath.py`.

/// Illegal-character replacement map, verbatim from `CleanPath.
/// ILLEGAL_FILE_CHARACTERS`.
const ILLEGAL_CHARACTERS: &[(char, &str)] = &[
    ('?', "!"),
    ('<', ""),
    ('>', ""),
    (':', " -"),
    ('"', ""),
    ('|', ""),
    ('*', "-"),
    ('/', "+"),
    ('\\', "+"),
];

/// Replace every character in the forbidden set with its fixed
/// replacement. Idempotent by construction: none of the replacement
/// strings themselves contain a forbidden character, so re-applying the
/// map to an already-sanitized name is a no-op (§8 sanitization
/// round-trip law).
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ILLEGAL_CHARACTERS.iter().find(|(c, _)| *c == ch) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_each_illegal_character() {
        assert_eq!(sanitize_name("What?"), "What!");
        assert_eq!(sanitize_name("A: B"), "A - B");
        assert_eq!(sanitize_name("A/B\\C"), "A+B+C");
        assert_eq!(sanitize_name("<tag>"), "tag");
        assert_eq!(sanitize_name("a*b"), "a-b");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["What?", "A: B (2008)", "C/D\\E", "plain name"] {
            let once = sanitize_name(input);
            let twice = sanitize_name(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn result_contains_no_forbidden_character() {
        let sanitized = sanitize_name("?<>:\"|*/\\");
        for (forbidden, _) in ILLEGAL_CHARACTERS {
            assert!(!sanitized.contains(*forbidden));
        }
    }
}
