/// Maximum length of a sanitized resource name.
const MAX_NAME_LEN: usize = 100;

/// Map a caller-supplied resource name to something safe to join onto a
/// storage directory. Characters outside `[A-Za-z0-9_.-]` become `_`, then
/// literal `..` sequences are stripped, then the result is cut to 100
/// characters. The two passes run in that order: a raw `..` survives the
/// substitution (dots are allowed) and is removed by the second pass.
///
/// Never fails. The result may be empty; callers surface the resulting I/O
/// error instead of treating that as a distinct case.
pub fn sanitize(raw: &str) -> String {
    let substituted: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut stripped = substituted.replace("..", "");
    stripped.truncate(MAX_NAME_LEN);
    stripped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
    }

    #[test]
    fn passes_plain_names_through() {
        assert_eq!(sanitize("notes-2024.txt"), "notes-2024.txt");
        assert_eq!(sanitize("a_b.C-9"), "a_b.C-9");
    }

    #[test]
    fn substitutes_unsafe_characters() {
        assert_eq!(sanitize("hello world!"), "hello_world_");
        assert_eq!(sanitize("até já"), "at__j_"); // multibyte chars each become one underscore
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
    }

    #[test]
    fn strips_traversal_sequences() {
        // '/' is substituted first, so "a/../b" becomes "a_.._b" and the
        // surviving ".." is then removed.
        assert_eq!(sanitize("a/../b"), "a__b");
        assert_eq!(sanitize("../../etc/passwd"), "__etc_passwd");
        assert_eq!(sanitize(".."), "");
    }

    #[test]
    fn dot_runs_collapse_without_leaving_pairs() {
        assert_eq!(sanitize("..."), ".");
        assert_eq!(sanitize("...."), "");
        assert_eq!(sanitize("a...b"), "a.b");
    }

    #[test]
    fn truncates_to_limit() {
        let long = "x".repeat(500);
        assert_eq!(sanitize(&long).len(), 100);
    }

    #[test]
    fn empty_input_is_tolerated() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn output_alphabet_and_invariants() {
        let inputs = [
            "ordinary.txt",
            "../..//..",
            "..a..b..",
            ". . .. . .",
            "über/../straße",
            "%2e%2e/%2e%2e",
            "\0\n\t..",
        ];
        for raw in inputs {
            let name = sanitize(raw);
            assert!(name.chars().all(is_safe_char), "unsafe char in {name:?}");
            assert!(name.len() <= 100);
            assert!(!name.contains(".."), "traversal left in {name:?}");
        }
    }
}
