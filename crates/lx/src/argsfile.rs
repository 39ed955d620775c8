//! The `lx.args` auxiliary argument file.
//!
//! If `lx.args` exists in the current directory, its contents are
//! tokenised shell-style (whitespace separated, single and double quotes,
//! backslash escapes) and prepended to the command-line arguments.

pub const ARGS_FILE: &str = "lx.args";

/// Prepend the args file, if present, to the real argv.
pub fn with_args_file(argv: Vec<String>) -> Vec<String> {
    match std::fs::read_to_string(ARGS_FILE) {
        Ok(contents) => {
            let mut args = split_args(&contents);
            args.extend(argv);
            args
        }
        Err(_) => argv,
    }
}

/// Tokenise one argument string.
pub fn split_args(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    match chars.next() {
                        Some(escaped) => current.push(escaped),
                        None => break,
                    }
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                        in_token = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_token {
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split_args("-j4 --verbose src"), ["-j4", "--verbose", "src"]);
        assert_eq!(split_args("  a\n\tb  "), ["a", "b"]);
    }

    #[test]
    fn quotes_protect_spaces() {
        assert_eq!(
            split_args("-I\"my dir\" '-DNAME=\"x y\"'"),
            ["-Imy dir", "-DNAME=\"x y\""]
        );
    }

    #[test]
    fn backslash_escapes() {
        assert_eq!(split_args(r"a\ b c"), ["a b", "c"]);
        assert_eq!(split_args(r#""a\"b""#), ["a\"b"]);
    }

    #[test]
    fn empty_quoted_token_survives() {
        assert_eq!(split_args("'' b"), ["", "b"]);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(split_args("").is_empty());
        assert!(split_args("   \n").is_empty());
    }
}
