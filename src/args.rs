//! # `gost::args`
//!
//! Command-line parsing for `gost`'s five flags. The surface is fixed and small enough that a
//! declarative argument table would be pure ceremony, so this goes straight from argv into an
//! options struct: one `match` arm per recognized flag, anything else collected as leftover.
//!

/// Flags recognized on the command line, plus whatever argv entries weren't recognized (`gost`
/// uses this for its single positional binary-path argument)
pub struct ParsedArgs {
    pub help: bool,
    pub verbose: bool,
    pub template: Option<String>,
    pub string_table: Option<String>,
    pub no_nulls: Option<String>,
    pub leftover: Vec<String>,
}

/// `(keys, description)` pairs for `print_help()`, in declaration order
const HELP_ENTRIES: &[(&str, &str)] = &[
    ("--help, -h", "display this help message"),
    ("--template TEMPLATE", "output template for printing results (see --help for placeholders)"),
    (
        "--string-table POLICY",
        r#"if symbols are missing, use "guess" or "ignore" to enable more fuzzy matching"#,
    ),
    ("--no-nulls BOOL", "strings containing null characters are ignored (default true)"),
    ("-v, --verbose", "enable verbose (debug-level) logging"),
];

pub fn print_help() {
    for (keys, description) in HELP_ENTRIES {
        println!("    {keys:28} {description}");
    }
}

/// Parses argv into [`ParsedArgs`]. `--template`, `--string-table`, and `--no-nulls` each consume
/// the next item as their value; panics if that value is missing, mirroring a misuse of the CLI
/// rather than a condition a well-formed invocation could hit.
pub fn parse(mut args: impl Iterator<Item = String>) -> ParsedArgs {
    let mut parsed = ParsedArgs {
        help: false,
        verbose: false,
        template: None,
        string_table: None,
        no_nulls: None,
        leftover: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => parsed.help = true,
            "-v" | "--verbose" => parsed.verbose = true,
            "--template" => parsed.template = Some(expect_value(&mut args, "--template")),
            "--string-table" => parsed.string_table = Some(expect_value(&mut args, "--string-table")),
            "--no-nulls" => parsed.no_nulls = Some(expect_value(&mut args, "--no-nulls")),
            _ => parsed.leftover.push(arg),
        }
    }

    parsed
}

fn expect_value(args: &mut impl Iterator<Item = String>, name: &str) -> String {
    args.next().unwrap_or_else(|| panic!("expected value for argument '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_and_value_arguments() {
        let parsed = parse(
            vec!["--verbose", "--template", "{{.Addr}}", "binary.out"]
                .into_iter()
                .map(String::from),
        );
        assert!(parsed.verbose);
        assert!(!parsed.help);
        assert_eq!(parsed.template.as_deref(), Some("{{.Addr}}"));
        assert_eq!(parsed.leftover, vec!["binary.out"]);
    }

    #[test]
    fn unrecognized_arguments_become_leftover() {
        let parsed = parse(vec!["binary.out", "--bogus"].into_iter().map(String::from));
        assert_eq!(parsed.leftover, vec!["binary.out", "--bogus"]);
    }

    #[test]
    fn short_and_long_flag_spellings_are_equivalent() {
        assert!(parse(vec!["-h".to_string()].into_iter()).help);
        assert!(parse(vec!["--help".to_string()].into_iter()).help);
        assert!(parse(vec!["-v".to_string()].into_iter()).verbose);
        assert!(parse(vec!["--verbose".to_string()].into_iter()).verbose);
    }

    #[test]
    #[should_panic]
    fn missing_value_for_value_argument_panics() {
        parse(vec!["--template".to_string()].into_iter());
    }
}
