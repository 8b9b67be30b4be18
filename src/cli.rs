//! Shared command-line plumbing for the three binaries.

use std::ffi::OsString;

/// Accepts the classic single-dash spelling of the long flags (`-index`,
/// `-incl-range`, `-og`, ...) by promoting any argument that exactly names
/// a known long flag to the double-dash form clap parses. Short flags,
/// double-dash spellings, and values pass through untouched.
pub fn normalize_single_dash_flags<I>(args: I, long_flags: &[&str]) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            if let Some(text) = arg.to_str() {
                if let Some(name) = text.strip_prefix('-') {
                    if !name.starts_with('-') && name.len() > 1 && long_flags.contains(&name) {
                        return OsString::from(format!("--{name}"));
                    }
                }
            }
            arg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAGS: &[&str] = &["index", "incl-range", "list", "og"];

    fn normalize(args: &[&str]) -> Vec<OsString> {
        normalize_single_dash_flags(args.iter().map(OsString::from), FLAGS)
    }

    #[test]
    fn single_dash_long_flags_are_promoted() {
        assert_eq!(
            normalize(&["bgenix", "-g", "f.bgen", "-index"]),
            vec!["bgenix", "-g", "f.bgen", "--index"]
        );
        assert_eq!(
            normalize(&["-incl-range", "01:150-250", "-list"]),
            vec!["--incl-range", "01:150-250", "--list"]
        );
    }

    #[test]
    fn short_flags_values_and_double_dash_pass_through() {
        assert_eq!(
            normalize(&["-g", "--list", "01:150-250", "rs100", "-unknown"]),
            vec!["-g", "--list", "01:150-250", "rs100", "-unknown"]
        );
    }
}
