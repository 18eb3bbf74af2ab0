//! Variable Resolver: substitutes `$KEY` tokens in command and path templates.
//!
//! A token is the `$` sign followed by the longest run of `[A-Za-z0-9_]`, and
//! only a key equal to the whole token substitutes it. `$TARGETS` is not
//! `$TARGET` followed by `S`, so shell variables a template defines itself
//! (`$TARGET_FILE` in a `for` loop) pass through. Tokens with no matching key
//! are left verbatim.
//!
//! ```
//! use reconflow::options::OptionSet;
//! use reconflow::resolve::resolve;
//!
//! let options = OptionSet::new().with("TARGET", "example.com");
//! assert_eq!(resolve("amass -d $TARGET", &options), "amass -d example.com");
//! assert_eq!(resolve("echo $MISSING", &options), "echo $MISSING");
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeSet;

use crate::options::OptionSet;

static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z0-9_]+)").expect("Valid regex pattern"));

/// Pure: resolve every `$KEY` token in `template` against `options`
pub fn resolve(template: &str, options: &OptionSet) -> String {
    if !template.contains('$') {
        return template.to_string();
    }

    TOKEN_REGEX
        .replace_all(template, |caps: &Captures| {
            match options.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Resolve an optional template, keeping `None` as `None`
pub fn resolve_opt(template: Option<&str>, options: &OptionSet) -> Option<String> {
    template.map(|t| resolve(t, options))
}

/// Tokens in `template` that no key of `options` resolves
pub fn unresolved_tokens(template: &str, options: &OptionSet) -> BTreeSet<String> {
    TOKEN_REGEX
        .captures_iter(template)
        .filter(|caps| options.get(&caps[1]).is_none())
        .map(|caps| caps[1].to_string())
        .collect()
}

/// All tokens referenced by `template`
pub fn referenced_tokens(template: &str) -> BTreeSet<String> {
    TOKEN_REGEX
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
