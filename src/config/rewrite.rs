//! Rewrites shorthand directives into canonical template syntax.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

/// `'{{ bool flag }}'`: quoted so the source stays valid before expansion.
static BOOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'\s*\{\{\s*bool +(?P<name>[^\s{}']+)\s*\}\}\s*'").unwrap());

/// `{{ name }}`: a single bare word that is not a dotted field or a quoted literal.
static BARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*(?P<name>[^.\s"'`{}][^\s{}]*)\s*\}\}"#).unwrap()
});

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

/// `    {{ indent name }}` at the start of a line.
static INDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<pad> +)\{\{\s*indent +\.?(?P<name>[^\s{}]+)\s*\}\} *").unwrap()
});

/// `{{ encrypt name }}` with an unquoted, undotted argument.
static ENCRYPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*encrypt +(?P<name>[^.\s"'`{}][^\s"'`{}]*)\s*\}\}"#).unwrap()
});

/// Normalizes shorthand into the syntax accepted by [`Template`](super::Template).
///
/// Applied in order:
/// 1. `'{{ bool x }}'` becomes `{{x}}`, dropping the quotes.
/// 2. `{{ x }}` becomes `{{.x}}`.
/// 3. A line of `L` spaces followed by `{{ indent x }}` becomes `{{indent .x L}}`.
/// 4. `{{ encrypt x }}` becomes `{{ encrypt "x" }}`.
///
/// The encrypt shorthand takes its argument literally; `{{ encrypt .x }}` is
/// left alone and encrypts the value of `x`.
pub fn rewrite_directives(text: &str) -> String {
    let text = BOOL_RE.replace_all(text, "{{$name}}");
    let text = BARE_RE.replace_all(&text, |caps: &Captures| {
        if INTEGER_RE.is_match(&caps["name"]) {
            caps[0].to_string()
        } else {
            format!("{{{{.{}}}}}", &caps["name"])
        }
    });

    let text = INDENT_RE.replace_all(&text, |caps: &Captures| {
        let width = caps["pad"].len();
        debug!(name = &caps["name"], width, "expanding indent shorthand");
        format!("{{{{indent .{} {}}}}}", &caps["name"], width)
    });

    let text = ENCRYPT_RE.replace_all(&text, |caps: &Captures| {
        format!(r#"{{{{ encrypt "{}" }}}}"#, caps["name"].replace('\\', r"\\"))
    });

    text.into_owned()
}
