//! Variable resolution for configuration documents.
//!
//! A document maps keys to values that may select per-environment variants
//! and may embed `{{ ... }}` expressions referring to other keys:
//!
//! ```yaml
//! host:
//!   .prod: db.internal
//!   default: localhost
//! url: "postgres://{{ host }}:5432/app"
//! ```
//!
//! Plain values are stored directly. Values with expressions are compiled and
//! executed in rounds against the variables resolved so far, until every key
//! is resolved or a round makes no progress.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::directives::Directives;
use super::document::Format;
use super::error::{ConfigError, TemplateError};
use super::rewrite::rewrite_directives;
use super::select::{collapse_variant_keys, select_value};
use super::table::VariableTable;
use super::template::Template;

/// Upper bound on resolution rounds.
pub const MAX_ROUNDS: usize = 10;

/// Resolves variable documents and renders templates for one environment.
///
/// ```
/// use varsmith::Resolver;
///
/// let vars = Resolver::new("prod")
///     .resolve("host:\n  .prod: db.internal\n  default: localhost\nurl: 'pg://{{ host }}'\n")?;
/// assert_eq!(vars.get("url"), Some("pg://db.internal"));
/// # Ok::<(), varsmith::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    environment: String,
    format: Format,
    directives: Directives,
}

impl Resolver {
    /// An empty `environment` disables all variant selection.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_directives(mut self, directives: Directives) -> Self {
        self.directives = directives;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Resolves every key of `document` into a fresh table.
    pub fn resolve(&self, document: &str) -> Result<VariableTable, ConfigError> {
        let mut vars = VariableTable::new();
        self.resolve_into(document, &mut vars)?;
        Ok(vars)
    }

    /// Resolves `document` on top of existing variables.
    ///
    /// Expressions may refer to variables already in `vars`; document keys
    /// overwrite them. A seeded value for a key the document defines as an
    /// expression is dropped before the first round.
    pub fn resolve_into(&self, document: &str, vars: &mut VariableTable) -> Result<(), ConfigError> {
        let document = collapse_variant_keys(self.format.parse(document)?, &self.environment);
        let mut pending = BTreeMap::new();

        for (key, raw) in document.iter() {
            let key = match key.as_str() {
                Some(k) => k.to_string(),
                None => self.format.serialize(&key.clone().into())?.trim().to_string(),
            };

            let text = select_value(&key, raw, &self.environment, self.format)?;
            if !has_expression(&text) {
                vars.set_var(key, text);
                continue;
            }

            let canonical = rewrite_directives(&text);
            let template = Template::compile(key.clone(), &canonical, &self.directives)
                .map_err(|source| ConfigError::Template {
                    key: key.clone(),
                    source,
                })?;
            pending.insert(key, template);
        }

        for key in pending.keys() {
            if vars.remove(key).is_some() {
                debug!(key = %key, "seeded variable shadowed by document expression");
            }
        }

        resolve_pending(pending, vars)
    }

    /// Renders a template against resolved variables.
    ///
    /// Shorthand directives are rewritten first. A reference to an absent
    /// variable is an error.
    pub fn render(&self, template: &str, vars: &VariableTable) -> Result<String, ConfigError> {
        let canonical = rewrite_directives(template);
        let wrap = |source| ConfigError::Template {
            key: "template".to_string(),
            source,
        };
        Template::compile("template", &canonical, &self.directives)
            .map_err(wrap)?
            .execute(vars)
            .map_err(wrap)
    }
}

/// Resolves a YAML variables document for `environment` with the default directives.
pub fn resolve(document: &str, environment: &str) -> Result<VariableTable, ConfigError> {
    Resolver::new(environment).resolve(document)
}

/// Renders `template` against `vars` with the default directives.
pub fn render_template(template: &str, vars: &VariableTable) -> Result<String, ConfigError> {
    Resolver::default().render(template, vars)
}

fn has_expression(text: &str) -> bool {
    text.contains("{{")
}

/// Executes pending templates in rounds until all are resolved.
///
/// Each round runs against the table as it stood when the round began, so a
/// key needs one round per level of dependency depth regardless of order.
fn resolve_pending(
    mut pending: BTreeMap<String, Template<'_>>,
    vars: &mut VariableTable,
) -> Result<(), ConfigError> {
    for round in 0..MAX_ROUNDS {
        if pending.is_empty() {
            return Ok(());
        }

        let snapshot = vars.clone();
        let mut resolved = Vec::new();

        for (key, template) in &pending {
            match template.execute(&snapshot) {
                Ok(value) => resolved.push((key.clone(), value)),
                Err(TemplateError::MissingKey(missing)) => {
                    warn!(key = %key, missing = %missing, round, "variable not resolved yet");
                }
                Err(source) => {
                    return Err(ConfigError::Template {
                        key: key.clone(),
                        source,
                    })
                }
            }
        }

        if resolved.is_empty() {
            return Err(unresolved(&pending));
        }

        for (key, value) in resolved {
            debug!(key = %key, round, value = %value, "resolved variable");
            pending.remove(&key);
            vars.set_var(key, value);
        }
    }

    if pending.is_empty() {
        Ok(())
    } else {
        Err(unresolved(&pending))
    }
}

fn unresolved(pending: &BTreeMap<String, Template<'_>>) -> ConfigError {
    ConfigError::UnresolvedVariables {
        keys: pending.keys().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptError;

    #[test]
    fn test_plain_values_are_verbatim() {
        let vars = resolve("name: app\nport: 8080\ngreeting: ' hi '\n", "prod").unwrap();
        assert_eq!(vars.get("name"), Some("app"));
        assert_eq!(vars.get("port"), Some("8080"));
        assert_eq!(vars.get("greeting"), Some(" hi "));
    }

    #[test]
    fn test_simple_reference() {
        let vars = resolve("host: localhost\nurl: 'http://{{ host }}/api'\n", "").unwrap();
        assert_eq!(vars.get("url"), Some("http://localhost/api"));
    }

    #[test]
    fn test_chained_references() {
        let vars = resolve(
            "a: hello\nb: '{{ a }} world'\nc: '{{ b }}!'\nd: '{{ c }} {{ a }}'\n",
            "",
        )
        .unwrap();
        assert_eq!(vars.get("c"), Some("hello world!"));
        assert_eq!(vars.get("d"), Some("hello world! hello"));
    }

    #[test]
    fn test_two_level_dependency_takes_two_rounds() {
        let text = "x: '1'\ny: '{{ x }}-y'\nz: '{{ x }}/{{ y }}'\n";
        let directives = Directives::new();
        let doc = Format::Yaml.parse(text).unwrap();
        let mut vars = VariableTable::new();
        let mut pending = BTreeMap::new();
        for (key, raw) in doc.iter() {
            let key = key.as_str().unwrap().to_string();
            let text = raw.as_str().unwrap();
            if has_expression(text) {
                let template =
                    Template::compile(key.clone(), &rewrite_directives(text), &directives).unwrap();
                pending.insert(key, template);
            } else {
                vars.set_var(key, text);
            }
        }

        // One round resolves y only; z still waits on y.
        let snapshot = vars.clone();
        let ready: Vec<_> = pending
            .iter()
            .filter(|(_, t)| t.execute(&snapshot).is_ok())
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(ready, vec!["y"]);

        resolve_pending(pending, &mut vars).unwrap();
        assert_eq!(vars.get("z"), Some("1/1-y"));
    }

    #[test]
    fn test_reference_to_digit_leading_or_unicode_key() {
        let vars = resolve("2fa: on\nñame: app\nv: '{{ 2fa }}/{{ ñame }}'\n", "").unwrap();
        assert_eq!(vars.get("v"), Some("on/app"));
    }

    #[test]
    fn test_large_unsigned_integer_is_verbatim() {
        let vars = resolve("big: 18446744073709551615\nref: '{{ big }}'\n", "").unwrap();
        assert_eq!(vars.get("big"), Some("18446744073709551615"));
        assert_eq!(vars.get("ref"), Some("18446744073709551615"));
    }

    #[test]
    fn test_cycle_fails() {
        let err = resolve("a: '{{ b }}'\nb: '{{ a }}'\nok: fine\n", "").unwrap_err();
        match err {
            ConfigError::UnresolvedVariables { keys } => assert_eq!(keys, vec!["a", "b"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_reference_fails() {
        let err = resolve("url: '{{ .nonexistent }}'\n", "").unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedVariables { ref keys } if keys == &["url"]));
    }

    #[test]
    fn test_round_budget_exhausted() {
        // A chain deeper than the round budget.
        let mut doc = String::from("k0: base\n");
        for i in 1..=MAX_ROUNDS + 1 {
            doc.push_str(&format!("k{i}: '{{{{ k{} }}}}'\n", i - 1));
        }
        let err = resolve(&doc, "").unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedVariables { ref keys } if keys == &[format!("k{}", MAX_ROUNDS + 1)]));
    }

    #[test]
    fn test_chain_within_budget() {
        let mut doc = String::from("k0: base\n");
        for i in 1..=MAX_ROUNDS {
            doc.push_str(&format!("k{i}: '{{{{ k{} }}}}'\n", i - 1));
        }
        let vars = resolve(&doc, "").unwrap();
        assert_eq!(vars.get(&format!("k{MAX_ROUNDS}")), Some("base"));
    }

    #[test]
    fn test_syntax_error_is_not_retried() {
        let err = resolve("bad: '{{ .x'\n", "").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template { ref key, source: TemplateError::Syntax { .. } } if key == "bad"
        ));
    }

    #[test]
    fn test_execution_error_is_not_retried() {
        let err = resolve("n: '3'\nbad: '{{ indent .n .n }}'\n", "").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template { ref key, source: TemplateError::Call { .. } } if key == "bad"
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = resolve("key: [unclosed\n", "").unwrap_err();
        assert!(matches!(err, ConfigError::Document(_)));
    }

    #[test]
    fn test_environment_variants() {
        let doc = "\
host.[prod]: db.internal
host.[default]: localhost
port:
  .prod: 5432
  default: 15432
url: '{{ host }}:{{ port }}'
";
        let prod = resolve(doc, "prod").unwrap();
        assert_eq!(prod.get("url"), Some("db.internal:5432"));

        let staging = resolve(doc, "staging").unwrap();
        assert_eq!(staging.get("url"), Some("localhost:15432"));
    }

    #[test]
    fn test_variant_key_dropped_without_match() {
        let vars = resolve("k.[prod]: P\n", "staging").unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_structure_becomes_indentable_text() {
        let doc = "\
servers:
  - a
  - b
config: |
  root:
    {{ indent servers }}
";
        let vars = resolve(doc, "").unwrap();
        assert_eq!(vars.get("servers"), Some("- a\n- b"));
        assert_eq!(vars.get("config"), Some("root:\n  - a\n  - b\n"));
    }

    #[test]
    fn test_variant_selected_template() {
        let doc = "name: app\nlabel:\n  .prod: '{{ name }}-live'\n  default: '{{ name }}-test'\n";
        assert_eq!(resolve(doc, "prod").unwrap().get("label"), Some("app-live"));
        assert_eq!(resolve(doc, "dev").unwrap().get("label"), Some("app-test"));
    }

    #[test]
    fn test_deterministic() {
        let doc = "a: '{{ b }}{{ c }}'\nb: '{{ c }}'\nc: x\nd:\n  .prod: [1, 2]\n  other: 3\n";
        assert_eq!(resolve(doc, "prod").unwrap(), resolve(doc, "prod").unwrap());
    }

    #[test]
    fn test_resolve_into_uses_seeded_variables() {
        let mut vars = VariableTable::new();
        vars.set_vars([("region", "eu"), ("name", "seed")]);
        Resolver::new("")
            .resolve_into("name: app\nbucket: '{{ name }}-{{ region }}'\n", &mut vars)
            .unwrap();
        assert_eq!(vars.get("bucket"), Some("app-eu"));
        assert_eq!(vars.get("name"), Some("app"));
    }

    #[test]
    fn test_resolve_into_drops_seeded_value_of_redefined_key() {
        let mut vars = VariableTable::new();
        vars.set_var("a", "old");
        Resolver::new("")
            .resolve_into("a: '{{ b }}'\nb: x\nc: '{{ a }}'\n", &mut vars)
            .unwrap();
        assert_eq!(vars.get("a"), Some("x"));
        assert_eq!(vars.get("c"), Some("x"));
    }

    #[test]
    fn test_resolve_into_redefined_key_does_not_fall_back_to_seed() {
        let mut vars = VariableTable::new();
        vars.set_var("a", "old");
        let err = Resolver::new("")
            .resolve_into("a: '{{ missing }}'\nc: '{{ a }}'\n", &mut vars)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedVariables { ref keys } if keys == &["a", "c"]));
    }

    #[test]
    fn test_encrypt_shorthand_encrypts_literal_name() {
        let resolver = Resolver::new("").with_directives(
            Directives::new().with_encryptor(|plain: &str| Ok::<_, EncryptError>(format!("enc:{plain}"))),
        );
        let vars = resolver
            .resolve("password: hunter2\nsecret: '{{ encrypt password }}'\nvalue: '{{ encrypt .password }}'\n")
            .unwrap();
        assert_eq!(vars.get("secret"), Some("enc:password"));
        assert_eq!(vars.get("value"), Some("enc:hunter2"));
    }

    #[test]
    fn test_bool_shorthand() {
        let vars = resolve("flag: 'true'\nline: \"enabled: '{{ bool flag }}'\"\n", "").unwrap();
        assert_eq!(vars.get("line"), Some("enabled: true"));
    }

    #[test]
    fn test_toml_document() {
        let resolver = Resolver::new("prod").with_format(Format::Toml);
        let vars = resolver
            .resolve("host = \"h\"\nurl = \"http://{{ host }}\"\n\n[port]\n\".prod\" = 443\ndefault = 80\n")
            .unwrap();
        assert_eq!(vars.get("url"), Some("http://h"));
        assert_eq!(vars.get("port"), Some("443"));
    }

    #[test]
    fn test_render_template() {
        let mut vars = VariableTable::new();
        vars.set_vars([("host", "localhost"), ("block", "a: 1\nb: 2")]);
        let out = render_template("url: {{ host }}\nnested:\n  {{ indent block }}\n", &vars).unwrap();
        assert_eq!(out, "url: localhost\nnested:\n  a: 1\n  b: 2\n");
    }

    #[test]
    fn test_render_template_missing_key_is_error() {
        let err = render_template("{{ absent }}", &VariableTable::new()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template { source: TemplateError::MissingKey(ref k), .. } if k == "absent"
        ));
    }
}
