//! Environment-scoped value selection.
//!
//! Two spellings of per-environment values are understood:
//!
//! ```yaml
//! # variant keys, collapsed before resolution
//! db_host.[prod]: db.internal
//! db_host.[default]: localhost
//!
//! # variant maps, selected per key
//! db_port:
//!   .prod: 5432
//!   default: 15432
//! ```

use indexmap::map::Entry;
use indexmap::IndexMap;
use tracing::debug;

use super::document::{Format, Mapping, RawValue, Scalar};
use super::error::DocumentError;

const DEFAULT_TAG: &str = "default";

/// Returns the text value of `raw` for the active environment.
///
/// Scalar strings are returned unchanged. A mapping made only of dot-prefixed
/// tags and `default` yields the entry for `.{environment}`, else `default`.
/// Any other shape, or an empty `environment`, uses the whole raw value.
/// Non-string results are serialized in `format` and trimmed.
pub fn select_value(
    key: &str,
    raw: &RawValue,
    environment: &str,
    format: Format,
) -> Result<String, DocumentError> {
    if let Some(s) = raw.as_str() {
        return Ok(s.to_string());
    }

    let chosen = match raw {
        RawValue::Mapping(mapping) if !environment.is_empty() => {
            select_override(key, mapping, environment).unwrap_or(raw)
        }
        _ => raw,
    };

    match chosen.as_str() {
        Some(s) => Ok(s.to_string()),
        None => Ok(format.serialize(chosen)?.trim().to_string()),
    }
}

fn select_override<'a>(key: &str, mapping: &'a Mapping, environment: &str) -> Option<&'a RawValue> {
    // Every key must be a string for the mapping to be a variant map at all.
    let mut tags = Vec::with_capacity(mapping.len());
    for (k, v) in mapping.iter() {
        tags.push((k.as_str()?, v));
    }

    let env_tag = format!(".{environment}");
    let found = [env_tag.as_str(), DEFAULT_TAG]
        .into_iter()
        .find_map(|wanted| tags.iter().find(|(tag, _)| *tag == wanted).map(|(_, v)| *v))?;

    // An explicit null selects nothing.
    if found.is_null() {
        return None;
    }

    if let Some((extra, _)) = tags
        .iter()
        .find(|(tag, _)| *tag != DEFAULT_TAG && !tag.starts_with('.'))
    {
        debug!(key, extra = *extra, "not using environment override because of untagged key");
        return None;
    }

    Some(found)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Plain,
    Default,
    Exact,
}

/// Collapses `base.[tag]` keys into `base` for the active environment.
///
/// The exact tag wins over `default`, which wins over a plain `base` key;
/// entries tagged for other environments are dropped. With an empty
/// `environment` keys are left untouched.
pub fn collapse_variant_keys(document: Mapping, environment: &str) -> Mapping {
    if environment.is_empty() {
        return document;
    }

    let mut ranked: IndexMap<Scalar, (Rank, RawValue)> = IndexMap::with_capacity(document.len());

    for (key, value) in document {
        let variant = key
            .as_str()
            .and_then(split_variant_key)
            .map(|(base, tag)| (base.to_string(), tag.to_string()));

        let (base, rank) = match variant {
            Some((base, tag)) if tag == environment => (Scalar::String(base), Rank::Exact),
            Some((base, tag)) if tag == DEFAULT_TAG => (Scalar::String(base), Rank::Default),
            Some((base, tag)) => {
                debug!(key = %base, tag = %tag, environment, "skipping variant for another environment");
                continue;
            }
            None => (key, Rank::Plain),
        };

        match ranked.entry(base) {
            Entry::Occupied(mut slot) => {
                if slot.get().0 < rank {
                    slot.insert((rank, value));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((rank, value));
            }
        }
    }

    let mut collapsed = Mapping::new();
    for (key, (rank, value)) in ranked {
        if rank == Rank::Default {
            debug!(key = key.as_str().unwrap_or_default(), "using default variant");
        }
        collapsed.insert(key, value);
    }
    collapsed
}

/// Splits `base.[tag]` into `(base, tag)`.
fn split_variant_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_suffix(']')?;
    let mut parts = rest.split(".[");
    let base = parts.next()?;
    let tag = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((base, tag))
}
