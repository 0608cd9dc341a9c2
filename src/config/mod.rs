//! Variable resolution and configuration materialization.

mod builder;
mod directives;
mod document;
mod error;
mod file;
mod resolve;
mod rewrite;
mod select;
mod table;
mod template;

pub use builder::{Config, Rendered};
pub use directives::{indent, Directive, Directives, Encryptor};
pub use document::{Format, Mapping, RawValue, Scalar};
pub use error::{ConfigError, DocumentError, EncryptError, TemplateError};
pub use resolve::{render_template, resolve, Resolver, MAX_ROUNDS};
pub use rewrite::rewrite_directives;
pub use select::{collapse_variant_keys, select_value};
pub use table::VariableTable;
pub use template::{Template, Value};
