//! Functions callable from template actions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::error;

use super::error::{EncryptError, TemplateError};
use super::template::Value;

/// A function callable by name from a template action.
///
/// Errors are plain messages; the executor attaches the function name.
pub trait Directive: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, String>;
}

impl<F> Directive for F
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, String> {
        self(args)
    }
}

/// Encrypts secrets emitted by the `encrypt` directive.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptError>;
}

impl<F> Encryptor for F
where
    F: Fn(&str) -> Result<String, EncryptError> + Send + Sync,
{
    fn encrypt(&self, plaintext: &str) -> Result<String, EncryptError> {
        self(plaintext)
    }
}

/// The table of functions a template may call.
///
/// Starts with `indent` and `encrypt`. Each resolver owns its own table.
///
/// ```
/// use varsmith::{Directives, EncryptError};
///
/// let directives = Directives::new()
///     .with_encryptor(|plain: &str| Ok::<String, EncryptError>(plain.chars().rev().collect()));
/// assert!(directives.contains("encrypt"));
/// ```
#[derive(Clone)]
pub struct Directives {
    table: BTreeMap<String, Arc<dyn Directive>>,
}

impl Directives {
    pub fn new() -> Self {
        let mut table: BTreeMap<String, Arc<dyn Directive>> = BTreeMap::new();
        table.insert("indent".to_string(), Arc::new(indent_directive));
        table.insert("encrypt".to_string(), Arc::new(Encrypt { encryptor: None }));
        Self { table }
    }

    /// Sets the collaborator used by `encrypt`.
    pub fn with_encryptor(self, encryptor: impl Encryptor + 'static) -> Self {
        self.register(
            "encrypt",
            Encrypt {
                encryptor: Some(Arc::new(encryptor)),
            },
        )
    }

    /// Adds or replaces a directive.
    pub fn register(mut self, name: impl Into<String>, directive: impl Directive + 'static) -> Self {
        self.table.insert(name.into(), Arc::new(directive));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub(crate) fn call(&self, name: &str, args: &[Value]) -> Result<Value, TemplateError> {
        let directive = self
            .table
            .get(name)
            .ok_or_else(|| TemplateError::UnknownFunction(name.to_string()))?;

        directive.call(args).map_err(|message| TemplateError::Call {
            function: name.to_string(),
            message,
        })
    }
}

impl Default for Directives {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Directives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}

/// Prefixes every line of `text`, blank ones included, with `count` spaces.
pub fn indent(text: &str, count: usize) -> String {
    let pad = " ".repeat(count);
    text.split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_directive(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Str(text), Value::Int(count)] => {
            let count = usize::try_from(*count)
                .map_err(|_| format!("indent width must not be negative, got {count}"))?;
            Ok(Value::Str(indent(text, count)))
        }
        [_, _] => Err("expected (string, integer) arguments".to_string()),
        _ => Err(format!("wrong number of args: want 2 got {}", args.len())),
    }
}

struct Encrypt {
    encryptor: Option<Arc<dyn Encryptor>>,
}

impl Directive for Encrypt {
    fn call(&self, args: &[Value]) -> Result<Value, String> {
        let plaintext = match args {
            [Value::Str(s)] => s,
            [_] => return Err("expected a string argument".to_string()),
            _ => return Err(format!("wrong number of args: want 1 got {}", args.len())),
        };

        let result = match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(plaintext),
            None => Err(EncryptError::new("no encryptor configured")),
        };

        match result {
            Ok(ciphertext) => Ok(Value::Str(ciphertext)),
            Err(err) => abort_on_encryption_failure(&err),
        }
    }
}

/// Logs the failure and terminates the process.
fn abort_on_encryption_failure(err: &EncryptError) -> ! {
    error!(error = %err, "encryption failed while materializing configuration");
    std::process::exit(1)
}
