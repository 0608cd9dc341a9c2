pub mod config;
pub mod context;
mod error;

pub use config::{
    render_template, resolve, Config, ConfigError, Directives, EncryptError, Encryptor, Format,
    Resolver, VariableTable,
};
pub use context::AppContext;
pub use error::Error;
