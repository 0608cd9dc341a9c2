//! Application context holding materialized configuration.

use serde::de::DeserializeOwned;

use crate::config::{Config, VariableTable};
use crate::Error;

/// Typed configuration plus the variables and environment it was rendered with.
///
/// Each context owns its own state, so several can coexist in one process.
///
/// ## Example
///
/// ```no_run
/// use varsmith::{AppContext, Config};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let ctx: AppContext<MyConfig> = AppContext::materialize(
///     Config::builder()
///         .with_environment("prod")
///         .with_vars_file("vars.yaml")
///         .with_template_file("app.yaml.tpl"),
/// )?;
///
/// println!("{} on {}", ctx.config().name, ctx.environment());
/// # Ok::<(), varsmith::Error>(())
/// ```
#[derive(Debug)]
pub struct AppContext<C> {
    config: C,
    variables: VariableTable,
    environment: String,
}

impl<C> AppContext<C> {
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Variables resolved while rendering the configuration.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

impl<C: DeserializeOwned> AppContext<C> {
    /// Runs the materialization pipeline and wraps its result.
    pub fn materialize(config: Config) -> Result<Self, Error> {
        let environment = config.environment().to_string();
        let (config, variables) = config.build_with_variables()?;
        AppContext::builder()
            .with_environment(environment)
            .with_config(config)
            .with_variables(variables)
            .build()
    }
}

impl AppContext<()> {
    /// Creates a new builder for constructing an `AppContext`.
    pub fn builder() -> AppContextBuilder<()> {
        AppContextBuilder {
            config: None,
            variables: VariableTable::new(),
            environment: String::new(),
        }
    }
}

/// Builder for constructing an [`AppContext`].
///
/// Starts as `AppContextBuilder<()>` and becomes `AppContextBuilder<C>` once
/// [`with_config`](AppContextBuilder::with_config) is called.
#[derive(Debug)]
#[must_use = "builders do nothing until .build() is called"]
pub struct AppContextBuilder<C> {
    config: Option<C>,
    variables: VariableTable,
    environment: String,
}

impl AppContextBuilder<()> {
    pub fn with_config<C>(self, config: C) -> AppContextBuilder<C> {
        AppContextBuilder {
            config: Some(config),
            variables: self.variables,
            environment: self.environment,
        }
    }
}

impl<C> AppContextBuilder<C> {
    pub fn with_variables(mut self, variables: VariableTable) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Returns an error if no configuration was provided.
    pub fn build(self) -> Result<AppContext<C>, Error> {
        Ok(AppContext {
            config: self.config.ok_or(Error::MissingConfig)?,
            variables: self.variables,
            environment: self.environment,
        })
    }
}
