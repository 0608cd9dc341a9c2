use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::info;

use super::directives::Directives;
use super::document::{Format, Mapping, RawValue};
use super::file::{write_document, DocumentFile};
use super::resolve::Resolver;
use super::table::VariableTable;
use super::ConfigError;

/// Builder for materializing configuration from a variables document and a
/// template.
///
/// The variables file is resolved for the selected environment, the template
/// is rendered with the result, and the rendered document is deserialized.
/// Without a template, a plain document file is loaded instead. An optional
/// override document is merged on top: nested mappings merge recursively,
/// other values (including sequences) are replaced entirely.
///
/// ## Example
///
/// ```no_run
/// use varsmith::Config;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     name: String,
///     port: u16,
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_environment("prod")
///     .with_vars_file("deploy/vars.yaml")
///     .with_template_file("deploy/app.yaml.tpl")
///     .with_override_file("/etc/app/override.yaml", false)
///     .build()?;
/// # Ok::<(), varsmith::ConfigError>(())
/// ```
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct Config {
    environment: String,
    vars: Option<DocumentFile>,
    template: Option<DocumentFile>,
    file: Option<DocumentFile>,
    overrides: Option<DocumentFile>,
    output: Option<PathBuf>,
    format: Option<Format>,
    directives: Directives,
}

/// A rendered document together with the variables used to render it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// `None` when neither a template nor a document file produced text.
    pub text: Option<String>,
    pub variables: VariableTable,
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Selects the environment used for variant selection. Empty disables it.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Sets the required variables document.
    pub fn with_vars_file(mut self, path: impl AsRef<Path>) -> Self {
        self.vars = Some(DocumentFile::new(path, true));
        self
    }

    /// Sets the template rendered with the resolved variables.
    ///
    /// Requires [`with_vars_file`](Self::with_vars_file).
    pub fn with_template_file(mut self, path: impl AsRef<Path>) -> Self {
        self.template = Some(DocumentFile::new(path, true));
        self
    }

    /// Sets a plain document, used when no template is set.
    ///
    /// If `required` is `true`, the build will fail if the file doesn't exist.
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        self.file = Some(DocumentFile::new(path, required));
        self
    }

    /// Sets a document merged over the rendered one.
    pub fn with_override_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        self.overrides = Some(DocumentFile::new(path, required));
        self
    }

    /// Writes the rendered template to `path`.
    pub fn with_output_file(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// Forces a document format instead of inferring it from file extensions.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_directives(mut self, directives: Directives) -> Self {
        self.directives = directives;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Resolves variables and produces the document text without parsing it.
    ///
    /// A template file without a variables file is an error.
    pub fn render(&self) -> Result<Rendered, ConfigError> {
        if let (None, Some(template)) = (&self.vars, &self.template) {
            return Err(ConfigError::TemplateWithoutVariables(
                template.path().to_path_buf(),
            ));
        }

        let mut variables = VariableTable::new();

        if let Some(vars_file) = &self.vars {
            let resolver = Resolver::new(self.environment.as_str())
                .with_format(self.format_of(vars_file.path()))
                .with_directives(self.directives.clone());
            let vars_text = vars_file.read()?.unwrap_or_default();
            resolver.resolve_into(&vars_text, &mut variables)?;
            info!(
                path = %vars_file.path().display(),
                environment = %self.environment,
                count = variables.len(),
                "resolved variables"
            );

            if let Some(template_file) = &self.template {
                let template = template_file.read()?.unwrap_or_default();
                let text = resolver.render(&template, &variables)?;
                info!(path = %template_file.path().display(), "rendered template");

                if let Some(output) = &self.output {
                    write_document(output, &text)?;
                    info!(path = %output.display(), "wrote rendered document");
                }

                return Ok(Rendered {
                    text: Some(text),
                    variables,
                });
            }
        }

        let text = match &self.file {
            Some(file) => file.read()?,
            None => None,
        };
        Ok(Rendered { text, variables })
    }

    /// Builds the configuration by rendering, merging, and deserializing.
    pub fn build<T: DeserializeOwned>(self) -> Result<T, ConfigError> {
        self.build_with_variables().map(|(config, _)| config)
    }

    /// Like [`build`](Self::build), also returning the resolved variables.
    pub fn build_with_variables<T: DeserializeOwned>(
        self,
    ) -> Result<(T, VariableTable), ConfigError> {
        let Rendered { text, variables } = self.render()?;
        let format = self.document_format();

        let mut document = match (text, self.document_path()) {
            (Some(text), path) => format.parse(&text).map_err(|source| ConfigError::ParseError {
                path: path.map(Path::to_path_buf).unwrap_or_default(),
                source,
            })?,
            (None, _) => Mapping::new(),
        };

        if let Some(overrides) = &self.overrides {
            if let Some(text) = overrides.read()? {
                let overlay = self
                    .format_of(overrides.path())
                    .parse(&text)
                    .map_err(|source| ConfigError::ParseError {
                        path: overrides.path().to_path_buf(),
                        source,
                    })?;
                deep_merge(&mut document, overlay);
            }
        }

        let merged = format.serialize(&RawValue::Mapping(document))?;
        let config = format
            .deserialize(&merged)
            .map_err(ConfigError::DeserializeError)?;
        Ok((config, variables))
    }

    fn format_of(&self, path: &Path) -> Format {
        self.format.unwrap_or_else(|| Format::from_path(path))
    }

    /// Path whose extension decides the rendered document's format.
    fn document_path(&self) -> Option<&Path> {
        match (&self.vars, &self.template) {
            (Some(_), Some(template)) => self.output.as_deref().or(Some(template.path())),
            _ => self.file.as_ref().map(DocumentFile::path),
        }
    }

    fn document_format(&self) -> Format {
        self.document_path()
            .map(|path| self.format_of(path))
            .unwrap_or_else(|| self.format.unwrap_or_default())
    }
}

fn deep_merge(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(RawValue::Mapping(base_map)), RawValue::Mapping(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
