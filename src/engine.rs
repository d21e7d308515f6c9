//! Query resolution engine.
//!
//! Ties the registry, the template cache and the dialect resolver together
//! behind a single call:
//!
//! ```rust,ignore
//! let engine = QueryEngine::builder()
//!     .reader(FileReader::new(["queries/"]))
//!     .dialect(Dialect::MySql)
//!     .build()?;
//!
//! let sql = engine.render_sql("users", "byName", &params)?;
//! ```

use crate::config::EngineConfig;
use crate::dialect::{ConnectionContext, Dialect, DialectResolver, DialectStrategy};
use crate::error::{LurryError, LurryResult};
use crate::model::QueryKey;
use crate::params::{ParamView, Params};
use crate::registry::Registry;
use crate::source::{AutoDecoder, Decoder, DefinitionReader, FileReader};
use crate::template::{CompiledTemplate, TemplateCache};
use std::sync::Arc;

/// Renders named SQL templates.
///
/// Safe to share between threads. Definitions are loaded on the first
/// request, templates are compiled on first reference, and the dialect is
/// detected the first time a template needs escaping.
#[derive(Debug)]
pub struct QueryEngine {
    registry: Registry,
    templates: TemplateCache,
    dialect: DialectResolver,
}

impl QueryEngine {
    pub fn new(registry: Registry, dialect: DialectResolver) -> Self {
        Self {
            registry,
            templates: TemplateCache::new(),
            dialect,
        }
    }

    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::default()
    }

    /// Build an engine reading the configured sources.
    pub fn from_config(config: &EngineConfig) -> LurryResult<Self> {
        Self::builder().config(config).build()
    }

    /// Render `entity::query` against `params`.
    ///
    /// Parameters the template references but the caller did not supply
    /// read as `null`.
    pub fn render_sql(&self, entity: &str, query: &str, params: &Params) -> LurryResult<String> {
        let template = self.template(entity, query)?;
        let strategy: &dyn DialectStrategy = if template.uses_dialect() {
            self.dialect.resolve()?.strategy()
        } else {
            Dialect::Default.strategy()
        };

        let sql = template.render(ParamView::new(params), strategy);
        tracing::trace!("Rendered {}::{}: {}", entity, query, sql);
        Ok(sql)
    }

    /// The compiled template for `entity::query`.
    pub fn template(&self, entity: &str, query: &str) -> LurryResult<Arc<CompiledTemplate>> {
        let definition = self
            .registry
            .resolve(entity, query)?
            .ok_or_else(|| LurryError::not_found(entity, query))?;
        self.templates
            .get_or_compile(&QueryKey::new(entity, query), &definition.sql)
    }

    /// Raw template text for `entity::query`, if registered.
    pub fn raw_template(&self, entity: &str, query: &str) -> LurryResult<Option<&str>> {
        Ok(self.registry.resolve(entity, query)?.map(|d| d.sql.as_str()))
    }

    /// Every registered query, sorted.
    pub fn keys(&self) -> LurryResult<Vec<QueryKey>> {
        Ok(self.registry.keys()?.into_iter().cloned().collect())
    }

    /// The active dialect, detecting it if necessary.
    pub fn dialect(&self) -> LurryResult<Dialect> {
        self.dialect.resolve()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}

/// Builder for [`QueryEngine`].
#[derive(Default)]
pub struct QueryEngineBuilder {
    reader: Option<Box<dyn DefinitionReader>>,
    decoder: Option<Box<dyn Decoder>>,
    dialect: Option<Dialect>,
    context: Option<Arc<dyn ConnectionContext>>,
}

impl QueryEngineBuilder {
    /// Where definitions come from. Required.
    pub fn reader(mut self, reader: impl DefinitionReader + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    /// Read definitions from files and directories, in order.
    pub fn sources<I, P>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        self.reader(FileReader::new(paths))
    }

    /// How streams are decoded. Defaults to [`AutoDecoder`].
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Use a fixed dialect. Takes precedence over [`context`](Self::context).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Detect the dialect from a connection on first use.
    pub fn context(mut self, context: impl ConnectionContext + 'static) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Apply sources, format and dialect from a config file.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        if !config.sources.is_empty() {
            self = self.sources(config.sources.iter().cloned());
        }
        if let Some(format) = config.format {
            self = self.decoder(AutoDecoder::new().with_fallback(format));
        }
        if let Some(dialect) = config.dialect {
            self = self.dialect(dialect);
        }
        self
    }

    pub fn build(self) -> LurryResult<QueryEngine> {
        let reader = self
            .reader
            .ok_or_else(|| LurryError::Config("no definition sources configured".to_string()))?;
        let decoder = self
            .decoder
            .unwrap_or_else(|| Box::new(AutoDecoder::new()));

        let dialect = match (self.dialect, self.context) {
            (Some(dialect), _) => DialectResolver::fixed(dialect),
            (None, Some(context)) => DialectResolver::detect(context),
            (None, None) => DialectResolver::fixed(Dialect::Default),
        };

        Ok(QueryEngine::new(Registry::from_boxed(reader, decoder), dialect))
    }
}

impl std::fmt::Debug for QueryEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngineBuilder")
            .field("reader", &self.reader.is_some())
            .field("decoder", &self.decoder.is_some())
            .field("dialect", &self.dialect)
            .field("context", &self.context.is_some())
            .finish()
    }
}
