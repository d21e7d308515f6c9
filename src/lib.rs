//! # Lurry — Named SQL Templates
//!
//! > **Keep SQL out of the code. Call it by name.**
//!
//! Lurry resolves an `(entity, query)` pair to ready-to-run SQL. Templates
//! are loaded once from definition files, compiled on first use, and
//! rendered against parameters with escaping for the connected database.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use lurry::prelude::*;
//!
//! let engine = QueryEngine::builder()
//!     .sources(["queries/"])
//!     .dialect(Dialect::MySql)
//!     .build()?;
//!
//! let mut params = Params::new();
//! params.insert("name".into(), "O'Brien".into());
//!
//! let sql = engine.render_sql("app.User", "search", &params)?;
//! // => "SELECT * FROM users WHERE 1 = 1 AND name = 'O''Brien' LIMIT 50"
//! ```
//!
//! ## Template Syntax
//!
//! | Form          | Meaning                                   |
//! |---------------|-------------------------------------------|
//! | `$name`       | Parameter lookup                          |
//! | `${expr}`     | Expression, rendered as text              |
//! | `c ? a : b`   | Conditional fragment                      |
//! | `a ?: b`      | `a` if truthy, else `b`                   |
//! | `escape(x)`   | Escape through the active dialect         |
//! | `join(xs)`    | Escape and comma-join, for `IN (...)`     |
//! | `\$`          | Literal `$`                               |
//! | `\\`          | Literal `\`                               |

pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod params;
pub mod registry;
pub mod source;
pub mod template;

pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::dialect::{ConnectionContext, Dialect, DialectStrategy, StaticContext};
    pub use crate::engine::{QueryEngine, QueryEngineBuilder};
    pub use crate::error::*;
    pub use crate::executor::LurryDB;
    pub use crate::model::{EntityKey, QueryDefinition, QueryKey, QueryName};
    pub use crate::params::Params;
    pub use crate::source::{AutoDecoder, FileReader, Format, MemoryReader};
    pub use crate::template::compile;
}

/// Render a single template string without a registry.
///
/// # Example
///
/// ```
/// use lurry::dialect::Dialect;
/// use lurry::params::Params;
///
/// let mut params = Params::new();
/// params.insert("name".to_string(), "O'Brien".into());
///
/// let sql = lurry::render("WHERE name = ${escape(name)}", &params, Dialect::MySql).unwrap();
/// assert_eq!(sql, "WHERE name = 'O''Brien'");
/// ```
pub fn render(
    template: &str,
    params: &params::Params,
    dialect: dialect::Dialect,
) -> error::LurryResult<String> {
    let compiled = template::compile(template)?;
    Ok(compiled.render(params::ParamView::new(params), dialect.strategy()))
}
