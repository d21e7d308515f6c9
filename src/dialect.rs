//! SQL dialects and string escaping.
//!
//! Each dialect maps to a [`DialectStrategy`] that makes strings safe to
//! inline into SQL. The dialect is detected once per engine from the
//! connection's reported product name; unknown products use the default
//! strategy.
//!
//! | Strategy | `O'Brien` | `a\b` | quotes added |
//! |----------|-----------|-------|--------------|
//! | Default  | `O''Brien` | `a\b` | no |
//! | MySQL    | `'O''Brien'` | `'a\\b'` | yes |

use crate::error::{LurryError, LurryResult};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// String escaping policy of one dialect.
pub trait DialectStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Escape a non-null string.
    fn escape_str(&self, raw: &str) -> String;

    /// Escape a nullable string. `None` stays `None`.
    fn escape(&self, raw: Option<&str>) -> Option<String> {
        raw.map(|s| self.escape_str(s))
    }

    /// Escape every non-null entry and join with commas, for `IN (...)`.
    fn join_escaped(&self, values: &[Option<&str>]) -> String {
        values
            .iter()
            .flatten()
            .map(|s| self.escape_str(s))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Doubles single quotes. Quoting is left to the template.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl DialectStrategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn escape_str(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len() + 2);
        for c in raw.chars() {
            if c == '\'' {
                out.push(c);
            }
            out.push(c);
        }
        out
    }
}

/// Doubles single quotes and backslashes, and wraps the result in quotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlStrategy;

impl DialectStrategy for MySqlStrategy {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn escape_str(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len() + 4);
        out.push('\'');
        for c in raw.chars() {
            if c == '\'' || c == '\\' {
                out.push(c);
            }
            out.push(c);
        }
        out.push('\'');
        out
    }
}

static DEFAULT_STRATEGY: DefaultStrategy = DefaultStrategy;
static MYSQL_STRATEGY: MySqlStrategy = MySqlStrategy;

/// Known database products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Dialect {
    MySql,
    MariaDb,
    Oracle,
    Postgres,
    H2,
    Db2,
    SqlServer,
    Sqlite,
    Cassandra,
    #[default]
    Default,
}

impl Dialect {
    pub const ALL: [Dialect; 10] = [
        Dialect::MySql,
        Dialect::MariaDb,
        Dialect::Oracle,
        Dialect::Postgres,
        Dialect::H2,
        Dialect::Db2,
        Dialect::SqlServer,
        Dialect::Sqlite,
        Dialect::Cassandra,
        Dialect::Default,
    ];

    /// Map a reported product name to a dialect. Never fails: unknown
    /// products are [`Dialect::Default`].
    pub fn from_product_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.product_names().iter().any(|p| p.eq_ignore_ascii_case(name)))
            .unwrap_or(Dialect::Default)
    }

    /// Product names as reported by drivers.
    pub fn product_names(&self) -> &'static [&'static str] {
        match self {
            Dialect::MySql => &["MySQL"],
            Dialect::MariaDb => &["MariaDB"],
            Dialect::Oracle => &["Oracle"],
            Dialect::Postgres => &["PostgreSQL"],
            Dialect::H2 => &["H2"],
            Dialect::Db2 => &["Db2", "DB2/LINUXX8664", "DB2/NT64"],
            Dialect::SqlServer => &["SQLServer", "Microsoft SQL Server"],
            Dialect::Sqlite => &["SQLite"],
            Dialect::Cassandra => &["Cassandra"],
            Dialect::Default => &[],
        }
    }

    pub fn strategy(&self) -> &'static dyn DialectStrategy {
        match self {
            Dialect::MySql | Dialect::MariaDb => &MYSQL_STRATEGY,
            _ => &DEFAULT_STRATEGY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Oracle => "oracle",
            Dialect::Postgres => "postgres",
            Dialect::H2 => "h2",
            Dialect::Db2 => "db2",
            Dialect::SqlServer => "sqlserver",
            Dialect::Sqlite => "sqlite",
            Dialect::Cassandra => "cassandra",
            Dialect::Default => "default",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = LurryError;

    /// Accepts short names (`mysql`, `postgres`, `mssql`, ...) and product
    /// names. Unlike detection, an unknown name here is a config error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = match s.to_ascii_lowercase().as_str() {
            "mysql" => Some(Dialect::MySql),
            "mariadb" => Some(Dialect::MariaDb),
            "oracle" => Some(Dialect::Oracle),
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            "h2" => Some(Dialect::H2),
            "db2" => Some(Dialect::Db2),
            "sqlserver" | "mssql" => Some(Dialect::SqlServer),
            "sqlite" => Some(Dialect::Sqlite),
            "cassandra" => Some(Dialect::Cassandra),
            "default" => Some(Dialect::Default),
            _ => None,
        };
        short
            .or_else(|| {
                let detected = Dialect::from_product_name(s);
                (detected != Dialect::Default).then_some(detected)
            })
            .ok_or_else(|| LurryError::Config(format!("Unknown dialect '{}'", s)))
    }
}

impl TryFrom<String> for Dialect {
    type Error = LurryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Something that can report the database product name, typically a live
/// connection.
pub trait ConnectionContext: Send + Sync {
    fn product_name(&self) -> LurryResult<String>;
}

/// A context with a product name known up front.
#[derive(Debug, Clone)]
pub struct StaticContext {
    product: String,
}

impl StaticContext {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
        }
    }
}

impl ConnectionContext for StaticContext {
    fn product_name(&self) -> LurryResult<String> {
        Ok(self.product.clone())
    }
}

/// Resolves and caches the dialect for one engine.
///
/// There is no invalidation: a different connection needs a new resolver.
pub struct DialectResolver {
    context: Option<Arc<dyn ConnectionContext>>,
    decision: OnceCell<Dialect>,
}

impl DialectResolver {
    /// Detect from the context on first use.
    pub fn detect(context: Arc<dyn ConnectionContext>) -> Self {
        Self {
            context: Some(context),
            decision: OnceCell::new(),
        }
    }

    /// Use a known dialect without any detection.
    pub fn fixed(dialect: Dialect) -> Self {
        Self {
            context: None,
            decision: OnceCell::with_value(dialect),
        }
    }

    pub fn resolve(&self) -> LurryResult<Dialect> {
        self.decision
            .get_or_try_init(|| {
                let Some(context) = &self.context else {
                    return Ok(Dialect::Default);
                };
                let product = context.product_name().map_err(|e| match e {
                    LurryError::DialectDetection(_) => e,
                    other => LurryError::DialectDetection(other.to_string()),
                })?;
                let dialect = Dialect::from_product_name(&product);
                if dialect == Dialect::Default {
                    tracing::warn!("Unrecognized database product '{}', using default escaping", product);
                } else {
                    tracing::debug!("Detected dialect {} from product '{}'", dialect, product);
                }
                Ok(dialect)
            })
            .copied()
    }

    /// The cached decision, if detection already ran.
    pub fn decided(&self) -> Option<Dialect> {
        self.decision.get().copied()
    }
}

impl fmt::Debug for DialectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectResolver")
            .field("decision", &self.decided())
            .finish()
    }
}
