//! Definition decoders.
//!
//! Supported layouts:
//!
//! ```text
//! JSON  [{"name": "app.User", "queries": [{"name": "get", "sql": "SELECT ..."}]}]
//!
//! YAML  app.User:
//!         get: SELECT ...
//!         find:
//!           sql: SELECT ...
//!
//! XML   <entities>
//!         <entity name="app.User">
//!           <query name="get">SELECT ...</query>
//!         </entity>
//!       </entities>
//! ```

use super::SourceStream;
use crate::error::{LurryError, LurryResult};
use crate::model::{EntityDefinition, QueryDefinition};
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

/// Turns one definition stream into entities.
pub trait Decoder: Send + Sync {
    fn decode(&self, stream: SourceStream) -> LurryResult<Vec<EntityDefinition>>;
}

/// Definition file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    #[serde(alias = "yml")]
    Yaml,
    Xml,
}

impl Format {
    /// Detect the format from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        ext.parse().ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "JSON",
            Format::Yaml => "YAML",
            Format::Xml => "XML",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = LurryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "xml" => Ok(Format::Xml),
            other => Err(LurryError::Config(format!(
                "Unknown definition format '{}'. Expected: json, yaml, or xml",
                other
            ))),
        }
    }
}

impl Decoder for Format {
    fn decode(&self, stream: SourceStream) -> LurryResult<Vec<EntityDefinition>> {
        let name = stream.name.clone();
        let text = read_text(*self, stream)?;
        let entities = match self {
            Format::Json => decode_json(&name, &text)?,
            Format::Yaml => decode_yaml(&name, &text)?,
            Format::Xml => decode_xml(&name, &text)?,
        };
        tracing::trace!("Decoded {} entities from {}", entities.len(), name);
        Ok(entities)
    }
}

/// Picks the decoder from the stream name's extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDecoder {
    fallback: Option<Format>,
}

impl AutoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format used when the extension is missing or unknown.
    pub fn with_fallback(mut self, format: Format) -> Self {
        self.fallback = Some(format);
        self
    }
}

impl Decoder for AutoDecoder {
    fn decode(&self, stream: SourceStream) -> LurryResult<Vec<EntityDefinition>> {
        match Format::from_path(&stream.name).or(self.fallback) {
            Some(format) => format.decode(stream),
            None => Err(LurryError::format(
                "definition",
                stream.name,
                "cannot determine format from extension",
            )),
        }
    }
}

fn read_text(format: Format, mut stream: SourceStream) -> LurryResult<String> {
    let mut text = String::new();
    match stream.reader.read_to_string(&mut text) {
        Ok(_) => Ok(text),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            Err(LurryError::format(format.name(), stream.name, e))
        }
        Err(e) => Err(LurryError::source(stream.name, e)),
    }
}

fn decode_json(origin: &str, text: &str) -> LurryResult<Vec<EntityDefinition>> {
    serde_json::from_str(text).map_err(|e| LurryError::format("JSON", origin, e))
}

fn decode_yaml(origin: &str, text: &str) -> LurryResult<Vec<EntityDefinition>> {
    use serde_yaml::Value;

    let err = |message: String| LurryError::format("YAML", origin, message);

    let doc: Value = serde_yaml::from_str(text).map_err(|e| err(e.to_string()))?;
    let entities = match doc {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(m) => m,
        _ => return Err(err("top level must be a mapping of entities".to_string())),
    };

    let mut result = Vec::with_capacity(entities.len());
    for (entity, queries) in entities {
        let entity = entity
            .as_str()
            .ok_or_else(|| err("entity names must be strings".to_string()))?
            .to_string();

        let queries = match queries {
            Value::Null => serde_yaml::Mapping::new(),
            Value::Mapping(m) => m,
            _ => return Err(err(format!("entity '{}' must map query names", entity))),
        };

        let mut defs = Vec::with_capacity(queries.len());
        for (name, value) in queries {
            let name = name
                .as_str()
                .ok_or_else(|| err(format!("query names in '{}' must be strings", entity)))?
                .to_string();
            let sql = match &value {
                Value::String(sql) => sql.clone(),
                Value::Mapping(m) => match m.get("sql") {
                    Some(Value::String(sql)) => sql.clone(),
                    _ => return Err(err(format!("query '{}' has no 'sql' string", name))),
                },
                _ => return Err(err(format!("unsupported value for query '{}'", name))),
            };
            defs.push(QueryDefinition::new(name, sql));
        }
        result.push(EntityDefinition::new(entity, defs));
    }
    Ok(result)
}

fn decode_xml(origin: &str, text: &str) -> LurryResult<Vec<EntityDefinition>> {
    let err = |message: String| LurryError::format("XML", origin, message);

    let name_attr = |e: &BytesStart<'_>, element: &str| -> LurryResult<String> {
        match e.try_get_attribute("name") {
            Ok(Some(attr)) => attr
                .unescape_value()
                .map(|v| v.into_owned())
                .map_err(|x| err(x.to_string())),
            Ok(None) => Err(err(format!("<{}> requires a name attribute", element))),
            Err(x) => Err(err(x.to_string())),
        }
    };

    let mut reader = quick_xml::Reader::from_str(text);
    let mut entities: Vec<EntityDefinition> = Vec::new();
    let mut current: Option<EntityDefinition> = None;
    let mut query: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"entity" => {
                    if current.is_some() {
                        return Err(err("nested <entity> elements".to_string()));
                    }
                    current = Some(EntityDefinition::new(name_attr(&e, "entity")?, Vec::new()));
                }
                b"query" => {
                    if current.is_none() {
                        return Err(err("<query> outside of <entity>".to_string()));
                    }
                    query = Some((name_attr(&e, "query")?, String::new()));
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"query" => {
                let entity = current
                    .as_mut()
                    .ok_or_else(|| err("<query> outside of <entity>".to_string()))?;
                entity
                    .queries
                    .push(QueryDefinition::new(name_attr(&e, "query")?, String::new()));
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"entity" => {
                entities.push(EntityDefinition::new(name_attr(&e, "entity")?, Vec::new()));
            }
            Ok(Event::Text(t)) => {
                if let Some((_, sql)) = query.as_mut() {
                    let text = t.unescape().map_err(|x| err(x.to_string()))?;
                    sql.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some((_, sql)) = query.as_mut() {
                    sql.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"query" => {
                    if let (Some(entity), Some((name, sql))) = (current.as_mut(), query.take()) {
                        entity
                            .queries
                            .push(QueryDefinition::new(name, sql.trim().to_string()));
                    }
                }
                b"entity" => {
                    if let Some(entity) = current.take() {
                        entities.push(entity);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(err(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    if current.is_some() {
        return Err(err("unclosed <entity> element".to_string()));
    }
    Ok(entities)
}
