//! Mapper registry and configuration file loading
//!
//! Layouts are looked up by id in a [`MapperRegistry`]. The registry starts
//! with the built-in layouts and can be extended from a TOML file:
//!
//! ```toml
//! [defaults]
//! layout = "my-app"
//! search_stacktrace = true
//!
//! [mappers.my-app]
//! from = "base.java"
//! entry = '^(?P<time>\S+) (?P<level>\w+) (?P<message>.+)$'
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::mapper::RegexMapper;

/// Fully qualified Java exception names
pub const JAVA_EXCEPTION: &str = r"(?P<exception>\w+(\.\w+)+(Exception|Error|Fault))";

/// Java stacktrace elements, causes and elided frames
pub const JAVA_STACKTRACE: &str = r"^(\s+at)|(Caused by:)|(\s+\.{3}\s\d+\smore)";

/// Every non-empty line is a new entry
pub const JAVA_ENTRY: &str = r"(?P<message>.+)";

/// WildFly / JBoss EAP server log line
pub const WILDFLY_ENTRY: &str = concat!(
    r"(?P<time>(?P<date>\d{2,4}-\d{2}-\d{2,4}\s)?(\d{2}:\d{2}:\d{2},\d{3}))",
    r"\s+\|?\s*(?P<level>\w+)\s+\|?\s*\[(?P<category>\S+)\]\s+\|?\s*\((?P<origin>[^)]+)\)?\s?\|?\s?",
    r"(?P<message>.+)",
);

/// Parsed configuration file
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub defaults: Defaults,
    pub mappers: BTreeMap<String, MapperConfig>,
}

/// Fallbacks for options not given on the command line
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Layout id to use when none is given
    pub layout: Option<String>,

    /// Scan continuation lines for exceptions
    pub search_stacktrace: Option<bool>,
}

/// One mapper definition, before inheritance is resolved
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Mapper whose patterns are inherited before applying this one's
    #[serde(alias = "base_id")]
    pub from: Option<String>,

    #[serde(alias = "entry_pattern")]
    pub entry: Option<String>,

    #[serde(alias = "exception_pattern")]
    pub exception: Option<String>,

    #[serde(alias = "stacktrace_pattern")]
    pub stacktrace: Option<String>,
}

impl ConfigFile {
    /// Read and parse a configuration file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }
}

impl FromStr for ConfigFile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// Layouts available to a run, keyed by id
#[derive(Clone, Debug, Default)]
pub struct MapperRegistry {
    mappers: HashMap<String, RegexMapper>,
}

impl MapperRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `base.java`, `wildfly` and `jboss-eap`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let exception = builtin(JAVA_EXCEPTION);
        let stacktrace = builtin(JAVA_STACKTRACE);

        registry.register(
            "base.java",
            RegexMapper::new(
                builtin(JAVA_ENTRY),
                Some(exception.clone()),
                Some(stacktrace.clone()),
            ),
        );
        let wildfly = RegexMapper::new(builtin(WILDFLY_ENTRY), Some(exception), Some(stacktrace));
        registry.register("wildfly", wildfly.clone());
        registry.register("jboss-eap", wildfly);
        registry
    }

    /// Add or replace a layout
    pub fn register(&mut self, id: impl Into<String>, mapper: RegexMapper) {
        self.mappers.insert(id.into(), mapper);
    }

    pub fn get(&self, id: &str) -> Option<&RegexMapper> {
        self.mappers.get(id)
    }

    /// Look up a layout, failing on unknown ids
    pub fn resolve(&self, id: &str) -> Result<&RegexMapper, ConfigError> {
        self.get(id)
            .ok_or_else(|| ConfigError::UnknownLayout(id.to_string()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.mappers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    /// Register every mapper of a parsed config file
    pub fn load(&mut self, config: &ConfigFile) -> Result<Vec<String>, ConfigError> {
        self.load_mappers(&config.mappers)
    }

    /// Register mapper definitions, resolving `from` chains first
    ///
    /// Definitions may inherit from registered layouts or from each other in
    /// any order. Nothing is registered unless every definition resolves.
    pub fn load_mappers(
        &mut self,
        definitions: &BTreeMap<String, MapperConfig>,
    ) -> Result<Vec<String>, ConfigError> {
        let mut resolver = Resolver {
            definitions,
            registered: &self.mappers,
            resolved: HashMap::new(),
            visiting: HashSet::new(),
        };
        for id in definitions.keys() {
            resolver.resolve(id, id)?;
        }

        let resolved = resolver.resolved;
        let ids: Vec<String> = definitions.keys().cloned().collect();
        for (id, mapper) in resolved {
            tracing::debug!(%id, "registered mapper");
            self.mappers.insert(id, mapper);
        }
        Ok(ids)
    }
}

struct Resolver<'a> {
    definitions: &'a BTreeMap<String, MapperConfig>,
    registered: &'a HashMap<String, RegexMapper>,
    resolved: HashMap<String, RegexMapper>,
    visiting: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, id: &str, requested_by: &str) -> Result<RegexMapper, ConfigError> {
        if let Some(mapper) = self.resolved.get(id) {
            return Ok(mapper.clone());
        }

        let definitions = self.definitions;
        if let Some(config) = definitions.get(id) {
            if !self.visiting.insert(id.to_string()) {
                return Err(ConfigError::InheritanceCycle(id.to_string()));
            }
            let mapper = self.build(id, config)?;
            self.visiting.remove(id);
            self.resolved.insert(id.to_string(), mapper.clone());
            return Ok(mapper);
        }

        self.registered
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBase {
                id: requested_by.to_string(),
                base: id.to_string(),
            })
    }

    fn build(&mut self, id: &str, config: &MapperConfig) -> Result<RegexMapper, ConfigError> {
        let mut entry = None;
        let mut exception = None;
        let mut stacktrace = None;

        if let Some(base_id) = non_empty(config.from.as_ref()) {
            // Redefining a registered id on top of itself extends the old layout
            let base = if base_id == id {
                self.registered
                    .get(base_id)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownBase {
                        id: id.to_string(),
                        base: base_id.to_string(),
                    })?
            } else {
                self.resolve(base_id, id)?
            };
            entry = Some(base.entry().clone());
            exception = base.exception().cloned();
            stacktrace = base.stacktrace().cloned();
        }

        if let Some(pattern) = non_empty(config.entry.as_ref()) {
            entry = Some(compile(id, "entry", pattern)?);
        }
        if let Some(pattern) = non_empty(config.exception.as_ref()) {
            exception = Some(compile(id, "exception", pattern)?);
        }
        if let Some(pattern) = non_empty(config.stacktrace.as_ref()) {
            stacktrace = Some(compile(id, "stacktrace", pattern)?);
        }

        let entry = entry.ok_or_else(|| ConfigError::MissingEntry(id.to_string()))?;
        Ok(RegexMapper::new(entry, exception, stacktrace))
    }
}

/// Compile a pattern shipped with the crate
fn builtin(pattern: &'static str) -> Regex {
    Regex::new(pattern).expect("built-in pattern is valid")
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn compile(id: &str, kind: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        id: id.to_string(),
        kind,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn definition(
        from: Option<&str>,
        entry: Option<&str>,
        exception: Option<&str>,
        stacktrace: Option<&str>,
    ) -> MapperConfig {
        MapperConfig {
            from: from.map(str::to_string),
            entry: entry.map(str::to_string),
            exception: exception.map(str::to_string),
            stacktrace: stacktrace.map(str::to_string),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = MapperRegistry::with_builtins();
        assert_eq!(registry.ids(), vec!["base.java", "jboss-eap", "wildfly"]);
        let java = registry.get("base.java").unwrap();
        assert_eq!(java.entry().as_str(), JAVA_ENTRY);
        assert_eq!(java.exception().unwrap().as_str(), JAVA_EXCEPTION);
        assert_eq!(java.stacktrace().unwrap().as_str(), JAVA_STACKTRACE);
    }

    #[test]
    fn test_inheritance_merges_patterns() {
        let mut defs = BTreeMap::new();
        defs.insert("base".to_string(), definition(None, Some("E0"), None, Some("S0")));
        defs.insert("child".to_string(), definition(Some("base"), None, Some("X1"), None));

        let mut registry = MapperRegistry::new();
        let ids = registry.load_mappers(&defs).unwrap();
        assert_eq!(ids, vec!["base", "child"]);

        let child = registry.get("child").unwrap();
        assert_eq!(child.entry().as_str(), "E0");
        assert_eq!(child.stacktrace().unwrap().as_str(), "S0");
        assert_eq!(child.exception().unwrap().as_str(), "X1");
    }

    #[test]
    fn test_inheritance_ignores_declaration_order() {
        let mut defs = BTreeMap::new();
        defs.insert("a-child".to_string(), definition(Some("z-base"), None, None, None));
        defs.insert("z-base".to_string(), definition(None, Some("^E"), None, None));

        let mut registry = MapperRegistry::new();
        registry.load_mappers(&defs).unwrap();
        assert_eq!(registry.get("a-child").unwrap().entry().as_str(), "^E");
    }

    #[test]
    fn test_inherit_from_builtin() {
        let mut defs = BTreeMap::new();
        defs.insert(
            "app".to_string(),
            definition(Some("base.java"), Some(r"^(?P<level>\w+) (?P<message>.+)"), None, None),
        );

        let mut registry = MapperRegistry::with_builtins();
        registry.load_mappers(&defs).unwrap();
        let app = registry.get("app").unwrap();
        assert_eq!(app.exception().unwrap().as_str(), JAVA_EXCEPTION);
        assert_eq!(app.stacktrace().unwrap().as_str(), JAVA_STACKTRACE);
    }

    #[test]
    fn test_redefine_builtin_on_itself() {
        let mut defs = BTreeMap::new();
        defs.insert("wildfly".to_string(), definition(Some("wildfly"), None, Some("Oops"), None));

        let mut registry = MapperRegistry::with_builtins();
        registry.load_mappers(&defs).unwrap();
        let wildfly = registry.get("wildfly").unwrap();
        assert_eq!(wildfly.entry().as_str(), WILDFLY_ENTRY);
        assert_eq!(wildfly.exception().unwrap().as_str(), "Oops");
    }

    #[test]
    fn test_missing_entry_is_error() {
        let mut defs = BTreeMap::new();
        defs.insert("app".to_string(), definition(None, None, Some("X"), None));

        let mut registry = MapperRegistry::new();
        let err = registry.load_mappers(&defs).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEntry(id) if id == "app"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_base_is_error() {
        let mut defs = BTreeMap::new();
        defs.insert("app".to_string(), definition(Some("nope"), Some("E"), None, None));

        let mut registry = MapperRegistry::new();
        let err = registry.load_mappers(&defs).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBase { id, base } if id == "app" && base == "nope"));
    }

    #[test]
    fn test_inheritance_cycle_is_error() {
        let mut defs = BTreeMap::new();
        defs.insert("a".to_string(), definition(Some("b"), Some("E"), None, None));
        defs.insert("b".to_string(), definition(Some("a"), Some("E"), None, None));

        let mut registry = MapperRegistry::new();
        let err = registry.load_mappers(&defs).unwrap_err();
        assert!(matches!(err, ConfigError::InheritanceCycle(_)));
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let mut defs = BTreeMap::new();
        defs.insert("app".to_string(), definition(None, Some("E"), None, Some("(unclosed")));

        let mut registry = MapperRegistry::new();
        let err = registry.load_mappers(&defs).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidRegex { id, kind, .. } if id == "app" && kind == "stacktrace")
        );
    }

    #[test]
    fn test_unknown_layout() {
        let registry = MapperRegistry::with_builtins();
        assert!(registry.resolve("wildfly").is_ok());
        assert!(matches!(
            registry.resolve("log4j"),
            Err(ConfigError::UnknownLayout(id)) if id == "log4j"
        ));
    }

    #[test]
    fn test_parse_toml_with_aliases() {
        let config: ConfigFile = r#"
            [defaults]
            layout = "child"
            search_stacktrace = true

            [mappers.base]
            entry_pattern = 'E0'
            stacktrace_pattern = 'S0'

            [mappers.child]
            base_id = "base"
            exception = 'X1'
        "#
        .parse()
        .unwrap();

        assert_eq!(config.defaults.layout.as_deref(), Some("child"));
        assert_eq!(config.defaults.search_stacktrace, Some(true));
        assert_eq!(
            config.mappers["child"],
            definition(Some("base"), None, Some("X1"), None)
        );

        let mut registry = MapperRegistry::new();
        registry.load(&config).unwrap();
        assert_eq!(registry.get("child").unwrap().entry().as_str(), "E0");
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let result: Result<ConfigFile, _> = "[mappers.app]\npattern = 'x'\n".parse();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mappers.app]\nentry = '^(?P<message>.+)$'").unwrap();

        let config = ConfigFile::from_path(file.path()).unwrap();
        assert!(config.mappers.contains_key("app"));
        assert!(config.defaults.layout.is_none());
    }

    #[test]
    fn test_from_missing_path() {
        let err = ConfigFile::from_path(Path::new("/nonexistent/sherlog.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
