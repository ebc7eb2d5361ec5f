//! The catalog of launchable tools.
//!
//! A `Catalog` is an ordered, validated list of `CatalogEntry` values. The
//! built-in catalog mirrors the tools shipped in the repository; a
//! `toolrack.toml` file may replace it with its own `[[tool]]` tables.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ToolConfig;
use crate::menu;

/// Launch strategy of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// A static HTML page opened straight from disk.
    Static,
    /// A Vite dev server; the port is passed as `--port <port>`.
    Vite,
    /// A Next.js dev server; the port is passed through `PORT` and the
    /// directory must contain an environment file.
    Next,
}

impl ToolKind {
    pub fn is_dev_server(self) -> bool {
        !matches!(self, ToolKind::Static)
    }

    /// Group launch order: static pages first, slowest servers last.
    pub fn launch_rank(self) -> u8 {
        match self {
            ToolKind::Static => 0,
            ToolKind::Vite => 1,
            ToolKind::Next => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ToolKind::Static => "static",
            ToolKind::Vite => "vite",
            ToolKind::Next => "next",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
    /// File (static) or directory (dev servers), relative to the catalog root.
    pub location: PathBuf,
    pub port: Option<u16>,
}

impl CatalogEntry {
    pub fn requires_env_file(&self) -> bool {
        matches!(self.kind, ToolKind::Next)
    }

    pub fn resolve_location(&self, root: &Path) -> PathBuf {
        if self.location.is_absolute() {
            self.location.clone()
        } else {
            root.join(&self.location)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("tool id must be non-empty without whitespace: {0:?}")]
    InvalidId(String),
    #[error("tool id {0:?} collides with a menu command")]
    ReservedId(String),
    #[error("duplicate tool id: {0}")]
    DuplicateId(String),
    #[error("port {port} is used by both {first} and {second}")]
    DuplicatePort { port: u16, first: String, second: String },
    #[error("{id}: {kind} tools need a port")]
    MissingPort { id: String, kind: ToolKind },
    #[error("{id}: static tools do not take a port")]
    UnexpectedPort { id: String },
    #[error("production subset names unknown tool: {0}")]
    UnknownProductionId(String),
}

/// Validated, immutable list of tools.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    production: Vec<String>,
}

impl Catalog {
    /// Builds a catalog, checking id/port uniqueness and per-kind port rules.
    pub fn new(entries: Vec<CatalogEntry>, production: Vec<String>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut ids = HashSet::new();
        let mut ports: Vec<(u16, &str)> = Vec::new();
        for entry in &entries {
            if entry.id.is_empty() || entry.id.chars().any(char::is_whitespace) {
                return Err(CatalogError::InvalidId(entry.id.clone()));
            }
            if menu::is_command_key(&entry.id) {
                return Err(CatalogError::ReservedId(entry.id.clone()));
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
            match (entry.kind.is_dev_server(), entry.port) {
                (true, None) => {
                    return Err(CatalogError::MissingPort {
                        id: entry.id.clone(),
                        kind: entry.kind,
                    })
                }
                (false, Some(_)) => {
                    return Err(CatalogError::UnexpectedPort {
                        id: entry.id.clone(),
                    })
                }
                (true, Some(port)) => {
                    if let Some((_, first)) = ports.iter().find(|(p, _)| *p == port) {
                        return Err(CatalogError::DuplicatePort {
                            port,
                            first: first.to_string(),
                            second: entry.id.clone(),
                        });
                    }
                    ports.push((port, entry.id.as_str()));
                }
                (false, None) => {}
            }
        }
        if let Some(unknown) = production.iter().find(|id| !ids.contains(id.as_str())) {
            return Err(CatalogError::UnknownProductionId(unknown.clone()));
        }
        Ok(Self {
            entries,
            production,
        })
    }

    /// Builds a catalog from `[[tool]]` tables. Without an explicit
    /// production list, every static and Vite tool counts as production.
    pub fn from_config(
        tools: Vec<ToolConfig>,
        production: Option<Vec<String>>,
    ) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = tools.into_iter().map(CatalogEntry::from).collect();
        let production = production.unwrap_or_else(|| {
            entries
                .iter()
                .filter(|e| e.kind != ToolKind::Next)
                .map(|e| e.id.clone())
                .collect()
        });
        Self::new(entries, production)
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(id, name, description, kind, location, port)| CatalogEntry {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                kind: *kind,
                location: PathBuf::from(location),
                port: *port,
            })
            .collect();
        let production = BUILTIN_PRODUCTION.iter().map(|id| id.to_string()).collect();
        Self {
            entries,
            production,
        }
    }

    /// Same entries, different production subset.
    pub fn with_production(self, production: Vec<String>) -> Result<Self, CatalogError> {
        Self::new(self.entries, production)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: ToolKind) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    /// Production subset, in catalog order.
    pub fn production(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(move |e| self.production.iter().any(|id| *id == e.id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl From<ToolConfig> for CatalogEntry {
    fn from(tool: ToolConfig) -> Self {
        Self {
            id: tool.id,
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            kind: tool.kind,
            location: PathBuf::from(tool.path),
            port: tool.port,
        }
    }
}

type BuiltinEntry = (
    &'static str,
    &'static str,
    &'static str,
    ToolKind,
    &'static str,
    Option<u16>,
);

// Ids 10-19 take consecutive ports after 5178, in directory order.
#[rustfmt::skip]
const BUILTIN: &[BuiltinEntry] = &[
    ("1", "Dashboard", "Main dashboard showing all tools", ToolKind::Static, "hdd-dashboard/index.html", None),
    ("2", "Quote Calculator", "Customer-facing deck estimate calculator", ToolKind::Static, "hdd-quote-calculator/index.html", None),
    ("3", "Sentiment Router", "Routes customers to reviews or feedback", ToolKind::Static, "hdd-sentiment-router/index.html", None),
    ("4", "Review Generator", "Generate review request messages", ToolKind::Vite, "hdd-review-generator", Some(5173)),
    ("5", "Photo Manager", "Organize before/after project photos", ToolKind::Vite, "hdd-photo-manager", Some(5174)),
    ("6", "Referral Tracker", "Track leads and referral codes", ToolKind::Vite, "hdd-referral-tracker", Some(5175)),
    ("7", "Warranty Tracker", "Track warranties and schedule checkups", ToolKind::Vite, "hdd-warranty-tracker", Some(5176)),
    ("8", "Weather Content", "Weather-based content suggestions", ToolKind::Vite, "hdd-weather-content", Some(5177)),
    ("9", "Competitor Monitor", "Track competitor Google ratings", ToolKind::Vite, "hdd-competitor-monitor", Some(5178)),
    ("10", "Before & After", "Before/after slider for project showcases", ToolKind::Vite, "hdd-before-after", Some(5179)),
    ("11", "Campaign Manager", "Plan and track marketing campaigns", ToolKind::Vite, "hdd-campaign-manager", Some(5180)),
    ("12", "Job Costing", "Track project costs and profitability", ToolKind::Vite, "hdd-job-costing", Some(5181)),
    ("13", "Material Calculator", "Estimate board, joist and fastener counts", ToolKind::Vite, "hdd-material-calculator", Some(5182)),
    ("14", "Permit Tracker", "Track permit applications and inspections", ToolKind::Vite, "hdd-permit-tracker", Some(5183)),
    ("15", "Quote Tracker", "Quote follow-up tracker", ToolKind::Vite, "hdd-quote-tracker", Some(5184)),
    ("16", "Supplier Tracker", "Compare prices across suppliers", ToolKind::Vite, "hdd-supplier-tracker", Some(5185)),
    ("17", "Customer Portal", "Project status and messages for customers", ToolKind::Vite, "hdd-customer-portal", Some(5186)),
    ("18", "Customer Survey", "Post-project satisfaction surveys", ToolKind::Vite, "hdd-customer-survey", Some(5187)),
    ("19", "Project Messenger", "Project status notifications to customers", ToolKind::Vite, "hdd-project-messenger", Some(5188)),
    ("20", "GBP Post Scheduler", "AI-powered Google Business Profile posts (needs env setup)", ToolKind::Next, "hdd-gbp-poster", Some(3000)),
    ("21", "Lead Response System", "Automated lead follow-up (needs env setup)", ToolKind::Next, "hdd-lead-response", Some(3001)),
];

const BUILTIN_PRODUCTION: &[&str] = &["1", "2", "3", "4", "5", "6", "7", "8", "9"];

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(id: &str, kind: ToolKind, location: &str, port: Option<u16>) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            name: format!("Tool {}", id),
            description: String::new(),
            kind,
            location: PathBuf::from(location),
            port,
        }
    }

    #[test]
    fn builtin_catalog_passes_validation() {
        let builtin = Catalog::builtin();
        let rebuilt = Catalog::new(builtin.entries.clone(), builtin.production.clone());
        assert!(rebuilt.is_ok(), "{:?}", rebuilt.err());
        assert_eq!(builtin.len(), 21);
    }

    #[test]
    fn builtin_ids_and_ports_are_unique() {
        let catalog = Catalog::builtin();
        let ids: HashSet<_> = catalog.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), catalog.len());
        let ports: Vec<u16> = catalog.iter().filter_map(|e| e.port).collect();
        let unique: HashSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn only_next_tools_require_env_file() {
        let catalog = Catalog::builtin();
        for entry in catalog.iter() {
            assert_eq!(entry.requires_env_file(), entry.kind == ToolKind::Next);
            assert_eq!(entry.port.is_some(), entry.kind.is_dev_server());
        }
    }

    #[test]
    fn rejects_duplicate_ports() {
        let err = Catalog::new(
            vec![
                entry("a1", ToolKind::Vite, "a", Some(5173)),
                entry("a2", ToolKind::Next, "b", Some(5173)),
            ],
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicatePort {
                port: 5173,
                first: "a1".to_string(),
                second: "a2".to_string(),
            }
        );
    }

    #[test]
    fn rejects_duplicate_ids_and_reserved_keys() {
        let dup = Catalog::new(
            vec![
                entry("x", ToolKind::Static, "a.html", None),
                entry("x", ToolKind::Static, "b.html", None),
            ],
            Vec::new(),
        );
        assert_eq!(dup.unwrap_err(), CatalogError::DuplicateId("x".to_string()));

        let reserved = Catalog::new(vec![entry("q", ToolKind::Static, "a.html", None)], Vec::new());
        assert_eq!(reserved.unwrap_err(), CatalogError::ReservedId("q".to_string()));
    }

    #[test]
    fn enforces_port_presence_by_kind() {
        let missing = Catalog::new(vec![entry("vt", ToolKind::Vite, "vt", None)], Vec::new());
        assert!(matches!(missing, Err(CatalogError::MissingPort { .. })));
        let unexpected = Catalog::new(vec![entry("st", ToolKind::Static, "st.html", Some(1))], Vec::new());
        assert!(matches!(unexpected, Err(CatalogError::UnexpectedPort { .. })));
    }

    #[test]
    fn production_ids_must_exist() {
        let err = Catalog::new(
            vec![entry("st", ToolKind::Static, "st.html", None)],
            vec!["nope".to_string()],
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::UnknownProductionId("nope".to_string()));
    }

    #[test]
    fn lookup_and_kind_filter() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.get("4").map(|e| e.port), Some(Some(5173)));
        assert!(catalog.get("99").is_none());
        assert_eq!(catalog.of_kind(ToolKind::Static).count(), 3);
        assert_eq!(catalog.of_kind(ToolKind::Next).count(), 2);
        assert!(catalog.production().all(|e| e.kind != ToolKind::Next));
    }
}
