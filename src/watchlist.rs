use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Symbols from a release file. Lines look like `AAPL : 2024-05-02 ...`;
/// only the part before the first colon is used.
pub fn parse_release_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading release file {}", path.display()))?;
    Ok(parse_release_text(&raw))
}

pub fn parse_release_text(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| line.split(':').next())
        .map(|symbol| symbol.trim().to_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .collect()
}

/// Concatenate release lists, keeping the first occurrence of each symbol
pub fn merge_release_lists(lists: &[Vec<String>]) -> Vec<String> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flatten()
        .filter(|symbol| seen.insert(symbol.as_str()))
        .cloned()
        .collect()
}

/// The `newlow` blacklist. A missing or malformed file yields an empty set.
pub fn load_blacklist(path: &Path) -> HashSet<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Blacklist {} not readable ({}), continuing without it", path.display(), e);
            return HashSet::new();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => {
            let set: HashSet<String> = value
                .get("newlow")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            info!("Loaded {} blacklisted symbols", set.len());
            set
        }
        Err(e) => {
            warn!("Blacklist {} is not valid JSON ({}), continuing without it", path.display(), e);
            HashSet::new()
        }
    }
}

/// `{sector: [symbols]}` inverted to symbol -> sector
pub fn load_sector_map(path: &Path) -> Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading sector file {}", path.display()))?;
    let sectors: HashMap<String, Vec<String>> =
        serde_json::from_str(&raw).with_context(|| format!("parsing sector file {}", path.display()))?;

    let mut map = HashMap::new();
    for (sector, symbols) in sectors {
        for symbol in symbols {
            map.insert(symbol, sector.clone());
        }
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    symbol: String,
    #[serde(default)]
    tag: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TagFile {
    #[serde(default)]
    stocks: Vec<TagEntry>,
    #[serde(default)]
    etfs: Vec<TagEntry>,
}

/// Descriptive tags per symbol, from the `{"stocks": [...], "etfs": [...]}` file
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: HashMap<String, Vec<String>>,
}

impl TagIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading tag file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing tag file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: TagFile = serde_json::from_str(raw)?;
        let mut tags = HashMap::new();
        // stocks win over etfs for the same symbol
        for entry in file.etfs.into_iter().chain(file.stocks) {
            tags.insert(entry.symbol, entry.tag);
        }
        Ok(Self { tags })
    }

    pub fn tags_for(&self, symbol: &str) -> &[String] {
        self.tags.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Panel file: a JSON object of named groups, each `{symbol: ""}`.
/// Group order is kept as read; new groups are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    groups: Map<String, Value>,
}

impl Panel {
    /// Load the panel; a missing file starts an empty one
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Panel {} not found, starting an empty one", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("reading panel {}", path.display()))?;
        let groups: Map<String, Value> =
            serde_json::from_str(&raw).with_context(|| format!("parsing panel {}", path.display()))?;
        Ok(Self { groups })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let mut json = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, PrettyFormatter::with_indent(b"    "));
        self.groups.serialize(&mut serializer)?;
        fs::write(path, json).with_context(|| format!("writing panel {}", path.display()))?;
        Ok(())
    }

    /// Replace a group with the given symbols, sorted
    pub fn set_group(&mut self, name: &str, symbols: &[String]) {
        let sorted: BTreeSet<&String> = symbols.iter().collect();
        let group: Map<String, Value> = sorted
            .into_iter()
            .map(|s| (s.clone(), Value::String(String::new())))
            .collect();
        self.groups.insert(name.to_string(), Value::Object(group));
    }

    pub fn group_members(&self, name: &str) -> Vec<String> {
        match self.groups.get(name) {
            Some(Value::Object(group)) => group.keys().cloned().collect(),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// Write one symbol per line, creating parent directories
pub fn write_symbol_list(path: &Path, symbols: &[String]) -> Result<()> {
    ensure_parent(path)?;
    let mut body = symbols.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn read_symbol_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
}

/// Write the symbols that made it onto the list to `news`, removing `news`
/// when there are none, and the full qualified set to `backup`.
pub fn publish_filter_list(news: &Path, backup: &Path, kept: &[String], qualified: &[String]) -> Result<()> {
    if kept.is_empty() {
        if news.exists() {
            fs::remove_file(news).with_context(|| format!("removing {}", news.display()))?;
            info!("Nothing qualified, removed {}", news.display());
        }
    } else {
        write_symbol_list(news, kept)?;
    }
    write_symbol_list(backup, qualified)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Output file locations under the output directory
#[derive(Debug, Clone)]
pub struct OutputPaths {
    root: PathBuf,
}

impl OutputPaths {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn next_week_backup(&self) -> PathBuf {
        self.root.join("backup").join("NextWeek_Earning.txt")
    }

    pub fn notification_backup(&self) -> PathBuf {
        self.root.join("backup").join("notification_earning.txt")
    }

    pub fn filter_news(&self) -> PathBuf {
        self.root.join("Filter_Earning.txt")
    }

    pub fn filter_backup(&self) -> PathBuf {
        self.root.join("backup").join("Filter_Earning.txt")
    }

    pub fn overbuy(&self) -> PathBuf {
        self.root.join("OverBuy.txt")
    }
}
