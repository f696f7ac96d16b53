//! User script filters and the matcher that selects which ones fire
//!
//! Only matching lives here. Script bodies are opaque and are handed to an
//! external executor through a [`ScriptExecuteRequest`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::history::{ClipboardRecord, ContentType, RecordSummary, StoreError};

/// Stage at which a script runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptTrigger {
    BeforeSave,
    AfterSave,
    OnCopy,
    Manual,
}

impl ScriptTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptTrigger::BeforeSave => "before_save",
            ScriptTrigger::AfterSave => "after_save",
            ScriptTrigger::OnCopy => "on_copy",
            ScriptTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for ScriptTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptTrigger {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_save" => Ok(ScriptTrigger::BeforeSave),
            "after_save" => Ok(ScriptTrigger::AfterSave),
            "on_copy" => Ok(ScriptTrigger::OnCopy),
            "manual" => Ok(ScriptTrigger::Manual),
            other => Err(StoreError::InvalidValue(format!(
                "unknown script trigger: {}",
                other
            ))),
        }
    }
}

/// A user-defined automation script and the filter deciding when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFilter {
    /// Empty until the script is first saved
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub trigger: ScriptTrigger,
    /// Allowed record types; empty allows every type
    pub content_types: Vec<ContentType>,
    /// Literal substrings or `/pattern/flags`; empty matches everything
    pub keywords: Vec<String>,
    pub script: String,
    pub description: String,
    /// Higher values run first
    pub sort_order: i64,
    /// Plugin this script was installed from
    pub plugin_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScriptFilter {
    pub fn new(name: impl Into<String>, trigger: ScriptTrigger, script: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            enabled: true,
            trigger,
            content_types: Vec::new(),
            keywords: Vec::new(),
            script: script.into(),
            description: String::new(),
            sort_order: 0,
            plugin_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_content_types(mut self, content_types: impl Into<Vec<ContentType>>) -> Self {
        self.content_types = content_types.into();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this script should fire for `record`
    pub fn matches(&self, record: &ClipboardRecord) -> bool {
        let type_allowed =
            self.content_types.is_empty() || self.content_types.contains(&record.content_type);
        if !type_allowed {
            return false;
        }

        self.keywords.is_empty()
            || self
                .keywords
                .iter()
                .any(|keyword| Keyword::cached(keyword).is_match(&record.content))
    }
}

/// Compiled keywords, shared by every dispatch
static KEYWORD_CACHE: Lazy<Mutex<HashMap<String, Keyword>>> = Lazy::new(Default::default);

/// Distinct keywords kept before the cache starts over
const KEYWORD_CACHE_LIMIT: usize = 512;

/// A compiled keyword
#[derive(Debug, Clone)]
pub enum Keyword {
    /// Case-insensitive substring, stored lowercased
    Literal(String),
    Pattern(Regex),
}

impl Keyword {
    /// Parse `/pattern/flags` into a regex, falling back to a literal
    ///
    /// The closing slash is the last `/` in the keyword. A missing closing
    /// slash, an empty pattern or a pattern that fails to compile all fall
    /// back to matching the whole keyword text literally.
    pub fn parse(keyword: &str) -> Self {
        let literal = || Keyword::Literal(keyword.to_lowercase());

        let Some(rest) = keyword.strip_prefix('/') else {
            return literal();
        };
        let Some(close) = rest.rfind('/') else {
            return literal();
        };

        let (pattern, flags) = (&rest[..close], &rest[close + 1..]);
        if pattern.is_empty() {
            return literal();
        }

        match RegexBuilder::new(pattern)
            .case_insensitive(flags.contains('i'))
            .build()
        {
            Ok(regex) => Keyword::Pattern(regex),
            Err(e) => {
                warn!("Invalid keyword pattern {:?}, matching literally: {}", keyword, e);
                literal()
            }
        }
    }

    /// [`Keyword::parse`], compiling each distinct keyword once per process
    pub fn cached(keyword: &str) -> Self {
        let mut cache = KEYWORD_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(compiled) = cache.get(keyword) {
            return compiled.clone();
        }

        if cache.len() >= KEYWORD_CACHE_LIMIT {
            cache.clear();
        }
        let compiled = Keyword::parse(keyword);
        cache.insert(keyword.to_string(), compiled.clone());
        compiled
    }

    pub fn is_match(&self, content: &str) -> bool {
        match self {
            Keyword::Literal(needle) => content.to_lowercase().contains(needle.as_str()),
            Keyword::Pattern(regex) => regex.is_match(content),
        }
    }
}

/// Ids of the scripts in `scripts` that fire for `record`, in input order
pub fn matching_script_ids(scripts: &[ScriptFilter], record: &ClipboardRecord) -> Vec<String> {
    scripts
        .iter()
        .filter(|script| script.enabled && script.matches(record))
        .map(|script| script.id.clone())
        .collect()
}

/// Request handed to the external script executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptExecuteRequest {
    pub item_id: String,
    pub trigger: ScriptTrigger,
    pub script_ids: Vec<String>,
    pub item: RecordSummary,
}

impl ScriptExecuteRequest {
    /// Build a request for an after-save match; `None` when nothing matched
    pub fn after_save(record: &ClipboardRecord, script_ids: Vec<String>) -> Option<Self> {
        if script_ids.is_empty() {
            return None;
        }

        Some(Self {
            item_id: record.id.clone(),
            trigger: ScriptTrigger::AfterSave,
            script_ids,
            item: RecordSummary::from(record),
        })
    }
}
