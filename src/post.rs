//! The generated post and the rules every candidate must satisfy.
//!
//! A [`GeneratedPost`] can only be obtained through validation: either the
//! typed constructor [`GeneratedPost::new`] or [`GeneratedPost::from_value`]
//! for untrusted JSON (which is also what `Deserialize` goes through). Every
//! violated rule is collected into a single [`ValidationReport`] instead of
//! stopping at the first one.

use std::collections::HashMap;
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const TITLE_MIN_CHARS: usize = 10;
pub const TITLE_MAX_CHARS: usize = 100;
pub const BODY_MIN_CHARS: usize = 50;
pub const BODY_MAX_CHARS: usize = 3000;
pub const MIN_TAGS: usize = 3;
pub const MAX_TAGS: usize = 10;
pub const TAG_MIN_CHARS: usize = 2;

/// Keys accepted in a candidate object. Anything else rejects the candidate.
pub const FIELDS: [&str; 4] = ["title", "body", "tags", "category"];

const SEPARATOR_WIDTH: usize = 60;

/// The closed set of post categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Technology,
    Business,
    Marketing,
    Leadership,
    ProfessionalDevelopment,
    Industry,
    Innovation,
    HumanResources,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Technology,
        Category::Business,
        Category::Marketing,
        Category::Leadership,
        Category::ProfessionalDevelopment,
        Category::Industry,
        Category::Innovation,
        Category::HumanResources,
    ];

    /// Canonical normalized key.
    pub fn key(self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Marketing => "marketing",
            Category::Leadership => "leadership",
            Category::ProfessionalDevelopment => "professional development",
            Category::Industry => "industry",
            Category::Innovation => "innovation",
            Category::HumanResources => "human resources",
        }
    }

    // Normalized labels, canonical key first, then localized spellings.
    fn labels(self) -> &'static [&'static str] {
        match self {
            Category::Technology => &["technology", "tecnología", "tecnologia"],
            Category::Business => &["business", "negocios"],
            Category::Marketing => &["marketing"],
            Category::Leadership => &["leadership", "liderazgo"],
            Category::ProfessionalDevelopment => {
                &["professional development", "desarrollo profesional"]
            }
            Category::Industry => &["industry", "industria"],
            Category::Innovation => &["innovation", "innovación", "innovacion"],
            Category::HumanResources => &["human resources", "recursos humanos", "rrhh"],
        }
    }

    /// Looks a label up case- and separator-insensitively (`_` and ` ` are
    /// interchangeable).
    pub fn parse(label: &str) -> Option<Category> {
        let normalized = normalize_category(label);
        Self::ALL
            .into_iter()
            .find(|category| category.labels().contains(&normalized.as_str()))
    }

    /// Comma-separated list of the canonical keys, used in error messages and
    /// in the system instruction.
    pub fn valid_options() -> String {
        Self::ALL.map(Category::key).join(", ")
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn normalize_category(label: &str) -> String {
    label.trim().to_lowercase().replace('_', " ")
}

fn title_case(normalized: &str) -> String {
    normalized
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One violated rule, located by field path (`title`, `tags[2]`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every rule a candidate post broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe_violations(.violations))]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations reported for `path` exactly.
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.path == path)
    }

    /// True if any violation was reported for `field` or one of its elements.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| {
            v.path == field
                || v.path
                    .strip_prefix(field)
                    .is_some_and(|rest| rest.starts_with('['))
        })
    }
}

fn describe_violations(violations: &[Violation]) -> String {
    let summary = if violations.len() == 1 {
        "1 violation".to_string()
    } else {
        format!("{} violations", violations.len())
    };
    let mut out = format!("generated post failed validation ({summary})");
    for violation in violations {
        out.push_str("\n  - ");
        out.push_str(&violation.to_string());
    }
    out
}

#[derive(Default)]
struct Violations(Vec<Violation>);

impl Violations {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_report(self) -> ValidationReport {
        ValidationReport { violations: self.0 }
    }
}

/// A validated, normalized social-media post.
///
/// Fields are private: the only way to get one is through validation, and
/// nothing can change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedPost {
    title: String,
    body: String,
    tags: Vec<String>,
    category: String,
    #[serde(skip)]
    kind: Category,
}

impl GeneratedPost {
    /// Validates typed fields, trimming and normalizing them on success.
    pub fn new<T>(
        title: impl Into<String>,
        body: impl Into<String>,
        tags: impl IntoIterator<Item = T>,
        category: impl Into<String>,
    ) -> Result<Self, ValidationReport>
    where
        T: Into<String>,
    {
        let mut violations = Violations::default();
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();

        let title = check_title(&title.into(), &mut violations);
        let body = check_body(&body.into(), &mut violations);
        let tags = check_tags(&tags, &mut violations);
        let category = check_category(&category.into(), &mut violations);

        assemble(violations, title, body, tags, category)
    }

    /// Validates an untrusted JSON value. Unknown keys, missing keys and
    /// wrongly typed values are reported alongside the field rules.
    pub fn from_value(value: &Value) -> Result<Self, ValidationReport> {
        let mut violations = Violations::default();
        let Some(object) = value.as_object() else {
            violations.push(
                "$",
                format!(
                    "expected an object with fields {}, found {}",
                    FIELDS.join(", "),
                    json_kind(value)
                ),
            );
            return Err(violations.into_report());
        };

        for key in object.keys() {
            if !FIELDS.contains(&key.as_str()) {
                violations.push(
                    key.as_str(),
                    format!("unrecognized field; only {} are allowed", FIELDS.join(", ")),
                );
            }
        }

        let title = string_field(object, "title", &mut violations)
            .and_then(|raw| check_title(raw, &mut violations));
        let body = string_field(object, "body", &mut violations)
            .and_then(|raw| check_body(raw, &mut violations));
        let tags = tags_field(object, &mut violations)
            .and_then(|raw| check_tags(&raw, &mut violations));
        let category = string_field(object, "category", &mut violations)
            .and_then(|raw| check_category(raw, &mut violations));

        assemble(violations, title, body, tags, category)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Tags without their `#` prefix.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Title-cased category label, e.g. `Professional Development`.
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn category_kind(&self) -> Category {
        self.kind
    }

    /// Space-joined `#`-prefixed tags.
    pub fn hashtags(&self) -> String {
        self.tags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Plain-text rendering: title, body, tags, category, in that order.
    pub fn render(&self) -> String {
        let rule = "=".repeat(SEPARATOR_WIDTH);
        format!(
            "{rule}\nTITLE: {title}\n{rule}\n\n{body}\n\n\
             {rule}\nTAGS: {tags}\nCATEGORY: {category}\n{rule}\n",
            title = self.title,
            body = self.body,
            tags = self.hashtags(),
            category = self.category,
        )
    }
}

impl fmt::Display for GeneratedPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for GeneratedPost {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        GeneratedPost::from_value(&value).map_err(de::Error::custom)
    }
}

impl TryFrom<Value> for GeneratedPost {
    type Error = ValidationReport;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        GeneratedPost::from_value(&value)
    }
}

fn assemble(
    violations: Violations,
    title: Option<String>,
    body: Option<String>,
    tags: Option<Vec<String>>,
    category: Option<(String, Category)>,
) -> Result<GeneratedPost, ValidationReport> {
    match (title, body, tags, category) {
        (Some(title), Some(body), Some(tags), Some((category, kind))) if violations.is_empty() => {
            Ok(GeneratedPost {
                title,
                body,
                tags,
                category,
                kind,
            })
        }
        _ => Err(violations.into_report()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    violations: &mut Violations,
) -> Option<&'a str> {
    match object.get(field) {
        None => {
            violations.push(field, "field required");
            None
        }
        Some(Value::String(raw)) => Some(raw),
        Some(other) => {
            violations.push(
                field,
                format!("expected a string, found {}", json_kind(other)),
            );
            None
        }
    }
}

fn tags_field(object: &Map<String, Value>, violations: &mut Violations) -> Option<Vec<String>> {
    match object.get("tags") {
        None => {
            violations.push("tags", "field required");
            None
        }
        Some(Value::Array(items)) => {
            let mut tags = Vec::with_capacity(items.len());
            let mut well_typed = true;
            for (index, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(tag) => tags.push(tag.to_string()),
                    None => {
                        violations.push(
                            format!("tags[{index}]"),
                            format!("expected a string, found {}", json_kind(item)),
                        );
                        well_typed = false;
                    }
                }
            }
            well_typed.then_some(tags)
        }
        Some(other) => {
            violations.push(
                "tags",
                format!("expected an array of strings, found {}", json_kind(other)),
            );
            None
        }
    }
}

fn check_title(raw: &str, violations: &mut Violations) -> Option<String> {
    let title = raw.trim();
    let len = title.chars().count();
    if title.is_empty() {
        violations.push("title", "must not be empty");
        return None;
    }
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&len) {
        violations.push(
            "title",
            format!(
                "must be between {TITLE_MIN_CHARS} and {TITLE_MAX_CHARS} characters \
                 after trimming (got {len})"
            ),
        );
        return None;
    }
    Some(title.to_string())
}

fn check_body(raw: &str, violations: &mut Violations) -> Option<String> {
    let body = raw.trim();
    let len = body.chars().count();
    if body.is_empty() {
        violations.push("body", "must not be empty");
        return None;
    }
    if !(BODY_MIN_CHARS..=BODY_MAX_CHARS).contains(&len) {
        violations.push(
            "body",
            format!(
                "must be between {BODY_MIN_CHARS} and {BODY_MAX_CHARS} characters \
                 after trimming (got {len})"
            ),
        );
        return None;
    }
    // Line breaks don't count towards the minimum.
    let text: String = body.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
    let text_len = text.trim().chars().count();
    if text_len < BODY_MIN_CHARS {
        violations.push(
            "body",
            format!(
                "must contain at least {BODY_MIN_CHARS} characters of text \
                 once line breaks are removed (got {text_len})"
            ),
        );
        return None;
    }
    Some(body.to_string())
}

fn check_tags(raw: &[String], violations: &mut Violations) -> Option<Vec<String>> {
    let mut valid = true;
    if !(MIN_TAGS..=MAX_TAGS).contains(&raw.len()) {
        violations.push(
            "tags",
            format!(
                "must contain between {MIN_TAGS} and {MAX_TAGS} tags (got {})",
                raw.len()
            ),
        );
        valid = false;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut tags = Vec::with_capacity(raw.len());
    for (index, tag) in raw.iter().enumerate() {
        let path = format!("tags[{index}]");
        let cleaned = tag.trim().trim_start_matches('#').trim();
        if cleaned.is_empty() {
            violations.push(path, "tag must not be empty");
            valid = false;
            continue;
        }
        if cleaned.chars().any(char::is_whitespace) {
            violations.push(path, format!("tag '{cleaned}' must not contain whitespace"));
            valid = false;
            continue;
        }
        if cleaned.chars().count() < TAG_MIN_CHARS {
            violations.push(
                path,
                format!("tag '{cleaned}' must be at least {TAG_MIN_CHARS} characters"),
            );
            valid = false;
            continue;
        }
        let key = cleaned.to_lowercase();
        if let Some(first) = seen.get(&key) {
            violations.push(
                path,
                format!("duplicate tag '{cleaned}' (same as tags[{first}], ignoring case)"),
            );
            valid = false;
            continue;
        }
        seen.insert(key, index);
        tags.push(cleaned.to_string());
    }

    valid.then_some(tags)
}

fn check_category(raw: &str, violations: &mut Violations) -> Option<(String, Category)> {
    match Category::parse(raw) {
        Some(kind) => Some((title_case(&normalize_category(raw)), kind)),
        None => {
            violations.push(
                "category",
                format!(
                    "invalid category '{}'; must be one of: {}",
                    raw.trim(),
                    Category::valid_options()
                ),
            );
            None
        }
    }
}
