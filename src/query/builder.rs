//! Fluent AQL builder

use std::io;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value, json};

use super::{DOMAINS, MAX_LIMIT, QueryError};

/// Comparison operators for numeric and time predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `$eq`
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$gte`
    Gte,
    /// `$lt`
    Lt,
    /// `$lte`
    Lte,
}

impl Comparison {
    /// AQL operator key
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

/// Checksum algorithms and the item field each one matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
}

impl ChecksumAlgorithm {
    /// AQL field holding this checksum
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Md5 => "actual_md5",
            Self::Sha1 => "actual_sha1",
            Self::Sha256 => "sha256",
        }
    }
}

/// Timestamp fields usable in time predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    /// `created`
    Created,
    /// `modified`
    Modified,
    /// `updated`
    Updated,
}

impl TimeField {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Updated => "updated",
        }
    }
}

/// Item type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// Files only
    File,
    /// Folders only
    Folder,
    /// Both
    Any,
}

impl ItemType {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
            Self::Any => "any",
        }
    }
}

/// One `.sort(...)` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortEntry {
    /// Field to sort by
    pub field: String,
    /// Ascending (`$asc`) or descending (`$desc`)
    pub ascending: bool,
}

/// Fluent AQL query builder
///
/// ```
/// use devops_router::query::AqlBuilder;
///
/// let query = AqlBuilder::new().repo("libs-release").build().unwrap();
/// assert_eq!(query, r#"items.find({"repo": "libs-release"})"#);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AqlBuilder {
    domain: String,
    criteria: Vec<Value>,
    include: Vec<String>,
    sort: Vec<SortEntry>,
    limit: i64,
    offset: i64,
}

impl Default for AqlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AqlBuilder {
    /// Builder over the `items` domain
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain: "items".to_string(),
            criteria: Vec::new(),
            include: Vec::new(),
            sort: Vec::new(),
            limit: 0,
            offset: 0,
        }
    }

    /// Query a different domain (`items`, `builds`, `entries`)
    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    fn criterion(mut self, key: &str, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        self.criteria.push(Value::Object(map));
        self
    }

    /// Exact artifact name
    #[must_use]
    pub fn name(self, name: &str) -> Self {
        self.criterion("name", json!(name))
    }

    /// Wildcard name match (`*`, `?`)
    #[must_use]
    pub fn name_pattern(self, pattern: &str) -> Self {
        self.criterion("name", json!({ "$match": pattern }))
    }

    /// Wildcard path match
    #[must_use]
    pub fn path_pattern(self, pattern: &str) -> Self {
        self.criterion("path", json!({ "$match": pattern }))
    }

    /// Repository key
    #[must_use]
    pub fn repo(self, repo: &str) -> Self {
        self.criterion("repo", json!(repo))
    }

    /// Property equality, `@key`
    #[must_use]
    pub fn property(self, key: &str, value: &str) -> Self {
        self.criterion(&format!("@{key}"), json!(value))
    }

    /// Checksum equality
    #[must_use]
    pub fn checksum(self, algorithm: ChecksumAlgorithm, value: &str) -> Self {
        self.criterion(algorithm.field(), json!(value))
    }

    /// Size comparison in bytes
    #[must_use]
    pub fn size(self, op: Comparison, bytes: i64) -> Self {
        self.criterion("size", json!({ op.as_str(): bytes }))
    }

    /// Time comparison; `value` is an ISO-8601 timestamp or relative form
    /// such as `7d`
    #[must_use]
    pub fn time(self, field: TimeField, op: Comparison, value: &str) -> Self {
        self.criterion(field.as_str(), json!({ op.as_str(): value }))
    }

    /// Item type
    #[must_use]
    pub fn item_type(self, item_type: ItemType) -> Self {
        self.criterion("type", json!(item_type.as_str()))
    }

    /// Arbitrary criterion, appended as-is
    #[must_use]
    pub fn custom(mut self, criterion: Map<String, Value>) -> Self {
        self.criteria.push(Value::Object(criterion));
        self
    }

    /// Fields to return
    #[must_use]
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Append a sort clause
    #[must_use]
    pub fn sort(mut self, field: &str, ascending: bool) -> Self {
        self.sort.push(SortEntry {
            field: field.to_string(),
            ascending,
        });
        self
    }

    /// Maximum results; 0 means unset
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Results to skip; 0 means unset
    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Check every invariant without producing text
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), QueryError> {
        if !DOMAINS.contains(&self.domain.as_str()) {
            return Err(QueryError::InvalidDomain(self.domain.clone()));
        }
        if self.limit < 0 {
            return Err(QueryError::NegativeLimit(self.limit));
        }
        if self.offset < 0 {
            return Err(QueryError::NegativeOffset(self.offset));
        }
        if self.limit > MAX_LIMIT {
            return Err(QueryError::LimitTooLarge {
                limit: self.limit,
                max: MAX_LIMIT,
            });
        }
        if self.sort.iter().any(|s| s.field.trim().is_empty()) {
            return Err(QueryError::EmptySortField);
        }
        if self.include.iter().any(|f| f.trim().is_empty()) {
            return Err(QueryError::EmptyIncludeField);
        }
        Ok(())
    }

    /// Render the query
    ///
    /// Clause order: `find`, `include`, each `sort`, `offset`, `limit`.
    ///
    /// # Errors
    ///
    /// Returns a `QueryError` if any invariant is violated; nothing is
    /// rendered in that case.
    pub fn build(&self) -> Result<String, QueryError> {
        self.validate()?;

        let predicate = match self.criteria.as_slice() {
            [] => Value::Object(Map::new()),
            [single] => single.clone(),
            many => json!({ "$and": many }),
        };
        let mut query = format!("{}.find({})", self.domain, to_aql_json(&predicate)?);

        if !self.include.is_empty() {
            let fields = self
                .include
                .iter()
                .map(|f| to_aql_json(&json!(f.trim())))
                .collect::<Result<Vec<_>, _>>()?;
            query.push_str(&format!(".include({})", fields.join(", ")));
        }
        for entry in &self.sort {
            let direction = if entry.ascending { "$asc" } else { "$desc" };
            let clause = json!({ direction: [entry.field.trim()] });
            query.push_str(&format!(".sort({})", to_aql_json(&clause)?));
        }
        if self.offset > 0 {
            query.push_str(&format!(".offset({})", self.offset));
        }
        if self.limit > 0 {
            query.push_str(&format!(".limit({})", self.limit));
        }
        Ok(query)
    }

    /// Render the minimal single-criterion form when nothing else is set
    ///
    /// Produces the same text as [`build`](Self::build).
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_simple(&self) -> Result<String, QueryError> {
        let trivial = self.include.is_empty()
            && self.sort.is_empty()
            && self.limit == 0
            && self.offset == 0;
        match self.criteria.as_slice() {
            [single] if trivial => {
                self.validate()?;
                Ok(format!("{}.find({})", self.domain, to_aql_json(single)?))
            }
            _ => self.build(),
        }
    }
}

/// JSON with `": "` and `", "` separators, the layout AQL examples use
///
/// # Errors
///
/// Returns `QueryError::Encoding` if the value cannot be serialized.
pub fn to_aql_json(value: &Value) -> Result<String, QueryError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AqlFormatter);
    value
        .serialize(&mut ser)
        .map_err(|e| QueryError::Encoding(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| QueryError::Encoding(e.to_string()))
}

struct AqlFormatter;

impl Formatter for AqlFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
