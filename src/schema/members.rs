//! Queryable member model
//!
//! Every registered document type owns a `MemberTable` describing how each
//! logical field is located in SQL. Locators are plain SQL expressions
//! written against a fixed alias: `d` for the document table, `e1`, `e2`,
//! ... for exploded collection elements (one alias per nesting level).

use crate::error::{DbError, DbResult};
use crate::sql::fragments::{CompareOp, Fragment};
use crate::value::{SqlValue, ValueType};
use std::sync::Arc;

/// Alias of the document table in every generated statement
pub const DOCUMENT_ALIAS: &str = "d";

/// Names that resolve to the length of a collection member
const LENGTH_MEMBERS: [&str; 2] = ["Count", "Length"];

/// A single scalar location inside a document (or a collection element)
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMember {
    /// Dotted path from the root of the declaring table
    pub path: String,
    pub value_type: ValueType,
    /// Raw JSON extraction, e.g. `d.data -> 'Address' ->> 'City'`
    pub json_locator: String,
    /// JSON extraction cast to the member's type
    pub typed_locator: String,
    /// Dedicated column for duplicated (indexed) members
    pub column_locator: Option<String>,
}

impl ValueMember {
    /// Locator used in comparisons: the duplicated column when present
    pub fn locator(&self) -> &str {
        self.column_locator
            .as_deref()
            .unwrap_or(self.typed_locator.as_str())
    }

    pub fn is_duplicated(&self) -> bool {
        self.column_locator.is_some()
    }
}

/// Element of a collection member
#[derive(Debug, Clone)]
pub enum ElementMember {
    /// Collection of simple values (`Vec<String>`, `Vec<i32>`, ...)
    Scalar(ValueMember),
    /// Collection of child documents with their own members
    Document(Arc<MemberTable>),
}

/// A collection-valued member
#[derive(Debug, Clone)]
pub struct CollectionMember {
    pub path: String,
    /// Element storage type for scalar collections
    pub element_type: Option<ValueType>,
    /// Raw stored JSON array, e.g. `d.data -> 'Tags'`
    pub json_locator: String,
    /// Typed SQL array usable with `ANY`/`ALL` (scalar collections only)
    pub array_locator: Option<String>,
    /// Set-returning expression producing one row per element
    pub explode_locator: String,
    /// Alias the exploded rows are bound to (`e1(data)`)
    pub element_alias: String,
    pub element: ElementMember,
    pub length: ValueMember,
    pub whole: ValueMember,
    pub duplicated: bool,
}

impl CollectionMember {
    /// `FROM` item exploding the collection, e.g.
    /// `jsonb_array_elements_text(d.data -> 'Tags') as e1(data)`
    pub fn explode_source(&self) -> String {
        format!("{} as {}(data)", self.explode_locator, self.element_alias)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.element, ElementMember::Scalar(_))
    }

    /// Fragment for "the whole collection equals / contains" comparisons
    pub fn whole_collection_fragment(&self, op: CompareOp, value: SqlValue) -> DbResult<Fragment> {
        match op {
            CompareOp::Eq | CompareOp::NotEq => Ok(Fragment::comparison(
                self.whole.locator(),
                op,
                value,
                ValueType::Json,
            )),
            other => Err(DbError::UnsupportedQueryShape(format!(
                "'{}' comparison against the whole collection '{}'",
                other.sql(),
                self.path
            ))),
        }
    }
}

/// A nested object member with its own member table
#[derive(Debug, Clone)]
pub struct ChildMember {
    pub path: String,
    pub json_locator: String,
    pub members: Arc<MemberTable>,
}

/// One resolvable member
#[derive(Debug, Clone)]
pub enum QueryableMember {
    Value(ValueMember),
    Collection(CollectionMember),
    Child(ChildMember),
}

impl QueryableMember {
    pub fn name(&self) -> &str {
        let path = match self {
            QueryableMember::Value(m) => &m.path,
            QueryableMember::Collection(m) => &m.path,
            QueryableMember::Child(m) => &m.path,
        };
        path.rsplit('.').next().unwrap_or(path)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, QueryableMember::Collection(_))
    }

    pub fn is_duplicated(&self) -> bool {
        match self {
            QueryableMember::Value(m) => m.is_duplicated(),
            QueryableMember::Collection(m) => m.duplicated,
            QueryableMember::Child(_) => false,
        }
    }
}

/// Resolution result of `MemberTable::locate`
#[derive(Debug, Clone, Copy)]
pub enum LocatedMember<'a> {
    Value(&'a ValueMember),
    Collection(&'a CollectionMember),
    Child(&'a ChildMember),
}

impl<'a> LocatedMember<'a> {
    pub fn as_value(&self) -> Option<&'a ValueMember> {
        match self {
            LocatedMember::Value(m) => Some(m),
            LocatedMember::Child(_) | LocatedMember::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&'a CollectionMember> {
        match self {
            LocatedMember::Collection(m) => Some(m),
            _ => None,
        }
    }

    /// Locator usable in a select list or ordering
    pub fn locator(&self) -> &'a str {
        match self {
            LocatedMember::Value(m) => m.locator(),
            LocatedMember::Collection(m) => &m.json_locator,
            LocatedMember::Child(m) => &m.json_locator,
        }
    }
}

/// Immutable table of the members of one document (or element) type
#[derive(Debug, Clone)]
pub struct MemberTable {
    declaring_type: String,
    root: String,
    depth: usize,
    members: Vec<(String, QueryableMember)>,
}

impl MemberTable {
    pub fn new(declaring_type: impl Into<String>, root: impl Into<String>, depth: usize) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            root: root.into(),
            depth,
            members: Vec::new(),
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// JSON expression every locator in this table is rooted at
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Collection nesting depth; 0 for a document table
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryableMember)> {
        self.members.iter().map(|(name, member)| (name.as_str(), member))
    }

    pub fn get(&self, name: &str) -> Option<&QueryableMember> {
        self.members
            .iter()
            .find(|(member_name, _)| member_name == name)
            .map(|(_, member)| member)
    }

    pub(crate) fn insert(&mut self, name: String, member: QueryableMember) {
        if let Some(existing) = self.members.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = member;
        } else {
            self.members.push((name, member));
        }
    }

    /// Resolve a dotted member path such as `Address.City` or `Tags.Count`
    pub fn locate(&self, path: &str) -> DbResult<LocatedMember<'_>> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(self.not_found(path));
        }
        self.locate_segments(path, &segments)
    }

    fn locate_segments<'a>(&'a self, full_path: &str, segments: &[&str]) -> DbResult<LocatedMember<'a>> {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Err(self.not_found(full_path)),
        };

        let member = self.get(head).ok_or_else(|| self.not_found(full_path))?;

        match (member, rest) {
            (QueryableMember::Value(m), []) => Ok(LocatedMember::Value(m)),
            (QueryableMember::Value(_), _) => Err(self.not_found(full_path)),
            (QueryableMember::Collection(c), []) => Ok(LocatedMember::Collection(c)),
            (QueryableMember::Collection(c), [suffix]) if LENGTH_MEMBERS.contains(suffix) => {
                Ok(LocatedMember::Value(&c.length))
            }
            // Any other suffix means the raw stored collection value
            (QueryableMember::Collection(c), _) => Ok(LocatedMember::Value(&c.whole)),
            (QueryableMember::Child(child), []) => Ok(LocatedMember::Child(child)),
            (QueryableMember::Child(child), rest) => child
                .members
                .locate_segments(full_path, rest)
                .map_err(|_| self.not_found(full_path)),
        }
    }

    fn not_found(&self, path: &str) -> DbError {
        DbError::MemberNotFound {
            path: path.to_string(),
            declaring_type: self.declaring_type.clone(),
        }
    }
}

/// Builds a member table, computing every locator from the table root.
#[derive(Debug)]
pub struct MemberTableBuilder {
    table: MemberTable,
    prefix: Vec<String>,
}

impl MemberTableBuilder {
    pub fn new(declaring_type: impl Into<String>, root: impl Into<String>, depth: usize) -> Self {
        Self {
            table: MemberTable::new(declaring_type, root, depth),
            prefix: Vec::new(),
        }
    }

    fn nested(declaring_type: String, root: String, depth: usize, prefix: Vec<String>) -> Self {
        Self {
            table: MemberTable::new(declaring_type, root, depth),
            prefix,
        }
    }

    fn path_of(&self, name: &str) -> Vec<String> {
        let mut path = self.prefix.clone();
        path.push(name.to_string());
        path
    }

    /// `root -> 'A' -> 'B' ->> 'C'` (text) or `root -> 'A' -> 'B' -> 'C'` (json)
    fn json_path(&self, name: &str, as_text: bool) -> String {
        let mut locator = self.table.root.clone();
        for segment in &self.prefix {
            locator.push_str(&format!(" -> '{}'", segment));
        }
        let arrow = if as_text { "->>" } else { "->" };
        locator.push_str(&format!(" {} '{}'", arrow, name));
        locator
    }

    fn value_member(&self, name: &str, value_type: ValueType, column: Option<String>) -> ValueMember {
        let path = self.path_of(name).join(".");
        let (json_locator, typed_locator) = if value_type.is_json() {
            let json = self.json_path(name, false);
            (json.clone(), json)
        } else {
            let raw = self.json_path(name, true);
            let typed = value_type.cast(&raw);
            (raw, typed)
        };
        ValueMember {
            path,
            value_type,
            json_locator,
            typed_locator,
            column_locator: column,
        }
    }

    /// Register a member stored only inside the JSON payload
    pub fn field(mut self, name: &str, value_type: ValueType) -> Self {
        let member = self.value_member(name, value_type, None);
        self.table.insert(name.to_string(), QueryableMember::Value(member));
        self
    }

    /// Register a member duplicated into its own (indexable) column
    pub fn duplicated(mut self, name: &str, value_type: ValueType) -> Self {
        let column = format!("{}.{}", DOCUMENT_ALIAS, column_name(&self.path_of(name)));
        let member = self.value_member(name, value_type, Some(column));
        self.table.insert(name.to_string(), QueryableMember::Value(member));
        self
    }

    /// Register a nested object
    pub fn child<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MemberTableBuilder) -> MemberTableBuilder,
    {
        let nested = Self::nested(
            format!("{}.{}", self.table.declaring_type, name),
            self.table.root.clone(),
            self.table.depth,
            self.path_of(name),
        );
        let members = configure(nested).build();
        let member = ChildMember {
            path: self.path_of(name).join("."),
            json_locator: self.json_path(name, false),
            members: Arc::new(members),
        };
        self.table.insert(name.to_string(), QueryableMember::Child(member));
        self
    }

    /// Register a collection of simple values stored in the JSON payload
    pub fn collection(mut self, name: &str, element_type: ValueType) -> Self {
        let json_locator = self.json_path(name, false);
        let array_locator = format!(
            "CAST(ARRAY(SELECT jsonb_array_elements_text({})) as {}[])",
            json_locator,
            element_type.pg_type()
        );
        let explode_locator = format!("jsonb_array_elements_text({})", json_locator);
        let length_locator = format!("jsonb_array_length({})", json_locator);
        let member =
            self.scalar_collection(name, element_type, json_locator, array_locator, explode_locator, length_locator, false);
        self.table.insert(name.to_string(), QueryableMember::Collection(member));
        self
    }

    /// Register a collection of simple values duplicated into an array column
    pub fn duplicated_collection(mut self, name: &str, element_type: ValueType) -> Self {
        let json_locator = self.json_path(name, false);
        let array_locator = format!("{}.{}", DOCUMENT_ALIAS, column_name(&self.path_of(name)));
        let explode_locator = format!("UNNEST({})", array_locator);
        let length_locator = format!("COALESCE(array_length({}, 1), 0)", array_locator);
        let member =
            self.scalar_collection(name, element_type, json_locator, array_locator, explode_locator, length_locator, true);
        self.table.insert(name.to_string(), QueryableMember::Collection(member));
        self
    }

    #[allow(clippy::too_many_arguments)]
    fn scalar_collection(
        &self,
        name: &str,
        element_type: ValueType,
        json_locator: String,
        array_locator: String,
        explode_locator: String,
        length_locator: String,
        duplicated: bool,
    ) -> CollectionMember {
        let path = self.path_of(name).join(".");
        let element_alias = format!("e{}", self.table.depth + 1);
        let element_raw = format!("{}.data", element_alias);
        let element = ValueMember {
            path: format!("{}.element", path),
            value_type: element_type,
            typed_locator: element_type.cast(&element_raw),
            json_locator: element_raw,
            column_locator: None,
        };

        CollectionMember {
            length: self.length_member(&path, length_locator),
            whole: self.whole_member(&path, &json_locator),
            path,
            element_type: Some(element_type),
            json_locator,
            array_locator: Some(array_locator),
            explode_locator,
            element_alias,
            element: ElementMember::Scalar(element),
            duplicated,
        }
    }

    /// Register a collection of child documents
    pub fn document_collection<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MemberTableBuilder) -> MemberTableBuilder,
    {
        let path = self.path_of(name).join(".");
        let json_locator = self.json_path(name, false);
        let element_alias = format!("e{}", self.table.depth + 1);
        let element_table = configure(Self::new(
            format!("{}.{}", self.table.declaring_type, name),
            format!("{}.data", element_alias),
            self.table.depth + 1,
        ))
        .build();

        let member = CollectionMember {
            length: self.length_member(&path, format!("jsonb_array_length({})", json_locator)),
            whole: self.whole_member(&path, &json_locator),
            path,
            element_type: None,
            explode_locator: format!("jsonb_array_elements({})", json_locator),
            json_locator,
            array_locator: None,
            element_alias,
            element: ElementMember::Document(Arc::new(element_table)),
            duplicated: false,
        };
        self.table.insert(name.to_string(), QueryableMember::Collection(member));
        self
    }

    fn length_member(&self, path: &str, locator: String) -> ValueMember {
        ValueMember {
            path: format!("{}.Count", path),
            value_type: ValueType::Int,
            json_locator: locator.clone(),
            typed_locator: locator,
            column_locator: None,
        }
    }

    fn whole_member(&self, path: &str, json_locator: &str) -> ValueMember {
        ValueMember {
            path: path.to_string(),
            value_type: ValueType::Json,
            json_locator: json_locator.to_string(),
            typed_locator: json_locator.to_string(),
            column_locator: None,
        }
    }

    pub fn build(self) -> MemberTable {
        self.table
    }
}

/// Column name of a duplicated member: the path lower-cased and joined with `_`
pub fn column_name(path: &[String]) -> String {
    path.iter()
        .map(|segment| to_snake_case(segment))
        .collect::<Vec<_>>()
        .join("_")
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
