//! Query construction and the portable predicate algebra.
//!
//! Every backend receives the same [`Query`] value and must honor it identically: a
//! [`Predicate`] (the where-clause), an [`Include`] (relational joins), paging and an
//! optional [`OrderBy`].
//!
//! # Query Building
//!
//! Queries can be constructed with the fluent builder API:
//!
//! ```ignore
//! use listlayer::query::{Query, Predicate, IncludeSpec, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Predicate::new().eq("type", "A").like("name", "%sage%"))
//!     .include("users", IncludeSpec::new().on("users_id", "id").required())
//!     .order_by("created", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! or parsed from the canonical document shape:
//!
//! ```ignore
//! let query = Query::try_from(doc! {
//!     "where": { "type": "A", "$or": [{ "name": { "$like": "%sage%" } }] },
//!     "include": { "users": { "on": { "users_id": "id" }, "required": true } },
//!     "orderBy": ["created", "desc"],
//!     "limit": 10,
//! })?;
//! ```

use std::fmt;

use bson::{Bson, Document};

use crate::error::{StoreError, StoreResult};

/// Reserved predicate key holding a disjunction of sub-predicates.
pub const OR_KEY: &str = "$or";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    fn parse(value: &str) -> StoreResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(StoreError::InvalidQuery(format!("unknown sort direction '{other}'"))),
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Comparison operators usable in a field constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// SQL LIKE style match where `%` matches any run of characters.
    Like,
    /// Negation of [`FieldOp::Like`].
    NotLike,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field value is a member of the given array.
    In,
}

impl FieldOp {
    /// Looks up an operator by its wire name (`$like`, `$gt`, ...).
    pub fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "$like" => Some(FieldOp::Like),
            "$notLike" => Some(FieldOp::NotLike),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            "$in" => Some(FieldOp::In),
            _ => None,
        }
    }

    /// The wire name of this operator.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Like => "$like",
            FieldOp::NotLike => "$notLike",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
        }
    }

    fn check_argument(&self, field: &str, argument: &Bson) -> StoreResult<()> {
        match (self, argument) {
            (FieldOp::Like | FieldOp::NotLike, Bson::String(_)) => Ok(()),
            (FieldOp::Like | FieldOp::NotLike, _) => Err(StoreError::InvalidQuery(
                format!("{} on '{field}' requires a string pattern", self.operator())
            )),
            (FieldOp::In, Bson::Array(_)) => Ok(()),
            (FieldOp::In, _) => Err(StoreError::InvalidQuery(
                format!("$in on '{field}' requires an array")
            )),
            _ => Ok(()),
        }
    }
}

/// A single constraint on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The field must equal the value.
    Eq(Bson),
    /// The field must satisfy the operator against the argument.
    Op(FieldOp, Bson),
}

/// A where-clause.
///
/// All field constraints are ANDed. When `or` is present at least one of its
/// sub-predicates must match as well; an empty disjunction never matches. The empty
/// predicate matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// Field constraints in declaration order.
    pub fields: Vec<(String, Condition)>,
    /// Optional disjunction ANDed with the field constraints.
    pub or: Option<Vec<Predicate>>,
}

impl Predicate {
    /// Creates the empty predicate, which matches everything.
    pub fn new() -> Self {
        Predicate::default()
    }

    /// Returns `true` if the predicate has no constraints at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.or.is_none()
    }

    /// Requires `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.fields.push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Requires `field` to match the LIKE `pattern`.
    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.op(field, FieldOp::Like, Bson::String(pattern.into()))
    }

    /// Requires `field` not to match the LIKE `pattern`.
    pub fn not_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.op(field, FieldOp::NotLike, Bson::String(pattern.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.op(field, FieldOp::Gt, value.into())
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.op(field, FieldOp::Gte, value.into())
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.op(field, FieldOp::Lt, value.into())
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.op(field, FieldOp::Lte, value.into())
    }

    /// Requires `field` to equal one of `values`.
    pub fn is_in<V: Into<Bson>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.op(field, FieldOp::In, Bson::Array(values))
    }

    /// Sets the disjunction; at least one of `predicates` must match.
    pub fn or(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.or = Some(predicates.into_iter().collect());
        self
    }

    fn op(mut self, field: impl Into<String>, op: FieldOp, value: Bson) -> Self {
        self.fields.push((field.into(), Condition::Op(op, value)));
        self
    }

    fn parse_field(&mut self, field: String, value: Bson) -> StoreResult<()> {
        match value {
            Bson::Document(spec) if spec.keys().any(|key| key.starts_with('$')) => {
                if !spec.keys().all(|key| key.starts_with('$')) {
                    return Err(StoreError::InvalidQuery(
                        format!("constraint on '{field}' mixes operators and plain fields")
                    ));
                }

                for (operator, argument) in spec {
                    let op = FieldOp::from_operator(&operator).ok_or_else(|| {
                        StoreError::InvalidQuery(format!("unknown operator '{operator}' on '{field}'"))
                    })?;
                    op.check_argument(&field, &argument)?;
                    self.fields.push((field.clone(), Condition::Op(op, argument)));
                }
            }
            value => self.fields.push((field, Condition::Eq(value))),
        }

        Ok(())
    }
}

impl TryFrom<Document> for Predicate {
    type Error = StoreError;

    fn try_from(document: Document) -> StoreResult<Self> {
        let mut predicate = Predicate::new();

        for (key, value) in document {
            if key == OR_KEY {
                let Bson::Array(items) = value else {
                    return Err(StoreError::InvalidQuery("$or requires an array of predicates".into()));
                };

                predicate.or = Some(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Bson::Document(sub) => Predicate::try_from(sub),
                            _ => Err(StoreError::InvalidQuery("$or entries must be documents".into())),
                        })
                        .collect::<StoreResult<Vec<_>>>()?
                );
            } else if key.starts_with('$') {
                return Err(StoreError::InvalidQuery(format!("unknown top-level operator '{key}'")));
            } else {
                predicate.parse_field(key, value)?;
            }
        }

        Ok(predicate)
    }
}

impl From<&Predicate> for Document {
    fn from(predicate: &Predicate) -> Self {
        let mut document = Document::new();

        for (field, condition) in &predicate.fields {
            match condition {
                Condition::Eq(value) => {
                    document.insert(field.clone(), value.clone());
                }
                Condition::Op(op, value) => match document.get_mut(field) {
                    Some(Bson::Document(ops)) if ops.keys().all(|key| key.starts_with('$')) => {
                        ops.insert(op.operator(), value.clone());
                    }
                    _ => {
                        let mut ops = Document::new();
                        ops.insert(op.operator(), value.clone());
                        document.insert(field.clone(), ops);
                    }
                },
            }
        }

        if let Some(or) = &predicate.or {
            document.insert(
                OR_KEY,
                or.iter()
                    .map(|sub| Bson::Document(Document::from(sub)))
                    .collect::<Vec<_>>(),
            );
        }

        document
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Document::from(self))
    }
}

/// How one related list is joined onto result rows.
///
/// Without `on` the join key is inferred by naming convention; see
/// [`crate::include`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeSpec {
    /// Explicit `(local_field, foreign_field)` pairs, ANDed.
    pub on: Vec<(String, String)>,
    /// Drop rows whose related set is empty.
    pub required: bool,
    /// Includes resolved on the related rows themselves.
    pub include: Include,
}

impl IncludeSpec {
    pub fn new() -> Self {
        IncludeSpec::default()
    }

    /// Joins where the related row's `foreign_field` equals this row's `local_field`.
    pub fn on(mut self, local_field: impl Into<String>, foreign_field: impl Into<String>) -> Self {
        self.on.push((local_field.into(), foreign_field.into()));
        self
    }

    /// Marks the join as required (inner join semantics).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a nested include resolved against the related list.
    pub fn include(mut self, list: impl Into<String>, spec: IncludeSpec) -> Self {
        self.include = self.include.with(list, spec);
        self
    }
}

impl TryFrom<Document> for IncludeSpec {
    type Error = StoreError;

    fn try_from(document: Document) -> StoreResult<Self> {
        let mut spec = IncludeSpec::new();

        for (key, value) in document {
            match (key.as_str(), value) {
                ("on", Bson::Document(on)) => {
                    for (local, foreign) in on {
                        let Bson::String(foreign) = foreign else {
                            return Err(StoreError::InvalidQuery(
                                format!("include 'on.{local}' must name a foreign field")
                            ));
                        };
                        spec.on.push((local, foreign));
                    }
                }
                ("required", Bson::Boolean(required)) => spec.required = required,
                ("include", Bson::Document(nested)) => spec.include = Include::try_from(nested)?,
                (key, _) => {
                    return Err(StoreError::InvalidQuery(format!("unexpected include option '{key}'")));
                }
            }
        }

        Ok(spec)
    }
}

/// Related lists to attach to each result row, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Include(Vec<(String, IncludeSpec)>);

impl Include {
    pub fn new() -> Self {
        Include::default()
    }

    /// Adds (or replaces) the spec for `list`.
    pub fn with(mut self, list: impl Into<String>, spec: IncludeSpec) -> Self {
        let list = list.into();

        match self.0.iter_mut().find(|(name, _)| *name == list) {
            Some((_, existing)) => *existing = spec,
            None => self.0.push((list, spec)),
        }

        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludeSpec)> {
        self.0.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Returns `true` if any top-level include is required.
    pub fn has_required(&self) -> bool {
        self.0.iter().any(|(_, spec)| spec.required)
    }
}

impl TryFrom<Document> for Include {
    type Error = StoreError;

    fn try_from(document: Document) -> StoreResult<Self> {
        document
            .into_iter()
            .try_fold(Include::new(), |include, (list, spec)| match spec {
                Bson::Document(spec) => Ok(include.with(list, IncludeSpec::try_from(spec)?)),
                _ => Err(StoreError::InvalidQuery(format!("include '{list}' must be a document"))),
            })
    }
}

/// A structured query for retrieving documents from one list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Where-clause; empty matches everything.
    pub filter: Predicate,
    /// Related lists to attach.
    pub include: Include,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip (for pagination).
    pub offset: Option<usize>,
    /// Sort specification for results.
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a query with just a where-clause.
    pub fn filtered(filter: Predicate) -> Self {
        Query { filter, ..Query::default() }
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

fn parse_count(key: &str, value: Bson) -> StoreResult<usize> {
    let count = match value {
        Bson::Int32(n) => i64::from(n),
        Bson::Int64(n) => n,
        other => {
            return Err(StoreError::InvalidQuery(format!("{key} must be an integer, got {other}")));
        }
    };

    usize::try_from(count)
        .map_err(|_| StoreError::InvalidQuery(format!("{key} must not be negative")))
}

fn parse_order_by(value: Bson) -> StoreResult<OrderBy> {
    match value {
        Bson::String(field) => Ok(OrderBy { field, direction: SortDirection::Asc }),
        Bson::Array(parts) => match parts.as_slice() {
            [Bson::String(field)] => Ok(OrderBy { field: field.clone(), direction: SortDirection::Asc }),
            [Bson::String(field), Bson::String(direction)] => Ok(OrderBy {
                field: field.clone(),
                direction: SortDirection::parse(direction)?,
            }),
            _ => Err(StoreError::InvalidQuery("orderBy must be [field, direction]".into())),
        },
        _ => Err(StoreError::InvalidQuery("orderBy must be [field, direction]".into())),
    }
}

impl TryFrom<Document> for Query {
    type Error = StoreError;

    fn try_from(document: Document) -> StoreResult<Self> {
        let mut query = Query::new();

        for (key, value) in document {
            match (key.as_str(), value) {
                ("where", Bson::Document(filter)) => query.filter = Predicate::try_from(filter)?,
                ("include", Bson::Document(include)) => query.include = Include::try_from(include)?,
                ("limit", value) => query.limit = Some(parse_count("limit", value)?),
                ("offset", value) => query.offset = Some(parse_count("offset", value)?),
                ("orderBy", value) => query.order_by = Some(parse_order_by(value)?),
                (key, _) => return Err(StoreError::InvalidQuery(format!("unexpected query key '{key}'"))),
            }
        }

        Ok(query)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the where-clause for this query.
    pub fn filter(mut self, filter: Predicate) -> Self {
        self.query.filter = filter;
        self
    }

    /// Attaches rows of `list` to every result.
    pub fn include(mut self, list: impl Into<String>, spec: IncludeSpec) -> Self {
        self.query.include = self.query.include.with(list, spec);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip (for pagination).
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort specification for the query results.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.order_by = Some(OrderBy { field: field.into(), direction });
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks a [`Predicate`], letting backends evaluate or translate it.
///
/// The in-memory engine evaluates predicates with a visitor whose output is `bool`;
/// translating backends produce their native filter representation instead.
pub trait PredicateVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error>;
    fn visit_eq(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_op(
        &mut self,
        field: &str,
        op: FieldOp,
        argument: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_condition(
        &mut self,
        field: &str,
        condition: &Condition,
    ) -> Result<Self::Output, Self::Error> {
        match condition {
            Condition::Eq(value) => self.visit_eq(field, value),
            Condition::Op(op, argument) => self.visit_op(field, *op, argument),
        }
    }
}
