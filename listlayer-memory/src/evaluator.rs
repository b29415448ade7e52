//! Predicate evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for [`Predicate`]s: equality with numeric
//! normalization, the `$like` family, range operators, `$in` and `$or` disjunctions.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime};
use regex::Regex;

use listlayer_core::{
    error::{StoreError, StoreResult},
    query::{Condition, FieldOp, OrderBy, Predicate, PredicateVisitor, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numbers compare by value across types, so `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal. Integers stay integers; an integer and a double are compared exactly.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(&'a str),
    DateTime(DateTime),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value; only equal to an identical value.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of this value's type in the sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Int(_) | Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::DateTime(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Map(_) => 6,
            Comparable::Other(_) => 7,
        }
    }

    /// A total order usable for sorting: by type rank first, then by value.
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => int_float_cmp(*a, *b).unwrap_or(Ordering::Less),
            (Comparable::Number(a), Comparable::Int(b)) => int_float_cmp(*b, *a).map_or(Ordering::Greater, Ordering::reverse),
            // NaN sorts after every other number.
            (Comparable::Number(a), Comparable::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Int(a), Comparable::Number(b)) | (Comparable::Number(b), Comparable::Int(a)) => {
                int_float_cmp(*a, *b) == Some(Ordering::Equal)
            }
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => int_float_cmp(*a, *b),
            (Comparable::Number(a), Comparable::Int(b)) => int_float_cmp(*b, *a).map(Ordering::reverse),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders an integer against a double without rounding either; `None` for NaN.
fn int_float_cmp(int: i64, float: f64) -> Option<Ordering> {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    if float >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if float < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }

    // In range, so the truncated value is exactly representable as i64.
    let whole = float.trunc();
    Some(int.cmp(&(whole as i64)).then(if float > whole {
        Ordering::Less
    } else if float < whole {
        Ordering::Greater
    } else {
        Ordering::Equal
    }))
}

/// Value equality as the predicate algebra defines it.
pub fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Compiles a LIKE pattern: `%` matches any run of characters, everything else is literal,
/// and the match may start anywhere in the value.
pub fn like_regex(pattern: &str) -> StoreResult<Regex> {
    let source = pattern
        .split('%')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("(?s){source}"))
        .map_err(|err| StoreError::InvalidQuery(format!("bad $like pattern '{pattern}': {err}")))
}

/// Sorts `documents` in place by `order_by`. The sort is stable; a missing field sorts
/// like `null`.
pub fn sort_documents(documents: &mut [Document], order_by: &OrderBy) {
    let null = Bson::Null;

    documents.sort_by(|a, b| {
        let left = Comparable::from(a.get(&order_by.field).unwrap_or(&null));
        let right = Comparable::from(b.get(&order_by.field).unwrap_or(&null));

        match order_by.direction {
            SortDirection::Asc => left.total_cmp(&right),
            SortDirection::Desc => right.total_cmp(&left),
        }
    });
}

/// A predicate prepared for repeated evaluation.
///
/// All LIKE patterns are compiled once up front, so matching a whole collection does not
/// recompile them per document.
#[derive(Debug)]
pub struct PredicateMatcher<'p> {
    predicate: &'p Predicate,
    patterns: HashMap<&'p str, Regex>,
}

impl<'p> PredicateMatcher<'p> {
    pub fn new(predicate: &'p Predicate) -> StoreResult<Self> {
        let mut compiler = PatternCompiler::default();
        compiler.visit_predicate(predicate)?;

        Ok(PredicateMatcher { predicate, patterns: compiler.patterns })
    }

    pub fn matches(&self, document: &Document) -> bool {
        DocumentEvaluator { document, patterns: &self.patterns }
            .visit_predicate(self.predicate)
            .unwrap_or(false)
    }

    /// Clones every matching document, preserving input order.
    pub fn filter<'d>(&self, documents: impl IntoIterator<Item = &'d Document>) -> Vec<Document> {
        documents
            .into_iter()
            .filter(|document| self.matches(document))
            .cloned()
            .collect()
    }
}

/// Evaluates `predicate` against a single document.
pub fn matches(document: &Document, predicate: &Predicate) -> StoreResult<bool> {
    Ok(PredicateMatcher::new(predicate)?.matches(document))
}

#[derive(Default)]
struct PatternCompiler<'p> {
    patterns: HashMap<&'p str, Regex>,
}

impl<'p> PatternCompiler<'p> {
    fn visit_predicate(&mut self, predicate: &'p Predicate) -> StoreResult<()> {
        for (_, condition) in &predicate.fields {
            if let Condition::Op(FieldOp::Like | FieldOp::NotLike, Bson::String(pattern)) = condition {
                if !self.patterns.contains_key(pattern.as_str()) {
                    self.patterns.insert(pattern.as_str(), like_regex(pattern)?);
                }
            }
        }

        for sub in predicate.or.iter().flatten() {
            self.visit_predicate(sub)?;
        }

        Ok(())
    }
}

struct DocumentEvaluator<'a> {
    document: &'a Document,
    patterns: &'a HashMap<&'a str, Regex>,
}

impl<'a> DocumentEvaluator<'a> {
    fn like(&self, value: Option<&Bson>, pattern: &Bson) -> StoreResult<bool> {
        let (Some(Bson::String(value)), Bson::String(pattern)) = (value, pattern) else {
            return Ok(false);
        };

        match self.patterns.get(pattern.as_str()) {
            Some(regex) => Ok(regex.is_match(value)),
            None => Ok(like_regex(pattern)?.is_match(value)),
        }
    }
}

impl<'a> PredicateVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = StoreError;

    fn visit_predicate(&mut self, predicate: &Predicate) -> Result<Self::Output, Self::Error> {
        for (field, condition) in &predicate.fields {
            if !self.visit_condition(field, condition)? {
                return Ok(false);
            }
        }

        match &predicate.or {
            Some(any) => self.visit_or(any),
            None => Ok(true),
        }
    }

    fn visit_or(&mut self, predicates: &[Predicate]) -> Result<Self::Output, Self::Error> {
        for predicate in predicates {
            if self.visit_predicate(predicate)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_eq(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(
            self.document
                .get(field)
                .is_some_and(|field_value| values_equal(field_value, value))
        )
    }

    fn visit_op(&mut self, field: &str, op: FieldOp, argument: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = self.document.get(field);

        match op {
            FieldOp::Like => self.like(field_value, argument),
            FieldOp::NotLike => Ok(!self.like(field_value, argument)?),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let Some(field_value) = field_value else {
                    return Ok(false);
                };

                Ok(match Comparable::from(field_value).partial_cmp(&Comparable::from(argument)) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                })
            }
            FieldOp::In => match (field_value, argument) {
                (Some(field_value), Bson::Array(candidates)) => Ok(
                    candidates
                        .iter()
                        .any(|candidate| values_equal(field_value, candidate))
                ),
                _ => Ok(false),
            },
        }
    }
}
