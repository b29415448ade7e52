//! Relational include resolution.
//!
//! For every included list `C` the resolver derives, per result row, a where-clause on `C`
//! and runs it as an ordinary [`StoreBackend::find`]. The rows found are attached to the
//! result row under the key `C`, always as an array.
//!
//! # Join key strategy
//!
//! The join key is chosen per row, strictly in this order:
//!
//! 1. [`JoinStrategy::Explicit`]: the include names `on` pairs, so each related row must
//!    have `foreign_field == row[local_field]`.
//! 2. [`JoinStrategy::BelongsTo`]: the row carries a non-null `C_id`, so it points at the
//!    related row with `id == row[C_id]`.
//! 3. [`JoinStrategy::HasMany`]: otherwise the related rows point back at this row through
//!    `{list}_id == row.id`.
//!
//! Reordering these rules changes which rows are joined, so the order is part of the
//! contract every backend must follow.

use bson::{Bson, Document};
use futures::future::try_join_all;
use tracing::debug;

use crate::{
    backend::StoreBackend,
    document::{ID_FIELD, document_id, foreign_key},
    error::StoreResult,
    query::{Include, IncludeSpec, Predicate, Query},
};

/// The rule used to join one row onto an included list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    Explicit,
    BelongsTo,
    HasMany,
}

/// Picks the join rule for `row` of `list` including `included`.
pub fn join_strategy(included: &str, spec: &IncludeSpec, row: &Document) -> JoinStrategy {
    if !spec.on.is_empty() {
        return JoinStrategy::Explicit;
    }

    match row.get(foreign_key(included)) {
        None | Some(Bson::Null) => JoinStrategy::HasMany,
        Some(_) => JoinStrategy::BelongsTo,
    }
}

/// Builds the where-clause selecting the rows of `included` related to `row`.
pub fn join_predicate(list: &str, included: &str, spec: &IncludeSpec, row: &Document) -> Predicate {
    let value_of = |field: &str| row.get(field).cloned().unwrap_or(Bson::Null);

    match join_strategy(included, spec, row) {
        JoinStrategy::Explicit => spec
            .on
            .iter()
            .fold(Predicate::new(), |predicate, (local, foreign)| {
                predicate.eq(foreign.as_str(), value_of(local))
            }),
        JoinStrategy::BelongsTo => Predicate::new().eq(ID_FIELD, value_of(&foreign_key(included))),
        JoinStrategy::HasMany => Predicate::new().eq(
            foreign_key(list),
            document_id(row).cloned().unwrap_or(Bson::Null),
        ),
    }
}

/// Attaches the related rows named by `include` to every row of `rows`.
///
/// Lookups for one included list run concurrently; the `required` filter is applied only
/// once all of them have completed. Any failing lookup fails the whole resolution.
pub async fn resolve_includes<S>(
    source: &S,
    list: &str,
    mut rows: Vec<Document>,
    include: &Include,
) -> StoreResult<Vec<Document>>
where
    S: StoreBackend + ?Sized,
{
    for (included, spec) in include.iter() {
        debug!(list, included, rows = rows.len(), required = spec.required, "resolving include");

        let lookups = rows.iter().map(|row| {
            let query = Query {
                filter: join_predicate(list, included, spec, row),
                include: spec.include.clone(),
                ..Query::default()
            };

            source.find(included, query)
        });
        let related = try_join_all(lookups).await?;

        for (row, found) in rows.iter_mut().zip(related) {
            row.insert(
                included,
                found.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            );
        }

        if spec.required {
            rows.retain(|row| {
                matches!(row.get(included), Some(Bson::Array(found)) if !found.is_empty())
            });
        }
    }

    Ok(rows)
}
