//! Aegis Query Pipeline Builder
//!
//! Builds the aggregation pipeline the batched assembler uses for virtual
//! relationships: the related documents of every parent are matched in one
//! pass and grouped by the owning side's join key, so each group holds the
//! results of exactly one parent.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use aegis_document::{Pipeline, Query, Slice};

// =============================================================================
// Group Pipeline
// =============================================================================

/// `match -> sort -> [skip] -> [limit] -> project -> group(key, slice)`.
///
/// `query` already carries the join filter and the projection, widened to
/// keep `key`. Skip and limit set on `query` itself apply before grouping;
/// `slice` is applied inside every group.
pub fn group_pipeline(query: &Query, key: &str, slice: Option<Slice>) -> Pipeline {
    let mut pipeline = Pipeline::new()
        .match_filters(query.filters.clone())
        .sort(query.sort.clone());

    if let Some(skip) = query.skip {
        pipeline = pipeline.skip(skip);
    }
    if let Some(limit) = query.limit {
        pipeline = pipeline.limit(limit);
    }
    if let Some(projection) = &query.projection {
        pipeline = pipeline.project(projection.clone());
    }

    pipeline.group_by(key, slice.filter(|s| !s.is_noop()))
}

// =============================================================================
// Tests
// =============================================================================
