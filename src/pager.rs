// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cursor pagination.
//!
//! Every list operation pages through an ordered sequence with the same
//! helper. The cursor handed back to callers is opaque to them, but is just
//! the JSON encoding of the last identifier they have seen.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Smallest page ever returned.
pub const MIN_LIMIT: usize = 1;

/// Largest page ever returned.
pub const MAX_LIMIT: usize = 100;

/// Page size used when caller does not ask for one.
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    #[serde(rename = "lastID")]
    last_id: String,
}

/// Turn requested page size into the size actually served.
///
/// Zero means "no preference". Anything else is clamped into
/// `[MIN_LIMIT, MAX_LIMIT]`.
pub fn page_limit(requested: usize) -> usize {
    if requested == 0 {
        return DEFAULT_LIMIT;
    }
    requested.clamp(MIN_LIMIT, MAX_LIMIT)
}

/// Visit one page of `items`.
///
/// Starts right after the item whose identifier is encoded in `cursor`, or
/// at the beginning when there is no cursor. Returns a cursor for the next
/// page when this one was filled up and more items follow.
///
/// # Errors
///
/// - Return [`Error::InvalidArgument`] if cursor is malformed, or names an
///   item no longer in the sequence.
pub fn paginate<T, I, V>(
    items: &[T],
    cursor: Option<&str>,
    requested: usize,
    id_of: I,
    mut visit: V,
) -> Result<Option<String>>
where
    I: Fn(&T) -> &str,
    V: FnMut(&T),
{
    let limit = page_limit(requested);
    let start = match cursor.filter(|cursor| !cursor.is_empty()) {
        None => 0,
        Some(cursor) => {
            let cursor: Cursor = serde_json::from_str(cursor)
                .map_err(|err| Error::invalid(format!("invalid cursor: {err}")))?;
            let position = items
                .iter()
                .position(|item| id_of(item) == cursor.last_id)
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "invalid cursor: item {:?} no longer exists",
                        cursor.last_id
                    ))
                })?;
            position + 1
        }
    };

    let page = items.iter().skip(start).take(limit);
    let mut last = None;
    let mut visited = 0;
    for item in page {
        visit(item);
        last = Some(item);
        visited += 1;
    }

    let more = start + visited < items.len();
    match last {
        Some(item) if visited == limit && more => {
            let cursor = Cursor {
                last_id: id_of(item).to_string(),
            };
            serde_json::to_string(&cursor)
                .map(Some)
                .map_err(|err| Error::internal("encoding cursor", err))
        }
        _ => Ok(None),
    }
}

/// Collect one page of `items` into a vector.
pub fn page<T, I>(
    items: &[T],
    cursor: Option<&str>,
    requested: usize,
    id_of: I,
) -> Result<(Vec<T>, Option<String>)>
where
    T: Clone,
    I: Fn(&T) -> &str,
{
    let mut out = Vec::new();
    let next = paginate(items, cursor, requested, id_of, |item| out.push(item.clone()))?;
    Ok((out, next))
}
