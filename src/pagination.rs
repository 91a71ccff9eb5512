//! Listing and pagination over the sorted ID space of a namespace
//!
//! IDs are iterated in byte-wise ascending order. A continuation token is
//! an opaque marker naming the position strictly after the last returned
//! ID; resuming is a range scan from that position, so IDs present when
//! the token was issued are never skipped or repeated.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Record, RecordId};
use crate::{Error, Result};

/// Default page size when the caller does not specify one.
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Largest accepted page size.
pub const MAX_LIST_LIMIT: usize = 1000;

const TOKEN_PREFIX: &str = "qc1:";

/// One page of IDs plus the continuation token, if more remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage {
    pub ids: Vec<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_token: Option<String>,
}

fn encode_token(last_id: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, last_id)
}

fn decode_token(token: &str) -> Result<&str> {
    token
        .strip_prefix(TOKEN_PREFIX)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| Error::invalid_request("malformed pagination token"))
}

/// Produce one page of IDs from the record map.
pub fn list_page(
    records: &BTreeMap<RecordId, Arc<Record>>,
    prefix: Option<&str>,
    limit: Option<usize>,
    token: Option<&str>,
) -> Result<ListPage> {
    let limit = match limit {
        None => DEFAULT_LIST_LIMIT,
        Some(0) => return Err(Error::invalid_request("limit must be positive")),
        Some(n) if n > MAX_LIST_LIMIT => {
            return Err(Error::invalid_request(format!(
                "limit must not exceed {}",
                MAX_LIST_LIMIT
            )))
        }
        Some(n) => n,
    };

    let start: Bound<RecordId> = match token {
        Some(token) => Bound::Excluded(decode_token(token)?.to_string()),
        None => match prefix {
            Some(p) => Bound::Included(p.to_string()),
            None => Bound::Unbounded,
        },
    };

    let mut ids = Vec::with_capacity(limit.min(records.len()));
    let mut more = false;

    for id in records.range((start, Bound::Unbounded)).map(|(id, _)| id) {
        if let Some(p) = prefix {
            // The ID space is sorted, so the prefix range is contiguous.
            if !id.starts_with(p) {
                break;
            }
        }
        if ids.len() == limit {
            more = true;
            break;
        }
        ids.push(id.clone());
    }

    let pagination_token = if more {
        ids.last().map(|last| encode_token(last))
    } else {
        None
    };

    Ok(ListPage {
        ids,
        pagination_token,
    })
}
