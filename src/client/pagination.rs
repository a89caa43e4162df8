//! Cursor pagination for list endpoints
//!
//! List endpoints return `{data: [...], has_more}` and page forward with
//! `starting_after=<last id>`. Pagination stops on:
//! - an empty page
//! - `has_more == false`
//! - the iteration cap (reported as an error)

use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use tracing::debug;

use super::backoff::PAGE_LIMIT;
use super::{ClientError, ClientResult};

/// Maximum number of pages fetched for one listing
pub const MAX_ITERATIONS: usize = 10_000;

/// One page of a list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ListPage<T> {
    /// Objects on this page, newest first
    pub data: Vec<T>,
    /// Whether another page follows
    #[serde(default)]
    pub has_more: bool,
}

/// Query parameters owned by one page request
pub type PageParams = Vec<(&'static str, String)>;

/// Pagination helper for list endpoints
pub struct PaginationHelper;

impl PaginationHelper {
    /// Walk a list endpoint with `starting_after` cursors
    ///
    /// # Arguments
    /// * `endpoint` - Endpoint path, used in log and error messages
    /// * `base_params` - Filters sent with every page (e.g. `created[gt]`)
    /// * `fetch_fn` - Fetches a single page for the given parameters
    ///
    /// # Errors
    /// Returns error if the iteration cap is exceeded, an object without an
    /// `id` is followed by more pages, or a page fetch fails
    pub async fn paginate_cursor<F, Fut>(
        endpoint: &str,
        base_params: &[(&'static str, String)],
        fetch_fn: F,
    ) -> ClientResult<Vec<Value>>
    where
        F: Fn(PageParams) -> Fut,
        Fut: Future<Output = ClientResult<ListPage<Value>>>,
    {
        let mut all = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut iteration = 0;

        loop {
            if iteration >= MAX_ITERATIONS {
                return Err(ClientError::InvalidResponse(format!(
                    "max iterations ({MAX_ITERATIONS}) exceeded for {endpoint} - possible infinite loop. Last cursor: {}",
                    starting_after.as_deref().unwrap_or("<none>")
                )));
            }

            let mut params: PageParams = Vec::with_capacity(base_params.len() + 2);
            params.push(("limit", PAGE_LIMIT.to_string()));
            params.extend(base_params.iter().cloned());
            if let Some(cursor) = &starting_after {
                params.push(("starting_after", cursor.clone()));
            }

            let page = fetch_fn(params).await?;

            if page.data.is_empty() {
                debug!(
                    "Empty page received for {} at iteration {}. Total objects: {}",
                    endpoint,
                    iteration + 1,
                    all.len()
                );
                break;
            }

            debug!(
                "Received {} objects in page {} of {}",
                page.data.len(),
                iteration + 1,
                endpoint
            );

            let last_id = page
                .data
                .last()
                .and_then(|obj| obj.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let has_more = page.has_more;
            all.extend(page.data);

            if !has_more {
                break;
            }

            match last_id {
                Some(id) => starting_after = Some(id),
                None => {
                    return Err(ClientError::InvalidResponse(format!(
                        "{endpoint} reported has_more but the last object has no id"
                    )))
                }
            }

            iteration += 1;
        }

        debug!(
            "Pagination of {} completed after {} pages. Total objects: {}",
            endpoint,
            iteration + 1,
            all.len()
        );

        Ok(all)
    }
}
