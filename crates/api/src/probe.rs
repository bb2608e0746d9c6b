//! Ordered-candidate resolution.
//!
//! "Try these N resources in priority order, stop at the first one that
//! exists" shows up wherever the backend exposes the same data under
//! several names (log files under `.log` / `.txt` / bare). The resolver
//! distinguishes a miss (`Ok(None)`, move on) from a hard failure (recorded,
//! move on) so callers can tell "nothing there" from "could not fetch".

#![forbid(unsafe_code)]

use std::future::Future;

use crate::{ApiError, ApiResult};

/// Run `attempt` against each candidate in order and return the first hit.
///
/// Returns `Ok(None)` when every candidate was a clean miss, and
/// `Err(errors)` when nothing was found and at least one attempt failed
/// outright. Candidates after the first hit are never attempted.
pub async fn probe_ordered<C, T, F, Fut>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: F,
) -> Result<Option<T>, Vec<ApiError>>
where
    F: FnMut(C) -> Fut,
    Fut: Future<Output = ApiResult<Option<T>>>,
{
    let mut errors = Vec::new();
    for cand in candidates {
        match attempt(cand).await {
            Ok(Some(v)) => return Ok(Some(v)),
            Ok(None) => continue,
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(None)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn tries_candidates_in_order_until_one_hits() {
        let tried = RefCell::new(Vec::new());
        let res = probe_ordered([".log", ".txt", ""], |suffix| {
            tried.borrow_mut().push(suffix);
            async move {
                if suffix.is_empty() {
                    Ok(Some("found".to_string()))
                } else {
                    Ok(None)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap().as_deref(), Some("found"));
        assert_eq!(*tried.borrow(), vec![".log", ".txt", ""]);
    }

    #[tokio::test]
    async fn short_circuits_on_the_first_hit() {
        let tried = RefCell::new(Vec::new());
        let res = probe_ordered([".log", ".txt", ""], |suffix| {
            tried.borrow_mut().push(suffix);
            async move { Ok(Some(suffix.len())) }
        })
        .await;
        assert_eq!(res.unwrap(), Some(4));
        assert_eq!(*tried.borrow(), vec![".log"]);
    }

    #[tokio::test]
    async fn all_misses_resolve_to_none() {
        let res: Result<Option<String>, _> =
            probe_ordered([".log", ".txt"], |_| async { Ok(None) }).await;
        assert!(matches!(res, Ok(None)));
    }

    #[tokio::test]
    async fn hard_failures_are_collected_when_nothing_is_found() {
        let res: Result<Option<String>, _> = probe_ordered([".log", ".txt", ""], |suffix: &str| {
            async move {
                if suffix == ".txt" {
                    Err(ApiError::Transport("boom".into()))
                } else {
                    Ok(None)
                }
            }
        })
        .await;
        match res {
            Err(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected errors, got {:?}", other),
        }
    }
}
