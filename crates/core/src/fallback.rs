//! Ordered fallback: try candidates one after another until one succeeds.
//!
//! Used by the document loader chain and by the generation chain
//! (primary → fallback model).

use std::future::Future;

/// A failed attempt against one candidate.
#[derive(Debug)]
pub struct Attempt<E> {
    pub name: String,
    pub error: E,
}

/// The first successful candidate plus everything that failed before it.
#[derive(Debug)]
pub struct Success<T, E> {
    pub value: T,
    pub name: String,
    /// Position of the winning candidate (0 = first).
    pub index: usize,
    pub failed: Vec<Attempt<E>>,
}

/// All attempted candidates failed (or an error stopped the walk).
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: Vec<Attempt<E>>,
    /// True when `should_continue` refused to move past an error.
    pub stopped_early: bool,
}

impl<E> Exhausted<E> {
    pub fn last_error(&self) -> Option<&E> {
        self.attempts.last().map(|a| &a.error)
    }
}

/// Walk `candidates` in order, calling `attempt` on each until one returns
/// `Ok`. After a failure the walk continues only when `should_continue`
/// accepts the error.
pub async fn try_in_order<C, T, E, Fut>(
    candidates: impl IntoIterator<Item = C>,
    name: impl Fn(&C) -> String,
    mut attempt: impl FnMut(C) -> Fut,
    should_continue: impl Fn(&E) -> bool,
) -> Result<Success<T, E>, Exhausted<E>>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failed: Vec<Attempt<E>> = Vec::new();
    let mut candidates = candidates.into_iter().enumerate().peekable();

    while let Some((index, candidate)) = candidates.next() {
        let label = name(&candidate);
        match attempt(candidate).await {
            Ok(value) => {
                if index > 0 {
                    tracing::info!(candidate = %label, index, "fallback candidate succeeded");
                }
                return Ok(Success { value, name: label, index, failed });
            }
            Err(error) => {
                let more = candidates.peek().is_some();
                let proceed = should_continue(&error);
                tracing::warn!(
                    candidate = %label,
                    error = %error,
                    will_retry = more && proceed,
                    "candidate failed"
                );
                failed.push(Attempt { name: label, error });
                if !proceed {
                    return Err(Exhausted { attempts: failed, stopped_early: more });
                }
            }
        }
    }

    Err(Exhausted { attempts: failed, stopped_early: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn first_success_wins() {
        let calls = AtomicUsize::new(0);
        let out = try_in_order(
            ["a", "b", "c"],
            |c| c.to_string(),
            |c| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if c == "a" { Err("boom".to_string()) } else { Ok(c.len()) } }
            },
            |_| true,
        )
        .await
        .unwrap();

        assert_eq!(out.name, "b");
        assert_eq!(out.index, 1);
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].name, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refusing_error_stops_the_walk() {
        let calls = AtomicUsize::new(0);
        let err = try_in_order(
            [1, 2],
            |c| format!("p{c}"),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("auth".to_string()) }
            },
            |e: &String| e != "auth",
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.stopped_early);
        assert_eq!(err.last_error().map(String::as_str), Some("auth"));
    }

    #[tokio::test]
    async fn all_failing_collects_every_attempt() {
        let err = try_in_order(
            ["x", "y"],
            |c| c.to_string(),
            |c| async move { Err::<(), _>(format!("{c} down")) },
            |_| true,
        )
        .await
        .unwrap_err();

        assert!(!err.stopped_early);
        let names: Vec<_> = err.attempts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
    }

    #[tokio::test]
    async fn empty_candidate_list_is_exhausted() {
        let err = try_in_order(
            Vec::<u8>::new(),
            |c| c.to_string(),
            |_| async { Ok::<_, String>(()) },
            |_| true,
        )
        .await
        .unwrap_err();
        assert!(err.attempts.is_empty());
    }
}
