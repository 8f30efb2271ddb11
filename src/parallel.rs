//! Parallel stages backed by a worker pool.
//!
//! A pool runs [`PipelineConfig::parallelism`](crate::pipeline::PipelineConfig)
//! workers that all receive from the same input transport. Each element is
//! handled by exactly one worker, but which worker gets it and when its
//! result is written is up to the scheduler: **output order is unspecified**.
//! The stage joins every worker before closing its output.
//!
//! User functions are shared by the workers, so they must be `Fn + Sync`.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

use crate::pipeline::{spawn_stage, Stage, StageContext};
use crate::processors::fallible::route;
use crate::transport::Receiver;

/// Spawn `workers` copies of `worker`, each given its own handle on `input`.
fn spawn_pool<T, W, Fut>(
    input: &Receiver<T>,
    ctx: &StageContext,
    workers: usize,
    mut worker: W,
) -> JoinSet<()>
where
    W: FnMut(Receiver<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut pool = JoinSet::new();
    for _ in 0..workers {
        let ctx = ctx.clone();
        let fut = worker(input.clone());
        pool.spawn(async move {
            fut.await;
            // the first worker out means the input is exhausted or nobody listens
            ctx.draining();
        });
    }
    tracing::debug!(stage = ctx.name(), workers, "worker pool started");
    pool
}

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Log a finished task. The first panic payload is kept for re-raising.
fn record(stage: &'static str, joined: Result<(), JoinError>, panic: &mut Option<PanicPayload>) {
    if let Err(err) = joined {
        tracing::warn!(stage, error = %err, "worker failed");
        if err.is_panic() && panic.is_none() {
            *panic = Some(err.into_panic());
        }
    }
}

/// Remove tasks that already finished without waiting for the others.
fn reap_finished(stage: &'static str, pool: &mut JoinSet<()>, panic: &mut Option<PanicPayload>) {
    while let Some(joined) = pool.try_join_next() {
        record(stage, joined, panic);
    }
}

/// Join barrier: wait for every worker. A worker panic is re-raised once the
/// others are done, which marks the stage aborted.
async fn join_pool(ctx: &StageContext, pool: JoinSet<()>) {
    join_pool_after(ctx, pool, None).await;
}

/// [`join_pool`] for a pool that was partly reaped already.
async fn join_pool_after(ctx: &StageContext, mut pool: JoinSet<()>, mut panic: Option<PanicPayload>) {
    while let Some(joined) = pool.join_next().await {
        record(ctx.name(), joined, &mut panic);
    }
    if let Some(payload) = panic {
        std::panic::resume_unwind(payload);
    }
}

/// Apply `f` on a worker pool. Output order is unspecified.
pub fn parallel_map<T, U, F>(input: Receiver<T>, f: F) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let config = *input.config();
    let f = Arc::new(f);
    spawn_stage("parallel_map", config, move |tx, ctx| async move {
        let pool = spawn_pool(&input, &ctx, config.workers(), |input| {
            let (tx, f) = (tx.clone(), Arc::clone(&f));
            async move {
                while let Some(item) = input.recv().await {
                    if tx.send(f(item)).await.is_err() {
                        return;
                    }
                }
            }
        });
        drop(input);
        join_pool(&ctx, pool).await;
    })
}

/// Keep elements matching `predicate`, tested on a worker pool. Output order
/// is unspecified.
pub fn parallel_filter<T, P>(input: Receiver<T>, predicate: P) -> Receiver<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let config = *input.config();
    let predicate = Arc::new(predicate);
    spawn_stage("parallel_filter", config, move |tx, ctx| async move {
        let pool = spawn_pool(&input, &ctx, config.workers(), |input| {
            let (tx, predicate) = (tx.clone(), Arc::clone(&predicate));
            async move {
                while let Some(item) = input.recv().await {
                    if predicate(&item) && tx.send(item).await.is_err() {
                        return;
                    }
                }
            }
        });
        drop(input);
        join_pool(&ctx, pool).await;
    })
}

/// Drain every inner transport concurrently, each in its own task.
/// Elements of one inner transport keep their relative order; elements of
/// different inner transports interleave arbitrarily.
pub fn parallel_flatten<T>(input: Receiver<Receiver<T>>) -> Receiver<T>
where
    T: Send + 'static,
{
    let config = *input.config();
    spawn_stage("parallel_flatten", config, move |tx, ctx| async move {
        let mut drains = JoinSet::new();
        let mut panic = None;
        while let Some(inner) = input.recv().await {
            if tx.is_closed() {
                break;
            }
            // keep the set bounded by the drains still running
            reap_finished(ctx.name(), &mut drains, &mut panic);
            let tx = tx.clone();
            drains.spawn(async move {
                while let Some(item) = inner.recv().await {
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }
            });
        }
        ctx.draining();
        drop(input);
        join_pool_after(&ctx, drains, panic).await;
    })
}

/// [`parallel_map`] into transports, then [`parallel_flatten`].
pub fn parallel_flat_map<T, U, F>(input: Receiver<T>, f: F) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Receiver<U> + Send + Sync + 'static,
{
    parallel_flatten(parallel_map(input, f))
}

/// [`parallel_map`] whose function can fail; failures go to the second
/// output. Both outputs close after every worker has finished.
pub fn parallel_map_with_err<T, U, E, F>(input: Receiver<T>, f: F) -> (Receiver<U>, Receiver<E>)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
{
    let config = *input.config();
    let f = Arc::new(f);
    let stage = Stage::new("parallel_map_with_err", config);
    let (values_tx, values) = stage.output();
    let (errors_tx, errors) = stage.output();
    stage.run(move |ctx| async move {
        let pool = spawn_pool(&input, &ctx, config.workers(), |input| {
            let (values_tx, errors_tx, f) = (values_tx.clone(), errors_tx.clone(), Arc::clone(&f));
            async move {
                while let Some(item) = input.recv().await {
                    if !route(f(item).map(Some), &values_tx, &errors_tx).await {
                        return;
                    }
                }
            }
        });
        drop(input);
        join_pool(&ctx, pool).await;
    });
    (values, errors)
}

/// [`parallel_filter`] whose predicate can fail; failures go to the second
/// output. Both outputs close after every worker has finished.
pub fn parallel_filter_with_err<T, E, P>(
    input: Receiver<T>,
    predicate: P,
) -> (Receiver<T>, Receiver<E>)
where
    T: Send + 'static,
    E: Send + 'static,
    P: Fn(&T) -> Result<bool, E> + Send + Sync + 'static,
{
    let config = *input.config();
    let predicate = Arc::new(predicate);
    let stage = Stage::new("parallel_filter_with_err", config);
    let (values_tx, values) = stage.output();
    let (errors_tx, errors) = stage.output();
    stage.run(move |ctx| async move {
        let pool = spawn_pool(&input, &ctx, config.workers(), |input| {
            let (values_tx, errors_tx, predicate) =
                (values_tx.clone(), errors_tx.clone(), Arc::clone(&predicate));
            async move {
                while let Some(item) = input.recv().await {
                    let verdict = predicate(&item).map(|keep| keep.then_some(item));
                    if !route(verdict, &values_tx, &errors_tx).await {
                        return;
                    }
                }
            }
        });
        drop(input);
        join_pool(&ctx, pool).await;
    });
    (values, errors)
}

/// [`parallel_map_with_err`] into transports, then [`parallel_flatten`].
pub fn parallel_flat_map_with_err<T, U, E, F>(
    input: Receiver<T>,
    f: F,
) -> (Receiver<U>, Receiver<E>)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<Receiver<U>, E> + Send + Sync + 'static,
{
    let (inners, errors) = parallel_map_with_err(input, f);
    (parallel_flatten(inners), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineConfig, StageState};
    use crate::processors::map;
    use crate::sinks::to_vec;
    use crate::sources::{from_vec, range};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sorted(mut v: Vec<i32>) -> Vec<i32> {
        v.sort_unstable();
        v
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_map_identity_multiset() {
        let rx = parallel_map(range(1, 1001), |x| x);
        let got = to_vec(rx.clone()).await;
        assert_eq!(got.len(), 1000);
        assert_eq!(sorted(got), (1..1001).collect::<Vec<_>>());
        rx.stage_closed().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_map_runs_configured_number_of_workers() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (counter, high) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let input = from_vec((0..30).collect::<Vec<i32>>())
            .with_config(PipelineConfig::default().parallelism(3));
        let rx = parallel_map(input, move |x| {
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            high.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            counter.fetch_sub(1, Ordering::SeqCst);
            x * 2
        });
        let got = sorted(to_vec(rx).await);
        assert_eq!(got, (0..30).map(|x| x * 2).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reap_finished_empties_pool_without_join() {
        let mut pool = JoinSet::new();
        for i in 0..50 {
            pool.spawn(async move {
                if i == 7 {
                    panic!("drain failed");
                }
            });
        }
        let mut panic = None;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !pool.is_empty() {
                reap_finished("test", &mut pool, &mut panic);
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("finished tasks were not reaped");
        assert!(panic.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_flatten_many_short_inners() {
        let inners = map(range(0, 20_000), |n| from_vec(vec![n]));
        let rx = parallel_flatten(inners);
        let got = to_vec(rx.clone()).await;
        assert_eq!(got.len(), 20_000);
        assert_eq!(sorted(got), (0..20_000).collect::<Vec<_>>());
        rx.stage_closed().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_filter_set_equality() {
        let rx = parallel_filter(range(0, 100), |x| x % 3 == 0);
        let got: HashSet<i32> = to_vec(rx).await.into_iter().collect();
        let expected: HashSet<i32> = (0..100).filter(|x| x % 3 == 0).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_flat_map_set_equality() {
        let rx = parallel_flat_map(range(0, 10), |n| range(n * 10, n * 10 + 10));
        assert_eq!(sorted(to_vec(rx).await), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_map_with_err_routes_and_closes_both() {
        let (values, errors) = parallel_map_with_err(range(0, 20), |n| {
            if n % 5 == 0 {
                Err(format!("multiple of five: {n}"))
            } else {
                Ok(n)
            }
        });
        let (values, errors) = tokio::join!(to_vec(values), to_vec(errors));
        assert_eq!(values.len(), 16);
        assert!(values.iter().all(|n| n % 5 != 0));
        let errors: HashSet<String> = errors.into_iter().collect();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains("multiple of five: 15"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_filter_with_err() {
        let (kept, errors) = parallel_filter_with_err(range(0, 10), |n: &i32| {
            if *n == 7 {
                Err(*n)
            } else {
                Ok(*n < 4)
            }
        });
        let (kept, errors) = tokio::join!(to_vec(kept), to_vec(errors));
        assert_eq!(sorted(kept), vec![0, 1, 2, 3]);
        assert_eq!(errors, vec![7]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_flat_map_with_err() {
        let (values, errors) = parallel_flat_map_with_err(range(0, 4), |n| {
            if n == 2 {
                Err("two")
            } else {
                Ok(range(0, n))
            }
        });
        let (values, errors) = tokio::join!(to_vec(values), to_vec(errors));
        assert_eq!(sorted(values), vec![0, 0, 1, 2]);
        assert_eq!(errors, vec!["two"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_panic_aborts_stage() {
        let rx = parallel_map(range(0, 10), |n: i32| {
            if n == 3 {
                panic!("worker blew up");
            }
            n
        });
        let _ = to_vec(rx.clone()).await;
        assert!(rx.stage_closed().await.is_err());
        assert_eq!(rx.stage_state(), Some(StageState::Aborted));
    }
}
