//! Sequential stages whose user function can fail.
//!
//! Failures are data: they go to a sibling error transport instead of the
//! value transport. Both outputs close together once the input is
//! exhausted. Drain both (e.g. with `tokio::join!`); an error transport
//! nobody reads eventually blocks the stage.

use crate::pipeline::Stage;
use crate::processors::flatten;
use crate::transport::{Receiver, Sender};

/// Send to whichever side applies. Returns `false` once both sides have lost
/// every receiver and the stage should stop.
pub(crate) async fn route<U, E>(
    result: Result<Option<U>, E>,
    values: &Sender<U>,
    errors: &Sender<E>,
) -> bool {
    match result {
        Ok(Some(value)) => values.send(value).await.is_ok() || !errors.is_closed(),
        Ok(None) => !(values.is_closed() && errors.is_closed()),
        Err(error) => errors.send(error).await.is_ok() || !values.is_closed(),
    }
}

/// Apply `f`, routing `Ok` values and `Err` failures to separate outputs.
pub fn map_with_err<T, U, E, F>(input: Receiver<T>, mut f: F) -> (Receiver<U>, Receiver<E>)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: FnMut(T) -> Result<U, E> + Send + 'static,
{
    let stage = Stage::new("map_with_err", *input.config());
    let (values_tx, values) = stage.output();
    let (errors_tx, errors) = stage.output();
    stage.run(move |ctx| async move {
        while let Some(item) = input.recv().await {
            if !route(f(item).map(Some), &values_tx, &errors_tx).await {
                return;
            }
        }
        ctx.draining();
    });
    (values, errors)
}

/// Keep elements for which `predicate` returns `Ok(true)`; failures go to the
/// error output and their element is dropped.
pub fn filter_with_err<T, E, P>(input: Receiver<T>, mut predicate: P) -> (Receiver<T>, Receiver<E>)
where
    T: Send + 'static,
    E: Send + 'static,
    P: FnMut(&T) -> Result<bool, E> + Send + 'static,
{
    let stage = Stage::new("filter_with_err", *input.config());
    let (values_tx, values) = stage.output();
    let (errors_tx, errors) = stage.output();
    stage.run(move |ctx| async move {
        while let Some(item) = input.recv().await {
            let verdict = predicate(&item).map(|keep| keep.then_some(item));
            if !route(verdict, &values_tx, &errors_tx).await {
                return;
            }
        }
        ctx.draining();
    });
    (values, errors)
}

/// [`crate::processors::flat_map`] whose mapping can fail.
pub fn flat_map_with_err<T, U, E, F>(input: Receiver<T>, f: F) -> (Receiver<U>, Receiver<E>)
where
    T: Send + 'static,
    U: Send + 'static,
    E: Send + 'static,
    F: FnMut(T) -> Result<Receiver<U>, E> + Send + 'static,
{
    let (inners, errors) = map_with_err(input, f);
    (flatten(inners), errors)
}
