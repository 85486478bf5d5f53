/// The single operation a [`PeriodicWorker`](super::PeriodicWorker) repeats.
///
/// Any `FnMut() + Send + 'static` closure is a `Tick`, so most callers never
/// implement this by hand. Implement it on a struct when the tick owns state
/// the caller wants to keep behind a name.
pub trait Tick: Send + 'static {
    fn tick(&mut self);
}

impl<F> Tick for F
where
    F: FnMut() + Send + 'static,
{
    fn tick(&mut self) {
        self()
    }
}
