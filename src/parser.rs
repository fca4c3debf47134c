/// Builds the items of a [`Collection`](crate::Collection) from its sources.
///
/// `parse` is expected to be deterministic and must not call back into the collection that owns
/// the parser. Closures of the form `Fn(&S) -> Result<T, E>` implement this trait.
pub trait Parser<S> {
    type Item;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Builds the item for `source`.
    fn parse(&self, source: &S) -> Result<Self::Item, Self::Error>;

    /// Releases an item that was evicted from the collection.
    ///
    /// Called exactly once per evicted item while the entry lock is held. The default
    /// implementation does nothing and leaves the cleanup to [`Drop`], which runs once the last
    /// [`std::sync::Arc`] handed out for the item is gone.
    fn dispose(&self, item: &Self::Item) -> Result<(), Self::Error> {
        let _ = item;
        Ok(())
    }
}

impl<S, T, E, F> Parser<S> for F
where
    F: Fn(&S) -> Result<T, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = T;
    type Error = E;

    fn parse(&self, source: &S) -> Result<T, E> {
        self(source)
    }
}
