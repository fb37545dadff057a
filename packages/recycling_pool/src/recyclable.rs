/// A type that a recycling pool knows how to construct.
///
/// [`make()`][Self::make] is the factory every pool calls when it needs a new instance. It is
/// invoked only when a slot is populated for the first time (or after the slot was emptied by
/// `clear()`) and when an elastic pool manufactures an overflow instance. It is **never**
/// invoked to refresh an instance that is being reused: a reused instance is handed out exactly
/// as its previous borrower left it and the arguments passed to `emplace()` are ignored.
///
/// Types whose construction cannot fail use [`Infallible`][std::convert::Infallible] as the
/// error type, which unlocks the non-fallible `emplace()` methods of the pools.
///
/// # Example
///
/// ```rust
/// use std::convert::Infallible;
///
/// use recycling_pool::Recyclable;
///
/// struct Tokenizer {
///     vocabulary: Vec<String>,
/// }
///
/// impl Recyclable for Tokenizer {
///     type Args = usize;
///     type Error = Infallible;
///
///     fn make(vocabulary_size: usize) -> Result<Self, Infallible> {
///         Ok(Self {
///             vocabulary: Vec::with_capacity(vocabulary_size),
///         })
///     }
/// }
/// ```
pub trait Recyclable: Sized {
    /// Arguments consumed by [`make()`][Self::make].
    type Args;

    /// The error returned when construction fails.
    type Error;

    /// Constructs a new instance from the given arguments.
    ///
    /// # Errors
    ///
    /// Returns the implementation-defined error if the instance cannot be constructed. The
    /// pool propagates the error to the caller of `try_emplace()` unchanged and leaves the
    /// slot it had reserved empty and available.
    fn make(args: Self::Args) -> Result<Self, Self::Error>;
}
