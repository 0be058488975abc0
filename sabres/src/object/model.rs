use super::SabresObject;

/// A typed wrapper around the [`SabresObject`] of one class.
///
/// ```ignore
/// struct Movie(SabresObject);
///
/// impl Model for Movie {
///     const CLASS_NAME: &'static str = "Movie";
///     fn from_object(object: SabresObject) -> Self { Movie(object) }
///     fn object(&self) -> &SabresObject { &self.0 }
/// }
/// ```
pub trait Model: Sized {
    const CLASS_NAME: &'static str;

    fn from_object(object: SabresObject) -> Self;

    fn object(&self) -> &SabresObject;

    /// Wrap an object of the model's class, `None` for any other class.
    fn cast(object: SabresObject) -> Option<Self> {
        (object.class_name() == Self::CLASS_NAME).then(|| Self::from_object(object))
    }
}
