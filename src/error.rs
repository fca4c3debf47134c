use thiserror::Error;

/// Errors returned by a [`Collection`](crate::Collection).
///
/// `E` is the error type of the [`Parser`](crate::Parser) backing the collection. Parser failures
/// are passed through unchanged in [`Error::Build`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// The threshold must be a value greater than 0.
    #[error("threshold must be a value greater than 0, got {0}")]
    InvalidThreshold(usize),

    /// The requested index does not address a source of the collection.
    #[error("index {index} is out of range for a collection of {len} sources")]
    IndexOutOfRange { index: usize, len: usize },

    /// Building the item failed.
    #[error("failed to build item: {0}")]
    Build(#[source] E),
}

impl<E> Error<E> {
    /// Returns the parser error if this is a build failure.
    pub fn into_build_error(self) -> Option<E> {
        match self {
            Error::Build(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq, Eq)]
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("broken source")
        }
    }

    impl std::error::Error for Broken {}

    #[test]
    fn it_formats_invalid_thresholds() {
        // given
        let err: Error<Broken> = Error::InvalidThreshold(0);

        // then
        assert_eq!(
            err.to_string(),
            "threshold must be a value greater than 0, got 0"
        );
    }

    #[test]
    fn it_formats_out_of_range_indices() {
        // given
        let err: Error<Broken> = Error::IndexOutOfRange { index: 3, len: 3 };

        // then
        assert_eq!(
            err.to_string(),
            "index 3 is out of range for a collection of 3 sources"
        );
    }

    #[test]
    fn it_exposes_the_build_error_as_source() {
        // given
        let err = Error::Build(Broken);

        // when
        let source = std::error::Error::source(&err).map(ToString::to_string);

        // then
        assert_eq!(source.as_deref(), Some("broken source"));
        assert_eq!(err.into_build_error(), Some(Broken));
    }
}
