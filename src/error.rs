use serde::{Deserialize, Serialize};

/// The category an error belongs to. The distinction matters to callers because the
/// recovery policy differs between them: an invalid input document or an undecodable
/// stamp image aborts the whole operation and is surfaced to the user, while structural
/// problems encountered mid-mutation point at the document internals rather than at
/// what the user handed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StampErrorKind {
    /// The input bytes are not a document the parser accepts. Raised before any page
    /// is touched and before any resource is embedded.
    InvalidDocument,
    /// The stamp image payload could not be decoded into any supported embeddable
    /// format, even after normalization.
    ImageDecode,
    /// A font program could not be loaded or embedded and no fallback succeeded.
    FontLoad,
    /// The document structure is missing something the mutation needs, for example a
    /// resolvable MediaBox, or an operation was invoked in a state that forbids it.
    Document,
}

/// A struct that represents an error with a category, a context and possibly the
/// propagated source error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampError {
    pub kind: StampErrorKind,
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for StampError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for StampError {}

impl StampError {
    /// Create a new `StampError` of the given category with the given context.
    pub fn with_context<S: Into<String>>(kind: StampErrorKind, context: S) -> StampError {
        StampError {
            kind,
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `StampError` of the given category with the given context and
    /// source error.
    pub fn with_error<S: Into<String>>(
        kind: StampErrorKind,
        context: S,
        error: &dyn std::error::Error,
    ) -> StampError {
        StampError {
            kind,
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// The category of the error.
    pub fn kind(&self) -> StampErrorKind {
        self.kind
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_the_minimized_source_error() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "No such font file");
        let error = StampError::with_error(
            StampErrorKind::FontLoad,
            "Failed to read the handwritten font",
            &source,
        );
        assert_eq!(
            error.to_string(),
            "Failed to read the handwritten font: no such font file"
        );
        assert_eq!(error.kind(), StampErrorKind::FontLoad);
    }

    #[test]
    fn display_without_source_is_the_context_alone() {
        let error = StampError::with_context(StampErrorKind::InvalidDocument, "Not a PDF");
        assert_eq!(error.to_string(), "Not a PDF");
    }
}
