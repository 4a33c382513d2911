/*
 * This modules contains the `TaggingConfig` struct, which implements the default trait, and its
 * builder. The config describes the tokenizer that produced the subword tokens (how it marks
 * unknown text and word continuations) and how the labels of the boundary tokens are encoded. It
 * can be passed to `output_labels`, `encode_span_labels` and `label_span_file`.
*/
use either::Either as LeftOrRight;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

pub const DEFAULT_UNKNOWN_TOKEN: &str = "[UNK]";
pub const DEFAULT_CONTINUATION_PREFIX: &str = "##";
pub const DEFAULT_IGNORE_INDEX: i64 = -100;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// Config struct used to simplify the inputs of the alignment and label encoding functions. It
/// implements the default trait.
pub struct TaggingConfig {
    /// Token emitted by the tokenizer for text it cannot represent. The characters covered by such
    /// a token cannot be aligned.
    unknown_token: String,
    /// Marker in front of the subword tokens continuing a word (e.g. `"##平"`).
    continuation_prefix: String,
    /// Should we check that the tokens spell the text (whitespace excepted) before aligning them?
    /// The check is skipped when the tokens contain an unknown token.
    check_alignment: bool,
    /// Integer label given to the boundary tokens (e.g. `[CLS]` and `[SEP]`) when encoding labels.
    ignore_index: i64,
}

impl TaggingConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn unknown_token(&self) -> &str {
        &self.unknown_token
    }
    pub fn continuation_prefix(&self) -> &str {
        &self.continuation_prefix
    }
    pub fn check_alignment(&self) -> bool {
        self.check_alignment
    }
    pub fn ignore_index(&self) -> i64 {
        self.ignore_index
    }
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            unknown_token: String::from(DEFAULT_UNKNOWN_TOKEN),
            continuation_prefix: String::from(DEFAULT_CONTINUATION_PREFIX),
            check_alignment: true,
            ignore_index: DEFAULT_IGNORE_INDEX,
        }
    }
}

impl From<TaggingConfigBuilder> for TaggingConfig {
    fn from(value: TaggingConfigBuilder) -> Self {
        Self {
            unknown_token: value.unknown_token.either_into(),
            continuation_prefix: value.continuation_prefix.either_into(),
            check_alignment: value.check_alignment,
            ignore_index: value.ignore_index,
        }
    }
}

impl Display for TaggingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Unknown token: {:?}\n Continuation prefix: {:?}\n Checking the alignment of the tokens: {}\n Label of the boundary tokens: {}", self.unknown_token, self.continuation_prefix, self.check_alignment, self.ignore_index);
        write!(f, "{}", string)
    }
}

/// This builder can be used to build and customize a `TaggingConfig` stucture.
#[derive(Debug, Clone)]
pub struct TaggingConfigBuilder {
    unknown_token: LeftOrRight<String, &'static str>,
    continuation_prefix: LeftOrRight<String, &'static str>,
    check_alignment: bool,
    ignore_index: i64,
}

impl Default for TaggingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggingConfigBuilder {
    pub fn unknown_token<S: Into<String>>(mut self, unknown_token: S) -> Self {
        self.unknown_token = LeftOrRight::Left(unknown_token.into());
        self
    }
    pub fn continuation_prefix<S: Into<String>>(mut self, continuation_prefix: S) -> Self {
        self.continuation_prefix = LeftOrRight::Left(continuation_prefix.into());
        self
    }
    pub fn check_alignment(mut self, check_alignment: bool) -> Self {
        self.check_alignment = check_alignment;
        self
    }
    pub fn ignore_index(mut self, ignore_index: i64) -> Self {
        self.ignore_index = ignore_index;
        self
    }
    pub fn new() -> Self {
        Self {
            unknown_token: LeftOrRight::Right(DEFAULT_UNKNOWN_TOKEN),
            continuation_prefix: LeftOrRight::Right(DEFAULT_CONTINUATION_PREFIX),
            check_alignment: true,
            ignore_index: DEFAULT_IGNORE_INDEX,
        }
    }
    pub fn build(self) -> TaggingConfig {
        TaggingConfig::from(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_builder_defaults() {
        let config = TaggingConfigBuilder::default().build();
        assert_eq!(config, TaggingConfig::default());
        assert_eq!(config.unknown_token(), "[UNK]");
        assert_eq!(config.continuation_prefix(), "##");
        assert!(config.check_alignment());
        assert_eq!(config.ignore_index(), -100);
    }

    #[rstest]
    #[case("<unk>")]
    #[case("[UNK]")]
    #[case("")]
    fn test_builder_setters_unknown_token(#[case] unknown_token: &str) {
        let builder = TaggingConfigBuilder::default();
        let config = builder.unknown_token(unknown_token).build();
        assert_eq!(config.unknown_token, unknown_token)
    }

    #[rstest]
    #[case("▁")]
    #[case("@@")]
    fn test_builder_setters_continuation_prefix(#[case] prefix: &str) {
        let builder = TaggingConfigBuilder::default();
        let config = builder.continuation_prefix(String::from(prefix)).build();
        assert_eq!(config.continuation_prefix, prefix)
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_builder_setters_check_alignment(#[case] check: bool) {
        let builder = TaggingConfigBuilder::default();
        let config = builder.check_alignment(check).build();
        assert_eq!(config.check_alignment, check)
    }

    #[rstest]
    #[case(-100)]
    #[case(-1)]
    fn test_builder_setters_ignore_index(#[case] ignore_index: i64) {
        let builder = TaggingConfigBuilder::default();
        let config = builder.ignore_index(ignore_index).build();
        assert_eq!(config.ignore_index, ignore_index)
    }
}
