use serde::{Deserialize, Serialize};
use std::{borrow::Cow, error::Error, fmt::Display};

mod chunks;

// Re-exporting
pub use chunks::{get_entities, Chunk, ParsingError};

/// An entity annotated on a piece of text. The span is a half-open range of *character* offsets
/// (unicode scalar values, not bytes): `text.chars().skip(start).take(end - start)` is the
/// mention.
///
/// It (de)serializes as `{"name": "大谷翔平", "span": [0, 4], "type": "人名"}`.
#[derive(Debug, Hash, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity<'a> {
    pub name: Cow<'a, str>,
    pub span: [usize; 2],
    #[serde(rename = "type")]
    pub entity_type: Cow<'a, str>,
}

impl<'a> Entity<'a> {
    pub fn new<N, T>(name: N, start: usize, end: usize, entity_type: T) -> Self
    where
        N: Into<Cow<'a, str>>,
        T: Into<Cow<'a, str>>,
    {
        Entity {
            name: name.into(),
            span: [start, end],
            entity_type: entity_type.into(),
        }
    }

    pub fn start(&self) -> usize {
        self.span[0]
    }

    pub fn end(&self) -> usize {
        self.span[1]
    }

    /// Checks `start < end <= text_len`, `text_len` being the number of characters of the
    /// annotated text.
    pub fn validate(&self, text_len: usize) -> Result<(), InvalidSpan> {
        if self.start() < self.end() && self.end() <= text_len {
            Ok(())
        } else {
            Err(InvalidSpan {
                name: self.name.to_string(),
                start: self.start(),
                end: self.end(),
                text_len,
            })
        }
    }
}

impl<'a> Display for Entity<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.entity_type,
            self.name,
            self.start(),
            self.end()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub text_len: usize,
}

impl Display for InvalidSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The span [{}, {}) of the entity {:?} does not fit in a text of {} characters",
            self.start, self.end, self.name, self.text_len
        )
    }
}

impl Error for InvalidSpan {}

/// A `(type, name)` pair read from a model answer such as `["Location", "JAPAN"]`. Neither the
/// type nor the name is checked here: the model is free to answer with `"Date"` or with a name
/// that is not in the sentence.
#[derive(Debug, Hash, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedEntity {
    pub entity_type: String,
    pub name: String,
}

impl RecognizedEntity {
    pub fn new<T: Into<String>, N: Into<String>>(entity_type: T, name: N) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
        }
    }
}

impl Display for RecognizedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}, {:?}]", self.entity_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 4, 5, true)]
    #[case(0, 5, 5, true)]
    #[case(4, 4, 5, false)]
    #[case(3, 6, 5, false)]
    #[case(3, 2, 5, false)]
    fn test_validate(
        #[case] start: usize,
        #[case] end: usize,
        #[case] text_len: usize,
        #[case] valid: bool,
    ) {
        let entity = Entity::new("x", start, end, "T");
        assert_eq!(entity.validate(text_len).is_ok(), valid)
    }

    #[test]
    fn test_entity_json_shape() {
        let entity = Entity::new("大谷翔平", 0, 4, "人名");
        let json = serde_json::to_string(&entity).unwrap();
        assert_eq!(json, r#"{"name":"大谷翔平","span":[0,4],"type":"人名"}"#);
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
