/**
This module retrieves the chunks of a tag sequence (e.g. `["B-PER", "I-PER", "O"]`), the same way
SeqEval does it in its default (lenient) mode. It is used to score predicted tags against gold
tags.
*/
use std::borrow::Cow;
use std::error::Error;
use std::fmt::Display;
use std::mem::take;
use std::slice::Iter;

/// A chunk of a tag sequence. `end` is inclusive.
#[derive(Debug, Hash, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Chunk<'a> {
    pub start: usize,
    pub end: usize,
    pub tag: Cow<'a, str>,
}

impl<'a> Chunk<'a> {
    pub(crate) fn new(start: usize, end: usize, tag: Cow<'a, str>) -> Self {
        Chunk { start, end, tag }
    }
}

impl<'a> Display for Chunk<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.tag, self.start, self.end)
    }
}

#[derive(Debug, PartialEq, Hash, Clone, Copy, Eq)]
/// Prefixes a tag can start with. All of them are a single ascii char.
enum Prefix {
    I,
    O,
    B,
    E,
    S,
    U,
    L,
}

impl TryFrom<char> for Prefix {
    type Error = ParsingError;
    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'I' => Ok(Self::I),
            'O' => Ok(Self::O),
            'B' => Ok(Self::B),
            'E' => Ok(Self::E),
            'S' => Ok(Self::S),
            'U' => Ok(Self::U),
            'L' => Ok(Self::L),
            _ => Err(ParsingError::PrefixError(String::from(value))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Could not split the tag into a prefix and a type
pub enum ParsingError {
    PrefixError(String),
    EmptyTag,
}

impl Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrefixError(s) => write!(
                f,
                "Could not parse the following string into a Prefix: {}",
                s
            ),
            Self::EmptyTag => write!(f, "Received an empty tag"),
        }
    }
}

impl Error for ParsingError {}

#[derive(Debug, PartialEq, Clone)]
struct InnerTag<'a> {
    /// The prefix, such as `B`, `I`, `O`, etc.
    prefix: Prefix,
    /// The type, such as `"PER"`, `"LOC"`. `"_"` when the tag has no type (e.g. `"O"`)
    entity_type: Cow<'a, str>,
}

impl<'a> InnerTag<'a> {
    /// The prefix is the first char, the type is whatever follows the delimiter.
    fn try_new(tag: &'a str) -> Result<Self, ParsingError> {
        let mut chars = tag.chars();
        let prefix = match chars.next() {
            Some(c) => Prefix::try_from(c)?,
            None => return Err(ParsingError::EmptyTag),
        };
        // skips the delimiter
        chars.next();
        let entity_type = match chars.as_str() {
            "" => Cow::Borrowed("_"),
            rest => Cow::Borrowed(rest),
        };
        Ok(Self {
            prefix,
            entity_type,
        })
    }
}

/// Retrieves the chunks of every sequence.
///
/// ```rust
/// use iobtag::get_entities;
///
/// let sequences = vec![vec!["B-PER", "I-PER", "O", "B-LOC"]];
/// let chunks = get_entities(&sequences).unwrap();
/// assert_eq!(chunks[0][0].to_string(), "(PER, 0, 1)");
/// assert_eq!(chunks[0][1].to_string(), "(LOC, 3, 3)");
/// ```
pub fn get_entities<'a, S: AsRef<str>>(
    sequences: &'a [Vec<S>],
) -> Result<Vec<Vec<Chunk<'a>>>, ParsingError> {
    let mut res = Vec::with_capacity(sequences.len());
    for sequence in sequences.iter() {
        let chunks: Result<Vec<_>, _> = LenientChunkIter::new(sequence).collect();
        res.push(chunks?)
    }
    Ok(res)
}

/// This wrapper around the content iterator appends a single `"O"` at the end of its inner
/// iterator, closing the last chunk.
struct InnerLenientChunkIter<'a, S> {
    content: Iter<'a, S>,
    is_at_end: bool,
}

impl<'a, S: AsRef<str>> InnerLenientChunkIter<'a, S> {
    fn new(seq: &'a [S]) -> Self {
        InnerLenientChunkIter {
            content: seq.iter(),
            is_at_end: false,
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for InnerLenientChunkIter<'a, S> {
    type Item = &'a str;
    fn next(&mut self) -> Option<Self::Item> {
        match self.content.next() {
            Some(v) => Some(v.as_ref()),
            None if self.is_at_end => None,
            None => {
                self.is_at_end = true;
                Some("O")
            }
        }
    }
}

/// This struct iterates over a *single* sequence and returns the chunks associated with it.
struct LenientChunkIter<'a, S> {
    inner: InnerLenientChunkIter<'a, S>,
    /// The prefix of the previous tag (e.g. 'I')
    prev_prefix: Prefix,
    /// The type of the previous tag (e.g. `"PER"`)
    prev_type: Option<Cow<'a, str>>,
    begin_offset: usize,
    index: usize,
}

impl<'a, S: AsRef<str>> LenientChunkIter<'a, S> {
    fn new(sequence: &'a [S]) -> Self {
        LenientChunkIter {
            inner: InnerLenientChunkIter::new(sequence),
            prev_type: None,
            prev_prefix: Prefix::O,
            begin_offset: 0,
            index: 0,
        }
    }

    /// Checks if a chunk ended between the previous and current tag.
    fn end_of_chunk(&self, current_prefix: &Prefix, current_type: &Cow<'a, str>) -> bool {
        match (self.prev_prefix, current_prefix) {
            (Prefix::E, _) => true,
            (Prefix::S, _) => true,
            (Prefix::B, Prefix::B) => true,
            (Prefix::B, Prefix::S) => true,
            (Prefix::B, Prefix::O) => true,
            (Prefix::I, Prefix::B) => true,
            (Prefix::I, Prefix::S) => true,
            (Prefix::I, Prefix::O) => true,
            (prev_prefix, _) => {
                !matches!(prev_prefix, Prefix::O) && self.prev_type.as_ref() != Some(current_type)
            }
        }
    }

    /// Checks if a chunk started between the previous and current tag.
    fn start_of_chunk(&self, current_prefix: &Prefix, current_type: &Cow<'a, str>) -> bool {
        match (self.prev_prefix, current_prefix) {
            (_, Prefix::B) => true,
            (_, Prefix::S) => true,
            (Prefix::E, Prefix::E) => true,
            (Prefix::E, Prefix::I) => true,
            (Prefix::S, Prefix::E) => true,
            (Prefix::S, Prefix::I) => true,
            (Prefix::O, Prefix::E) => true,
            (Prefix::O, Prefix::I) => true,
            (_, curr_prefix) => {
                !matches!(curr_prefix, Prefix::O) && self.prev_type.as_ref() != Some(current_type)
            }
        }
    }
}

impl<'a, S: AsRef<str>> Iterator for LenientChunkIter<'a, S> {
    type Item = Result<Chunk<'a>, ParsingError>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let current_tag = self.inner.next()?; // no more tags. We are done
            let mut inner_tag = match InnerTag::try_new(current_tag) {
                Ok(v) => v,
                Err(e) => {
                    self.index += 1;
                    return Some(Err(e));
                }
            };
            if self.end_of_chunk(&inner_tag.prefix, &inner_tag.entity_type) {
                let ret = take(&mut self.prev_type)
                    .map(|tag| Ok(Chunk::new(self.begin_offset, self.index - 1, tag)));
                if self.start_of_chunk(&inner_tag.prefix, &inner_tag.entity_type) {
                    self.begin_offset = self.index;
                }
                self.prev_prefix = inner_tag.prefix;
                self.prev_type = Some(inner_tag.entity_type);
                self.index += 1;
                if ret.is_some() {
                    return ret;
                }
                continue;
            };
            if self.start_of_chunk(&inner_tag.prefix, &inner_tag.entity_type) {
                self.begin_offset = self.index;
            };
            self.prev_prefix = inner_tag.prefix;
            self.prev_type = Some(take(&mut inner_tag.entity_type));
            self.index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl<'a> Chunk<'a> {
        pub fn as_tuple(&'a self) -> (usize, usize, &'a str) {
            (self.start, self.end, self.tag.as_ref())
        }
    }

    fn flat_tuples<'a>(chunks: &'a [Vec<Chunk<'a>>]) -> Vec<(usize, usize, &'a str)> {
        chunks
            .iter()
            .flat_map(|v| v.iter())
            .map(|e| e.as_tuple())
            .collect()
    }

    #[test]
    fn test_get_entities() {
        let seq = vec![vec![
            "O", "O", "O", "B-MISC", "I-MISC", "I-MISC", "O", "B-PER", "I-PER",
        ]];
        let chunks = get_entities(&seq).unwrap();
        let expected: Vec<(usize, usize, &str)> = vec![(3, 5, "MISC"), (7, 8, "PER")];
        assert_eq!(expected, flat_tuples(&chunks))
    }

    #[test]
    fn test_get_entities_adjacent_begins() {
        let seq = vec![vec!["B-LOC", "B-LOC", "I-LOC", "O", "B-MISC"]];
        let chunks = get_entities(&seq).unwrap();
        let expected: Vec<(usize, usize, &str)> = vec![(0, 0, "LOC"), (1, 2, "LOC"), (4, 4, "MISC")];
        assert_eq!(expected, flat_tuples(&chunks))
    }

    #[test]
    fn test_get_entities_lenient_inside_start() {
        // An `I-` after an `O` still opens a chunk in lenient mode, and a type change closes it.
        let seq = vec![vec!["O", "I-PER", "I-PER", "I-ORG"]];
        let chunks = get_entities(&seq).unwrap();
        let expected: Vec<(usize, usize, &str)> = vec![(1, 2, "PER"), (3, 3, "ORG")];
        assert_eq!(expected, flat_tuples(&chunks))
    }

    #[test]
    fn test_get_entities_owned_strings() {
        let seq = vec![vec![String::from("B-PER"), String::from("I-PER")]];
        let chunks = get_entities(&seq).unwrap();
        assert_eq!(vec![(0, 1, "PER")], flat_tuples(&chunks))
    }

    #[test]
    fn test_get_entities_errors() {
        let seq = vec![vec!["B-PER", "X-PER"]];
        assert_eq!(
            get_entities(&seq),
            Err(ParsingError::PrefixError(String::from("X")))
        );
        let seq = vec![vec![""]];
        assert_eq!(get_entities(&seq), Err(ParsingError::EmptyTag));
    }

    #[test]
    fn test_all_outside() {
        let seq = vec![vec!["O", "O"], vec![]];
        let chunks = get_entities(&seq).unwrap();
        assert!(chunks.iter().all(|c| c.is_empty()));
        assert_eq!(chunks.len(), 2);
    }
}
