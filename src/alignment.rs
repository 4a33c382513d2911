/*!
Places character-span entities on subword tokens.

Annotated datasets give entities as character spans (`{"name": "大谷翔平", "span": [0, 4], "type":
"人名"}`) while models work on the subword tokens of a tokenizer (`[CLS] 大谷 翔 ##平 は ... [SEP]`).
This module aligns the characters of a text with its tokens and derives the token labels from the
alignment.

The first and the last tokens are boundary tokens (e.g. `[CLS]` and `[SEP]`): they cover no
character and get the [`SpanLabel::NotApplicable`] label. Unknown tokens (e.g. `[UNK]`) cover no
character either, so an entity starting or ending under one of them cannot be placed and is
skipped.
*/
use crate::config::TaggingConfig;
use crate::entity::{Entity, InvalidSpan};
use crate::labels::LabelVocabulary;
use crate::records::SpanResult;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::Display;
use tracing::debug;

/// Label of a token or of a character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpanLabel<'a> {
    Outside,
    Begin(Cow<'a, str>),
    Inside(Cow<'a, str>),
    /// Boundary tokens. They are never scored nor trained on.
    NotApplicable,
}

impl<'a> Display for SpanLabel<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpanLabel::Outside => write!(f, "O"),
            SpanLabel::Begin(t) => write!(f, "B-{}", t),
            SpanLabel::Inside(t) => write!(f, "I-{}", t),
            SpanLabel::NotApplicable => write!(f, "-"),
        }
    }
}

impl<'a> Serialize for SpanLabel<'a> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    /// The tokens do not spell the text. The tokenizer does not match the text (or was given
    /// another text) and no label derived from these tokens can be trusted.
    TokenizerMismatch {
        text: String,
        joined_tokens: String,
        /// Character offset of the first difference, in the text without whitespace.
        first_difference: usize,
    },
    /// An entity span does not fit in its text.
    InvalidSpan {
        name: String,
        start: usize,
        end: usize,
        text_len: usize,
    },
}

impl Display for AlignmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenizerMismatch {
                text,
                joined_tokens,
                first_difference,
            } => write!(
                f,
                "The tokens do not match the text {:?}: the tokens spell {:?}, the first difference is at character {}",
                text, joined_tokens, first_difference
            ),
            Self::InvalidSpan {
                name,
                start,
                end,
                text_len,
            } => write!(
                f,
                "The span [{}, {}) of the entity {:?} does not fit in a text of {} characters",
                start, end, name, text_len
            ),
        }
    }
}

impl Error for AlignmentError {}

impl From<InvalidSpan> for AlignmentError {
    fn from(value: InvalidSpan) -> Self {
        Self::InvalidSpan {
            name: value.name,
            start: value.start,
            end: value.end,
            text_len: value.text_len,
        }
    }
}

/// Returns, for every character of `text`, the indices of the tokens it belongs to. Characters
/// that were dropped by the tokenizer (whitespace) or swallowed by an unknown token belong to no
/// token.
///
/// When `config.check_alignment()` is set and no token is unknown, the tokens (without boundary
/// tokens and continuation prefixes) must spell the text without its whitespace.
///
/// ```rust
/// use iobtag::{get_char_to_token_alignments, TaggingConfig};
///
/// let tokens = ["[CLS]", "さくら", "学院", "[SEP]"];
/// let alignments = get_char_to_token_alignments("さくら学院", &tokens, &TaggingConfig::default()).unwrap();
/// assert_eq!(alignments, vec![vec![1], vec![1], vec![1], vec![2], vec![2]]);
///
/// let tokens = ["[CLS]", "矢", "##吹", "[UNK]", "監督", "[SEP]"];
/// let alignments = get_char_to_token_alignments("矢吹怗一監督", &tokens, &TaggingConfig::default()).unwrap();
/// assert_eq!(alignments, vec![vec![1], vec![2], vec![], vec![], vec![4], vec![4]]);
/// ```
pub fn get_char_to_token_alignments<S: AsRef<str>>(
    text: &str,
    tokens: &[S],
    config: &TaggingConfig,
) -> Result<Vec<Vec<usize>>, AlignmentError> {
    let last = tokens.len().saturating_sub(1);
    let pieces: Vec<Piece<'_>> = tokens
        .iter()
        .enumerate()
        .take(last)
        .skip(1)
        .map(|(index, token)| {
            let token = token.as_ref();
            if token == config.unknown_token() {
                Piece::Unknown
            } else {
                Piece::Known {
                    index,
                    text: token
                        .strip_prefix(config.continuation_prefix())
                        .unwrap_or(token),
                }
            }
        })
        .collect();

    let has_unknown = pieces.iter().any(|p| matches!(p, Piece::Unknown));
    if config.check_alignment() && !has_unknown {
        check_alignment(text, &pieces)?;
    }

    let text_chars: Vec<char> = text.chars().collect();
    Ok(align_characters(&text_chars, &pieces))
}

/// A token between the boundary tokens, without its continuation prefix.
enum Piece<'t> {
    Known { index: usize, text: &'t str },
    Unknown,
}

fn joined_tokens(pieces: &[Piece<'_>]) -> String {
    pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Known { text, .. } => Some(*text),
            Piece::Unknown => None,
        })
        .collect()
}

fn check_alignment(text: &str, pieces: &[Piece<'_>]) -> Result<(), AlignmentError> {
    let joined_tokens = joined_tokens(pieces);
    let mut text_chars = text.chars().filter(|c| !c.is_whitespace());
    let mut joined = joined_tokens.chars();
    let mut position = 0;
    loop {
        match (text_chars.next(), joined.next()) {
            (None, None) => return Ok(()),
            (Some(a), Some(b)) if a == b => position += 1,
            _ => {
                return Err(AlignmentError::TokenizerMismatch {
                    text: text.to_string(),
                    joined_tokens,
                    first_difference: position,
                })
            }
        }
    }
}

fn same_char(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Places the tokens on the text, in order. Every known token is matched as a contiguous run of
/// characters after the previous match, whitespace excepted. An unknown token covers at least one
/// character, so the token following it cannot match right after the previous run. Characters
/// outside every run belong to no token.
fn align_characters(text: &[char], pieces: &[Piece<'_>]) -> Vec<Vec<usize>> {
    let mut alignments = vec![Vec::new(); text.len()];
    let mut position = 0;
    let mut after_unknown = false;
    for piece in pieces {
        let (index, token) = match piece {
            Piece::Unknown => {
                after_unknown = true;
                continue;
            }
            Piece::Known { index, text } => (*index, *text),
        };
        let width = token.chars().count();
        if width == 0 {
            continue;
        }
        while position < text.len() && text[position].is_whitespace() {
            position += 1;
        }
        let from = if after_unknown { position + 1 } else { position };
        let Some(start) = find_run(text, token, width, from) else {
            debug!(token, "the token is not found in the text");
            continue;
        };
        for alignment in alignments[start..start + width].iter_mut() {
            alignment.push(index);
        }
        position = start + width;
        after_unknown = false;
    }
    alignments
}

/// First position at or after `from` where `token` (of `width` characters) spells the text.
fn find_run(text: &[char], token: &str, width: usize, from: usize) -> Option<usize> {
    let last_start = text.len().checked_sub(width)?;
    (from..=last_start).find(|&start| {
        text[start..start + width]
            .iter()
            .zip(token.chars())
            .all(|(a, b)| same_char(*a, b))
    })
}

/// Labels every token from the character-span entities of the text: `B-<type>` on the token of
/// the first character of an entity, `I-<type>` on the following tokens up to the token of its
/// last character, `O` elsewhere. The first and the last tokens are always labelled `-`.
///
/// ```rust
/// use iobtag::{output_labels, Entity, TaggingConfig};
///
/// let text = "大谷翔平は岩手県水沢市出身";
/// let tokens = ["[CLS]", "大谷", "翔", "##平", "は", "岩手", "県", "水沢", "市", "出身", "[SEP]"];
/// let entities = [
///     Entity::new("大谷翔平", 0, 4, "人名"),
///     Entity::new("岩手県水沢市", 5, 11, "地名"),
/// ];
/// let labels: Vec<String> = output_labels(text, &tokens, &entities, &TaggingConfig::default())
///     .unwrap()
///     .iter()
///     .map(|l| l.to_string())
///     .collect();
/// assert_eq!(
///     labels,
///     vec!["-", "B-人名", "I-人名", "I-人名", "O", "B-地名", "I-地名", "I-地名", "I-地名", "O", "-"]
/// );
/// ```
pub fn output_labels<'e, S: AsRef<str>>(
    text: &str,
    tokens: &[S],
    entities: &'e [Entity<'_>],
    config: &TaggingConfig,
) -> Result<Vec<SpanLabel<'e>>, AlignmentError> {
    let alignments = get_char_to_token_alignments(text, tokens, config)?;
    let mut labels = vec![SpanLabel::Outside; tokens.len()];
    for entity in entities {
        entity.validate(alignments.len())?;
        let (Some(&start), Some(&end)) = (
            alignments[entity.start()].first(),
            alignments[entity.end() - 1].first(),
        ) else {
            debug!(%entity, "the entity starts or ends on an unknown token, skipping it");
            continue;
        };
        let entity_type: &'e str = entity.entity_type.as_ref();
        labels[start] = SpanLabel::Begin(Cow::Borrowed(entity_type));
        for label in labels.iter_mut().take(end + 1).skip(start + 1) {
            *label = SpanLabel::Inside(Cow::Borrowed(entity_type));
        }
    }
    if let Some(first) = labels.first_mut() {
        *first = SpanLabel::NotApplicable;
    }
    if let Some(last) = labels.last_mut() {
        *last = SpanLabel::NotApplicable;
    }
    Ok(labels)
}

/// One label per character of `text`. Entities are applied in order, a later entity overwriting
/// the labels of an earlier one.
///
/// ```rust
/// use iobtag::{create_character_labels, Entity};
///
/// let entities = [Entity::new("大谷翔平", 0, 4, "人名")];
/// let labels: Vec<String> = create_character_labels("大谷翔平は", &entities)
///     .unwrap()
///     .iter()
///     .map(|l| l.to_string())
///     .collect();
/// assert_eq!(labels, vec!["B-人名", "I-人名", "I-人名", "I-人名", "O"]);
/// ```
pub fn create_character_labels<'e>(
    text: &str,
    entities: &'e [Entity<'_>],
) -> Result<Vec<SpanLabel<'e>>, AlignmentError> {
    let text_len = text.chars().count();
    let mut labels = vec![SpanLabel::Outside; text_len];
    for entity in entities {
        entity.validate(text_len)?;
        let entity_type: &'e str = entity.entity_type.as_ref();
        labels[entity.start()] = SpanLabel::Begin(Cow::Borrowed(entity_type));
        for label in labels[entity.start() + 1..entity.end()].iter_mut() {
            *label = SpanLabel::Inside(Cow::Borrowed(entity_type));
        }
    }
    Ok(labels)
}

/// Character labels of the gold and of the predicted entities of every result, ready to be scored
/// with [`crate::classification_report`].
pub fn convert_results_to_labels(
    results: &[SpanResult<'_>],
) -> Result<(Vec<Vec<String>>, Vec<Vec<String>>), AlignmentError> {
    let mut true_labels = Vec::with_capacity(results.len());
    let mut pred_labels = Vec::with_capacity(results.len());
    for result in results {
        true_labels.push(as_strings(&create_character_labels(
            &result.text,
            &result.entities,
        )?));
        pred_labels.push(as_strings(&create_character_labels(
            &result.text,
            &result.pred_entities,
        )?));
    }
    Ok((true_labels, pred_labels))
}

pub(crate) fn as_strings(labels: &[SpanLabel<'_>]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

/// Integer labels for training. Boundary tokens get `config.ignore_index()`, labels missing from
/// the vocabulary get the id of `O`.
pub fn encode_span_labels(
    labels: &[SpanLabel<'_>],
    vocabulary: &LabelVocabulary,
    config: &TaggingConfig,
) -> Vec<i64> {
    let outside = vocabulary.id("O").unwrap_or(0) as i64;
    labels
        .iter()
        .map(|label| match label {
            SpanLabel::NotApplicable => config.ignore_index(),
            label => vocabulary
                .id(&label.to_string())
                .map(i64::from)
                .unwrap_or(outside),
        })
        .collect()
}
