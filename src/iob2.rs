/*!
Tags a tokenized sentence with the entities recognized by a model.

The model only gives back `(type, name)` pairs, not positions. The pairs are placed on the tokens
with a single left to right sweep:

1. pairs whose type is not one of the four [`EntityType`] verbose names are dropped, and so are
   pairs whose words do not all appear among the tokens (matching is case sensitive);
2. the remaining pairs are sorted by the position of their (first) word;
3. the tokens are swept once, each pair being consumed by the first position where it matches
   exactly.

A single-word pair that never matches exactly is never consumed, and every pair sorted after it is
ignored. Overlapping pairs are not reconciled: a pair starting inside a span that was already
tagged is ignored as well.
*/
use crate::entity::RecognizedEntity;
use crate::labels::{EntityType, Iob2Tag};
use ahash::AHashSet;
use tracing::debug;

/// Returns one tag per token.
///
/// ```rust
/// use iobtag::{as_iob2_format, RecognizedEntity};
///
/// let tokens = ["their", "opening", "meeting", "against", "Syria"];
/// let entities = vec![
///     RecognizedEntity::new("Location", "Syria"),
///     RecognizedEntity::new("Organization", "opening meeting"),
/// ];
/// let tags: Vec<String> = as_iob2_format(&tokens, &entities)
///     .iter()
///     .map(|t| t.to_string())
///     .collect();
/// assert_eq!(tags, vec!["O", "B-ORG", "I-ORG", "O", "B-LOC"]);
/// ```
pub fn as_iob2_format<S: AsRef<str>>(
    tokens: &[S],
    recognized_entities: &[RecognizedEntity],
) -> Vec<Iob2Tag> {
    let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
    let token_set: AHashSet<&str> = tokens.iter().copied().collect();

    let mut entities: Vec<(usize, EntityType, &str)> = recognized_entities
        .iter()
        .filter_map(|e| {
            let Some(entity_type) = EntityType::from_verbose(&e.entity_type) else {
                debug!(entity = %e, "dropping an entity of unknown type");
                return None;
            };
            if !is_in_tokens(&e.name, &token_set) {
                debug!(entity = %e, "dropping an entity absent from the tokens");
                return None;
            }
            get_index(&tokens, &e.name).map(|index| (index, entity_type, e.name.as_str()))
        })
        .collect();
    // stable: pairs starting on the same token keep the model's order
    entities.sort_by_key(|(index, _, _)| *index);

    let mut tags = Vec::with_capacity(tokens.len());
    let mut remaining = entities.iter().peekable();
    let mut index = 0;
    while index < tokens.len() {
        let Some((_, entity_type, name)) = remaining.peek() else {
            tags.push(Iob2Tag::Outside);
            index += 1;
            continue;
        };
        let word_count = name.split(' ').count();
        let end = index + word_count;
        let matches = if word_count == 1 {
            tokens[index] == *name
        } else {
            end <= tokens.len() && tokens[index..end].join(" ") == *name
        };
        if matches {
            tags.push(Iob2Tag::Begin(*entity_type));
            tags.extend((1..word_count).map(|_| Iob2Tag::Inside(*entity_type)));
            remaining.next();
            index = end;
        } else {
            tags.push(Iob2Tag::Outside);
            index += 1;
        }
    }
    for (_, entity_type, name) in remaining {
        debug!(%entity_type, name, "entity was never placed on the tokens");
    }
    tags
}

/// Loose containment check: a single word must be one of the tokens, the words of a multi-word
/// name must each be one of the tokens (in any order). A name without any word is never
/// contained.
pub fn is_in_tokens(name: &str, token_set: &AHashSet<&str>) -> bool {
    let mut words = name.split_whitespace().peekable();
    match (words.next(), words.peek()) {
        (None, _) => false,
        (Some(_), None) => token_set.contains(name),
        (Some(first), Some(_)) => {
            token_set.contains(first) && words.all(|w| token_set.contains(w))
        }
    }
}

/// Position of the name among the tokens, or of its first word for a multi-word name.
pub fn get_index(tokens: &[&str], name: &str) -> Option<usize> {
    let mut words = name.split_whitespace();
    let first = words.next()?;
    let word = if words.next().is_none() { name } else { first };
    tokens.iter().position(|t| *t == word)
}
