/*!
Label tables shared by the tagging, encoding and decoding steps.

The CoNLL-2003 table is fixed: `O` is `0` and every entity type gets a `B-` and an `I-` code, in
the order PER, ORG, LOC, MISC. Datasets annotated with other types (e.g. `人名`, `地名`) get a
vocabulary derived from the types they contain, see [`LabelVocabulary::from_entity_types`].
*/
use ahash::AHashMap;
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::OnceLock;

/// Entity types a model is asked to recognize. The verbose name is what the model answers with,
/// the short name is what ends up in the tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Miscellaneous,
}

impl EntityType {
    pub fn verbose(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Location => "Location",
            Self::Miscellaneous => "Miscellaneous",
        }
    }

    pub fn short(&self) -> &'static str {
        match self {
            Self::Person => "PER",
            Self::Organization => "ORG",
            Self::Location => "LOC",
            Self::Miscellaneous => "MISC",
        }
    }

    pub fn from_short(s: &str) -> Result<Self, LabelError> {
        all::<EntityType>()
            .find(|t| t.short() == s)
            .ok_or_else(|| LabelError::UnknownType(String::from(s)))
    }

    /// Looks up a verbose name. Matching is case-sensitive: `location` is not a type.
    pub fn from_verbose(s: &str) -> Option<Self> {
        all::<EntityType>().find(|t| t.verbose() == s)
    }
}

impl FromStr for EntityType {
    type Err = LabelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_verbose(s).ok_or_else(|| LabelError::UnknownType(String::from(s)))
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.verbose())
    }
}

/// A tag of the CoNLL-2003 IOB2 tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Iob2Tag {
    Outside,
    Begin(EntityType),
    Inside(EntityType),
}

impl Iob2Tag {
    /// Integer code of the tag in the CoNLL-2003 table.
    pub fn code(&self) -> u32 {
        let type_offset = |t: &EntityType| {
            all::<EntityType>()
                .position(|other| other == *t)
                .map(|p| p as u32 * 2)
                .unwrap_or_default()
        };
        match self {
            Self::Outside => 0,
            Self::Begin(t) => type_offset(t) + 1,
            Self::Inside(t) => type_offset(t) + 2,
        }
    }

    pub fn from_code(code: u32) -> Result<Self, LabelError> {
        if code == 0 {
            return Ok(Self::Outside);
        }
        let entity_type = all::<EntityType>()
            .nth(((code - 1) / 2) as usize)
            .ok_or(LabelError::UnknownCode(code))?;
        if code % 2 == 1 {
            Ok(Self::Begin(entity_type))
        } else {
            Ok(Self::Inside(entity_type))
        }
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Self::Outside => None,
            Self::Begin(t) | Self::Inside(t) => Some(*t),
        }
    }
}

impl Display for Iob2Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outside => write!(f, "O"),
            Self::Begin(t) => write!(f, "B-{}", t.short()),
            Self::Inside(t) => write!(f, "I-{}", t.short()),
        }
    }
}

impl FromStr for Iob2Tag {
    type Err = LabelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            None if s == "O" => Ok(Self::Outside),
            Some(("B", short)) => Ok(Self::Begin(EntityType::from_short(short)?)),
            Some(("I", short)) => Ok(Self::Inside(EntityType::from_short(short)?)),
            _ => Err(LabelError::UnknownLabel(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// The label is not part of the vocabulary
    UnknownLabel(String),
    /// The integer code is not part of the vocabulary
    UnknownCode(u32),
    UnknownType(String),
}

impl Display for LabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLabel(label) => write!(f, "The label {:?} is not in the vocabulary", label),
            Self::UnknownCode(code) => write!(f, "The code {} is not in the vocabulary", code),
            Self::UnknownType(t) => write!(f, "Unknown entity type: {:?}", t),
        }
    }
}

impl Error for LabelError {}

/// Bidirectional mapping between labels (`"O"`, `"B-PER"`, ...) and integer ids. Ids are dense and
/// start at `0`, which is always `"O"`.
#[derive(Debug, Clone, Serialize)]
pub struct LabelVocabulary {
    id2label: Vec<String>,
    #[serde(skip)]
    label2id: AHashMap<String, u32>,
}

/// The lookup table is derived from `id2label`, comparing the latter is enough.
impl PartialEq for LabelVocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.id2label == other.id2label
    }
}
impl Eq for LabelVocabulary {}

static CONLL_VOCABULARY: OnceLock<LabelVocabulary> = OnceLock::new();

impl LabelVocabulary {
    fn from_labels(id2label: Vec<String>) -> Self {
        let label2id = id2label
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i as u32))
            .collect();
        Self { id2label, label2id }
    }

    /// The fixed CoNLL-2003 table. It is built on first use and shared afterwards.
    pub fn conll() -> &'static LabelVocabulary {
        CONLL_VOCABULARY.get_or_init(|| {
            let mut labels = vec![Iob2Tag::Outside.to_string()];
            for t in all::<EntityType>() {
                labels.push(Iob2Tag::Begin(t).to_string());
                labels.push(Iob2Tag::Inside(t).to_string());
            }
            Self::from_labels(labels)
        })
    }

    /// Builds a vocabulary from the entity types found in a dataset. Types are sorted so that the
    /// ids do not depend on the order in which the examples are read: `O` is `0`, then the i-th
    /// type gets `B-<type>` at `2i+1` and `I-<type>` at `2i+2`.
    ///
    /// ```rust
    /// use iobtag::LabelVocabulary;
    ///
    /// let vocabulary = LabelVocabulary::from_entity_types(["地名", "人名", "地名"]);
    /// assert_eq!(vocabulary.id("O"), Some(0));
    /// assert_eq!(vocabulary.id("B-人名"), Some(1));
    /// assert_eq!(vocabulary.id("I-地名"), Some(4));
    /// ```
    pub fn from_entity_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = types
            .into_iter()
            .map(|t| String::from(t.as_ref()))
            .collect();
        let mut labels = Vec::with_capacity(unique.len() * 2 + 1);
        labels.push(String::from("O"));
        for t in unique {
            labels.push(format!("B-{}", t));
            labels.push(format!("I-{}", t));
        }
        Self::from_labels(labels)
    }

    pub fn id(&self, label: &str) -> Option<u32> {
        self.label2id.get(label).copied()
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.id2label.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }

    /// Labels in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id2label
            .iter()
            .enumerate()
            .map(|(i, l)| (i as u32, l.as_str()))
    }

    pub fn encode<S: Borrow<str>>(&self, labels: &[S]) -> Result<Vec<u32>, LabelError> {
        labels
            .iter()
            .map(|l| {
                self.id(l.borrow())
                    .ok_or_else(|| LabelError::UnknownLabel(String::from(l.borrow())))
            })
            .collect()
    }

    pub fn decode(&self, ids: &[u32]) -> Result<Vec<&str>, LabelError> {
        ids.iter()
            .map(|id| self.label(*id).ok_or(LabelError::UnknownCode(*id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
    use rstest::rstest;

    #[derive(Debug, Clone)]
    struct ArbitraryTag(Iob2Tag);

    impl Arbitrary for ArbitraryTag {
        fn arbitrary(g: &mut Gen) -> Self {
            let codes: Vec<u32> = (0..9).collect();
            let code = *g.choose(codes.as_ref()).unwrap();
            ArbitraryTag(Iob2Tag::from_code(code).unwrap())
        }
    }

    #[test]
    fn test_conll_table() {
        let vocabulary = LabelVocabulary::conll();
        let labels: Vec<&str> = vocabulary.iter().map(|(_, l)| l).collect();
        assert_eq!(
            labels,
            vec!["O", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC", "B-MISC", "I-MISC"]
        );
    }

    #[rstest]
    #[case("O", 0)]
    #[case("B-PER", 1)]
    #[case("I-ORG", 4)]
    #[case("B-LOC", 5)]
    #[case("I-MISC", 8)]
    fn test_tag_code_matches_vocabulary(#[case] label: &str, #[case] code: u32) {
        let tag: Iob2Tag = label.parse().unwrap();
        assert_eq!(tag.code(), code);
        assert_eq!(LabelVocabulary::conll().id(label), Some(code));
        assert_eq!(Iob2Tag::from_code(code).unwrap(), tag);
    }

    #[test]
    fn test_unknown_code_and_label() {
        assert_eq!(Iob2Tag::from_code(9), Err(LabelError::UnknownCode(9)));
        assert!("B-DATE".parse::<Iob2Tag>().is_err());
        assert!("X".parse::<Iob2Tag>().is_err());
        let vocabulary = LabelVocabulary::conll();
        assert_eq!(vocabulary.decode(&[0, 12]), Err(LabelError::UnknownCode(12)));
        assert_eq!(
            vocabulary.encode(&["O", "B-DATE"]),
            Err(LabelError::UnknownLabel(String::from("B-DATE")))
        );
    }

    #[rstest]
    #[case("Person", Some(EntityType::Person))]
    #[case("Miscellaneous", Some(EntityType::Miscellaneous))]
    #[case("location", None)]
    #[case("Date", None)]
    fn test_verbose_names(#[case] name: &str, #[case] expected: Option<EntityType>) {
        assert_eq!(EntityType::from_verbose(name), expected)
    }

    #[test]
    fn test_derived_vocabulary() {
        let vocabulary = LabelVocabulary::from_entity_types(vec!["地名", "人名", "施設名"]);
        let actual: Vec<(u32, &str)> = vocabulary.iter().collect();
        let expected = vec![
            (0, "O"),
            (1, "B-人名"),
            (2, "I-人名"),
            (3, "B-地名"),
            (4, "I-地名"),
            (5, "B-施設名"),
            (6, "I-施設名"),
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_propertie_encode_decode_round_trip() {
        fn round_trip(tags: Vec<ArbitraryTag>) -> TestResult {
            let labels: Vec<String> = tags.iter().map(|t| t.0.to_string()).collect();
            let vocabulary = LabelVocabulary::conll();
            let codes = vocabulary.encode(&labels).unwrap();
            let decoded = vocabulary.decode(&codes).unwrap();
            if decoded == labels {
                TestResult::passed()
            } else {
                TestResult::failed()
            }
        }
        let mut qc = QuickCheck::new().tests(500);
        qc.quickcheck(round_trip as fn(Vec<ArbitraryTag>) -> TestResult)
    }
}
