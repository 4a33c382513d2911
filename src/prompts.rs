/*!
Prompts asking a text-generation model to recognize the named entities of a CoNLL-2003 sentence.
The answers are read back with [`crate::parse_response`].
*/
use crate::labels::EntityType;
use crate::records::{Conll03Example, Example};
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

/// Order in which the types are listed in the instructions.
const PROMPT_TYPES: [EntityType; 4] = [
    EntityType::Organization,
    EntityType::Person,
    EntityType::Location,
    EntityType::Miscellaneous,
];

const ANSWER_INSTRUCTION: &str = "Answer in the format [\"entity_type\", \"entity_name\"] without any explanation. If no entity exists, then just answer \"[]\".\n";

/// The five ways of asking for the entities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Sequence, Serialize, Deserialize,
)]
pub enum Instruction {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Default for Instruction {
    fn default() -> Self {
        Self::Two
    }
}

impl Instruction {
    pub fn number(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        all::<Self>().find(|i| i.number() == number)
    }

    /// The instruction followed by the answer format.
    pub fn text(&self) -> &'static str {
        static TEXTS: OnceLock<Vec<String>> = OnceLock::new();
        let texts = TEXTS.get_or_init(|| {
            all::<Self>()
                .map(|i| format!("{}{}", i.describe_task(), ANSWER_INSTRUCTION))
                .collect()
        });
        texts[self.number() as usize - 1].as_str()
    }

    fn describe_task(&self) -> String {
        let names: Vec<&str> = PROMPT_TYPES.iter().map(|t| t.verbose()).collect();
        let (last, rest) = match names.split_last() {
            Some((last, rest)) => (*last, rest.join(", ")),
            None => ("", String::new()),
        };
        match self {
            Self::One => format!(
                "Considering {} types of named entities including {} and {}, recognize all named entities in the given sentence.\n",
                names.len(), rest, last
            ),
            Self::Two => format!(
                "Given the list of entity types [{}], read the given sentence and find out all words/phrases that indicate the above types of named entities.\n",
                names.iter().map(|n| format!("\"{}\"", n)).collect::<Vec<_>>().join(", ")
            ),
            Self::Three => format!(
                "Read the given sentence carefully, identify all named entities of type {} or {}.\n",
                rest, last
            ),
            Self::Four => format!(
                "Analyze the given sentence and extract all word spans that refer to specific named entities of type {} or {}.\n",
                rest, last
            ),
            Self::Five => format!(
                "What named entities are mentioned in the given sentence? Only return named entities of type {} or {}.\n",
                rest, last
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownInstruction(pub String);

impl Display for UnknownInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unknown instruction number: {}. Expected a number between 1 and 5",
            self.0
        )
    }
}

impl std::error::Error for UnknownInstruction {}

impl FromStr for Instruction {
    type Err = UnknownInstruction;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| UnknownInstruction(s.to_string()))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// The prompt for a tokenized sentence: the instruction, then the sentence (tokens joined by a
/// space).
///
/// ```rust
/// use iobtag::{build_prompt, Instruction};
///
/// let prompt = build_prompt(Instruction::Three, &["JAPAN", "WIN"]);
/// assert!(prompt.starts_with("Read the given sentence carefully"));
/// assert!(prompt.ends_with("Sentence: JAPAN WIN\nAnswer:"));
/// ```
pub fn build_prompt<S: AsRef<str>>(instruction: Instruction, tokens: &[S]) -> String {
    let sentence: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
    format!(
        "{}Sentence: {}\nAnswer:",
        instruction.text(),
        sentence.join(" ")
    )
}

/// Attaches a prompt to every example.
pub fn create_prompts<I>(examples: I, instruction: Instruction) -> impl Iterator<Item = Example>
where
    I: IntoIterator<Item = Conll03Example>,
{
    examples.into_iter().map(move |example| {
        let prompt = build_prompt(instruction, &example.tokens);
        Example { example, prompt }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Instruction::One, "Considering 4 types of named entities including Organization, Person, Location and Miscellaneous, recognize all named entities in the given sentence.\n")]
    #[case(Instruction::Two, "Given the list of entity types [\"Organization\", \"Person\", \"Location\", \"Miscellaneous\"], read the given sentence and find out all words/phrases that indicate the above types of named entities.\n")]
    #[case(Instruction::Three, "Read the given sentence carefully, identify all named entities of type Organization, Person, Location or Miscellaneous.\n")]
    #[case(Instruction::Four, "Analyze the given sentence and extract all word spans that refer to specific named entities of type Organization, Person, Location or Miscellaneous.\n")]
    #[case(Instruction::Five, "What named entities are mentioned in the given sentence? Only return named entities of type Organization, Person, Location or Miscellaneous.\n")]
    fn test_instruction_text(#[case] instruction: Instruction, #[case] task: &str) {
        assert_eq!(instruction.text(), format!("{}{}", task, ANSWER_INSTRUCTION))
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(Instruction::default(), &["EU", "rejects", "German", "call"]);
        let expected = "Given the list of entity types [\"Organization\", \"Person\", \"Location\", \"Miscellaneous\"], read the given sentence and find out all words/phrases that indicate the above types of named entities.\nAnswer in the format [\"entity_type\", \"entity_name\"] without any explanation. If no entity exists, then just answer \"[]\".\nSentence: EU rejects German call\nAnswer:";
        assert_eq!(prompt, expected)
    }

    #[rstest]
    #[case("1", Some(Instruction::One))]
    #[case("5", Some(Instruction::Five))]
    #[case(" 2 ", Some(Instruction::Two))]
    #[case("0", None)]
    #[case("6", None)]
    #[case("two", None)]
    fn test_instruction_from_str(#[case] s: &str, #[case] expected: Option<Instruction>) {
        assert_eq!(s.parse::<Instruction>().ok(), expected)
    }

    #[test]
    fn test_create_prompts() {
        let examples = vec![
            Conll03Example {
                id: String::from("0"),
                tokens: vec![String::from("SOCCER"), String::from("-")],
                ner_tags: Some(vec![0, 0]),
            },
            Conll03Example {
                id: String::from("1"),
                tokens: vec![],
                ner_tags: None,
            },
        ];
        let prompts: Vec<Example> = create_prompts(examples, Instruction::Five).collect();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].example.id, "0");
        assert!(prompts[0].prompt.ends_with("Sentence: SOCCER -\nAnswer:"));
        assert!(prompts[1].prompt.ends_with("Sentence: \nAnswer:"));
    }
}
