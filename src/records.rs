/*!
Line-delimited JSON records and the drivers processing whole files of them.

Each driver reads one record per line, processes records independently and writes them back in
the same order. A record that cannot be processed is never dropped silently: predictions fall back
to `O` tags and span examples with a fatal alignment are logged and counted.
*/
use crate::alignment::{as_strings, encode_span_labels, output_labels, AlignmentError};
use crate::config::TaggingConfig;
use crate::entity::Entity;
use crate::iob2::as_iob2_format;
use crate::labels::{Iob2Tag, LabelError, LabelVocabulary};
use crate::prompts::{create_prompts, Instruction};
use crate::response::{parse_response, ParseResponseError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_jsonlines::{json_lines, JsonLinesWriter};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::{error, info, warn};

/// A sentence of the CoNLL-2003 dataset. `ner_tags` are the codes of the gold IOB2 tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conll03Example {
    pub id: String,
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ner_tags: Option<Vec<u32>>,
}

/// An example and the prompt built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(flatten)]
    pub example: Conll03Example,
    pub prompt: String,
}

/// An example and the answer of the model. `response` is `null` when the model could not be
/// called. Any other field (e.g. `prompt`) is kept as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ner_tags: Option<Vec<u32>>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A prediction and the codes of the tags read from its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrediction {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub predicted_tags: Vec<u32>,
}

/// Reads the tags out of a model answer.
pub fn predict_tags<S: AsRef<str>>(
    tokens: &[S],
    response: Option<&str>,
) -> Result<Vec<Iob2Tag>, ParseResponseError> {
    let entities = parse_response(response)?;
    Ok(as_iob2_format(tokens, &entities))
}

/// Adds the predicted tags to a prediction. An answer that cannot be parsed gives `O` tags.
pub fn post_process(prediction: Prediction) -> ParsedPrediction {
    post_process_inner(prediction).0
}

/// Also tells whether the answer fell back to `O` tags.
fn post_process_inner(prediction: Prediction) -> (ParsedPrediction, bool) {
    let (tags, fallback) = match predict_tags(&prediction.tokens, prediction.response.as_deref())
    {
        Ok(tags) => (tags, false),
        Err(e) => {
            warn!(id = %prediction.id, error = %e, "falling back to O tags");
            (vec![Iob2Tag::Outside; prediction.tokens.len()], true)
        }
    };
    let parsed = ParsedPrediction {
        predicted_tags: tags.iter().map(Iob2Tag::code).collect(),
        prediction,
    };
    (parsed, fallback)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostprocessSummary {
    /// Number of records written
    pub records: usize,
    /// Number of records whose answer could not be parsed
    pub fallbacks: usize,
    /// Number of lines left out because they are not a valid prediction
    pub skipped: usize,
}

impl Display for PostprocessSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records, {} fell back to O tags, {} invalid lines skipped",
            self.records, self.fallbacks, self.skipped
        )
    }
}

fn create_writer<P: AsRef<Path>>(path: P) -> io::Result<JsonLinesWriter<BufWriter<File>>> {
    Ok(JsonLinesWriter::new(BufWriter::new(File::create(path)?)))
}

/// Post-processes every prediction of `input` into `output`. Lines that cannot be decoded into a
/// prediction are logged and skipped; failing to read or write the files is an error.
pub fn postprocess_file<P, Q>(input: P, output: Q) -> Result<PostprocessSummary, RecordsError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut writer = create_writer(output)?;
    let mut summary = PostprocessSummary::default();
    for (line, prediction) in json_lines::<Prediction, P>(input)?.enumerate() {
        let prediction = match prediction {
            Ok(prediction) => prediction,
            Err(e) if is_invalid_record(&e) => {
                warn!(record = line + 1, error = %e, "skipping an invalid line");
                summary.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let (parsed, fallback) = post_process_inner(prediction);
        writer.write(&parsed)?;
        summary.records += 1;
        summary.fallbacks += usize::from(fallback);
    }
    writer.flush()?;
    info!(%summary, "post-processing done");
    Ok(summary)
}

/// The line was read but does not hold a valid record.
fn is_invalid_record(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
    )
}

/// Writes the prompt of every example of `input` into `output`. Returns the number of prompts.
pub fn create_prompts_file<P, Q>(
    input: P,
    output: Q,
    instruction: Instruction,
) -> Result<usize, RecordsError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let examples = json_lines::<Conll03Example, P>(input)?.collect::<io::Result<Vec<_>>>()?;
    let mut writer = create_writer(output)?;
    let mut count = 0;
    for example in create_prompts(examples, instruction) {
        writer.write(&example)?;
        count += 1;
    }
    writer.flush()?;
    info!(count, %instruction, "prompts written");
    Ok(count)
}

/// Decodes the gold and predicted tags of a post-processed file.
pub fn load_labels<P: AsRef<Path>>(
    path: P,
) -> Result<(Vec<Vec<String>>, Vec<Vec<String>>), RecordsError> {
    let vocabulary = LabelVocabulary::conll();
    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    for prediction in json_lines::<ParsedPrediction, P>(path)? {
        let prediction = prediction?;
        let gold = prediction.prediction.ner_tags.as_ref().ok_or_else(|| {
            RecordsError::MissingGold {
                id: prediction.prediction.id.clone(),
            }
        })?;
        y_true.push(to_owned(vocabulary.decode(gold)?));
        y_pred.push(to_owned(vocabulary.decode(&prediction.predicted_tags)?));
    }
    Ok((y_true, y_pred))
}

fn to_owned(labels: Vec<&str>) -> Vec<String> {
    labels.into_iter().map(String::from).collect()
}

/// A text annotated with character-span entities, and its subword tokens (boundary tokens
/// included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanExample {
    pub curid: String,
    pub text: String,
    pub entities: Vec<Entity<'static>>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSpanExample {
    #[serde(flatten)]
    pub example: SpanExample,
    pub labels: Vec<String>,
    pub label_ids: Vec<i64>,
}

/// Gold and predicted entities of a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanResult<'a> {
    pub text: Cow<'a, str>,
    pub entities: Vec<Entity<'a>>,
    pub pred_entities: Vec<Entity<'a>>,
}

/// Vocabulary of every entity type annotated in the examples.
pub fn create_label_vocabulary(examples: &[SpanExample]) -> LabelVocabulary {
    LabelVocabulary::from_entity_types(
        examples
            .iter()
            .flat_map(|e| e.entities.iter().map(|entity| &*entity.entity_type)),
    )
}

/// Labels the tokens of an example.
pub fn label_span_example(
    example: SpanExample,
    vocabulary: &LabelVocabulary,
    config: &TaggingConfig,
) -> Result<LabeledSpanExample, AlignmentError> {
    let (labels, label_ids) = {
        let labels = output_labels(&example.text, &example.tokens, &example.entities, config)?;
        (
            as_strings(&labels),
            encode_span_labels(&labels, vocabulary, config),
        )
    };
    Ok(LabeledSpanExample {
        example,
        labels,
        label_ids,
    })
}

pub fn read_span_examples<P: AsRef<Path>>(path: P) -> Result<Vec<SpanExample>, RecordsError> {
    Ok(json_lines::<SpanExample, P>(path)?.collect::<io::Result<Vec<_>>>()?)
}

pub fn read_span_results<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<SpanResult<'static>>, RecordsError> {
    Ok(json_lines::<SpanResult<'static>, P>(path)?.collect::<io::Result<Vec<_>>>()?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanLabelSummary {
    /// Number of records written
    pub records: usize,
    /// Number of examples left out because their tokens could not be aligned
    pub skipped: usize,
    pub vocabulary: LabelVocabulary,
}

/// Labels every example of `input` into `output`. The label vocabulary is built from all the
/// entity types of `input`.
pub fn label_span_file<P, Q>(
    input: P,
    output: Q,
    config: &TaggingConfig,
) -> Result<SpanLabelSummary, RecordsError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let examples = read_span_examples(input)?;
    let vocabulary = create_label_vocabulary(&examples);
    let mut writer = create_writer(output)?;
    let (mut records, mut skipped) = (0, 0);
    for example in examples {
        let curid = example.curid.clone();
        match label_span_example(example, &vocabulary, config) {
            Ok(labeled) => {
                writer.write(&labeled)?;
                records += 1;
            }
            Err(e) => {
                error!(%curid, error = %e, "skipping the example");
                skipped += 1;
            }
        }
    }
    writer.flush()?;
    info!(records, skipped, labels = vocabulary.len(), "span labelling done");
    Ok(SpanLabelSummary {
        records,
        skipped,
        vocabulary,
    })
}

#[derive(Debug)]
pub enum RecordsError {
    /// Reading or writing a file failed, or a line is not a valid record.
    Io(io::Error),
    Label(LabelError),
    /// The record has no gold tags to evaluate against.
    MissingGold { id: String },
}

impl Display for RecordsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Could not read or write the records: {}", e),
            Self::Label(e) => write!(f, "{}", e),
            Self::MissingGold { id } => write!(f, "The record {} has no `ner_tags`", id),
        }
    }
}

impl Error for RecordsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Label(e) => Some(e),
            Self::MissingGold { .. } => None,
        }
    }
}

impl From<io::Error> for RecordsError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<LabelError> for RecordsError {
    fn from(value: LabelError) -> Self {
        Self::Label(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn prediction(tokens: &[&str], response: Option<&str>) -> Prediction {
        Prediction {
            id: String::from("0"),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ner_tags: None,
            response: response.map(String::from),
            extra: Map::new(),
        }
    }

    #[rstest]
    #[case(vec!["SOCCER", "-", "JAPAN", "GET"], Some(r#"["Location", "JAPAN"]"#), vec![0, 0, 5, 0])]
    #[case(vec!["Nadim", "Ladki"], Some(r#"["Person", "Nadim Ladki"]"#), vec![1, 2])]
    #[case(vec!["JAPAN", "WIN"], None, vec![0, 0])]
    #[case(vec!["JAPAN", "WIN"], Some(r#"["Location", "JAPAN"] (and more)"#), vec![0, 0])]
    #[case(vec!["EU", "rejects"], Some(r#"[Organization, "EU"]"#), vec![3, 0])]
    #[case(vec!["1996-12-06"], Some(r#"["Miscellaneous", "1996-12-06"]"#), vec![7])]
    fn test_post_process(
        #[case] tokens: Vec<&str>,
        #[case] response: Option<&str>,
        #[case] expected: Vec<u32>,
    ) {
        let parsed = post_process(prediction(&tokens, response));
        assert_eq!(parsed.predicted_tags, expected);
        assert_eq!(parsed.prediction, prediction(&tokens, response));
    }

    #[test]
    fn test_prediction_keeps_other_fields() {
        let line = r#"{"id": "3", "tokens": ["JAPAN"], "ner_tags": [5], "prompt": "Sentence: JAPAN", "response": "[\"Location\", \"JAPAN\"]"}"#;
        let prediction: Prediction = serde_json::from_str(line).unwrap();
        assert_eq!(
            prediction.extra.get("prompt"),
            Some(&Value::from("Sentence: JAPAN"))
        );
        let parsed = post_process(prediction);
        let value = serde_json::to_value(&parsed).unwrap();
        let expected: Value = serde_json::from_str(
            r#"{"id": "3", "tokens": ["JAPAN"], "ner_tags": [5], "prompt": "Sentence: JAPAN", "response": "[\"Location\", \"JAPAN\"]", "predicted_tags": [5]}"#,
        )
        .unwrap();
        assert_eq!(value, expected);
        let back: ParsedPrediction = serde_json::from_value(value).unwrap();
        assert_eq!(back, parsed);
    }

    #[test]
    fn test_null_response() {
        let prediction: Prediction =
            serde_json::from_str(r#"{"id": "1", "tokens": ["a", "b"], "response": null}"#).unwrap();
        assert_eq!(prediction.response, None);
        assert_eq!(post_process(prediction).predicted_tags, vec![0, 0]);
    }

    #[test]
    fn test_create_label_vocabulary() {
        let examples = vec![
            SpanExample {
                curid: String::from("1"),
                text: String::from("大谷翔平は"),
                entities: vec![Entity::new("大谷翔平", 0, 4, "人名")],
                tokens: vec![],
            },
            SpanExample {
                curid: String::from("2"),
                text: String::from("岩手県"),
                entities: vec![Entity::new("岩手県", 0, 3, "地名")],
                tokens: vec![],
            },
        ];
        let vocabulary = create_label_vocabulary(&examples);
        let labels: Vec<&str> = vocabulary.iter().map(|(_, l)| l).collect();
        assert_eq!(labels, vec!["O", "B-人名", "I-人名", "B-地名", "I-地名"]);
    }

    #[test]
    fn test_label_span_example() {
        let example = SpanExample {
            curid: String::from("1"),
            text: String::from("大谷翔平は岩手県水沢市出身"),
            entities: vec![
                Entity::new("大谷翔平", 0, 4, "人名"),
                Entity::new("岩手県水沢市", 5, 11, "地名"),
            ],
            tokens: ["[CLS]", "大谷", "翔", "##平", "は", "岩手", "県", "水沢", "市", "出身", "[SEP]"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        };
        let vocabulary = create_label_vocabulary(std::slice::from_ref(&example));
        let labeled = label_span_example(example, &vocabulary, &TaggingConfig::default()).unwrap();
        assert_eq!(labeled.label_ids, vec![-100, 1, 2, 2, 0, 3, 4, 4, 4, 0, -100]);
        assert_eq!(labeled.labels[1], "B-人名");
    }
}
