/*!
This library converts named entities into IOB2 tag sequences. The entities come from two places:
* the free-text answers of a text-generation model asked to list the entities of a tokenized
    sentence (e.g. `[["Location", "JAPAN"]]`). The answers are parsed leniently and the entities
    are matched against the tokens of the sentence.
* character spans annotated on a raw text (e.g. `{"name": "大谷翔平", "span": [0, 4], "type":
    "人名"}`). The spans are aligned onto the subword tokens of a tokenizer.

# Terminology
* An entity type is one of `Person`, `Organization`, `Location` and `Miscellaneous` when reading
    model answers, abbreviated as `PER`, `ORG`, `LOC` and `MISC` in the tags. Span annotations can
    use any type name.
* A tag is an entity type and a prefix. `B` marks the first token of an entity, `I` the following
    ones and `O` a token outside any entity.
* A label vocabulary maps the tags onto integer ids. The CoNLL-2003 vocabulary is fixed, other
    vocabularies are derived from the entity types of a dataset.
* A chunk is a list of at least one tag associated with a named entity, such as `["B-PER",
    "I-PER"]`. Predicted chunks are scored against gold chunks with the `metrics` functions.

# Failures
An answer that cannot be parsed is an error of [`parse_response`]; the record drivers fall back to
a sequence of `O` tags of the right length. Tokens that do not spell the text they were produced
from are an [`AlignmentError`]. Characters hidden behind an unknown token cannot be aligned and the
entities starting or ending on them are silently left out.
*/

mod alignment;
mod config;
mod entity;
mod iob2;
mod labels;
mod metrics;
mod prompts;
mod records;
mod reporter;
mod response;
mod transitions;

// The public api starts here
pub use labels::{EntityType, Iob2Tag, LabelError, LabelVocabulary};

pub use entity::{get_entities, Chunk, Entity, InvalidSpan, ParsingError, RecognizedEntity};

pub use response::{parse_response, ParseResponseError, ParseResponseErrorKind};

pub use iob2::{as_iob2_format, get_index, is_in_tokens};

pub use alignment::{
    convert_results_to_labels, create_character_labels, encode_span_labels,
    get_char_to_token_alignments, output_labels, AlignmentError, SpanLabel,
};

pub use transitions::{create_transitions, Transitions, FORBIDDEN};

pub use prompts::{build_prompt, create_prompts, Instruction, UnknownInstruction};

pub use records::{
    create_label_vocabulary, create_prompts_file, label_span_example, label_span_file,
    load_labels, post_process, postprocess_file, predict_tags, read_span_examples,
    read_span_results, Conll03Example, Example, LabeledSpanExample, ParsedPrediction,
    PostprocessSummary, Prediction, RecordsError, SpanExample, SpanLabelSummary, SpanResult,
};

pub use metrics::{
    classification_report, evaluate, precision_recall_fscore_support, ComputationError,
    DivByZeroStrat, PrecisionRecallFScoreTrueSum, Scores,
};

pub use reporter::{Average, ClassMetrics, OverallAverage, Reporter};

pub use config::{
    TaggingConfig, TaggingConfigBuilder, DEFAULT_CONTINUATION_PREFIX, DEFAULT_IGNORE_INDEX,
    DEFAULT_UNKNOWN_TOKEN,
};

use std::path::Path;

/// Scores the predicted tags of a post-processed prediction file against its gold tags and
/// returns the report of every entity type with the micro-averaged scores.
///
/// * `path`: JSON-lines file of records holding `ner_tags` and `predicted_tags`.
/// * `zero_division`: What to do in case of division by zero.
pub fn evaluate_predictions_file<P: AsRef<Path>>(
    path: P,
    zero_division: DivByZeroStrat,
) -> Result<(Reporter, Scores), EvaluationError> {
    let (y_true, y_pred) = load_labels(path)?;
    let reporter = classification_report(&y_true, &y_pred, zero_division)?;
    let scores = evaluate(&y_true, &y_pred)?;
    Ok((reporter, scores))
}

/// Same as [`evaluate_predictions_file`], for a JSON-lines file of character span results
/// (`{"text", "entities", "pred_entities"}`). The entities are compared character by character.
pub fn evaluate_span_results_file<P: AsRef<Path>>(
    path: P,
    zero_division: DivByZeroStrat,
) -> Result<(Reporter, Scores), EvaluationError> {
    let results = read_span_results(path)?;
    let (y_true, y_pred) = convert_results_to_labels(&results)?;
    let reporter = classification_report(&y_true, &y_pred, zero_division)?;
    let scores = evaluate(&y_true, &y_pred)?;
    Ok((reporter, scores))
}

/// Errors of the evaluation of a file.
#[derive(Debug)]
pub enum EvaluationError {
    Records(RecordsError),
    Alignment(AlignmentError),
    Computation(ComputationError),
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Records(e) => e.fmt(f),
            Self::Alignment(e) => e.fmt(f),
            Self::Computation(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Records(e) => Some(e),
            Self::Alignment(e) => Some(e),
            Self::Computation(e) => Some(e),
        }
    }
}

impl From<RecordsError> for EvaluationError {
    fn from(value: RecordsError) -> Self {
        Self::Records(value)
    }
}

impl From<AlignmentError> for EvaluationError {
    fn from(value: AlignmentError) -> Self {
        Self::Alignment(value)
    }
}

impl From<ComputationError> for EvaluationError {
    fn from(value: ComputationError) -> Self {
        Self::Computation(value)
    }
}
