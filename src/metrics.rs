/*!
Entity-level scores of predicted tag sequences against gold tag sequences. The entities are the
chunks found by [`crate::get_entities`] and an entity is correctly predicted when its type and its
boundaries both match a gold entity, as SeqEval does in its default mode.
*/
use crate::entity::{get_entities, Chunk, ParsingError};
use crate::reporter::{Average, ClassMetricsInner, OverallAverage, Reporter};
use ahash::{AHashMap, AHashSet};
use enum_iterator::all;
use itertools::multizip;
use ndarray::prelude::*;
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Enum to specify how to handle a division by zero, e.g. the precision of a type that was never
/// predicted.
#[derive(Debug, PartialEq, Hash, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub enum DivByZeroStrat {
    /// The result of the division is 0.
    #[default]
    ReplaceBy0,
    /// Fail with a `DivisionByZero` error.
    ReturnError,
}

#[derive(Debug)]
pub struct ParsingDivisionByZeroStrategyError(String);

impl Display for ParsingDivisionByZeroStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse the {} into a `DivisionByZeroStrategy`",
            self.0
        )
    }
}
impl Error for ParsingDivisionByZeroStrategyError {}

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivisionByZeroStrategyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby0" | "replacebyzero" | "zero" => Ok(DivByZeroStrat::ReplaceBy0),
            "returnerror" | "error" => Ok(DivByZeroStrat::ReturnError),
            _ => Err(ParsingDivisionByZeroStrategyError(String::from(s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivisionByZeroError;

impl Display for DivisionByZeroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered division by zero")
    }
}

impl Error for DivisionByZeroError {}

/// Element-wise division. The elements whose denominator is zero are handled by `zero_division`.
fn prf_divide(
    numerator: &Array1<f32>,
    denominator: &Array1<f32>,
    zero_division: DivByZeroStrat,
) -> Result<Array1<f32>, DivisionByZeroError> {
    let zero_mask = denominator.mapv(|d| if d == 0.0 { 0.0 } else { 1.0 });
    if zero_division == DivByZeroStrat::ReturnError && zero_mask.iter().any(|m| *m == 0.0) {
        return Err(DivisionByZeroError);
    }
    let denominator_non_zero = replace(denominator.clone(), 0.0, 1.0);
    Ok(numerator / denominator_non_zero * zero_mask)
}

/// Helper function to replace values from an array.
fn replace(mut array: Array1<f32>, replaced: f32, new_value: f32) -> Array1<f32> {
    array.mapv_inplace(|v| if v == replaced { new_value } else { v });
    array
}

#[derive(Debug, PartialEq, Clone, Copy)]
/// Error type to represent when two lists are not of the same length (when they should be).
pub struct InconsistentLengthError(usize, usize);

impl Display for InconsistentLengthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent length between two lists. `y_true` is length {}, `y_pred` is length {}",
            self.0, self.1
        )
    }
}
impl Error for InconsistentLengthError {}

fn check_for_empty_slices<T>(y_true: &[T], y_pred: &[T]) -> Result<(), ComputationError> {
    if y_true.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_true")));
    };
    if y_pred.is_empty() {
        return Err(ComputationError::EmptyInput(String::from("y_pred")));
    };
    Ok(())
}

/// Both lists must hold the same number of sequences, and the sequences must be pairwise of the
/// same length.
fn check_consistent_length<T>(
    y_true: &[Vec<T>],
    y_pred: &[Vec<T>],
) -> Result<(), InconsistentLengthError> {
    if y_true.len() != y_pred.len() {
        return Err(InconsistentLengthError(y_true.len(), y_pred.len()));
    }
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        if t.len() != p.len() {
            return Err(InconsistentLengthError(t.len(), p.len()));
        }
    }
    Ok(())
}

/// Number of predicted, correctly predicted and gold entities of every type. The types are sorted
/// and shared by the three arrays.
#[derive(Debug, Clone, PartialEq)]
struct EntityCounts {
    target_names: Vec<String>,
    pred_sum: Array1<usize>,
    tp_sum: Array1<usize>,
    true_sum: Array1<usize>,
}

/// Chunks grouped by type. A chunk is identified by its sequence and its boundaries.
fn group_by_type<'a>(
    chunks: &'a [Vec<Chunk<'a>>],
) -> AHashMap<&'a str, AHashSet<(usize, usize, usize)>> {
    let mut map: AHashMap<&str, AHashSet<(usize, usize, usize)>> = AHashMap::new();
    for (i, sequence) in chunks.iter().enumerate() {
        for chunk in sequence {
            map.entry(chunk.tag.as_ref())
                .or_default()
                .insert((i, chunk.start, chunk.end));
        }
    }
    map
}

fn extract_tp_actual_correct<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
) -> Result<EntityCounts, ComputationError> {
    let chunks_true = get_entities(y_true)?;
    let chunks_pred = get_entities(y_pred)?;
    let entities_true = group_by_type(&chunks_true);
    let entities_pred = group_by_type(&chunks_pred);
    let target_names: BTreeSet<&str> = entities_true
        .keys()
        .chain(entities_pred.keys())
        .copied()
        .collect();
    let n = target_names.len();
    let mut tp_sum = Array1::zeros(n);
    let mut pred_sum = Array1::zeros(n);
    let mut true_sum = Array1::zeros(n);
    let empty = AHashSet::new();
    for (i, type_name) in target_names.iter().enumerate() {
        let entities_true_type = entities_true.get(type_name).unwrap_or(&empty);
        let entities_pred_type = entities_pred.get(type_name).unwrap_or(&empty);
        tp_sum[i] = entities_true_type
            .intersection(entities_pred_type)
            .count();
        pred_sum[i] = entities_pred_type.len();
        true_sum[i] = entities_true_type.len();
    }
    Ok(EntityCounts {
        target_names: target_names.into_iter().map(String::from).collect(),
        pred_sum,
        tp_sum,
        true_sum,
    })
}

/// Precision, recall, fscore and support (true sum).
pub type PrecisionRecallFScoreTrueSum = (Array1<f32>, Array1<f32>, Array1<f32>, Array1<usize>);

fn scores_from_counts(
    counts: &EntityCounts,
    average: Average,
    zero_division: DivByZeroStrat,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    let (tp_sum, pred_sum, true_sum) = if average == Average::Micro {
        (
            array![counts.tp_sum.sum()],
            array![counts.pred_sum.sum()],
            array![counts.true_sum.sum()],
        )
    } else {
        (
            counts.tp_sum.clone(),
            counts.pred_sum.clone(),
            counts.true_sum.clone(),
        )
    };
    let tp_sum_f = tp_sum.mapv(|x| x as f32);
    let precision = prf_divide(&tp_sum_f, &pred_sum.mapv(|x| x as f32), zero_division)?;
    let recall = prf_divide(&tp_sum_f, &true_sum.mapv(|x| x as f32), zero_division)?;
    let denom = replace(&precision + &recall, 0.0, 1.0);
    let f_score = Zip::from(&precision)
        .and(&recall)
        .and(&denom)
        .map_collect(|p, r, d| 2.0 * p * r / d);

    match average {
        Average::None | Average::Micro => Ok((precision, recall, f_score, true_sum)),
        Average::Macro => {
            let support = array![true_sum.sum()];
            if precision.is_empty() {
                return empty_average(zero_division, support);
            }
            Ok((
                array![mean(&precision)],
                array![mean(&recall)],
                array![mean(&f_score)],
                support,
            ))
        }
        Average::Weighted => {
            let support = array![true_sum.sum()];
            if true_sum.sum() == 0 {
                return empty_average(zero_division, support);
            }
            let weights = true_sum.mapv(|x| x as f32);
            Ok((
                array![weighted_mean(&precision, &weights)],
                array![weighted_mean(&recall, &weights)],
                array![weighted_mean(&f_score, &weights)],
                support,
            ))
        }
    }
}

fn mean(values: &Array1<f32>) -> f32 {
    values.sum() / values.len() as f32
}

fn weighted_mean(values: &Array1<f32>, weights: &Array1<f32>) -> f32 {
    (values * weights).sum() / weights.sum()
}

/// An average over no entity at all.
fn empty_average(
    zero_division: DivByZeroStrat,
    support: Array1<usize>,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    match zero_division {
        DivByZeroStrat::ReturnError => Err(ComputationError::DivisionByZero(DivisionByZeroError)),
        DivByZeroStrat::ReplaceBy0 => Ok((array![0.], array![0.], array![0.], support)),
    }
}

/// Computes the precision, recall, F1 score and support of the entities of the predicted tag
/// sequences. With `Average::None`, one value per entity type is returned (types in sorted order),
/// otherwise a single averaged value.
///
/// ```rust
/// use iobtag::{precision_recall_fscore_support, Average, DivByZeroStrat};
///
/// let y_true = vec![vec!["B-PER", "I-PER", "O", "B-LOC"]];
/// let y_pred = vec![vec!["B-PER", "I-PER", "O", "O"]];
/// let (precision, recall, f1, support) =
///     precision_recall_fscore_support(&y_true, &y_pred, Average::Micro, DivByZeroStrat::ReplaceBy0)
///         .unwrap();
/// assert_eq!(precision[0], 1.0);
/// assert_eq!(recall[0], 0.5);
/// assert_eq!(support[0], 2);
/// ```
pub fn precision_recall_fscore_support<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    average: Average,
    zero_division: DivByZeroStrat,
) -> Result<PrecisionRecallFScoreTrueSum, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let counts = extract_tp_actual_correct(y_true, y_pred)?;
    scores_from_counts(&counts, average, zero_division)
}

/// Builds the report of every entity type and of the three overall averages.
pub fn classification_report<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
    zero_division: DivByZeroStrat,
) -> Result<Reporter, ComputationError> {
    check_for_empty_slices(y_true, y_pred)?;
    check_consistent_length(y_true, y_pred)?;
    let counts = extract_tp_actual_correct(y_true, y_pred)?;
    let (p, r, f1, s) = scores_from_counts(&counts, Average::None, zero_division)?;
    let mut reporter = Reporter::default();
    for (name, precision, recall, fscore, support) in multizip((
        counts.target_names.iter(),
        p.into_iter(),
        r.into_iter(),
        f1.into_iter(),
        s.into_iter(),
    )) {
        reporter.insert(ClassMetricsInner {
            class: name.clone(),
            average: Average::None,
            precision,
            recall,
            fscore,
            support,
        });
    }
    for avg in all::<OverallAverage>() {
        let (p, r, f1, s) = scores_from_counts(&counts, avg.into(), zero_division)?;
        reporter.insert(ClassMetricsInner::new_overall(avg, p[0], r[0], f1[0], s[0]));
    }
    Ok(reporter)
}

/// Micro-averaged entity scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f32,
    pub recall: f32,
    pub f1_score: f32,
}

impl Display for Scores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "precision: {}, recall: {}, f1: {}",
            self.precision, self.recall, self.f1_score
        )
    }
}

/// Micro-averaged precision, recall and F1 score of the predicted entities.
///
/// ```rust
/// use iobtag::evaluate;
///
/// let y_true = vec![vec!["B-LOC", "O"], vec!["B-PER", "I-PER"]];
/// let y_pred = vec![vec!["B-LOC", "O"], vec!["B-PER", "O"]];
/// let scores = evaluate(&y_true, &y_pred).unwrap();
/// assert_eq!(scores.precision, 0.5);
/// assert_eq!(scores.recall, 0.5);
/// ```
pub fn evaluate<S: AsRef<str>>(
    y_true: &[Vec<S>],
    y_pred: &[Vec<S>],
) -> Result<Scores, ComputationError> {
    let (precision, recall, f1_score, _) = precision_recall_fscore_support(
        y_true,
        y_pred,
        Average::Micro,
        DivByZeroStrat::ReplaceBy0,
    )?;
    Ok(Scores {
        precision: precision[0],
        recall: recall[0],
        f1_score: f1_score[0],
    })
}

#[derive(Debug, Clone, PartialEq)]
/// Errors that can happen while scoring tag sequences.
pub enum ComputationError {
    /// The two lists (or two of their sequences) differ in length.
    InconsistentLength(InconsistentLengthError),
    /// A tag could not be parsed.
    Parsing(ParsingError),
    DivisionByZero(DivisionByZeroError),
    /// One of the inputs is empty. Holds the name of the input.
    EmptyInput(String),
}

impl Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InconsistentLength(e) => e.fmt(f),
            Self::Parsing(e) => e.fmt(f),
            Self::DivisionByZero(e) => e.fmt(f),
            Self::EmptyInput(s) => write!(f, "The input {} is empty", s),
        }
    }
}

impl Error for ComputationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InconsistentLength(e) => Some(e),
            Self::Parsing(e) => Some(e),
            Self::DivisionByZero(e) => Some(e),
            Self::EmptyInput(_) => None,
        }
    }
}

impl From<InconsistentLengthError> for ComputationError {
    fn from(value: InconsistentLengthError) -> Self {
        Self::InconsistentLength(value)
    }
}

impl From<ParsingError> for ComputationError {
    fn from(value: ParsingError) -> Self {
        Self::Parsing(value)
    }
}

impl From<DivisionByZeroError> for ComputationError {
    fn from(value: DivisionByZeroError) -> Self {
        Self::DivisionByZero(value)
    }
}
