/**
This modules gives a few tools to prettyprint the scores of every entity type and the overall
scores.
*/
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

/// The reporter holds the metrics of every entity type and the overall metrics. It can be used to
/// display the results as if they were collected into a dataframe and can be consumed to obtain a
/// `HashSet` containing the metrics. The reporter is built with the `classification_report`
/// function.
///
/// # Example
///
/// ```rust
/// use iobtag::{classification_report, DivByZeroStrat};
///
/// let y_true = vec![vec!["B-TEST", "B-NOTEST", "O", "B-TEST"]];
/// let y_pred = vec![vec!["O", "B-NOTEST", "B-OTHER", "B-TEST"]];
///
/// let reporter = classification_report(&y_true, &y_pred, DivByZeroStrat::ReplaceBy0).unwrap();
/// let report = reporter.to_string();
/// let mut lines = report.lines();
/// assert_eq!(lines.next(), Some("Class, Precision, Recall, Fscore, Support"));
/// assert_eq!(lines.next().map(|l| l.starts_with("Overall_Weighted")), Some(true));
/// assert_eq!(lines.nth(2), Some("NOTEST, 1, 1, 1, 1"));
/// assert_eq!(lines.next(), Some("OTHER, 0, 0, 0, 0"));
/// assert_eq!(lines.next(), Some("TEST, 1, 0.5, 0.6666667, 2"));
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Reporter {
    pub(crate) classes: BTreeSet<ClassMetricsInner>,
}

/// By converting the reporter into a `HashSet` of `ClassMetrics`, you lose the ordering used to
/// prettyprint it.
impl From<Reporter> for HashSet<ClassMetrics> {
    fn from(value: Reporter) -> Self {
        value.classes.into_iter().map(ClassMetrics::from).collect()
    }
}

impl Reporter {
    pub(crate) fn insert(&mut self, metrics: ClassMetricsInner) -> bool {
        self.classes.insert(metrics)
    }

    /// The metrics of a single entity type, or of an overall average (e.g. `"Overall_Micro"`).
    pub fn get(&self, class: &str) -> Option<ClassMetrics> {
        self.classes
            .iter()
            .find(|m| m.class == class)
            .cloned()
            .map(ClassMetrics::from)
    }
}

/// The Reporter struct acts as a dataframe when displayed: the overall rows come first, followed
/// by the entity types in alphabetical order.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Class, Precision, Recall, Fscore, Support")?;
        for v in self.classes.iter().rev().filter(|m| m.average != Average::None) {
            writeln!(f, "{}", v)?
        }
        for v in self.classes.iter().filter(|m| m.average == Average::None) {
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
/// Datastructure holding metrics about a given class.
pub struct ClassMetrics {
    /// The class, such as "PER", "LOC", "Overall_Micro", etc.
    pub class: String,
    /// The average used to compute this class' metrics
    pub average: Average,
    pub precision: f32,
    pub recall: f32,
    pub fscore: f32,
    pub support: usize,
}

impl Hash for ClassMetrics {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class.hash(state);
        self.average.hash(state)
    }
}

impl PartialEq for ClassMetrics {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetrics {}

impl From<ClassMetricsInner> for ClassMetrics {
    fn from(value: ClassMetricsInner) -> Self {
        Self {
            class: value.class,
            average: value.average,
            precision: value.precision,
            recall: value.recall,
            fscore: value.fscore,
            support: value.support,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// ClassMetricsInner hold the metrics for a single class. They implement a special version of the
/// `Display` trait, allowing them to be treated as the line of a dataframe, and are ordered by
/// average first and class second.
pub(crate) struct ClassMetricsInner {
    pub(crate) class: String,
    pub(crate) average: Average,
    pub(crate) precision: f32,
    pub(crate) recall: f32,
    pub(crate) fscore: f32,
    pub(crate) support: usize,
}

impl PartialEq for ClassMetricsInner {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetricsInner {}

impl PartialOrd for ClassMetricsInner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassMetricsInner {
    fn cmp(&self, other: &Self) -> Ordering {
        self.average
            .cmp(&other.average)
            .then_with(|| self.class.cmp(&other.class))
    }
}

impl ClassMetricsInner {
    pub(crate) fn new_overall(
        average: OverallAverage,
        precision: f32,
        recall: f32,
        fscore: f32,
        support: usize,
    ) -> Self {
        ClassMetricsInner {
            class: average.to_string(),
            average: average.into(),
            precision,
            recall,
            fscore,
            support,
        }
    }
}

impl Display for ClassMetricsInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.class, self.precision, self.recall, self.fscore, self.support
        )
    }
}

/// Enumeration of the different types of averaging supported by this crate. &str can be parsed
/// to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}

impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Average {
    type Err = AverageParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(AverageParsingError(String::from(s))),
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone)]
pub struct AverageParsingError(String);

impl Display for AverageParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Impossible to parse the string ({}) into an Average",
            self.0
        )
    }
}

impl Error for AverageParsingError {}

/// The rows of a single class (`Average::None`) are ordered before the overall rows. The overall
/// rows are equal to one another, leaving their order to the class name.
impl PartialOrd for Average {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Average {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::None, Self::None) => Ordering::Equal,
            (Self::None, _) => Ordering::Less,
            (_, Self::None) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Sequence)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl Display for OverallAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str_content = match self {
            Self::Micro => "Overall_Micro",
            Self::Macro => "Overall_Macro",
            Self::Weighted => "Overall_Weighted",
        };
        write!(f, "{}", str_content)
    }
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(class: &str, average: Average, support: usize) -> ClassMetricsInner {
        ClassMetricsInner {
            class: String::from(class),
            average,
            precision: 1.0,
            recall: 1.0,
            fscore: 1.0,
            support,
        }
    }

    #[test]
    fn test_reporter_display_order() {
        let mut reporter = Reporter::default();
        reporter.insert(row("PER", Average::None, 1));
        reporter.insert(row("LOC", Average::None, 2));
        for avg in enum_iterator::all::<OverallAverage>() {
            reporter.insert(ClassMetricsInner::new_overall(avg, 1.0, 1.0, 1.0, 3));
        }
        let expected = "Class, Precision, Recall, Fscore, Support
Overall_Weighted, 1, 1, 1, 3
Overall_Micro, 1, 1, 1, 3
Overall_Macro, 1, 1, 1, 3
LOC, 1, 1, 1, 2
PER, 1, 1, 1, 1
";
        assert_eq!(reporter.to_string(), expected);
    }

    #[test]
    fn test_reporter_into_hashset() {
        let mut reporter = Reporter::default();
        reporter.insert(row("PER", Average::None, 1));
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Micro,
            1.0,
            1.0,
            1.0,
            1,
        ));
        assert_eq!(reporter.get("PER").map(|m| m.support), Some(1));
        assert!(reporter.get("MISC").is_none());
        let set: HashSet<ClassMetrics> = reporter.into();
        assert_eq!(set.len(), 2);
    }

    #[rstest]
    #[case("micro", Ok(Average::Micro))]
    #[case("Weighted", Ok(Average::Weighted))]
    #[case("samples", Err(AverageParsingError(String::from("samples"))))]
    fn test_average_from_str(
        #[case] s: &str,
        #[case] expected: Result<Average, AverageParsingError>,
    ) {
        assert_eq!(s.parse::<Average>(), expected)
    }
}
