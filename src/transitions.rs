/*!
Transition constraints of a linear-chain CRF tagging with IOB2 labels. A score of `0` allows a
transition and a score of [`FORBIDDEN`] rules it out: a sequence can start with `O` or `B-t`, `I-t`
can only follow `B-t` or `I-t`, and a sequence can end on any label.
*/
use crate::labels::LabelVocabulary;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Score of a forbidden transition.
pub const FORBIDDEN: f32 = -100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transitions {
    /// Score of starting a sequence on each label.
    pub start: Array1<f32>,
    /// `between[[i, j]]` is the score of the label `j` following the label `i`.
    pub between: Array2<f32>,
    /// Score of ending a sequence on each label.
    pub end: Array1<f32>,
}

/// Builds the transition constraints of every label of the vocabulary. Labels are indexed by id.
///
/// ```rust
/// use iobtag::{create_transitions, LabelVocabulary};
///
/// let vocabulary = LabelVocabulary::from_entity_types(["人名", "組織名"]);
/// let transitions = create_transitions(&vocabulary);
/// assert_eq!(transitions.start.to_vec(), vec![0f32, 0., -100., 0., -100.]);
/// assert_eq!(transitions.between.row(1).to_vec(), vec![0f32, 0., 0., 0., -100.]);
/// ```
pub fn create_transitions(vocabulary: &LabelVocabulary) -> Transitions {
    let n = vocabulary.len();
    let mut start = Array1::from_elem(n, FORBIDDEN);
    let mut between = Array2::from_elem((n, n), FORBIDDEN);
    let end = Array1::zeros(n);

    for (id, label) in vocabulary.iter() {
        let to = id as usize;
        match label.split_once('-') {
            Some(("I", entity_type)) => {
                // Only from the same type
                for (from, from_label) in vocabulary.iter() {
                    if let Some(("B" | "I", from_type)) = from_label.split_once('-') {
                        if from_type == entity_type {
                            between[[from as usize, to]] = 0.;
                        }
                    }
                }
            }
            // `O`, `B-*` and any other label can start a sequence and follow anything
            _ => {
                start[to] = 0.;
                between.column_mut(to).fill(0.);
            }
        }
    }
    Transitions {
        start,
        between,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_create_transitions() {
        let vocabulary = LabelVocabulary::from_entity_types(["人名", "組織名"]);
        let transitions = create_transitions(&vocabulary);
        assert_eq!(transitions.start, array![0f32, 0., -100., 0., -100.]);
        assert_eq!(transitions.end, Array1::<f32>::zeros(5));
        let expected = array![
            [0f32, 0., -100., 0., -100.],
            [0., 0., 0., 0., -100.],
            [0., 0., 0., 0., -100.],
            [0., 0., -100., 0., 0.],
            [0., 0., -100., 0., 0.]
        ];
        assert_eq!(transitions.between, expected);
    }

    #[test]
    fn test_conll_transitions() {
        let vocabulary = LabelVocabulary::conll();
        let transitions = create_transitions(vocabulary);
        assert_eq!(transitions.between.dim(), (9, 9));
        // O -> I-PER
        assert_eq!(transitions.between[[0, 2]], FORBIDDEN);
        // B-PER -> I-PER
        assert_eq!(transitions.between[[1, 2]], 0.);
        // I-LOC -> I-MISC
        assert_eq!(transitions.between[[6, 8]], FORBIDDEN);
        // I-MISC -> B-ORG
        assert_eq!(transitions.between[[8, 3]], 0.);
        let allowed_starts = transitions.start.iter().filter(|s| **s == 0.).count();
        assert_eq!(allowed_starts, 5);
    }

    #[test]
    fn test_only_outside() {
        let vocabulary = LabelVocabulary::from_entity_types(Vec::<String>::new());
        let transitions = create_transitions(&vocabulary);
        assert_eq!(transitions.start, array![0f32]);
        assert_eq!(transitions.between, array![[0f32]]);
    }
}
