//! Immutable exam content supplied by the question catalog.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error raised when exam content fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidExam {
    /// The exam carries no questions at all.
    #[error("an exam requires at least one question")]
    NoQuestions,
    /// A question id appears more than once.
    #[error("duplicate question id `{0}`")]
    DuplicateQuestion(Uuid),
    /// A question has no choices to pick from.
    #[error("question `{0}` has no choices")]
    NoChoices(Uuid),
    /// A choice id appears more than once within one question.
    #[error("duplicate choice id `{choice}` in question `{question}`")]
    DuplicateChoice {
        /// Question holding the duplicated choice.
        question: Uuid,
        /// The duplicated choice id.
        choice: Uuid,
    },
    /// The exam duration is zero.
    #[error("exam duration must be strictly positive")]
    ZeroDuration,
}

/// One selectable choice of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Stable identifier of the choice.
    pub id: Uuid,
    /// Text shown to the student.
    pub text: String,
}

/// One question with its ordered choices. No mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier of the question.
    pub id: Uuid,
    /// Prompt shown to the student.
    pub prompt: String,
    /// Choices in presentation order.
    pub choices: Vec<Choice>,
}

impl Question {
    /// Whether `choice` is one of this question's choices.
    pub fn has_choice(&self, choice: Uuid) -> bool {
        self.choices.iter().any(|c| c.id == choice)
    }
}

/// Immutable definition of the exam being taken, fetched once per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    /// Stable identifier of the exam.
    pub id: Uuid,
    /// Total answering budget in minutes.
    pub duration_minutes: u64,
    /// Room (or assignment) this attempt runs under, polled for closure.
    pub room_id: Uuid,
    /// Questions keyed by id, in presentation order.
    pub questions: IndexMap<Uuid, Question>,
}

impl ExamDefinition {
    /// Build a definition from catalog content, validating its structure.
    pub fn new(
        id: Uuid,
        duration_minutes: u64,
        room_id: Uuid,
        questions: Vec<Question>,
    ) -> Result<Self, InvalidExam> {
        if duration_minutes == 0 {
            return Err(InvalidExam::ZeroDuration);
        }
        if questions.is_empty() {
            return Err(InvalidExam::NoQuestions);
        }

        let mut ordered = IndexMap::with_capacity(questions.len());
        for question in questions {
            if question.choices.is_empty() {
                return Err(InvalidExam::NoChoices(question.id));
            }
            for (index, choice) in question.choices.iter().enumerate() {
                if question.choices[..index].iter().any(|c| c.id == choice.id) {
                    return Err(InvalidExam::DuplicateChoice {
                        question: question.id,
                        choice: choice.id,
                    });
                }
            }
            let question_id = question.id;
            if ordered.insert(question_id, question).is_some() {
                return Err(InvalidExam::DuplicateQuestion(question_id));
            }
        }

        Ok(Self {
            id,
            duration_minutes,
            room_id,
            questions: ordered,
        })
    }

    /// Look up a question by id.
    pub fn question(&self, id: Uuid) -> Option<&Question> {
        self.questions.get(&id)
    }

    /// Total answering budget in seconds.
    pub fn budget_seconds(&self) -> u64 {
        self.duration_minutes * 60
    }
}
