//! Tutor Core
//!
//! Client-side logic of the reading-discussion tutor: the Run Poller that
//! drives one hosted-assistant run to completion, the Typing Animator that
//! turns coarse message snapshots into a live-typing effect, the Conversation
//! Orchestrator tying both to a transcript, and the Evaluation Parser that
//! structures the model's assessment of the student.

pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod gateway;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod transcript;
pub mod typing;

pub use error::TutorError;
pub use evaluation::{CategoryEvaluation, EvaluationCategory, EvaluationRecord, parse_evaluation};
pub use orchestrator::{ConversationState, Orchestrator};
pub use session::ConversationSession;
pub use transcript::{Role, Transcript, Turn};
