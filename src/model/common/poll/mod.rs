mod question_type;

pub use question_type::QuestionType;

/// Our poll IDs are integers.
pub type PollId = u32;
/// Our question IDs are integers.
pub type QuestionId = u32;
/// Our answer IDs are integers.
pub type AnswerId = u32;
/// Our answer variant IDs are integers.
pub type VariantId = u32;
/// An option code chosen in a single- or multiple-choice answer.
pub type OptionValue = u16;
