use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The kind of answer a question accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuestionType {
    /// Free text.
    Text,
    /// Exactly one option.
    Single,
    /// Any set of distinct options.
    Multi,
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "TEXT",
            Self::Single => "SINGLE",
            Self::Multi => "MULTI",
        };
        write!(f, "{name}")
    }
}

impl From<QuestionType> for Bson {
    fn from(kind: QuestionType) -> Self {
        to_bson(&kind).expect("Serialisation is infallible")
    }
}
