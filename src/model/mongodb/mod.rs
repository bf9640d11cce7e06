mod bson;
mod collection;
mod counter;
mod errors;

pub use bson::{u32_id_filter, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{
    Counter, ANSWER_ID_COUNTER_ID, POLL_ID_COUNTER_ID, QUESTION_ID_COUNTER_ID,
    VARIANT_ID_COUNTER_ID,
};
pub use errors::{is_duplicate_key_error, is_transient_transaction_error};
