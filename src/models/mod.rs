pub mod answer;
pub mod database;
pub mod entry;
pub mod loaders;
pub mod question;
pub mod tag;

pub use answer::AnswerRecord;
pub use database::DatabaseDescriptor;
pub use entry::Entry;
pub use loaders::{load_question_bank, parse_question_bank, parse_tabular, TabularLayout};
pub use question::Question;
pub use tag::TagUsage;
