pub mod database_registry;
pub mod question_generator;
pub mod tag_registry;

pub use database_registry::{DatabaseRegistry, DATABASES_FILENAME};
pub use question_generator::{GeneratorBuilder, GeneratorVariant, QuestionGenerator};
pub use tag_registry::TagRegistry;
