pub mod bank_loader;
pub mod manifest;
pub mod tabular_loader;

pub use bank_loader::{load_question_bank, parse_question_bank};
pub use manifest::{parse_local_manifest, parse_remote_manifest, write_local_manifest, LocalManifest};
pub use tabular_loader::{load_tabular_file, parse_tabular, TabularLayout};
