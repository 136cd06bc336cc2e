mod names;
mod registry;
mod script_compile;
mod source_path;

pub use names::{NameTable, PARTICIPANT_PALETTE};
pub use registry::{merge_programs, ProgramRegistry, RegisteredFile};
pub use script_compile::{parse_script, ParsedScript};
pub use source_path::normalize_virtual_path;
