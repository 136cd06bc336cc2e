mod line;

pub use line::{classify_line, classify_source, ClassifiedLine, Command, ScriptLine};
