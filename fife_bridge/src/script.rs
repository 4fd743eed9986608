use std::path::PathBuf;

/// Describes a chunk of Lua handed to the scripting thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    File(PathBuf),
    Text(String),
}

impl ScriptSource {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        ScriptSource::File(path.into())
    }

    pub fn from_text(source: impl Into<String>) -> Self {
        ScriptSource::Text(source.into())
    }

    /// Chunk name reported by the interpreter in error messages.
    pub fn chunk_name(&self) -> String {
        match self {
            ScriptSource::File(path) => format!("@{}", path.display()),
            ScriptSource::Text(_) => "cmd".to_string(),
        }
    }
}
