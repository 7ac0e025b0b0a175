//! Built-in `.workstateignore` templates, one per supported code tool.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rules::IGNORE_FILE;

/// Code tools that ship a default ignore template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeTool {
    Node,
    React,
    Angular,
    Java,
    C,
    #[serde(rename = "c++")]
    Cpp,
    #[serde(rename = "c#")]
    CSharp,
    Php,
    Python,
    Default,
}

impl CodeTool {
    pub const ALL: [CodeTool; 10] = [
        CodeTool::Node,
        CodeTool::React,
        CodeTool::Angular,
        CodeTool::Java,
        CodeTool::C,
        CodeTool::Cpp,
        CodeTool::CSharp,
        CodeTool::Php,
        CodeTool::Python,
        CodeTool::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeTool::Node => "node",
            CodeTool::React => "react",
            CodeTool::Angular => "angular",
            CodeTool::Java => "java",
            CodeTool::C => "c",
            CodeTool::Cpp => "c++",
            CodeTool::CSharp => "c#",
            CodeTool::Php => "php",
            CodeTool::Python => "python",
            CodeTool::Default => "default",
        }
    }

    /// Comma separated list of accepted names, for help and error text.
    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CodeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown tool `{s}` (expected one of: {})", Self::valid_values()))
    }
}

macro_rules! common {
    () => {
        "\
# Version control and editor state
.git/
.svn/
.hg/
.idea/
.vscode/
*.swp
.DS_Store
Thumbs.db
desktop.ini
"
    };
}

const COMMON: &str = common!();

const NODE: &str = concat!(
    common!(),
    "\
# Dependencies and build output
node_modules/
dist/
build/
coverage/
.npm/
.yarn/cache/
*.log
.env
"
);

const REACT: &str = concat!(
    common!(),
    "\
node_modules/
build/
dist/
coverage/
.next/
.cache/
*.log
.env
"
);

const ANGULAR: &str = concat!(
    common!(),
    "\
node_modules/
dist/
out-tsc/
.angular/
coverage/
*.log
.env
"
);

const JAVA: &str = concat!(
    common!(),
    "\
target/
build/
out/
.gradle/
*.class
*.jar
*.war
*.log
"
);

const C: &str = concat!(
    common!(),
    "\
build/
*.o
*.a
*.so
*.out
*.exe
"
);

const CPP: &str = concat!(
    common!(),
    "\
build/
cmake-build-*/
CMakeFiles/
*.o
*.obj
*.a
*.so
*.dll
*.exe
"
);

const CSHARP: &str = concat!(
    common!(),
    "\
bin/
obj/
packages/
.vs/
*.user
*.suo
"
);

const PHP: &str = concat!(
    common!(),
    "\
vendor/
storage/logs/
.phpunit.cache/
*.log
.env
"
);

const PYTHON: &str = concat!(
    common!(),
    "\
# Secrets
.env
# Virtual environments
venv/
.venv/
env/
# Caches and build output
__pycache__/
*.pyc
*.pyo
.pytest_cache/
.mypy_cache/
.ruff_cache/
.tox/
build/
dist/
*.egg-info/
"
);

/// Ignore-file content for `tool`.
pub fn template(tool: CodeTool) -> &'static str {
    match tool {
        CodeTool::Node => NODE,
        CodeTool::React => REACT,
        CodeTool::Angular => ANGULAR,
        CodeTool::Java => JAVA,
        CodeTool::C => C,
        CodeTool::Cpp => CPP,
        CodeTool::CSharp => CSHARP,
        CodeTool::Php => PHP,
        CodeTool::Python => PYTHON,
        CodeTool::Default => COMMON,
    }
}

/// Write `.workstateignore` under `root` from the `tool` template.
///
/// An existing file is left untouched; returns whether a file was written.
pub fn init_ignore_file(root: &Path, tool: CodeTool) -> io::Result<bool> {
    let path = root.join(IGNORE_FILE);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };
    file.write_all(template(tool).as_bytes())?;
    file.write_all(b"\n")?;
    info!(path = %path.display(), %tool, "created ignore file");
    Ok(true)
}
