use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::DEFAULT_INIT_TEMPLATE;
use crate::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// External programs used to obtain both sides of a comparison.
#[derive(Clone, Debug)]
pub struct Toolchain {
    /// nasm-compatible assembler
    pub assembler: PathBuf,
    /// gcc-compatible C compiler able to target 32-bit x86 (`-m32`)
    pub compiler: PathBuf,
    /// The analysis engine, invoked as `engine <init> <output> <log>`
    pub engine: PathBuf,
    /// Init descriptor template, see `engine::InitDescriptor::render`
    pub init_template: String,
    /// Limit for each external process; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Leave the scratch directories on disk after the run.
    pub keep_scratch: bool,
}

impl Toolchain {
    pub fn new<P: Into<PathBuf>>(assembler: P, compiler: P, engine: P) -> Toolchain {
        Toolchain {
            assembler: assembler.into(),
            compiler: compiler.into(),
            engine: engine.into(),
            init_template: DEFAULT_INIT_TEMPLATE.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            keep_scratch: false,
        }
    }

    /// Reads the configuration from environment variables:
    ///
    /// - `ORACLE_ASSEMBLER` (default `nasm`)
    /// - `ORACLE_CC` (default `gcc`)
    /// - `ORACLE_ENGINE` (required)
    /// - `ORACLE_INIT_TEMPLATE`, path to a template file
    /// - `ORACLE_TIMEOUT_SECS`, `0` disables the timeout
    /// - `ORACLE_KEEP_SCRATCH`
    ///
    /// Program names without a path are looked up from `PATH`.
    pub fn from_env() -> Result<Toolchain, Error> {
        Toolchain::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Toolchain, Error>
    where F: Fn(&str) -> Option<String>,
    {
        let timeout = match lookup("ORACLE_TIMEOUT_SECS") {
            Some(text) => match text.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    return Err(Error::InvalidConfig(
                        format!("ORACLE_TIMEOUT_SECS is not a number: {:?}", text)
                    ));
                }
            },
            None => Some(DEFAULT_TIMEOUT),
        };
        let keep_scratch = match lookup("ORACLE_KEEP_SCRATCH").as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(Error::InvalidConfig(
                    format!("ORACLE_KEEP_SCRATCH should be 0 or 1, was {:?}", other)
                ));
            }
        };
        let engine = lookup("ORACLE_ENGINE")
            .ok_or_else(|| Error::ToolNotFound("engine".into(), "ORACLE_ENGINE is not set".into()))?;
        let engine = find_tool("engine", &engine)?;
        let assembler = lookup("ORACLE_ASSEMBLER").unwrap_or_else(|| "nasm".into());
        let assembler = find_tool("assembler", &assembler)?;
        let compiler = lookup("ORACLE_CC").unwrap_or_else(|| "gcc".into());
        let compiler = find_tool("C compiler", &compiler)?;
        let init_template = match lookup("ORACLE_INIT_TEMPLATE") {
            Some(path) => read_template(Path::new(&path))?,
            None => DEFAULT_INIT_TEMPLATE.into(),
        };
        Ok(Toolchain {
            assembler,
            compiler,
            engine,
            init_template,
            timeout,
            keep_scratch,
        })
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Toolchain {
        Toolchain {
            timeout,
            ..self
        }
    }

    pub fn with_init_template<S: Into<String>>(self, template: S) -> Toolchain {
        Toolchain {
            init_template: template.into(),
            ..self
        }
    }

    pub fn with_keep_scratch(self, keep_scratch: bool) -> Toolchain {
        Toolchain {
            keep_scratch,
            ..self
        }
    }
}

fn find_tool(tool: &str, name: &str) -> Result<PathBuf, Error> {
    which::which(name)
        .map_err(|e| Error::ToolNotFound(tool.into(), format!("{}: {}", name, e)))
}

fn read_template(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::IoWithFilename(e, path.into()))
}
