//! Names for per-scenario scratch directories.
//!
//! Every scenario of a run gets a distinct sequence number, which is passed
//! down explicitly; directory names are derived from it so that no counter
//! state is shared between scenarios.

use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ScratchKind {
    Assembler,
    Compiler,
    Engine,
}

impl ScratchKind {
    fn prefix(self) -> &'static str {
        match self {
            ScratchKind::Assembler => "nasm",
            ScratchKind::Compiler => "gcc",
            ScratchKind::Engine => "engine",
        }
    }
}

pub fn scratch_name(kind: ScratchKind, seq: u32) -> String {
    format!("{}-{}", kind.prefix(), seq)
}

/// Creates `root/<scratch_name>` and returns its path.
pub fn create_scratch_dir(
    root: &Path,
    kind: ScratchKind,
    seq: u32,
) -> Result<PathBuf, crate::Error> {
    let path = root.join(scratch_name(kind, seq));
    std::fs::create_dir_all(&path)
        .map_err(|e| crate::Error::IoWithFilename(e, path.clone()))?;
    Ok(path)
}

#[test]
fn test_scratch_names() {
    use std::collections::HashSet;

    assert_eq!(scratch_name(ScratchKind::Assembler, 0), "nasm-0");
    assert_eq!(scratch_name(ScratchKind::Compiler, 12), "gcc-12");
    assert_eq!(scratch_name(ScratchKind::Engine, 3), "engine-3");
    let kinds = [ScratchKind::Assembler, ScratchKind::Compiler, ScratchKind::Engine];
    let names = (0..100)
        .flat_map(|seq| kinds.iter().map(move |&kind| scratch_name(kind, seq)))
        .collect::<HashSet<_>>();
    assert_eq!(names.len(), 300);
}
