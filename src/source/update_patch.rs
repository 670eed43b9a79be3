//! Regenerating a port's patch from its source tree.
//!
//! The patch is `git diff upstream` of the build tree, minus `index` lines,
//! binary hunks and files matching the skip globs (`*config.sub` plus the
//! port's optional `diff_skip.txt`, one glob per line).

use crate::build_command::command_output;
use crate::error::{PortsError, Result};
use crate::util;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Per-port list of extra globs to leave out of the patch.
pub const DIFF_SKIP_FILE: &str = "diff_skip.txt";

const ALWAYS_SKIP: &str = "*config.sub";
const DIFF_HEADER: &str = "diff --git a/";

static INDEX_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\nindex [^\n]+\n").unwrap());
static BINARY_HUNK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"diff [^\n]+\n(new file [^\n]+\n)?(deleted file mode [^\n]+\n)?Binary files [^\n]+ differ\n",
    )
    .unwrap()
});

/// What [`update_patch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchUpdate {
    /// Empty diff, existing patch deleted
    Removed,
    /// Empty diff, no patch file
    NotRequired,
    /// Diff equals the existing patch
    Unchanged,
    Created,
    Updated,
}

/// Clean up a raw diff and drop sections for skipped files.
pub fn filter_diff(diff: &str, skip: &[String]) -> String {
    let diff = INDEX_LINE.replace_all(diff, "\n");
    let diff = BINARY_HUNK.replace_all(&diff, "");

    let mut out = String::new();
    let mut skipping = false;
    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix(DIFF_HEADER) {
            let file = rest.split_whitespace().next().unwrap_or_default();
            skipping = skip.iter().any(|glob| util::matches_glob(glob, file));
        }
        if !skipping {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Skip globs for a port directory.
pub fn skip_globs(port_dir: &Path) -> Result<Vec<String>> {
    let mut skip = vec![ALWAYS_SKIP.to_string()];
    let file = port_dir.join(DIFF_SKIP_FILE);
    if file.exists() {
        skip.extend(
            fs::read_to_string(&file)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }
    Ok(skip)
}

/// Rewrite `patch_file` from the diff of `source_dir` against `upstream`.
pub fn update_patch(source_dir: &Path, port_dir: &Path, patch_file: &Path) -> Result<PatchUpdate> {
    if !source_dir.exists() {
        return Err(PortsError::msg(format!(
            "Source directory not found: {}",
            source_dir.display()
        )));
    }
    let raw = command_output("git", &["diff", "upstream", "--no-ext-diff"], source_dir).map_err(|e| {
        PortsError::msg(format!("error running git in {}: {}", source_dir.display(), e))
    })?;
    let diff = filter_diff(&raw, &skip_globs(port_dir)?);
    write_patch(patch_file, &diff)
}

fn write_patch(patch_file: &Path, diff: &str) -> Result<PatchUpdate> {
    let preexisting = patch_file.exists();
    if diff.is_empty() {
        if preexisting {
            fs::remove_file(patch_file)?;
            return Ok(PatchUpdate::Removed);
        }
        return Ok(PatchUpdate::NotRequired);
    }
    if preexisting && fs::read_to_string(patch_file)? == diff {
        return Ok(PatchUpdate::Unchanged);
    }
    fs::write(patch_file, diff)?;
    Ok(if preexisting {
        PatchUpdate::Updated
    } else {
        PatchUpdate::Created
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RAW: &str = "diff --git a/Makefile b/Makefile\n\
index 1234567..89abcde 100644\n\
--- a/Makefile\n\
+++ b/Makefile\n\
@@ -1 +1 @@\n\
-CC=gcc\n\
+CC=pnacl-clang\n\
diff --git a/logo.png b/logo.png\n\
new file mode 100644\n\
Binary files /dev/null and b/logo.png differ\n\
diff --git a/build-aux/config.sub b/build-aux/config.sub\n\
--- a/build-aux/config.sub\n\
+++ b/build-aux/config.sub\n\
@@ -1 +1 @@\n\
-x\n\
+y\n";

    #[test]
    fn filters_noise() {
        let out = filter_diff(RAW, &[ALWAYS_SKIP.to_string()]);
        assert_eq!(
            out,
            "diff --git a/Makefile b/Makefile\n--- a/Makefile\n+++ b/Makefile\n\
             @@ -1 +1 @@\n-CC=gcc\n+CC=pnacl-clang\n"
        );
    }

    #[test]
    fn extra_skip_globs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DIFF_SKIP_FILE), "Makefile\n\n").unwrap();
        let skip = skip_globs(dir.path()).unwrap();
        assert_eq!(skip, ["*config.sub", "Makefile"]);
        assert_eq!(filter_diff(RAW, &skip), "");
    }

    #[test]
    fn patch_file_states() {
        let dir = TempDir::new().unwrap();
        let patch = dir.path().join("nacl.patch");
        assert_eq!(write_patch(&patch, "").unwrap(), PatchUpdate::NotRequired);
        assert_eq!(write_patch(&patch, "a\n").unwrap(), PatchUpdate::Created);
        assert_eq!(write_patch(&patch, "a\n").unwrap(), PatchUpdate::Unchanged);
        assert_eq!(write_patch(&patch, "b\n").unwrap(), PatchUpdate::Updated);
        assert_eq!(write_patch(&patch, "").unwrap(), PatchUpdate::Removed);
        assert!(!patch.exists());
    }
}
