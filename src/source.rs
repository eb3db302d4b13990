use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::BuildError;

/// Include nesting bound; crossing it means a cycle.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Load a source file into an ordered statement-line sequence: comments
/// stripped, lines trimmed, blank lines dropped, and `.include` directives
/// flattened recursively (resolved against the including file's
/// directory). Missing include files are fatal.
pub fn load_source(path: &Path) -> Result<Vec<String>, BuildError> {
    let mut lines = Vec::new();
    read_into(path, 0, &mut lines)?;
    Ok(lines)
}

fn read_into(path: &Path, depth: usize, out: &mut Vec<String>) -> Result<(), BuildError> {
    lazy_static! {
        static ref INCLUDE_RE: Regex = Regex::new(r#"^\.include +"([^"]+)"$"#).unwrap();
    }

    if depth > MAX_INCLUDE_DEPTH {
        return Err(BuildError::syntax(
            &path.display().to_string(),
            format!("include depth exceeds {}", MAX_INCLUDE_DEPTH),
        ));
    }

    let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    for raw in text.lines() {
        let line = normalize(raw);
        if line.is_empty() {
            continue;
        }
        if let Some(cap) = INCLUDE_RE.captures(&line) {
            read_into(&dir.join(&cap[1]), depth + 1, out)?;
        } else {
            out.push(line);
        }
    }
    Ok(())
}

/// Cut the comment, trim, and collapse `", "` so argument lists and
/// indexed operands compare the same however they were spaced.
fn normalize(raw: &str) -> String {
    let line = match raw.find(';') {
        Some(i) => &raw[..i],
        None => raw,
    };
    line.trim().replace(", ", ",")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "nesbuild-test-{}-{}-{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  lda #$01 ; load"), "lda #$01");
        assert_eq!(normalize(".byte $01, $02, $03"), ".byte $01,$02,$03");
        assert_eq!(normalize("   ; only a comment"), "");
        assert_eq!(normalize("lda Buttons, x"), "lda Buttons,x");
    }

    #[test]
    fn test_load_source_flattens_includes() {
        let dir = temp_dir("include");
        fs::write(dir.join("consts.s"), "PPUCTRL=$2000\nPPUMASK=$2001\n").unwrap();
        fs::write(
            dir.join("main.s"),
            ".include \"consts.s\"\n.org $8000 ; code start\n\nReset:\n  sei\n",
        )
        .unwrap();

        let lines = load_source(&dir.join("main.s")).unwrap();
        assert_eq!(
            lines,
            vec!["PPUCTRL=$2000", "PPUMASK=$2001", ".org $8000", "Reset:", "sei"]
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_source_missing_include_is_fatal() {
        let dir = temp_dir("missing");
        fs::write(dir.join("main.s"), ".include \"gone.s\"\n").unwrap();
        assert!(matches!(
            load_source(&dir.join("main.s")),
            Err(BuildError::Io { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_source_caps_include_depth() {
        let dir = temp_dir("cycle");
        fs::write(dir.join("a.s"), ".include \"b.s\"\n").unwrap();
        fs::write(dir.join("b.s"), ".include \"a.s\"\n").unwrap();
        assert!(matches!(
            load_source(&dir.join("a.s")),
            Err(BuildError::Syntax { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
