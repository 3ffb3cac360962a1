use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::OutputFormat;
use crate::error::AppError;

/// Lowercases `name` and collapses every run of non-alphanumeric characters
/// into a single underscore.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "business".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<dir>/<slug>_stress_test_<YYYYMMDD_HHMMSS>.<ext>`
pub fn default_output_path(
    name: &str,
    format: OutputFormat,
    now: DateTime<Utc>,
    dir: &Path,
) -> PathBuf {
    dir.join(format!(
        "{}_stress_test_{}.{}",
        slug(name),
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

/// Returns `path` when nothing exists there yet, otherwise the first free
/// `<stem>-N.<ext>` sibling, counting from 2.
pub fn first_free_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (2u32..)
        .map(|n| match &ext {
            Some(ext) => path.with_file_name(format!("{stem}-{n}.{ext}")),
            None => path.with_file_name(format!("{stem}-{n}")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Writes through a temp file in the destination directory and renames it
/// into place, so a failed write never leaves a partial report behind.
#[tracing::instrument(name = "output.write", skip(contents), fields(output.path = %path.display(), output.bytes = contents.len()))]
pub fn write_report(path: &Path, contents: &str) -> Result<(), AppError> {
    let fail = |e: &dyn std::fmt::Display| AppError::OutputWrite(format!("{}: {e}", path.display()));

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| fail(&e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| fail(&e))?;
    tmp.write_all(contents.as_bytes()).map_err(|e| fail(&e))?;
    tmp.as_file().sync_all().map_err(|e| fail(&e))?;
    tmp.persist(path).map_err(|e| fail(&e.error))?;

    tracing::info!("Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Acme Robotics"), "acme_robotics");
        assert_eq!(slug("  Joe's Café & Bar!! "), "joe_s_café_bar");
        assert_eq!(slug("A--B"), "a_b");
        assert_eq!(slug("***"), "business");
    }

    #[test]
    fn test_default_output_path() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap();
        let path = default_output_path("Acme Robotics", OutputFormat::Markdown, now, Path::new("out"));
        assert_eq!(path, PathBuf::from("out/acme_robotics_stress_test_20260314_090507.md"));

        let json = default_output_path("Acme", OutputFormat::Json, now, Path::new("."));
        assert!(json.to_string_lossy().ends_with("acme_stress_test_20260314_090507.json"));
    }

    #[test]
    fn test_write_report_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.md");
        write_report(&path, "# Report\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Report\n");
    }

    #[test]
    fn test_write_report_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        std::fs::write(&path, "old").unwrap();
        write_report(&path, "new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_report_into_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_report(&blocker.join("report.md"), "x").unwrap_err();
        assert!(matches!(err, AppError::OutputWrite(_)));
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("report.md");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("keep.txt"), "x").unwrap();

        let err = write_report(&occupied, "# Report\n").unwrap_err();
        assert!(matches!(err, AppError::OutputWrite(_)));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["report.md"]);
        assert!(occupied.is_dir());
    }

    #[test]
    fn test_first_free_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme_stress_test_20260314_090507.md");
        assert_eq!(first_free_path(&path), path);

        std::fs::write(&path, "first").unwrap();
        let second = first_free_path(&path);
        assert_eq!(second, dir.path().join("acme_stress_test_20260314_090507-2.md"));

        std::fs::write(&second, "second").unwrap();
        assert_eq!(
            first_free_path(&path),
            dir.path().join("acme_stress_test_20260314_090507-3.md")
        );
    }
}
