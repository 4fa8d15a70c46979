//! The `=== FILE: path ===` artifact codec and the template fallback bundle.
//!
//! The code model returns one text blob; files are delimited by marker lines.
//! A marker only counts at the start of a line, so content containing
//! marker-like substrings mid-line survives a round trip unchanged.

use serde::{Deserialize, Serialize};

const MARKER_PREFIX: &str = "=== FILE: ";
const MARKER_SUFFIX: &str = " ===";

/// One generated artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

fn marker_path(line: &str) -> Option<&str> {
    let path = line
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?
        .trim();
    if path.is_empty() { None } else { Some(path) }
}

/// Parse marker-delimited text into `{path, content}` pairs.
///
/// Text before the first marker (model preamble, prose) is ignored. Returns
/// an empty vec when no marker is present at all.
pub fn parse_files(text: &str) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(path) = marker_path(line) {
            if let Some((path, lines)) = current.take() {
                files.push(GeneratedFile::new(path, lines.join("\n")));
            }
            current = Some((path.to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((path, lines)) = current {
        files.push(GeneratedFile::new(path, lines.join("\n")));
    }
    files
}

/// Serialize files back into the marker format (the inverse of [`parse_files`]).
pub fn serialize_files(files: &[GeneratedFile]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(MARKER_PREFIX);
        out.push_str(&file.path);
        out.push_str(MARKER_SUFFIX);
        out.push('\n');
        out.push_str(&file.content);
        out.push('\n');
    }
    out
}

/// Merge corrected files over the originals by path; unknown paths are added.
pub fn merge_by_path(base: &mut Vec<GeneratedFile>, fixes: Vec<GeneratedFile>) {
    for fix in fixes {
        match base.iter_mut().find(|f| f.path == fix.path) {
            Some(existing) => existing.content = fix.content,
            None => base.push(fix),
        }
    }
}

/// Minimal-but-functional fallback bundle used when the code model fails.
/// A job never ends the pipeline with zero artifacts.
pub fn template_fallback(title: &str, description: &str) -> Vec<GeneratedFile> {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "task".to_string() } else { slug };

    vec![
        GeneratedFile::new(
            "package.json",
            format!(
                "{{\n  \"name\": \"{slug}\",\n  \"version\": \"1.0.0\",\n  \"main\": \"index.js\",\n  \"scripts\": {{\n    \"start\": \"node index.js\"\n  }}\n}}\n"
            ),
        ),
        GeneratedFile::new(
            "index.js",
            format!(
                "// {title}\n\nfunction main() {{\n  console.log('Starting: {slug}');\n  // Core steps for this task are outlined in README.md.\n}}\n\nmain();\n"
            ),
        ),
        GeneratedFile::new(
            "README.md",
            format!("# {title}\n\n{description}\n\n## Run\n\n```\nnpm start\n```\n"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_two_files() {
        let text = "=== FILE: index.js ===\nconsole.log(1);\n=== FILE: lib/util.js ===\nmodule.exports = {};\n";
        let files = parse_files(text);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "index.js");
        assert_eq!(files[0].content, "console.log(1);");
        assert_eq!(files[1].path, "lib/util.js");
    }

    #[test]
    fn parse_ignores_preamble() {
        let text = "Sure, here are the files:\n\n=== FILE: a.py ===\nprint('x')\n";
        let files = parse_files(text);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.py");
    }

    #[test]
    fn parse_no_markers_is_empty() {
        assert!(parse_files("just prose, no files").is_empty());
    }

    #[test]
    fn roundtrip_identity() {
        let files = vec![
            GeneratedFile::new("a.js", "line1\nline2"),
            GeneratedFile::new("dir/b.txt", "only line"),
        ];
        assert_eq!(parse_files(&serialize_files(&files)), files);
    }

    #[test]
    fn roundtrip_with_embedded_marker_like_substring() {
        // A marker-like substring not at line start is plain content.
        let files = vec![GeneratedFile::new(
            "doc.md",
            "The delimiter is === FILE: x === but inline it means nothing.\nreal content",
        )];
        let text = serialize_files(&files);
        assert_eq!(parse_files(&text), files);
    }

    #[test]
    fn roundtrip_with_trailing_newline_in_content() {
        let files = vec![GeneratedFile::new("a.txt", "ends with newline\n")];
        assert_eq!(parse_files(&serialize_files(&files)), files);
    }

    #[test]
    fn merge_replaces_and_appends() {
        let mut base = vec![
            GeneratedFile::new("a.js", "old"),
            GeneratedFile::new("b.js", "keep"),
        ];
        merge_by_path(
            &mut base,
            vec![
                GeneratedFile::new("a.js", "new"),
                GeneratedFile::new("c.js", "added"),
            ],
        );
        assert_eq!(base.len(), 3);
        assert_eq!(base[0].content, "new");
        assert_eq!(base[1].content, "keep");
        assert_eq!(base[2].path, "c.js");
    }

    #[test]
    fn template_fallback_is_never_empty() {
        let files = template_fallback("Scrape product listings!", "Three retail sites.");
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.path == "package.json"));
        let pkg = files.iter().find(|f| f.path == "package.json").unwrap();
        assert!(pkg.content.contains("scrape-product-listings"));
        let readme = files.iter().find(|f| f.path == "README.md").unwrap();
        assert!(readme.content.contains("Three retail sites."));
    }

    #[test]
    fn template_fallback_empty_title() {
        let files = template_fallback("", "");
        let pkg = files.iter().find(|f| f.path == "package.json").unwrap();
        assert!(pkg.content.contains("\"task\""));
    }
}
