//! The result-marker protocol (spec §6.3): a step's stdout may contain a
//! line of the form `CLOCHE_RESULT:<name>` to declare which wire fires.
//! Lines before and after the marker are preserved as adapter output.

/// Line prefix adapters scan for on a step's stdout.
pub const RESULT_MARKER_PREFIX: &str = "CLOCHE_RESULT:";

/// Scan `output` for the last line bearing `RESULT_MARKER_PREFIX` and return
/// the declared result name, if any. The *last* matching line wins, so a
/// step that prints progress and then a final marker is handled correctly.
pub fn extract_marker(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(RESULT_MARKER_PREFIX))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Remove every line bearing `RESULT_MARKER_PREFIX` from `output`. Used
/// before persisting adapter output so captures and logs never carry the
/// routing line the workflow author didn't write.
pub fn strip_markers(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.trim().starts_with(RESULT_MARKER_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_marker_line() {
        let output = "building...\nCLOCHE_RESULT:success\n";
        assert_eq!(extract_marker(output), Some("success"));
    }

    #[test]
    fn last_marker_wins_when_several_are_present() {
        let output = "CLOCHE_RESULT:first\nmore output\nCLOCHE_RESULT:second\n";
        assert_eq!(extract_marker(output), Some("second"));
    }

    #[test]
    fn returns_none_when_no_marker_present() {
        let output = "just some plain output\n";
        assert_eq!(extract_marker(output), None);
    }

    #[test]
    fn ignores_an_empty_marker() {
        let output = "CLOCHE_RESULT:\n";
        assert_eq!(extract_marker(output), None);
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let output = "  CLOCHE_RESULT:success  \n";
        assert_eq!(extract_marker(output), Some("success"));
    }

    #[test]
    fn strip_markers_removes_every_marker_line() {
        let output = "building...\nCLOCHE_RESULT:first\nmore\nCLOCHE_RESULT:second\n";
        let cleaned = strip_markers(output);
        assert!(!cleaned.contains(RESULT_MARKER_PREFIX));
        assert!(cleaned.contains("building..."));
        assert!(cleaned.contains("more"));
    }
}
