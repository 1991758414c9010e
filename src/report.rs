//! Human-readable size reports.

/// Format a byte count with binary units, one decimal place (`"1.2 KB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `"1.2 KB -> 900.0 B (-25.0%)"`.
pub fn size_change(before: u64, after: u64) -> String {
    let change = if before == 0 {
        0.0
    } else {
        (before as f64 - after as f64) / before as f64 * 100.0
    };
    let sign = if after < before { "-" } else { "+" };
    format!(
        "{} -> {} ({}{:.1}%)",
        format_bytes(before),
        format_bytes(after),
        sign,
        change.abs()
    )
}

/// One report line for a file: `path | <size change>`, or `in -> out | …`
/// when the output went somewhere else.
pub fn file_line(input: &str, output: &str, before: u64, after: u64) -> String {
    let paths = if input == output {
        output.to_string()
    } else {
        format!("{input} -> {output}")
    };
    format!("{paths} | {}", size_change(before, after))
}

/// Byte offset just past the longest directory prefix shared by all paths.
///
/// A single path is cut after its last separator. Both `/` and `\` count.
pub fn find_truncate_index(paths: &[String]) -> usize {
    let is_sep = |c: char| c == '/' || c == '\\';
    let Some(first) = paths.first() else {
        return 0;
    };
    if paths.len() == 1 {
        return first.rfind(is_sep).map_or(0, |pos| pos + 1);
    }
    let Some(last_sep) = first.rfind(is_sep) else {
        return 0;
    };

    let mut index = 0;
    for (pos, ch) in first.char_indices().take_while(|&(pos, _)| pos <= last_sep) {
        let shared = paths[1..]
            .iter()
            .all(|p| p.get(pos..).and_then(|rest| rest.chars().next()) == Some(ch));
        if !shared {
            break;
        }
        if is_sep(ch) {
            index = pos + ch.len_utf8();
        }
    }
    index
}

/// `path` without its first `index` bytes; unchanged when `index` is 0 or
/// not inside the path.
pub fn truncate_path(path: &str, index: usize) -> String {
    if index == 0 || index >= path.len() {
        return path.to_string();
    }
    path.get(index..).unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(900), "900.0 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1229), "1.2 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_size_change() {
        assert_eq!(size_change(1200, 900), "1.2 KB -> 900.0 B (-25.0%)");
        assert_eq!(size_change(100, 110), "100.0 B -> 110.0 B (+10.0%)");
        assert_eq!(size_change(0, 0), "0 B -> 0 B (+0.0%)");
    }

    #[test]
    fn test_file_line() {
        assert_eq!(file_line("a.png", "a.png", 1200, 900), "a.png | 1.2 KB -> 900.0 B (-25.0%)");
        assert_eq!(
            file_line("in/a.png", "out/a.png", 100, 100),
            "in/a.png -> out/a.png | 100.0 B -> 100.0 B (+0.0%)"
        );
    }

    #[test]
    fn test_truncate_index() {
        assert_eq!(find_truncate_index(&[]), 0);
        assert_eq!(find_truncate_index(&strings(&["img/a.png"])), 4);
        assert_eq!(find_truncate_index(&strings(&["a.png"])), 0);
        assert_eq!(
            find_truncate_index(&strings(&["data/img/a.png", "data/img/b.png"])),
            9
        );
        assert_eq!(
            find_truncate_index(&strings(&["data/img/a.png", "data/icons/b.png"])),
            5
        );
        assert_eq!(find_truncate_index(&strings(&["a.png", "b/c.png"])), 0);
        assert_eq!(find_truncate_index(&strings(&["C:\\x\\a.png", "C:\\x\\b.png"])), 5);
    }

    #[test]
    fn test_truncate_path() {
        assert_eq!(truncate_path("data/img/a.png", 9), "a.png");
        assert_eq!(truncate_path("a.png", 0), "a.png");
        assert_eq!(truncate_path("a.png", 10), "a.png");
    }
}
