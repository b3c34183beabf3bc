// Path helpers shared by the connectors, the facade and the batch engine.

/// Joins path segments with exactly one `/` between them. Empty segments are
/// skipped and a leading `/` on the first segment is kept.
pub fn join_path(parts: &[&str]) -> String {
    let mut joined = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if joined.is_empty() {
            joined.push_str(part);
            continue;
        }
        match (joined.ends_with('/'), part.starts_with('/')) {
            (true, true) => joined.push_str(&part[1..]),
            (false, false) => {
                joined.push('/');
                joined.push_str(part);
            }
            _ => joined.push_str(part),
        }
    }
    joined
}

/// Splits `a/b/c` into (`a/b`, `c`). A bare name has an empty parent.
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    }
}

/// Splits a filename at its last `.` into (stem, extension). A name without
/// any dot has an empty stem and the whole name as its extension.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos + 1..]),
        None => ("", filename),
    }
}

/// Every ancestor of `path` including itself, shortest first: `/a/b` yields
/// `/a`, `/a/b`.
pub fn path_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

/// Byte offset of the `index`-th whitespace-separated token in `line`.
pub fn token_start(line: &str, index: usize) -> Option<usize> {
    let mut seen = 0;
    let mut in_token = false;
    for (pos, c) in line.char_indices() {
        if c.is_whitespace() {
            in_token = false;
        } else if !in_token {
            if seen == index {
                return Some(pos);
            }
            seen += 1;
            in_token = true;
        }
    }
    None
}
