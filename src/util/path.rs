/// Extension of a file name including the dot (e.g. ".rs").
///
/// Names without an extension, including dotfiles such as ".gitignore",
/// return the whole name so listings can still group them.
pub fn blob_extension(file_name: &str) -> &str {
    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[stem_start..].rfind('.') {
        Some(pos) => &file_name[stem_start + pos..],
        None => file_name,
    }
}

/// Splits a repository path into components, ignoring leading, trailing
/// and repeated slashes
pub fn path_parts(path: &str) -> Vec<&str> {
    path.split('/').filter(|p| !p.is_empty()).collect()
}

/// Directory path form used in last-commit keys: "/" or "/a/b/"
pub fn dir_path(parts: &[&str]) -> String {
    let mut out = String::from("/");
    for part in parts {
        out.push_str(part);
        out.push('/');
    }
    out
}

/// Joins a diff path prefix and a child name without a leading slash
pub fn join_diff_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
