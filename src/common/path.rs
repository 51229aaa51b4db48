use crate::common::{Error, Result};

/// Lexically clean an absolute path: collapse duplicate slashes and
/// resolve `.` and `..` segments (never climbing above the root).
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Turn a path absolute (relative paths are resolved against the
/// process working directory) and clean it.
pub fn absolutize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::InvalidArgument("empty path".to_string()));
    }
    if path.starts_with('/') {
        Ok(clean(path))
    } else {
        let cwd = std::env::current_dir()?;
        Ok(clean(&format!("{}/{}", cwd.display(), path)))
    }
}

/// Get the parent path of a cleaned absolute path, None for the root.
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean("/foo/bar"), "/foo/bar");
        assert_eq!(clean("/foo/bar/"), "/foo/bar");
        assert_eq!(clean("//foo//bar//"), "/foo/bar");
        assert_eq!(clean("/foo/./bar"), "/foo/bar");
        assert_eq!(clean("/foo/baz/../bar"), "/foo/bar");
        assert_eq!(clean("/../foo"), "/foo");
        assert_eq!(clean("/"), "/");
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize("/foo/bar").unwrap(), "/foo/bar");
        assert!(absolutize("").is_err());

        let cwd = std::env::current_dir().unwrap();
        let abs = absolutize("relative/file").unwrap();
        assert_eq!(abs, clean(&format!("{}/relative/file", cwd.display())));
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/foo/bar").unwrap(), "/foo");
        assert_eq!(parent("/foo").unwrap(), "/");
        assert_eq!(parent("/"), None);
    }
}
