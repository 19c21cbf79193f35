//! Remote path splitting.

/// A remote path split at its last `/` into directory and leaf name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath {
    /// Everything up to and including the last separator; `/` when absent.
    pub directory: String,
    /// Everything after the last separator.
    pub name: String,
}

impl RemotePath {
    pub fn split(path: &str) -> Self {
        if path.trim().is_empty() {
            return Self {
                directory: "/".into(),
                name: String::new(),
            };
        }
        match path.rfind('/') {
            Some(idx) => Self {
                directory: path[..=idx].replace('\\', "/"),
                name: path[idx + 1..].to_string(),
            },
            None => Self {
                directory: "/".into(),
                name: path.to_string(),
            },
        }
    }

    /// Absolute prefixes of the directory, shallowest first.
    ///
    /// `/a/b/` yields `["/a", "/a/b"]`; the root yields nothing.
    pub fn directory_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = String::new();
        for part in self.directory.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            chain.push(current.clone());
        }
        chain
    }

    pub fn is_root_directory(&self) -> bool {
        self.directory_chain().is_empty()
    }

    /// The directory anchored at the root: `/` or `/a/b`.
    pub fn absolute_directory(&self) -> String {
        self.directory_chain().pop().unwrap_or_else(|| "/".into())
    }

    /// The whole path anchored at the root, so it means the same thing
    /// whatever the session's working directory is.
    pub fn absolute_path(&self) -> String {
        match self.directory_chain().pop() {
            Some(dir) => format!("{}/{}", dir, self.name),
            None => format!("/{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_separator_concatenates_back() {
        for p in ["/2019/a.txt", "/a/b/c/file.bin", "rel/x", "/x", "/dir/"] {
            let rp = RemotePath::split(p);
            assert_eq!(format!("{}{}", rp.directory, rp.name), p);
        }
    }

    #[test]
    fn split_parts() {
        let rp = RemotePath::split("/2019/a.txt");
        assert_eq!(rp.directory, "/2019/");
        assert_eq!(rp.name, "a.txt");

        let rp = RemotePath::split("/dir/");
        assert_eq!(rp.directory, "/dir/");
        assert_eq!(rp.name, "");
    }

    #[test]
    fn split_without_separator_is_rooted() {
        let rp = RemotePath::split("report.csv");
        assert_eq!(rp.directory, "/");
        assert_eq!(rp.name, "report.csv");
    }

    #[test]
    fn split_blank() {
        for p in ["", "   "] {
            let rp = RemotePath::split(p);
            assert_eq!(rp.directory, "/");
            assert_eq!(rp.name, "");
        }
    }

    #[test]
    fn backslashes_normalised_in_directory() {
        let rp = RemotePath::split("a\\b/c.txt");
        assert_eq!(rp.directory, "a/b/");
        assert_eq!(rp.name, "c.txt");
        assert_eq!(rp.directory_chain(), vec!["/a", "/a/b"]);
    }

    #[test]
    fn chain() {
        assert_eq!(
            RemotePath::split("/a/b/c/f.txt").directory_chain(),
            vec!["/a", "/a/b", "/a/b/c"]
        );
        assert_eq!(RemotePath::split("//a//b/f").directory_chain(), vec!["/a", "/a/b"]);
        assert!(RemotePath::split("/f.txt").is_root_directory());
        assert!(RemotePath::split("f.txt").is_root_directory());
    }

    #[test]
    fn relative_paths_are_anchored_at_root() {
        let rp = RemotePath::split("rel/x.txt");
        assert_eq!(rp.absolute_directory(), "/rel");
        assert_eq!(rp.absolute_path(), "/rel/x.txt");

        let rp = RemotePath::split("a//b/c.txt");
        assert_eq!(rp.absolute_directory(), "/a/b");
        assert_eq!(rp.absolute_path(), "/a/b/c.txt");

        let rp = RemotePath::split("gone.txt");
        assert_eq!(rp.absolute_directory(), "/");
        assert_eq!(rp.absolute_path(), "/gone.txt");
        assert_eq!(RemotePath::split("/2019/a.txt").absolute_path(), "/2019/a.txt");
    }
}
