//! Fallback mirror
//!
//! A mirror serves two kinds of files below its base URL:
//!
//! - `archives/<filename>`: copies of file and archive sources, under the
//!   filename of the original URL
//! - `snapshots/<name>.tar.gz` or `snapshots/<name>_<revision>.tar.gz`:
//!   snapshots of VCS libraries (see `helpers::build::snapshot`)
//!
//! Mirror downloads always bypass the archive cache so the mirror copy is
//! re-verified.

use crate::config::{ARCHIVE_DIR_BASE, Config, SNAPSHOT_DIR_BASE};
use crate::core::manifest::FileSource;
use crate::core::output;
use crate::error::Result;
use crate::helpers::acquire::Download;
use crate::helpers::build::snapshot_name;
use crate::helpers::internal::url_utils;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct FallbackMirror<'a> {
    base: &'a str,
    config: &'a Config,
}

impl<'a> FallbackMirror<'a> {
    /// The configured mirror, if any.
    pub fn from_config(config: &'a Config) -> Option<Self> {
        config
            .fallback_url
            .as_deref()
            .map(|base| Self { base, config })
    }

    /// Mirror URL for the file behind `original_url`.
    pub fn archive_url(&self, original_url: &str) -> String {
        url_utils::mirror_url(
            self.base,
            ARCHIVE_DIR_BASE,
            &url_utils::filename_from_url(original_url),
        )
    }

    /// Mirror URL of the snapshot for a VCS library.
    pub fn snapshot_url(&self, name: &str, revision: Option<&str>) -> String {
        url_utils::mirror_url(self.base, SNAPSHOT_DIR_BASE, &snapshot_name(name, revision))
    }

    /// Download the mirror copy of a file source into the archive cache.
    pub fn fetch_file(&self, source: &FileSource) -> Result<PathBuf> {
        let url = self.archive_url(&source.url);
        output::detail(&format!("trying fallback {}", url));
        Download::from_config(&url, &self.config.archive_dir, self.config)
            .sha1(source.sha1.as_deref())
            .force(true)
            .fetch()
    }

    /// Download the snapshot of a VCS library into the snapshot directory.
    pub fn fetch_snapshot(&self, name: &str, revision: Option<&str>) -> Result<PathBuf> {
        let url = self.snapshot_url(name, revision);
        output::detail(&format!("looking for snapshot {}", url));
        Download::from_config(&url, &self.config.snapshot_dir, self.config)
            .force(true)
            .fetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_mirror_without_url() {
        let config = Config::new("/work");
        assert!(FallbackMirror::from_config(&config).is_none());
    }

    #[test]
    fn test_archive_url_uses_original_filename() {
        let config = Config::new("/work").with_fallback_url("https://mirror.example.com/deps/");
        let mirror = FallbackMirror::from_config(&config).unwrap();
        assert_eq!(
            mirror.archive_url("https://github.com/g-truc/glm/releases/download/0.9.9.8/glm-0.9.9.8.zip?raw=true"),
            "https://mirror.example.com/deps/archives/glm-0.9.9.8.zip"
        );
    }

    #[test]
    fn test_snapshot_url() {
        let config = Config::new("/work").with_fallback_url("https://mirror.example.com/deps?token=abc");
        let mirror = FallbackMirror::from_config(&config).unwrap();
        assert_eq!(
            mirror.snapshot_url("imgui", Some("v1.89")),
            "https://mirror.example.com/deps/snapshots/imgui_v1.89.tar.gz?token=abc"
        );
        assert_eq!(
            mirror.snapshot_url("imgui", None),
            "https://mirror.example.com/deps/snapshots/imgui.tar.gz?token=abc"
        );
    }

    #[test]
    fn test_file_mirror_fetch() {
        let temp = tempfile::tempdir().unwrap();
        let mirror_root = temp.path().join("mirror");
        std::fs::create_dir_all(mirror_root.join("archives")).unwrap();
        std::fs::write(mirror_root.join("archives/stb_image.h"), "hello world").unwrap();

        let config = Config::new(temp.path().join("base"))
            .with_fallback_url(format!("file://{}", mirror_root.display()));
        let mirror = FallbackMirror::from_config(&config).unwrap();
        let source = FileSource {
            url: "https://unreachable.invalid/stb/stb_image.h".to_string(),
            sha1: Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string()),
            user_agent: None,
        };

        let path = mirror.fetch_file(&source).unwrap();
        assert_eq!(path, config.archive_dir.join("stb_image.h"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ssh_mirror_fetch_uses_configured_scp() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("scp.log");
        let scp = temp.path().join("fake-scp");
        std::fs::write(
            &scp,
            format!(
                "#!/bin/sh\necho \"$@\" > '{}'\nfor last; do :; done\nprintf 'hello world' > \"$last\"\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&scp, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::new(temp.path().join("base"))
            .with_fallback_url("ssh://mirror.example.com/srv/deps");
        config.tools.scp = scp;
        let mirror = FallbackMirror::from_config(&config).unwrap();
        let source = FileSource {
            url: "https://unreachable.invalid/stb/stb_image.h".to_string(),
            sha1: Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string()),
            user_agent: None,
        };

        let path = mirror.fetch_file(&source).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
        assert!(
            std::fs::read_to_string(&log)
                .unwrap()
                .contains("mirror.example.com:/srv/deps/archives/stb_image.h")
        );
    }
}
