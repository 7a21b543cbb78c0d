//! Post-processing of acquired libraries: patches and scripts
//!
//! Patch and script files live in the `patches/` directory under the base
//! directory. A patch is dry-run first, in text mode and then in binary mode,
//! and only applied for real with the arguments whose dry run succeeded.

use crate::config::Config;
use crate::core::output;
use crate::error::{BootstrapError, Result};
use crate::helpers::cmd::ToolCmd;
use std::path::{Path, PathBuf};

/// Environment variables passed to post-processing scripts
pub const ENV_LIBRARY_DIR: &str = "BOOTSTRAP_LIBRARY_DIR";
pub const ENV_LIBRARY_NAME: &str = "BOOTSTRAP_LIBRARY_NAME";
pub const ENV_BASE_DIR: &str = "BOOTSTRAP_BASE_DIR";

pub struct PostProcessor<'a> {
    config: &'a Config,
}

impl<'a> PostProcessor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Absolute path of a file in the patches directory. `patch -d` changes
    /// directory before reading its input.
    fn resolve(&self, file: &str) -> Result<PathBuf> {
        let path = std::path::absolute(self.config.patches_dir.join(file))?;
        if !path.is_file() {
            return Err(BootstrapError::post_process(format!(
                "{} not found",
                path.display()
            )));
        }
        Ok(path)
    }

    fn patch_cmd(&self, workspace: &Path, pnum: u32, binary: bool) -> ToolCmd {
        let mut cmd = ToolCmd::new(&self.config.tools.patch)
            .arg("-d")
            .arg(workspace)
            .arg(format!("-p{}", pnum))
            .arg("--forward");
        if binary {
            cmd = cmd.arg("--binary");
        }
        cmd.timeout(self.config.command_timeout)
    }

    /// Apply `file` to `workspace`, stripping `pnum` leading path components.
    pub fn apply_patch(&self, file: &str, pnum: u32, workspace: &Path) -> Result<()> {
        let patch = self.resolve(file)?;
        output::detail(&format!("applying patch {}", file));

        let dry_run = |binary: bool| {
            self.patch_cmd(workspace, pnum, binary)
                .args(["--dry-run", "-i"])
                .arg(&patch)
                .quiet(true)
                .succeeds()
        };

        let binary = if dry_run(false)? {
            false
        } else if dry_run(true)? {
            tracing::debug!("{} only applies in binary mode", file);
            true
        } else {
            return Err(BootstrapError::post_process(format!(
                "patch {} does not apply to {}; has it already been applied?",
                file,
                workspace.display()
            )));
        };

        self.patch_cmd(workspace, pnum, binary)
            .arg("-i")
            .arg(&patch)
            .quiet(!self.config.debug_output)
            .run()
            .map_err(|e| match e {
                BootstrapError::CommandFailed { cmd, .. } => {
                    BootstrapError::post_process(format!("{} failed", cmd))
                }
                other => other,
            })
    }

    /// Run `file` with `workspace` as working directory.
    ///
    /// `.py` scripts go through python, `.sh` scripts through `sh`; any
    /// other file is executed directly.
    pub fn run_script(&self, file: &str, name: &str, workspace: &Path) -> Result<()> {
        let script = self.resolve(file)?;
        output::detail(&format!("running script {}", file));

        let cmd = match script.extension().and_then(|e| e.to_str()) {
            Some("py") => ToolCmd::new(&self.config.tools.python).arg(&script),
            Some("sh") => ToolCmd::new("sh").arg(&script),
            _ => ToolCmd::new(&script),
        };

        cmd.dir(workspace)
            .env(ENV_LIBRARY_DIR, workspace)
            .env(ENV_LIBRARY_NAME, name)
            .env(ENV_BASE_DIR, &self.config.base_dir)
            .timeout(self.config.command_timeout)
            .run()
            .map_err(|e| match e {
                BootstrapError::CommandFailed { cmd, code } => BootstrapError::post_process(
                    format!("script {} exited with {:?}", cmd, code),
                ),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::tools::Tools;

    const PATCH: &str = "\
--- a/hello.txt
+++ b/hello.txt
@@ -1 +1 @@
-hello
+hello patched
";

    fn setup() -> (tempfile::TempDir, Config, PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::new(temp.path()).with_tools(Tools::default());
        std::fs::create_dir_all(&config.patches_dir).unwrap();
        let workspace = config.library_dir("hello");
        std::fs::create_dir_all(&workspace).unwrap();
        (temp, config, workspace)
    }

    #[test]
    fn test_patch_applies_once() {
        if which::which("patch").is_err() {
            eprintln!("patch not installed, skipping");
            return;
        }
        let (_temp, config, workspace) = setup();
        std::fs::write(config.patches_dir.join("hello.patch"), PATCH).unwrap();
        std::fs::write(workspace.join("hello.txt"), "hello\n").unwrap();

        let post = PostProcessor::new(&config);
        post.apply_patch("hello.patch", 1, &workspace).unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.join("hello.txt")).unwrap(),
            "hello patched\n"
        );

        let err = post.apply_patch("hello.patch", 1, &workspace).unwrap_err();
        assert!(matches!(err, BootstrapError::PostProcess(ref m) if m.contains("already")));
        assert_eq!(
            std::fs::read_to_string(workspace.join("hello.txt")).unwrap(),
            "hello patched\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_patch_retries_in_binary_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, mut config, workspace) = setup();
        let log = temp.path().join("patch.log");
        let stub = temp.path().join("patch");
        // Only succeeds when given --binary, like a CRLF patch on Windows
        std::fs::write(
            &stub,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\ncase \" $* \" in *\" --binary \"*) exit 0;; esac\nexit 1\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        config.tools.patch = stub;
        std::fs::write(config.patches_dir.join("crlf.patch"), PATCH).unwrap();

        PostProcessor::new(&config)
            .apply_patch("crlf.patch", 1, &workspace)
            .unwrap();

        let ws = workspace.display();
        let patch = config.patches_dir.join("crlf.patch");
        let patch = patch.display();
        let calls: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(
            calls,
            [
                format!("-d {ws} -p1 --forward --dry-run -i {patch}"),
                format!("-d {ws} -p1 --forward --binary --dry-run -i {patch}"),
                format!("-d {ws} -p1 --forward --binary -i {patch}"),
            ]
        );
    }

    #[test]
    fn test_missing_patch_file() {
        let (_temp, config, workspace) = setup();
        let err = PostProcessor::new(&config)
            .apply_patch("nope.patch", 3, &workspace)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::PostProcess(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_script_gets_environment() {
        let (_temp, config, workspace) = setup();
        std::fs::write(
            config.patches_dir.join("setup.sh"),
            "echo \"$BOOTSTRAP_LIBRARY_NAME\" > generated.txt\n",
        )
        .unwrap();

        PostProcessor::new(&config)
            .run_script("setup.sh", "hello", &workspace)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(workspace.join("generated.txt"))
                .unwrap()
                .trim(),
            "hello"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_script_is_post_process_error() {
        let (_temp, config, workspace) = setup();
        std::fs::write(config.patches_dir.join("fail.sh"), "exit 3\n").unwrap();

        let err = PostProcessor::new(&config)
            .run_script("fail.sh", "hello", &workspace)
            .unwrap_err();
        assert!(matches!(err, BootstrapError::PostProcess(_)), "got {err:?}");
    }
}
