//! Integration tests for `textburn render` and `textburn check` against a
//! fake ffmpeg.

#![allow(deprecated)] // cargo_bin is deprecated but its replacement is not stable yet

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn textburn() -> Command {
    Command::cargo_bin("textburn").expect("binary 'textburn' should be built")
}

/// Scratch dir with a font, an input video and a config file pointing the
/// service at `ffmpeg_script`.
struct Env {
    dir: TempDir,
}

impl Env {
    fn new(ffmpeg_script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("font.ttf"), b"font").unwrap();
        std::fs::write(dir.path().join("in.mp4"), b"video").unwrap();

        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, format!("#!/bin/sh\n{ffmpeg_script}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let config = format!(
            "ffmpeg_path = {:?}\nfont_path = {:?}\ntemp_root = {:?}\n",
            ffmpeg.display().to_string(),
            dir.path().join("font.ttf").display().to_string(),
            dir.path().join("work").display().to_string(),
        );
        std::fs::write(dir.path().join("config.toml"), config).unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn render(&self, text: &str) -> Command {
        let mut cmd = textburn();
        cmd.env_remove("FFMPEG_BIN")
            .env_remove("OVERLAY_FONT_FILE")
            .env_remove("OVERLAY_TMP_DIR")
            .arg("render")
            .arg(self.path("in.mp4"))
            .arg(self.path("out.mp4"))
            .args(["--text", text, "--config"])
            .arg(self.path("config.toml"));
        cmd
    }

    fn workspaces_left(&self) -> usize {
        std::fs::read_dir(self.path("work")).map_or(0, Iterator::count)
    }
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

#[cfg(unix)]
#[test]
fn render_writes_output() {
    let env = Env::new("for last; do :; done\ncat \"$5\" > \"$last\"");

    env.render("Hello: World's [best] day\nEver")
        .assert()
        .success()
        .stderr(predicate::str::contains("Rendered"))
        .stderr(predicate::str::contains("ffmpeg:"));

    assert_eq!(read(&env.path("out.mp4")), b"video");
    assert_eq!(env.workspaces_left(), 0);
}

#[cfg(unix)]
#[test]
fn render_reports_ffmpeg_failure() {
    let env = Env::new("echo 'Invalid data found' >&2\nexit 1");

    env.render("hello")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ffmpeg exited with code 1"));

    assert!(!env.path("out.mp4").exists());
    assert_eq!(env.workspaces_left(), 0);
}

#[test]
fn render_rejects_long_text() {
    let env = Env::new("exit 0");

    env.render(&"x".repeat(301))
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum is 300"));

    assert!(!env.path("work").exists());
}

#[test]
fn render_missing_config_file_fails() {
    textburn()
        .args(["render", "in.mp4", "out.mp4", "--text", "hi", "--config"])
        .arg("/definitely/not/here/config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[cfg(unix)]
#[test]
fn check_reports_missing_font() {
    let env = Env::new("exit 0");
    std::fs::remove_file(env.path("font.ttf")).unwrap();

    textburn()
        .env_remove("FFMPEG_BIN")
        .env_remove("OVERLAY_FONT_FILE")
        .env_remove("OVERLAY_TMP_DIR")
        .args(["check", "--config"])
        .arg(env.path("config.toml"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("ffmpeg:"))
        .stdout(predicate::str::contains("font file not found"));
}
