//! Argument parsing and end-to-end runs of the offline subcommands.

use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use beatguard::cli::{BeatsCommand, Cli, Commands, FallbackArgs, PlanArgs};
use beatguard::core::fallback::OpeningMode;
use beatguard::core::model::BeatStatus;
use beatguard::core::planner::PersistPolicy;
use clap::Parser;
use predicates::prelude::*;
use serde_json::Value;

/// `bgd` run from an empty directory so no stray config is picked up
fn bgd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bgd").expect("bin");
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn plan_flag_parsing() {
    // Given
    let argv = ["bgd", "--dry-run", "plan", "--project", "p1", "--chapter", "c3", "--persist", "append", "--local-only"];

    // When
    let cli = Cli::parse_from(argv);

    // Then
    assert!(cli.dry_run);
    match cli.command {
        Commands::Plan(PlanArgs { project, chapter, persist, local_only, json }) => {
            assert_eq!(project, "p1");
            assert_eq!(chapter, "c3");
            assert_eq!(persist, Some(PersistPolicy::Append));
            assert!(local_only);
            assert!(!json);
        }
        _ => panic!("expected Plan command"),
    }
}

#[test]
fn names_are_comma_separated() {
    let cli = Cli::parse_from(["bgd", "sanitize", "--current", "a", "--next", "b", "--names", "李明,王芳"]);
    match cli.command {
        Commands::Sanitize(args) => assert_eq!(args.names, vec!["李明", "王芳"]),
        _ => panic!("expected Sanitize command"),
    }
}

#[test]
fn fallback_mode_requires_first() {
    assert!(Cli::try_parse_from(["bgd", "fallback", "--synopsis", "雨夜", "--mode", "cold-open"]).is_err());

    let cli = Cli::parse_from(["bgd", "fallback", "--synopsis", "雨夜", "--first", "--mode", "cold-open"]);
    match cli.command {
        Commands::Fallback(FallbackArgs { first, mode, .. }) => {
            assert!(first);
            assert_eq!(mode, Some(OpeningMode::ColdOpen));
        }
        _ => panic!("expected Fallback command"),
    }
}

#[test]
fn beats_status_parses_lifecycle_value() {
    let cli = Cli::parse_from(["bgd", "beats", "status", "--beat", "b7", "--status", "done"]);
    match cli.command {
        Commands::Beats(args) => match args.command {
            BeatsCommand::Status { beat, status } => {
                assert_eq!(beat, "b7");
                assert_eq!(status, BeatStatus::Done);
            }
            _ => panic!("expected status subcommand"),
        },
        _ => panic!("expected Beats command"),
    }
}

#[test]
fn similarity_prints_four_decimals() {
    let tmp = TempDir::new().unwrap();
    bgd(&tmp)
        .args(["similarity", "主角进入密室", "主角进入密室"])
        .assert()
        .success()
        .stdout("1.0000\n");
}

#[test]
fn sanitize_json_keeps_unrelated_synopsis() {
    let tmp = TempDir::new().unwrap();
    let out = bgd(&tmp)
        .args(["sanitize", "--current", "少年离家求学", "--next", "主角进入密室并找到钥匙", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["sanitized"], "少年离家求学");
    assert_eq!(v["removedCount"], 0);
}

#[test]
fn parse_reads_file_and_drops_chatter() {
    let tmp = TempDir::new().unwrap();
    let raw = tmp.child("raw.txt");
    raw.write_str("好的，以下是本章节拍\n1. 主角在书房发现一道暗门\n2. 您希望故事走向哪个方向？\n3. 主角决定明晚再探\n")
        .unwrap();

    bgd(&tmp)
        .args(["parse", "raw.txt"])
        .assert()
        .success()
        .stdout("主角在书房发现一道暗门\n主角决定明晚再探\n");
}

#[test]
fn check_json_flags_leaking_line() {
    let tmp = TempDir::new().unwrap();
    tmp.child("beats.txt")
        .write_str("主角在书房发现一道暗门\n主角进入密室并找到钥匙\n")
        .unwrap();

    let out = bgd(&tmp)
        .args(["check", "beats.txt", "--next", "主角进入密室并找到钥匙", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["violations"], serde_json::json!([2]));
    assert_eq!(v["lines"].as_array().map(Vec::len), Some(2));
}

#[test]
fn fallback_first_chapter_uses_opening_templates() {
    let tmp = TempDir::new().unwrap();
    bgd(&tmp)
        .args(["fallback", "--synopsis", "雨夜", "--first", "--mode", "protagonist-direct"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("主角在日常场景中登场"));
}

#[test]
fn init_writes_config_once() {
    let tmp = TempDir::new().unwrap();
    bgd(&tmp)
        .args(["init", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));
    tmp.child("beatguard.toml")
        .assert(predicate::str::contains("base_url"));

    // Second run refuses without --force
    bgd(&tmp).args(["init", "."]).assert().failure();
}

#[test]
fn completions_to_stdout() {
    let tmp = TempDir::new().unwrap();
    bgd(&tmp)
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bgd"));
}

#[test]
fn bad_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    tmp.child("broken.toml").write_str("[backend\nbase_url = ").unwrap();
    bgd(&tmp)
        .args(["--config", "broken.toml", "similarity", "a", "b"])
        .assert()
        .failure();
}
