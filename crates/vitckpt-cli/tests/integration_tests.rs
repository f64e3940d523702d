use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const TINY: &str = r#"
[model]
img_size = 56
embed_dim = 8
depths = [2, 2]
num_heads = [2, 4]
num_classes = 10
"#;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("vitckpt").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vision transformer checkpoint tools"));
}

#[test]
fn test_cli_init_and_inspect() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("tiny.toml");
    let weights = dir.path().join("tiny.pth");
    fs::write(&config, TINY).unwrap();

    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("init")
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&weights)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("inspect")
        .arg(&weights)
        .assert()
        .success()
        .stdout(predicate::str::contains("Keys: model"))
        .stdout(predicate::str::contains("layers.0.blocks.0.attn.relative_position_bias_table"))
        .stdout(predicate::str::contains("[169, 2]"));

    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("inspect")
        .arg("--json")
        .arg(&weights)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"head.bias\""));
}

#[test]
fn test_cli_list_empty() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("list")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No checkpoints"));
}

#[test]
fn test_cli_adapt() {
    let dir = tempdir().unwrap();
    let pretrained_dir = dir.path().join("pretrained");
    fs::create_dir_all(&pretrained_dir).unwrap();

    let source_config = dir.path().join("source.toml");
    fs::write(&source_config, TINY).unwrap();
    Command::cargo_bin("vitckpt")
        .unwrap()
        .args(["init", "--config"])
        .arg(&source_config)
        .arg("--output")
        .arg(pretrained_dir.join("tiny.safetensors"))
        .assert()
        .success();

    let target_config = dir.path().join("target.toml");
    fs::write(
        &target_config,
        format!(
            "[checkpoint]\npretrained_path = {:?}\npretrained_model = \"tiny.safetensors\"\n{}",
            pretrained_dir.display().to_string(),
            TINY.replace("img_size = 56", "img_size = 112\nwindow_size = 14")
                .replace("num_classes = 10", "num_classes = 5")
        ),
    )
    .unwrap();
    let output = dir.path().join("adapted.pth");

    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("adapt")
        .arg("--config")
        .arg(&target_config)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Resized: 4"))
        .stdout(predicate::str::contains("Head: Reinitialized"));

    assert!(output.exists());
}

#[test]
fn test_cli_inspect_missing_file() {
    Command::cargo_bin("vitckpt")
        .unwrap()
        .arg("inspect")
        .arg("/nonexistent/ckpt_epoch_1.pth")
        .assert()
        .failure();
}
