use assert_cmd::Command;
use predicates::prelude::*;
use quadmpc::checkpoint::save_to_path;
use quadmpc::prelude::*;
use quadmpc::utils::seeded_rng;

fn quadmpc() -> Command {
    let mut cmd = Command::cargo_bin("quadmpc").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    quadmpc()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("model-based quadrotor control"));
}

#[test]
fn test_cli_list() {
    quadmpc()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Available environments:"))
        .stdout(predicate::str::contains("quadrotor"))
        .stdout(predicate::str::contains("point_mass"));
}

#[test]
fn test_cli_random_collect_writes_paths() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("paths.json");
    quadmpc()
        .args(["collect", "--env", "point_mass", "--random", "--seed", "1"])
        .args(["--samples", "50", "--num-envs", "2"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Collection summary"));

    let paths: Vec<Path> = serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert!(paths.iter().map(Path::len).sum::<usize>() >= 50);
}

#[test]
fn test_cli_planner_collect_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("experiment.json");
    std::fs::write(
        &config,
        r#"{"env_name": "quadrotor", "hidden_layers": [16], "max_path_length": 3, "horizon": 3, "candidates": 16}"#,
    )
    .unwrap();

    quadmpc()
        .args(["collect", "--seed", "3", "--samples", "4", "--num-envs", "2"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("untrained model"))
        .stdout(predicate::str::contains("Created planner"))
        .stdout(predicate::str::contains("Collection summary"));
}

#[test]
fn test_cli_eval_with_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("dynamics.json");
    let shape = HistoryShape::new(6, 3, 2).unwrap();
    let model = MlpDynamics::new(shape, &[8], PredictionTarget::Delta, &mut seeded_rng(Some(0)))
        .with_normalization(Normalization::identity(shape.flat_width()))
        .unwrap();
    save_to_path(&model, &checkpoint).unwrap();

    let save_dir = dir.path().join("eval");
    quadmpc()
        .args(["eval", "--env", "point_mass", "--seed", "2"])
        .arg("--checkpoint")
        .arg(&checkpoint)
        .args(["--episodes", "2", "--max-path-length", "5"])
        .args(["--horizon", "3", "--candidates", "8"])
        .args(["--target", "0,0,0", "--start", "0.5,-0.5,0"])
        .env("QUADMPC_NSTACK", "2")
        .arg("--save-dir")
        .arg(&save_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Starting evaluation"))
        .stdout(predicate::str::contains("Evaluation complete"));
    assert!(save_dir.join("paths.json").exists());
}

#[test]
fn test_cli_eval_rejects_mismatched_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("dynamics.json");
    let shape = HistoryShape::new(6, 3, 1).unwrap();
    let model = MlpDynamics::new(shape, &[4], PredictionTarget::Delta, &mut seeded_rng(Some(0)));
    save_to_path(&model, &checkpoint).unwrap();

    quadmpc()
        .args(["eval", "--env", "quadrotor", "--episodes", "1"])
        .arg("--checkpoint")
        .arg(&checkpoint)
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint was built for"));
}

#[test]
fn test_cli_unknown_env_fails() {
    quadmpc()
        .args(["collect", "--env", "cartwheel", "--random", "--samples", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown environment"));
}
