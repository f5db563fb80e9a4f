use std::{env, fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_viremia"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

fn setup_sim_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    test_dir
}

#[test]
fn treatment_workflow() {
    let config_contents = String::new()
        + "[model]\n"
        + "max_birth_prob = 0.1\n"
        + "clear_prob = 0.05\n"
        + "max_pop = 1000\n"
        + "\n"
        + "[model.resistance]\n"
        + "mut_prob = 0.005\n"
        + "resistances = { guttagonol = false }\n"
        + "\n"
        + "[init]\n"
        + "n_viruses = 100\n"
        + "seed = 2024\n"
        + "\n"
        + "[treatment]\n"
        + "prescriptions = [ { step = 150, drug = \"guttagonol\" } ]\n"
        + "tracked = [ [\"guttagonol\"] ]\n"
        + "strict = true\n"
        + "\n"
        + "[output]\n"
        + "n_steps = 300\n"
        + "n_trials = 4\n";

    let test_dir = setup_sim_dir("treatment_workflow", &config_contents);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "create", "--n-runs", "2"]);

    for run_idx in 0..3 {
        let trajectory_file = test_dir
            .join(format!("run-{run_idx:04}"))
            .join("trajectory.msgpack");
        assert!(trajectory_file.is_file(), "missing {trajectory_file:?}");
    }
    assert!(!test_dir.join("run-0003").exists());

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    assert!(test_dir.join("results.msgpack").is_file());

    run_bin(&["--sim-dir", test_dir_str, "clean"]);

    assert!(!test_dir.join("run-0000").exists());
    assert!(!test_dir.join("run-0002").exists());
    assert!(!test_dir.join("results.msgpack").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn untreated_workflow() {
    let config_contents = String::new()
        + "[model]\n"
        + "max_birth_prob = 0.1\n"
        + "clear_prob = 0.05\n"
        + "max_pop = 1000\n"
        + "\n"
        + "[init]\n"
        + "n_viruses = 100\n"
        + "\n"
        + "[output]\n"
        + "n_steps = 300\n"
        + "n_trials = 3\n";

    let test_dir = setup_sim_dir("untreated_workflow", &config_contents);
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "analyze"]);
    run_bin(&["--sim-dir", test_dir_str, "clean"]);

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let config_contents = String::new()
        + "[model]\n"
        + "max_birth_prob = 0.1\n"
        + "clear_prob = 0.05\n"
        + "max_pop = 0\n"
        + "\n"
        + "[init]\n"
        + "n_viruses = 100\n"
        + "\n"
        + "[output]\n"
        + "n_steps = 300\n"
        + "n_trials = 3\n";

    let test_dir = setup_sim_dir("invalid_config_fails", &config_contents);

    let output = Command::new(env!("CARGO_BIN_EXE_viremia"))
        .args(["--sim-dir", test_dir.to_str().expect("invalid path"), "create"])
        .output()
        .expect("failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid maximum population"));

    fs::remove_dir_all(&test_dir).ok();
}
