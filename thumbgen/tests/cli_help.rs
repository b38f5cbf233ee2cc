use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn help_lists_subcommands_and_flags() {
    let mut cmd = cargo_bin_cmd!("thumbgen");
    let output = cmd
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for needle in ["watch", "regenerate", "gc", "check-config", "--upload-dir", "--config"] {
        assert!(text.contains(needle), "help missing {needle}");
    }
}

#[test]
fn check_config_prints_effective_values() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");

    let mut cmd = cargo_bin_cmd!("thumbgen");
    let output = cmd
        .current_dir(dir.path())
        .env_remove("THUMBGEN_CONFIG")
        .env_remove("THUMBGEN_SIZES")
        .env_remove("THUMBGEN_SIZES_JSON")
        .env("THUMBGEN_JPEG_QUALITY", "85")
        .arg("--upload-dir")
        .arg(&uploads)
        .arg("check-config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("jpeg_quality = 85"), "{text}");
    assert!(text.contains("320x200"), "{text}");
    assert!(uploads.is_dir());
}

#[test]
fn env_file_flag_supplies_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join("thumbgen.env");
    std::fs::write(&env_file, "THUMBGEN_JPEG_QUALITY=91\n").unwrap();

    let mut cmd = cargo_bin_cmd!("thumbgen");
    let output = cmd
        .current_dir(dir.path())
        .env_remove("THUMBGEN_CONFIG")
        .env_remove("THUMBGEN_JPEG_QUALITY")
        .env_remove("THUMBGEN_SIZES")
        .env_remove("THUMBGEN_SIZES_JSON")
        .arg("--env-file")
        .arg(&env_file)
        .arg("--upload-dir")
        .arg(dir.path().join("uploads"))
        .arg("check-config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("jpeg_quality = 91"), "{text}");
}

#[test]
fn invalid_configuration_fails_fast() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = cargo_bin_cmd!("thumbgen");
    cmd.current_dir(dir.path())
        .env_remove("THUMBGEN_SIZES_JSON")
        .env("THUMBGEN_SIZES", "320x0")
        .arg("--upload-dir")
        .arg(dir.path().join("uploads"))
        .arg("check-config")
        .assert()
        .failure();
}

#[test]
fn gc_subcommand_removes_orphans_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(uploads.join("320x200")).unwrap();
    std::fs::write(uploads.join("320x200/orphan.jpg"), b"stale").unwrap();

    let mut cmd = cargo_bin_cmd!("thumbgen");
    cmd.current_dir(dir.path())
        .env_remove("THUMBGEN_CONFIG")
        .env_remove("THUMBGEN_SIZES_JSON")
        .env("THUMBGEN_SIZES", "320x200")
        .arg("--upload-dir")
        .arg(&uploads)
        .arg("gc")
        .assert()
        .success();

    assert!(!uploads.join("320x200/orphan.jpg").exists());
}
