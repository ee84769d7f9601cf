//! Command line behaviour of `arki-mergeconf` and `arki-server` argument
//! handling.

#![allow(deprecated)]

mod common;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::{MockEngine, TestServer, FIXTURE_CONFIG};

fn mergeconf() -> Command {
    Command::cargo_bin("arki-mergeconf").unwrap()
}

fn write(dir: &TempDir, name: &str, text: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn test_merge_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.conf", "[ds1]\npath=/tmp/ds1\n[common]\npath=/tmp/common1\n");
    let b = write(&dir, "b.conf", "[ds2]\npath=/tmp/ds2\n[common]\npath=/tmp/common2\n");

    mergeconf()
        .args(["-C", &a, "-C", &b])
        .assert()
        .success()
        .stdout(
            "[common]\nname = common\npath = /tmp/common1\n\n\
             [ds1]\nname = ds1\npath = /tmp/ds1\n\n\
             [ds2]\nname = ds2\npath = /tmp/ds2\n",
        )
        .stderr(predicate::str::contains(
            "ignoring dataset common in /tmp/common2, which has the same name as the dataset in /tmp/common1",
        ));

    mergeconf()
        .args(["-C", &b, "-C", &a])
        .assert()
        .success()
        .stdout(predicate::str::contains("path = /tmp/common2\n"));
}

#[test]
fn test_merge_from_stdin() {
    mergeconf()
        .args(["-C", "-"])
        .write_stdin("[test80]\npath = /srv/test80\n")
        .assert()
        .success()
        .stdout("[test80]\nname = test80\npath = /srv/test80\n");
}

#[test]
fn test_dataset_directory_source() {
    let dir = tempfile::tempdir().unwrap();
    let ds = dir.path().join("test200");
    std::fs::create_dir(&ds).unwrap();
    std::fs::write(ds.join("config"), "type = iseg\nstep = daily\nformat = grib\n").unwrap();
    let abs = std::path::absolute(&ds).unwrap();

    mergeconf()
        .arg(ds.as_os_str())
        .assert()
        .success()
        .stdout(format!(
            "[test200]\nformat = grib\nname = test200\npath = {}\nstep = daily\ntype = iseg\n",
            abs.display()
        ));
}

#[test]
fn test_restrict_and_system_datasets() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(&dir, "fixture.conf", FIXTURE_CONFIG);

    mergeconf()
        .args(["--restrict", "test,other", "-C", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::contains("[test200]\n"))
        .stdout(predicate::str::contains("[test80]").not())
        .stdout(predicate::str::contains("[error]").not());

    mergeconf()
        .args(["--ignore-system-datasets", "-C", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::contains("[test200]\n"))
        .stdout(predicate::str::contains("[test80]\n"))
        .stdout(predicate::str::contains("[error]").not());

    mergeconf()
        .args(["--restrict", "nobody", "-C", &cfg])
        .assert()
        .failure()
        .stderr(predicate::str::contains("none of the configuration provided were useable"));
}

#[test]
fn test_no_sources() {
    mergeconf()
        .assert()
        .failure()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            "you need to specify at least one config file or dataset",
        ));
}

#[test]
fn test_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(&dir, "in.conf", "[ds]\npath = /srv/ds\n");
    let out = dir.path().join("out.conf");

    mergeconf()
        .args(["-C", &cfg, "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout("");
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "[ds]\nname = ds\npath = /srv/ds\n"
    );
}

#[cfg(unix)]
fn fake_dump(dir: &Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-arki-dump");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         if [ \"$1\" = \"--query\" ]; then\n\
           case \"$2\" in\n\
             *:*) echo \"$2\"; exit 0;;\n\
             *) echo \"cannot parse matcher subexpression '$2' does not contain a colon (':')\" >&2; exit 1;;\n\
           esac\n\
         fi\n\
         exit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let settings = dir.join("settings.toml");
    std::fs::write(
        &settings,
        format!("[engine]\ndump_command = \"{}\"\n", script.display()),
    )
    .unwrap();
    settings.display().to_string()
}

#[cfg(unix)]
#[test]
fn test_validation_reports_every_failure() {
    let dir = tempfile::tempdir().unwrap();
    let settings = fake_dump(dir.path());
    let cfg = write(
        &dir,
        "filters.conf",
        "[bad1]\nfilter = MISCHIEF\n\n[bad2]\nfilter = TROUBLE\n\n[good]\nfilter = origin:GRIB1\n",
    );

    mergeconf()
        .args(["--settings", &settings, "-C", &cfg])
        .assert()
        .failure()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            "bad1: cannot parse matcher subexpression 'MISCHIEF' does not contain a colon (':')",
        ))
        .stderr(predicate::str::contains(
            "bad2: cannot parse matcher subexpression 'TROUBLE' does not contain a colon (':')",
        ))
        .stderr(predicate::str::contains("Some input files did not validate."))
        .stderr(predicate::str::contains("good:").not());

    let cfg = write(&dir, "ok.conf", "[good]\nfilter = origin:GRIB1\n");
    mergeconf()
        .args(["--settings", &settings, "-C", &cfg])
        .assert()
        .success()
        .stdout("[good]\nfilter = origin:GRIB1\nname = good\n");
}

#[test]
fn test_server_rejects_conflicting_bind_arguments() {
    Command::cargo_bin("arki-server")
        .unwrap()
        .args(["--bind", "127.0.0.1:0", "--port", "1", "-C", "whatever.conf"])
        .assert()
        .failure()
        .code(2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_merge_remote_server() {
    let server = TestServer::start(MockEngine::fixture(), FIXTURE_CONFIG).await;
    let url = server.url.clone();

    let output = tokio::task::spawn_blocking(move || {
        mergeconf()
            .args(["--ignore-system-datasets", &url])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("[test200]\n"));
    assert!(text.contains(&format!("path = {}/dataset/test200\n", server.url)));
    assert!(text.contains(&format!("server = {}\n", server.url)));
    assert!(text.contains("type = remote\n"));
    assert!(!text.contains("[error]"));
}
