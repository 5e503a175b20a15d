//! Drives a whole local batch against a fake compute binary

#![cfg(unix)]

use batchfit_core::fs::{FileSystem, OsFileSystem};
use batchfit_runner::resolver::resolve_arguments;
use batchfit_runner::{ConfigOverrides, DescriptorBuilder, JobManager, LocalExecutionService};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const FAKE_BINARY: &str = r#"#!/bin/bash
job="$1"
for a in "$@"; do
  case "$a" in
    *.lst) report="$a" ;;
  esac
done
if grep -q FAIL "$job"; then
  echo "model failed to converge" >&2
  exit 1
fi
echo "report for $job" > "$report"
touch FCON FDATA sdtab
mkdir -p temp_dir
"#;

fn write_config(dir: &Path, home: &Path) {
    let yaml = format!(
        "versions:\n  fake:\n    home: {}\n    executable: fit\n    default: true\ncopyLvl: 1\nthreads: 2\n",
        home.display()
    );
    fs::write(dir.join("batchfit.yaml"), yaml).unwrap();
}

fn install_binary(home: &Path) {
    let binary = home.join("run").join("fit");
    fs::create_dir_all(binary.parent().unwrap()).unwrap();
    fs::write(&binary, FAKE_BINARY).unwrap();
    fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_local_batch_end_to_end() {
    let root = tempdir().unwrap();
    let models = root.path().join("models");
    let home = root.path().join("home");
    fs::create_dir_all(&models).unwrap();
    install_binary(&home);
    write_config(root.path(), &home);

    fs::write(root.path().join("acop.csv"), "ID,TIME,DV\n1,0,0\n").unwrap();
    for name in ["run001.mod", "run002.mod"] {
        fs::write(
            models.join(name),
            "$PROB ok\n$DATA ../acop.csv IGNORE=@\n$TABLE ID FILE=sdtab\n",
        )
        .unwrap();
    }
    fs::write(models.join("run003.mod"), "$PROB FAIL\n$DATA ../acop.csv\n").unwrap();

    // Leftovers from an earlier run make run004 conflict
    fs::write(models.join("run004.mod"), "$PROB ok\n").unwrap();
    fs::create_dir_all(models.join("run004")).unwrap();
    fs::write(models.join("run004").join("run004.lst"), "old").unwrap();

    let fs_impl: Arc<dyn FileSystem> = Arc::new(OsFileSystem);
    let args = vec![
        models.join("run[001:004].mod").display().to_string(),
        models.join("absent.mod").display().to_string(),
    ];
    let paths = resolve_arguments(&args, fs_impl.as_ref());
    assert_eq!(paths.len(), 5);

    let mut builder = DescriptorBuilder::new(
        Arc::clone(&fs_impl),
        ConfigOverrides::default(),
        root.path().to_path_buf(),
    );
    let jobs = builder.build_all(&paths).unwrap();
    let threads = jobs[0].configuration.as_ref().unwrap().threads;
    assert_eq!(threads, 2);
    assert_eq!(jobs[0].data_path, Some(models.join("../acop.csv")));
    assert!(jobs[0].data_hash.is_some());

    let service = Arc::new(LocalExecutionService::new(Arc::clone(&fs_impl)));
    let result = JobManager::new(threads).run(jobs, service).await;

    assert_eq!(result.completed, 2);
    assert_eq!(result.errors, 3);
    assert_eq!(result.cancelled, 0);

    let failed: Vec<&str> = result.failures.iter().map(|f| f.job.as_str()).collect();
    assert!(failed.contains(&"run003.mod"));
    assert!(failed.contains(&"run004.mod"));
    assert!(failed.iter().any(|job| job.ends_with("absent.mod")));

    let run003 = result
        .failures
        .iter()
        .find(|f| f.job == "run003.mod")
        .unwrap();
    assert_eq!(run003.cause.as_deref(), Some("model failed to converge"));

    // Staged copy points one level further up
    let staged = fs::read_to_string(models.join("run001").join("run001.mod")).unwrap();
    assert!(staged.contains("$DATA ../../acop.csv IGNORE=@"));

    // Results copied back, scratch cleaned
    assert!(models.join("run001.lst").exists());
    assert!(models.join("run001.sh").exists());
    assert!(models.join("sdtab").exists());
    assert!(!models.join("run001").join("FCON").exists());
    assert!(!models.join("run001").join("temp_dir").exists());
    assert!(models.join("run001").join("batchfit.yaml").exists());

    // The conflicting directory was left alone
    assert_eq!(
        fs::read_to_string(models.join("run004").join("run004.lst")).unwrap(),
        "old"
    );
}
