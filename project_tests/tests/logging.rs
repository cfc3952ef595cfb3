use std::fs;

use lib_pvcore::loggers::setup_logging;
use tempfile::tempdir;

#[test]
fn test_setup_logging_writes_file_and_prunes_old_logs() {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let log_dir = temp_dir.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();
    fs::write(log_dir.join("pv_monitor_old1.log"), "old").unwrap();
    fs::write(log_dir.join("pv_monitor_old2.log"), "old").unwrap();

    let log_path = setup_logging(&log_dir, "pv_monitor", "debug").expect("logger installs");
    log::info!("monitor started");
    log::debug!("subscribing to loc://x");
    log::trace!("not written at debug level");
    log::logger().flush();

    let contents = fs::read_to_string(&log_path).expect("log file exists");
    assert!(contents.contains("[INFO] monitor started"));
    assert!(contents.contains("[DEBUG] subscribing to loc://x"));
    assert!(!contents.contains("not written"));

    let remaining = fs::read_dir(&log_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .count();
    assert_eq!(remaining, 2, "one previous log plus the new one");
}
