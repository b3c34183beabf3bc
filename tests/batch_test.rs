mod common;

use common::{descriptor_json, servers, MemoryServers, Op};
use pretty_assertions::assert_eq;
use remotefs::batch::DEFAULT_PACING;
use remotefs::model::{BatchConfig, BatchItem};
use remotefs::{BatchEngine, FileEncoding, FileOps, FilterKind, RemoteFsError};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn engine(servers: &Arc<MemoryServers>) -> BatchEngine {
    BatchEngine::new(FileOps::new(servers.clone())).with_pacing(Duration::ZERO)
}

fn tracked_config() -> BatchConfig {
    BatchConfig {
        enabled: true,
        use_config_server: true,
        config_server: descriptor_json("cfg.example"),
        config_path: "/config".to_string(),
        ..BatchConfig::default()
    }
}

fn item(guid: &str) -> BatchItem {
    BatchItem {
        object_guid: guid.to_string(),
        source_server: descriptor_json("src.example"),
        source_path: "/in".to_string(),
        source_filter_type: FilterKind::Wildcard,
        source_filter_pattern: "*.txt".to_string(),
        source_encoding: FileEncoding::Utf8,
        destination_server: descriptor_json("dst.example"),
        destination_path: "/out".to_string(),
        destination_filename: "{source_filename}_{guid}_{incremental}.{source_extension}".to_string(),
        destination_encoding: FileEncoding::Utf8,
        overwrite: false,
        delete_source: false,
    }
}

#[rstest]
#[tokio::test]
async fn test_counter_increases_by_one_per_run(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"alpha");
    let config = servers.server("cfg.example");

    for run in 1..=3u64 {
        engine(&servers).run(&tracked_config(), &[item("G1")]).await.unwrap();
        assert_eq!(config.get_text("/config/G1.json").unwrap(), run.to_string());
    }

    let destination = servers.server("dst.example");
    assert!(destination.exists("/out/a_G1_0.txt"));
    assert!(destination.exists("/out/a_G1_1.txt"));
    assert!(destination.exists("/out/a_G1_2.txt"));
}

#[rstest]
#[tokio::test]
async fn test_counter_increases_even_without_files(servers: Arc<MemoryServers>) {
    servers.server("src.example").mkdir("/in");
    servers.server("cfg.example").put("/config/G1.json", b"41\n");

    let results = engine(&servers).run(&tracked_config(), &[item("G1")]).await.unwrap();

    assert_eq!(results.count, 0);
    assert_eq!(servers.server("cfg.example").get_text("/config/G1.json").unwrap(), "42");
}

#[rstest]
#[tokio::test]
async fn test_one_bad_file_does_not_stop_the_others(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/1.txt", b"one");
    source.put("/in/2.txt", b"two");
    source.put("/in/3.txt", b"three");
    source.fail(Op::Read, "2.txt", usize::MAX);

    let results = engine(&servers).run(&tracked_config(), &[item("G1")]).await.unwrap();

    assert_eq!(results.count, 3);
    let outcomes: Vec<bool> = results.results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, vec![true, false, true]);
    assert!(results.results[1].message.contains("injected fault"));
    assert!(results.results[0].message.is_empty());
    assert_eq!(servers.server("cfg.example").get_text("/config/G1.json").unwrap(), "1");
}

#[rstest]
#[tokio::test]
async fn test_result_paths_are_fully_qualified(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/report.txt", b"r");

    let results = engine(&servers).run(&tracked_config(), &[item("G7")]).await.unwrap();
    let result = &results.results[0];

    assert_eq!(result.object_guid, "G7");
    assert_eq!(result.source_file, "svc@src.example/in/report.txt");
    assert_eq!(result.destination_file, "svc@dst.example/out/report_G7_0.txt");
}

#[rstest]
#[tokio::test]
async fn test_counter_without_config_server_starts_at_zero(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"a");
    let config = BatchConfig {
        enabled: true,
        ..BatchConfig::default()
    };

    let first = engine(&servers).run(&config, &[item("G1")]).await.unwrap();
    let second = engine(&servers).run(&config, &[item("G1")]).await.unwrap();

    assert!(first.results[0].success);
    // same name again, so the second transfer collides
    assert!(!second.results[0].success);
    assert!(servers.server("dst.example").exists("/out/a_G1_0.txt"));
    assert_eq!(servers.server("cfg.example").file_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_disabled_batch_touches_nothing(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"a");

    let config = BatchConfig {
        enabled: false,
        ..tracked_config()
    };
    let results = engine(&servers).run(&config, &[item("G1")]).await.unwrap();

    assert_eq!(results.count, 0);
    assert_eq!(servers.server("src.example").calls(Op::List), 0);
    assert_eq!(servers.server("dst.example").file_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_backups_go_to_server_and_subfolder(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"payload");
    let config = BatchConfig {
        backup_files: true,
        backup_server: descriptor_json("bak.example"),
        backup_path: "/archive".to_string(),
        backup_filename: "{source_filename}.{incremental}.bak".to_string(),
        backup_to_subfolder: true,
        backup_subfolder_name: "done".to_string(),
        ..tracked_config()
    };

    let results = engine(&servers).run(&config, &[item("G1")]).await.unwrap();

    assert!(results.results[0].success, "{}", results.results[0].message);
    assert_eq!(servers.server("bak.example").get_text("/archive/G1/a.0.bak").unwrap(), "payload");
    assert_eq!(servers.server("src.example").get_text("/in/done/a.0.bak").unwrap(), "payload");
    assert!(servers.server("dst.example").exists("/out/a_G1_0.txt"));
}

#[rstest]
#[tokio::test]
async fn test_backup_to_config_server(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"payload");
    let config = BatchConfig {
        backup_files: true,
        backup_to_config_server: true,
        backup_path: "/archive".to_string(),
        ..tracked_config()
    };

    engine(&servers).run(&config, &[item("G1")]).await.unwrap();

    // a blank backup template keeps the source name
    assert_eq!(servers.server("cfg.example").get_text("/archive/G1/a.txt").unwrap(), "payload");
}

#[rstest]
#[tokio::test]
async fn test_backup_failure_marks_file_but_keeps_destination(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"payload");
    let backup = servers.server("bak.example");
    backup.fail(Op::Write, "/archive", usize::MAX);
    let config = BatchConfig {
        backup_files: true,
        backup_server: descriptor_json("bak.example"),
        backup_path: "/archive".to_string(),
        ..tracked_config()
    };
    let mut transfer = item("G1");
    transfer.delete_source = true;

    let results = engine(&servers).run(&config, &[transfer]).await.unwrap();

    assert!(!results.results[0].success);
    assert!(servers.server("dst.example").exists("/out/a_G1_0.txt"));
    // the delete step is skipped once an earlier step failed
    assert!(servers.server("src.example").exists("/in/a.txt"));
}

#[rstest]
#[tokio::test]
async fn test_failed_source_delete_marks_file_but_keeps_destination(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    source.fail(Op::Delete, "a.txt", usize::MAX);
    let mut transfer = item("G1");
    transfer.delete_source = true;

    let results = engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert!(!results.results[0].success);
    assert!(results.results[0].message.contains("injected fault"));
    assert_eq!(servers.server("dst.example").get_text("/out/a_G1_0.txt").unwrap(), "a");
    assert!(source.exists("/in/a.txt"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_pacing_applies_between_items_only(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    let paced = BatchEngine::new(FileOps::new(servers.clone()));

    let started = Instant::now();
    paced.run(&tracked_config(), &[item("G1")]).await.unwrap();
    assert!(started.elapsed() < DEFAULT_PACING);

    let started = Instant::now();
    let results = paced
        .run(&tracked_config(), &[item("G2"), item("G3"), item("G4")])
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(results.count, 3);
    assert!(elapsed >= DEFAULT_PACING * 2, "{elapsed:?}");
    assert!(elapsed < DEFAULT_PACING * 3, "{elapsed:?}");
}

#[rstest]
#[tokio::test]
async fn test_delete_source_after_transfer(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    source.put("/in/keep.csv", b"c");
    let mut transfer = item("G1");
    transfer.delete_source = true;

    let results = engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert!(results.results[0].success);
    assert!(!source.exists("/in/a.txt"));
    assert!(source.exists("/in/keep.csv"));
}

#[rstest]
#[tokio::test]
async fn test_failed_write_keeps_source(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"new");
    servers.server("dst.example").put("/out/a_G1_0.txt", b"old");
    let mut transfer = item("G1");
    transfer.delete_source = true;

    let results = engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert!(!results.results[0].success);
    assert!(results.results[0].message.contains("already exists"));
    assert!(source.exists("/in/a.txt"));
    assert_eq!(servers.server("dst.example").get_text("/out/a_G1_0.txt").unwrap(), "old");
}

#[rstest]
#[tokio::test]
async fn test_destination_encoding_is_applied(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", "café".as_bytes());
    let mut transfer = item("G1");
    transfer.destination_encoding = FileEncoding::Latin1;

    engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert_eq!(
        servers.server("dst.example").get("/out/a_G1_0.txt").unwrap(),
        vec![b'c', b'a', b'f', 0xe9]
    );
}

#[rstest]
#[tokio::test]
async fn test_empty_destination_template_is_a_file_error(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"a");
    let mut transfer = item("G1");
    transfer.destination_filename = String::new();

    let results = engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert!(!results.results[0].success);
    assert_eq!(servers.server("dst.example").file_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_counter_infrastructure_failure_aborts_the_run(servers: Arc<MemoryServers>) {
    servers.server("src.example").put("/in/a.txt", b"a");
    servers.server("cfg.example").fail(Op::CreateDir, "/config", usize::MAX);

    let err = engine(&servers)
        .run(&tracked_config(), &[item("G1"), item("G2")])
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        RemoteFsError::BatchFatal { object_guid, stage: "config_dir", .. } if object_guid == "G1"
    ));
    assert_eq!(servers.server("dst.example").file_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_counter_write_failure_aborts_remaining_items(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    servers.server("cfg.example").fail(Op::Write, "G1.json", usize::MAX);

    let err = engine(&servers)
        .run(&tracked_config(), &[item("G1"), item("G2")])
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteFsError::BatchFatal { stage: "counter_write", .. }));
    // G1's file went through before the counter failed; G2 never ran
    assert!(servers.server("dst.example").exists("/out/a_G1_0.txt"));
    assert!(!servers.server("dst.example").exists("/out/a_G2_0.txt"));
}

#[rstest]
#[tokio::test]
async fn test_unresolvable_config_server_is_fatal(servers: Arc<MemoryServers>) {
    let config = BatchConfig {
        config_server: "{not json".to_string(),
        ..tracked_config()
    };

    let err = engine(&servers).run(&config, &[item("G1")]).await.unwrap_err();
    assert!(matches!(err, RemoteFsError::BatchFatal { stage: "config_resolve", .. }));
}

#[rstest]
#[tokio::test]
async fn test_items_run_in_order(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    let second = BatchItem {
        source_path: "/in2".to_string(),
        ..item("G2")
    };
    source.put("/in2/b.txt", b"b");

    let results = engine(&servers)
        .run(&tracked_config(), &[item("G1"), second])
        .await
        .unwrap();

    let guids: Vec<&str> = results.results.iter().map(|r| r.object_guid.as_str()).collect();
    assert_eq!(guids, vec!["G1", "G2"]);
    assert_eq!(servers.server("cfg.example").get_text("/config/G2.json").unwrap(), "1");
}

#[rstest]
#[tokio::test]
async fn test_transient_read_is_retried_with_descriptor_retries(servers: Arc<MemoryServers>) {
    let source = servers.server("src.example");
    source.put("/in/a.txt", b"a");
    source.fail(Op::Read, "a.txt", 2);
    let mut transfer = item("G1");
    transfer.source_server = serde_json::json!({
        "ConnectionType": "FTP",
        "Address": "src.example",
        "Username": "svc",
        "Retries": 2,
    })
    .to_string();

    let results = engine(&servers).run(&tracked_config(), &[transfer]).await.unwrap();

    assert!(results.results[0].success, "{}", results.results[0].message);
    assert_eq!(source.calls(Op::Read), 3);
}
