//! End-to-end tests of cbuffctl subcommands against a scratch segment directory

use cbuff_shared_memory::{BufferOptions, CbuffError, SegmentInfo};
use cbuffctl::{Cli, Command, CtlConfig, CtlError, Settings, execute};
use clap::Parser;
use std::io::Write;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Parse `args` with `--shm-dir` pointed at the scratch directory and run them
    fn run(&self, args: &[&str]) -> Result<String, CtlError> {
        let shm_dir = self.dir.path().to_str().unwrap();
        let mut argv = vec!["cbuffctl", "--shm-dir", shm_dir];
        argv.extend_from_slice(args);

        let cli = Cli::try_parse_from(argv).unwrap();
        let settings = Settings::resolve(&cli, &CtlConfig::default());

        let mut out = Vec::new();
        execute(&cli.command, &settings, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }
}

#[test]
fn test_create_push_pop() {
    let h = Harness::new();

    let created = h.run(&["create", "b", "--length", "5"]).unwrap();
    assert_eq!(created, "SharedCircularBuffer (b)\n");

    h.run(&["push", "b", "50", "10", "20", "30"]).unwrap();
    assert_eq!(h.run(&["pop", "b"]).unwrap(), "50\n");
    assert_eq!(h.run(&["pop", "b", "-n", "3"]).unwrap(), "10\n20\n30\n");
    assert_eq!(h.run(&["pop", "b", "-n", "3"]).unwrap(), "");
}

#[test]
fn test_pop_json() {
    let h = Harness::new();
    h.run(&["create", "j", "-l", "4"]).unwrap();
    h.run(&["push", "j", "1", "2"]).unwrap();

    let out = h.run(&["pop", "j", "-n", "5", "--json"]).unwrap();
    let items: Vec<u8> = serde_json::from_str(&out).unwrap();
    assert_eq!(items, vec![1, 2]);
}

#[test]
fn test_create_uses_default_length() {
    let h = Harness::new();
    h.run(&["create", "d"]).unwrap();

    let out = h.run(&["info", "d", "--json"]).unwrap();
    let info: SegmentInfo = serde_json::from_str(&out).unwrap();
    assert_eq!(info.capacity, 2);
    assert_eq!(info.len, 0);
    assert!(!info.writer_attached, "create without --hold releases the role");
}

#[test]
fn test_push_overflow_keeps_accepted_items() {
    let h = Harness::new();
    h.run(&["create", "o", "--length", "2"]).unwrap();

    let err = h.run(&["push", "o", "1", "2", "3"]).unwrap_err();
    assert!(matches!(
        err,
        CtlError::Buffer(CbuffError::BufferFull { capacity: 2 })
    ));

    // The writer role was released despite the failure
    h.run(&["pop", "o", "-n", "2"]).unwrap();
    h.run(&["push", "o", "3"]).unwrap();
    assert_eq!(h.run(&["pop", "o"]).unwrap(), "3\n");
}

#[test]
fn test_push_refused_while_writer_active() {
    let h = Harness::new();
    let _writer = BufferOptions::new()
        .shm_dir(h.dir.path())
        .create("busy", 4)
        .unwrap();

    let err = h.run(&["push", "busy", "1"]).unwrap_err();
    assert!(matches!(
        err,
        CtlError::Buffer(CbuffError::WriterAlreadyActive { .. })
    ));
    assert!(matches!(
        h.run(&["destroy", "busy"]),
        Err(CtlError::Buffer(CbuffError::WriterAlreadyActive { .. }))
    ));
}

#[test]
fn test_info_text() {
    let h = Harness::new();
    h.run(&["create", "t", "--length", "3"]).unwrap();
    h.run(&["push", "t", "9"]).unwrap();

    let out = h.run(&["info", "t"]).unwrap();
    assert!(out.contains("name:     t\n"));
    assert!(out.contains("capacity: 3\n"));
    assert!(out.contains("items:    1\n"));
    assert!(out.contains("writer:   -\n"));
    assert!(out.contains("size:     35 bytes\n"));
}

#[test]
fn test_list() {
    let h = Harness::new();
    assert_eq!(h.run(&["list", "--json"]).unwrap().trim(), "[]");

    h.run(&["create", "beta", "-l", "3"]).unwrap();
    h.run(&["create", "alpha", "-l", "7"]).unwrap();

    let out = h.run(&["list", "--json"]).unwrap();
    let segments: Vec<SegmentInfo> = serde_json::from_str(&out).unwrap();
    let summary: Vec<_> = segments
        .iter()
        .map(|info| (info.name.as_str(), info.capacity))
        .collect();
    assert_eq!(summary, vec![("alpha", 7), ("beta", 3)]);

    let table = h.run(&["list"]).unwrap();
    let lines: Vec<_> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("NAME"));
    assert!(lines[1].starts_with("alpha"));
}

#[test]
fn test_destroy() {
    let h = Harness::new();
    h.run(&["create", "x"]).unwrap();
    assert_eq!(h.run(&["destroy", "x"]).unwrap(), "Destroyed x\n");

    assert!(matches!(
        h.run(&["pop", "x"]),
        Err(CtlError::Buffer(CbuffError::NotFound { .. }))
    ));
    assert!(matches!(
        h.run(&["destroy", "x"]),
        Err(CtlError::Buffer(CbuffError::NotFound { .. }))
    ));
}

#[test]
fn test_create_errors() {
    let h = Harness::new();
    assert!(matches!(
        h.run(&["create", "big", "--length", "300"]),
        Err(CtlError::Buffer(CbuffError::InvalidCapacity { .. }))
    ));

    h.run(&["create", "twice"]).unwrap();
    assert!(matches!(
        h.run(&["create", "twice"]),
        Err(CtlError::Buffer(CbuffError::AlreadyExists { .. }))
    ));
}

#[test]
fn test_config_file_supplies_defaults() {
    let h = Harness::new();
    let config_path = h.dir.path().join("cbuff.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"
[shared]
log_level = "debug"
service_name = "feeder"

[buffer]
name = "unused"
length = 6
shm_dir = "{}"
lock_timeout_ms = 100
"#,
        h.dir.path().display()
    )
    .unwrap();

    let config_arg = config_path.to_str().unwrap();
    let cli = Cli::try_parse_from(["cbuffctl", "-c", config_arg, "create", "cfg"]).unwrap();
    let config = CtlConfig::for_cli(&cli).unwrap();
    assert_eq!(config.log_level(), Some(cbuff_common::config::LogLevel::Debug));
    assert_eq!(config.service_name(), "feeder");

    let settings = Settings::resolve(&cli, &config);
    assert_eq!(settings.default_length, 6);
    execute(&cli.command, &settings, &mut Vec::new()).unwrap();

    let out = h.run(&["info", "cfg", "--json"]).unwrap();
    let info: SegmentInfo = serde_json::from_str(&out).unwrap();
    assert_eq!(info.capacity, 6);
}

#[test]
fn test_config_file_errors() {
    let h = Harness::new();

    let missing = h.dir.path().join("missing.toml");
    let cli = Cli::try_parse_from(["cbuffctl", "-c", missing.to_str().unwrap(), "list"]).unwrap();
    assert!(matches!(
        CtlConfig::for_cli(&cli),
        Err(CtlError::Config { .. })
    ));

    let invalid = h.dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[buffer]\nname = \"b\"\ncreate = true\nlength = 0\n").unwrap();
    assert!(matches!(
        CtlConfig::load_from(&invalid),
        Err(CtlError::Config { .. })
    ));

    let unknown = h.dir.path().join("unknown.toml");
    std::fs::write(&unknown, "[network]\nport = 1\n").unwrap();
    assert!(CtlConfig::load_from(&unknown).is_err());
}

#[test]
fn test_parse_rejects_missing_command() {
    assert!(Cli::try_parse_from(["cbuffctl"]).is_err());
    assert!(matches!(
        Cli::try_parse_from(["cbuffctl", "list"]).unwrap().command,
        Command::List { json: false }
    ));
}
