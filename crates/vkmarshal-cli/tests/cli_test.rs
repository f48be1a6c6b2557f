//! Integration test: the vkmarshal binary end to end.
//!
//! Runs each subcommand against the built-in sample registry and checks
//! what lands on disk and on stdout.

use std::path::Path;
use std::process::{Command, Output};

fn vkmarshal(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vkmarshal"))
        .args(args)
        .env("VKMARSHAL_LOG", "warn")
        .output()
        .expect("failed to run vkmarshal")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_generate_all_targets() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("gen");
    let output = vkmarshal(&["generate", "--out", out.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    for name in [
        "goldfish_vk_marshaling_guest.h",
        "goldfish_vk_marshaling_guest.cpp",
        "VkEncoder.cpp",
        "VkDecoder.cpp",
        "goldfish_vk_proto.proto",
    ] {
        let path = out.join(name);
        assert!(path.is_file(), "{name} missing");
        assert!(std::fs::metadata(&path).unwrap().len() > 0, "{name} is empty");
    }
    let listed = stdout(&output);
    assert!(listed.lines().all(|l| Path::new(l).is_file()));
}

#[test]
fn test_generate_single_target_with_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("vkmarshal.toml");
    std::fs::write(&config, "opcode_base = 30000\nproto_package = \"demo_vk\"\n").unwrap();
    let out = dir.path().join("proto");

    let output = vkmarshal(&[
        "generate",
        "--out",
        out.to_str().unwrap(),
        "--target",
        "protobuf",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let mut names: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["goldfish_vk_proto.proto", "goldfish_vk_proto_convert.cpp", "goldfish_vk_proto_convert.h"]
    );
    let proto = std::fs::read_to_string(out.join("goldfish_vk_proto.proto")).unwrap();
    assert!(proto.contains("package demo_vk;"));
}

#[test]
fn test_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = vkmarshal(&[
        "generate",
        "--out",
        dir.path().to_str().unwrap(),
        "--config",
        dir.path().join("absent.toml").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = vkmarshal(&["generate", "--out", dir.path().to_str().unwrap(), "--target", "vulkan"]);
    assert!(!output.status.success());
}

#[test]
fn test_opcodes_start_at_base() {
    let output = vkmarshal(&["opcodes"]);
    assert!(output.status.success());
    let text = stdout(&output);
    let first = text.lines().next().unwrap();
    assert!(first.trim_start().starts_with("20000"), "{first}");
    assert!(text.contains("vkCreateInstance"));
}

#[test]
fn test_dumped_sample_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let output = vkmarshal(&["dump-sample"]);
    assert!(output.status.success());
    let json = stdout(&output);
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed.is_object());

    let path = dir.path().join("registry.json");
    std::fs::write(&path, &json).unwrap();
    let output = vkmarshal(&["opcodes", "--registry", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout(&output), stdout(&vkmarshal(&["opcodes"])));
}

#[test]
fn test_decode_lists_packets() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.bin");
    let mut buf = Vec::new();
    buf.extend(20000u32.to_be_bytes());
    buf.extend(12u32.to_be_bytes());
    buf.extend([0xAB; 4]);
    std::fs::write(&capture, &buf).unwrap();

    let output = vkmarshal(&["decode", capture.to_str().unwrap(), "--hex"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("20000"));
    assert!(text.contains("ab ab ab ab"));

    buf.extend(0xFFFF_FFFFu32.to_be_bytes());
    buf.extend(8u32.to_be_bytes());
    std::fs::write(&capture, &buf).unwrap();
    assert!(!vkmarshal(&["decode", capture.to_str().unwrap()]).status.success());
}
