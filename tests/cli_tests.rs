//! End-to-end CLI tests for every numatool subcommand
//!
//! Dumps and specs come from temp files, environment variables or stdin,
//! never from the host the tests run on.

#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const TOPOLOGY_DUMP: &str = "\
cpu p:0 d:0 n:0 c:0 t:3 cpu:0
cpu p:0 d:0 n:0 c:0 t:3 cpu:1
cpu p:1 d:0 n:1 c:0 t:c cpu:2
cpu p:1 d:0 n:1 c:0 t:c cpu:3
dist n:0 d:10 20
dist n:1 d:20 10
mem n:0 s:8063.83
mem n:1 s:8063.83
";

const RES_ALLOWED_DUMP: &str = "pod0/42 c:5 m:2\n";

fn numatool() -> Command {
    let mut cmd = Command::cargo_bin("numatool").unwrap();
    // keep host environment out of input resolution
    cmd.env_remove("topology_dump").env_remove("res_allowed");
    cmd
}

#[test]
fn test_cli_requires_subcommand() {
    numatool()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help() {
    numatool()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("qemu-opts"));
}

#[test]
fn test_res_renders_tree_from_file() {
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("topology.txt");
    fs::write(&dump, TOPOLOGY_DUMP).unwrap();

    numatool()
        .arg("-t")
        .arg(&dump)
        .arg("res")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "package0 die0 node0 core0 thread0 cpu0",
        ))
        .stdout(predicate::str::contains("mem"))
        .stdout(predicate::str::contains("8G"));
}

#[test]
fn test_res_reads_environment_variable() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .arg("res")
        .assert()
        .success()
        .stdout(predicate::str::contains("package1 die0 node1"));
}

#[test]
fn test_file_option_wins_over_environment() {
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("topology.txt");
    fs::write(&dump, "cpu p:7 d:0 n:0 c:0 t:1 cpu:0\n").unwrap();

    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .arg("-t")
        .arg(&dump)
        .arg("cpus")
        .assert()
        .success()
        .stdout(predicate::str::contains("package7"))
        .stdout(predicate::str::contains("package0").not());
}

#[test]
fn test_cpus_excludes_memory() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .arg("cpus")
        .assert()
        .success()
        .stdout(predicate::str::contains("cpu3"))
        .stdout(predicate::str::contains("mem").not());
}

#[test]
fn test_res_json_output() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .args(["res", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(r#"{"package0""#))
        .stdout(predicate::str::contains(r#""mem":{"node0":{"8G":{}}}"#));
}

#[test]
fn test_missing_topology_dump_fails() {
    numatool()
        .arg("res")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no topology dump given"))
        .stderr(predicate::str::contains("bash-topology-dump"));
}

#[test]
fn test_unreadable_topology_dump_file_fails() {
    numatool()
        .arg("-t")
        .arg("does/not/exist.txt")
        .arg("res")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read topology dump"));
}

#[test]
fn test_empty_dump_reports_no_cpu_records() {
    numatool()
        .env("topology_dump", "nothing to see\n")
        .arg("res")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no CPU records"));
}

#[test]
fn test_res_allowed_attaches_owners() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .env("res_allowed", RES_ALLOWED_DUMP)
        .arg("res-allowed")
        .assert()
        .success()
        .stdout(predicate::str::contains("cpu0 pod0/42"))
        .stdout(predicate::str::contains("cpu2 pod0/42"));
}

#[test]
fn test_cpus_allowed_skips_memory() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .env("res_allowed", RES_ALLOWED_DUMP)
        .arg("cpus-allowed")
        .assert()
        .success()
        .stdout(predicate::str::contains("pod0/42"))
        .stdout(predicate::str::contains("mem").not());
}

#[test]
fn test_res_allowed_needs_owner_dump() {
    numatool()
        .env("topology_dump", TOPOLOGY_DUMP)
        .arg("res-allowed")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no res_allowed dump given"));
}

#[test]
fn test_qemu_opts_from_file() {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("machine.json");
    fs::write(&spec, r#"[{"cpu": 1, "mem": "1G", "nodes": 2}]"#).unwrap();

    numatool()
        .arg("qemu-opts")
        .arg(&spec)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "-machine pc -smp cpus=2,threads=1,sockets=1 -m size=2G,slots=0,maxmem=2G",
        ))
        .stdout(predicate::str::contains(
            "-numa node,nodeid=0,memdev=membuiltin_0_node_0,cpus=0-0",
        ));
}

#[test]
fn test_qemu_opts_from_stdin() {
    numatool()
        .arg("qemu-opts")
        .write_stdin(r#"[{"cores": 2, "mem": "2G", "nodes": 2}, {"nvmem": "8G"}]"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("-machine pc,nvdimm=on"))
        .stdout(predicate::str::contains("-numa dist,src=0,dst=2,val=21"));
}

#[test]
fn test_qemu_opts_rejects_unknown_key() {
    numatool()
        .arg("qemu-opts")
        .write_stdin(r#"[{"coers": 4}]"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid key"));
}

#[test]
fn test_qemu_opts_rejects_cpu_less_machine() {
    numatool()
        .arg("qemu-opts")
        .write_stdin(r#"[{"mem": "1G"}]"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no CPUs found"));
}

#[test]
fn test_qemu_opts_rejects_bad_json() {
    numatool()
        .arg("qemu-opts")
        .write_stdin("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_from_numactl_stdin() {
    let listing = "\
available: 2 nodes (0-1)
node 0 cpus: 0 1 2 3
node 0 size: 3966 MB
node 0 free: 1649 MB
node 1 cpus: 4 5 6 7
node 1 size: 4006 MB
node 1 free: 983 MB
node distances:
node   0   1
  0:  10  20
  1:  20  10
";
    numatool()
        .arg("from-numactl")
        .write_stdin(listing)
        .assert()
        .success()
        .stdout(predicate::eq("[{\"cpu\":4,\"mem\":\"4G\",\"nodes\":2}]\n"));
}

#[test]
fn test_from_numactl_file() {
    let dir = TempDir::new().unwrap();
    let listing = dir.path().join("numactl.txt");
    fs::write(
        &listing,
        "node 0 cpus: 0\nnode 0 size: 1007 MB\nnode distances:\n  0: 10\n",
    )
    .unwrap();

    numatool()
        .arg("from-numactl")
        .arg(&listing)
        .assert()
        .success()
        .stdout(predicate::eq("[{\"cpu\":1,\"mem\":\"1G\"}]\n"));
}

#[test]
fn test_from_numactl_reports_wrong_node() {
    numatool()
        .arg("from-numactl")
        .write_stdin("node 0 cpus: 0\nnode 1 size: 1007 MB\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected node 0 size"));
}

#[test]
fn test_bash_topology_dump_prints_snippet() {
    numatool()
        .arg("bash-topology-dump")
        .assert()
        .success()
        .stdout(predicate::str::contains("/sys/devices/system/cpu"))
        .stdout(predicate::str::contains("thread_siblings"));
}

#[test]
fn test_bash_res_allowed_prints_snippet() {
    numatool()
        .args(["bash-res-allowed", "pod0", "pod1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("for process in 'pod0' 'pod1'"))
        .stdout(predicate::str::contains("Cpus_allowed"));
}

#[test]
fn test_invalid_subcommand() {
    numatool()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
