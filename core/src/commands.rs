//! Argv tables for the external collaborators. Every one of these is an
//! opaque subprocess that reports through its exit code.

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Blocks until the backing store accepts connections, then exits 0.
pub fn wait_for_store() -> Vec<String> {
    strings(&["python3", "-m", "vessel.lifecycle.wait_for_db"])
}

pub fn migrate() -> Vec<String> {
    strings(&["python3", "-m", "vessel.lifecycle.migrate"])
}

pub fn server() -> Vec<String> {
    strings(&[
        "gunicorn",
        "-c",
        "/lifecycle/gunicorn.conf.py",
        "vessel.root.asgi:application",
    ])
}

/// Worker runtime with the fixed concurrency and queue parameters the
/// deployment relies on: fair scheduling, one task per child, autoscaled
/// between one and three processes, events on, embedded beat scheduler.
pub fn worker() -> Vec<String> {
    strings(&[
        "celery",
        "-A",
        "vessel.root.celery",
        "worker",
        "-Ofair",
        "--max-tasks-per-child=1",
        "--autoscale",
        "3,1",
        "-E",
        "-B",
        "-s",
        "/tmp/celerybeat-schedule",
        "-Q",
        "vessel,vessel_scheduled,vessel_events",
    ])
}

pub fn flower() -> Vec<String> {
    strings(&["celery", "-A", "vessel.root.celery", "flower"])
}

pub fn shell() -> Vec<String> {
    strings(&["/bin/bash"])
}

pub fn install_test_deps() -> Vec<String> {
    strings(&[
        "pip",
        "install",
        "--no-cache-dir",
        "-r",
        "requirements-dev.txt",
    ])
}

pub fn test_runner() -> Vec<String> {
    strings(&["python3", "-m", "manage", "test", "vessel"])
}

pub fn dump_config() -> Vec<String> {
    strings(&["python3", "-m", "vessel.lib.config"])
}

/// Catch-all: forward the entire original argv to the management entry
/// point.
pub fn management(args: &[String]) -> Vec<String> {
    let mut argv = strings(&["python3", "-m", "manage"]);
    argv.extend(args.iter().cloned());
    argv
}

/// Bounded liveness ping for the worker runtime, addressed to this node.
pub fn worker_ping(hostname: &str) -> Vec<String> {
    let mut argv = strings(&["celery", "-A", "vessel.root.celery", "inspect", "ping", "-d"]);
    argv.push(format!("celery@{hostname}"));
    argv.extend(strings(&["--timeout", "5", "-j"]));
    argv
}
