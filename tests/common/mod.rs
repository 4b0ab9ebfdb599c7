//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Board listing with an Uno on COM19 behind an unrelated serial port.
pub const UNO_LISTING: &str = "\
Port         Protocol Type              Board Name  FQBN            Core
COM3         serial   Serial Port       Unknown
COM19        serial   Serial Port (USB) Arduino Uno arduino:avr:uno arduino:avr
";

/// Write an executable stand-in for `arduino-cli` into `dir`.
///
/// Every invocation appends its arguments to `calls.log` next to the
/// script. `compile` fails when the sketch contains `#error`; `board list`
/// prints `listing`; `upload` prints the port it was given.
#[cfg(unix)]
pub fn fake_arduino_cli(dir: &Path, listing: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log = dir.join("calls.log");
    let listing_file = dir.join("listing.txt");
    std::fs::write(&listing_file, listing).unwrap();

    let script = format!(
        r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  compile)
    if grep -q '#error' "$4"; then
      echo "$4:1:2: error: #error \"boom\"" >&2
      exit 1
    fi
    echo "Sketch uses 444 bytes (1%) of program storage space."
    ;;
  board)
    cat "{listing}"
    ;;
  upload)
    echo "Uploaded to $3"
    ;;
  *)
    exit 2
    ;;
esac
"#,
        log = log.display(),
        listing = listing_file.display(),
    );

    let path = dir.join("arduino-cli");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Lines recorded by the fake `arduino-cli`, one per invocation.
pub fn recorded_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
