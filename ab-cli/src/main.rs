mod application;
mod presentation;

use std::io::ErrorKind;

use ab_core::error::AbError;

/// Exit codes per the Android Backup tool's CLI contract: 0 success, 1 a
/// user/input error (bad passphrase, malformed archive, bad arguments, a
/// missing or unreadable file named on the command line), 2 an internal
/// error (anything else talking to the filesystem, or a panic). Spec §6
/// lists "file not found" under exit code 1, so `NotFound`/`PermissionDenied`
/// stay user errors even though they arrive wrapped as `AbError::Io`.
fn exit_code_for(err: &AbError) -> i32 {
    match err {
        AbError::Io(io_err) => match io_err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => 1,
            _ => 2,
        },
        _ => 1,
    }
}

fn main() {
    let result = std::panic::catch_unwind(application::run);
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            eprintln!("abtool: {err}");
            std::process::exit(exit_code_for(&err));
        }
        Err(_) => {
            eprintln!("abtool: internal error");
            std::process::exit(2);
        }
    }
}
