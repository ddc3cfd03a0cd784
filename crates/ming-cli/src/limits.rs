//! Process resource limits

use tracing::debug;

/// Raise the open-file soft limit to the hard limit. Failures are logged only.
#[cfg(unix)]
pub fn raise_open_file_limit() {
    use nix::sys::resource::{getrlimit, setrlimit, Resource};

    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, hard)) if soft < hard => match setrlimit(Resource::RLIMIT_NOFILE, hard, hard) {
            Ok(()) => debug!(from = soft, to = hard, "raised open file limit"),
            Err(e) => tracing::warn!(error = %e, "unable to raise open file limit"),
        },
        Ok((soft, _)) => debug!(limit = soft, "open file limit already at maximum"),
        Err(e) => tracing::warn!(error = %e, "unable to read open file limit"),
    }
}

#[cfg(not(unix))]
pub fn raise_open_file_limit() {
    debug!("resource limits are not adjusted on this platform");
}
