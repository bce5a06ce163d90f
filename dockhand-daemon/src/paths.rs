use std::path::{Path, PathBuf};

use dockhand_core::config::dockhand_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    dockhand_root(home).join(DAEMON_SOCKET)
}
