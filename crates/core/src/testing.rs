use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::shell::ShellCommand;

/// Writes an executable `#!/bin/sh` script named `name` into `dir`.
pub(crate) fn fake_tool(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// `command` with `dir` put first on its `PATH`.
pub(crate) fn on_path(command: ShellCommand, dir: &Path) -> ShellCommand {
    let path = format!("{}:{}", dir.display(), std::env::var("PATH").unwrap_or_default());
    command.with_env(vec![("PATH".into(), path)])
}
