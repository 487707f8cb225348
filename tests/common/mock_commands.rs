// Mock executables for provider calls.
//
// Mocks are plain `#!/bin/sh` scripts, so tests using them are Unix-only.

use std::fs;
use std::path::{Path, PathBuf};

/// Write an executable script named `name` into `bin_dir`.
#[cfg(unix)]
pub fn write_mock_script(bin_dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let script_path = bin_dir.join(name);
    fs::write(&script_path, script).unwrap();
    fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
    script_path
}

/// One canned response: a `case` glob matched against the requested URL.
pub struct Route<'a> {
    pub pattern: &'a str,
    pub status: u16,
    pub body: &'a str,
}

impl<'a> Route<'a> {
    pub fn ok(pattern: &'a str, body: &'a str) -> Self {
        Self {
            pattern,
            status: 200,
            body,
        }
    }
}

/// A fake `curl` that answers by URL and logs each request.
///
/// The URL is the last argument, as the server client passes it. Requests
/// matching no route get a 404. Every URL is appended to
/// `<bin_dir>/requests.log`, the full argument list to `args.log` and
/// whatever arrives on stdin to `stdin.log`.
#[cfg(unix)]
pub fn mock_curl(bin_dir: &Path, routes: &[Route<'_>]) -> PathBuf {
    let log = bin_dir.join("requests.log");
    let mut script = String::from("#!/bin/sh\nfor url; do :; done\n");
    script.push_str(&format!("printf '%s\\n' \"$url\" >> '{}'\n", log.display()));
    script.push_str(&format!(
        "printf '%s\\n' \"$*\" >> '{}'\n",
        bin_dir.join("args.log").display()
    ));
    script.push_str(&format!("cat >> '{}'\n", bin_dir.join("stdin.log").display()));
    script.push_str("case \"$url\" in\n");
    for (i, route) in routes.iter().enumerate() {
        let body_path = bin_dir.join(format!("response-{i}.json"));
        fs::write(&body_path, route.body).unwrap();
        script.push_str(&format!(
            "  {}) cat '{}'; printf '\\n{}'; exit 0 ;;\n",
            route.pattern,
            body_path.display(),
            route.status
        ));
    }
    script.push_str("esac\nprintf '\\n404'\n");
    write_mock_script(bin_dir, "curl", &script)
}

/// URLs the mock `curl` in `bin_dir` was asked for, in order.
pub fn requests(bin_dir: &Path) -> Vec<String> {
    fs::read_to_string(bin_dir.join("requests.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Everything the mock `curl` in `bin_dir` logged under `name`.
pub fn logged(bin_dir: &Path, name: &str) -> String {
    fs::read_to_string(bin_dir.join(name)).unwrap_or_default()
}
