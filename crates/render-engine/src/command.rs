//! Engine command helpers: argument templates, output capture, and
//! failure classification.

use std::fmt::Write as _;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use rendermill_common::config::CommandSpec;
use tokio::process::Command;

/// Lines of engine output kept for a failure message.
pub const OUTPUT_TAIL_LINES: usize = 3;

/// Values substituted into argument templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub project: Option<&'a Path>,
    pub composition: Option<&'a str>,
    pub output: Option<&'a Path>,
    pub id: Option<&'a str>,
    pub bindings: Option<&'a Path>,
}

impl TemplateVars<'_> {
    /// Expand `{project}`, `{composition}`, `{output}`, `{id}` and
    /// `{bindings}` in one argument. Unknown placeholders are left as is.
    pub fn expand(&self, template: &str) -> String {
        let mut arg = template.to_string();
        let path_vars = [
            ("{project}", self.project),
            ("{output}", self.output),
            ("{bindings}", self.bindings),
        ];
        for (key, value) in path_vars {
            if let Some(value) = value {
                arg = arg.replace(key, &value.to_string_lossy());
            }
        }
        if let Some(composition) = self.composition {
            arg = arg.replace("{composition}", composition);
        }
        if let Some(id) = self.id {
            arg = arg.replace("{id}", id);
        }
        arg
    }

    pub fn expand_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.expand(t)).collect()
    }
}

/// Whether any argument template references `{project}`.
pub fn references_project(spec: &CommandSpec) -> bool {
    spec.args.iter().any(|a| a.contains("{project}"))
}

/// Make a record id safe to use as a file name.
///
/// ASCII alphanumerics, `-`, `_` and non-leading `.` are kept; every other
/// byte (including `%`) becomes `%XX`. Distinct ids therefore never share a
/// file name.
pub fn sanitize_id(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for (i, byte) in id.bytes().enumerate() {
        let keep =
            byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') || (byte == b'.' && i > 0);
        if keep {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "%{byte:02X}");
        }
    }
    name
}

/// Last `n` non-empty lines of combined stdout and stderr.
pub fn output_tail(output: &Output, n: usize) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}

/// First project error pattern found in the engine output, if any.
pub fn match_project_error<'a>(output: &Output, patterns: &'a [String]) -> Option<&'a str> {
    let haystack = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
    .to_lowercase();
    patterns
        .iter()
        .find(|p| !p.is_empty() && haystack.contains(&p.to_lowercase()))
        .map(String::as_str)
}

/// Run a short command to completion, bounded by `timeout`.
pub async fn run_bounded(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> std::io::Result<Option<Output>> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map(Some),
        Err(_) => Ok(None),
    }
}

/// Check whether `binary` resolves on `PATH` (or is an existing path).
pub fn command_exists(binary: &str) -> bool {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(binary).is_file();
    }
    std::process::Command::new("sh")
        .arg("-c")
        .arg("command -v \"$1\" >/dev/null 2>&1")
        .arg("sh")
        .arg(binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn output(stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(256),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_expand_templates() {
        let vars = TemplateVars {
            project: Some(Path::new("/t/Sales.aep")),
            composition: Some("Main Comp"),
            output: Some(Path::new("/r/.staging/7.mp4")),
            id: Some("7"),
            bindings: None,
        };
        let args = vars.expand_all(&[
            "-project".into(),
            "{project}".into(),
            "-comp".into(),
            "{composition}".into(),
            "-output={output}".into(),
            "{bindings}".into(),
        ]);
        assert_eq!(
            args,
            vec![
                "-project",
                "/t/Sales.aep",
                "-comp",
                "Main Comp",
                "-output=/r/.staging/7.mp4",
                "{bindings}",
            ]
        );
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("acme/42 b"), "acme%2F42%20b");
        assert_eq!(sanitize_id("p-7.v2"), "p-7.v2");
        assert_eq!(sanitize_id("p_7"), "p_7");
        assert_eq!(sanitize_id(".."), "%2E.");
        assert_eq!(sanitize_id("50%"), "50%25");
        assert_eq!(sanitize_id("café"), "caf%C3%A9");
    }

    #[test]
    fn test_sanitized_ids_do_not_collide() {
        let ids = ["acme/1", "acme_1", "acme 1", "acme%2F1", "acme%1"];
        let names: std::collections::HashSet<String> =
            ids.iter().map(|id| sanitize_id(id)).collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn test_command_exists_does_not_interpret_the_name() {
        assert!(command_exists("sh"));
        assert!(!command_exists("no-such-program; true"));
        assert!(!command_exists("definitely-not-installed-rendermill"));
    }

    proptest! {
        #[test]
        fn distinct_ids_get_distinct_file_names(a in "\\PC{0,12}", b in "\\PC{0,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(sanitize_id(&a), sanitize_id(&b));
        }
    }

    #[test]
    fn test_output_tail_and_project_error_match() {
        let out = output(
            "PROGRESS: 10%\nPROGRESS: 20%\n",
            "aerender ERROR: No comp was found with the given name.\n\n",
        );
        assert_eq!(
            output_tail(&out, 2),
            "PROGRESS: 20% | aerender ERROR: No comp was found with the given name."
        );

        let patterns = vec!["no comp was found".to_string()];
        assert_eq!(match_project_error(&out, &patterns), Some("no comp was found"));
        assert_eq!(match_project_error(&output("ok", ""), &patterns), None);
    }

    #[tokio::test]
    async fn test_run_bounded_times_out() {
        let result = run_bounded("sleep", &["5".to_string()], Duration::from_millis(100))
            .await
            .unwrap();
        assert!(result.is_none());

        let done = run_bounded("true", &[], Duration::from_secs(5)).await.unwrap();
        assert!(done.unwrap().status.success());
    }
}
