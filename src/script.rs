//! Rendering of small POSIX shell scripts.
//!
//! Scripts are used both as first-boot user-data and as commands run over
//! SSH. Every rendered script starts with `#!/bin/sh` and `set -e`, so the
//! first failing statement aborts it with a non-zero exit code.

use std::borrow::Cow;

use shell_escape::unix::escape;

/// Page served by [`web_server_script`] when none is given.
pub const DEFAULT_PAGE: &str = "Hello Cloud Servers";

/// Ordered list of shell statements.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScriptBuilder {
    statements: Vec<String>,
}

impl ScriptBuilder {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command line verbatim.
    #[must_use]
    pub fn exec(mut self, command: impl Into<String>) -> Self {
        self.statements.push(command.into());
        self
    }

    /// Appends a statement that writes `contents` to `path`.
    ///
    /// Both values are shell-escaped, so arbitrary text is safe to pass.
    #[must_use]
    pub fn write_file(self, path: &str, contents: &str) -> Self {
        let line = format!(
            "printf '%s\\n' {} > {}",
            escape(Cow::Borrowed(contents)),
            escape(Cow::Borrowed(path))
        );
        self.exec(line)
    }

    /// Number of statements added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` when no statement has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the script text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut script = String::from("#!/bin/sh\nset -e\n");
        for statement in &self.statements {
            script.push_str(statement);
            script.push('\n');
        }
        script
    }
}

/// Installs and starts Apache, opens port 80 and publishes `page` as the
/// index page.
#[must_use]
pub fn web_server_script(page: &str) -> ScriptBuilder {
    ScriptBuilder::new()
        .exec("export DEBIAN_FRONTEND=noninteractive")
        .exec("apt-get update -q")
        .exec("apt-get install -y -q apache2")
        .exec("systemctl enable --now apache2")
        .exec("iptables -I INPUT -p tcp --dport 80 -j ACCEPT")
        .write_file("/var/www/html/index.html", page)
}

/// First-boot script installing a LAMP stack.
#[must_use]
pub fn lamp_script() -> ScriptBuilder {
    ScriptBuilder::new()
        .exec("export DEBIAN_FRONTEND=noninteractive")
        .exec("apt-get update -q")
        .exec("apt-get upgrade -y -q")
        .exec("apt-get install -y -q apache2 mariadb-server php libapache2-mod-php php-mysql")
        .exec("systemctl enable --now apache2 mariadb")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prefixes_shebang_and_errexit() {
        let script = ScriptBuilder::new().exec("uptime").render();
        assert_eq!(script, "#!/bin/sh\nset -e\nuptime\n");
    }

    #[test]
    fn empty_script_still_renders_header() {
        let builder = ScriptBuilder::new();
        assert!(builder.is_empty());
        assert_eq!(builder.render(), "#!/bin/sh\nset -e\n");
    }

    #[test]
    fn write_file_escapes_contents() {
        let script = ScriptBuilder::new()
            .write_file("/tmp/index.html", "it's live; rm -rf /")
            .render();
        assert!(script.contains(r"printf '%s\n' 'it'\''s live; rm -rf /' > /tmp/index.html"));
    }

    #[test]
    fn web_server_script_publishes_page() {
        let script = web_server_script(DEFAULT_PAGE);
        assert_eq!(script.len(), 6);
        assert!(script.render().contains("'Hello Cloud Servers' > /var/www/html/index.html"));
    }

    #[test]
    fn lamp_script_installs_stack() {
        let rendered = lamp_script().render();
        assert!(rendered.contains("apache2 mariadb-server php"));
        assert!(rendered.starts_with("#!/bin/sh\n"));
    }
}
